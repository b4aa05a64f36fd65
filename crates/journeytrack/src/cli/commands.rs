//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::export::ExportFormat;

/// Track command arguments.
#[derive(Debug, Args)]
pub struct TrackCommand {
    /// Vehicles to track
    #[arg(required = true, value_name = "VEHICLE")]
    pub vehicles: Vec<String>,

    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(short, long, value_name = "SECS")]
    pub duration: Option<u64>,

    /// Export each completed journey in this format
    #[arg(short, long, value_enum)]
    pub export: Option<FormatArg>,
}

/// Resume command arguments.
#[derive(Debug, Args)]
pub struct ResumeCommand {
    /// Suspend again after this many seconds instead of waiting for Ctrl-C
    #[arg(short, long, value_name = "SECS")]
    pub duration: Option<u64>,
}

/// History command arguments.
#[derive(Debug, Args)]
pub struct HistoryCommand {
    /// Only show journeys for this vehicle
    #[arg(long)]
    pub vehicle: Option<String>,

    /// Maximum number of journeys
    #[arg(short, long, default_value = "20")]
    pub limit: usize,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Export command arguments.
#[derive(Debug, Args)]
pub struct ExportCommand {
    /// Identifier of a completed journey
    pub journey_id: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    pub format: FormatArg,

    /// Directory to write into (defaults to the configured export dir)
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,
}

/// Health command arguments.
#[derive(Debug, Args)]
pub struct HealthCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Export format argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum FormatArg {
    /// Journey document plus analysis metadata
    #[default]
    Json,
    /// One row per route point
    Csv,
    /// GPX 1.1 track
    Gpx,
}

impl From<FormatArg> for ExportFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Json => Self::Json,
            FormatArg::Csv => Self::Csv,
            FormatArg::Gpx => Self::Gpx,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_arg_conversion() {
        assert_eq!(ExportFormat::from(FormatArg::Json), ExportFormat::Json);
        assert_eq!(ExportFormat::from(FormatArg::Csv), ExportFormat::Csv);
        assert_eq!(ExportFormat::from(FormatArg::Gpx), ExportFormat::Gpx);
    }

    #[test]
    fn test_format_arg_default() {
        assert_eq!(FormatArg::default(), FormatArg::Json);
    }

    #[test]
    fn test_config_command_debug() {
        let cmd = ConfigCommand::Show { json: false };
        assert!(format!("{cmd:?}").contains("Show"));
    }
}
