//! Command-line interface for journeytrack.
//!
//! This module provides the CLI structure for the `jtrack` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    ConfigCommand, ExportCommand, FormatArg, HealthCommand, HistoryCommand, ResumeCommand,
    TrackCommand,
};

use crate::logging::Verbosity;

/// jtrack - Track vehicle journeys from a fleet API
///
/// Polls each vehicle's position through a chain of fallback sources,
/// records the route, raises driving alerts and exports finished journeys.
#[derive(Debug, Parser)]
#[command(name = "jtrack")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Track vehicles until Ctrl-C or a fixed duration
    Track(TrackCommand),

    /// Resume journeys left active by a previous run
    Resume(ResumeCommand),

    /// List completed journeys
    History(HistoryCommand),

    /// Export a completed journey to a file
    Export(ExportCommand),

    /// Probe the fleet API once
    Health(HealthCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.verbose, self.quiet)
    }
}
