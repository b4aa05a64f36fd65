//! Error types for journeytrack.
//!
//! This module defines the error taxonomy used throughout the tracking engine.
//! Per-source resolution failures live in [`crate::resolver::SourceError`] and
//! never surface here; everything below is either reported to the caller or
//! logged by the component that hit it.

use std::path::PathBuf;
use thiserror::Error;

use crate::api::ApiError;

/// The main error type for journeytrack operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Tracking Errors ===
    /// A journey is already active for this vehicle.
    #[error("vehicle '{vehicle_id}' is already being tracked")]
    DuplicateTrackingRequest {
        /// The vehicle that was already tracked.
        vehicle_id: String,
    },

    /// No active journey exists for this vehicle.
    #[error("no active journey for vehicle '{vehicle_id}'")]
    NoActiveJourney {
        /// The vehicle that was asked about.
        vehicle_id: String,
    },

    /// Every position source failed for this vehicle.
    #[error("all {attempted} position sources exhausted for vehicle '{vehicle_id}'")]
    AllSourcesExhausted {
        /// The vehicle being resolved.
        vehicle_id: String,
        /// How many sources were tried.
        attempted: usize,
    },

    // === Persistence Errors ===
    /// A write to the persistence store failed.
    #[error("persistence write failed: {message}")]
    PersistenceWriteFailure {
        /// Description of what went wrong.
        message: String,
    },

    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    // === Export Errors ===
    /// The journey has no route points to export.
    #[error("journey {journey_id} has no route points to export")]
    EmptyJourney {
        /// The journey that was empty.
        journey_id: String,
    },

    /// The requested export format is not supported.
    #[error("unsupported export format: {0}")]
    UnsupportedFormat(String),

    /// CSV serialization failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// XML serialization failed.
    #[error("XML error: {0}")]
    Xml(String),

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Upstream Errors ===
    /// The upstream fleet API failed.
    #[error("upstream API error: {0}")]
    Upstream(#[from] ApiError),

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for journeytrack operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a new XML error.
    #[must_use]
    pub fn xml(message: impl Into<String>) -> Self {
        Self::Xml(message.into())
    }

    /// Create a persistence write failure.
    #[must_use]
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::PersistenceWriteFailure {
            message: message.into(),
        }
    }

    /// Check if this error was caused by the caller (bad start/stop request).
    #[must_use]
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::DuplicateTrackingRequest { .. } | Self::NoActiveJourney { .. }
        )
    }

    /// Check if this error means no position source produced a fix.
    #[must_use]
    pub fn is_sources_exhausted(&self) -> bool {
        matches!(self, Self::AllSourcesExhausted { .. })
    }
}
