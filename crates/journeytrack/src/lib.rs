//! `journeytrack` - Vehicle journey tracking with multi-source position fallback
//!
//! This library polls a fleet API for vehicle positions, records each trip as
//! a [`Journey`] of admitted route points, raises driving alerts, keeps
//! in-flight journeys durable across restarts and exports completed ones as
//! JSON, CSV or GPX.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod alerts;
pub mod api;
pub mod cli;
pub mod clock;
pub mod config;
pub mod dead_reckoning;
pub mod error;
pub mod events;
pub mod export;
pub mod geo;
pub mod health;
pub mod journey;
pub mod logging;
pub mod manager;
pub mod persistence;
pub mod resolver;
pub mod storage;
pub mod summary;

pub use alerts::{AlertDetector, AlertThresholds};
pub use api::{FleetApi, HttpFleetApi};
pub use clock::{Clock, SystemClock};
pub use config::Config;
pub use dead_reckoning::DeadReckoningEstimator;
pub use error::{Error, Result};
pub use events::{JourneyUpdate, UpdateKind};
pub use export::ExportFormat;
pub use health::{FallbackFlag, HealthMonitor};
pub use journey::{Alert, AlertKind, Journey, JourneyStatus, PositionSource, RoutePoint};
pub use logging::init_logging;
pub use manager::{JourneyManager, TickOutcome, TrackingSettings};
pub use persistence::PersistenceStore;
pub use resolver::{Position, PositionResolver};
pub use storage::{Storage, StorageStats};
pub use summary::JourneySummary;
