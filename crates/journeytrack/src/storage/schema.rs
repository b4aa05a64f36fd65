//! `SQLite` schema definitions for journeytrack.
//!
//! Journeys are stored as JSON documents alongside a few indexed columns
//! used for lookups and listing.

/// In-flight journeys, one row per tracked vehicle.
pub const CREATE_ACTIVE_JOURNEYS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS active_journeys (
    vehicle_id TEXT PRIMARY KEY,
    journey_id TEXT NOT NULL,
    data TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
)
";

/// Completed journeys, append-only.
pub const CREATE_JOURNEY_HISTORY_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS journey_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    journey_id TEXT NOT NULL UNIQUE,
    vehicle_id TEXT NOT NULL,
    start_time TEXT NOT NULL,
    end_time TEXT,
    total_distance REAL NOT NULL,
    data TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
)
";

/// Index for per-vehicle history listing.
pub const CREATE_HISTORY_VEHICLE_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_history_vehicle ON journey_history(vehicle_id)
";

/// Index for newest-first history listing.
pub const CREATE_HISTORY_START_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_history_start ON journey_history(start_time DESC)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_ACTIVE_JOURNEYS_TABLE,
    CREATE_JOURNEY_HISTORY_TABLE,
    CREATE_HISTORY_VEHICLE_INDEX,
    CREATE_HISTORY_START_INDEX,
    CREATE_METADATA_TABLE,
];
