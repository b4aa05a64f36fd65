//! Storage layer for journeytrack.
//!
//! This module provides `SQLite`-based durable storage for journeys:
//! one snapshot row per vehicle for in-flight journeys, and an append-only
//! table of completed ones.

pub mod migrations;
pub mod schema;

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::journey::Journey;

/// Storage engine for journeys.
///
/// Provides persistent storage using `SQLite` with support for:
/// - Upserting the in-flight snapshot of each tracked vehicle
/// - Atomically archiving a completed journey
/// - Listing and looking up history
#[derive(Debug)]
pub struct Storage {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Connection,
}

impl Storage {
    /// Open or create a storage database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    /// Initializes the schema if this is a new database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        migrations::initialize_schema(&conn)?;

        info!("Database opened successfully at {}", path.display());
        Ok(Self { path, conn })
    }

    /// Create an in-memory storage instance for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the current snapshot of an in-flight journey.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the database operation fails.
    pub fn save_active(&self, journey: &Journey) -> Result<()> {
        let data = serde_json::to_string(journey)?;
        self.conn.execute(
            r"
            INSERT INTO active_journeys (vehicle_id, journey_id, data, updated_at)
            VALUES (?1, ?2, ?3, datetime('now'))
            ON CONFLICT(vehicle_id) DO UPDATE SET
                journey_id = excluded.journey_id,
                data = excluded.data,
                updated_at = excluded.updated_at
            ",
            params![journey.vehicle_id, journey.journey_id, data],
        )?;
        debug!(
            vehicle_id = %journey.vehicle_id,
            points = journey.route_points.len(),
            "Saved active journey"
        );
        Ok(())
    }

    /// Load every in-flight snapshot.
    ///
    /// Rows that no longer decode are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn load_active(&self) -> Result<Vec<Journey>> {
        let mut stmt = self
            .conn
            .prepare("SELECT vehicle_id, data FROM active_journeys ORDER BY vehicle_id")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let journeys = rows
            .into_iter()
            .filter_map(|(vehicle_id, data)| match serde_json::from_str(&data) {
                Ok(journey) => Some(journey),
                Err(e) => {
                    warn!(vehicle_id = %vehicle_id, error = %e, "Skipping undecodable active journey");
                    None
                }
            })
            .collect();
        Ok(journeys)
    }

    /// Move a completed journey from the in-flight table to history in one
    /// transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the database operation fails.
    pub fn archive(&mut self, journey: &Journey) -> Result<()> {
        let tx = self.conn.transaction()?;
        Self::insert_history(&tx, journey)?;
        tx.execute(
            "DELETE FROM active_journeys WHERE vehicle_id = ?1 AND journey_id = ?2",
            params![journey.vehicle_id, journey.journey_id],
        )?;
        tx.commit()?;
        info!(
            vehicle_id = %journey.vehicle_id,
            journey_id = %journey.journey_id,
            "Archived journey"
        );
        Ok(())
    }

    fn insert_history(conn: &Connection, journey: &Journey) -> Result<bool> {
        let data = serde_json::to_string(journey)?;
        let point_count = i64::try_from(journey.route_points.len()).unwrap_or(i64::MAX);
        let affected = conn.execute(
            r"
            INSERT OR IGNORE INTO journey_history
                (journey_id, vehicle_id, start_time, end_time, total_distance, point_count, data)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ",
            params![
                journey.journey_id,
                journey.vehicle_id,
                journey.start_time.to_rfc3339(),
                journey.end_time.map(|t| t.to_rfc3339()),
                journey.total_distance,
                point_count,
                data,
            ],
        )?;
        Ok(affected > 0)
    }

    /// Completed journeys, newest first, optionally for one vehicle.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn history(&self, vehicle_id: Option<&str>, limit: usize) -> Result<Vec<Journey>> {
        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = self.conn.prepare(
            r"
            SELECT data FROM journey_history
            WHERE ?1 IS NULL OR vehicle_id = ?1
            ORDER BY start_time DESC, id DESC LIMIT ?2
            ",
        )?;
        let rows = stmt
            .query_map(params![vehicle_id, limit_i64], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.iter()
            .map(|data| serde_json::from_str(data).map_err(Error::from))
            .collect()
    }

    /// Look up one completed journey.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation or decoding fails.
    pub fn find_history(&self, journey_id: &str) -> Result<Option<Journey>> {
        let data: Option<String> = self
            .conn
            .query_row(
                "SELECT data FROM journey_history WHERE journey_id = ?1",
                [journey_id],
                |row| row.get(0),
            )
            .optional()?;
        data.map(|d| serde_json::from_str(&d).map_err(Error::from))
            .transpose()
    }

    /// Get database statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<StorageStats> {
        let active_journeys: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM active_journeys", [], |row| row.get(0))?;
        let (completed_journeys, total_points, total_distance_km): (i64, i64, f64) =
            self.conn.query_row(
                r"
                SELECT COUNT(*), COALESCE(SUM(point_count), 0), COALESCE(SUM(total_distance), 0.0)
                FROM journey_history
                ",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StorageStats {
            active_journeys,
            completed_journeys,
            total_points,
            total_distance_km,
            db_size_bytes,
        })
    }
}

/// Statistics about the storage.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageStats {
    /// Journeys currently in flight.
    pub active_journeys: i64,
    /// Journeys in history.
    pub completed_journeys: i64,
    /// Route points across all archived journeys.
    pub total_points: i64,
    /// Distance across all archived journeys.
    pub total_distance_km: f64,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journey::test_support::{base_time, point};
    use crate::journey::VehicleInfo;
    use crate::summary::JourneySummary;
    use chrono::Duration;
    use tempfile::TempDir;

    fn create_test_storage() -> Storage {
        Storage::open_in_memory().expect("failed to create test storage")
    }

    fn assert_same_journey(actual: &Journey, expected: &Journey) {
        assert_eq!(actual.journey_id, expected.journey_id);
        assert_eq!(actual.vehicle_id, expected.vehicle_id);
        assert_eq!(actual.status, expected.status);
        assert_eq!(actual.route_points.len(), expected.route_points.len());
        assert!((actual.total_distance - expected.total_distance).abs() < 1e-9);
    }

    fn active_journey(vehicle_id: &str) -> Journey {
        let mut journey = Journey::begin(VehicleInfo::bare(vehicle_id), point(28.61, 77.20, 0, 0.0));
        journey.append_point(point(28.62, 77.21, 30, 30.0));
        journey
    }

    fn completed_journey(vehicle_id: &str, offset_secs: i64) -> Journey {
        let mut journey = Journey::begin(
            VehicleInfo::bare(vehicle_id),
            point(28.61, 77.20, offset_secs, 0.0),
        );
        journey.append_point(point(28.62, 77.21, offset_secs + 30, 30.0));
        let summary = JourneySummary::compute(&journey);
        journey.complete(base_time() + Duration::seconds(offset_secs + 30), summary);
        journey
    }

    #[test]
    fn test_open_in_memory() {
        let storage = create_test_storage();
        assert_eq!(storage.path().to_string_lossy(), ":memory:");
    }

    #[test]
    fn test_save_and_load_active() {
        let storage = create_test_storage();
        let journey = active_journey("v1");
        storage.save_active(&journey).unwrap();

        let loaded = storage.load_active().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_same_journey(&loaded[0], &journey);
    }

    #[test]
    fn test_save_active_overwrites_snapshot() {
        let storage = create_test_storage();
        let mut journey = active_journey("v1");
        storage.save_active(&journey).unwrap();

        journey.append_point(point(28.63, 77.22, 60, 40.0));
        storage.save_active(&journey).unwrap();

        let loaded = storage.load_active().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].route_points.len(), 3);
    }

    #[test]
    fn test_load_active_skips_corrupt_rows() {
        let storage = create_test_storage();
        storage.save_active(&active_journey("v1")).unwrap();
        storage
            .conn
            .execute(
                "INSERT INTO active_journeys (vehicle_id, journey_id, data) VALUES ('v2', 'x', 'not json')",
                [],
            )
            .unwrap();

        let loaded = storage.load_active().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].vehicle_id, "v1");
    }

    #[test]
    fn test_archive_moves_journey() {
        let mut storage = create_test_storage();
        let journey = completed_journey("v1", 0);
        storage.save_active(&journey).unwrap();

        storage.archive(&journey).unwrap();

        assert!(storage.load_active().unwrap().is_empty());
        let found = storage.find_history(&journey.journey_id).unwrap().unwrap();
        assert_same_journey(&found, &journey);
        assert!(found.summary.is_some());
    }

    #[test]
    fn test_archive_keeps_newer_active_journey() {
        let mut storage = create_test_storage();
        let old = completed_journey("v1", 0);
        let newer = active_journey("v1");
        storage.save_active(&newer).unwrap();

        storage.archive(&old).unwrap();

        assert_eq!(storage.load_active().unwrap().len(), 1);
    }

    #[test]
    fn test_archive_twice_keeps_one_history_row() {
        let mut storage = create_test_storage();
        let journey = completed_journey("v1", 0);

        storage.archive(&journey).unwrap();
        storage.archive(&journey).unwrap();
        assert_eq!(storage.history(None, 10).unwrap().len(), 1);
    }

    #[test]
    fn test_history_newest_first_and_filtered() {
        let mut storage = create_test_storage();
        storage.archive(&completed_journey("v1", 0)).unwrap();
        storage.archive(&completed_journey("v2", 600)).unwrap();
        storage.archive(&completed_journey("v1", 1200)).unwrap();

        let all = storage.history(None, 10).unwrap();
        assert_eq!(all.len(), 3);
        assert!(all[0].start_time > all[1].start_time);
        assert!(all[1].start_time > all[2].start_time);

        let v1 = storage.history(Some("v1"), 10).unwrap();
        assert_eq!(v1.len(), 2);
        assert!(v1.iter().all(|j| j.vehicle_id == "v1"));

        assert_eq!(storage.history(None, 1).unwrap().len(), 1);
        assert!(storage.history(Some("v9"), 10).unwrap().is_empty());
    }

    #[test]
    fn test_find_history_missing() {
        let storage = create_test_storage();
        assert!(storage.find_history("nope").unwrap().is_none());
    }

    #[test]
    fn test_stats() {
        let mut storage = create_test_storage();
        storage.save_active(&active_journey("v3")).unwrap();
        let journey = completed_journey("v1", 0);
        storage.archive(&journey).unwrap();

        let stats = storage.stats().unwrap();
        assert_eq!(stats.active_journeys, 1);
        assert_eq!(stats.completed_journeys, 1);
        assert_eq!(stats.total_points, 2);
        assert!((stats.total_distance_km - journey.total_distance).abs() < 1e-9);
        assert_eq!(stats.db_size_bytes, 0);
    }

    #[test]
    fn test_open_file_based_persists() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("nested").join("journeys.db");
        let journey = active_journey("v1");

        {
            let storage = Storage::open(&db_path).unwrap();
            assert_eq!(storage.path(), db_path);
            storage.save_active(&journey).unwrap();
        }

        let reopened = Storage::open(&db_path).unwrap();
        let loaded = reopened.load_active().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_same_journey(&loaded[0], &journey);
        assert!(reopened.stats().unwrap().db_size_bytes > 0);
    }
}
