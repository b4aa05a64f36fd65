//! Last-resolved position per vehicle.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

use super::Fix;

/// A cached fix and when it was stored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CachedPosition {
    /// The cached coordinates and motion.
    pub fix: Fix,
    /// When the fix was resolved.
    pub stored_at: DateTime<Utc>,
}

/// In-memory cache of the most recent live fix for each vehicle.
#[derive(Debug, Default)]
pub struct PositionCache {
    entries: Mutex<HashMap<String, CachedPosition>>,
}

impl PositionCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember a fix for a vehicle.
    pub fn store(&self, vehicle_id: &str, fix: Fix, at: DateTime<Utc>) {
        self.lock().insert(
            vehicle_id.to_string(),
            CachedPosition {
                fix,
                stored_at: at,
            },
        );
    }

    /// The cached entry, regardless of age.
    #[must_use]
    pub fn get(&self, vehicle_id: &str) -> Option<CachedPosition> {
        self.lock().get(vehicle_id).copied()
    }

    /// The cached fix if it is no older than `max_age` at `now`.
    #[must_use]
    pub fn fresh(&self, vehicle_id: &str, now: DateTime<Utc>, max_age: Duration) -> Option<Fix> {
        self.get(vehicle_id)
            .filter(|entry| now.signed_duration_since(entry.stored_at) <= max_age)
            .map(|entry| entry.fix)
    }

    /// Forget a vehicle.
    pub fn remove(&self, vehicle_id: &str) {
        self.lock().remove(vehicle_id);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CachedPosition>> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
