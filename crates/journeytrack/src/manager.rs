//! Journey lifecycle and the per-vehicle tick loop.
//!
//! The [`JourneyManager`] owns every in-flight journey. Each tracked vehicle
//! moves through `Idle → Active → Completed`:
//!
//! - [`JourneyManager::start`] resolves a seed position, snapshots the
//!   vehicle record and spawns a ticker task.
//! - Every tick resolves a new position and admits it only if the vehicle
//!   moved, changed speed, or has not reported for a while.
//! - [`JourneyManager::stop`] appends an end marker, computes the summary and
//!   moves the journey into history.
//!
//! Each tick claims a sequence number before it resolves. A result is applied
//! only if no later tick has been applied in the meantime and the journey it
//! was started for is still the active one, so a slow resolution can never
//! overwrite newer state or touch a stopped journey.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::alerts::{AlertDetector, AlertThresholds};
use crate::api::{with_retry, FleetApi, RetryPolicy, VehicleRecord};
use crate::clock::Clock;
use crate::dead_reckoning::{DeadReckoningEstimator, DEFAULT_SPEED_DECAY};
use crate::error::{Error, Result};
use crate::events::{JourneyUpdate, UpdateBus, UpdateKind};
use crate::health::FallbackFlag;
use crate::journey::{Journey, RoutePoint, VehicleInfo};
use crate::persistence::PersistenceStore;
use crate::resolver::{Position, PositionResolver};
use crate::summary::JourneySummary;

/// Default time between ticks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Default time between ticks while the upstream API is unhealthy.
pub const DEFAULT_FALLBACK_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Movement that admits a point, in km.
pub const DEFAULT_MIN_DISTANCE_KM: f64 = 0.01;

/// Speed change that admits a point, in km/h.
pub const DEFAULT_MIN_SPEED_CHANGE_KMH: f64 = 5.0;

/// Silence after which a point is admitted regardless, in seconds.
pub const DEFAULT_MAX_POINT_GAP_SECS: i64 = 5 * 60;

/// Poll loop and admission settings.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingSettings {
    /// Time between ticks in normal mode.
    pub poll_interval: Duration,
    /// Time between ticks in fallback mode.
    pub fallback_poll_interval: Duration,
    /// Movement in km that admits a point.
    pub min_distance_km: f64,
    /// Speed change in km/h that admits a point.
    pub min_speed_change_kmh: f64,
    /// Elapsed time that admits a point.
    pub max_point_gap: chrono::Duration,
    /// Speed multiplier for dead-reckoned points.
    pub dead_reckoning_decay: f64,
    /// Retry policy for the vehicle list lookup at start.
    pub retry: RetryPolicy,
}

impl Default for TrackingSettings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            fallback_poll_interval: DEFAULT_FALLBACK_POLL_INTERVAL,
            min_distance_km: DEFAULT_MIN_DISTANCE_KM,
            min_speed_change_kmh: DEFAULT_MIN_SPEED_CHANGE_KMH,
            max_point_gap: chrono::Duration::seconds(DEFAULT_MAX_POINT_GAP_SECS),
            dead_reckoning_decay: DEFAULT_SPEED_DECAY,
            retry: RetryPolicy::default(),
        }
    }
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A new point was appended.
    Admitted,
    /// A position was resolved but did not pass admission.
    NotAdmitted,
    /// No position could be produced this time.
    Skipped,
    /// A newer tick or a stop got there first.
    Discarded,
    /// The vehicle has no active journey.
    NotTracked,
}

#[derive(Debug)]
struct Tracked {
    journey: Journey,
    next_seq: u64,
    applied_seq: u64,
    ticker: Option<JoinHandle<()>>,
}

impl Tracked {
    fn new(journey: Journey) -> Self {
        Self {
            journey,
            next_seq: 0,
            applied_seq: 0,
            ticker: None,
        }
    }
}

/// A tick that has claimed its sequence number but not yet resolved.
#[derive(Debug, Clone)]
struct TickTicket {
    seq: u64,
    journey_id: String,
    last: RoutePoint,
}

/// Owns and drives every in-flight journey.
#[derive(Debug)]
pub struct JourneyManager {
    api: Arc<dyn FleetApi>,
    resolver: PositionResolver,
    estimator: DeadReckoningEstimator,
    detector: AlertDetector,
    clock: Arc<dyn Clock>,
    persistence: PersistenceStore,
    fallback: FallbackFlag,
    updates: UpdateBus,
    settings: TrackingSettings,
    tracked: Mutex<HashMap<String, Tracked>>,
    history: Mutex<Vec<Journey>>,
}

impl JourneyManager {
    /// Assemble a manager. No ticker runs until a journey is started or
    /// recovered.
    #[must_use]
    pub fn new(
        api: Arc<dyn FleetApi>,
        resolver: PositionResolver,
        clock: Arc<dyn Clock>,
        persistence: PersistenceStore,
        fallback: FallbackFlag,
        settings: TrackingSettings,
        thresholds: AlertThresholds,
    ) -> Arc<Self> {
        Arc::new(Self {
            api,
            resolver,
            estimator: DeadReckoningEstimator::new(settings.dead_reckoning_decay),
            detector: AlertDetector::new(thresholds),
            clock,
            persistence,
            fallback,
            updates: UpdateBus::default(),
            settings,
            tracked: Mutex::new(HashMap::new()),
            history: Mutex::new(Vec::new()),
        })
    }

    /// Receive every journey update from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<JourneyUpdate> {
        self.updates.subscribe()
    }

    /// The persistence handle this manager writes through.
    #[must_use]
    pub fn persistence(&self) -> &PersistenceStore {
        &self.persistence
    }

    /// Whether the engine is currently in fallback mode.
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        self.fallback.is_active()
    }

    /// Snapshot of a vehicle's active journey.
    #[must_use]
    pub fn active_journey(&self, vehicle_id: &str) -> Option<Journey> {
        self.lock_tracked()
            .get(vehicle_id)
            .map(|t| t.journey.clone())
    }

    /// Vehicles with an active journey, sorted.
    #[must_use]
    pub fn active_vehicles(&self) -> Vec<String> {
        let mut vehicles: Vec<String> = self.lock_tracked().keys().cloned().collect();
        vehicles.sort();
        vehicles
    }

    /// Journeys completed by this manager, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<Journey> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Time the ticker waits before the next tick.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        if self.fallback.is_active() {
            self.settings.fallback_poll_interval
        } else {
            self.settings.poll_interval
        }
    }

    /// Begin tracking a vehicle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateTrackingRequest`] if the vehicle already has
    /// an active journey, or [`Error::AllSourcesExhausted`] if no seed
    /// position could be resolved.
    pub async fn start(self: &Arc<Self>, vehicle_id: &str) -> Result<Journey> {
        if self.lock_tracked().contains_key(vehicle_id) {
            return Err(duplicate(vehicle_id));
        }

        let position = self.resolver.resolve(vehicle_id).await?;
        let info = self.vehicle_info(vehicle_id).await;
        let mut journey = Journey::begin(info, position.into_route_point(self.clock.now()));
        if self.fallback.is_active() {
            journey.fallback_mode_used = true;
        }

        {
            let mut tracked = self.lock_tracked();
            if tracked.contains_key(vehicle_id) {
                return Err(duplicate(vehicle_id));
            }
            tracked.insert(vehicle_id.to_string(), Tracked::new(journey.clone()));
            self.persistence.save_active(&journey);
        }

        self.updates.publish(&journey, UpdateKind::Started);
        self.spawn_ticker(vehicle_id, &journey.journey_id);
        info!(
            vehicle_id,
            journey_id = %journey.journey_id,
            source = %position.source,
            "Journey started"
        );
        Ok(journey)
    }

    /// Run one tick for a vehicle.
    ///
    /// The ticker task calls this on every interval; it is public so callers
    /// can drive a journey without timers.
    pub async fn tick(&self, vehicle_id: &str) -> TickOutcome {
        let Some(ticket) = self.claim_tick(vehicle_id) else {
            return TickOutcome::NotTracked;
        };

        let position = match self.resolver.resolve(vehicle_id).await {
            Ok(position) => position,
            Err(e) if e.is_sources_exhausted() && self.fallback.is_active() => {
                debug!(vehicle_id, "Dead reckoning from last point");
                self.estimator.estimate(&ticket.last, self.clock.now())
            }
            Err(e) => {
                warn!(vehicle_id, error = %e, "Skipping tick");
                return TickOutcome::Skipped;
            }
        };

        self.apply(vehicle_id, &ticket, position, self.clock.now())
    }

    /// End a vehicle's journey and return it sealed.
    ///
    /// A final position is resolved and appended as the end marker without
    /// admission filtering. Start and end addresses are looked up on a best
    /// effort basis.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoActiveJourney`] if the vehicle is not being tracked.
    pub async fn stop(&self, vehicle_id: &str) -> Result<Journey> {
        let (journey_id, seed, last) = {
            let tracked = self.lock_tracked();
            let journey = tracked
                .get(vehicle_id)
                .map(|t| &t.journey)
                .filter(|j| j.is_active())
                .ok_or_else(|| no_active(vehicle_id))?;
            match (journey.route_points.first(), journey.last_point()) {
                (Some(seed), Some(last)) => {
                    (journey.journey_id.clone(), seed.clone(), last.clone())
                }
                _ => return Err(Error::internal("active journey has no points")),
            }
        };

        let resolved = match self.resolver.resolve(vehicle_id).await {
            Ok(position) => Some(position),
            Err(e) => {
                warn!(vehicle_id, error = %e, "No final position, reusing last point");
                None
            }
        };
        let now = self.clock.now();
        let mut end = match resolved {
            Some(position) => position.into_route_point(now),
            None if self.fallback.is_active() => {
                self.estimator.estimate(&last, now).into_route_point(now)
            }
            None => RoutePoint {
                timestamp: now,
                address: None,
                ..last
            },
        };

        let start_address = self.lookup_address(seed.latitude, seed.longitude).await;
        end.address = self.lookup_address(end.latitude, end.longitude).await;

        let (journey, ticker) = {
            let mut tracked = self.lock_tracked();
            let still_ours = tracked
                .get(vehicle_id)
                .is_some_and(|t| t.journey.journey_id == journey_id);
            let Some(mut entry) = still_ours.then(|| tracked.remove(vehicle_id)).flatten()
            else {
                return Err(no_active(vehicle_id));
            };

            let journey = &mut entry.journey;
            if let Some(last) = journey.last_point() {
                end.timestamp = end.timestamp.max(last.timestamp);
                let alerts = self.detector.evaluate(last, &end);
                journey.record_alerts(alerts);
            }
            let end_time = end.timestamp;
            journey.append_point(end);
            let mut summary = JourneySummary::compute(journey);
            if summary.start_address.is_none() {
                summary.start_address = start_address;
            }
            journey.complete(end_time, summary);
            self.persistence.archive(journey);
            (entry.journey, entry.ticker)
        };

        if let Some(ticker) = ticker {
            ticker.abort();
        }
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(journey.clone());
        self.updates.publish(&journey, UpdateKind::Completed);
        info!(
            vehicle_id,
            journey_id = %journey.journey_id,
            points = journey.route_points.len(),
            distance_km = journey.total_distance,
            "Journey completed"
        );
        Ok(journey)
    }

    /// Stop each listed vehicle, carrying on past failures.
    ///
    /// Vehicles without an active journey are skipped quietly; other
    /// failures are logged. Returns the journeys that were sealed.
    pub async fn stop_all(&self, vehicle_ids: &[String]) -> Vec<Journey> {
        let mut completed = Vec::with_capacity(vehicle_ids.len());
        for vehicle_id in vehicle_ids {
            match self.stop(vehicle_id).await {
                Ok(journey) => completed.push(journey),
                Err(e) if e.is_caller_error() => {}
                Err(e) => warn!(vehicle_id = %vehicle_id, error = %e, "Failed to stop journey"),
            }
        }
        completed
    }

    /// Reload persisted in-flight journeys and resume their tick loops.
    ///
    /// Vehicles already tracked by this manager are left alone.
    ///
    /// # Errors
    ///
    /// Returns an error if the persisted journeys cannot be read.
    pub async fn recover(self: &Arc<Self>) -> Result<Vec<Journey>> {
        let persisted = self.persistence.load_active().await?;
        let mut resumed = Vec::new();

        for journey in persisted {
            if !journey.is_active() || journey.route_points.is_empty() {
                warn!(journey_id = %journey.journey_id, "Ignoring unusable persisted journey");
                continue;
            }
            let vehicle_id = journey.vehicle_id.clone();
            {
                let mut tracked = self.lock_tracked();
                if tracked.contains_key(&vehicle_id) {
                    continue;
                }
                tracked.insert(vehicle_id.clone(), Tracked::new(journey.clone()));
            }
            self.spawn_ticker(&vehicle_id, &journey.journey_id);
            self.updates.publish(&journey, UpdateKind::Resumed);
            info!(
                vehicle_id = %vehicle_id,
                journey_id = %journey.journey_id,
                points = journey.route_points.len(),
                "Journey resumed"
            );
            resumed.push(journey);
        }

        Ok(resumed)
    }

    /// Stop every ticker and flush pending writes.
    ///
    /// Active journeys stay persisted so a later [`recover`](Self::recover)
    /// picks them up again. Returns how many journeys were suspended.
    ///
    /// # Errors
    ///
    /// Returns an error if the persistence writer is gone.
    pub async fn shutdown(&self) -> Result<usize> {
        let drained: Vec<Tracked> = self.lock_tracked().drain().map(|(_, t)| t).collect();
        for entry in &drained {
            if let Some(ticker) = &entry.ticker {
                ticker.abort();
            }
            self.persistence.save_active(&entry.journey);
        }
        self.persistence.flush().await?;
        info!(suspended = drained.len(), "Journey manager shut down");
        Ok(drained.len())
    }

    fn lock_tracked(&self) -> MutexGuard<'_, HashMap<String, Tracked>> {
        self.tracked.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn claim_tick(&self, vehicle_id: &str) -> Option<TickTicket> {
        let mut tracked = self.lock_tracked();
        let entry = tracked.get_mut(vehicle_id)?;
        let last = entry.journey.last_point()?.clone();
        entry.next_seq += 1;
        Some(TickTicket {
            seq: entry.next_seq,
            journey_id: entry.journey.journey_id.clone(),
            last,
        })
    }

    fn apply(
        &self,
        vehicle_id: &str,
        ticket: &TickTicket,
        position: Position,
        now: DateTime<Utc>,
    ) -> TickOutcome {
        let snapshot = {
            let mut tracked = self.lock_tracked();
            let Some(entry) = tracked.get_mut(vehicle_id) else {
                return TickOutcome::Discarded;
            };
            if entry.journey.journey_id != ticket.journey_id
                || !entry.journey.is_active()
                || ticket.seq <= entry.applied_seq
            {
                debug!(vehicle_id, seq = ticket.seq, "Discarding stale tick");
                return TickOutcome::Discarded;
            }
            entry.applied_seq = ticket.seq;

            let Some(last) = entry.journey.last_point() else {
                return TickOutcome::Discarded;
            };
            let candidate = position.into_route_point(now.max(last.timestamp));
            if !self.should_admit(last, &candidate) {
                return TickOutcome::NotAdmitted;
            }

            let alerts = self.detector.evaluate(last, &candidate);
            if !entry.journey.append_point(candidate) {
                return TickOutcome::Discarded;
            }
            for alert in &alerts {
                info!(vehicle_id, alert = alert.kind.type_name(), severity = ?alert.severity, "Alert raised");
            }
            entry.journey.record_alerts(alerts);
            if self.fallback.is_active() {
                entry.journey.fallback_mode_used = true;
            }
            // queued under the lock so the writer never sees this snapshot
            // after the archive of the same journey
            self.persistence.save_active(&entry.journey);
            entry.journey.clone()
        };

        self.updates.publish(&snapshot, UpdateKind::PointAdded);
        debug!(
            vehicle_id,
            points = snapshot.route_points.len(),
            source = %position.source,
            "Point admitted"
        );
        TickOutcome::Admitted
    }

    fn should_admit(&self, last: &RoutePoint, candidate: &RoutePoint) -> bool {
        let moved = last.distance_to(candidate) > self.settings.min_distance_km;
        let speed_changed =
            (candidate.speed - last.speed).abs() > self.settings.min_speed_change_kmh;
        let overdue = candidate.timestamp - last.timestamp > self.settings.max_point_gap;
        moved || speed_changed || overdue
    }

    fn spawn_ticker(self: &Arc<Self>, vehicle_id: &str, journey_id: &str) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let vehicle = vehicle_id.to_string();
        let handle = tokio::spawn(async move {
            loop {
                let Some(interval) = weak.upgrade().map(|m| m.poll_interval()) else {
                    break;
                };
                tokio::time::sleep(interval).await;
                let Some(manager) = weak.upgrade() else {
                    break;
                };
                if manager.tick(&vehicle).await == TickOutcome::NotTracked {
                    break;
                }
            }
            debug!(vehicle_id = %vehicle, "Ticker stopped");
        });

        let mut tracked = self.lock_tracked();
        match tracked.get_mut(vehicle_id) {
            Some(entry) if entry.journey.journey_id == journey_id => {
                if let Some(previous) = entry.ticker.replace(handle) {
                    previous.abort();
                }
            }
            _ => handle.abort(),
        }
    }

    async fn vehicle_info(&self, vehicle_id: &str) -> VehicleInfo {
        let record = match self.api.vehicle(vehicle_id).await {
            Ok(record) => Some(record),
            Err(e) => {
                debug!(vehicle_id, error = %e, "Vehicle lookup failed, trying vehicle list");
                with_retry(&self.settings.retry, "list vehicles", || self.api.list_vehicles())
                    .await
                    .ok()
                    .and_then(|vehicles| vehicles.into_iter().find(|v| v.id == vehicle_id))
            }
        };
        record.map_or_else(|| VehicleInfo::bare(vehicle_id), vehicle_info_from)
    }

    async fn lookup_address(&self, latitude: f64, longitude: f64) -> Option<String> {
        match self.api.reverse_geocode(latitude, longitude).await {
            Ok(address) => address,
            Err(e) => {
                debug!(latitude, longitude, error = %e, "Reverse geocoding failed");
                None
            }
        }
    }
}

fn vehicle_info_from(record: VehicleRecord) -> VehicleInfo {
    VehicleInfo {
        id: record.id,
        name: record.name,
        registration: record.registration,
        device_id: record.device_id,
    }
}

fn duplicate(vehicle_id: &str) -> Error {
    Error::DuplicateTrackingRequest {
        vehicle_id: vehicle_id.to_string(),
    }
}

fn no_active(vehicle_id: &str) -> Error {
    Error::NoActiveJourney {
        vehicle_id: vehicle_id.to_string(),
    }
}
