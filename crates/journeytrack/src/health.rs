//! Upstream health probing and the global fallback flag.
//!
//! The [`HealthMonitor`] probes the fleet API's health endpoint on a fixed
//! interval. A failed probe puts the engine into fallback mode, a successful
//! one clears it. Fallback mode lengthens the poll interval and allows dead
//! reckoning when no source can produce a fix.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::FleetApi;

/// Default interval between health probes.
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(30);

/// A cheap, cloneable handle on the shared fallback flag.
#[derive(Debug, Clone, Default)]
pub struct FallbackFlag {
    active: Arc<AtomicBool>,
}

impl FallbackFlag {
    /// Create a cleared flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether fallback mode is on.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Set the flag, returning the previous value.
    pub fn set(&self, active: bool) -> bool {
        self.active.swap(active, Ordering::SeqCst)
    }
}

/// Periodically probes the upstream API and toggles fallback mode.
#[derive(Debug)]
pub struct HealthMonitor {
    api: Arc<dyn FleetApi>,
    flag: FallbackFlag,
    interval: Duration,
}

impl HealthMonitor {
    /// Create a monitor that probes every `interval`.
    #[must_use]
    pub fn new(api: Arc<dyn FleetApi>, interval: Duration) -> Self {
        Self {
            api,
            flag: FallbackFlag::new(),
            interval,
        }
    }

    /// A handle on the fallback flag this monitor drives.
    #[must_use]
    pub fn flag(&self) -> FallbackFlag {
        self.flag.clone()
    }

    /// Whether the engine is currently in fallback mode.
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        self.flag.is_active()
    }

    /// Force fallback mode on or off.
    pub fn set_fallback(&self, active: bool) {
        self.transition(active, None);
    }

    /// The configured probe interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Probe once and update the flag. Returns whether the API is healthy.
    pub async fn probe_once(&self) -> bool {
        match self.api.health().await {
            Ok(()) => {
                debug!("Health probe succeeded");
                self.transition(false, None);
                true
            }
            Err(e) => {
                debug!(error = %e, "Health probe failed");
                self.transition(true, Some(&e.to_string()));
                false
            }
        }
    }

    /// Spawn the probe loop. The first probe runs immediately.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            info!(
                interval_secs = monitor.interval.as_secs(),
                "Health monitor starting"
            );
            let mut ticker = tokio::time::interval(monitor.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                monitor.probe_once().await;
            }
        })
    }

    fn transition(&self, active: bool, reason: Option<&str>) {
        let was_active = self.flag.set(active);
        match (was_active, active) {
            (false, true) => warn!(
                reason = reason.unwrap_or("forced"),
                "Upstream unhealthy, entering fallback mode"
            ),
            (true, false) => info!("Upstream healthy again, leaving fallback mode"),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::FakeFleetApi;

    #[test]
    fn test_fallback_flag_shared_between_clones() {
        let flag = FallbackFlag::new();
        let other = flag.clone();
        assert!(!other.is_active());

        assert!(!flag.set(true));
        assert!(other.is_active());
        assert!(other.set(false));
        assert!(!flag.is_active());
    }

    #[tokio::test]
    async fn test_probe_toggles_fallback() {
        let api = Arc::new(FakeFleetApi::new());
        let monitor = HealthMonitor::new(Arc::clone(&api) as Arc<dyn FleetApi>, DEFAULT_PROBE_INTERVAL);
        assert!(!monitor.is_fallback());

        api.set_unhealthy(true);
        assert!(!monitor.probe_once().await);
        assert!(monitor.is_fallback());

        api.set_unhealthy(false);
        assert!(monitor.probe_once().await);
        assert!(!monitor.is_fallback());
    }

    #[tokio::test]
    async fn test_set_fallback_visible_through_flag() {
        let monitor = HealthMonitor::new(Arc::new(FakeFleetApi::new()), DEFAULT_PROBE_INTERVAL);
        let flag = monitor.flag();
        monitor.set_fallback(true);
        assert!(flag.is_active());
        monitor.set_fallback(false);
        assert!(!flag.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_loop_runs_on_interval() {
        let api = Arc::new(FakeFleetApi::new());
        api.set_offline(true);
        let monitor = Arc::new(HealthMonitor::new(
            Arc::clone(&api) as Arc<dyn FleetApi>,
            Duration::from_secs(30),
        ));
        let task = monitor.start();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(monitor.is_fallback());
        assert_eq!(api.health_calls.load(Ordering::SeqCst), 1);

        api.set_offline(false);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(!monitor.is_fallback());
        assert_eq!(api.health_calls.load(Ordering::SeqCst), 2);

        task.abort();
    }
}
