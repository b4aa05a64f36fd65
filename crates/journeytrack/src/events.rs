//! Journey update notifications.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

use crate::journey::Journey;

/// Default capacity of the update channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// What changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    /// A journey was created.
    Started,
    /// A point was admitted.
    PointAdded,
    /// A persisted journey was reloaded after restart.
    Resumed,
    /// The journey was sealed.
    Completed,
}

/// A snapshot of a journey after a change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JourneyUpdate {
    /// The vehicle the journey belongs to.
    pub vehicle_id: String,
    /// The journey as it stands after the change.
    pub journey: Journey,
    /// What happened.
    pub kind: UpdateKind,
}

/// Fan-out of [`JourneyUpdate`]s to any number of subscribers.
#[derive(Debug, Clone)]
pub struct UpdateBus {
    tx: broadcast::Sender<JourneyUpdate>,
}

impl Default for UpdateBus {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl UpdateBus {
    /// Create a bus holding up to `capacity` unread updates per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to future updates.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<JourneyUpdate> {
        self.tx.subscribe()
    }

    /// Publish an update. Having no subscribers is not an error.
    pub fn publish(&self, journey: &Journey, kind: UpdateKind) {
        let update = JourneyUpdate {
            vehicle_id: journey.vehicle_id.clone(),
            journey: journey.clone(),
            kind,
        };
        let receivers = self.tx.send(update).unwrap_or(0);
        trace!(vehicle_id = %journey.vehicle_id, ?kind, receivers, "Journey update published");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journey::test_support::point;
    use crate::journey::VehicleInfo;

    #[tokio::test]
    async fn test_publish_reaches_subscribers() {
        let bus = UpdateBus::default();
        let mut rx = bus.subscribe();
        let journey = Journey::begin(VehicleInfo::bare("v1"), point(28.6, 77.2, 0, 0.0));

        bus.publish(&journey, UpdateKind::Started);

        let update = rx.recv().await.unwrap();
        assert_eq!(update.vehicle_id, "v1");
        assert_eq!(update.kind, UpdateKind::Started);
        assert_eq!(update.journey.journey_id, journey.journey_id);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = UpdateBus::new(4);
        let journey = Journey::begin(VehicleInfo::bare("v1"), point(28.6, 77.2, 0, 0.0));
        bus.publish(&journey, UpdateKind::PointAdded);
    }
}
