//! Fire-and-forget persistence through a background writer task.
//!
//! The [`PersistenceStore`] handle is cheap to clone and never blocks the
//! caller on disk I/O. A single task owns the [`Storage`] and applies
//! commands in the order they were sent. Write failures are logged and
//! counted; they never reach the tick that caused them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::{Error, Result};
use crate::journey::Journey;
use crate::storage::Storage;

/// Commands accepted by the writer task.
#[derive(Debug)]
enum Command {
    SaveActive(Box<Journey>),
    Archive(Box<Journey>),
    LoadActive(oneshot::Sender<Result<Vec<Journey>>>),
    History {
        vehicle_id: Option<String>,
        limit: usize,
        reply: oneshot::Sender<Result<Vec<Journey>>>,
    },
    FindHistory {
        journey_id: String,
        reply: oneshot::Sender<Result<Option<Journey>>>,
    },
    Flush(oneshot::Sender<()>),
}

/// Handle on the background journey writer.
#[derive(Debug, Clone)]
pub struct PersistenceStore {
    tx: mpsc::UnboundedSender<Command>,
    failures: Arc<AtomicU64>,
}

impl PersistenceStore {
    /// Spawn the writer task over `storage`.
    ///
    /// The task exits once every handle has been dropped.
    #[must_use]
    pub fn spawn(storage: Storage) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let failures = Arc::new(AtomicU64::new(0));
        info!(path = %storage.path().display(), "Persistence writer starting");
        let task = tokio::spawn(run_writer(storage, rx, Arc::clone(&failures)));
        (Self { tx, failures }, task)
    }

    /// Spawn a writer over a fresh in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn in_memory() -> Result<Self> {
        let (store, _task) = Self::spawn(Storage::open_in_memory()?);
        Ok(store)
    }

    /// Queue a snapshot of an in-flight journey.
    pub fn save_active(&self, journey: &Journey) {
        self.send(Command::SaveActive(Box::new(journey.clone())));
    }

    /// Queue moving a completed journey into history.
    pub fn archive(&self, journey: &Journey) {
        self.send(Command::Archive(Box::new(journey.clone())));
    }

    /// Load every persisted in-flight journey.
    ///
    /// # Errors
    ///
    /// Returns an error if the writer is gone or the read fails.
    pub async fn load_active(&self) -> Result<Vec<Journey>> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::LoadActive(reply))?;
        rx.await.map_err(|_| writer_gone())?
    }

    /// Completed journeys, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the writer is gone or the read fails.
    pub async fn history(&self, vehicle_id: Option<&str>, limit: usize) -> Result<Vec<Journey>> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::History {
            vehicle_id: vehicle_id.map(str::to_string),
            limit,
            reply,
        })?;
        rx.await.map_err(|_| writer_gone())?
    }

    /// Look up one completed journey.
    ///
    /// # Errors
    ///
    /// Returns an error if the writer is gone or the read fails.
    pub async fn find_history(&self, journey_id: &str) -> Result<Option<Journey>> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::FindHistory {
            journey_id: journey_id.to_string(),
            reply,
        })?;
        rx.await.map_err(|_| writer_gone())?
    }

    /// Wait until every command queued so far has been applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the writer is gone.
    pub async fn flush(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Flush(reply))?;
        rx.await.map_err(|_| writer_gone())
    }

    /// How many writes have failed since start.
    #[must_use]
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    fn send(&self, command: Command) {
        if self.tx.send(command).is_err() {
            self.failures.fetch_add(1, Ordering::Relaxed);
            let err = Error::persistence("writer task is not running");
            error!(error = %err, "Dropping persistence command");
        }
    }

    fn request(&self, command: Command) -> Result<()> {
        self.tx.send(command).map_err(|_| writer_gone())
    }
}

fn writer_gone() -> Error {
    Error::internal("persistence writer task is not running")
}

async fn run_writer(
    mut storage: Storage,
    mut rx: mpsc::UnboundedReceiver<Command>,
    failures: Arc<AtomicU64>,
) {
    while let Some(command) = rx.recv().await {
        let outcome = match command {
            Command::SaveActive(journey) => storage.save_active(&journey),
            Command::Archive(journey) => storage.archive(&journey),
            Command::LoadActive(reply) => {
                let _ = reply.send(storage.load_active());
                Ok(())
            }
            Command::History {
                vehicle_id,
                limit,
                reply,
            } => {
                let _ = reply.send(storage.history(vehicle_id.as_deref(), limit));
                Ok(())
            }
            Command::FindHistory { journey_id, reply } => {
                let _ = reply.send(storage.find_history(&journey_id));
                Ok(())
            }
            Command::Flush(reply) => {
                let _ = reply.send(());
                Ok(())
            }
        };

        if let Err(e) = outcome {
            failures.fetch_add(1, Ordering::Relaxed);
            let err = Error::persistence(e.to_string());
            error!(error = %err, "Persistence write failed");
        }
    }
    debug!("Persistence writer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journey::test_support::{base_time, point};
    use crate::journey::VehicleInfo;
    use crate::summary::JourneySummary;

    fn journey(vehicle_id: &str) -> Journey {
        Journey::begin(VehicleInfo::bare(vehicle_id), point(28.61, 77.20, 0, 0.0))
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let store = PersistenceStore::in_memory().unwrap();
        let j = journey("v1");
        store.save_active(&j);

        let loaded = store.load_active().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].journey_id, j.journey_id);
    }

    #[tokio::test]
    async fn test_archive_and_find() {
        let store = PersistenceStore::in_memory().unwrap();
        let mut j = journey("v1");
        store.save_active(&j);
        let summary = JourneySummary::compute(&j);
        j.complete(base_time(), summary);
        store.archive(&j);

        assert!(store.load_active().await.unwrap().is_empty());
        let found = store.find_history(&j.journey_id).await.unwrap().unwrap();
        assert_eq!(found.journey_id, j.journey_id);
        assert_eq!(store.history(Some("v1"), 10).await.unwrap().len(), 1);
        assert_eq!(store.failure_count(), 0);
    }

    #[tokio::test]
    async fn test_write_failure_is_counted_not_propagated() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("journeys.db");
        let (store, _task) = PersistenceStore::spawn(Storage::open(&path).unwrap());

        rusqlite::Connection::open(&path)
            .unwrap()
            .execute("DROP TABLE active_journeys", [])
            .unwrap();

        store.save_active(&journey("v1"));
        store.flush().await.unwrap();
        assert_eq!(store.failure_count(), 1);
    }

    #[tokio::test]
    async fn test_closed_writer_counts_failures() {
        let storage = Storage::open_in_memory().unwrap();
        let (store, task) = PersistenceStore::spawn(storage);
        task.abort();
        let _ = task.await;

        store.save_active(&journey("v1"));
        assert_eq!(store.failure_count(), 1);
        assert!(store.load_active().await.is_err());
    }
}
