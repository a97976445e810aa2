//! Background persistence worker
//!
//! A single thread applies jobs in submission order, so a load issued after
//! a save of the same key always observes that save.

use std::sync::Arc;
use std::thread::JoinHandle;

use flume::{Receiver, Sender};

use super::{InkKey, PersistenceGateway};
use crate::error::PersistenceError;
use crate::ink::SerializedInk;
use crate::markers::Marker;

pub type InkLoad = Receiver<Result<Option<SerializedInk>, PersistenceError>>;
pub type MarkersLoad = Receiver<Result<Vec<Marker>, PersistenceError>>;

/// A save that did not reach storage
#[derive(Debug)]
pub struct SaveFailure {
    /// What was being saved, for the notice shown to the user
    pub target: String,
    pub error: PersistenceError,
}

enum Job {
    SaveInk {
        key: InkKey,
        ink: SerializedInk,
    },
    SaveMarkers {
        document_id: String,
        markers: Vec<Marker>,
    },
    LoadInk {
        key: InkKey,
        reply: Sender<Result<Option<SerializedInk>, PersistenceError>>,
    },
    LoadMarkers {
        document_id: String,
        reply: Sender<Result<Vec<Marker>, PersistenceError>>,
    },
    Flush(Sender<()>),
    Shutdown,
}

/// Fire-and-forget saves and asynchronous loads against a
/// [`PersistenceGateway`]
pub struct SaveQueue {
    jobs: Sender<Job>,
    failures: Receiver<SaveFailure>,
    worker: Option<JoinHandle<()>>,
}

impl SaveQueue {
    pub fn new(gateway: Arc<dyn PersistenceGateway>) -> Self {
        let (jobs_tx, jobs_rx) = flume::unbounded();
        let (failures_tx, failures_rx) = flume::unbounded();

        let worker = std::thread::Builder::new()
            .name("pageink-persistence".into())
            .spawn(move || persistence_worker(gateway, jobs_rx, failures_tx))
            .map_err(|e| log::error!("Failed to start persistence worker: {e}"))
            .ok();

        Self {
            jobs: jobs_tx,
            failures: failures_rx,
            worker,
        }
    }

    pub fn save_ink(&self, key: InkKey, ink: SerializedInk) {
        self.submit(Job::SaveInk { key, ink });
    }

    pub fn save_markers(&self, document_id: impl Into<String>, markers: Vec<Marker>) {
        self.submit(Job::SaveMarkers {
            document_id: document_id.into(),
            markers,
        });
    }

    /// Start loading an ink layer; the result arrives on the returned channel
    pub fn load_ink(&self, key: InkKey) -> InkLoad {
        let (reply, rx) = flume::bounded(1);
        self.submit(Job::LoadInk { key, reply });
        rx
    }

    pub fn load_markers(&self, document_id: impl Into<String>) -> MarkersLoad {
        let (reply, rx) = flume::bounded(1);
        self.submit(Job::LoadMarkers {
            document_id: document_id.into(),
            reply,
        });
        rx
    }

    /// Block until every job submitted so far has been applied
    pub fn flush(&self) {
        let (done_tx, done_rx) = flume::bounded(1);
        self.submit(Job::Flush(done_tx));
        let _ = done_rx.recv();
    }

    /// Failures reported by the worker since the last call
    pub fn drain_failures(&self) -> Vec<SaveFailure> {
        self.failures.try_iter().collect()
    }

    fn submit(&self, job: Job) {
        if self.jobs.send(job).is_err() {
            log::error!("Persistence worker is gone; dropping job");
        }
    }
}

impl Drop for SaveQueue {
    fn drop(&mut self) {
        let _ = self.jobs.send(Job::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn persistence_worker(
    gateway: Arc<dyn PersistenceGateway>,
    jobs: Receiver<Job>,
    failures: Sender<SaveFailure>,
) {
    for job in jobs {
        match job {
            Job::SaveInk { key, ink } => {
                if let Err(error) = gateway.save_ink_layer(&key, &ink) {
                    log::warn!("Saving ink for {key} failed: {error}");
                    let _ = failures.send(SaveFailure {
                        target: format!("ink for page {}", key.page),
                        error,
                    });
                }
            }
            Job::SaveMarkers {
                document_id,
                markers,
            } => {
                if let Err(error) = gateway.save_markers(&document_id, &markers) {
                    log::warn!("Saving markers of {document_id} failed: {error}");
                    let _ = failures.send(SaveFailure {
                        target: "markers".to_string(),
                        error,
                    });
                }
            }
            Job::LoadInk { key, reply } => {
                let _ = reply.send(gateway.load_ink_layer(&key));
            }
            Job::LoadMarkers { document_id, reply } => {
                let _ = reply.send(gateway.load_markers(&document_id));
            }
            Job::Flush(done) => {
                let _ = done.send(());
            }
            Job::Shutdown => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;

    #[test]
    fn load_observes_earlier_save() {
        let store = Arc::new(MemoryStore::new());
        let queue = SaveQueue::new(store.clone());
        let key = InkKey::new("doc", 1, "u");

        let mut ink = SerializedInk::empty();
        ink.strokes.push(crate::ink::SerializedStroke {
            id: 7,
            mode: crate::ink::StrokeMode::Pen,
            color: crate::ink::Color::BLACK,
            width: 1.0,
            points: vec![],
        });
        queue.save_ink(key.clone(), ink);
        let loaded = queue.load_ink(key).recv().unwrap().unwrap().unwrap();

        assert_eq!(loaded.strokes[0].id, 7);
    }

    #[test]
    fn failed_saves_are_reported_not_raised() {
        let store = Arc::new(MemoryStore::new());
        store.set_failing(true);
        let queue = SaveQueue::new(store.clone());

        queue.save_markers("doc", vec![]);
        queue.flush();

        let failures = queue.drain_failures();
        assert_eq!(failures.len(), 1);
        assert!(matches!(
            failures[0].error,
            PersistenceError::Unavailable(_)
        ));
        assert!(queue.drain_failures().is_empty());
    }

    #[test]
    fn flush_waits_for_pending_saves() {
        let store = Arc::new(MemoryStore::new());
        let queue = SaveQueue::new(store.clone());
        for page in 1..=20 {
            queue.save_ink(InkKey::new("doc", page, "u"), SerializedInk::empty());
        }
        queue.flush();
        assert_eq!(store.save_count(), 20);
    }
}
