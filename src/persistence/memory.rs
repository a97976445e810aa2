use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use super::{InkKey, PersistenceGateway};
use crate::error::PersistenceError;
use crate::ink::SerializedInk;
use crate::markers::Marker;

/// In-process store, for hosts without a backend and for tests.
///
/// `set_failing(true)` makes every call fail, to exercise error paths.
#[derive(Debug, Default)]
pub struct MemoryStore {
    ink: Mutex<HashMap<InkKey, SerializedInk>>,
    markers: Mutex<HashMap<String, Vec<Marker>>>,
    failing: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of successful saves so far
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn ink(&self, key: &InkKey) -> Option<SerializedInk> {
        self.ink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn check(&self) -> Result<(), PersistenceError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(PersistenceError::Unavailable("memory store set to fail".into()))
        } else {
            Ok(())
        }
    }
}

impl PersistenceGateway for MemoryStore {
    fn save_ink_layer(&self, key: &InkKey, ink: &SerializedInk) -> Result<(), PersistenceError> {
        self.check()?;
        self.ink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), ink.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn load_ink_layer(&self, key: &InkKey) -> Result<Option<SerializedInk>, PersistenceError> {
        self.check()?;
        Ok(self.ink(key))
    }

    fn save_markers(&self, document_id: &str, markers: &[Marker]) -> Result<(), PersistenceError> {
        self.check()?;
        self.markers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(document_id.to_string(), markers.to_vec());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn load_markers(&self, document_id: &str) -> Result<Vec<Marker>, PersistenceError> {
        self.check()?;
        Ok(self
            .markers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(document_id)
            .cloned()
            .unwrap_or_default())
    }
}
