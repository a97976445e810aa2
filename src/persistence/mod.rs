//! Per-page ink and per-document marker storage
//!
//! Writes are last-write-wins per key. The viewer never calls a gateway
//! directly; everything goes through the [`SaveQueue`] so saves and loads
//! are applied in the order they were issued.

mod json_store;
mod memory;
mod queue;

pub use json_store::JsonFileStore;
pub use memory::MemoryStore;
pub use queue::{InkLoad, MarkersLoad, SaveFailure, SaveQueue};

use crate::error::PersistenceError;
use crate::ink::SerializedInk;
use crate::markers::Marker;

/// Storage key of one ink layer
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct InkKey {
    pub document_id: String,
    pub page: usize,
    pub user_id: String,
}

impl InkKey {
    pub fn new(document_id: impl Into<String>, page: usize, user_id: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            page,
            user_id: user_id.into(),
        }
    }
}

impl std::fmt::Display for InkKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/page {}/user {}",
            self.document_id, self.page, self.user_id
        )
    }
}

/// Storage backend for ink layers and markers
pub trait PersistenceGateway: Send + Sync {
    fn save_ink_layer(&self, key: &InkKey, ink: &SerializedInk) -> Result<(), PersistenceError>;

    /// `Ok(None)` when nothing was saved for the key
    fn load_ink_layer(&self, key: &InkKey) -> Result<Option<SerializedInk>, PersistenceError>;

    fn save_markers(&self, document_id: &str, markers: &[Marker]) -> Result<(), PersistenceError>;

    fn load_markers(&self, document_id: &str) -> Result<Vec<Marker>, PersistenceError>;
}
