use thiserror::Error;

use crate::domain::{ItemId, ItemStatus};

/// A status change the state machine does not allow. `pending ->
/// publishing -> published | failed` is the whole grammar; `failed ->
/// pending` exists only for operator-initiated retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid status transition {from:?} -> {to:?}")]
pub struct TransitionError {
    pub from: ItemStatus,
    pub to: ItemStatus,
}

impl TransitionError {
    pub fn new(from: ItemStatus, to: ItemStatus) -> Self {
        Self { from, to }
    }
}

#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    #[error("duplicate item id in catalog: {0}")]
    DuplicateItem(ItemId),
}
