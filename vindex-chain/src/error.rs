use thiserror::Error;

use vindex_storage::error::StorageError;
use vindex_types::error::{ConfigError, ConsensusError, ValidationError};
use vindex_types::primitives::Height;

/// Errors surfaced by the chain engine.
///
/// `Validation` and `Consensus` are recoverable; `Storage`, `CorruptState` and
/// `InvariantViolation` are fatal and the node stops producing blocks.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("consensus error: {0}")]
    Consensus(#[from] ConsensusError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("invalid block: {reason}")]
    InvalidBlock { reason: String },

    #[error("state at height {height} is not retained")]
    HeightUnavailable { height: Height },

    #[error("mempool full")]
    MempoolFull,

    #[error("transaction already in mempool")]
    DuplicateTransaction,

    #[error("state invariant violated: {reason}")]
    InvariantViolation { reason: String },

    #[error("corrupt state: {reason}")]
    CorruptState { reason: String },
}

impl ChainError {
    /// Whether the node must stop instead of retrying.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ChainError::Storage(_)
                | ChainError::CorruptState { .. }
                | ChainError::InvariantViolation { .. }
        )
    }
}
