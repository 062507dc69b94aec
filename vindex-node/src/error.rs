use thiserror::Error;

use vindex_chain::error::ChainError;

/// Errors that can occur in the node.
#[derive(Debug, Error)]
#[allow(clippy::enum_variant_names)]
pub enum NodeError {
    #[error("config error: {reason}")]
    ConfigError { reason: String },

    #[error("genesis error: {reason}")]
    GenesisError { reason: String },

    #[error("storage error: {0}")]
    StorageError(#[from] vindex_storage::error::StorageError),

    #[error("chain error: {0}")]
    ChainError(#[from] ChainError),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("node is not running")]
    Stopped,
}
