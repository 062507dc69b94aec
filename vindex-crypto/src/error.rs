use thiserror::Error;

/// Errors from key handling and signature checks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("invalid key material: {reason}")]
    InvalidKey { reason: String },

    #[error("invalid signature at index {index}")]
    InvalidSignature { index: usize },

    #[error("batch length mismatch")]
    LengthMismatch,
}
