use thiserror::Error;

use crate::primitives::{Amount, Height, Round, Timestamp};
use crate::validator::ValidatorStatus;

/// Rejection of a single transaction, at admission or during block application.
///
/// A validation error never affects the other transactions of a block.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    // ─── Envelope ────────────────────────────────────────────────────────────
    #[error("malformed transaction: {reason}")]
    Malformed { reason: String },

    #[error("invalid signature")]
    InvalidSignature,

    #[error("bad nonce: expected {expected}, got {actual}")]
    BadNonce { expected: u64, actual: u64 },

    #[error("rejected by compliance screening: {reason}")]
    ComplianceRejected { reason: String },

    // ─── Ledger ──────────────────────────────────────────────────────────────
    #[error("insufficient funds: have {available} {denom}, need {required}")]
    InsufficientFunds {
        denom: String,
        available: Amount,
        required: Amount,
    },

    #[error("invalid amount: amount must be positive")]
    InvalidAmount,

    #[error("amount overflow")]
    Overflow,

    #[error("duplicate denom: {symbol}")]
    DuplicateDenom { symbol: String },

    #[error("unknown denom: {symbol}")]
    UnknownDenom { symbol: String },

    #[error("denom {symbol} is not mintable")]
    NotMintable { symbol: String },

    #[error("fee split percentages sum to {total}, expected 100")]
    InvalidFeeSplit { total: u64 },

    // ─── Staking ─────────────────────────────────────────────────────────────
    #[error("unknown validator: {address}")]
    UnknownValidator { address: String },

    #[error("validator already exists: {address}")]
    DuplicateValidator { address: String },

    #[error("insufficient shares: have {available}, requested {requested}")]
    InsufficientShares { available: u128, requested: u128 },

    #[error("illegal validator status transition: {from} -> {to}")]
    IllegalStatusTransition {
        from: ValidatorStatus,
        to: ValidatorStatus,
    },

    // ─── Domains ─────────────────────────────────────────────────────────────
    #[error("invalid name: {reason}")]
    InvalidName { reason: String },

    #[error("domain already registered: {name}")]
    DomainTaken { name: String },

    #[error("domain not found: {name}")]
    DomainNotFound { name: String },

    #[error("domain {name} expired at {expiry}")]
    DomainExpired { name: String, expiry: Timestamp },

    #[error("caller is not the owner")]
    NotOwner,
}

impl ValidationError {
    /// Stable machine-readable kind, reported to the submitting layer.
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationError::Malformed { .. } => "malformed",
            ValidationError::InvalidSignature => "invalid_signature",
            ValidationError::BadNonce { .. } => "bad_nonce",
            ValidationError::ComplianceRejected { .. } => "compliance_rejected",
            ValidationError::InsufficientFunds { .. } => "insufficient_funds",
            ValidationError::InvalidAmount => "invalid_amount",
            ValidationError::Overflow => "overflow",
            ValidationError::DuplicateDenom { .. } => "duplicate_denom",
            ValidationError::UnknownDenom { .. } => "unknown_denom",
            ValidationError::NotMintable { .. } => "not_mintable",
            ValidationError::InvalidFeeSplit { .. } => "invalid_fee_split",
            ValidationError::UnknownValidator { .. } => "unknown_validator",
            ValidationError::DuplicateValidator { .. } => "duplicate_validator",
            ValidationError::InsufficientShares { .. } => "insufficient_shares",
            ValidationError::IllegalStatusTransition { .. } => "illegal_status_transition",
            ValidationError::InvalidName { .. } => "invalid_name",
            ValidationError::DomainTaken { .. } => "domain_taken",
            ValidationError::DomainNotFound { .. } => "domain_not_found",
            ValidationError::DomainExpired { .. } => "domain_expired",
            ValidationError::NotOwner => "not_owner",
        }
    }
}

/// A consensus message that cannot be used. The round continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsensusError {
    #[error("proposal from unscheduled proposer at height {height} round {round}")]
    InvalidProposer { height: Height, round: Round },

    #[error("invalid consensus signature")]
    InvalidSignature,

    #[error("vote from a validator outside the active set")]
    UnknownVoter,

    #[error("stale message for height {height} round {round}, at height {current_height} round {current_round}")]
    StaleMessage {
        height: Height,
        round: Round,
        current_height: Height,
        current_round: Round,
    },

    #[error("insufficient quorum: have {have}, need {need}")]
    InsufficientQuorum { have: Amount, need: Amount },

    #[error("invalid evidence: {reason}")]
    InvalidEvidence { reason: String },

    #[error("no active validators")]
    EmptyValidatorSet,
}

/// Invalid chain parameters or genesis. The node refuses to start.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("fee split percentages sum to {total}, expected 100")]
    InvalidFeeSplit { total: u64 },

    #[error("min validators {min} exceeds max validators {max}")]
    ValidatorBounds { min: u32, max: u32 },

    #[error("genesis has {count} validators, expected between {min} and {max}")]
    ValidatorCount { count: usize, min: u32, max: u32 },

    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("invalid genesis: {reason}")]
    InvalidGenesis { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_kind_and_message() {
        let err = ValidationError::InsufficientFunds {
            denom: "oc".to_string(),
            available: 5,
            required: 10,
        };
        assert_eq!(err.kind(), "insufficient_funds");
        assert!(err.to_string().contains("have 5 oc"));
    }

    #[test]
    fn test_illegal_transition_display() {
        let err = ValidationError::IllegalStatusTransition {
            from: ValidatorStatus::Jailed,
            to: ValidatorStatus::Bonded,
        };
        assert_eq!(
            err.to_string(),
            "illegal validator status transition: jailed -> bonded"
        );
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::ValidatorBounds { min: 10, max: 4 };
        assert!(err.to_string().contains("min validators 10"));
    }
}
