//! Chain engine for VindexChain.
//!
//! Implements the account ledger, delegated staking with an unbonding queue,
//! the token factory, the domain registry, periodic AutoBurn, stake-weighted
//! proposer rotation, single-round BFT consensus and the block pipeline that
//! ties them together.

pub mod autoburn;
pub mod block;
pub mod compliance;
pub mod consensus;
pub mod domain;
pub mod engine;
pub mod error;
pub mod executor;
pub mod genesis;
pub mod leader;
pub mod ledger;
pub mod mempool;
pub mod staking;
pub mod state;
pub mod token;
pub mod transaction;
