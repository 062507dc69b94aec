//! Shared type definitions for the VindexChain node.
//!
//! Every crate in the workspace speaks these types: primitives, transactions,
//! blocks, validator records, genesis parameters and the error taxonomy.

pub mod block;
pub mod consensus;
pub mod constants;
pub mod error;
pub mod genesis;
pub mod ledger;
pub mod name;
pub mod primitives;
pub mod transaction;
pub mod validator;
