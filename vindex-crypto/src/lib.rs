//! Hashing, Ed25519 keys, address derivation and Merkle roots.

pub mod address;
pub mod error;
pub mod hash;
pub mod keys;
pub mod merkle;
