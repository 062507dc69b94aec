//! Storage abstraction for the VindexChain node.
//!
//! Provides a [`KvStore`](traits::KvStore) trait with in-memory and RocksDB
//! backends, the persisted key layout in [`keys`], and [`StateStore`](state_store::StateStore)
//! which commits state diffs and blocks atomically.

pub mod error;
pub mod keys;
pub mod memory;
pub mod rocksdb;
pub mod state_store;
pub mod traits;
