//! Reopening a node's store resumes from the last committed block.

mod common;

use std::sync::Arc;

use common::*;
use vindex_chain::engine::{ChainEngine, EngineOptions, StateReader};
use vindex_chain::error::ChainError;
use vindex_storage::memory::MemoryStore;
use vindex_storage::rocksdb::RocksDbStore;
use vindex_storage::traits::KvStore;
use vindex_types::constants::ONE_OC;
use vindex_types::transaction::TxPayload;

/// Commit a few blocks with state changes in every subsystem.
fn run_workload<S: KvStore>(h: &Harness<S>) {
    h.submit_ok(
        &alice(),
        TxPayload::Transfer {
            to: bob().address(),
            denom: "oc".into(),
            amount: 10 * ONE_OC,
        },
    );
    h.submit_ok(
        &bob(),
        TxPayload::RegisterDomain {
            name: "bob.one".into(),
            years: 2,
            record: "hello".into(),
        },
    );
    h.produce(T0 + 3);
    h.submit_ok(
        &alice(),
        TxPayload::CreateToken {
            symbol: "STAR".into(),
            total_supply: 77,
            mintable: false,
        },
    );
    h.submit_ok(
        &bob(),
        TxPayload::Delegate {
            validator: validator().address(),
            amount: 5 * ONE_OC,
        },
    );
    h.produce(T0 + 6);
    h.produce(T0 + 9);
}

#[test]
fn reopen_memory_store_resumes_at_head() {
    let store = Arc::new(MemoryStore::new());
    let g = genesis(params());
    let (root, head) = {
        let h = Harness::open(store.clone(), &g);
        run_workload(&h);
        let state = h.engine.snapshot();
        (state.state_root().unwrap(), state.last_block_hash)
    };

    let h = Harness::open(store, &g);
    let state = h.engine.snapshot();
    assert_eq!(state.height, 3);
    assert_eq!(state.state_root().unwrap(), root);
    assert_eq!(state.last_block_hash, head);
    assert_eq!(h.engine.query_denom("STAR").unwrap().total_supply, 77);
    assert_eq!(h.engine.query_domain("bob.one").unwrap().owner, bob().address());
    assert_eq!(h.engine.query_account(&alice().address(), None).unwrap().nonce, 2);

    // Nonces survive the restart, so new transactions keep applying.
    h.submit_ok(
        &alice(),
        TxPayload::Transfer {
            to: bob().address(),
            denom: "STAR".into(),
            amount: 7,
        },
    );
    let outcome = h.produce(T0 + 12);
    assert_eq!(outcome.height, 4);
    assert!(outcome.results[0].result.is_ok());
}

#[test]
fn reopen_rocksdb_store_resumes_at_head() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chain");
    let g = genesis(params());
    let root = {
        let h = Harness::open(RocksDbStore::open(&path).unwrap(), &g);
        run_workload(&h);
        h.engine.snapshot().state_root().unwrap()
    };

    let h = Harness::open(RocksDbStore::open(&path).unwrap(), &g);
    assert_eq!(h.engine.latest_height(), 3);
    assert_eq!(h.engine.snapshot().state_root().unwrap(), root);
    let block = h.engine.block(3).unwrap().expect("block 3 is stored");
    assert_eq!(block.header.state_root, root);
    h.produce(T0 + 12);
    assert_eq!(h.engine.latest_height(), 4);
}

#[test]
fn reopen_with_other_chain_id_is_refused() {
    let store = Arc::new(MemoryStore::new());
    let g = genesis(params());
    Harness::open(store.clone(), &g).produce(T0 + 3);

    let mut other = g.clone();
    other.chain_id = "vindexchain-other".into();
    assert!(matches!(
        ChainEngine::open(store, &other, EngineOptions::default()),
        Err(ChainError::Config(_)) | Err(ChainError::CorruptState { .. })
    ));
}

#[test]
fn historical_queries_read_retained_snapshots() {
    let h = Harness::new(params());
    let a = alice().address();
    h.submit_ok(
        &alice(),
        TxPayload::Transfer {
            to: bob().address(),
            denom: "oc".into(),
            amount: ONE_OC,
        },
    );
    h.produce(T0 + 3);
    h.produce(T0 + 6);

    let before = h.engine.query_account(&a, Some(0)).unwrap().balance("oc");
    let after = h.engine.query_account(&a, Some(2)).unwrap().balance("oc");
    assert_eq!(before - after, ONE_OC);
    assert!(matches!(
        h.engine.query_account(&a, Some(9)),
        Err(ChainError::HeightUnavailable { height: 9 })
    ));
}
