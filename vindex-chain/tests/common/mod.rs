#![allow(dead_code)]

use std::sync::Arc;

use vindex_chain::engine::{Admission, BlockOutcome, ChainEngine, EngineOptions, StateApplier, StateReader};
use vindex_chain::transaction::sign_transaction;
use vindex_crypto::keys::Keypair;
use vindex_storage::memory::MemoryStore;
use vindex_storage::traits::KvStore;
use vindex_types::constants::ONE_OC;
use vindex_types::genesis::{ChainParameters, GenesisAllocation, GenesisConfig, GenesisValidator};
use vindex_types::primitives::*;
use vindex_types::transaction::TxPayload;

pub const T0: Timestamp = 1_700_000_000;

pub fn keypair(seed: u8) -> Keypair {
    Keypair::from_seed(&[seed; 32])
}

/// The genesis validator.
pub fn validator() -> Keypair {
    keypair(1)
}

/// A funded user account.
pub fn alice() -> Keypair {
    keypair(2)
}

pub fn bob() -> Keypair {
    keypair(3)
}

/// Single-validator genesis with Alice and Bob funded with 1000 OC each.
pub fn genesis(parameters: ChainParameters) -> GenesisConfig {
    let v = validator();
    GenesisConfig {
        chain_id: "vindexchain-test".into(),
        genesis_time: T0,
        validators: vec![GenesisValidator {
            address: v.address(),
            pubkey: v.public_key(),
            stake: 1_000 * ONE_OC,
        }],
        allocations: [alice(), bob()]
            .iter()
            .map(|k| GenesisAllocation {
                address: k.address(),
                denom: "oc".into(),
                amount: 1_000 * ONE_OC,
            })
            .collect(),
        parameters,
    }
}

pub fn params() -> ChainParameters {
    ChainParameters {
        min_validators: 1,
        ..ChainParameters::default()
    }
}

pub struct Harness<S: KvStore> {
    pub engine: ChainEngine<S>,
}

impl Harness<Arc<MemoryStore>> {
    pub fn new(parameters: ChainParameters) -> Self {
        Self::open(Arc::new(MemoryStore::new()), &genesis(parameters))
    }
}

impl<S: KvStore> Harness<S> {
    pub fn open(store: S, genesis: &GenesisConfig) -> Self {
        let engine = ChainEngine::open(store, genesis, EngineOptions::default()).unwrap();
        Self { engine }
    }

    pub fn submit(&self, kp: &Keypair, payload: TxPayload) -> Admission {
        let nonce = self.engine.query_account(&kp.address(), None).unwrap().nonce;
        self.engine.submit_transaction(sign_transaction(kp, nonce, payload))
    }

    /// Submit and require acceptance.
    pub fn submit_ok(&self, kp: &Keypair, payload: TxPayload) {
        let admission = self.submit(kp, payload);
        assert!(admission.accepted, "rejected: {admission:?}");
    }

    /// Build, check and commit a block at `timestamp`; invariants must hold after it.
    pub fn produce(&self, timestamp: Timestamp) -> BlockOutcome {
        let block = self
            .engine
            .build_block(0, validator().address(), timestamp)
            .unwrap();
        self.engine.check_block(&block, timestamp).unwrap();
        let outcome = self.engine.apply_block(&block).unwrap();
        self.engine.snapshot().check_invariants().unwrap();
        outcome
    }

    pub fn balance(&self, address: &Address) -> Amount {
        self.engine
            .query_account(address, None)
            .unwrap()
            .balance("oc")
    }

    pub fn supply(&self) -> Amount {
        self.engine.query_denom("oc").unwrap().total_supply
    }
}
