use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde::Serialize;

use vindex_storage::state_store::{diff_entries, StateEntries, StateStore};
use vindex_storage::traits::KvStore;
use vindex_types::block::Block;
use vindex_types::consensus::{EquivocationEvidence, Vote};
use vindex_types::constants::{DEFAULT_MEMPOOL_CAPACITY, MAX_TXS_PER_BLOCK};
use vindex_types::error::{ConfigError, ValidationError};
use vindex_types::genesis::GenesisConfig;
use vindex_types::ledger::{AccountView, DenomMeta, Domain};
use vindex_types::primitives::*;
use vindex_types::transaction::Transaction;
use vindex_types::validator::{UnbondingEntry, Validator, ValidatorSetSnapshot};

use crate::autoburn::run_auto_burn;
use crate::block::{assemble_block, check_header, check_timestamp_drift, verify_commit};
use crate::compliance::{AllowAll, ComplianceVerifier};
use crate::consensus::verify_evidence;
use crate::error::ChainError;
use crate::executor::{execute_transaction, TxOutcome, TxReceipt};
use crate::genesis::{build_genesis_state, genesis_block};
use crate::mempool::Mempool;
use crate::state::{root_of, ChainState};
use crate::transaction::{check_payload, verify_transaction, verify_transactions};

/// Snapshots kept for historical queries by default.
pub const DEFAULT_HISTORY_LIMIT: usize = 128;

/// Tuning for a [`ChainEngine`].
#[derive(Clone)]
pub struct EngineOptions {
    pub mempool_capacity: usize,
    pub max_txs_per_block: usize,
    /// Number of committed snapshots retained for `height` queries (at least 1).
    pub history_limit: usize,
    pub compliance: Arc<dyn ComplianceVerifier>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            mempool_capacity: DEFAULT_MEMPOOL_CAPACITY,
            max_txs_per_block: MAX_TXS_PER_BLOCK,
            history_limit: DEFAULT_HISTORY_LIMIT,
            compliance: Arc::new(AllowAll),
        }
    }
}

/// Result of committing a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockOutcome {
    pub height: Height,
    pub block_hash: Hash,
    pub state_root: Hash,
    /// One entry per transaction, in block order.
    pub results: Vec<TxOutcome>,
    /// Amount destroyed by AutoBurn, when a burn ran in this block.
    pub burned: Option<Amount>,
    /// Unbonding entries credited back in this block.
    pub completed_unbonding: Vec<UnbondingEntry>,
    /// Validators jailed by evidence in this block, effective next epoch.
    pub jailed: Vec<Address>,
    /// New active set, when this block closed an epoch and rotated it.
    pub rotated: Option<ValidatorSetSnapshot>,
}

/// Answer to a transaction submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Admission {
    pub tx_hash: Hash,
    pub accepted: bool,
    /// Machine-readable rejection kind.
    pub kind: Option<String>,
    pub reason: Option<String>,
}

impl Admission {
    fn accepted(tx_hash: Hash) -> Self {
        Self {
            tx_hash,
            accepted: true,
            kind: None,
            reason: None,
        }
    }

    fn rejected(tx_hash: Hash, kind: &str, reason: String) -> Self {
        Self {
            tx_hash,
            accepted: false,
            kind: Some(kind.to_string()),
            reason: Some(reason),
        }
    }
}

// ─── Capabilities ────────────────────────────────────────────────────────────

/// Write side of the chain, driven by consensus.
pub trait StateApplier: Send + Sync {
    /// Build a block for the next height from the mempool.
    fn build_block(
        &self,
        round: Round,
        proposer: Address,
        timestamp: Timestamp,
    ) -> Result<Block, ChainError>;

    /// Check a proposed block by executing it on a scratch copy. `now` is the
    /// local clock; a block stamped too far ahead of it is rejected.
    fn check_block(&self, block: &Block, now: Timestamp) -> Result<(), ChainError>;

    /// Execute, persist and publish a block that reached a supermajority.
    fn apply_block(&self, block: &Block) -> Result<BlockOutcome, ChainError>;

    /// Queue equivocation evidence for a future block.
    fn add_evidence(&self, evidence: EquivocationEvidence);
}

/// Read side of the chain. Every query reads a committed snapshot.
pub trait StateReader: Send + Sync {
    fn latest_height(&self) -> Height;
    /// Balances and nonce at `height`, or at the latest height.
    fn query_account(&self, address: &Address, height: Option<Height>) -> Result<AccountView, ChainError>;
    fn query_validators(&self, height: Option<Height>) -> Result<Vec<Validator>, ChainError>;
    fn query_active_set(&self) -> ValidatorSetSnapshot;
    fn query_domain(&self, name: &str) -> Option<Domain>;
    fn query_denom(&self, symbol: &str) -> Option<DenomMeta>;
    fn query_delegations(&self, delegator: &Address) -> Vec<(Address, Shares)>;
    fn query_unbonding(&self, delegator: &Address) -> Vec<UnbondingEntry>;
    fn submit_transaction(&self, tx: Transaction) -> Admission;
    fn simulate(&self, tx: &Transaction) -> Result<TxReceipt, ValidationError>;
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// A block executed on a scratch copy, not yet persisted.
struct Executed {
    state: ChainState,
    entries: StateEntries,
    state_root: Hash,
    results: Vec<TxOutcome>,
    finalized: Finalized,
}

#[derive(Default)]
struct Finalized {
    burned: Option<Amount>,
    completed_unbonding: Vec<UnbondingEntry>,
    jailed: Vec<Address>,
    rotated: Option<ValidatorSetSnapshot>,
}

/// The chain state machine: applies blocks in height order, persists each
/// commit atomically and serves reads from immutable snapshots.
///
/// Only `apply_block` replaces the published state, under the commit lock.
/// Readers clone an `Arc` and never wait on block execution.
pub struct ChainEngine<S: KvStore> {
    store: StateStore<S>,
    /// Committed snapshots, oldest first. Never empty.
    history: RwLock<VecDeque<Arc<ChainState>>>,
    /// Encoded entries of the latest commit; also serialises writers.
    commit_lock: Mutex<StateEntries>,
    mempool: Mutex<Mempool>,
    options: EngineOptions,
}

impl<S: KvStore> ChainEngine<S> {
    /// Open the chain in `store`, reloading the last commit or writing genesis.
    pub fn open(store: S, genesis: &GenesisConfig, options: EngineOptions) -> Result<Self, ChainError> {
        let store = StateStore::new(store);
        let (state, entries) = if store.has_state()? {
            let entries = store.load_state_entries()?;
            let head = store.load_head()?.ok_or_else(|| ChainError::CorruptState {
                reason: "missing head pointer".to_string(),
            })?;
            let state = ChainState::from_entries(&entries, head)?;
            if state.chain_id != genesis.chain_id {
                return Err(ConfigError::InvalidGenesis {
                    reason: format!(
                        "store holds chain {} but genesis is for {}",
                        state.chain_id, genesis.chain_id
                    ),
                }
                .into());
            }
            let root = root_of(&entries);
            match store.load_block(state.height)? {
                Some(block) if block.header.state_root == root && block.hash() == head => {}
                _ => {
                    return Err(ChainError::CorruptState {
                        reason: format!("stored head does not match state at height {}", state.height),
                    })
                }
            }
            tracing::info!(
                height = state.height,
                state_root = %hex::encode(root),
                "reloaded committed state"
            );
            (state, entries)
        } else {
            let state = build_genesis_state(genesis)?;
            let entries = state.to_entries()?;
            let block = genesis_block(&state)?;
            store.commit(diff_entries(&StateEntries::new(), &entries), &block, block.hash())?;
            tracing::info!(
                chain_id = %state.chain_id,
                state_root = %hex::encode(block.header.state_root),
                "initialized chain from genesis"
            );
            (state, entries)
        };

        let mut history = VecDeque::new();
        history.push_back(Arc::new(state));
        Ok(Self {
            store,
            history: RwLock::new(history),
            commit_lock: Mutex::new(entries),
            mempool: Mutex::new(Mempool::new(options.mempool_capacity)),
            options,
        })
    }

    /// The latest committed state.
    pub fn snapshot(&self) -> Arc<ChainState> {
        let history = self.history.read().unwrap_or_else(PoisonError::into_inner);
        match history.back() {
            Some(state) => Arc::clone(state),
            None => Arc::new(ChainState::empty(String::new(), Default::default(), 0)),
        }
    }

    /// The committed state at `height`, if still retained.
    pub fn snapshot_at(&self, height: Height) -> Result<Arc<ChainState>, ChainError> {
        let history = self.history.read().unwrap_or_else(PoisonError::into_inner);
        history
            .iter()
            .rev()
            .find(|s| s.height == height)
            .cloned()
            .ok_or(ChainError::HeightUnavailable { height })
    }

    fn snapshot_for(&self, height: Option<Height>) -> Result<Arc<ChainState>, ChainError> {
        match height {
            Some(h) => self.snapshot_at(h),
            None => Ok(self.snapshot()),
        }
    }

    /// A committed block by height.
    pub fn block(&self, height: Height) -> Result<Option<Block>, ChainError> {
        Ok(self.store.load_block(height)?)
    }

    pub fn mempool_len(&self) -> usize {
        self.mempool.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Apply a block received together with its commit votes, checking the
    /// votes against the current active set first.
    pub fn apply_committed(&self, block: &Block, votes: &[Vote]) -> Result<BlockOutcome, ChainError> {
        let parent = self.snapshot();
        verify_commit(block, votes, parent.staking.active_set())?;
        self.apply_block(block)
    }

    // ─── Execution ───────────────────────────────────────────────────────────

    /// Execute `block` on top of `parent` without persisting anything.
    fn execute(&self, parent: &ChainState, block: &Block) -> Result<Executed, ChainError> {
        check_header(
            block,
            parent.height,
            &parent.last_block_hash,
            parent.last_block_time,
            self.options.max_txs_per_block,
        )?;
        if !parent.staking.active_set().contains(&block.header.proposer) {
            return Err(ChainError::InvalidBlock {
                reason: format!(
                    "proposer {} is not in the active set",
                    address_hex(&block.header.proposer)
                ),
            });
        }
        for evidence in &block.evidence {
            check_evidence(parent, evidence, block.height())?;
        }

        let mut state = parent.clone();
        let now = block.header.timestamp;
        let results = apply_transactions(&mut state, &block.transactions, now);
        let finalized = finalize(&mut state, block.height(), now, &block.evidence)?;

        let entries = state.to_entries()?;
        let state_root = root_of(&entries);
        if state_root != block.header.state_root {
            return Err(ChainError::InvalidBlock {
                reason: format!(
                    "state root mismatch: header {} computed {}",
                    hex::encode(block.header.state_root),
                    hex::encode(state_root)
                ),
            });
        }
        state.last_block_hash = block.hash();
        if cfg!(debug_assertions) {
            state.check_invariants()?;
        }
        Ok(Executed {
            state,
            entries,
            state_root,
            results,
            finalized,
        })
    }

    fn publish(&self, state: ChainState) {
        let mut history = self.history.write().unwrap_or_else(PoisonError::into_inner);
        history.push_back(Arc::new(state));
        while history.len() > self.options.history_limit.max(1) {
            history.pop_front();
        }
    }
}

/// Verify signatures in one batch, then execute each transaction in order.
/// A failed transaction leaves the state untouched.
fn apply_transactions(state: &mut ChainState, txs: &[Transaction], now: Timestamp) -> Vec<TxOutcome> {
    let signatures = verify_transactions(txs);
    txs.iter()
        .zip(signatures)
        .map(|(tx, sig)| {
            let result = sig.and_then(|()| execute_transaction(state, tx, now));
            if let Err(e) = &result {
                tracing::debug!(tx = %hex::encode(tx.hash()), kind = e.kind(), "transaction failed");
            }
            TxOutcome {
                tx_hash: tx.hash(),
                result,
            }
        })
        .collect()
}

fn check_evidence(
    parent: &ChainState,
    evidence: &EquivocationEvidence,
    height: Height,
) -> Result<Address, ChainError> {
    let offender = verify_evidence(evidence)?;
    if evidence.vote_a.height >= height {
        return Err(ChainError::InvalidBlock {
            reason: "evidence from a future height".to_string(),
        });
    }
    match parent.staking.validator(&offender) {
        Some(v) if v.pubkey == evidence.vote_a.voter_pubkey => Ok(offender),
        _ => Err(ChainError::InvalidBlock {
            reason: format!("evidence against unknown validator {}", address_hex(&offender)),
        }),
    }
}

/// Block finalization after the transactions: jail offenders, pay the block
/// reward, complete due unbondings, run AutoBurn, advance the height and close
/// the epoch when due. Everything reads block time `now`.
fn finalize(
    state: &mut ChainState,
    height: Height,
    now: Timestamp,
    evidence: &[EquivocationEvidence],
) -> Result<Finalized, ChainError> {
    let params = state.params.clone();
    let native = params.native_denom.clone();
    let mut out = Finalized::default();

    for e in evidence {
        let offender = e.offender();
        if state.staking.request_jail(offender) {
            tracing::warn!(validator = %address_hex(&offender), height, "validator jailed for equivocation");
            out.jailed.push(offender);
        }
    }

    state
        .staking
        .distribute_rewards(&mut state.ledger, &native, params.block_reward)
        .map_err(finalization_error)?;
    out.completed_unbonding = state
        .staking
        .sweep_unbonding(&mut state.ledger, &native, now)
        .map_err(finalization_error)?;
    out.burned = run_auto_burn(&mut state.ledger, &params, &mut state.last_burn_time, now)
        .map_err(finalization_error)?;

    state.height = height;
    state.last_block_time = now;

    if height % params.epoch_length == 0 {
        let epoch = state.staking.process_epoch(&params, now);
        if epoch.rotated {
            out.rotated = Some(state.staking.active_set().clone());
        }
    }
    Ok(out)
}

fn finalization_error(e: ValidationError) -> ChainError {
    ChainError::InvariantViolation {
        reason: format!("block finalization failed: {e}"),
    }
}

impl<S: KvStore> StateApplier for ChainEngine<S> {
    fn build_block(
        &self,
        round: Round,
        proposer: Address,
        timestamp: Timestamp,
    ) -> Result<Block, ChainError> {
        let parent = self.snapshot();
        let now = timestamp.max(parent.last_block_time);
        let height = parent.height + 1;
        let (pending, evidence) = {
            let pool = self.mempool.lock().unwrap_or_else(PoisonError::into_inner);
            (
                pool.pending(self.options.max_txs_per_block),
                pool.pending_evidence(),
            )
        };
        let evidence: Vec<EquivocationEvidence> = evidence
            .into_iter()
            .filter(|e| check_evidence(&parent, e, height).is_ok())
            .collect();

        let mut scratch = (*parent).clone();
        let results = apply_transactions(&mut scratch, &pending, now);
        let mut included = Vec::with_capacity(pending.len());
        let mut dropped = Vec::new();
        for (tx, outcome) in pending.into_iter().zip(results) {
            match outcome.result {
                Ok(_) => included.push(tx),
                // A future nonce may become valid once earlier transactions land.
                Err(ValidationError::BadNonce { expected, actual }) if actual > expected => {}
                Err(_) => dropped.push(outcome.tx_hash),
            }
        }
        if !dropped.is_empty() {
            tracing::debug!(count = dropped.len(), "dropping failed transactions from mempool");
            self.mempool
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&dropped);
        }

        finalize(&mut scratch, height, now, &evidence)?;
        let state_root = scratch.state_root()?;
        Ok(assemble_block(
            height,
            round,
            now,
            proposer,
            parent.last_block_hash,
            included,
            evidence,
            state_root,
        ))
    }

    fn check_block(&self, block: &Block, now: Timestamp) -> Result<(), ChainError> {
        check_timestamp_drift(block, now)?;
        let parent = self.snapshot();
        self.execute(&parent, block).map(|_| ())
    }

    fn apply_block(&self, block: &Block) -> Result<BlockOutcome, ChainError> {
        let mut committed = self.commit_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let parent = self.snapshot();
        let executed = self.execute(&parent, block)?;

        let block_hash = block.hash();
        self.store
            .commit(diff_entries(&committed, &executed.entries), block, block_hash)?;
        *committed = executed.entries;

        let failed = executed.results.iter().filter(|r| r.result.is_err()).count();
        {
            let mut pool = self.mempool.lock().unwrap_or_else(PoisonError::into_inner);
            let included: Vec<Hash> = block.transactions.iter().map(|tx| tx.hash()).collect();
            pool.remove(&included);
            pool.remove_evidence(&block.evidence);
            pool.prune_stale(|a| executed.state.ledger.nonce(a));
        }

        tracing::info!(
            height = block.height(),
            round = block.header.round,
            proposer = %address_hex(&block.header.proposer),
            txs = block.transactions.len(),
            failed,
            state_root = %hex::encode(executed.state_root),
            "block committed"
        );

        let finalized = executed.finalized;
        let outcome = BlockOutcome {
            height: block.height(),
            block_hash,
            state_root: executed.state_root,
            results: executed.results,
            burned: finalized.burned,
            completed_unbonding: finalized.completed_unbonding,
            jailed: finalized.jailed,
            rotated: finalized.rotated,
        };
        self.publish(executed.state);
        Ok(outcome)
    }

    fn add_evidence(&self, evidence: EquivocationEvidence) {
        self.mempool
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .add_evidence(evidence);
    }
}

impl<S: KvStore> StateReader for ChainEngine<S> {
    fn latest_height(&self) -> Height {
        self.snapshot().height
    }

    fn query_account(&self, address: &Address, height: Option<Height>) -> Result<AccountView, ChainError> {
        Ok(self.snapshot_for(height)?.ledger.account(address))
    }

    fn query_validators(&self, height: Option<Height>) -> Result<Vec<Validator>, ChainError> {
        Ok(self.snapshot_for(height)?.staking.validators().cloned().collect())
    }

    fn query_active_set(&self) -> ValidatorSetSnapshot {
        self.snapshot().staking.active_set().clone()
    }

    fn query_domain(&self, name: &str) -> Option<Domain> {
        self.snapshot().domains.get(name).cloned()
    }

    fn query_denom(&self, symbol: &str) -> Option<DenomMeta> {
        self.snapshot().ledger.denom(symbol).cloned()
    }

    fn query_delegations(&self, delegator: &Address) -> Vec<(Address, Shares)> {
        self.snapshot().staking.delegations_of(delegator)
    }

    fn query_unbonding(&self, delegator: &Address) -> Vec<UnbondingEntry> {
        self.snapshot().staking.unbonding_of(delegator)
    }

    /// Admission: signature, compliance, stateless payload checks, then the
    /// nonce. A transaction at the sender's current nonce is dry-run against
    /// the committed state; a later nonce is queued behind its predecessors.
    fn submit_transaction(&self, tx: Transaction) -> Admission {
        let tx_hash = tx.hash();
        let reject = |e: ValidationError| Admission::rejected(tx_hash, e.kind(), e.to_string());

        if let Err(e) = verify_transaction(&tx) {
            return reject(e);
        }
        if let Err(reason) = self.options.compliance.screen(&tx) {
            return reject(ValidationError::ComplianceRejected { reason });
        }
        if let Err(e) = check_payload(&tx.payload) {
            return reject(e);
        }

        let state = self.snapshot();
        let expected = state.ledger.nonce(&tx.sender);
        if tx.nonce < expected {
            return reject(ValidationError::BadNonce {
                expected,
                actual: tx.nonce,
            });
        }
        if tx.nonce == expected {
            let mut scratch = (*state).clone();
            if let Err(e) = execute_transaction(&mut scratch, &tx, state.last_block_time) {
                return reject(e);
            }
        }

        let added = self
            .mempool
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .add(tx);
        match added {
            Ok(_) => Admission::accepted(tx_hash),
            Err(ChainError::MempoolFull) => {
                Admission::rejected(tx_hash, "mempool_full", ChainError::MempoolFull.to_string())
            }
            Err(e) => Admission::rejected(tx_hash, "duplicate", e.to_string()),
        }
    }

    fn simulate(&self, tx: &Transaction) -> Result<TxReceipt, ValidationError> {
        verify_transaction(tx)?;
        check_payload(&tx.payload)?;
        let state = self.snapshot();
        let mut scratch = (*state).clone();
        execute_transaction(&mut scratch, tx, state.last_block_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::sign_vote;
    use crate::transaction::sign_transaction;
    use vindex_crypto::keys::Keypair;
    use vindex_storage::memory::MemoryStore;
    use vindex_types::consensus::VoteKind;
    use vindex_types::constants::{MAX_TIMESTAMP_DRIFT, ONE_OC};
    use vindex_types::genesis::{ChainParameters, GenesisAllocation, GenesisValidator};
    use vindex_types::transaction::TxPayload;

    const T0: Timestamp = 1_700_000_000;

    fn validator() -> Keypair {
        Keypair::from_seed(&[1u8; 32])
    }

    fn user() -> Keypair {
        Keypair::from_seed(&[2u8; 32])
    }

    fn genesis() -> GenesisConfig {
        let v = validator();
        GenesisConfig {
            chain_id: "vindexchain-test".into(),
            genesis_time: T0,
            validators: vec![GenesisValidator {
                address: v.address(),
                pubkey: v.public_key(),
                stake: 1_000 * ONE_OC,
            }],
            allocations: vec![GenesisAllocation {
                address: user().address(),
                denom: "oc".into(),
                amount: 1_000 * ONE_OC,
            }],
            parameters: ChainParameters {
                min_validators: 1,
                ..ChainParameters::default()
            },
        }
    }

    fn engine() -> ChainEngine<Arc<MemoryStore>> {
        ChainEngine::open(Arc::new(MemoryStore::new()), &genesis(), EngineOptions::default()).unwrap()
    }

    fn transfer(nonce: u64, amount: Amount) -> Transaction {
        sign_transaction(
            &user(),
            nonce,
            TxPayload::Transfer {
                to: [7u8; 20],
                denom: "oc".into(),
                amount,
            },
        )
    }

    fn produce(engine: &ChainEngine<Arc<MemoryStore>>, timestamp: Timestamp) -> BlockOutcome {
        let block = engine.build_block(0, validator().address(), timestamp).unwrap();
        engine.check_block(&block, timestamp).unwrap();
        engine.apply_block(&block).unwrap()
    }

    #[test]
    fn test_submit_build_apply() {
        let engine = engine();
        let admission = engine.submit_transaction(transfer(0, 5 * ONE_OC));
        assert!(admission.accepted, "{admission:?}");
        assert_eq!(engine.mempool_len(), 1);

        let outcome = produce(&engine, T0 + 3);
        assert_eq!(outcome.height, 1);
        assert_eq!(outcome.results.len(), 1);
        assert!(outcome.results[0].result.is_ok());
        assert_eq!(engine.mempool_len(), 0);
        assert_eq!(engine.latest_height(), 1);

        let account = engine.query_account(&[7u8; 20], None).unwrap();
        assert_eq!(account.balance("oc"), 5 * ONE_OC);
        let before = engine.query_account(&[7u8; 20], Some(0)).unwrap();
        assert_eq!(before.balance("oc"), 0);
    }

    #[test]
    fn test_admission_rejections() {
        let engine = engine();
        let too_much = engine.submit_transaction(transfer(0, 10_000 * ONE_OC));
        assert!(!too_much.accepted);
        assert_eq!(too_much.kind.as_deref(), Some("insufficient_funds"));

        let mut forged = transfer(0, 1);
        forged.signature[3] ^= 1;
        assert_eq!(
            engine.submit_transaction(forged).kind.as_deref(),
            Some("invalid_signature")
        );

        let ok = transfer(0, 1);
        assert!(engine.submit_transaction(ok.clone()).accepted);
        assert_eq!(engine.submit_transaction(ok).kind.as_deref(), Some("duplicate"));

        // Future nonces are queued without a dry run.
        assert!(engine.submit_transaction(transfer(5, 1)).accepted);
    }

    #[test]
    fn test_compliance_screening() {
        let options = EngineOptions {
            compliance: Arc::new(crate::compliance::DenyList::new([[7u8; 20]])),
            ..EngineOptions::default()
        };
        let engine = ChainEngine::open(Arc::new(MemoryStore::new()), &genesis(), options).unwrap();
        let admission = engine.submit_transaction(transfer(0, 1));
        assert_eq!(admission.kind.as_deref(), Some("compliance_rejected"));
    }

    #[test]
    fn test_simulate_does_not_commit() {
        let engine = engine();
        let receipt = engine.simulate(&transfer(0, ONE_OC)).unwrap();
        assert_eq!(receipt.kind, "transfer");
        assert_eq!(engine.query_account(&[7u8; 20], None).unwrap().balance("oc"), 0);
        assert_eq!(engine.mempool_len(), 0);
    }

    #[test]
    fn test_tampered_state_root_rejected() {
        let engine = engine();
        engine.submit_transaction(transfer(0, ONE_OC));
        let mut block = engine.build_block(0, validator().address(), T0 + 3).unwrap();
        block.header.state_root = [0xee; 32];
        assert!(matches!(
            engine.apply_block(&block),
            Err(ChainError::InvalidBlock { .. })
        ));
        assert_eq!(engine.latest_height(), 0);
    }

    #[test]
    fn test_unknown_proposer_rejected() {
        let engine = engine();
        let block = engine.build_block(0, [9u8; 20], T0 + 3).unwrap();
        assert!(matches!(
            engine.check_block(&block, T0 + 3),
            Err(ChainError::InvalidBlock { .. })
        ));
    }

    #[test]
    fn test_block_from_the_future_rejected() {
        let engine = engine();
        let now = T0 + 3;
        let edge = engine
            .build_block(0, validator().address(), now + MAX_TIMESTAMP_DRIFT)
            .unwrap();
        engine.check_block(&edge, now).unwrap();

        let ahead = engine
            .build_block(0, validator().address(), now + MAX_TIMESTAMP_DRIFT + 1)
            .unwrap();
        let err = engine.check_block(&ahead, now).unwrap_err();
        assert!(matches!(err, ChainError::InvalidBlock { ref reason } if reason.contains("ahead")));
        assert_eq!(engine.latest_height(), 0);
    }

    #[test]
    fn test_apply_committed_checks_votes() {
        let engine = engine();
        let block = engine.build_block(0, validator().address(), T0 + 3).unwrap();
        assert!(engine.apply_committed(&block, &[]).is_err());
        let vote = sign_vote(&validator(), VoteKind::Precommit, 1, 0, block.hash());
        engine.apply_committed(&block, &[vote]).unwrap();
        assert_eq!(engine.latest_height(), 1);
    }

    #[test]
    fn test_history_is_bounded() {
        let options = EngineOptions {
            history_limit: 2,
            ..EngineOptions::default()
        };
        let engine = ChainEngine::open(Arc::new(MemoryStore::new()), &genesis(), options).unwrap();
        for i in 1..=3 {
            produce(&engine, T0 + 3 * i);
        }
        assert!(engine.query_account(&[7u8; 20], Some(3)).is_ok());
        assert!(engine.query_account(&[7u8; 20], Some(2)).is_ok());
        assert!(matches!(
            engine.query_account(&[7u8; 20], Some(1)),
            Err(ChainError::HeightUnavailable { height: 1 })
        ));
    }
}
