use std::collections::BTreeMap;

use vindex_crypto::merkle::kv_root;
use vindex_storage::error::StorageError;
use vindex_storage::keys::*;
use vindex_storage::state_store::{decode, encode, StateEntries};
use vindex_types::block::ChainMeta;
use vindex_types::genesis::ChainParameters;
use vindex_types::ledger::{DenomMeta, Domain};
use vindex_types::primitives::*;
use vindex_types::validator::{UnbondingEntry, Validator};

use crate::domain::DomainRegistry;
use crate::error::ChainError;
use crate::ledger::Ledger;
use crate::staking::{bonded_pool_address, StakingState};

/// The complete committed state of the chain at one height.
///
/// Only the block apply step mutates a `ChainState`, and it does so on a
/// private copy that replaces the published snapshot after commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainState {
    pub chain_id: String,
    pub params: ChainParameters,
    pub ledger: Ledger,
    pub staking: StakingState,
    pub domains: DomainRegistry,
    pub genesis_time: Timestamp,
    pub height: Height,
    pub last_block_time: Timestamp,
    pub last_burn_time: Timestamp,
    /// Hash of the block at `height`. Not part of the state root.
    pub last_block_hash: Hash,
}

impl ChainState {
    /// Empty state for a chain that has not applied genesis yet.
    pub fn empty(chain_id: String, params: ChainParameters, genesis_time: Timestamp) -> Self {
        Self {
            chain_id,
            params,
            ledger: Ledger::new(),
            staking: StakingState::new(),
            domains: DomainRegistry::new(),
            genesis_time,
            height: 0,
            last_block_time: genesis_time,
            last_burn_time: genesis_time,
            last_block_hash: ZERO_HASH,
        }
    }

    pub fn native_denom(&self) -> &str {
        &self.params.native_denom
    }

    pub fn meta(&self) -> ChainMeta {
        ChainMeta {
            chain_id: self.chain_id.clone(),
            genesis_time: self.genesis_time,
            height: self.height,
            last_block_time: self.last_block_time,
            last_burn_time: self.last_burn_time,
            next_unbonding_id: self.staking.next_unbonding_id,
            active_set: self.staking.active_set.clone(),
            pending_changes: self.staking.pending_changes.clone(),
        }
    }

    // ─── Encoding ────────────────────────────────────────────────────────────

    /// Encode the state into its persisted key layout.
    pub fn to_entries(&self) -> Result<StateEntries, StorageError> {
        let mut entries = StateEntries::new();
        for (address, balances) in &self.ledger.balances {
            for (denom, amount) in balances {
                entries.insert(balance_key(address, denom), encode(amount)?);
            }
        }
        for (address, nonce) in &self.ledger.nonces {
            if *nonce > 0 {
                entries.insert(nonce_key(address), encode(nonce)?);
            }
        }
        for (symbol, meta) in &self.ledger.denoms {
            entries.insert(denom_key(symbol), encode(meta)?);
        }
        for (address, validator) in &self.staking.validators {
            entries.insert(validator_key(address), encode(validator)?);
        }
        for ((delegator, validator), shares) in &self.staking.delegations {
            entries.insert(delegation_key(delegator, validator), encode(shares)?);
        }
        for entry in self.staking.unbonding.values() {
            entries.insert(
                unbonding_key(&entry.delegator, &entry.validator, entry.id),
                encode(entry)?,
            );
        }
        for (name, domain) in &self.domains.domains {
            entries.insert(domain_key(name), encode(domain)?);
        }
        entries.insert(PARAMS_KEY.as_bytes().to_vec(), encode(&self.params)?);
        entries.insert(META_CHAIN_KEY.as_bytes().to_vec(), encode(&self.meta())?);
        Ok(entries)
    }

    /// Rebuild a state from persisted entries and the stored head hash.
    pub fn from_entries(entries: &StateEntries, head: Hash) -> Result<Self, ChainError> {
        let mut params: Option<ChainParameters> = None;
        let mut meta: Option<ChainMeta> = None;
        let mut ledger = Ledger::new();
        let mut staking = StakingState::new();
        let mut domains = DomainRegistry::new();

        for (key, value) in entries {
            if key.starts_with(BALANCE_PREFIX.as_bytes()) {
                let (address, denom) = parse_balance_key(key)?;
                let amount: Amount = decode(key, value)?;
                ledger.balances.entry(address).or_default().insert(denom, amount);
            } else if key.starts_with(NONCE_PREFIX.as_bytes()) {
                ledger.nonces.insert(parse_nonce_key(key)?, decode(key, value)?);
            } else if key.starts_with(DENOM_PREFIX.as_bytes()) {
                let meta: DenomMeta = decode(key, value)?;
                ledger.denoms.insert(meta.symbol.clone(), meta);
            } else if key.starts_with(VALIDATOR_PREFIX.as_bytes()) {
                let v: Validator = decode(key, value)?;
                staking.validators.insert(v.address, v);
            } else if key.starts_with(DELEGATION_PREFIX.as_bytes()) {
                let pair = parse_delegation_key(key)?;
                staking.delegations.insert(pair, decode(key, value)?);
            } else if key.starts_with(UNBONDING_PREFIX.as_bytes()) {
                let e: UnbondingEntry = decode(key, value)?;
                staking.unbonding.insert((e.completion_time, e.id), e);
            } else if key.starts_with(DOMAIN_PREFIX.as_bytes()) {
                let d: Domain = decode(key, value)?;
                domains.domains.insert(d.name.clone(), d);
            } else if key.as_slice() == PARAMS_KEY.as_bytes() {
                params = Some(decode(key, value)?);
            } else if key.as_slice() == META_CHAIN_KEY.as_bytes() {
                meta = Some(decode(key, value)?);
            } else {
                return Err(StorageError::CorruptKey {
                    key: String::from_utf8_lossy(key).into_owned(),
                }
                .into());
            }
        }

        let params = params.ok_or_else(|| ChainError::CorruptState {
            reason: "missing chain parameters".to_string(),
        })?;
        let meta = meta.ok_or_else(|| ChainError::CorruptState {
            reason: "missing chain metadata".to_string(),
        })?;
        staking.next_unbonding_id = meta.next_unbonding_id;
        staking.active_set = meta.active_set;
        staking.pending_changes = meta.pending_changes;

        Ok(Self {
            chain_id: meta.chain_id,
            params,
            ledger,
            staking,
            domains,
            genesis_time: meta.genesis_time,
            height: meta.height,
            last_block_time: meta.last_block_time,
            last_burn_time: meta.last_burn_time,
            last_block_hash: head,
        })
    }

    /// Merkle root over the encoded state entries.
    pub fn state_root(&self) -> Result<Hash, StorageError> {
        let entries = self.to_entries()?;
        Ok(root_of(&entries))
    }

    // ─── Invariants ──────────────────────────────────────────────────────────

    /// Verify the monetary and staking invariants.
    ///
    /// - every denom's supply equals the sum of balances, plus pending
    ///   unbonding amounts for the native denom
    /// - the bonded pool holds exactly the validators' bonded tokens, and each
    ///   validator's shares equal the sum of its delegations
    /// - every unbonding entry completes at least one unbonding period after
    ///   it was created
    pub fn check_invariants(&self) -> Result<(), ChainError> {
        let native = self.native_denom();
        let mut circulating: BTreeMap<&str, Amount> = BTreeMap::new();
        for balances in self.ledger.balances.values() {
            for (denom, amount) in balances {
                let sum = circulating.entry(denom.as_str()).or_insert(0);
                *sum = sum.checked_add(*amount).ok_or_else(|| violation("balance sum overflows"))?;
            }
        }
        for meta in self.ledger.denoms.values() {
            let mut held = circulating.get(meta.symbol.as_str()).copied().unwrap_or(0);
            if meta.symbol == native {
                held = held.saturating_add(self.staking.total_unbonding());
            }
            if held != meta.total_supply {
                return Err(violation(&format!(
                    "{} supply {} but accounts hold {}",
                    meta.symbol, meta.total_supply, held
                )));
            }
        }
        if let Some(denom) = circulating.keys().find(|d| !self.ledger.denoms.contains_key(**d)) {
            return Err(violation(&format!("balances in unregistered denom {denom}")));
        }

        let pool = self.ledger.balance(&bonded_pool_address(), native);
        let bonded = self.staking.total_bonded();
        if pool != bonded {
            return Err(violation(&format!(
                "bonded pool holds {pool} but validators account for {bonded}"
            )));
        }
        let mut shares: BTreeMap<Address, Shares> = BTreeMap::new();
        for ((_, validator), s) in &self.staking.delegations {
            *shares.entry(*validator).or_insert(0) += *s;
        }
        for v in self.staking.validators.values() {
            let delegated = shares.get(&v.address).copied().unwrap_or(0);
            if delegated != v.delegator_shares {
                return Err(violation(&format!(
                    "validator {} issued {} shares but delegations hold {}",
                    address_hex(&v.address),
                    v.delegator_shares,
                    delegated
                )));
            }
        }

        for e in self.staking.unbonding.values() {
            if e.completion_time < e.created_at.saturating_add(self.params.unbonding_period_secs) {
                return Err(violation(&format!("unbonding entry {} completes early", e.id)));
            }
        }
        Ok(())
    }
}

/// Merkle root of a set of encoded entries.
pub fn root_of(entries: &StateEntries) -> Hash {
    kv_root(entries.iter().map(|(k, v)| (k.as_slice(), v.as_slice())))
}

fn violation(reason: &str) -> ChainError {
    ChainError::InvariantViolation {
        reason: reason.to_string(),
    }
}
