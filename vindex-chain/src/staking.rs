use std::collections::BTreeMap;

use vindex_types::constants::BONDED_POOL_LABEL;
use vindex_types::error::ValidationError;
use vindex_types::genesis::ChainParameters;
use vindex_types::primitives::*;
use vindex_types::validator::{
    StatusChange, UnbondingEntry, Validator, ValidatorPower, ValidatorSetSnapshot,
    ValidatorStatus,
};

use crate::ledger::Ledger;

/// Module account holding every bonded native token.
pub fn bonded_pool_address() -> Address {
    module_address(BONDED_POOL_LABEL)
}

fn unknown_validator(address: &Address) -> ValidationError {
    ValidationError::UnknownValidator {
        address: address_hex(address),
    }
}

/// Result of an epoch boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpochOutcome {
    /// Buffered status changes that were applied.
    pub applied: Vec<StatusChange>,
    /// Whether a new active set was installed. `false` when too few
    /// validators qualified and the previous set was kept.
    pub rotated: bool,
}

/// Validators, delegations and unbonding entries.
///
/// Bonded stake lives in the bonded pool account of the [`Ledger`]; the pool
/// balance always equals the sum of every validator's `tokens`. Undelegated
/// amounts leave the pool immediately and are held off-ledger in
/// [`UnbondingEntry`] records until the completion sweep credits them back.
///
/// The active set only changes in [`StakingState::process_epoch`]; status
/// requests made between boundaries are buffered in `pending_changes`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StakingState {
    pub(crate) validators: BTreeMap<Address, Validator>,
    /// (delegator, validator) → shares.
    pub(crate) delegations: BTreeMap<(Address, Address), Shares>,
    /// (completion time, id) → entry; iteration order is sweep order.
    pub(crate) unbonding: BTreeMap<(Timestamp, u64), UnbondingEntry>,
    pub(crate) next_unbonding_id: u64,
    pub(crate) active_set: ValidatorSetSnapshot,
    pub(crate) pending_changes: Vec<StatusChange>,
}

impl StakingState {
    pub fn new() -> Self {
        Self::default()
    }

    // ─── Queries ─────────────────────────────────────────────────────────────

    pub fn validator(&self, address: &Address) -> Option<&Validator> {
        self.validators.get(address)
    }

    pub fn validators(&self) -> impl Iterator<Item = &Validator> {
        self.validators.values()
    }

    /// Snapshot consensus currently votes with.
    pub fn active_set(&self) -> &ValidatorSetSnapshot {
        &self.active_set
    }

    pub fn pending_changes(&self) -> &[StatusChange] {
        &self.pending_changes
    }

    pub fn delegation(&self, delegator: &Address, validator: &Address) -> Shares {
        self.delegations
            .get(&(*delegator, *validator))
            .copied()
            .unwrap_or(0)
    }

    /// Every (validator, shares) pair held by `delegator`.
    pub fn delegations_of(&self, delegator: &Address) -> Vec<(Address, Shares)> {
        self.delegations
            .iter()
            .filter(|((d, _), _)| d == delegator)
            .map(|((_, v), shares)| (*v, *shares))
            .collect()
    }

    /// Pending unbonding entries of `delegator`, earliest completion first.
    pub fn unbonding_of(&self, delegator: &Address) -> Vec<UnbondingEntry> {
        self.unbonding
            .values()
            .filter(|e| &e.delegator == delegator)
            .cloned()
            .collect()
    }

    pub fn unbonding_entries(&self) -> impl Iterator<Item = &UnbondingEntry> {
        self.unbonding.values()
    }

    pub fn next_unbonding_id(&self) -> u64 {
        self.next_unbonding_id
    }

    /// Sum of every validator's bonded tokens.
    pub fn total_bonded(&self) -> Amount {
        self.validators
            .values()
            .fold(0u128, |acc, v| acc.saturating_add(v.tokens))
    }

    /// Sum of every pending unbonding amount.
    pub fn total_unbonding(&self) -> Amount {
        self.unbonding
            .values()
            .fold(0u128, |acc, e| acc.saturating_add(e.amount))
    }

    /// Token value of `shares` of `validator` at the current exchange rate.
    pub fn shares_to_tokens(validator: &Validator, shares: Shares) -> Result<Amount, ValidationError> {
        if shares == validator.delegator_shares {
            return Ok(validator.tokens);
        }
        if validator.delegator_shares == 0 {
            return Ok(0);
        }
        shares
            .checked_mul(validator.tokens)
            .map(|v| v / validator.delegator_shares)
            .ok_or(ValidationError::Overflow)
    }

    // ─── Transactions ────────────────────────────────────────────────────────

    /// Register `operator` as a validator and self-delegate `self_bond`.
    ///
    /// The validator starts Unbonded and joins the active set at the next
    /// epoch boundary if its stake ranks high enough.
    pub fn create_validator(
        &mut self,
        ledger: &mut Ledger,
        native: &str,
        operator: Address,
        pubkey: PublicKey,
        self_bond: Amount,
    ) -> Result<Shares, ValidationError> {
        if self.validators.contains_key(&operator) {
            return Err(ValidationError::DuplicateValidator {
                address: address_hex(&operator),
            });
        }
        if self_bond == 0 {
            return Err(ValidationError::InvalidAmount);
        }
        ledger.check_debit(&operator, native, self_bond)?;

        self.validators.insert(
            operator,
            Validator {
                address: operator,
                pubkey,
                tokens: 0,
                delegator_shares: 0,
                status: ValidatorStatus::Unbonded,
                unbonding_until: None,
            },
        );
        let shares = self.delegate(ledger, native, operator, operator, self_bond);
        if shares.is_err() {
            self.validators.remove(&operator);
        }
        shares
    }

    /// Bond `amount` to `validator`, returning the shares issued.
    pub fn delegate(
        &mut self,
        ledger: &mut Ledger,
        native: &str,
        delegator: Address,
        validator: Address,
        amount: Amount,
    ) -> Result<Shares, ValidationError> {
        if amount == 0 {
            return Err(ValidationError::InvalidAmount);
        }
        let v = self
            .validators
            .get(&validator)
            .ok_or_else(|| unknown_validator(&validator))?;

        let shares = if v.delegator_shares == 0 || v.tokens == 0 {
            amount
        } else {
            amount
                .checked_mul(v.delegator_shares)
                .ok_or(ValidationError::Overflow)?
                / v.tokens
        };
        // Too small to buy a single share at the current rate.
        if shares == 0 {
            return Err(ValidationError::InvalidAmount);
        }
        let tokens = v.tokens.checked_add(amount).ok_or(ValidationError::Overflow)?;
        let total_shares = v
            .delegator_shares
            .checked_add(shares)
            .ok_or(ValidationError::Overflow)?;
        let held = self
            .delegation(&delegator, &validator)
            .checked_add(shares)
            .ok_or(ValidationError::Overflow)?;

        ledger.transfer(&delegator, &bonded_pool_address(), native, amount)?;

        if let Some(v) = self.validators.get_mut(&validator) {
            v.tokens = tokens;
            v.delegator_shares = total_shares;
        }
        self.delegations.insert((delegator, validator), held);
        Ok(shares)
    }

    /// Redeem `shares` of `validator`. The tokens leave the bonded pool now
    /// and return to the delegator after the unbonding period.
    pub fn undelegate(
        &mut self,
        ledger: &mut Ledger,
        params: &ChainParameters,
        delegator: Address,
        validator: Address,
        shares: Shares,
        now: Timestamp,
    ) -> Result<UnbondingEntry, ValidationError> {
        if shares == 0 {
            return Err(ValidationError::InvalidAmount);
        }
        let v = self
            .validators
            .get(&validator)
            .ok_or_else(|| unknown_validator(&validator))?;
        let held = self.delegation(&delegator, &validator);
        if shares > held {
            return Err(ValidationError::InsufficientShares {
                available: held,
                requested: shares,
            });
        }
        let amount = Self::shares_to_tokens(v, shares)?;
        if amount == 0 {
            return Err(ValidationError::InvalidAmount);
        }
        let completion_time = now
            .checked_add(params.unbonding_period_secs)
            .ok_or(ValidationError::Overflow)?;
        let tokens = v.tokens - amount;
        let total_shares = v.delegator_shares - shares;

        ledger.debit(&bonded_pool_address(), &params.native_denom, amount)?;

        if let Some(v) = self.validators.get_mut(&validator) {
            v.tokens = tokens;
            v.delegator_shares = total_shares;
        }
        if held == shares {
            self.delegations.remove(&(delegator, validator));
        } else {
            self.delegations.insert((delegator, validator), held - shares);
        }

        let entry = UnbondingEntry {
            id: self.next_unbonding_id,
            delegator,
            validator,
            amount,
            created_at: now,
            completion_time,
        };
        self.next_unbonding_id += 1;
        self.unbonding
            .insert((completion_time, entry.id), entry.clone());
        Ok(entry)
    }

    /// Buffer Jailed → Unbonded for the next epoch boundary.
    pub fn request_unjail(&mut self, operator: Address) -> Result<(), ValidationError> {
        let v = self
            .validators
            .get(&operator)
            .ok_or_else(|| unknown_validator(&operator))?;
        if v.status != ValidatorStatus::Jailed {
            return Err(ValidationError::IllegalStatusTransition {
                from: v.status,
                to: ValidatorStatus::Unbonded,
            });
        }
        self.buffer_change(operator, ValidatorStatus::Unbonded);
        Ok(())
    }

    /// Buffer a jail for the next epoch boundary. Returns `false` when the
    /// validator is unknown or already jailed.
    pub fn request_jail(&mut self, validator: Address) -> bool {
        match self.validators.get(&validator) {
            Some(v) if v.status.can_transition_to(ValidatorStatus::Jailed) => {
                self.buffer_change(validator, ValidatorStatus::Jailed);
                true
            }
            _ => false,
        }
    }

    fn buffer_change(&mut self, validator: Address, target: ValidatorStatus) {
        // A later request for the same validator supersedes an earlier one.
        self.pending_changes.retain(|c| c.validator != validator);
        self.pending_changes.push(StatusChange { validator, target });
    }

    // ─── Block finalization ──────────────────────────────────────────────────

    /// Mint `reward` native units across Bonded validators with outstanding
    /// shares, pro-rata by tokens. Returns the amount actually minted; integer
    /// remainders are not minted.
    pub fn distribute_rewards(
        &mut self,
        ledger: &mut Ledger,
        native: &str,
        reward: Amount,
    ) -> Result<Amount, ValidationError> {
        if reward == 0 {
            return Ok(0);
        }
        let eligible: Vec<(Address, Amount)> = self
            .validators
            .values()
            .filter(|v| v.status == ValidatorStatus::Bonded && v.delegator_shares > 0 && v.tokens > 0)
            .map(|v| (v.address, v.tokens))
            .collect();
        let total = eligible
            .iter()
            .fold(0u128, |acc, (_, t)| acc.saturating_add(*t));
        if total == 0 {
            return Ok(0);
        }

        let mut payouts = Vec::with_capacity(eligible.len());
        let mut minted: Amount = 0;
        for (address, tokens) in eligible {
            let share = reward.checked_mul(tokens).ok_or(ValidationError::Overflow)? / total;
            if share > 0 {
                minted += share;
                payouts.push((address, share));
            }
        }
        if minted == 0 {
            return Ok(0);
        }
        ledger.mint(native, &bonded_pool_address(), minted)?;
        for (address, share) in payouts {
            if let Some(v) = self.validators.get_mut(&address) {
                v.tokens = v.tokens.saturating_add(share);
            }
        }
        Ok(minted)
    }

    /// Credit every unbonding entry due at `now` back to its delegator.
    pub fn sweep_unbonding(
        &mut self,
        ledger: &mut Ledger,
        native: &str,
        now: Timestamp,
    ) -> Result<Vec<UnbondingEntry>, ValidationError> {
        let mut completed = Vec::new();
        while let Some(entry) = self.unbonding.first_entry() {
            if entry.key().0 > now {
                break;
            }
            let entry = entry.remove();
            ledger.credit(&entry.delegator, native, entry.amount)?;
            completed.push(entry);
        }
        Ok(completed)
    }

    // ─── Epochs ──────────────────────────────────────────────────────────────

    /// Install the genesis active set. Every listed validator becomes Bonded.
    pub fn bootstrap(&mut self, members: &[Address]) {
        for address in members {
            if let Some(v) = self.validators.get_mut(address) {
                v.status = ValidatorStatus::Bonded;
                v.unbonding_until = None;
            }
        }
        self.active_set = self.snapshot_of(0, members);
    }

    fn snapshot_of(&self, epoch: u64, members: &[Address]) -> ValidatorSetSnapshot {
        let powers = members
            .iter()
            .filter_map(|a| self.validators.get(a))
            .map(|v| ValidatorPower {
                address: v.address,
                pubkey: v.pubkey,
                power: v.tokens,
            })
            .collect();
        ValidatorSetSnapshot::new(epoch, powers)
    }

    /// Apply buffered status changes, mature unbonding validators and select
    /// the next active set.
    ///
    /// If fewer than `min_validators` qualify, nothing changes: the buffered
    /// changes stay queued and the previous active set is kept.
    pub fn process_epoch(&mut self, params: &ChainParameters, now: Timestamp) -> EpochOutcome {
        let mut next = self.validators.clone();
        let mut applied = Vec::new();
        for change in &self.pending_changes {
            if let Some(v) = next.get_mut(&change.validator) {
                if v.status.can_transition_to(change.target) {
                    v.status = change.target;
                    v.unbonding_until = None;
                    applied.push(change.clone());
                }
            }
        }
        for v in next.values_mut() {
            if v.status == ValidatorStatus::Unbonding && v.unbonding_until.is_some_and(|t| t <= now) {
                v.status = ValidatorStatus::Unbonded;
                v.unbonding_until = None;
            }
        }

        let mut candidates: Vec<&Validator> = next
            .values()
            .filter(|v| v.status != ValidatorStatus::Jailed && v.tokens > 0 && v.delegator_shares > 0)
            .collect();
        candidates.sort_by(|a, b| b.tokens.cmp(&a.tokens).then(a.address.cmp(&b.address)));
        candidates.truncate(params.max_validators as usize);

        if candidates.len() < params.min_validators as usize {
            tracing::warn!(
                qualified = candidates.len(),
                min = params.min_validators,
                "too few validators qualify, keeping the previous active set"
            );
            return EpochOutcome {
                applied: Vec::new(),
                rotated: false,
            };
        }

        let selected: Vec<Address> = candidates.iter().map(|v| v.address).collect();
        let until = now.saturating_add(params.unbonding_period_secs);
        for v in next.values_mut() {
            let chosen = selected.contains(&v.address);
            match v.status {
                ValidatorStatus::Bonded if !chosen => {
                    v.status = ValidatorStatus::Unbonding;
                    v.unbonding_until = Some(until);
                }
                ValidatorStatus::Unbonded | ValidatorStatus::Unbonding if chosen => {
                    v.status = ValidatorStatus::Bonded;
                    v.unbonding_until = None;
                }
                _ => {}
            }
        }

        self.validators = next;
        self.pending_changes.clear();
        let epoch = self.active_set.epoch + 1;
        self.active_set = self.snapshot_of(epoch, &selected);
        tracing::info!(
            epoch,
            validators = self.active_set.len(),
            total_power = %self.active_set.total_power,
            "validator set rotated"
        );
        EpochOutcome {
            applied,
            rotated: true,
        }
    }
}
