use std::collections::BTreeMap;

use vindex_types::error::ValidationError;
use vindex_types::ledger::{AccountView, DenomMeta};
use vindex_types::primitives::*;

/// Multi-denomination balances, account nonces and the denom registry.
///
/// Every mutating operation checks all of its preconditions before touching
/// any balance, so a failed call leaves the ledger unchanged. Zero balances
/// are removed so two ledgers with equal holdings compare equal.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    pub(crate) balances: BTreeMap<Address, BTreeMap<Denom, Amount>>,
    pub(crate) nonces: BTreeMap<Address, u64>,
    pub(crate) denoms: BTreeMap<Denom, DenomMeta>,
}

/// Accounts with no balances and a zero nonce are not persisted, so they
/// do not take part in equality either.
impl PartialEq for Ledger {
    fn eq(&self, other: &Self) -> bool {
        let funded = |l: &Self| {
            l.balances
                .iter()
                .filter(|(_, b)| !b.is_empty())
                .map(|(a, b)| (*a, b.clone()))
                .collect::<Vec<_>>()
        };
        let used = |l: &Self| {
            l.nonces
                .iter()
                .filter(|(_, n)| **n > 0)
                .map(|(a, n)| (*a, *n))
                .collect::<Vec<_>>()
        };
        self.denoms == other.denoms && funded(self) == funded(other) && used(self) == used(other)
    }
}

impl Eq for Ledger {}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make an account known to the ledger. Idempotent.
    pub fn create_account(&mut self, address: Address) {
        self.balances.entry(address).or_default();
    }

    pub fn balance(&self, address: &Address, denom: &str) -> Amount {
        self.balances
            .get(address)
            .and_then(|b| b.get(denom))
            .copied()
            .unwrap_or(0)
    }

    pub fn nonce(&self, address: &Address) -> u64 {
        self.nonces.get(address).copied().unwrap_or(0)
    }

    pub(crate) fn increment_nonce(&mut self, address: &Address) {
        let nonce = self.nonces.entry(*address).or_insert(0);
        *nonce = nonce.saturating_add(1);
    }

    /// Snapshot of one account. Unknown accounts read as empty.
    pub fn account(&self, address: &Address) -> AccountView {
        AccountView {
            address: *address,
            balances: self.balances.get(address).cloned().unwrap_or_default(),
            nonce: self.nonce(address),
        }
    }

    pub fn denom(&self, symbol: &str) -> Option<&DenomMeta> {
        self.denoms.get(symbol)
    }

    pub fn denoms(&self) -> impl Iterator<Item = &DenomMeta> {
        self.denoms.values()
    }

    /// Sum of every account balance in `denom`.
    pub fn circulating(&self, denom: &str) -> Amount {
        self.balances
            .values()
            .filter_map(|b| b.get(denom))
            .fold(0u128, |acc, v| acc.saturating_add(*v))
    }

    // ─── Checks ──────────────────────────────────────────────────────────────

    fn require_denom(&self, denom: &str) -> Result<&DenomMeta, ValidationError> {
        self.denoms
            .get(denom)
            .ok_or_else(|| ValidationError::UnknownDenom {
                symbol: denom.to_string(),
            })
    }

    /// Verify a credit would succeed without applying it.
    pub fn check_credit(
        &self,
        address: &Address,
        denom: &str,
        amount: Amount,
    ) -> Result<(), ValidationError> {
        if amount == 0 {
            return Err(ValidationError::InvalidAmount);
        }
        self.require_denom(denom)?;
        self.balance(address, denom)
            .checked_add(amount)
            .map(|_| ())
            .ok_or(ValidationError::Overflow)
    }

    /// Verify a debit would succeed without applying it.
    pub fn check_debit(
        &self,
        address: &Address,
        denom: &str,
        amount: Amount,
    ) -> Result<(), ValidationError> {
        if amount == 0 {
            return Err(ValidationError::InvalidAmount);
        }
        self.require_denom(denom)?;
        let available = self.balance(address, denom);
        if available < amount {
            return Err(ValidationError::InsufficientFunds {
                denom: denom.to_string(),
                available,
                required: amount,
            });
        }
        Ok(())
    }

    // ─── Mutations ───────────────────────────────────────────────────────────

    fn set_balance(&mut self, address: &Address, denom: &str, amount: Amount) {
        let balances = self.balances.entry(*address).or_default();
        if amount == 0 {
            balances.remove(denom);
        } else {
            balances.insert(denom.to_string(), amount);
        }
    }

    /// Add `amount` of `denom` to an account, creating it if needed.
    pub fn credit(
        &mut self,
        address: &Address,
        denom: &str,
        amount: Amount,
    ) -> Result<(), ValidationError> {
        self.check_credit(address, denom, amount)?;
        let next = self.balance(address, denom) + amount;
        self.set_balance(address, denom, next);
        Ok(())
    }

    /// Remove `amount` of `denom` from an account.
    pub fn debit(
        &mut self,
        address: &Address,
        denom: &str,
        amount: Amount,
    ) -> Result<(), ValidationError> {
        self.check_debit(address, denom, amount)?;
        let next = self.balance(address, denom) - amount;
        self.set_balance(address, denom, next);
        Ok(())
    }

    /// Move `amount` between two accounts atomically.
    pub fn transfer(
        &mut self,
        from: &Address,
        to: &Address,
        denom: &str,
        amount: Amount,
    ) -> Result<(), ValidationError> {
        self.check_debit(from, denom, amount)?;
        if from == to {
            return Ok(());
        }
        self.check_credit(to, denom, amount)?;
        self.debit(from, denom, amount)?;
        self.credit(to, denom, amount)
    }

    /// Register a new denom and credit its initial supply to `owner`.
    pub fn mint_denom(
        &mut self,
        symbol: &str,
        initial_supply: Amount,
        owner: Address,
        mintable: bool,
        created_at: Timestamp,
    ) -> Result<(), ValidationError> {
        if self.denoms.contains_key(symbol) {
            return Err(ValidationError::DuplicateDenom {
                symbol: symbol.to_string(),
            });
        }
        self.denoms.insert(
            symbol.to_string(),
            DenomMeta {
                symbol: symbol.to_string(),
                total_supply: initial_supply,
                creator: owner,
                mintable,
                created_at,
            },
        );
        if initial_supply > 0 {
            self.set_balance(&owner, symbol, initial_supply);
        } else {
            self.create_account(owner);
        }
        Ok(())
    }

    /// Create new units of an existing denom, growing its total supply.
    ///
    /// Mintability is a token factory rule and is not checked here; protocol
    /// issuance (block rewards, genesis) goes through this too.
    pub fn mint(
        &mut self,
        denom: &str,
        to: &Address,
        amount: Amount,
    ) -> Result<(), ValidationError> {
        self.check_credit(to, denom, amount)?;
        let supply = self
            .require_denom(denom)?
            .total_supply
            .checked_add(amount)
            .ok_or(ValidationError::Overflow)?;
        self.credit(to, denom, amount)?;
        if let Some(meta) = self.denoms.get_mut(denom) {
            meta.total_supply = supply;
        }
        Ok(())
    }

    /// Destroy `amount` held by `from`, shrinking total supply.
    pub fn burn_supply(
        &mut self,
        denom: &str,
        from: &Address,
        amount: Amount,
    ) -> Result<(), ValidationError> {
        self.check_debit(from, denom, amount)?;
        self.debit(from, denom, amount)?;
        if let Some(meta) = self.denoms.get_mut(denom) {
            meta.total_supply = meta.total_supply.saturating_sub(amount);
        }
        Ok(())
    }
}
