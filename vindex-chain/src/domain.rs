use std::collections::BTreeMap;

use vindex_types::constants::SECONDS_PER_YEAR;
use vindex_types::error::ValidationError;
use vindex_types::genesis::ChainParameters;
use vindex_types::ledger::Domain;
use vindex_types::name::{validate_domain_name, validate_record, validate_years};
use vindex_types::primitives::*;

use crate::ledger::Ledger;

/// Registry of human-readable names with time-bounded ownership.
///
/// A domain whose expiry is before the current block time is free for anyone
/// to register again; there is no grace period for the previous owner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainRegistry {
    pub(crate) domains: BTreeMap<String, Domain>,
}

fn period(years: u32) -> Result<Timestamp, ValidationError> {
    validate_years(years)?;
    (years as Timestamp)
        .checked_mul(SECONDS_PER_YEAR)
        .ok_or(ValidationError::Overflow)
}

fn fee_for(per_year: Amount, years: u32) -> Result<Amount, ValidationError> {
    per_year
        .checked_mul(years as Amount)
        .ok_or(ValidationError::Overflow)
}

impl DomainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Domain> {
        self.domains.get(name)
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    /// Domains owned by `owner`, including expired ones not yet re-registered.
    pub fn owned_by(&self, owner: &Address) -> Vec<&Domain> {
        self.domains.values().filter(|d| &d.owner == owner).collect()
    }

    /// The domain if it exists, is owned by `caller` and has not expired.
    fn owned_live(&self, caller: &Address, name: &str, now: Timestamp) -> Result<&Domain, ValidationError> {
        let domain = self
            .domains
            .get(name)
            .ok_or_else(|| ValidationError::DomainNotFound {
                name: name.to_string(),
            })?;
        if &domain.owner != caller {
            return Err(ValidationError::NotOwner);
        }
        if !domain.is_live(now) {
            return Err(ValidationError::DomainExpired {
                name: name.to_string(),
                expiry: domain.expiry,
            });
        }
        Ok(domain)
    }

    fn charge(
        ledger: &mut Ledger,
        params: &ChainParameters,
        payer: &Address,
        fee: Amount,
    ) -> Result<(), ValidationError> {
        if fee == 0 {
            return Ok(());
        }
        ledger.transfer(payer, &params.treasury, &params.native_denom, fee)
    }

    /// Register `name` for `years`, replacing an expired registration.
    #[allow(clippy::too_many_arguments)]
    pub fn register(
        &mut self,
        ledger: &mut Ledger,
        params: &ChainParameters,
        owner: Address,
        name: &str,
        years: u32,
        record: &str,
        now: Timestamp,
    ) -> Result<Domain, ValidationError> {
        validate_domain_name(name)?;
        validate_record(record)?;
        let span = period(years)?;
        if let Some(existing) = self.domains.get(name) {
            if existing.is_live(now) {
                return Err(ValidationError::DomainTaken {
                    name: name.to_string(),
                });
            }
        }
        let expiry = now.checked_add(span).ok_or(ValidationError::Overflow)?;
        let fee = fee_for(params.domain_registration_fee, years)?;
        Self::charge(ledger, params, &owner, fee)?;

        let domain = Domain {
            name: name.to_string(),
            owner,
            registered_at: now,
            expiry,
            record: record.to_string(),
        };
        self.domains.insert(name.to_string(), domain.clone());
        Ok(domain)
    }

    /// Extend a live domain by `years`, counted from its current expiry.
    pub fn renew(
        &mut self,
        ledger: &mut Ledger,
        params: &ChainParameters,
        caller: Address,
        name: &str,
        years: u32,
        now: Timestamp,
    ) -> Result<Domain, ValidationError> {
        let span = period(years)?;
        let domain = self.owned_live(&caller, name, now)?;
        let expiry = domain
            .expiry
            .checked_add(span)
            .ok_or(ValidationError::Overflow)?;
        let fee = fee_for(params.domain_renewal_fee, years)?;
        Self::charge(ledger, params, &caller, fee)?;

        let domain = self
            .domains
            .get_mut(name)
            .ok_or_else(|| ValidationError::DomainNotFound {
                name: name.to_string(),
            })?;
        domain.expiry = expiry;
        Ok(domain.clone())
    }

    pub fn update_record(
        &mut self,
        caller: Address,
        name: &str,
        record: &str,
        now: Timestamp,
    ) -> Result<(), ValidationError> {
        validate_record(record)?;
        self.owned_live(&caller, name, now)?;
        if let Some(domain) = self.domains.get_mut(name) {
            domain.record = record.to_string();
        }
        Ok(())
    }

    pub fn transfer(
        &mut self,
        caller: Address,
        name: &str,
        new_owner: Address,
        now: Timestamp,
    ) -> Result<(), ValidationError> {
        self.owned_live(&caller, name, now)?;
        if let Some(domain) = self.domains.get_mut(name) {
            domain.owner = new_owner;
        }
        Ok(())
    }
}
