use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::primitives::*;

/// Registry entry for a denomination.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct DenomMeta {
    pub symbol: Denom,
    pub total_supply: Amount,
    /// Creator of the denom; the zero address for genesis denoms.
    pub creator: Address,
    /// Whether the creator may mint additional supply.
    pub mintable: bool,
    pub created_at: Timestamp,
}

/// A registered name.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct Domain {
    pub name: String,
    pub owner: Address,
    pub registered_at: Timestamp,
    pub expiry: Timestamp,
    pub record: String,
}

impl Domain {
    /// A domain is live while its expiry is at or after the block time.
    pub fn is_live(&self, now: Timestamp) -> bool {
        self.expiry >= now
    }
}

/// Read-only view of an account returned by queries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountView {
    pub address: Address,
    pub balances: BTreeMap<Denom, Amount>,
    pub nonce: u64,
}

impl AccountView {
    pub fn balance(&self, denom: &str) -> Amount {
        self.balances.get(denom).copied().unwrap_or(0)
    }
}
