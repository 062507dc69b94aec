//! Persisted key layout.
//!
//! ```text
//! balance:{address}:{denom}
//! nonce:{address}
//! denom:{symbol}
//! validator:{address}
//! delegation:{delegator}:{validator}
//! unbonding:{delegator}:{validator}:{entry id, 20 digits}
//! domain:{name}
//! params
//! meta:chain
//! meta:head
//! block:{height, 20 digits}
//! ```
//!
//! Addresses are lowercase hex. Numeric components are zero-padded so byte
//! order equals numeric order. Denom symbols and domain names never contain `:`.

use vindex_types::primitives::{address_hex, parse_address, Address, Height};

use crate::error::StorageError;

pub const BALANCE_PREFIX: &str = "balance:";
pub const NONCE_PREFIX: &str = "nonce:";
pub const DENOM_PREFIX: &str = "denom:";
pub const VALIDATOR_PREFIX: &str = "validator:";
pub const DELEGATION_PREFIX: &str = "delegation:";
pub const UNBONDING_PREFIX: &str = "unbonding:";
pub const DOMAIN_PREFIX: &str = "domain:";
pub const BLOCK_PREFIX: &str = "block:";
pub const PARAMS_KEY: &str = "params";
pub const META_CHAIN_KEY: &str = "meta:chain";
pub const META_HEAD_KEY: &str = "meta:head";

/// Prefixes of every key covered by the state root.
pub const STATE_PREFIXES: [&str; 9] = [
    BALANCE_PREFIX,
    DELEGATION_PREFIX,
    DENOM_PREFIX,
    DOMAIN_PREFIX,
    NONCE_PREFIX,
    UNBONDING_PREFIX,
    VALIDATOR_PREFIX,
    META_CHAIN_KEY,
    PARAMS_KEY,
];

pub fn balance_key(address: &Address, denom: &str) -> Vec<u8> {
    format!("{BALANCE_PREFIX}{}:{denom}", address_hex(address)).into_bytes()
}

pub fn nonce_key(address: &Address) -> Vec<u8> {
    format!("{NONCE_PREFIX}{}", address_hex(address)).into_bytes()
}

pub fn denom_key(symbol: &str) -> Vec<u8> {
    format!("{DENOM_PREFIX}{symbol}").into_bytes()
}

pub fn validator_key(address: &Address) -> Vec<u8> {
    format!("{VALIDATOR_PREFIX}{}", address_hex(address)).into_bytes()
}

pub fn delegation_key(delegator: &Address, validator: &Address) -> Vec<u8> {
    format!(
        "{DELEGATION_PREFIX}{}:{}",
        address_hex(delegator),
        address_hex(validator)
    )
    .into_bytes()
}

pub fn unbonding_key(delegator: &Address, validator: &Address, id: u64) -> Vec<u8> {
    format!(
        "{UNBONDING_PREFIX}{}:{}:{id:020}",
        address_hex(delegator),
        address_hex(validator)
    )
    .into_bytes()
}

pub fn domain_key(name: &str) -> Vec<u8> {
    format!("{DOMAIN_PREFIX}{name}").into_bytes()
}

pub fn block_key(height: Height) -> Vec<u8> {
    format!("{BLOCK_PREFIX}{height:020}").into_bytes()
}

// ─── Parsing ─────────────────────────────────────────────────────────────────

/// Split a key into its `:`-separated components after `prefix`.
fn components<'a>(key: &'a [u8], prefix: &str) -> Result<Vec<&'a str>, StorageError> {
    let text = std::str::from_utf8(key).map_err(|_| corrupt(key))?;
    let rest = text.strip_prefix(prefix).ok_or_else(|| corrupt(key))?;
    Ok(rest.split(':').collect())
}

fn address_part(part: &str, key: &[u8]) -> Result<Address, StorageError> {
    parse_address(part).ok_or_else(|| corrupt(key))
}

fn corrupt(key: &[u8]) -> StorageError {
    StorageError::CorruptKey {
        key: String::from_utf8_lossy(key).into_owned(),
    }
}

/// Parse `balance:{address}:{denom}`.
pub fn parse_balance_key(key: &[u8]) -> Result<(Address, String), StorageError> {
    match components(key, BALANCE_PREFIX)?.as_slice() {
        [addr, denom] if !denom.is_empty() => Ok((address_part(addr, key)?, denom.to_string())),
        _ => Err(corrupt(key)),
    }
}

/// Parse `nonce:{address}`.
pub fn parse_nonce_key(key: &[u8]) -> Result<Address, StorageError> {
    match components(key, NONCE_PREFIX)?.as_slice() {
        [addr] => address_part(addr, key),
        _ => Err(corrupt(key)),
    }
}

/// Parse `delegation:{delegator}:{validator}`.
pub fn parse_delegation_key(key: &[u8]) -> Result<(Address, Address), StorageError> {
    match components(key, DELEGATION_PREFIX)?.as_slice() {
        [d, v] => Ok((address_part(d, key)?, address_part(v, key)?)),
        _ => Err(corrupt(key)),
    }
}
