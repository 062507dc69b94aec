use vindex_chain::genesis::{build_genesis_state, genesis_block};
use vindex_crypto::keys::Keypair;
use vindex_types::constants::ONE_OC;
use vindex_types::genesis::{ChainParameters, GenesisAllocation, GenesisConfig, GenesisValidator};
use vindex_types::primitives::{Address, Hash};

use crate::error::NodeError;

/// Seed of the devnet validator keypair used by `--dev`.
pub const DEVNET_VALIDATOR_SEED: &str =
    "0000000000000000000000000000000000000000000000000000000000000001";

/// Seed of the pre-funded devnet faucet account.
pub const DEVNET_FAUCET_SEED: &str =
    "0000000000000000000000000000000000000000000000000000000000000002";

pub const DEVNET_CHAIN_ID: &str = "vindexchain-dev";

/// Genesis time of the devnet: 2024-01-01T00:00:00Z.
const DEVNET_GENESIS_TIME: u64 = 1_704_067_200;

/// A single-validator devnet genesis with a funded faucet account.
///
/// Returns `(genesis_config, faucet_address)`.
pub fn devnet_genesis() -> Result<(GenesisConfig, Address), NodeError> {
    let keypair = |seed: &str| {
        Keypair::from_hex_seed(seed).map_err(|e| NodeError::GenesisError {
            reason: format!("devnet key: {}", e),
        })
    };
    let validator = keypair(DEVNET_VALIDATOR_SEED)?;
    let faucet = keypair(DEVNET_FAUCET_SEED)?.address();

    let config = GenesisConfig {
        chain_id: DEVNET_CHAIN_ID.to_string(),
        genesis_time: DEVNET_GENESIS_TIME,
        validators: vec![GenesisValidator {
            address: validator.address(),
            pubkey: validator.public_key(),
            stake: 1_000_000 * ONE_OC,
        }],
        allocations: vec![GenesisAllocation {
            address: faucet,
            denom: "oc".to_string(),
            amount: 10_000_000 * ONE_OC,
        }],
        parameters: ChainParameters {
            min_validators: 1,
            ..ChainParameters::default()
        },
    };
    Ok((config, faucet))
}

/// Load and validate a genesis config from a JSON file.
pub fn load_genesis(path: &str) -> Result<GenesisConfig, NodeError> {
    let contents = std::fs::read_to_string(path).map_err(|e| NodeError::GenesisError {
        reason: format!("failed to read genesis file '{}': {}", path, e),
    })?;
    let config: GenesisConfig =
        serde_json::from_str(&contents).map_err(|e| NodeError::GenesisError {
            reason: format!("failed to parse genesis file '{}': {}", path, e),
        })?;
    config.validate().map_err(|e| NodeError::GenesisError {
        reason: e.to_string(),
    })?;
    Ok(config)
}

/// Identity of a genesis: the height-0 block hash and state root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenesisSummary {
    pub chain_id: String,
    pub block_hash: Hash,
    pub state_root: Hash,
    pub validators: usize,
}

/// Build the genesis state from `config` and summarise it.
pub fn summarize_genesis(config: &GenesisConfig) -> Result<GenesisSummary, NodeError> {
    let state = build_genesis_state(config)?;
    let block = genesis_block(&state)?;
    Ok(GenesisSummary {
        chain_id: config.chain_id.clone(),
        block_hash: block.hash(),
        state_root: block.header.state_root,
        validators: config.validators.len(),
    })
}

/// Validate the genesis file at `path` and print its identity as JSON.
pub fn check_genesis(path: &str) -> Result<(), NodeError> {
    let config = load_genesis(path)?;
    let summary = summarize_genesis(&config)?;
    let output = serde_json::json!({
        "chain_id": summary.chain_id,
        "genesis_time": chrono::DateTime::from_timestamp(config.genesis_time as i64, 0)
            .map(|t| t.to_rfc3339())
            .unwrap_or_default(),
        "block_hash": hex::encode(summary.block_hash),
        "state_root": hex::encode(summary.state_root),
        "validators": summary.validators,
        "allocations": config.allocations.len(),
    });
    let json_str = serde_json::to_string_pretty(&output).map_err(|e| NodeError::GenesisError {
        reason: format!("failed to serialize genesis summary: {}", e),
    })?;
    println!("{}", json_str);
    Ok(())
}
