use vindex_crypto::address::address_matches;
use vindex_types::block::Block;
use vindex_types::error::ConfigError;
use vindex_types::genesis::GenesisConfig;
use vindex_types::name::validate_symbol;
use vindex_types::primitives::*;

use crate::block::assemble_block;
use crate::error::ChainError;
use crate::state::ChainState;

/// Build the state at height 0 from a genesis configuration.
///
/// Allocations are minted first. Each validator's stake is then minted to
/// its operator and self-delegated, and the whole genesis set is installed
/// as the epoch-0 active set.
pub fn build_genesis_state(config: &GenesisConfig) -> Result<ChainState, ChainError> {
    config.validate()?;
    for v in &config.validators {
        if !address_matches(&v.address, &v.pubkey) {
            return Err(genesis_error(format!(
                "validator {} does not match its public key",
                address_hex(&v.address)
            )));
        }
    }

    let params = config.parameters.clone();
    let native = params.native_denom.clone();
    let time = config.genesis_time;
    let mut state = ChainState::empty(config.chain_id.clone(), params, time);

    state
        .ledger
        .mint_denom(&native, 0, [0u8; 20], false, time)
        .map_err(|e| genesis_error(format!("native denom: {e}")))?;

    for a in &config.allocations {
        if state.ledger.denom(&a.denom).is_none() {
            validate_symbol(&a.denom)
                .map_err(|e| genesis_error(format!("allocation denom {}: {e}", a.denom)))?;
            state
                .ledger
                .mint_denom(&a.denom, 0, [0u8; 20], false, time)
                .map_err(|e| genesis_error(e.to_string()))?;
        }
        state
            .ledger
            .mint(&a.denom, &a.address, a.amount)
            .map_err(|e| genesis_error(format!("allocation to {}: {e}", address_hex(&a.address))))?;
    }

    let mut members = Vec::with_capacity(config.validators.len());
    for v in &config.validators {
        let stake_err = |e: vindex_types::error::ValidationError| {
            genesis_error(format!("validator {}: {e}", address_hex(&v.address)))
        };
        state.ledger.mint(&native, &v.address, v.stake).map_err(stake_err)?;
        state
            .staking
            .create_validator(&mut state.ledger, &native, v.address, v.pubkey, v.stake)
            .map_err(stake_err)?;
        members.push(v.address);
    }
    state.staking.bootstrap(&members);
    state.check_invariants()?;

    let block = genesis_block(&state)?;
    state.last_block_hash = block.hash();
    tracing::info!(
        chain_id = %state.chain_id,
        validators = members.len(),
        allocations = config.allocations.len(),
        "genesis state built"
    );
    Ok(state)
}

/// The height-0 block committing to the genesis state.
pub fn genesis_block(state: &ChainState) -> Result<Block, ChainError> {
    Ok(assemble_block(
        0,
        0,
        state.genesis_time,
        [0u8; 20],
        ZERO_HASH,
        Vec::new(),
        Vec::new(),
        state.state_root()?,
    ))
}

fn genesis_error(reason: String) -> ChainError {
    ChainError::Config(ConfigError::InvalidGenesis { reason })
}
