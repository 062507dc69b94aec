use std::collections::BTreeSet;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::ConfigError;
use crate::primitives::*;

/// Genesis input, read from a JSON file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisConfig {
    pub chain_id: String,
    /// Genesis block time; also the initial last-burn time.
    pub genesis_time: Timestamp,
    pub validators: Vec<GenesisValidator>,
    #[serde(default)]
    pub allocations: Vec<GenesisAllocation>,
    #[serde(default)]
    pub parameters: ChainParameters,
}

/// A validator in the genesis set. Its stake is minted into the bonded pool
/// as a self-delegation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisValidator {
    #[serde(with = "crate::primitives::serde_hex")]
    pub address: Address,
    #[serde(with = "crate::primitives::serde_hex")]
    pub pubkey: PublicKey,
    pub stake: Amount,
}

/// An initial balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisAllocation {
    #[serde(with = "crate::primitives::serde_hex")]
    pub address: Address,
    pub denom: Denom,
    pub amount: Amount,
}

/// Percentages of the token creation fee routed to each pool.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct FeeSplit {
    pub liquidity: u64,
    pub validator: u64,
    pub dev_team: u64,
    pub lp: u64,
}

impl FeeSplit {
    pub fn total(&self) -> u64 {
        self.liquidity
            .saturating_add(self.validator)
            .saturating_add(self.dev_team)
            .saturating_add(self.lp)
    }
}

impl Default for FeeSplit {
    fn default() -> Self {
        Self {
            liquidity: FEE_SPLIT_LIQUIDITY,
            validator: FEE_SPLIT_VALIDATOR,
            dev_team: FEE_SPLIT_DEV_TEAM,
            lp: FEE_SPLIT_LP,
        }
    }
}

/// Accounts receiving the token creation fee.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct FeePools {
    #[serde(with = "crate::primitives::serde_hex")]
    pub liquidity: Address,
    #[serde(with = "crate::primitives::serde_hex")]
    pub validator: Address,
    #[serde(with = "crate::primitives::serde_hex")]
    pub dev_team: Address,
    #[serde(with = "crate::primitives::serde_hex")]
    pub lp: Address,
}

impl Default for FeePools {
    fn default() -> Self {
        Self {
            liquidity: module_address(LIQUIDITY_POOL_LABEL),
            validator: module_address(VALIDATOR_POOL_LABEL),
            dev_team: module_address(DEV_TEAM_POOL_LABEL),
            lp: module_address(LP_POOL_LABEL),
        }
    }
}

/// Protocol parameters fixed at genesis.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainParameters {
    pub native_denom: Denom,
    pub min_validators: u32,
    pub max_validators: u32,
    pub block_time_secs: u64,
    pub epoch_length: u64,
    pub unbonding_period_secs: Timestamp,
    pub token_creation_fee: Amount,
    pub fee_split: FeeSplit,
    pub fee_pools: FeePools,
    pub domain_registration_fee: Amount,
    pub domain_renewal_fee: Amount,
    /// Share of the native supply burned per AutoBurn, in basis points.
    pub auto_burn_rate_bps: u64,
    pub auto_burn_threshold_secs: Timestamp,
    /// AutoBurn reserve; also receives domain fees.
    #[serde(with = "crate::primitives::serde_hex")]
    pub treasury: Address,
    /// Native units minted per block for bonded validators.
    pub block_reward: Amount,
}

impl Default for ChainParameters {
    fn default() -> Self {
        Self {
            native_denom: NATIVE_DENOM.to_string(),
            min_validators: MIN_VALIDATORS,
            max_validators: MAX_VALIDATORS,
            block_time_secs: BLOCK_TIME_SECS,
            epoch_length: EPOCH_LENGTH,
            unbonding_period_secs: UNBONDING_PERIOD_SECS,
            token_creation_fee: TOKEN_CREATION_FEE,
            fee_split: FeeSplit::default(),
            fee_pools: FeePools::default(),
            domain_registration_fee: DOMAIN_REGISTRATION_FEE,
            domain_renewal_fee: DOMAIN_RENEWAL_FEE,
            auto_burn_rate_bps: AUTO_BURN_RATE_BPS,
            auto_burn_threshold_secs: AUTO_BURN_THRESHOLD_SECS,
            treasury: module_address(TREASURY_LABEL),
            block_reward: DEFAULT_BLOCK_REWARD,
        }
    }
}

impl ChainParameters {
    /// Reject parameter sets the node must not start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.native_denom.is_empty() {
            return Err(invalid("native_denom", "must not be empty"));
        }
        if self.min_validators == 0 {
            return Err(invalid("min_validators", "must be at least 1"));
        }
        if self.min_validators > self.max_validators {
            return Err(ConfigError::ValidatorBounds {
                min: self.min_validators,
                max: self.max_validators,
            });
        }
        if self.block_time_secs == 0 {
            return Err(invalid("block_time_secs", "must be positive"));
        }
        if self.epoch_length == 0 {
            return Err(invalid("epoch_length", "must be positive"));
        }
        let total = self.fee_split.total();
        if total != 100 {
            return Err(ConfigError::InvalidFeeSplit { total });
        }
        if self.auto_burn_rate_bps as u128 > BPS_DENOMINATOR {
            return Err(invalid("auto_burn_rate_bps", "must be at most 10000"));
        }
        if self.auto_burn_threshold_secs == 0 {
            return Err(invalid("auto_burn_threshold_secs", "must be positive"));
        }
        Ok(())
    }
}

fn invalid(name: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidParameter {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

impl GenesisConfig {
    /// Validate parameters and the shape of the initial validator set and allocations.
    ///
    /// Key/address consistency is checked by the chain crate, which owns address derivation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chain_id.is_empty() {
            return Err(ConfigError::InvalidGenesis {
                reason: "chain_id must not be empty".to_string(),
            });
        }
        self.parameters.validate()?;

        let count = self.validators.len();
        let (min, max) = (self.parameters.min_validators, self.parameters.max_validators);
        if count < min as usize || count > max as usize {
            return Err(ConfigError::ValidatorCount { count, min, max });
        }

        let mut seen = BTreeSet::new();
        for v in &self.validators {
            if v.stake == 0 {
                return Err(ConfigError::InvalidGenesis {
                    reason: format!("validator {} has zero stake", address_hex(&v.address)),
                });
            }
            if !seen.insert(v.address) {
                return Err(ConfigError::InvalidGenesis {
                    reason: format!("duplicate validator {}", address_hex(&v.address)),
                });
            }
        }

        for a in &self.allocations {
            if a.denom.is_empty() || a.amount == 0 {
                return Err(ConfigError::InvalidGenesis {
                    reason: format!(
                        "allocation to {} must have a denom and a positive amount",
                        address_hex(&a.address)
                    ),
                });
            }
        }
        Ok(())
    }
}
