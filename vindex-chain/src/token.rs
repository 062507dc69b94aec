use vindex_types::error::ValidationError;
use vindex_types::genesis::ChainParameters;
use vindex_types::name::validate_symbol;
use vindex_types::primitives::*;

use crate::ledger::Ledger;

/// Where a token creation fee went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeDistribution {
    pub fee: Amount,
    /// (pool, amount) in liquidity, validator, dev team, LP order. Sums to `fee`.
    pub credits: Vec<(Address, Amount)>,
}

/// Split `fee` by the configured percentages. Integer remainders go to the
/// liquidity pool so the credits always sum to exactly `fee`.
pub fn split_fee(params: &ChainParameters, fee: Amount) -> Result<FeeDistribution, ValidationError> {
    let split = &params.fee_split;
    let total = split.total();
    if total != 100 {
        return Err(ValidationError::InvalidFeeSplit { total });
    }
    let pools = &params.fee_pools;
    let portion = |pct: u64| -> Result<Amount, ValidationError> {
        fee.checked_mul(pct as Amount)
            .map(|v| v / 100)
            .ok_or(ValidationError::Overflow)
    };
    let validator = portion(split.validator)?;
    let dev_team = portion(split.dev_team)?;
    let lp = portion(split.lp)?;
    let liquidity = fee - validator - dev_team - lp;
    Ok(FeeDistribution {
        fee,
        credits: vec![
            (pools.liquidity, liquidity),
            (pools.validator, validator),
            (pools.dev_team, dev_team),
            (pools.lp, lp),
        ],
    })
}

/// Issue a new denom: charge the creation fee, route it to the fee pools and
/// mint `total_supply` to the creator.
pub fn create_token(
    ledger: &mut Ledger,
    params: &ChainParameters,
    creator: Address,
    symbol: &str,
    total_supply: Amount,
    mintable: bool,
    now: Timestamp,
) -> Result<FeeDistribution, ValidationError> {
    validate_symbol(symbol)?;
    if ledger.denom(symbol).is_some() {
        return Err(ValidationError::DuplicateDenom {
            symbol: symbol.to_string(),
        });
    }
    if total_supply == 0 {
        return Err(ValidationError::InvalidAmount);
    }
    let distribution = split_fee(params, params.token_creation_fee)?;
    let native = params.native_denom.as_str();
    if distribution.fee > 0 {
        ledger.check_debit(&creator, native, distribution.fee)?;
        for (pool, amount) in &distribution.credits {
            if *amount > 0 && pool != &creator {
                ledger.check_credit(pool, native, *amount)?;
            }
        }
        ledger.debit(&creator, native, distribution.fee)?;
        for (pool, amount) in &distribution.credits {
            if *amount > 0 {
                ledger.credit(pool, native, *amount)?;
            }
        }
    }
    ledger.mint_denom(symbol, total_supply, creator, mintable, now)?;
    tracing::debug!(symbol, supply = %total_supply, "token created");
    Ok(distribution)
}

/// Mint more of a mintable denom. Only its creator may do so.
pub fn mint_token(
    ledger: &mut Ledger,
    caller: Address,
    symbol: &str,
    to: Address,
    amount: Amount,
) -> Result<(), ValidationError> {
    let meta = ledger
        .denom(symbol)
        .ok_or_else(|| ValidationError::UnknownDenom {
            symbol: symbol.to_string(),
        })?;
    if meta.creator != caller {
        return Err(ValidationError::NotOwner);
    }
    if !meta.mintable {
        return Err(ValidationError::NotMintable {
            symbol: symbol.to_string(),
        });
    }
    ledger.mint(symbol, &to, amount)
}

/// Destroy tokens held by `holder`.
pub fn burn_token(
    ledger: &mut Ledger,
    holder: Address,
    symbol: &str,
    amount: Amount,
) -> Result<(), ValidationError> {
    ledger.burn_supply(symbol, &holder, amount)
}
