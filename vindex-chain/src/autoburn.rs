use vindex_types::constants::BPS_DENOMINATOR;
use vindex_types::error::ValidationError;
use vindex_types::genesis::ChainParameters;
use vindex_types::primitives::*;

use crate::ledger::Ledger;

/// Whether a burn is due at block time `now`.
pub fn is_due(last_burn: Timestamp, now: Timestamp, threshold: Timestamp) -> bool {
    now >= last_burn && now - last_burn >= threshold
}

/// Amount the next burn would destroy: the configured share of native
/// supply, capped at what the treasury holds.
pub fn burn_amount(ledger: &Ledger, params: &ChainParameters) -> Result<Amount, ValidationError> {
    let supply = ledger
        .denom(&params.native_denom)
        .map(|d| d.total_supply)
        .unwrap_or(0);
    let target = supply
        .checked_mul(params.auto_burn_rate_bps as Amount)
        .ok_or(ValidationError::Overflow)?
        / BPS_DENOMINATOR;
    Ok(target.min(ledger.balance(&params.treasury, &params.native_denom)))
}

/// Run the periodic burn if it is due. Updates `last_burn` to `now` whenever
/// the threshold was reached, even if the treasury was empty.
///
/// Returns the amount burned, or `None` when no burn was due.
pub fn run_auto_burn(
    ledger: &mut Ledger,
    params: &ChainParameters,
    last_burn: &mut Timestamp,
    now: Timestamp,
) -> Result<Option<Amount>, ValidationError> {
    if !is_due(*last_burn, now, params.auto_burn_threshold_secs) {
        return Ok(None);
    }
    let amount = burn_amount(ledger, params)?;
    if amount > 0 {
        ledger.burn_supply(&params.native_denom, &params.treasury, amount)?;
    }
    *last_burn = now;
    tracing::info!(amount = %amount, at = now, "auto-burn executed");
    Ok(Some(amount))
}
