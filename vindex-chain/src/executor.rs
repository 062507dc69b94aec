use serde::Serialize;

use vindex_types::error::ValidationError;
use vindex_types::primitives::*;
use vindex_types::transaction::{Transaction, TxPayload};

use crate::state::ChainState;
use crate::token;
use crate::transaction::verify_transaction;

/// A state change emitted by a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerEvent {
    Transfer {
        from: Address,
        to: Address,
        denom: Denom,
        amount: Amount,
    },
    Delegated {
        delegator: Address,
        validator: Address,
        amount: Amount,
        shares: Shares,
    },
    UnbondingStarted {
        delegator: Address,
        validator: Address,
        amount: Amount,
        entry_id: u64,
        completion_time: Timestamp,
    },
    ValidatorCreated {
        validator: Address,
        self_bond: Amount,
    },
    UnjailRequested {
        validator: Address,
    },
    TokenCreated {
        symbol: Denom,
        creator: Address,
        total_supply: Amount,
    },
    FeePaid {
        from: Address,
        to: Address,
        amount: Amount,
    },
    Minted {
        denom: Denom,
        to: Address,
        amount: Amount,
    },
    Burned {
        denom: Denom,
        from: Address,
        amount: Amount,
    },
    DomainRegistered {
        name: String,
        owner: Address,
        expiry: Timestamp,
    },
    DomainRenewed {
        name: String,
        expiry: Timestamp,
    },
    DomainRecordUpdated {
        name: String,
    },
    DomainTransferred {
        name: String,
        from: Address,
        to: Address,
    },
}

/// Outcome of a successfully applied transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TxReceipt {
    pub tx_hash: Hash,
    pub kind: String,
    pub events: Vec<LedgerEvent>,
}

/// Per-transaction result inside an applied block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutcome {
    pub tx_hash: Hash,
    pub result: Result<TxReceipt, ValidationError>,
}

/// Verify and apply one transaction at block time `now`.
pub fn apply_transaction(
    state: &mut ChainState,
    tx: &Transaction,
    now: Timestamp,
) -> Result<TxReceipt, ValidationError> {
    verify_transaction(tx)?;
    execute_transaction(state, tx, now)
}

/// Apply a transaction whose signature has already been verified.
///
/// The nonce must equal the sender's current nonce and is incremented on
/// success. On error the state is unchanged.
pub fn execute_transaction(
    state: &mut ChainState,
    tx: &Transaction,
    now: Timestamp,
) -> Result<TxReceipt, ValidationError> {
    let expected = state.ledger.nonce(&tx.sender);
    if tx.nonce != expected {
        return Err(ValidationError::BadNonce {
            expected,
            actual: tx.nonce,
        });
    }
    let events = dispatch(state, tx, now)?;
    state.ledger.increment_nonce(&tx.sender);
    Ok(TxReceipt {
        tx_hash: tx.hash(),
        kind: tx.payload.kind().to_string(),
        events,
    })
}

fn dispatch(
    state: &mut ChainState,
    tx: &Transaction,
    now: Timestamp,
) -> Result<Vec<LedgerEvent>, ValidationError> {
    let sender = tx.sender;
    let native = state.params.native_denom.clone();
    let params = &state.params;
    let ledger = &mut state.ledger;

    match &tx.payload {
        TxPayload::Transfer { to, denom, amount } => {
            ledger.transfer(&sender, to, denom, *amount)?;
            Ok(vec![LedgerEvent::Transfer {
                from: sender,
                to: *to,
                denom: denom.clone(),
                amount: *amount,
            }])
        }
        TxPayload::Delegate { validator, amount } => {
            let shares = state
                .staking
                .delegate(ledger, &native, sender, *validator, *amount)?;
            Ok(vec![LedgerEvent::Delegated {
                delegator: sender,
                validator: *validator,
                amount: *amount,
                shares,
            }])
        }
        TxPayload::Undelegate { validator, shares } => {
            let entry = state
                .staking
                .undelegate(ledger, params, sender, *validator, *shares, now)?;
            Ok(vec![LedgerEvent::UnbondingStarted {
                delegator: sender,
                validator: *validator,
                amount: entry.amount,
                entry_id: entry.id,
                completion_time: entry.completion_time,
            }])
        }
        TxPayload::CreateValidator { self_bond } => {
            let shares = state.staking.create_validator(
                ledger,
                &native,
                sender,
                tx.sender_pubkey,
                *self_bond,
            )?;
            Ok(vec![
                LedgerEvent::ValidatorCreated {
                    validator: sender,
                    self_bond: *self_bond,
                },
                LedgerEvent::Delegated {
                    delegator: sender,
                    validator: sender,
                    amount: *self_bond,
                    shares,
                },
            ])
        }
        TxPayload::Unjail => {
            state.staking.request_unjail(sender)?;
            Ok(vec![LedgerEvent::UnjailRequested { validator: sender }])
        }
        TxPayload::CreateToken {
            symbol,
            total_supply,
            mintable,
        } => {
            let fees = token::create_token(ledger, params, sender, symbol, *total_supply, *mintable, now)?;
            let mut events: Vec<LedgerEvent> = fees
                .credits
                .iter()
                .filter(|(_, amount)| *amount > 0)
                .map(|(pool, amount)| LedgerEvent::FeePaid {
                    from: sender,
                    to: *pool,
                    amount: *amount,
                })
                .collect();
            events.push(LedgerEvent::TokenCreated {
                symbol: symbol.clone(),
                creator: sender,
                total_supply: *total_supply,
            });
            Ok(events)
        }
        TxPayload::MintToken { symbol, to, amount } => {
            token::mint_token(ledger, sender, symbol, *to, *amount)?;
            Ok(vec![LedgerEvent::Minted {
                denom: symbol.clone(),
                to: *to,
                amount: *amount,
            }])
        }
        TxPayload::BurnToken { symbol, amount } => {
            token::burn_token(ledger, sender, symbol, *amount)?;
            Ok(vec![LedgerEvent::Burned {
                denom: symbol.clone(),
                from: sender,
                amount: *amount,
            }])
        }
        TxPayload::RegisterDomain {
            name,
            years,
            record,
        } => {
            let domain = state
                .domains
                .register(ledger, params, sender, name, *years, record, now)?;
            let mut events = domain_fee(sender, params.treasury, params.domain_registration_fee, *years);
            events.push(LedgerEvent::DomainRegistered {
                name: domain.name,
                owner: sender,
                expiry: domain.expiry,
            });
            Ok(events)
        }
        TxPayload::RenewDomain { name, years } => {
            let domain = state
                .domains
                .renew(ledger, params, sender, name, *years, now)?;
            let mut events = domain_fee(sender, params.treasury, params.domain_renewal_fee, *years);
            events.push(LedgerEvent::DomainRenewed {
                name: domain.name,
                expiry: domain.expiry,
            });
            Ok(events)
        }
        TxPayload::UpdateDomainRecord { name, record } => {
            state.domains.update_record(sender, name, record, now)?;
            Ok(vec![LedgerEvent::DomainRecordUpdated { name: name.clone() }])
        }
        TxPayload::TransferDomain { name, new_owner } => {
            state.domains.transfer(sender, name, *new_owner, now)?;
            Ok(vec![LedgerEvent::DomainTransferred {
                name: name.clone(),
                from: sender,
                to: *new_owner,
            }])
        }
    }
}

fn domain_fee(payer: Address, treasury: Address, per_year: Amount, years: u32) -> Vec<LedgerEvent> {
    let amount = per_year.saturating_mul(years as Amount);
    if amount == 0 {
        return Vec::new();
    }
    vec![LedgerEvent::FeePaid {
        from: payer,
        to: treasury,
        amount,
    }]
}
