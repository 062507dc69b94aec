use rayon::prelude::*;

use vindex_crypto::address::address_matches;
use vindex_crypto::keys::{batch_verify, verify, Keypair};
use vindex_types::error::ValidationError;
use vindex_types::name::{validate_domain_name, validate_record, validate_symbol, validate_years};
use vindex_types::transaction::{Transaction, TxPayload};

/// Build and sign a transaction from `keypair`.
pub fn sign_transaction(keypair: &Keypair, nonce: u64, payload: TxPayload) -> Transaction {
    let mut tx = Transaction {
        sender: keypair.address(),
        sender_pubkey: keypair.public_key(),
        nonce,
        payload,
        signature: [0u8; 64],
    };
    tx.signature = keypair.sign(&tx.signing_hash());
    tx
}

/// Check the sender binding and the signature.
pub fn verify_transaction(tx: &Transaction) -> Result<(), ValidationError> {
    if !address_matches(&tx.sender, &tx.sender_pubkey) {
        return Err(ValidationError::Malformed {
            reason: "sender does not match public key".to_string(),
        });
    }
    verify(&tx.signing_hash(), &tx.signature, &tx.sender_pubkey)
        .map_err(|_| ValidationError::InvalidSignature)
}

/// Verify every transaction of a block, one result per transaction.
///
/// A single batch verification covers the common all-valid case; when it
/// fails, transactions are checked individually in parallel.
pub fn verify_transactions(txs: &[Transaction]) -> Vec<Result<(), ValidationError>> {
    let hashes: Vec<_> = txs.iter().map(|tx| tx.signing_hash()).collect();
    let bound = txs.iter().all(|tx| address_matches(&tx.sender, &tx.sender_pubkey));
    if bound {
        let messages: Vec<&[u8]> = hashes.iter().map(|h| h.as_slice()).collect();
        let signatures: Vec<_> = txs.iter().map(|tx| tx.signature).collect();
        let pubkeys: Vec<_> = txs.iter().map(|tx| tx.sender_pubkey).collect();
        if batch_verify(&messages, &signatures, &pubkeys).is_ok() {
            return vec![Ok(()); txs.len()];
        }
    }
    txs.par_iter().map(verify_transaction).collect()
}

/// Stateless payload checks run at admission, before any state is consulted.
pub fn check_payload(payload: &TxPayload) -> Result<(), ValidationError> {
    let positive = |amount: u128| {
        if amount == 0 {
            Err(ValidationError::InvalidAmount)
        } else {
            Ok(())
        }
    };
    match payload {
        TxPayload::Transfer { denom, amount, .. } => {
            if denom.is_empty() {
                return Err(ValidationError::Malformed {
                    reason: "empty denom".to_string(),
                });
            }
            positive(*amount)
        }
        TxPayload::Delegate { amount, .. } => positive(*amount),
        TxPayload::Undelegate { shares, .. } => positive(*shares),
        TxPayload::CreateValidator { self_bond } => positive(*self_bond),
        TxPayload::Unjail => Ok(()),
        TxPayload::CreateToken {
            symbol,
            total_supply,
            ..
        } => {
            validate_symbol(symbol)?;
            positive(*total_supply)
        }
        TxPayload::MintToken { amount, .. } | TxPayload::BurnToken { amount, .. } => {
            positive(*amount)
        }
        TxPayload::RegisterDomain {
            name,
            years,
            record,
        } => {
            validate_domain_name(name)?;
            validate_years(*years)?;
            validate_record(record)
        }
        TxPayload::RenewDomain { name, years } => {
            validate_domain_name(name)?;
            validate_years(*years)
        }
        TxPayload::UpdateDomainRecord { name, record } => {
            validate_domain_name(name)?;
            validate_record(record)
        }
        TxPayload::TransferDomain { name, .. } => validate_domain_name(name),
    }
}
