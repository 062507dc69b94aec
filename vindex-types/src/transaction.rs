use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::primitives::*;

/// The operation a transaction performs.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub enum TxPayload {
    /// Move `amount` of `denom` to another account.
    Transfer {
        to: Address,
        denom: Denom,
        amount: Amount,
    },
    /// Bond native tokens to a validator.
    Delegate { validator: Address, amount: Amount },
    /// Redeem delegator shares; the tokens unbond over the unbonding period.
    Undelegate { validator: Address, shares: Shares },
    /// Register the sender as a validator with an initial self-delegation.
    CreateValidator { self_bond: Amount },
    /// Ask for the sender's jailed validator to be released at the next epoch.
    Unjail,
    /// Issue a new denom through the token factory.
    CreateToken {
        symbol: Denom,
        total_supply: Amount,
        mintable: bool,
    },
    /// Mint more of a mintable denom (creator only).
    MintToken {
        symbol: Denom,
        to: Address,
        amount: Amount,
    },
    /// Destroy tokens held by the sender.
    BurnToken { symbol: Denom, amount: Amount },
    RegisterDomain {
        name: String,
        years: u32,
        record: String,
    },
    RenewDomain { name: String, years: u32 },
    UpdateDomainRecord { name: String, record: String },
    TransferDomain { name: String, new_owner: Address },
}

impl TxPayload {
    /// Short name used in logs and receipts.
    pub fn kind(&self) -> &'static str {
        match self {
            TxPayload::Transfer { .. } => "transfer",
            TxPayload::Delegate { .. } => "delegate",
            TxPayload::Undelegate { .. } => "undelegate",
            TxPayload::CreateValidator { .. } => "create_validator",
            TxPayload::Unjail => "unjail",
            TxPayload::CreateToken { .. } => "create_token",
            TxPayload::MintToken { .. } => "mint_token",
            TxPayload::BurnToken { .. } => "burn_token",
            TxPayload::RegisterDomain { .. } => "register_domain",
            TxPayload::RenewDomain { .. } => "renew_domain",
            TxPayload::UpdateDomainRecord { .. } => "update_domain_record",
            TxPayload::TransferDomain { .. } => "transfer_domain",
        }
    }
}

/// A signed transaction.
///
/// The signature covers BLAKE3 of the borsh encoding of every field except
/// the signature itself (see [`Transaction::signing_hash`]).
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: Address,
    pub sender_pubkey: PublicKey,
    /// Must equal the sender account's nonce at execution time.
    pub nonce: u64,
    pub payload: TxPayload,
    #[serde(with = "crate::primitives::serde_sig")]
    pub signature: Signature,
}

#[derive(BorshSerialize)]
struct UnsignedView<'a> {
    sender: &'a Address,
    sender_pubkey: &'a PublicKey,
    nonce: u64,
    payload: &'a TxPayload,
}

impl Transaction {
    /// Hash of the unsigned portion; this is what the sender signs.
    pub fn signing_hash(&self) -> Hash {
        let view = UnsignedView {
            sender: &self.sender,
            sender_pubkey: &self.sender_pubkey,
            nonce: self.nonce,
            payload: &self.payload,
        };
        let bytes = borsh::to_vec(&view).unwrap_or_default();
        *blake3::hash(&bytes).as_bytes()
    }

    /// Transaction identifier: BLAKE3 of the full borsh encoding.
    pub fn hash(&self) -> Hash {
        let bytes = borsh::to_vec(self).unwrap_or_default();
        *blake3::hash(&bytes).as_bytes()
    }
}
