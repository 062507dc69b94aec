use std::collections::BTreeSet;

use vindex_types::primitives::{address_hex, Address};
use vindex_types::transaction::{Transaction, TxPayload};

/// Screens transactions before they enter the mempool.
///
/// Screening happens at admission only; committed blocks are never
/// re-screened, so a verifier change cannot fork the chain.
pub trait ComplianceVerifier: Send + Sync {
    /// `Err(reason)` rejects the transaction.
    fn screen(&self, tx: &Transaction) -> Result<(), String>;
}

/// Accepts every transaction.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl ComplianceVerifier for AllowAll {
    fn screen(&self, _tx: &Transaction) -> Result<(), String> {
        Ok(())
    }
}

/// Rejects transactions sent by, or moving value to, a blocked address.
#[derive(Debug, Clone, Default)]
pub struct DenyList {
    blocked: BTreeSet<Address>,
}

impl DenyList {
    pub fn new(blocked: impl IntoIterator<Item = Address>) -> Self {
        Self {
            blocked: blocked.into_iter().collect(),
        }
    }

    pub fn block(&mut self, address: Address) {
        self.blocked.insert(address);
    }

    pub fn is_blocked(&self, address: &Address) -> bool {
        self.blocked.contains(address)
    }
}

fn recipient(payload: &TxPayload) -> Option<&Address> {
    match payload {
        TxPayload::Transfer { to, .. } | TxPayload::MintToken { to, .. } => Some(to),
        TxPayload::TransferDomain { new_owner, .. } => Some(new_owner),
        _ => None,
    }
}

impl ComplianceVerifier for DenyList {
    fn screen(&self, tx: &Transaction) -> Result<(), String> {
        if self.is_blocked(&tx.sender) {
            return Err(format!("sender {} is blocked", address_hex(&tx.sender)));
        }
        if let Some(to) = recipient(&tx.payload).filter(|a| self.is_blocked(a)) {
            return Err(format!("recipient {} is blocked", address_hex(to)));
        }
        Ok(())
    }
}
