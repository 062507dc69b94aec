use std::collections::{BTreeMap, HashMap};

use vindex_types::consensus::EquivocationEvidence;
use vindex_types::primitives::{Address, Hash};
use vindex_types::transaction::Transaction;

use crate::error::ChainError;

/// Pending transactions in arrival order, plus evidence awaiting inclusion.
///
/// Transactions leave the pool only when a committed block includes them or
/// when they can no longer apply (stale nonce, permanent rejection). A round
/// that times out leaves its transactions here for the next proposal.
pub struct Mempool {
    /// Arrival sequence → transaction.
    queue: BTreeMap<u64, Transaction>,
    /// Transaction hash → arrival sequence.
    index: HashMap<Hash, u64>,
    next_seq: u64,
    evidence: Vec<EquivocationEvidence>,
    /// Maximum number of transactions held.
    max_size: usize,
}

impl Mempool {
    /// Create a new mempool with the given capacity.
    pub fn new(max_size: usize) -> Self {
        Self {
            queue: BTreeMap::new(),
            index: HashMap::new(),
            next_seq: 0,
            evidence: Vec::new(),
            max_size,
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.index.contains_key(hash)
    }

    /// Add a transaction. Rejects duplicates and enforces capacity.
    pub fn add(&mut self, tx: Transaction) -> Result<Hash, ChainError> {
        let hash = tx.hash();
        if self.index.contains_key(&hash) {
            return Err(ChainError::DuplicateTransaction);
        }
        if self.queue.len() >= self.max_size {
            return Err(ChainError::MempoolFull);
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.insert(seq, tx);
        self.index.insert(hash, seq);
        Ok(hash)
    }

    /// Up to `limit` transactions, oldest first. The pool is not modified.
    pub fn pending(&self, limit: usize) -> Vec<Transaction> {
        self.queue.values().take(limit).cloned().collect()
    }

    /// Drop transactions by hash.
    pub fn remove(&mut self, hashes: &[Hash]) {
        for hash in hashes {
            if let Some(seq) = self.index.remove(hash) {
                self.queue.remove(&seq);
            }
        }
    }

    /// Drop transactions whose nonce is below the sender's committed nonce.
    pub fn prune_stale(&mut self, nonce_of: impl Fn(&Address) -> u64) {
        let stale: Vec<Hash> = self
            .queue
            .values()
            .filter(|tx| tx.nonce < nonce_of(&tx.sender))
            .map(|tx| tx.hash())
            .collect();
        self.remove(&stale);
    }

    /// Queue equivocation evidence for the next proposal. Duplicates are ignored.
    pub fn add_evidence(&mut self, evidence: EquivocationEvidence) {
        let offender = evidence.offender();
        let round = (evidence.vote_a.height, evidence.vote_a.round);
        let known = self
            .evidence
            .iter()
            .any(|e| e.offender() == offender && (e.vote_a.height, e.vote_a.round) == round);
        if !known {
            self.evidence.push(evidence);
        }
    }

    pub fn pending_evidence(&self) -> Vec<EquivocationEvidence> {
        self.evidence.clone()
    }

    /// Forget evidence included in a committed block.
    pub fn remove_evidence(&mut self, included: &[EquivocationEvidence]) {
        self.evidence.retain(|e| !included.contains(e));
    }
}
