use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::consensus::EquivocationEvidence;
use crate::primitives::*;
use crate::transaction::Transaction;
use crate::validator::{StatusChange, ValidatorSetSnapshot};

/// Block header. The block hash is BLAKE3 of its borsh encoding.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct BlockHeader {
    pub height: Height,
    pub round: Round,
    /// Block time. Every time-based rule in the state machine reads this.
    pub timestamp: Timestamp,
    pub proposer: Address,
    pub prev_hash: Hash,
    /// Merkle root over the transaction hashes, in block order.
    pub tx_root: Hash,
    /// Merkle root over the evidence hashes.
    pub evidence_root: Hash,
    /// State root after applying this block.
    pub state_root: Hash,
}

impl BlockHeader {
    pub fn hash(&self) -> Hash {
        let bytes = borsh::to_vec(self).unwrap_or_default();
        *blake3::hash(&bytes).as_bytes()
    }
}

/// A block: header plus ordered transactions and consensus-fault evidence.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
    pub evidence: Vec<EquivocationEvidence>,
}

impl Block {
    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    pub fn height(&self) -> Height {
        self.header.height
    }
}

/// Chain-level bookkeeping persisted under `meta:chain`.
///
/// All of it is covered by the state root. The hash of the last block is kept
/// separately under `meta:head` because it depends on the state root.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct ChainMeta {
    pub chain_id: String,
    pub genesis_time: Timestamp,
    pub height: Height,
    pub last_block_time: Timestamp,
    pub last_burn_time: Timestamp,
    pub next_unbonding_id: u64,
    pub active_set: ValidatorSetSnapshot,
    pub pending_changes: Vec<StatusChange>,
}
