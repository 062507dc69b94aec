use std::collections::BTreeMap;

use vindex_crypto::hash::blake3_hash;
use vindex_crypto::keys::batch_verify;
use vindex_crypto::merkle::merkle_root;
use vindex_types::block::{Block, BlockHeader};
use vindex_types::consensus::{EquivocationEvidence, Vote, VoteKind};
use vindex_types::constants::MAX_TIMESTAMP_DRIFT;
use vindex_types::error::ConsensusError;
use vindex_types::primitives::*;
use vindex_types::transaction::Transaction;
use vindex_types::validator::ValidatorSetSnapshot;

use crate::consensus::vote_signing_data;
use crate::error::ChainError;

/// Merkle root over transaction hashes, in block order.
pub fn compute_tx_root(txs: &[Transaction]) -> Hash {
    let leaves: Vec<Hash> = txs.iter().map(|tx| tx.hash()).collect();
    merkle_root(&leaves)
}

/// Merkle root over evidence, in block order.
pub fn compute_evidence_root(evidence: &[EquivocationEvidence]) -> Hash {
    let leaves: Vec<Hash> = evidence
        .iter()
        .map(|e| blake3_hash(&borsh::to_vec(e).unwrap_or_default()))
        .collect();
    merkle_root(&leaves)
}

/// Assemble a block with content roots filled in. `state_root` is the root after
/// applying the block.
#[allow(clippy::too_many_arguments)]
pub fn assemble_block(
    height: Height,
    round: Round,
    timestamp: Timestamp,
    proposer: Address,
    prev_hash: Hash,
    transactions: Vec<Transaction>,
    evidence: Vec<EquivocationEvidence>,
    state_root: Hash,
) -> Block {
    Block {
        header: BlockHeader {
            height,
            round,
            timestamp,
            proposer,
            prev_hash,
            tx_root: compute_tx_root(&transactions),
            evidence_root: compute_evidence_root(&evidence),
            state_root,
        },
        transactions,
        evidence,
    }
}

/// Structural checks of a block against the committed parent.
///
/// Covers linkage, time, size and content roots. The state root can only be
/// checked by applying the block.
pub fn check_header(
    block: &Block,
    parent_height: Height,
    parent_hash: &Hash,
    parent_time: Timestamp,
    max_txs: usize,
) -> Result<(), ChainError> {
    let header = &block.header;
    if header.height != parent_height + 1 {
        return Err(invalid(format!(
            "height {} does not follow {}",
            header.height, parent_height
        )));
    }
    if &header.prev_hash != parent_hash {
        return Err(invalid("previous hash mismatch".to_string()));
    }
    if header.timestamp < parent_time {
        return Err(invalid(format!(
            "timestamp {} before parent time {}",
            header.timestamp, parent_time
        )));
    }
    if block.transactions.len() > max_txs {
        return Err(invalid(format!(
            "too many transactions: {} > {}",
            block.transactions.len(),
            max_txs
        )));
    }
    if header.tx_root != compute_tx_root(&block.transactions) {
        return Err(invalid("transactions merkle root mismatch".to_string()));
    }
    if header.evidence_root != compute_evidence_root(&block.evidence) {
        return Err(invalid("evidence merkle root mismatch".to_string()));
    }
    Ok(())
}

/// Verify that `votes` carry a supermajority of `snapshot` precommitting
/// `block` in a single round.
///
/// Used when applying a block that arrives with its commit certificate.
/// Prevotes, votes from non-members, votes for another block and repeats by
/// the same voter are ignored. Signatures of the winning round are checked in
/// one batch.
pub fn verify_commit(
    block: &Block,
    votes: &[Vote],
    snapshot: &ValidatorSetSnapshot,
) -> Result<(), ConsensusError> {
    let hash = block.hash();
    let mut rounds: BTreeMap<Round, (Amount, Vec<&Vote>)> = BTreeMap::new();
    for vote in votes {
        if vote.kind != VoteKind::Precommit || vote.block_hash != hash || vote.height != block.height() {
            continue;
        }
        let Some(member) = snapshot.get(&vote.voter) else {
            continue;
        };
        if member.pubkey != vote.voter_pubkey {
            return Err(ConsensusError::InvalidSignature);
        }
        let (power, counted) = rounds.entry(vote.round).or_default();
        if counted.iter().any(|v| v.voter == vote.voter) {
            continue;
        }
        counted.push(vote);
        *power = power.saturating_add(member.power);
    }

    let best = rounds.into_values().max_by_key(|(power, _)| *power);
    let (power, counted) = best.unwrap_or_default();
    if !snapshot.is_supermajority(power) {
        return Err(ConsensusError::InsufficientQuorum {
            have: power,
            need: snapshot.quorum_threshold(),
        });
    }

    let data: Vec<Hash> = counted
        .iter()
        .map(|v| vote_signing_data(v.kind, v.height, v.round, &v.block_hash))
        .collect();
    let messages: Vec<&[u8]> = data.iter().map(|d| d.as_slice()).collect();
    let signatures: Vec<Signature> = counted.iter().map(|v| v.signature).collect();
    let pubkeys: Vec<PublicKey> = counted.iter().map(|v| v.voter_pubkey).collect();
    batch_verify(&messages, &signatures, &pubkeys).map_err(|_| ConsensusError::InvalidSignature)
}

/// Reject a block stamped further ahead of `now` than [`MAX_TIMESTAMP_DRIFT`].
pub fn check_timestamp_drift(block: &Block, now: Timestamp) -> Result<(), ChainError> {
    let limit = now.saturating_add(MAX_TIMESTAMP_DRIFT);
    if block.header.timestamp > limit {
        return Err(invalid(format!(
            "timestamp {} is more than {}s ahead of local time {}",
            block.header.timestamp, MAX_TIMESTAMP_DRIFT, now
        )));
    }
    Ok(())
}

fn invalid(reason: String) -> ChainError {
    ChainError::InvalidBlock { reason }
}
