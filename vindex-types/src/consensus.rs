use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::block::Block;
use crate::primitives::*;

/// A block proposal from the scheduled proposer of (height, round).
///
/// `block` was built in `block.header.round`. When that is an earlier round
/// the block is being re-proposed, and `pol_round` names the round in which
/// it gathered a supermajority of prevotes.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct Proposal {
    pub height: Height,
    pub round: Round,
    pub block: Block,
    pub pol_round: Option<Round>,
    pub proposer_pubkey: PublicKey,
    /// Signature over (height, round, pol_round, block hash).
    #[serde(with = "crate::primitives::serde_sig")]
    pub signature: Signature,
}

/// Voting phase within a round.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub enum VoteKind {
    /// First phase: the block is valid and compatible with the voter's lock.
    Prevote,
    /// Second phase: the voter saw a supermajority of prevotes and locked on the block.
    Precommit,
}

/// A vote for a block at (height, round).
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct Vote {
    pub kind: VoteKind,
    pub height: Height,
    pub round: Round,
    pub block_hash: Hash,
    pub voter: Address,
    pub voter_pubkey: PublicKey,
    /// Signature over (kind, height, round, block hash).
    #[serde(with = "crate::primitives::serde_sig")]
    pub signature: Signature,
}

/// A committed block together with the precommits that finalized it.
///
/// Lets a validator that missed the votes of a height catch up.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct CommitCertificate {
    pub block: Block,
    pub votes: Vec<Vote>,
}

/// Messages exchanged between validators.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub enum ConsensusMessage {
    Proposal(Box<Proposal>),
    Vote(Vote),
    Commit(Box<CommitCertificate>),
}

impl ConsensusMessage {
    /// (height, round) the message belongs to. A certificate reports the
    /// round its precommits were cast in.
    pub fn position(&self) -> (Height, Round) {
        match self {
            ConsensusMessage::Proposal(p) => (p.height, p.round),
            ConsensusMessage::Vote(v) => (v.height, v.round),
            ConsensusMessage::Commit(c) => (
                c.block.header.height,
                c.votes.first().map_or(c.block.header.round, |v| v.round),
            ),
        }
    }
}

/// Proof that a validator signed two different blocks in the same phase of
/// one height and round.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct EquivocationEvidence {
    pub vote_a: Vote,
    pub vote_b: Vote,
}

impl EquivocationEvidence {
    /// The validator the evidence is about.
    pub fn offender(&self) -> Address {
        self.vote_a.voter
    }
}

/// Liveness signal exposed by the consensus driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Health {
    /// Blocks are being committed.
    Live,
    /// No supermajority for `failed_rounds` consecutive rounds at `height`.
    Stalled { height: Height, failed_rounds: u32 },
}
