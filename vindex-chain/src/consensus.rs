use std::collections::BTreeMap;
use std::time::Duration;

use vindex_crypto::address::address_matches;
use vindex_crypto::hash::blake3_hash_domain;
use vindex_crypto::keys::{verify, Keypair};
use vindex_types::block::Block;
use vindex_types::consensus::*;
use vindex_types::error::ConsensusError;
use vindex_types::primitives::*;
use vindex_types::validator::ValidatorSetSnapshot;

use crate::leader::ProposerSchedule;

/// Actions the consensus engine asks the node driver to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsensusAction {
    /// This node proposes at (height, round): build a block and hand it to
    /// [`ConsensusEngine::propose`].
    BuildProposal { height: Height, round: Round },
    /// Send a message to every peer.
    Broadcast(ConsensusMessage),
    /// A supermajority precommitted `block`; apply and persist it, then call
    /// [`ConsensusEngine::on_committed`].
    CommitBlock { block: Block, votes: Vec<Vote> },
    /// Call [`ConsensusEngine::on_timeout`] for (height, round) after `after`.
    ScheduleTimeout {
        height: Height,
        round: Round,
        after: Duration,
    },
    /// A validator signed two different votes in the same round and phase.
    ReportEquivocation(EquivocationEvidence),
}

/// Step within a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Waiting for an acceptable proposal.
    Propose,
    /// Prevoted the round's proposal.
    Prevote,
    /// Locked on the round's proposal and precommitted it.
    Precommit,
    /// A block of this height has a supermajority of precommits.
    Commit,
}

/// Round timeout with bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutPolicy {
    pub base: Duration,
    pub max: Duration,
}

impl TimeoutPolicy {
    /// `base × 2^round`, capped at `max`.
    pub fn for_round(&self, round: Round) -> Duration {
        let factor = 1u32.checked_shl(round).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }
}

// ─── Signing ─────────────────────────────────────────────────────────────────

fn signing_bytes(height: Height, round: Round, block_hash: &Hash) -> Vec<u8> {
    let mut data = Vec::with_capacity(8 + 4 + 32 + 5);
    data.extend_from_slice(&height.to_le_bytes());
    data.extend_from_slice(&round.to_le_bytes());
    data.extend_from_slice(block_hash);
    data
}

/// Message a validator signs to vote for `block_hash`.
pub fn vote_signing_data(kind: VoteKind, height: Height, round: Round, block_hash: &Hash) -> Hash {
    let context = match kind {
        VoteKind::Prevote => "vindexchain prevote",
        VoteKind::Precommit => "vindexchain precommit",
    };
    blake3_hash_domain(context, &signing_bytes(height, round, block_hash))
}

/// Message a proposer signs over its block.
pub fn proposal_signing_data(
    height: Height,
    round: Round,
    pol_round: Option<Round>,
    block_hash: &Hash,
) -> Hash {
    let mut data = signing_bytes(height, round, block_hash);
    match pol_round {
        Some(pol) => {
            data.push(1);
            data.extend_from_slice(&pol.to_le_bytes());
        }
        None => data.push(0),
    }
    blake3_hash_domain("vindexchain proposal", &data)
}

pub fn sign_vote(keypair: &Keypair, kind: VoteKind, height: Height, round: Round, block_hash: Hash) -> Vote {
    Vote {
        kind,
        height,
        round,
        block_hash,
        voter: keypair.address(),
        voter_pubkey: keypair.public_key(),
        signature: keypair.sign(&vote_signing_data(kind, height, round, &block_hash)),
    }
}

pub fn sign_proposal(
    keypair: &Keypair,
    height: Height,
    round: Round,
    block: Block,
    pol_round: Option<Round>,
) -> Proposal {
    let signature = keypair.sign(&proposal_signing_data(height, round, pol_round, &block.hash()));
    Proposal {
        height,
        round,
        block,
        pol_round,
        proposer_pubkey: keypair.public_key(),
        signature,
    }
}

fn verify_vote_signature(vote: &Vote) -> Result<(), ConsensusError> {
    if !address_matches(&vote.voter, &vote.voter_pubkey) {
        return Err(ConsensusError::InvalidSignature);
    }
    let data = vote_signing_data(vote.kind, vote.height, vote.round, &vote.block_hash);
    verify(&data, &vote.signature, &vote.voter_pubkey).map_err(|_| ConsensusError::InvalidSignature)
}

/// Check equivocation evidence and return the offender.
pub fn verify_evidence(evidence: &EquivocationEvidence) -> Result<Address, ConsensusError> {
    let (a, b) = (&evidence.vote_a, &evidence.vote_b);
    let invalid = |reason: &str| ConsensusError::InvalidEvidence {
        reason: reason.to_string(),
    };
    if a.voter != b.voter || a.voter_pubkey != b.voter_pubkey {
        return Err(invalid("votes from different validators"));
    }
    if a.height != b.height || a.round != b.round {
        return Err(invalid("votes from different rounds"));
    }
    if a.kind != b.kind {
        return Err(invalid("votes from different phases"));
    }
    if a.block_hash == b.block_hash {
        return Err(invalid("votes for the same block"));
    }
    verify_vote_signature(a)?;
    verify_vote_signature(b)?;
    Ok(a.voter)
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// Locking two-phase BFT engine (pure state machine).
///
/// Each height runs rounds of Propose → Prevote → Precommit → Commit. The
/// scheduled proposer broadcasts a signed block and members prevote for it.
/// Prevotes from more than two thirds of the power lock a member on the block
/// and it precommits; precommits from more than two thirds commit it.
///
/// A locked member prevotes only its locked block in later rounds, unless the
/// proposal carries a block that gathered a supermajority of prevotes in a
/// round at or after the lock. A proposer holding such a block re-proposes it
/// instead of building a new one. Two conflicting blocks therefore cannot both
/// gather precommit supermajorities at one height.
///
/// A round that does not commit before its timeout moves on to the next
/// proposer with a longer timeout. The engine never touches state or the
/// network; block content validation happens in the driver before a proposal
/// is passed in.
pub struct ConsensusEngine {
    keypair: Option<Keypair>,
    snapshot: ValidatorSetSnapshot,
    schedule: ProposerSchedule,
    height: Height,
    round: Round,
    step: Step,
    /// Proposals accepted at the current height, by round, with their pol round.
    proposals: BTreeMap<Round, (Block, Option<Round>)>,
    /// Every vote seen at the current height.
    votes: BTreeMap<(Round, VoteKind, Address), Vote>,
    /// Block this node last precommitted, with the round it locked in.
    locked: Option<(Round, Block)>,
    /// Latest block seen with a prevote supermajority, with that round.
    valid: Option<(Round, Block)>,
    timeouts: TimeoutPolicy,
    stall_threshold: u32,
    failed_rounds: u32,
}

impl ConsensusEngine {
    /// `keypair` is `None` for a node that follows without voting.
    pub fn new(
        keypair: Option<Keypair>,
        snapshot: ValidatorSetSnapshot,
        height: Height,
        timeouts: TimeoutPolicy,
        stall_threshold: u32,
    ) -> Self {
        let schedule = ProposerSchedule::new(&snapshot);
        Self {
            keypair,
            snapshot,
            schedule,
            height,
            round: 0,
            step: Step::Propose,
            proposals: BTreeMap::new(),
            votes: BTreeMap::new(),
            locked: None,
            valid: None,
            timeouts,
            stall_threshold: stall_threshold.max(1),
            failed_rounds: 0,
        }
    }

    pub fn height(&self) -> Height {
        self.height
    }

    pub fn round(&self) -> Round {
        self.round
    }

    pub fn step(&self) -> Step {
        self.step
    }

    pub fn snapshot(&self) -> &ValidatorSetSnapshot {
        &self.snapshot
    }

    pub fn address(&self) -> Option<Address> {
        self.keypair.as_ref().map(|k| k.address())
    }

    /// Round and hash of the block this node is locked on.
    pub fn locked(&self) -> Option<(Round, Hash)> {
        self.locked.as_ref().map(|(round, block)| (*round, block.hash()))
    }

    /// Scheduled proposer of the current round.
    pub fn current_proposer(&self) -> Option<&Address> {
        self.schedule.proposer(self.height, self.round)
    }

    pub fn is_proposer(&self) -> bool {
        match (self.address(), self.current_proposer()) {
            (Some(me), Some(p)) => &me == p,
            _ => false,
        }
    }

    pub fn health(&self) -> Health {
        if self.failed_rounds >= self.stall_threshold {
            Health::Stalled {
                height: self.height,
                failed_rounds: self.failed_rounds,
            }
        } else {
            Health::Live
        }
    }

    /// Power behind `block_hash` among `kind` votes of `round`.
    pub fn voting_power(&self, kind: VoteKind, round: Round, block_hash: &Hash) -> Amount {
        self.votes
            .range((round, kind, [0u8; 20])..=(round, kind, [0xffu8; 20]))
            .filter(|(_, v)| &v.block_hash == block_hash)
            .filter_map(|((_, _, voter), _)| self.snapshot.get(voter))
            .fold(0, |acc: Amount, m| acc.saturating_add(m.power))
    }

    /// Power of the distinct validators that voted anything in `round`.
    fn round_power(&self, round: Round) -> Amount {
        let mut voters: Vec<&Address> = self
            .votes
            .range((round, VoteKind::Prevote, [0u8; 20])..=(round, VoteKind::Precommit, [0xffu8; 20]))
            .map(|((_, _, voter), _)| voter)
            .collect();
        voters.sort();
        voters.dedup();
        voters
            .into_iter()
            .filter_map(|voter| self.snapshot.get(voter))
            .fold(0, |acc: Amount, m| acc.saturating_add(m.power))
    }

    /// Enter the current round: arm its timeout and, when scheduled, propose.
    /// A proposer holding a block with a prevote supermajority re-proposes it.
    pub fn start_round(&mut self) -> Vec<ConsensusAction> {
        let mut actions = vec![ConsensusAction::ScheduleTimeout {
            height: self.height,
            round: self.round,
            after: self.timeouts.for_round(self.round),
        }];
        if self.step == Step::Propose && self.is_proposer() && !self.proposals.contains_key(&self.round) {
            match self.valid.clone() {
                Some((valid_round, block)) => {
                    tracing::debug!(
                        height = self.height,
                        round = self.round,
                        valid_round,
                        "re-proposing block with prevote supermajority"
                    );
                    actions.extend(self.broadcast_proposal(block, Some(valid_round)));
                }
                None => actions.push(ConsensusAction::BuildProposal {
                    height: self.height,
                    round: self.round,
                }),
            }
        }
        actions
    }

    /// Broadcast our own freshly built block for the current round.
    pub fn propose(&mut self, block: Block) -> Result<Vec<ConsensusAction>, ConsensusError> {
        if self.snapshot.is_empty() {
            return Err(ConsensusError::EmptyValidatorSet);
        }
        if !self.is_proposer()
            || self.step != Step::Propose
            || block.height() != self.height
            || block.header.round != self.round
            || self.proposals.contains_key(&self.round)
        {
            return Err(ConsensusError::InvalidProposer {
                height: block.height(),
                round: self.round,
            });
        }
        tracing::debug!(height = self.height, round = self.round, txs = block.transactions.len(), "proposing block");
        Ok(self.broadcast_proposal(block, None))
    }

    fn broadcast_proposal(&mut self, block: Block, pol_round: Option<Round>) -> Vec<ConsensusAction> {
        let Some(keypair) = self.keypair.as_ref() else {
            return Vec::new();
        };
        let proposal = sign_proposal(keypair, self.height, self.round, block.clone(), pol_round);
        self.proposals.insert(self.round, (block, pol_round));
        let mut actions = vec![ConsensusAction::Broadcast(ConsensusMessage::Proposal(Box::new(
            proposal,
        )))];
        actions.extend(self.progress());
        actions
    }

    /// Handle a proposal from a peer.
    ///
    /// A valid proposal for a later round at the current height moves this
    /// node forward to that round.
    pub fn on_proposal(&mut self, proposal: Proposal) -> Result<Vec<ConsensusAction>, ConsensusError> {
        if proposal.height != self.height || proposal.round < self.round {
            return Err(self.stale(proposal.height, proposal.round));
        }
        let proposer = self
            .schedule
            .proposer(proposal.height, proposal.round)
            .copied()
            .ok_or(ConsensusError::EmptyValidatorSet)?;
        let invalid_proposer = ConsensusError::InvalidProposer {
            height: proposal.height,
            round: proposal.round,
        };
        let member = self.snapshot.get(&proposer).ok_or(invalid_proposer.clone())?;
        let header = &proposal.block.header;
        let built_by = self.schedule.proposer(proposal.height, header.round).copied();
        let pol_consistent = match proposal.pol_round {
            None => header.round == proposal.round,
            Some(pol) => header.round <= pol && pol < proposal.round,
        };
        if member.pubkey != proposal.proposer_pubkey
            || header.height != proposal.height
            || built_by != Some(header.proposer)
            || !pol_consistent
        {
            return Err(invalid_proposer);
        }
        let hash = proposal.block.hash();
        let data = proposal_signing_data(proposal.height, proposal.round, proposal.pol_round, &hash);
        verify(&data, &proposal.signature, &proposal.proposer_pubkey)
            .map_err(|_| ConsensusError::InvalidSignature)?;

        let mut actions = Vec::new();
        if proposal.round > self.round {
            actions.extend(self.advance_to(proposal.round));
        }
        if let Some((existing, _)) = self.proposals.get(&proposal.round) {
            // Duplicate, or a second block from the same proposer; keep the first.
            if existing.hash() != hash {
                tracing::warn!(height = self.height, round = proposal.round, "conflicting proposal ignored");
            }
            return Ok(actions);
        }
        self.proposals
            .insert(proposal.round, (proposal.block, proposal.pol_round));
        actions.extend(self.progress());
        Ok(actions)
    }

    /// Handle a vote from a peer.
    ///
    /// Votes from earlier rounds of the current height are kept: late
    /// precommits can still commit, and late prevotes justify re-proposals.
    pub fn on_vote(&mut self, vote: Vote) -> Result<Vec<ConsensusAction>, ConsensusError> {
        if vote.height != self.height {
            return Err(self.stale(vote.height, vote.round));
        }
        let member = self.snapshot.get(&vote.voter).ok_or(ConsensusError::UnknownVoter)?;
        if member.pubkey != vote.voter_pubkey {
            return Err(ConsensusError::InvalidSignature);
        }
        verify_vote_signature(&vote)?;

        let key = (vote.round, vote.kind, vote.voter);
        if let Some(previous) = self.votes.get(&key) {
            if previous.block_hash == vote.block_hash {
                return Ok(Vec::new());
            }
            tracing::warn!(
                voter = %address_hex(&vote.voter),
                height = vote.height,
                round = vote.round,
                kind = ?vote.kind,
                "equivocation detected"
            );
            return Ok(vec![ConsensusAction::ReportEquivocation(EquivocationEvidence {
                vote_a: previous.clone(),
                vote_b: vote,
            })]);
        }
        let round = vote.round;
        self.votes.insert(key, vote);

        let mut actions = Vec::new();
        if round > self.round
            && self.step != Step::Commit
            && self.snapshot.exceeds_one_third(self.round_power(round))
        {
            tracing::debug!(height = self.height, from = self.round, to = round, "catching up to a later round");
            actions.extend(self.advance_to(round));
        }
        actions.extend(self.progress());
        Ok(actions)
    }

    /// The timer for (height, round) fired.
    pub fn on_timeout(&mut self, height: Height, round: Round) -> Vec<ConsensusAction> {
        if height != self.height || round != self.round || self.step == Step::Commit {
            return Vec::new();
        }
        let power = self
            .proposals
            .get(&round)
            .map(|(b, _)| self.voting_power(VoteKind::Prevote, round, &b.hash()))
            .unwrap_or(0);
        tracing::info!(
            height,
            round,
            prevotes = %power,
            need = %self.snapshot.quorum_threshold(),
            "round timed out"
        );
        self.advance_to(round + 1)
    }

    /// The driver applied the block of the current height. Moves to the next
    /// height, installing `next_snapshot` if the validator set rotated.
    pub fn on_committed(
        &mut self,
        committed_height: Height,
        next_snapshot: Option<ValidatorSetSnapshot>,
    ) -> Vec<ConsensusAction> {
        if let Some(snapshot) = next_snapshot {
            self.schedule = ProposerSchedule::new(&snapshot);
            self.snapshot = snapshot;
        }
        self.height = committed_height + 1;
        self.round = 0;
        self.step = Step::Propose;
        self.proposals.clear();
        self.votes.clear();
        self.locked = None;
        self.valid = None;
        self.failed_rounds = 0;
        self.start_round()
    }

    fn advance_to(&mut self, round: Round) -> Vec<ConsensusAction> {
        self.failed_rounds = self.failed_rounds.saturating_add(round - self.round);
        self.round = round;
        self.step = Step::Propose;
        if let Health::Stalled { failed_rounds, .. } = self.health() {
            tracing::warn!(height = self.height, failed_rounds, "consensus stalled");
        }
        let mut actions = self.start_round();
        actions.extend(self.progress());
        actions
    }

    /// Take every step the proposals and votes seen so far allow.
    fn progress(&mut self) -> Vec<ConsensusAction> {
        let mut actions = Vec::new();
        while self.step != Step::Commit {
            if let Some(commit) = self.try_commit() {
                actions.extend(commit);
                break;
            }
            if let Some(precommit) = self.try_precommit() {
                actions.extend(precommit);
                continue;
            }
            match self.try_prevote() {
                Some(prevote) => actions.extend(prevote),
                None => break,
            }
        }
        actions
    }

    /// Prevote the current proposal if it is compatible with our lock.
    /// Otherwise abstain; the round times out or a later prevote unlocks it.
    fn try_prevote(&mut self) -> Option<Vec<ConsensusAction>> {
        if self.step != Step::Propose {
            return None;
        }
        let (hash, pol_round) = self
            .proposals
            .get(&self.round)
            .map(|(block, pol)| (block.hash(), *pol))?;
        let lock = self.locked();
        let acceptable = match pol_round {
            None => lock.map_or(true, |(_, locked)| locked == hash),
            Some(pol) => {
                self.snapshot
                    .is_supermajority(self.voting_power(VoteKind::Prevote, pol, &hash))
                    && lock.map_or(true, |(locked_round, locked)| locked_round <= pol || locked == hash)
            }
        };
        if !acceptable {
            return None;
        }
        self.step = Step::Prevote;
        Some(self.cast_vote(VoteKind::Prevote, hash))
    }

    /// Lock on the current proposal once it has a prevote supermajority in
    /// this round, then precommit it.
    fn try_precommit(&mut self) -> Option<Vec<ConsensusAction>> {
        if !matches!(self.step, Step::Propose | Step::Prevote) {
            return None;
        }
        let block = self.proposals.get(&self.round).map(|(block, _)| block.clone())?;
        let hash = block.hash();
        if !self
            .snapshot
            .is_supermajority(self.voting_power(VoteKind::Prevote, self.round, &hash))
        {
            return None;
        }
        tracing::debug!(height = self.height, round = self.round, block = %hex::encode(hash), "locked on block");
        self.locked = Some((self.round, block.clone()));
        self.valid = Some((self.round, block));
        self.step = Step::Precommit;
        Some(self.cast_vote(VoteKind::Precommit, hash))
    }

    /// Commit any proposal of this height with a precommit supermajority in
    /// the round it was proposed in.
    fn try_commit(&mut self) -> Option<Vec<ConsensusAction>> {
        let (round, block) = self
            .proposals
            .iter()
            .find(|(round, (block, _))| {
                self.snapshot
                    .is_supermajority(self.voting_power(VoteKind::Precommit, **round, &block.hash()))
            })
            .map(|(round, (block, _))| (*round, block.clone()))?;
        let hash = block.hash();
        let votes: Vec<Vote> = self
            .votes
            .range((round, VoteKind::Precommit, [0u8; 20])..=(round, VoteKind::Precommit, [0xffu8; 20]))
            .map(|(_, v)| v)
            .filter(|v| v.block_hash == hash)
            .cloned()
            .collect();
        self.step = Step::Commit;
        tracing::debug!(height = self.height, round, votes = votes.len(), "precommit supermajority reached");
        Some(vec![
            ConsensusAction::CommitBlock {
                block: block.clone(),
                votes: votes.clone(),
            },
            ConsensusAction::Broadcast(ConsensusMessage::Commit(Box::new(CommitCertificate {
                block,
                votes,
            }))),
        ])
    }

    fn cast_vote(&mut self, kind: VoteKind, block_hash: Hash) -> Vec<ConsensusAction> {
        let Some(keypair) = self.keypair.as_ref() else {
            return Vec::new();
        };
        if !self.snapshot.contains(&keypair.address()) {
            return Vec::new();
        }
        let key = (self.round, kind, keypair.address());
        if self.votes.contains_key(&key) {
            return Vec::new();
        }
        let vote = sign_vote(keypair, kind, self.height, self.round, block_hash);
        self.votes.insert(key, vote.clone());
        vec![ConsensusAction::Broadcast(ConsensusMessage::Vote(vote))]
    }

    fn stale(&self, height: Height, round: Round) -> ConsensusError {
        ConsensusError::StaleMessage {
            height,
            round,
            current_height: self.height,
            current_round: self.round,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use vindex_types::block::BlockHeader;
    use vindex_types::validator::ValidatorPower;

    const TIMEOUTS: TimeoutPolicy = TimeoutPolicy {
        base: Duration::from_secs(3),
        max: Duration::from_secs(30),
    };

    fn keypair(index: usize) -> Keypair {
        Keypair::from_seed(&[(index + 1) as u8; 32])
    }

    fn snapshot_of(powers: &[u128]) -> ValidatorSetSnapshot {
        ValidatorSetSnapshot::new(
            0,
            powers
                .iter()
                .enumerate()
                .map(|(i, p)| ValidatorPower {
                    address: keypair(i).address(),
                    pubkey: keypair(i).public_key(),
                    power: *p,
                })
                .collect(),
        )
    }

    fn block(height: Height, round: Round, proposer: Address) -> Block {
        Block {
            header: BlockHeader {
                height,
                round,
                timestamp: 1_000 + height,
                proposer,
                prev_hash: [0u8; 32],
                tx_root: [0u8; 32],
                evidence_root: [0u8; 32],
                state_root: [1u8; 32],
            },
            transactions: vec![],
            evidence: vec![],
        }
    }

    /// One engine per validator, validator `i` signing with `keypair(i)`.
    fn network(powers: &[u128]) -> (Vec<ConsensusEngine>, ValidatorSetSnapshot) {
        let snap = snapshot_of(powers);
        let engines = (0..powers.len())
            .map(|i| ConsensusEngine::new(Some(keypair(i)), snap.clone(), 1, TIMEOUTS, 3))
            .collect();
        (engines, snap)
    }

    fn index_of(engines: &[ConsensusEngine], address: &Address) -> usize {
        engines
            .iter()
            .position(|e| e.address().as_ref() == Some(address))
            .unwrap()
    }

    /// Index of the scheduled proposer of (1, round) and its fresh block.
    fn proposer_block(engines: &[ConsensusEngine], snap: &ValidatorSetSnapshot, round: Round) -> (usize, Block) {
        let proposer = *ProposerSchedule::new(snap).proposer(1, round).unwrap();
        (index_of(engines, &proposer), block(1, round, proposer))
    }

    fn tagged(node: usize, actions: Vec<ConsensusAction>) -> Vec<(usize, ConsensusAction)> {
        actions.into_iter().map(|a| (node, a)).collect()
    }

    /// Deliver broadcasts between engines until nothing is left. `link` decides
    /// whether a message from one engine reaches another. Returns every
    /// (engine, block) commit.
    fn relay(
        engines: &mut [ConsensusEngine],
        start: Vec<(usize, ConsensusAction)>,
        link: impl Fn(usize, usize, &ConsensusMessage) -> bool,
    ) -> Vec<(usize, Block)> {
        let mut queue: VecDeque<(usize, ConsensusAction)> = start.into();
        let mut committed = Vec::new();
        while let Some((from, action)) = queue.pop_front() {
            match action {
                ConsensusAction::Broadcast(message) => {
                    for to in 0..engines.len() {
                        if to == from || !link(from, to, &message) {
                            continue;
                        }
                        let result = match message.clone() {
                            ConsensusMessage::Proposal(p) => engines[to].on_proposal(*p),
                            ConsensusMessage::Vote(v) => engines[to].on_vote(v),
                            ConsensusMessage::Commit(_) => Ok(Vec::new()),
                        };
                        if let Ok(actions) = result {
                            queue.extend(tagged(to, actions));
                        }
                    }
                }
                ConsensusAction::CommitBlock { block, .. } => committed.push((from, block)),
                _ => {}
            }
        }
        committed
    }

    fn commits(actions: &[ConsensusAction]) -> bool {
        actions
            .iter()
            .any(|a| matches!(a, ConsensusAction::CommitBlock { .. }))
    }

    fn votes_cast(actions: &[ConsensusAction]) -> Vec<Vote> {
        actions
            .iter()
            .filter_map(|a| match a {
                ConsensusAction::Broadcast(ConsensusMessage::Vote(v)) => Some(v.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_timeout_backoff_is_capped() {
        assert_eq!(TIMEOUTS.for_round(0), Duration::from_secs(3));
        assert_eq!(TIMEOUTS.for_round(1), Duration::from_secs(6));
        assert_eq!(TIMEOUTS.for_round(3), Duration::from_secs(24));
        assert_eq!(TIMEOUTS.for_round(4), Duration::from_secs(30));
        assert_eq!(TIMEOUTS.for_round(40), Duration::from_secs(30));
    }

    #[test]
    fn test_solo_validator_commits_own_proposal() {
        let (mut engines, _) = network(&[100]);
        let engine = &mut engines[0];
        let addr = engine.address().unwrap();

        let start = engine.start_round();
        assert!(start.contains(&ConsensusAction::BuildProposal { height: 1, round: 0 }));

        let b = block(1, 0, addr);
        let actions = engine.propose(b.clone()).unwrap();
        assert!(commits(&actions));
        assert_eq!(engine.step(), Step::Commit);
        let kinds: Vec<VoteKind> = votes_cast(&actions).iter().map(|v| v.kind).collect();
        assert_eq!(kinds, vec![VoteKind::Prevote, VoteKind::Precommit]);

        let certificate = actions
            .iter()
            .find_map(|a| match a {
                ConsensusAction::Broadcast(ConsensusMessage::Commit(c)) => Some(c.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(certificate.block, b);
        assert_eq!(certificate.votes.len(), 1);
        assert_eq!(certificate.votes[0].kind, VoteKind::Precommit);

        let next = engine.on_committed(1, None);
        assert_eq!(engine.height(), 2);
        assert_eq!(engine.locked(), None);
        assert!(next.contains(&ConsensusAction::BuildProposal { height: 2, round: 0 }));
    }

    /// A(1000), B(2000), C(3000): A+B = 3000 is short of the 4001 threshold,
    /// B+C = 5000 commits.
    #[test]
    fn test_supermajority_by_stake() {
        let powers = [1000, 2000, 3000];
        let (engines, snap) = network(&powers);
        let (p, b) = proposer_block(&engines, &snap, 0);
        let proposal = sign_proposal(&keypair(p), 1, 0, b.clone(), None);
        let vote = |i: usize, kind| sign_vote(&keypair(i), kind, 1, 0, b.hash());

        // A follower that sees every prevote but only A's and B's precommits.
        let mut observer = ConsensusEngine::new(None, snap.clone(), 1, TIMEOUTS, 3);
        observer.on_proposal(proposal.clone()).unwrap();
        for i in 0..3 {
            observer.on_vote(vote(i, VoteKind::Prevote)).unwrap();
        }
        assert!(!commits(&observer.on_vote(vote(0, VoteKind::Precommit)).unwrap()));
        assert!(!commits(&observer.on_vote(vote(1, VoteKind::Precommit)).unwrap()));
        assert_eq!(observer.voting_power(VoteKind::Precommit, 0, &b.hash()), 3000);
        assert!(commits(&observer.on_vote(vote(2, VoteKind::Precommit)).unwrap()));

        let mut observer = ConsensusEngine::new(None, snap, 1, TIMEOUTS, 3);
        observer.on_proposal(proposal).unwrap();
        for i in 1..3 {
            observer.on_vote(vote(i, VoteKind::Prevote)).unwrap();
        }
        assert!(!commits(&observer.on_vote(vote(1, VoteKind::Precommit)).unwrap()));
        assert!(commits(&observer.on_vote(vote(2, VoteKind::Precommit)).unwrap()));
    }

    #[test]
    fn test_connected_validators_commit_same_block() {
        let (mut engines, snap) = network(&[1000, 2000, 3000]);
        let (p, b) = proposer_block(&engines, &snap, 0);
        let actions = engines[p].propose(b.clone()).unwrap();
        let committed = relay(&mut engines, tagged(p, actions), |_, _, _| true);
        assert_eq!(committed.len(), 3);
        assert!(committed.iter().all(|(_, c)| c == &b));
    }

    #[test]
    fn test_proposal_from_wrong_validator_rejected() {
        let (mut engines, snap) = network(&[10, 10, 10, 10]);
        let (p, _) = proposer_block(&engines, &snap, 0);
        let other = (p + 1) % 4;
        let forged = sign_proposal(&keypair(other), 1, 0, block(1, 0, keypair(other).address()), None);
        assert!(matches!(
            engines[p].on_proposal(forged),
            Err(ConsensusError::InvalidProposer { .. })
        ));
    }

    #[test]
    fn test_reproposal_needs_pol_round() {
        let (mut engines, snap) = network(&[10, 10, 10, 10]);
        let (p0, b0) = proposer_block(&engines, &snap, 0);
        let (p1, _) = proposer_block(&engines, &snap, 1);
        let follower = (0..4).find(|i| *i != p0 && *i != p1).unwrap();

        // Round-0 block re-proposed in round 1 without naming a pol round.
        let bare = sign_proposal(&keypair(p1), 1, 1, b0.clone(), None);
        assert!(matches!(
            engines[follower].on_proposal(bare),
            Err(ConsensusError::InvalidProposer { .. })
        ));
        // A pol round before the block was built is inconsistent too.
        let (_, b1) = proposer_block(&engines, &snap, 1);
        let early = sign_proposal(&keypair(p1), 1, 2, b1, Some(0));
        assert!(engines[follower].on_proposal(early).is_err());
    }

    #[test]
    fn test_bad_and_unknown_votes() {
        let (mut engines, _) = network(&[10, 10, 10, 10]);
        let hash = [7u8; 32];

        let outsider = sign_vote(&Keypair::from_seed(&[99u8; 32]), VoteKind::Prevote, 1, 0, hash);
        assert_eq!(engines[0].on_vote(outsider), Err(ConsensusError::UnknownVoter));

        let mut forged = sign_vote(&keypair(1), VoteKind::Prevote, 1, 0, hash);
        forged.block_hash = [8u8; 32];
        assert_eq!(engines[0].on_vote(forged), Err(ConsensusError::InvalidSignature));

        // A prevote signature does not pass as a precommit.
        let mut relabeled = sign_vote(&keypair(1), VoteKind::Prevote, 1, 0, hash);
        relabeled.kind = VoteKind::Precommit;
        assert_eq!(engines[0].on_vote(relabeled), Err(ConsensusError::InvalidSignature));

        let stale = sign_vote(&keypair(1), VoteKind::Prevote, 0, 0, hash);
        assert!(matches!(
            engines[0].on_vote(stale),
            Err(ConsensusError::StaleMessage { .. })
        ));
    }

    #[test]
    fn test_equivocation_reported() {
        let (mut engines, _) = network(&[10, 10, 10, 10]);
        let kp = keypair(1);
        let first = sign_vote(&kp, VoteKind::Precommit, 1, 0, [1u8; 32]);
        let second = sign_vote(&kp, VoteKind::Precommit, 1, 0, [2u8; 32]);

        assert!(engines[0].on_vote(first.clone()).unwrap().is_empty());
        assert!(engines[0].on_vote(first.clone()).unwrap().is_empty());
        let actions = engines[0].on_vote(second).unwrap();
        let evidence = match actions.as_slice() {
            [ConsensusAction::ReportEquivocation(e)] => e.clone(),
            other => panic!("expected evidence, got {other:?}"),
        };
        assert_eq!(verify_evidence(&evidence).unwrap(), kp.address());

        let bogus = EquivocationEvidence {
            vote_a: first.clone(),
            vote_b: first.clone(),
        };
        assert!(verify_evidence(&bogus).is_err());

        // A prevote and a precommit for different blocks are not equivocation.
        let mixed = EquivocationEvidence {
            vote_a: sign_vote(&kp, VoteKind::Prevote, 1, 0, [3u8; 32]),
            vote_b: first,
        };
        assert!(verify_evidence(&mixed).is_err());
    }

    #[test]
    fn test_timeout_rotates_proposer_and_reports_stall() {
        let (mut engines, _) = network(&[10, 20, 30, 40]);
        let engine = &mut engines[0];
        let first = *engine.current_proposer().unwrap();

        let actions = engine.on_timeout(1, 0);
        assert_eq!(engine.round(), 1);
        assert_ne!(engine.current_proposer(), Some(&first));
        assert!(actions.contains(&ConsensusAction::ScheduleTimeout {
            height: 1,
            round: 1,
            after: Duration::from_secs(6),
        }));

        // Timeouts for rounds already left are ignored.
        assert!(engine.on_timeout(1, 0).is_empty());
        assert_eq!(engine.health(), Health::Live);

        engine.on_timeout(1, 1);
        engine.on_timeout(1, 2);
        assert_eq!(
            engine.health(),
            Health::Stalled {
                height: 1,
                failed_rounds: 3
            }
        );

        engine.on_committed(1, None);
        assert_eq!(engine.health(), Health::Live);
    }

    #[test]
    fn test_later_round_proposal_advances_round() {
        let (mut engines, snap) = network(&[10, 10, 10, 10]);
        let (p, b) = proposer_block(&engines, &snap, 2);
        let follower = (p + 1) % 4;
        let proposal = sign_proposal(&keypair(p), 1, 2, b, None);

        let actions = engines[follower].on_proposal(proposal).unwrap();
        assert_eq!(engines[follower].round(), 2);
        let votes = votes_cast(&actions);
        assert_eq!(votes.len(), 1);
        assert_eq!((votes[0].kind, votes[0].round), (VoteKind::Prevote, 2));
    }

    #[test]
    fn test_votes_from_a_third_pull_node_forward() {
        let (mut engines, _) = network(&[10, 10, 10, 10]);
        let hash = [5u8; 32];
        engines[0].on_vote(sign_vote(&keypair(1), VoteKind::Prevote, 1, 3, hash)).unwrap();
        assert_eq!(engines[0].round(), 0);
        engines[0].on_vote(sign_vote(&keypair(2), VoteKind::Prevote, 1, 3, hash)).unwrap();
        assert_eq!(engines[0].round(), 3);
    }

    /// Every prevote of round 0 reaches one validator only. It locks and
    /// precommits alone, which commits nothing. In round 1 it refuses the new
    /// block until the others form a prevote supermajority for it, and then
    /// every validator commits that same block.
    #[test]
    fn test_lock_held_by_one_validator_does_not_fork() {
        let (mut engines, snap) = network(&[10, 10, 10, 10]);
        let (p0, x) = proposer_block(&engines, &snap, 0);
        let (p1, y) = proposer_block(&engines, &snap, 1);
        let k = (0..4).find(|i| *i != p1).unwrap();

        let actions = engines[p0].propose(x.clone()).unwrap();
        let committed = relay(&mut engines, tagged(p0, actions), |_, to, msg| match msg {
            ConsensusMessage::Vote(v) if v.round == 0 => to == k,
            _ => true,
        });
        assert!(committed.is_empty());
        assert_eq!(engines[k].locked(), Some((0, x.hash())));
        assert!((0..4).filter(|i| *i != k).all(|i| engines[i].locked().is_none()));

        for engine in engines.iter_mut() {
            engine.on_timeout(1, 0);
        }
        let proposal = sign_proposal(&keypair(p1), 1, 1, y.clone(), None);
        let refused = engines[k].on_proposal(proposal).unwrap();
        assert!(votes_cast(&refused).is_empty());

        let actions = engines[p1].propose(y.clone()).unwrap();
        let committed = relay(&mut engines, tagged(p1, actions), |_, _, _| true);
        assert_eq!(committed.len(), 4);
        assert!(committed.iter().all(|(_, b)| b == &y));
        assert_eq!(engines[k].locked(), Some((1, y.hash())));
    }

    /// Everyone locks on X in round 0 but no precommit gets through. The
    /// round-1 proposer re-proposes X instead of building a new block.
    #[test]
    fn test_locked_block_is_reproposed() {
        let (mut engines, snap) = network(&[10, 10, 10, 10]);
        let (p0, x) = proposer_block(&engines, &snap, 0);
        let (p1, _) = proposer_block(&engines, &snap, 1);

        let actions = engines[p0].propose(x.clone()).unwrap();
        let committed = relay(&mut engines, tagged(p0, actions), |_, _, msg| {
            !matches!(msg, ConsensusMessage::Vote(v) if v.kind == VoteKind::Precommit)
        });
        assert!(committed.is_empty());
        assert!(engines.iter().all(|e| e.locked() == Some((0, x.hash()))));

        let mut start = Vec::new();
        for (i, engine) in engines.iter_mut().enumerate() {
            start.extend(tagged(i, engine.on_timeout(1, 0)));
        }
        let reproposal = start
            .iter()
            .find_map(|(i, a)| match a {
                ConsensusAction::Broadcast(ConsensusMessage::Proposal(p)) if *i == p1 => Some(p.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!((reproposal.round, reproposal.pol_round), (1, Some(0)));
        assert_eq!(reproposal.block, x);
        assert!(!start
            .iter()
            .any(|(_, a)| matches!(a, ConsensusAction::BuildProposal { .. })));

        let committed = relay(&mut engines, start, |_, _, _| true);
        assert_eq!(committed.len(), 4);
        assert!(committed.iter().all(|(_, b)| b == &x));
    }

    #[test]
    fn test_late_precommits_commit_earlier_round() {
        let (mut engines, snap) = network(&[10, 10, 10, 10]);
        let (p, x) = proposer_block(&engines, &snap, 0);
        let observer = (p + 1) % 4;
        engines[observer]
            .on_proposal(sign_proposal(&keypair(p), 1, 0, x.clone(), None))
            .unwrap();
        engines[observer].on_timeout(1, 0);
        assert_eq!(engines[observer].round(), 1);

        let others: Vec<usize> = (0..4).filter(|i| *i != observer).collect();
        let mut committed = false;
        for i in others {
            let actions = engines[observer]
                .on_vote(sign_vote(&keypair(i), VoteKind::Precommit, 1, 0, x.hash()))
                .unwrap();
            committed |= commits(&actions);
        }
        assert!(committed);
        assert_eq!(engines[observer].step(), Step::Commit);
    }
}
