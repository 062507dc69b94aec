//! Several validators, each with its own chain engine, driven through the
//! consensus state machine over a simulated network.

mod common;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use common::*;
use vindex_chain::consensus::{sign_vote, ConsensusAction, ConsensusEngine, TimeoutPolicy};
use vindex_chain::engine::{BlockOutcome, ChainEngine, EngineOptions, StateApplier, StateReader};
use vindex_chain::error::ChainError;
use vindex_chain::leader::ProposerSchedule;
use vindex_crypto::keys::Keypair;
use vindex_storage::memory::MemoryStore;
use vindex_types::consensus::{ConsensusMessage, EquivocationEvidence, Health, VoteKind};
use vindex_types::constants::ONE_OC;
use vindex_types::error::ConsensusError;
use vindex_types::genesis::{ChainParameters, GenesisConfig, GenesisValidator};
use vindex_types::primitives::*;
use vindex_types::transaction::TxPayload;
use vindex_types::validator::ValidatorStatus;

const STALL_THRESHOLD: u32 = 3;

/// Validators A, B and C with 1000, 2000 and 3000 OC of stake.
fn trio() -> Vec<Keypair> {
    vec![keypair(11), keypair(12), keypair(13)]
}

/// Four validators with equal stake.
fn quartet() -> Vec<Keypair> {
    (21..25).map(keypair).collect()
}

fn staked_genesis(keys: &[Keypair], stakes: &[Amount]) -> GenesisConfig {
    let mut g = genesis(params());
    g.validators = keys
        .iter()
        .zip(stakes)
        .map(|(k, stake)| GenesisValidator {
            address: k.address(),
            pubkey: k.public_key(),
            stake: stake * ONE_OC,
        })
        .collect();
    g
}

fn trio_genesis() -> GenesisConfig {
    staked_genesis(&trio(), &[1_000, 2_000, 3_000])
}

struct Node {
    address: Address,
    chain: ChainEngine<Arc<MemoryStore>>,
    consensus: ConsensusEngine,
    /// Messages for a height this node has not reached yet.
    future: Vec<ConsensusMessage>,
}

type Link = Box<dyn Fn(usize, usize, &ConsensusMessage) -> bool>;

struct Network {
    nodes: Vec<Node>,
    connected: Vec<bool>,
    /// Whether a broadcast from one node reaches another.
    link: Link,
    queue: VecDeque<(usize, ConsensusAction)>,
    /// Nodes stop advancing once they commit this height.
    target: Height,
}

impl Network {
    fn new(genesis: &GenesisConfig, keys: &[Keypair], target: Height) -> Self {
        let nodes: Vec<Node> = keys
            .iter()
            .map(|keypair| {
                let chain = ChainEngine::open(
                    Arc::new(MemoryStore::new()),
                    genesis,
                    EngineOptions::default(),
                )
                .unwrap();
                let consensus = ConsensusEngine::new(
                    Some(Keypair::from_seed(&keypair.seed())),
                    chain.query_active_set(),
                    1,
                    TimeoutPolicy {
                        base: Duration::from_millis(100),
                        max: Duration::from_secs(1),
                    },
                    STALL_THRESHOLD,
                );
                Node {
                    address: keypair.address(),
                    chain,
                    consensus,
                    future: Vec::new(),
                }
            })
            .collect();
        let connected = vec![true; nodes.len()];
        Self {
            nodes,
            connected,
            link: Box::new(|_: usize, _: usize, _: &ConsensusMessage| true),
            queue: VecDeque::new(),
            target,
        }
    }

    fn start(&mut self) {
        for i in 0..self.nodes.len() {
            let actions = self.nodes[i].consensus.start_round();
            self.push(i, actions);
        }
    }

    fn push(&mut self, node: usize, actions: Vec<ConsensusAction>) {
        self.queue.extend(actions.into_iter().map(|a| (node, a)));
    }

    /// Process actions until nothing is left to do.
    fn run(&mut self) {
        while let Some((i, action)) = self.queue.pop_front() {
            match action {
                ConsensusAction::BuildProposal { height, round } => {
                    let node = &mut self.nodes[i];
                    let block = node
                        .chain
                        .build_block(round, node.address, T0 + 3 * height)
                        .unwrap();
                    let actions = node.consensus.propose(block).unwrap();
                    self.push(i, actions);
                }
                ConsensusAction::Broadcast(msg) => {
                    if !self.connected[i] {
                        continue;
                    }
                    for j in 0..self.nodes.len() {
                        if j != i && self.connected[j] && (self.link)(i, j, &msg) {
                            self.deliver(j, msg.clone());
                        }
                    }
                }
                ConsensusAction::CommitBlock { block, .. } => {
                    // A certificate from a peer may have committed it already.
                    if block.height() <= self.nodes[i].chain.latest_height() {
                        continue;
                    }
                    let outcome = self.nodes[i].chain.apply_block(&block).unwrap();
                    self.after_commit(i, outcome);
                }
                ConsensusAction::ScheduleTimeout { .. } => {}
                ConsensusAction::ReportEquivocation(evidence) => {
                    self.nodes[i].chain.add_evidence(evidence);
                }
            }
        }
    }

    fn after_commit(&mut self, i: usize, outcome: BlockOutcome) {
        if outcome.height >= self.target {
            return;
        }
        let node = &mut self.nodes[i];
        let actions = node.consensus.on_committed(outcome.height, outcome.rotated);
        let held = std::mem::take(&mut node.future);
        self.push(i, actions);
        for msg in held {
            self.deliver(i, msg);
        }
    }

    fn deliver(&mut self, j: usize, msg: ConsensusMessage) {
        let node = &mut self.nodes[j];
        let (height, _) = msg.position();
        if height > node.consensus.height() {
            node.future.push(msg);
            return;
        }
        let result = match msg {
            ConsensusMessage::Proposal(p) => {
                if p.height == node.consensus.height()
                    && node.chain.check_block(&p.block, T0 + 3 * p.height).is_err()
                {
                    return;
                }
                node.consensus.on_proposal(*p)
            }
            ConsensusMessage::Vote(v) => node.consensus.on_vote(v),
            ConsensusMessage::Commit(cert) => {
                if height < node.consensus.height() || node.chain.latest_height() >= height {
                    return;
                }
                if let Ok(outcome) = node.chain.apply_committed(&cert.block, &cert.votes) {
                    self.after_commit(j, outcome);
                }
                return;
            }
        };
        if let Ok(actions) = result {
            self.push(j, actions);
        }
    }

    /// Fire the current round timer on every node.
    fn fire_timeouts(&mut self) {
        for i in 0..self.nodes.len() {
            let c = &mut self.nodes[i].consensus;
            let (h, r) = (c.height(), c.round());
            let actions = c.on_timeout(h, r);
            self.push(i, actions);
        }
        self.run();
    }

    fn heights(&self) -> Vec<Height> {
        self.nodes.iter().map(|n| n.chain.latest_height()).collect()
    }

    fn heads(&self) -> Vec<Hash> {
        self.nodes.iter().map(|n| n.chain.snapshot().last_block_hash).collect()
    }
}

#[test]
fn three_validators_commit_the_same_chain() {
    let genesis = trio_genesis();
    let mut net = Network::new(&genesis, &trio(), 3);

    // Gossip one transfer to every node's mempool.
    let tx = vindex_chain::transaction::sign_transaction(
        &alice(),
        0,
        TxPayload::Transfer {
            to: bob().address(),
            denom: "oc".into(),
            amount: 25 * ONE_OC,
        },
    );
    for node in &net.nodes {
        assert!(node.chain.submit_transaction(tx.clone()).accepted);
    }

    net.start();
    net.run();

    assert_eq!(net.heights(), vec![3, 3, 3]);
    let roots: Vec<Hash> = net
        .nodes
        .iter()
        .map(|n| n.chain.snapshot().state_root().unwrap())
        .collect();
    assert!(roots.windows(2).all(|w| w[0] == w[1]));
    assert!(net.heads().windows(2).all(|w| w[0] == w[1]));
    for node in &net.nodes {
        assert_eq!(
            node.chain.query_account(&bob().address(), None).unwrap().balance("oc"),
            1_025 * ONE_OC
        );
        assert_eq!(node.chain.mempool_len(), 0);
        assert_eq!(node.consensus.health(), Health::Live);
    }
}

#[test]
fn partition_without_quorum_stalls_then_recovers() {
    let genesis = trio_genesis();
    let mut net = Network::new(&genesis, &trio(), 1);
    // C holds half the stake; A and B alone cannot reach two thirds.
    net.connected[2] = false;
    net.start();
    net.run();

    for _ in 0..STALL_THRESHOLD {
        net.fire_timeouts();
    }
    assert_eq!(net.heights(), vec![0, 0, 0]);
    for node in &net.nodes[..2] {
        assert!(matches!(node.consensus.health(), Health::Stalled { height: 1, .. }));
    }

    net.connected[2] = true;
    for _ in 0..6 {
        if net.heights() == vec![1, 1, 1] {
            break;
        }
        net.fire_timeouts();
    }
    assert_eq!(net.heights(), vec![1, 1, 1]);
}

#[test]
fn lock_seen_by_one_validator_does_not_fork() {
    let keys = quartet();
    let genesis = staked_genesis(&keys, &[1_000; 4]);
    let mut net = Network::new(&genesis, &keys, 1);
    let snapshot = net.nodes[0].chain.query_active_set();
    let second = *ProposerSchedule::new(&snapshot).proposer(1, 1).unwrap();
    let witness = net.nodes.iter().position(|n| n.address != second).unwrap();

    // Round-0 votes reach only the witness: it locks, nobody can commit.
    net.link = Box::new(move |_: usize, to: usize, msg: &ConsensusMessage| match msg {
        ConsensusMessage::Vote(v) if v.round == 0 => to == witness,
        _ => true,
    });
    net.start();
    net.run();
    assert_eq!(net.heights(), vec![0; 4]);
    let (lock_round, first) = net.nodes[witness].consensus.locked().unwrap();
    assert_eq!(lock_round, 0);
    for (i, node) in net.nodes.iter().enumerate() {
        if i != witness {
            assert_eq!(node.consensus.locked(), None);
        }
    }

    // The next proposer builds a different block. The witness refuses to
    // prevote it but follows the others' prevotes into the commit.
    net.link = Box::new(|_: usize, _: usize, _: &ConsensusMessage| true);
    net.fire_timeouts();

    assert_eq!(net.heights(), vec![1; 4]);
    let heads = net.heads();
    assert!(heads.windows(2).all(|w| w[0] == w[1]));
    assert_ne!(heads[0], first);
    for node in &net.nodes {
        let block = node.chain.block(1).unwrap().unwrap();
        assert_eq!(block.header.round, 1);
        assert_eq!(block.header.proposer, second);
    }
}

#[test]
fn commit_certificate_catches_up_peers() {
    let keys = quartet();
    let genesis = staked_genesis(&keys, &[1_000; 4]);
    let mut net = Network::new(&genesis, &keys, 1);

    // Only node 0 hears the precommits; the rest learn of the commit from
    // the certificate it broadcasts.
    net.link = Box::new(|_: usize, to: usize, msg: &ConsensusMessage| match msg {
        ConsensusMessage::Vote(v) if v.kind == VoteKind::Precommit => to == 0,
        _ => true,
    });
    net.start();
    net.run();

    assert_eq!(net.heights(), vec![1; 4]);
    assert!(net.heads().windows(2).all(|w| w[0] == w[1]));
    assert_eq!(net.nodes[1].chain.block(1).unwrap().unwrap().header.round, 0);
}

#[test]
fn committed_block_needs_supermajority_of_votes() {
    let keys = trio();
    let chain = ChainEngine::open(
        Arc::new(MemoryStore::new()),
        &trio_genesis(),
        EngineOptions::default(),
    )
    .unwrap();
    let block = chain.build_block(0, keys[2].address(), T0 + 3).unwrap();
    let vote = |k: &Keypair| sign_vote(k, VoteKind::Precommit, 1, 0, block.hash());

    let err = chain
        .apply_committed(&block, &[vote(&keys[0]), vote(&keys[1])])
        .unwrap_err();
    match err {
        ChainError::Consensus(ConsensusError::InsufficientQuorum { have, need }) => {
            assert_eq!(have, 3_000 * ONE_OC);
            assert_eq!(need, 4_000 * ONE_OC + 1);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(chain.latest_height(), 0);

    let outcome = chain
        .apply_committed(&block, &[vote(&keys[1]), vote(&keys[2])])
        .unwrap();
    assert_eq!(outcome.height, 1);
}

#[test]
fn equivocation_jails_at_next_epoch_until_unjailed() {
    let offender = keypair(4);
    let mut g = genesis(ChainParameters {
        epoch_length: 4,
        ..params()
    });
    g.validators.push(GenesisValidator {
        address: offender.address(),
        pubkey: offender.public_key(),
        stake: 500 * ONE_OC,
    });
    let h = Harness::open(Arc::new(MemoryStore::new()), &g);
    h.produce(T0 + 3);

    let evidence = EquivocationEvidence {
        vote_a: sign_vote(&offender, VoteKind::Prevote, 1, 0, [1u8; 32]),
        vote_b: sign_vote(&offender, VoteKind::Prevote, 1, 0, [2u8; 32]),
    };
    h.engine.add_evidence(evidence.clone());
    // Forged evidence never reaches a block.
    let mut forged = evidence.clone();
    forged.vote_b.signature[0] ^= 0xff;
    forged.vote_a.round = 1;
    h.engine.add_evidence(forged);

    let outcome = h.produce(T0 + 6);
    assert_eq!(outcome.jailed, vec![offender.address()]);
    assert_eq!(h.engine.block(2).unwrap().unwrap().evidence, vec![evidence]);
    assert_eq!(h.engine.query_active_set().len(), 2);

    h.produce(T0 + 9);
    let boundary = h.produce(T0 + 12);
    let rotated = boundary.rotated.expect("epoch 4 rotates the set");
    assert!(!rotated.contains(&offender.address()));
    let status = |engine: &ChainEngine<Arc<MemoryStore>>| {
        engine
            .query_validators(None)
            .unwrap()
            .into_iter()
            .find(|v| v.address == offender.address())
            .map(|v| v.status)
    };
    assert_eq!(status(&h.engine), Some(ValidatorStatus::Jailed));

    h.submit_ok(&offender, TxPayload::Unjail);
    for height in 5..8u64 {
        h.produce(T0 + 3 * height);
    }
    let rejoined = h.produce(T0 + 24).rotated.expect("epoch 8 rotates the set");
    assert!(rejoined.contains(&offender.address()));
    assert_eq!(status(&h.engine), Some(ValidatorStatus::Bonded));
}

#[test]
fn proposer_outside_active_set_is_rejected() {
    let h = Harness::new(params());
    let block = h.engine.build_block(0, alice().address(), T0 + 3).unwrap();
    assert!(matches!(
        h.engine.check_block(&block, T0 + 3),
        Err(ChainError::InvalidBlock { .. })
    ));
}
