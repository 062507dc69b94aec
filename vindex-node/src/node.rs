use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{mpsc, watch, Notify};
use tokio::time::{sleep_until, Instant};

use vindex_chain::consensus::{ConsensusAction, ConsensusEngine};
use vindex_chain::engine::{BlockOutcome, ChainEngine, StateApplier, StateReader};
use vindex_storage::memory::MemoryStore;
use vindex_storage::rocksdb::RocksDbStore;
use vindex_storage::traits::KvStore;
use vindex_types::consensus::{CommitCertificate, ConsensusMessage, Health};
use vindex_types::genesis::GenesisConfig;
use vindex_types::primitives::*;

use crate::config::NodeConfig;
use crate::error::NodeError;
use crate::metrics::NodeMetrics;

/// The chain engine as run by the node.
pub type Chain = ChainEngine<Arc<dyn KvStore>>;

const CHANNEL_CAPACITY: usize = 1_024;

/// Messages held for heights this node has not reached yet.
const MAX_FUTURE_MESSAGES: usize = 4_096;

/// A pending timer for (height, round).
#[derive(Debug, Clone, Copy)]
struct Timer {
    at: Instant,
    height: Height,
    round: Round,
}

/// Cloneable handle to a node, used by the transport and query layers.
#[derive(Clone)]
pub struct NodeHandle {
    chain: Arc<Chain>,
    inbound: mpsc::Sender<ConsensusMessage>,
    health: watch::Receiver<Health>,
    shutdown: Arc<Notify>,
}

impl NodeHandle {
    /// Read access to committed state and transaction submission.
    pub fn chain(&self) -> &Arc<Chain> {
        &self.chain
    }

    /// Hand a message received from a peer to the consensus driver.
    pub async fn deliver(&self, message: ConsensusMessage) -> Result<(), NodeError> {
        self.inbound.send(message).await.map_err(|_| NodeError::Stopped)
    }

    pub fn health(&self) -> Health {
        *self.health.borrow()
    }

    /// Receiver that changes whenever the liveness signal does.
    pub fn subscribe_health(&self) -> watch::Receiver<Health> {
        self.health.clone()
    }

    /// Ask the node loop to stop after the current step.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}

/// The consensus driver: feeds peer messages and timers into the consensus
/// state machine and carries out the actions it returns against the chain.
pub struct Node {
    config: NodeConfig,
    chain: Arc<Chain>,
    consensus: ConsensusEngine,
    metrics: Arc<NodeMetrics>,
    inbound_tx: mpsc::Sender<ConsensusMessage>,
    inbound_rx: mpsc::Receiver<ConsensusMessage>,
    outbound_tx: mpsc::Sender<ConsensusMessage>,
    outbound_rx: Option<mpsc::Receiver<ConsensusMessage>>,
    health_tx: watch::Sender<Health>,
    health_rx: watch::Receiver<Health>,
    shutdown: Arc<Notify>,
    round_timer: Option<Timer>,
    proposal_timer: Option<Timer>,
    last_commit: Option<Instant>,
    future: Vec<ConsensusMessage>,
    /// Certificate of the last committed block, resent to peers still on it.
    last_certificate: Option<CommitCertificate>,
    /// Last (height, round) of a lagging peer the certificate was resent for.
    resent_for: Option<(Height, Round)>,
}

/// Create a storage backend from the node configuration.
fn create_store(config: &NodeConfig) -> Result<Arc<dyn KvStore>, NodeError> {
    match config.storage.backend.as_str() {
        "memory" => Ok(Arc::new(MemoryStore::new())),
        "rocksdb" => {
            let data_dir = std::path::Path::new(&config.storage.data_dir);
            std::fs::create_dir_all(data_dir)?;
            let store = RocksDbStore::open(data_dir.join("chain.rocksdb"))?;
            Ok(Arc::new(store))
        }
        other => Err(NodeError::ConfigError {
            reason: format!(
                "unknown storage backend '{}', expected 'memory' or 'rocksdb'",
                other
            ),
        }),
    }
}

fn resolve_genesis(config: &NodeConfig) -> Result<GenesisConfig, NodeError> {
    if let Some(genesis) = &config.genesis_config {
        return Ok(genesis.clone());
    }
    match &config.genesis_path {
        Some(path) => crate::genesis::load_genesis(path),
        None => Err(NodeError::ConfigError {
            reason: "no genesis configured: set genesis_path or run with --dev".to_string(),
        }),
    }
}

impl Node {
    /// Open the chain and set up the consensus driver.
    pub fn new(config: NodeConfig) -> Result<Self, NodeError> {
        config.validate()?;
        let keypair = config.keypair()?;
        let genesis = resolve_genesis(&config)?;

        let store = create_store(&config)?;
        let chain = Arc::new(ChainEngine::open(store, &genesis, config.engine_options()?)?);
        let active = chain.query_active_set();
        let me = keypair.as_ref().map(|k| k.address());

        if config.validator.solo_mode {
            let sole = match me {
                Some(address) => active.len() == 1 && active.contains(&address),
                None => false,
            };
            if !sole {
                return Err(NodeError::ConfigError {
                    reason: format!(
                        "solo mode needs this validator to be the only active one ({} active)",
                        active.len()
                    ),
                });
            }
        }
        if let Some(address) = me.filter(|a| !active.contains(a)) {
            tracing::warn!(
                validator = %address_hex(&address),
                "validator key is not in the active set, following without voting"
            );
        }

        let height = chain.latest_height();
        let consensus = ConsensusEngine::new(
            keypair,
            active,
            height + 1,
            config.timeout_policy(),
            config.consensus.stall_threshold,
        );
        let (inbound_tx, inbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (health_tx, health_rx) = watch::channel(Health::Live);

        let metrics = Arc::new(NodeMetrics::new());
        metrics.height.set(height as i64);

        tracing::info!(
            chain_id = %genesis.chain_id,
            height,
            backend = %config.storage.backend,
            validator = ?me.map(|a| address_hex(&a)),
            solo = config.validator.solo_mode,
            "node initialized"
        );

        Ok(Self {
            config,
            chain,
            consensus,
            metrics,
            inbound_tx,
            inbound_rx,
            outbound_tx,
            outbound_rx: Some(outbound_rx),
            health_tx,
            health_rx,
            shutdown: Arc::new(Notify::new()),
            round_timer: None,
            proposal_timer: None,
            last_commit: None,
            future: Vec::new(),
            last_certificate: None,
            resent_for: None,
        })
    }

    pub fn handle(&self) -> NodeHandle {
        NodeHandle {
            chain: self.chain.clone(),
            inbound: self.inbound_tx.clone(),
            health: self.health_rx.clone(),
            shutdown: self.shutdown.clone(),
        }
    }

    /// Messages this node wants broadcast to its peers. A transport takes
    /// this before [`Node::run`]; without one, messages are dropped.
    pub fn take_outbound(&mut self) -> Option<mpsc::Receiver<ConsensusMessage>> {
        self.outbound_rx.take()
    }

    pub fn chain(&self) -> &Arc<Chain> {
        &self.chain
    }

    pub fn metrics(&self) -> &Arc<NodeMetrics> {
        &self.metrics
    }

    /// Run the consensus loop until shutdown or a fatal chain error.
    pub async fn run(&mut self) -> Result<(), NodeError> {
        if self.outbound_rx.take().is_some() && !self.config.validator.solo_mode {
            tracing::warn!("no transport attached, consensus messages will not leave this node");
        }
        let shutdown = self.shutdown.clone();

        let actions = self.consensus.start_round();
        self.process(actions)?;
        tracing::info!(height = self.consensus.height(), "node is running");

        loop {
            let proposal_at = self.proposal_timer.map(|t| t.at);
            let round_at = self.round_timer.map(|t| t.at);

            tokio::select! {
                _ = shutdown.notified() => {
                    tracing::info!(height = self.chain.latest_height(), "node shut down");
                    return Ok(());
                }
                Some(message) = self.inbound_rx.recv() => {
                    let actions = self.on_message(message)?;
                    self.process(actions)?;
                }
                _ = sleep_until(proposal_at.unwrap_or_else(Instant::now)), if proposal_at.is_some() => {
                    self.fire_proposal()?;
                }
                _ = sleep_until(round_at.unwrap_or_else(Instant::now)), if round_at.is_some() => {
                    self.fire_round_timeout()?;
                }
            }
        }
    }

    /// Carry out consensus actions, including those they trigger in turn.
    fn process(&mut self, actions: Vec<ConsensusAction>) -> Result<(), NodeError> {
        let mut queue = VecDeque::from(actions);
        while let Some(action) = queue.pop_front() {
            match action {
                ConsensusAction::BuildProposal { height, round } => {
                    let now = Instant::now();
                    let at = self
                        .last_commit
                        .map(|t| t + self.config.block_interval())
                        .map_or(now, |t| t.max(now));
                    self.proposal_timer = Some(Timer { at, height, round });
                }
                ConsensusAction::Broadcast(message) => self.broadcast(message),
                ConsensusAction::CommitBlock { block, votes } => {
                    // A peer's certificate may have committed it already.
                    if block.height() <= self.chain.latest_height() {
                        continue;
                    }
                    let outcome = self.chain.apply_block(&block)?;
                    queue.extend(self.after_commit(CommitCertificate { block, votes }, outcome)?);
                }
                ConsensusAction::ScheduleTimeout { height, round, after } => {
                    self.round_timer = Some(Timer {
                        at: Instant::now() + after,
                        height,
                        round,
                    });
                }
                ConsensusAction::ReportEquivocation(evidence) => {
                    tracing::warn!(
                        offender = %address_hex(&evidence.offender()),
                        height = evidence.vote_a.height,
                        "queueing equivocation evidence"
                    );
                    self.chain.add_evidence(evidence);
                }
            }
        }
        self.metrics.round.set(self.consensus.round() as i64);
        self.metrics.mempool_size.set(self.chain.mempool_len() as i64);
        self.publish_health();
        Ok(())
    }

    /// Validate a peer message and pass it to consensus.
    fn on_message(&mut self, message: ConsensusMessage) -> Result<Vec<ConsensusAction>, NodeError> {
        let (height, round) = message.position();
        if height > self.consensus.height() {
            if self.future.len() < MAX_FUTURE_MESSAGES {
                self.future.push(message);
            } else {
                tracing::debug!(height, round, "future message buffer full, dropping");
            }
            return Ok(Vec::new());
        }
        if height < self.consensus.height() {
            if !matches!(message, ConsensusMessage::Commit(_)) {
                self.resend_certificate(height, round);
            }
            return Ok(Vec::new());
        }

        let result = match message {
            ConsensusMessage::Proposal(proposal) => {
                if round >= self.consensus.round() {
                    if let Err(e) = self.chain.check_block(&proposal.block, unix_now()) {
                        tracing::warn!(height, round, error = %e, "rejecting invalid proposal");
                        return Ok(Vec::new());
                    }
                }
                self.consensus.on_proposal(*proposal)
            }
            ConsensusMessage::Vote(vote) => self.consensus.on_vote(vote),
            ConsensusMessage::Commit(certificate) => return self.adopt_certificate(*certificate),
        };
        match result {
            Ok(actions) => Ok(actions),
            Err(e) => {
                tracing::debug!(height, round, error = %e, "consensus message ignored");
                Ok(Vec::new())
            }
        }
    }

    /// Apply a block a peer committed at the current height.
    fn adopt_certificate(&mut self, certificate: CommitCertificate) -> Result<Vec<ConsensusAction>, NodeError> {
        let height = certificate.block.height();
        if height <= self.chain.latest_height() {
            return Ok(Vec::new());
        }
        match self.chain.apply_committed(&certificate.block, &certificate.votes) {
            Ok(outcome) => {
                tracing::info!(height, votes = certificate.votes.len(), "caught up from peer certificate");
                self.after_commit(certificate, outcome)
            }
            Err(e) if e.is_fatal() => Err(e.into()),
            Err(e) => {
                tracing::warn!(height, error = %e, "rejecting commit certificate");
                Ok(Vec::new())
            }
        }
    }

    /// Record a committed block, move consensus to the next height and replay
    /// messages held for it.
    fn after_commit(
        &mut self,
        certificate: CommitCertificate,
        outcome: BlockOutcome,
    ) -> Result<Vec<ConsensusAction>, NodeError> {
        self.last_commit = Some(Instant::now());
        self.proposal_timer = None;
        self.metrics.height.set(outcome.height as i64);
        self.metrics.blocks_committed.inc();
        self.metrics
            .transactions_committed
            .inc_by(certificate.block.transactions.len() as u64);
        tracing::debug!(height = outcome.height, votes = certificate.votes.len(), "block finalized");
        self.last_certificate = Some(certificate);

        let mut actions = self.consensus.on_committed(outcome.height, outcome.rotated);
        for message in std::mem::take(&mut self.future) {
            actions.extend(self.on_message(message)?);
        }
        Ok(actions)
    }

    /// A peer still voting on the last committed height missed its commit;
    /// send the certificate again, once per round of that peer.
    fn resend_certificate(&mut self, height: Height, round: Round) {
        let Some(certificate) = &self.last_certificate else {
            return;
        };
        if certificate.block.height() != height || self.resent_for == Some((height, round)) {
            return;
        }
        tracing::debug!(height, round, "resending commit certificate to a lagging peer");
        let message = ConsensusMessage::Commit(Box::new(certificate.clone()));
        self.resent_for = Some((height, round));
        self.broadcast(message);
    }

    fn fire_proposal(&mut self) -> Result<(), NodeError> {
        let Some(timer) = self.proposal_timer.take() else {
            return Ok(());
        };
        if (timer.height, timer.round) != (self.consensus.height(), self.consensus.round()) {
            return Ok(());
        }
        let Some(proposer) = self.consensus.address() else {
            return Ok(());
        };
        let block = self.chain.build_block(timer.round, proposer, unix_now())?;
        tracing::debug!(
            height = timer.height,
            round = timer.round,
            txs = block.transactions.len(),
            "proposing block"
        );
        match self.consensus.propose(block) {
            Ok(actions) => self.process(actions),
            Err(e) => {
                tracing::warn!(height = timer.height, round = timer.round, error = %e, "proposal refused");
                Ok(())
            }
        }
    }

    fn fire_round_timeout(&mut self) -> Result<(), NodeError> {
        let Some(timer) = self.round_timer.take() else {
            return Ok(());
        };
        let actions = self.consensus.on_timeout(timer.height, timer.round);
        if !actions.is_empty() {
            self.metrics.round_timeouts.inc();
        }
        self.process(actions)
    }

    fn broadcast(&self, message: ConsensusMessage) {
        if let Err(e) = self.outbound_tx.try_send(message) {
            tracing::trace!("outbound message not sent: {}", e);
        }
    }

    fn publish_health(&self) {
        let health = self.consensus.health();
        let changed = self.health_tx.send_if_modified(|current| {
            if *current == health {
                false
            } else {
                *current = health;
                true
            }
        });
        if !changed {
            return;
        }
        match health {
            Health::Live => tracing::info!(height = self.consensus.height(), "consensus is live"),
            Health::Stalled {
                height,
                failed_rounds,
            } => tracing::warn!(height, failed_rounds, "consensus stalled, no quorum"),
        }
    }
}

/// Current UNIX timestamp in seconds.
fn unix_now() -> Timestamp {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
