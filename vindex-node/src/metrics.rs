use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

/// Node-wide Prometheus metrics.
pub struct NodeMetrics {
    pub height: Gauge,
    pub round: Gauge,
    pub mempool_size: Gauge,
    pub blocks_committed: Counter,
    pub transactions_committed: Counter,
    pub round_timeouts: Counter,
    pub registry: Registry,
}

impl NodeMetrics {
    /// Create a new metrics registry with all node metrics registered.
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let height = Gauge::default();
        let round = Gauge::default();
        let mempool_size = Gauge::default();
        let blocks_committed = Counter::default();
        let transactions_committed = Counter::default();
        let round_timeouts = Counter::default();

        registry.register("vindex_height", "Latest committed height", height.clone());
        registry.register("vindex_round", "Consensus round at the current height", round.clone());
        registry.register(
            "vindex_mempool_size",
            "Transactions waiting in the mempool",
            mempool_size.clone(),
        );
        registry.register(
            "vindex_blocks_committed",
            "Blocks committed by this node",
            blocks_committed.clone(),
        );
        registry.register(
            "vindex_transactions_committed",
            "Transactions included in committed blocks",
            transactions_committed.clone(),
        );
        registry.register(
            "vindex_round_timeouts",
            "Rounds that ended without a commit",
            round_timeouts.clone(),
        );

        Self {
            height,
            round,
            mempool_size,
            blocks_committed,
            transactions_committed,
            round_timeouts,
            registry,
        }
    }

    /// Encode all metrics in Prometheus text exposition format.
    pub fn encode(&self) -> String {
        let mut buf = String::new();
        if let Err(e) = prometheus_client::encoding::text::encode(&mut buf, &self.registry) {
            tracing::warn!("failed to encode metrics: {}", e);
        }
        buf
    }
}

impl Default for NodeMetrics {
    fn default() -> Self {
        Self::new()
    }
}
