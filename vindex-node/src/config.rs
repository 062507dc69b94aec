use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use vindex_chain::compliance::{AllowAll, ComplianceVerifier, DenyList};
use vindex_chain::consensus::TimeoutPolicy;
use vindex_chain::engine::{EngineOptions, DEFAULT_HISTORY_LIMIT};
use vindex_crypto::keys::Keypair;
use vindex_types::constants::{DEFAULT_MEMPOOL_CAPACITY, MAX_TXS_PER_BLOCK};
use vindex_types::primitives::parse_address;

use crate::error::NodeError;

/// Name of the file written by `vindex init`.
pub const CONFIG_FILE: &str = "vindex.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub storage: StorageConfig,
    pub validator: ValidatorConfig,
    #[serde(default)]
    pub consensus: ConsensusConfig,
    #[serde(default)]
    pub compliance: ComplianceConfig,
    pub logging: LoggingConfig,
    /// Path to a genesis JSON file.
    #[serde(default)]
    pub genesis_path: Option<String>,
    /// Inline genesis config (programmatic only, not serialized to TOML).
    #[serde(skip)]
    pub genesis_config: Option<vindex_types::genesis::GenesisConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
    /// Storage backend: "memory" or "rocksdb"
    pub backend: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorConfig {
    pub enabled: bool,
    /// Hex-encoded 32-byte seed for deterministic keypair generation.
    pub keypair_seed: Option<String>,
    /// The node is the only validator and commits its own proposals.
    #[serde(default)]
    pub solo_mode: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    /// Timeout of round 0; doubles every round.
    pub base_timeout_ms: u64,
    pub max_timeout_ms: u64,
    /// Failed rounds at one height before health reports `Stalled`.
    pub stall_threshold: u32,
    /// Minimum spacing between consecutive proposals from this node.
    pub block_interval_ms: u64,
    pub mempool_capacity: usize,
    pub max_txs_per_block: usize,
    /// Committed snapshots kept for historical queries.
    pub history_limit: usize,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            base_timeout_ms: 6_000,
            max_timeout_ms: 60_000,
            stall_threshold: 5,
            block_interval_ms: 3_000,
            mempool_capacity: DEFAULT_MEMPOOL_CAPACITY,
            max_txs_per_block: MAX_TXS_PER_BLOCK,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

/// Admission screening. An empty deny list accepts everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComplianceConfig {
    /// Hex addresses whose transactions are refused.
    #[serde(default)]
    pub deny_list: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig {
                data_dir: dirs::home_dir()
                    .map(|h| h.join(".vindex").join("data").to_string_lossy().into_owned())
                    .unwrap_or_else(|| "./vindex-data".to_string()),
                backend: "rocksdb".to_string(),
            },
            validator: ValidatorConfig {
                enabled: false,
                keypair_seed: None,
                solo_mode: false,
            },
            consensus: ConsensusConfig::default(),
            compliance: ComplianceConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
            },
            genesis_path: None,
            genesis_config: None,
        }
    }
}

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self, NodeError> {
        let contents = std::fs::read_to_string(path).map_err(|e| NodeError::ConfigError {
            reason: format!("failed to read config file '{}': {}", path, e),
        })?;
        let config: NodeConfig = toml::from_str(&contents).map_err(|e| NodeError::ConfigError {
            reason: format!("failed to parse config file '{}': {}", path, e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write a default configuration file into `dir`.
    pub fn init(dir: &str) -> Result<(), NodeError> {
        let dir_path = Path::new(dir);
        if !dir_path.exists() {
            std::fs::create_dir_all(dir_path)?;
        }

        let config = NodeConfig::default();
        let toml_str = toml::to_string_pretty(&config).map_err(|e| NodeError::ConfigError {
            reason: format!("failed to serialize default config: {}", e),
        })?;

        std::fs::write(dir_path.join(CONFIG_FILE), toml_str)?;
        Ok(())
    }

    /// Reject settings the node cannot run with.
    pub fn validate(&self) -> Result<(), NodeError> {
        let bad = |reason: String| Err(NodeError::ConfigError { reason });
        match self.storage.backend.as_str() {
            "memory" | "rocksdb" => {}
            other => {
                return bad(format!(
                    "unknown storage backend '{}', expected 'memory' or 'rocksdb'",
                    other
                ))
            }
        }
        let c = &self.consensus;
        if c.base_timeout_ms == 0 || c.max_timeout_ms < c.base_timeout_ms {
            return bad("consensus timeouts must satisfy 0 < base <= max".to_string());
        }
        if c.block_interval_ms >= c.base_timeout_ms {
            return bad("consensus.block_interval_ms must be below base_timeout_ms".to_string());
        }
        if c.mempool_capacity == 0 || c.max_txs_per_block == 0 || c.history_limit == 0 {
            return bad("mempool capacity, block size and history must be non-zero".to_string());
        }
        if self.validator.solo_mode && !self.validator.enabled {
            return bad("solo mode requires the validator to be enabled".to_string());
        }
        if self.validator.enabled && self.validator.keypair_seed.is_none() {
            return bad("an enabled validator needs validator.keypair_seed".to_string());
        }
        self.keypair()?;
        self.compliance_verifier()?;
        Ok(())
    }

    /// The validator keypair, if this node votes.
    pub fn keypair(&self) -> Result<Option<Keypair>, NodeError> {
        if !self.validator.enabled {
            return Ok(None);
        }
        match &self.validator.keypair_seed {
            Some(seed) => Keypair::from_hex_seed(seed)
                .map(Some)
                .map_err(|e| NodeError::ConfigError {
                    reason: format!("invalid keypair seed: {}", e),
                }),
            None => Ok(None),
        }
    }

    pub fn timeout_policy(&self) -> TimeoutPolicy {
        TimeoutPolicy {
            base: Duration::from_millis(self.consensus.base_timeout_ms),
            max: Duration::from_millis(self.consensus.max_timeout_ms),
        }
    }

    pub fn block_interval(&self) -> Duration {
        Duration::from_millis(self.consensus.block_interval_ms)
    }

    fn compliance_verifier(&self) -> Result<Arc<dyn ComplianceVerifier>, NodeError> {
        if self.compliance.deny_list.is_empty() {
            return Ok(Arc::new(AllowAll));
        }
        let blocked = self
            .compliance
            .deny_list
            .iter()
            .map(|s| {
                parse_address(s).ok_or_else(|| NodeError::ConfigError {
                    reason: format!("invalid address in compliance.deny_list: '{}'", s),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Arc::new(DenyList::new(blocked)))
    }

    /// Chain engine options derived from `[consensus]` and `[compliance]`.
    pub fn engine_options(&self) -> Result<EngineOptions, NodeError> {
        Ok(EngineOptions {
            mempool_capacity: self.consensus.mempool_capacity,
            max_txs_per_block: self.consensus.max_txs_per_block,
            history_limit: self.consensus.history_limit,
            compliance: self.compliance_verifier()?,
        })
    }
}
