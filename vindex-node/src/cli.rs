use clap::{Parser, Subcommand};

use vindex_crypto::keys::Keypair;

use crate::config::NodeConfig;
use crate::error::NodeError;
use crate::genesis::{devnet_genesis, DEVNET_VALIDATOR_SEED};

#[derive(Parser)]
#[command(
    name = "vindex",
    about = "VindexChain node: delegated proof-of-stake ledger with token factory and domains",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the node
    Run {
        /// Path to config file
        #[arg(short, long, default_value = crate::config::CONFIG_FILE)]
        config: String,
        /// Start a solo devnet validator with in-memory storage
        #[arg(long)]
        dev: bool,
        /// Storage backend: "memory" or "rocksdb"
        #[arg(long)]
        storage: Option<String>,
        /// Override data directory path
        #[arg(long)]
        data_dir: Option<String>,
        /// Override the genesis file
        #[arg(long)]
        genesis: Option<String>,
        /// Hex-encoded 32-byte seed for the validator keypair
        #[arg(long)]
        keypair_seed: Option<String>,
        /// Wipe the data directory before starting
        #[arg(long)]
        reset_state: bool,
    },
    /// Write a default vindex.toml
    Init {
        /// Output directory
        #[arg(short, long, default_value = ".")]
        dir: String,
    },
    /// Validate a genesis file and print its block hash and state root
    Genesis {
        /// Path to the genesis JSON file
        #[arg(short, long)]
        path: String,
    },
    /// Generate a new validator keypair
    Keygen,
}

/// Configuration for `run --dev`: a solo validator over the devnet genesis.
pub fn dev_config() -> Result<NodeConfig, NodeError> {
    let mut cfg = NodeConfig::default();
    cfg.validator.enabled = true;
    cfg.validator.solo_mode = true;
    cfg.validator.keypair_seed = Some(DEVNET_VALIDATOR_SEED.to_string());
    cfg.storage.backend = "memory".to_string();
    cfg.genesis_config = Some(devnet_genesis()?.0);
    Ok(cfg)
}

/// Log level to start with: the `[logging]` level of the config `run` will use.
pub fn log_level(cli: &Cli) -> String {
    match &cli.command {
        Command::Run {
            config, dev: false, ..
        } => NodeConfig::load(config)
            .map(|c| c.logging.level)
            .unwrap_or_else(|_| "info".to_string()),
        _ => "info".to_string(),
    }
}

pub async fn run(cli: Cli) -> Result<(), NodeError> {
    match cli.command {
        Command::Run {
            config,
            dev,
            storage,
            data_dir,
            genesis,
            keypair_seed,
            reset_state,
        } => {
            crate::banner::print_banner();

            let mut config = if dev {
                dev_config()?
            } else {
                NodeConfig::load(&config)?
            };

            // Apply CLI overrides.
            if let Some(backend) = storage {
                config.storage.backend = backend;
            }
            if let Some(dir) = data_dir {
                config.storage.data_dir = dir;
            }
            if let Some(path) = genesis {
                config.genesis_path = Some(path);
                config.genesis_config = None;
            }
            if let Some(seed) = keypair_seed {
                config.validator.keypair_seed = Some(seed);
            }
            config.validate()?;

            if reset_state {
                let path = std::path::Path::new(&config.storage.data_dir);
                if path.exists() {
                    tracing::warn!(data_dir = %config.storage.data_dir, "wiping data directory (--reset-state)");
                    std::fs::remove_dir_all(path)?;
                }
            }

            {
                let dim = console::Style::new().dim();
                let cyan = console::Style::new().cyan();
                let mode = match (dev, config.validator.enabled, config.validator.solo_mode) {
                    (true, _, _) => "dev · solo validator".to_string(),
                    (false, true, true) => "solo validator".to_string(),
                    (false, true, false) => "validator".to_string(),
                    (false, false, _) => "follower".to_string(),
                };
                println!("  {} {}", dim.apply_to("Mode    "), cyan.apply_to(mode));
                println!(
                    "  {} {} ({})",
                    dim.apply_to("Storage "),
                    cyan.apply_to(&config.storage.backend),
                    cyan.apply_to(&config.storage.data_dir),
                );
                println!();
            }

            let mut node = crate::node::Node::new(config)?;
            let handle = node.handle();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("received shutdown signal");
                    handle.shutdown();
                }
            });
            node.run().await
        }
        Command::Init { dir } => {
            NodeConfig::init(&dir)?;
            tracing::info!("node configuration initialized in {}", dir);
            Ok(())
        }
        Command::Genesis { path } => crate::genesis::check_genesis(&path),
        Command::Keygen => {
            let keypair = Keypair::generate();
            println!("Seed:       {}", hex::encode(keypair.seed()));
            println!("Public key: {}", hex::encode(keypair.public_key()));
            println!("Address:    {}", hex::encode(keypair.address()));
            Ok(())
        }
    }
}
