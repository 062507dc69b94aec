//! End-to-end: a solo devnet validator commits blocks carrying user
//! transactions, then resumes from RocksDB after a restart.

use std::time::Duration;

use vindex_chain::engine::StateReader;
use vindex_chain::transaction::sign_transaction;
use vindex_crypto::keys::Keypair;
use vindex_node::config::NodeConfig;
use vindex_node::genesis::{devnet_genesis, DEVNET_FAUCET_SEED, DEVNET_VALIDATOR_SEED};
use vindex_node::node::{Node, NodeHandle};
use vindex_types::consensus::Health;
use vindex_types::constants::ONE_OC;
use vindex_types::primitives::Height;
use vindex_types::transaction::TxPayload;

fn solo_config(backend: &str, data_dir: &str) -> NodeConfig {
    let mut config = NodeConfig::default();
    config.storage.backend = backend.to_string();
    config.storage.data_dir = data_dir.to_string();
    config.validator.enabled = true;
    config.validator.solo_mode = true;
    config.validator.keypair_seed = Some(DEVNET_VALIDATOR_SEED.to_string());
    config.consensus.block_interval_ms = 20;
    config.consensus.base_timeout_ms = 1_000;
    config.genesis_config = Some(devnet_genesis().unwrap().0);
    config
}

async fn wait_for_height(handle: &NodeHandle, height: Height) {
    tokio::time::timeout(Duration::from_secs(20), async {
        while handle.chain().latest_height() < height {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("node did not reach the expected height");
}

#[tokio::test]
async fn test_solo_validator_commits_transactions() {
    let mut node = Node::new(solo_config("memory", "")).unwrap();
    let handle = node.handle();
    let task = tokio::spawn(async move { node.run().await });

    let faucet = Keypair::from_hex_seed(DEVNET_FAUCET_SEED).unwrap();
    let recipient = Keypair::from_seed(&[42u8; 32]).address();
    let admission = handle.chain().submit_transaction(sign_transaction(
        &faucet,
        0,
        TxPayload::Transfer {
            to: recipient,
            denom: "oc".into(),
            amount: 5 * ONE_OC,
        },
    ));
    assert!(admission.accepted, "{admission:?}");

    wait_for_height(&handle, 3).await;
    let account = handle.chain().query_account(&recipient, None).unwrap();
    assert_eq!(account.balance("oc"), 5 * ONE_OC);
    assert_eq!(handle.health(), Health::Live);

    handle.shutdown();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_restart_resumes_from_rocksdb() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().to_str().unwrap();

    let (height, root) = {
        let mut node = Node::new(solo_config("rocksdb", dir)).unwrap();
        let handle = node.handle();
        let task = tokio::spawn(async move { node.run().await });
        wait_for_height(&handle, 2).await;
        handle.shutdown();
        task.await.unwrap().unwrap();
        let state = handle.chain().snapshot();
        (state.height, state.state_root().unwrap())
    };

    let mut node = Node::new(solo_config("rocksdb", dir)).unwrap();
    let handle = node.handle();
    assert_eq!(handle.chain().latest_height(), height);
    assert_eq!(handle.chain().snapshot().state_root().unwrap(), root);

    let task = tokio::spawn(async move { node.run().await });
    wait_for_height(&handle, height + 1).await;
    handle.shutdown();
    task.await.unwrap().unwrap();
}
