use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};

use vindex_types::block::Block;
use vindex_types::primitives::{Hash, Height};

use crate::error::StorageError;
use crate::keys::{block_key, BLOCK_PREFIX, META_CHAIN_KEY, META_HEAD_KEY, STATE_PREFIXES};
use crate::traits::{KvStore, WriteBatch};

/// Encoded state: storage key to borsh value, in key order.
pub type StateEntries = BTreeMap<Vec<u8>, Vec<u8>>;

/// Borsh-encode a value for storage.
pub fn encode<T: BorshSerialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    borsh::to_vec(value).map_err(|e| StorageError::SerializationError {
        reason: e.to_string(),
    })
}

/// Borsh-decode a stored value, naming the key on failure.
pub fn decode<T: BorshDeserialize>(key: &[u8], bytes: &[u8]) -> Result<T, StorageError> {
    T::try_from_slice(bytes).map_err(|e| StorageError::DeserializationError {
        key: String::from_utf8_lossy(key).into_owned(),
        reason: e.to_string(),
    })
}

/// Writes between two committed states, as puts for new or changed entries
/// and deletes for removed ones.
pub fn diff_entries(old: &StateEntries, new: &StateEntries) -> WriteBatch {
    let mut batch = WriteBatch::new();
    for (key, value) in new {
        if old.get(key) != Some(value) {
            batch.put(key.clone(), value.clone());
        }
    }
    for key in old.keys() {
        if !new.contains_key(key) {
            batch.delete(key.clone());
        }
    }
    batch
}

/// Persistence for committed chain state and blocks.
///
/// Each commit (state diff, block and head pointer) lands in a single atomic
/// batch, so a restart always sees a consistent height.
pub struct StateStore<S: KvStore> {
    store: S,
}

impl<S: KvStore> StateStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Whether a committed state exists.
    pub fn has_state(&self) -> Result<bool, StorageError> {
        self.store.exists(META_CHAIN_KEY.as_bytes())
    }

    /// Load every entry covered by the state root.
    pub fn load_state_entries(&self) -> Result<StateEntries, StorageError> {
        let mut entries = StateEntries::new();
        for prefix in STATE_PREFIXES {
            entries.extend(self.store.prefix_scan(prefix.as_bytes())?);
        }
        Ok(entries)
    }

    /// Hash of the last committed block.
    pub fn load_head(&self) -> Result<Option<Hash>, StorageError> {
        match self.store.get(META_HEAD_KEY.as_bytes())? {
            Some(bytes) => Ok(Some(decode(META_HEAD_KEY.as_bytes(), &bytes)?)),
            None => Ok(None),
        }
    }

    pub fn load_block(&self, height: Height) -> Result<Option<Block>, StorageError> {
        let key = block_key(height);
        match self.store.get(&key)? {
            Some(bytes) => Ok(Some(decode(&key, &bytes)?)),
            None => Ok(None),
        }
    }

    /// Number of stored blocks.
    pub fn block_count(&self) -> Result<usize, StorageError> {
        Ok(self.store.prefix_scan(BLOCK_PREFIX.as_bytes())?.len())
    }

    /// Atomically write a state diff, the block that produced it and the new head.
    pub fn commit(
        &self,
        mut diff: WriteBatch,
        block: &Block,
        head: Hash,
    ) -> Result<(), StorageError> {
        diff.put(block_key(block.height()), encode(block)?);
        diff.put(META_HEAD_KEY.as_bytes().to_vec(), encode(&head)?);
        let ops = diff.len();
        self.store.write_batch(diff)?;
        tracing::debug!(height = block.height(), ops, "committed state batch");
        Ok(())
    }
}
