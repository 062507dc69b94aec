use std::path::Path;

use rocksdb::{DBWithThreadMode, MultiThreaded, Options, WriteBatchWithTransaction};

use crate::error::StorageError;
use crate::traits::{BatchOp, KvPairs, KvStore, WriteBatch};

/// RocksDB-backed store for persistent nodes.
pub struct RocksDbStore {
    db: DBWithThreadMode<MultiThreaded>,
}

impl RocksDbStore {
    /// Open (or create) a database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DBWithThreadMode::<MultiThreaded>::open(&opts, path.as_ref())?;
        tracing::debug!(path = %path.as_ref().display(), "opened RocksDB store");
        Ok(Self { db })
    }
}

impl KvStore for RocksDbStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.db.get(key)?)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.db.put(key, value)?;
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        self.db.delete(key)?;
        Ok(())
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<KvPairs, StorageError> {
        let mut results = Vec::new();
        for item in self.db.prefix_iterator(prefix) {
            let (key, value) = item.map_err(|e| StorageError::ReadError {
                reason: e.to_string(),
            })?;
            if !key.starts_with(prefix) {
                break;
            }
            results.push((key.to_vec(), value.to_vec()));
        }
        Ok(results)
    }

    fn write_batch(&self, batch: WriteBatch) -> Result<(), StorageError> {
        let mut wb = WriteBatchWithTransaction::<false>::default();
        for op in batch.into_ops() {
            match op {
                BatchOp::Put { key, value } => wb.put(&key, &value),
                BatchOp::Delete { key } => wb.delete(&key),
            }
        }
        self.db.write(wb)?;
        Ok(())
    }
}
