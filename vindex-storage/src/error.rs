use thiserror::Error;

/// Storage failures. Any of these halts block production.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("read error: {reason}")]
    ReadError { reason: String },

    #[error("write error: {reason}")]
    WriteError { reason: String },

    #[error("RocksDB error: {reason}")]
    RocksDbError { reason: String },

    #[error("serialization error: {reason}")]
    SerializationError { reason: String },

    #[error("deserialization error for key {key}: {reason}")]
    DeserializationError { key: String, reason: String },

    #[error("corrupt key: {key}")]
    CorruptKey { key: String },
}

impl From<rocksdb::Error> for StorageError {
    fn from(err: rocksdb::Error) -> Self {
        StorageError::RocksDbError {
            reason: err.into_string(),
        }
    }
}
