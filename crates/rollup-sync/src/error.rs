use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Undecodable or internally inconsistent block data.
    #[error("Malformed block {rollup_id}: {reason}")]
    MalformedBlock { rollup_id: u64, reason: String },

    #[error("Malformed proof data: {0}")]
    MalformedProof(String),

    #[error("Blocks out of order: expected rollup {expected}, got {got}")]
    NonContiguousBlocks { expected: u64, got: u64 },

    #[error("Database error: {0}")]
    Database(String),

    #[error("World state error: {0}")]
    WorldState(String),

    #[error("Rollup provider error: {0}")]
    Provider(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("User state has been shut down")]
    ShutDown,
}

impl SyncError {
    pub fn malformed(rollup_id: u64, reason: impl Into<String>) -> Self {
        SyncError::MalformedBlock { rollup_id, reason: reason.into() }
    }
}

impl From<kvstore::KvError> for SyncError {
    fn from(e: kvstore::KvError) -> Self {
        SyncError::Database(e.to_string())
    }
}

impl From<bincode::Error> for SyncError {
    fn from(e: bincode::Error) -> Self {
        SyncError::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
