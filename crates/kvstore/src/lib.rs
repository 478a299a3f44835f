//! Atomic key/value store with a signed commit log
//!
//! Every commit applies a whole `WriteBatch` to the backing storage in one
//! step and appends a hash-chained, ed25519-signed event describing it.
//!
//! The commit log lives in memory and covers one `KvStore` session. Only the
//! key/value data is persisted by the storage backend; a reopened store starts
//! a fresh log, signed by a fresh key unless one is passed to `with_key`.

mod crypto;
mod events;
mod storage;
mod types;

pub use events::{CommitEvent, LogEntry};
pub use storage::{FileBackedStorage, InMemoryStorage, Storage};
pub use types::{BatchOp, BatchReceipt, Checkpoint, Hash32, WriteBatch};

use ed25519_dalek::{Signer as _, SigningKey, VerifyingKey};
use events::EventLog;
use rand_core::OsRng;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, KvError>;

pub struct KvStore<S: Storage> {
    storage: S,
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
    event_log: EventLog,
}

impl<S: Storage> KvStore<S> {
    /// Open a store with a fresh signing key and an empty commit log.
    pub fn new(storage: S) -> Self {
        Self::with_key(storage, SigningKey::generate(&mut OsRng))
    }

    /// Create with a specific signing key (for testing/recovery)
    pub fn with_key(storage: S, signing_key: SigningKey) -> Self {
        let verifying_key = signing_key.verifying_key();
        Self {
            storage,
            signing_key,
            verifying_key,
            event_log: EventLog::new(),
        }
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.storage.get(key)
    }

    pub fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        self.storage.scan_prefix(prefix)
    }

    /// Apply a batch atomically and log it.
    ///
    /// Nothing is logged when the storage rejects the batch.
    pub fn commit(&mut self, batch: &WriteBatch) -> Result<BatchReceipt> {
        let ops = batch.ops();
        let batch_hash = crypto::hash_batch(ops);

        self.storage.apply(ops)?;

        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();

        let event = CommitEvent {
            sequence: self.event_log.len() as u64,
            batch_hash,
            op_count: ops.len() as u32,
            prev_event_hash: self.event_log.latest_hash(),
            timestamp,
        };

        let event_bytes = bincode::serialize(&event).map_err(|e| KvError::Serialization(e.to_string()))?;
        let event_hash: Hash32 = blake3::hash(&event_bytes).into();
        let signature = self.signing_key.sign(&event_bytes).to_bytes().to_vec();

        self.event_log.append(LogEntry {
            event_hash,
            event: event.clone(),
            signature: signature.clone(),
        });

        Ok(BatchReceipt {
            sequence: event.sequence,
            batch_hash,
            latest_event_hash: event_hash,
            signature,
            op_count: event.op_count,
        })
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            commits: self.event_log.len() as u64,
            latest_event_hash: self.event_log.latest_hash(),
        }
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.verifying_key
    }

    pub fn commit_log(&self) -> &[LogEntry] {
        &self.event_log.entries
    }

    pub fn verify_commit_log(&self, vk: &VerifyingKey) -> bool {
        self.event_log.verify_chain_and_sigs(vk)
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    #[doc(hidden)]
    pub fn tamper_last_signature_for_test(&mut self) {
        if let Some(last) = self.event_log.entries.last_mut() {
            if !last.signature.is_empty() {
                last.signature[0] ^= 0x01;
            }
        }
    }
}
