use crate::Hash32;
use ed25519_dalek::{Signature, Verifier as _, VerifyingKey};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CommitEvent {
    pub sequence: u64,
    pub batch_hash: Hash32,
    pub op_count: u32,
    pub prev_event_hash: Hash32,
    pub timestamp: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogEntry {
    pub event_hash: Hash32,
    pub event: CommitEvent,
    pub signature: Vec<u8>, // signature over event bytes
}

#[derive(Default)]
pub struct EventLog {
    pub entries: Vec<LogEntry>,
}

impl EventLog {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn append(&mut self, entry: LogEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn latest_hash(&self) -> Hash32 {
        self.entries.last().map(|e| e.event_hash).unwrap_or([0u8; 32])
    }

    pub fn verify_chain_and_sigs(&self, vk: &VerifyingKey) -> bool {
        let mut prev = [0u8; 32];

        for (i, e) in self.entries.iter().enumerate() {
            if e.event.prev_event_hash != prev || e.event.sequence != i as u64 {
                return false;
            }

            let event_bytes = match bincode::serialize(&e.event) {
                Ok(b) => b,
                Err(_) => return false,
            };
            let computed: Hash32 = blake3::hash(&event_bytes).into();
            if computed != e.event_hash {
                return false;
            }

            let sig = match Signature::from_slice(&e.signature) {
                Ok(s) => s,
                Err(_) => return false,
            };
            if vk.verify(&event_bytes, &sig).is_err() {
                return false;
            }

            prev = e.event_hash;
        }

        true
    }
}
