use std::collections::{HashMap, HashSet};

use crate::proof::AuthoredProof;
use crate::types::TxId;

/// Proofs authored by the account that have not shown up in a block yet.
#[derive(Debug, Default)]
pub struct PendingProofStore {
    proofs: HashMap<TxId, AuthoredProof>,
}

impl PendingProofStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the proof previously stored under the same tx id, if any.
    pub fn add(&mut self, proof: AuthoredProof) -> Option<AuthoredProof> {
        self.proofs.insert(proof.tx_id(), proof)
    }

    pub fn get(&self, tx_id: &TxId) -> Option<&AuthoredProof> {
        self.proofs.get(tx_id)
    }

    pub fn contains(&self, tx_id: &TxId) -> bool {
        self.proofs.contains_key(tx_id)
    }

    pub fn remove(&mut self, tx_id: &TxId) -> Option<AuthoredProof> {
        self.proofs.remove(tx_id)
    }

    /// Drop every proof whose tx id is not in `live`. Returns how many went.
    pub fn remove_stale(&mut self, live: &HashSet<TxId>) -> usize {
        let before = self.proofs.len();
        self.proofs.retain(|tx_id, _| live.contains(tx_id));
        before - self.proofs.len()
    }

    pub fn len(&self) -> usize {
        self.proofs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proofs.is_empty()
    }

    pub fn tx_ids(&self) -> impl Iterator<Item = &TxId> {
        self.proofs.keys()
    }
}
