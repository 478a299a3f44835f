//! Startup cleanup of locally pending state the network never accepted.

use std::collections::HashSet;

use tracing::info;

use crate::database::{Database, WriteOp};
use crate::error::Result;
use crate::provider::RollupProvider;
use crate::types::{AccountPublicKey, Commitment, Nullifier, TxId};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OrphanReport {
    pub removed_txs: Vec<TxId>,
    pub removed_notes: Vec<Nullifier>,
    /// Tx ids the provider still reports as pending.
    pub live_tx_ids: HashSet<TxId>,
}

impl OrphanReport {
    pub fn is_empty(&self) -> bool {
        self.removed_txs.is_empty() && self.removed_notes.is_empty()
    }
}

pub struct OrphanReconciler;

impl OrphanReconciler {
    /// Remove pending txs and notes the provider no longer knows about.
    ///
    /// A tx that settles between the two reads looks orphaned and is removed;
    /// replaying its block restores it.
    pub async fn reconcile(
        user_id: &AccountPublicKey,
        db: &dyn Database,
        provider: &dyn RollupProvider,
    ) -> Result<OrphanReport> {
        let pending_txs = db.get_pending_user_txs(user_id).await?;
        let pending_notes = db.get_pending_notes(user_id).await?;
        let provider_txs = provider.get_pending_txs().await?;

        let live_tx_ids: HashSet<TxId> = provider_txs.iter().map(|tx| tx.tx_id).collect();
        let live_commitments: HashSet<Commitment> = provider_txs
            .iter()
            .flat_map(|tx| [tx.note_commitment1, tx.note_commitment2])
            .collect();

        let removed_txs: Vec<TxId> = pending_txs
            .iter()
            .map(|tx| tx.tx_id())
            .filter(|tx_id| !live_tx_ids.contains(tx_id))
            .collect();
        let removed_notes: Vec<Nullifier> = pending_notes
            .iter()
            .filter(|note| !live_commitments.contains(&note.commitment))
            .map(|note| note.nullifier)
            .collect();

        let ops: Vec<WriteOp> = removed_txs
            .iter()
            .map(|tx_id| WriteOp::RemoveUserTx { user_id: *user_id, tx_id: *tx_id })
            .chain(removed_notes.iter().map(|n| WriteOp::RemoveNote(*n)))
            .collect();

        if !ops.is_empty() {
            db.apply(&ops).await?;
            info!(
                user = %user_id,
                txs = removed_txs.len(),
                notes = removed_notes.len(),
                "removed orphaned pending state"
            );
        }

        Ok(OrphanReport { removed_txs, removed_notes, live_tx_ids })
    }
}
