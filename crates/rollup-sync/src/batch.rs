//! Uncommitted settlement writes plus the views the engine reads back.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::core_tx::{CoreAccountTx, CoreDefiTx, CorePaymentTx};
use crate::database::{SpendingKey, UserData, WriteOp};
use crate::note::Note;
use crate::types::{Nullifier, TxId};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct BatchCounters {
    pub notes_added: usize,
    pub notes_nullified: usize,
    pub txs_upserted: usize,
}

/// Writes staged by `process_blocks` until the next flush.
///
/// Cloned as a snapshot before every call so a failed call can be undone.
#[derive(Clone, Debug, Default)]
pub(crate) struct SettlementBatch {
    ops: Vec<WriteOp>,
    user: Option<UserData>,
    notes: HashMap<Nullifier, Note>,
    nullified: HashSet<Nullifier>,
    payment_txs: HashMap<TxId, CorePaymentTx>,
    account_txs: HashMap<TxId, CoreAccountTx>,
    defi_txs: BTreeMap<TxId, CoreDefiTx>,
    settled_proofs: HashSet<TxId>,
    counters: BatchCounters,
}

impl SettlementBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_note(&mut self, note: Note) {
        self.notes.insert(note.nullifier, note.clone());
        self.ops.push(WriteOp::AddNote(note));
        self.counters.notes_added += 1;
    }

    pub fn nullify_note(&mut self, nullifier: Nullifier) {
        if self.nullified.insert(nullifier) {
            self.ops.push(WriteOp::NullifyNote(nullifier));
            self.counters.notes_nullified += 1;
        }
    }

    pub fn upsert_payment_tx(&mut self, tx: CorePaymentTx) {
        self.payment_txs.insert(tx.tx_id, tx.clone());
        self.ops.push(WriteOp::UpsertPaymentTx(tx));
        self.counters.txs_upserted += 1;
    }

    pub fn upsert_account_tx(&mut self, tx: CoreAccountTx) {
        self.account_txs.insert(tx.tx_id, tx.clone());
        self.ops.push(WriteOp::UpsertAccountTx(tx));
        self.counters.txs_upserted += 1;
    }

    pub fn upsert_defi_tx(&mut self, tx: CoreDefiTx) {
        self.defi_txs.insert(tx.tx_id, tx.clone());
        self.ops.push(WriteOp::UpsertDefiTx(tx));
        self.counters.txs_upserted += 1;
    }

    pub fn add_spending_key(&mut self, key: SpendingKey) {
        self.ops.push(WriteOp::AddSpendingKey(key));
    }

    /// Only the latest cursor is written.
    pub fn update_user(&mut self, user: UserData) {
        self.user = Some(user);
    }

    pub fn mark_settled(&mut self, tx_id: TxId) {
        self.settled_proofs.insert(tx_id);
    }

    /// Staged note for `nullifier`, with staged nullification applied.
    pub fn note(&self, nullifier: &Nullifier) -> Option<Note> {
        self.notes.get(nullifier).map(|note| {
            let mut note = note.clone();
            note.nullified |= self.nullified.contains(nullifier);
            note
        })
    }

    pub fn is_nullified(&self, nullifier: &Nullifier) -> bool {
        self.nullified.contains(nullifier)
    }

    pub fn payment_tx(&self, tx_id: &TxId) -> Option<&CorePaymentTx> {
        self.payment_txs.get(tx_id)
    }

    pub fn account_tx(&self, tx_id: &TxId) -> Option<&CoreAccountTx> {
        self.account_txs.get(tx_id)
    }

    pub fn defi_tx(&self, tx_id: &TxId) -> Option<&CoreDefiTx> {
        self.defi_txs.get(tx_id)
    }

    pub fn defi_txs(&self) -> impl Iterator<Item = &CoreDefiTx> {
        self.defi_txs.values()
    }

    pub fn is_settled(&self, tx_id: &TxId) -> bool {
        self.settled_proofs.contains(tx_id)
    }

    pub fn counters(&self) -> &BatchCounters {
        &self.counters
    }

    /// Everything that goes into one database write, cursor last.
    pub fn write_ops(&self) -> Vec<WriteOp> {
        let mut ops = self.ops.clone();
        if let Some(user) = &self.user {
            ops.push(WriteOp::UpdateUser(user.clone()));
        }
        ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty() && self.user.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AccountPublicKey;

    #[test]
    fn nullifying_twice_stages_one_op() {
        let mut batch = SettlementBatch::new();
        batch.nullify_note(Nullifier([1u8; 32]));
        batch.nullify_note(Nullifier([1u8; 32]));
        assert_eq!(batch.write_ops().len(), 1);
        assert_eq!(batch.counters().notes_nullified, 1);
    }

    #[test]
    fn cursor_update_goes_last_and_only_once() {
        let mut batch = SettlementBatch::new();
        let user = AccountPublicKey([7u8; 32]);
        batch.update_user(UserData { account_public_key: user, synced_to_rollup: Some(1) });
        batch.nullify_note(Nullifier([2u8; 32]));
        batch.update_user(UserData { account_public_key: user, synced_to_rollup: Some(2) });

        let ops = batch.write_ops();
        assert_eq!(ops.len(), 2);
        assert_eq!(
            ops.last(),
            Some(&WriteOp::UpdateUser(UserData { account_public_key: user, synced_to_rollup: Some(2) }))
        );
    }

    #[test]
    fn empty_batch_is_empty() {
        assert!(SettlementBatch::new().is_empty());
    }
}
