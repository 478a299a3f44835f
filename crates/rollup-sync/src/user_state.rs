//! Per-account settlement engine.
//!
//! `UserState` replays rollup blocks in order, recognises the account's notes
//! by trial decryption, tracks spends by nullifier and walks DeFi interactions
//! from deposit through result to claim. Block writes are staged and reach the
//! database in one atomic `flush`.

use std::cmp::max;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::batch::SettlementBatch;
use crate::block::DecodedBlock;
use crate::bridge::resolve_output_asset_id;
use crate::core_tx::{CoreAccountTx, CoreDefiTx, CorePaymentTx, CoreUserTx};
use crate::crypto::{NoteCrypto, ViewingKey};
use crate::database::{Database, SpendingKey, UserData, WriteOp};
use crate::error::{Result, SyncError};
use crate::note::{Note, TreeNote};
use crate::orphan::{OrphanReconciler, OrphanReport};
use crate::pending::PendingProofStore;
use crate::proof::{
    AuthoredProof, InnerProofData, OffchainAccountData, OffchainDefiDepositData, OffchainJoinSplitData, OffchainTxData,
    ProofId,
};
use crate::provider::RollupProvider;
use crate::types::{AccountPrivateKey, AccountPublicKey, Commitment, NoteSecret, Nullifier, PartialState, TxId};
use crate::world_state::WorldState;

/// What one `process_blocks` call staged.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ProcessReport {
    pub blocks: usize,
    pub synced_to_rollup: Option<u64>,
    pub notes_added: usize,
    pub notes_nullified: usize,
    pub txs_upserted: usize,
}

/// Result of a successful flush.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FlushReceipt {
    pub ops: usize,
    pub synced_to_rollup: Option<u64>,
    /// Authored proofs that settled and left the pending store.
    pub settled_proofs: usize,
}

pub struct UserState {
    user: UserData,
    private_key: AccountPrivateKey,
    crypto: Arc<dyn NoteCrypto>,
    db: Arc<dyn Database>,
    world_state: Arc<dyn WorldState>,
    provider: Arc<dyn RollupProvider>,
    batch: SettlementBatch,
    pending: PendingProofStore,
    shut_down: bool,
}

impl UserState {
    pub fn new(
        user: UserData,
        private_key: AccountPrivateKey,
        crypto: Arc<dyn NoteCrypto>,
        db: Arc<dyn Database>,
        world_state: Arc<dyn WorldState>,
        provider: Arc<dyn RollupProvider>,
    ) -> Self {
        Self {
            user,
            private_key,
            crypto,
            db,
            world_state,
            provider,
            batch: SettlementBatch::new(),
            pending: PendingProofStore::new(),
            shut_down: false,
        }
    }

    /// Load the stored cursor and drop pending state the network forgot.
    pub async fn init(&mut self) -> Result<OrphanReport> {
        if let Some(stored) = self.db.get_user(&self.user.account_public_key).await? {
            self.user = stored;
        }

        let report =
            OrphanReconciler::reconcile(&self.user.account_public_key, self.db.as_ref(), self.provider.as_ref()).await?;
        self.pending.remove_stale(&report.live_tx_ids);

        info!(
            user = %self.user.account_public_key,
            synced_to_rollup = ?self.user.synced_to_rollup,
            "user state initialised"
        );
        Ok(report)
    }

    pub fn get_user_data(&self) -> UserData {
        self.user.clone()
    }

    pub fn account_public_key(&self) -> &AccountPublicKey {
        &self.user.account_public_key
    }

    pub fn pending_proofs(&self) -> &PendingProofStore {
        &self.pending
    }

    pub fn has_unflushed_changes(&self) -> bool {
        !self.batch.is_empty()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    fn ensure_running(&self) -> Result<()> {
        if self.shut_down {
            return Err(SyncError::ShutDown);
        }
        Ok(())
    }

    /// Apply contiguous blocks to the staged batch.
    ///
    /// On error nothing from this call stays staged and the cursor is where it
    /// was before the call.
    pub async fn process_blocks(&mut self, blocks: &[DecodedBlock]) -> Result<ProcessReport> {
        self.ensure_running()?;
        self.check_sequence(blocks)?;

        let batch_snapshot = self.batch.clone();
        let user_snapshot = self.user.clone();
        let before = self.batch.counters().clone();

        for block in blocks {
            if let Err(e) = self.process_block(block).await {
                warn!(rollup_id = block.rollup_id, error = %e, "block processing failed, rolling back");
                self.batch = batch_snapshot;
                self.user = user_snapshot;
                return Err(e);
            }
        }

        let after = self.batch.counters();
        Ok(ProcessReport {
            blocks: blocks.len(),
            synced_to_rollup: self.user.synced_to_rollup,
            notes_added: after.notes_added - before.notes_added,
            notes_nullified: after.notes_nullified - before.notes_nullified,
            txs_upserted: after.txs_upserted - before.txs_upserted,
        })
    }

    fn check_sequence(&self, blocks: &[DecodedBlock]) -> Result<()> {
        if let (Some(first), Some(cursor)) = (blocks.first(), self.user.synced_to_rollup) {
            if first.rollup_id > cursor + 1 {
                return Err(SyncError::NonContiguousBlocks { expected: cursor + 1, got: first.rollup_id });
            }
        }
        for pair in blocks.windows(2) {
            let expected = pair[0].rollup_id + 1;
            if pair[1].rollup_id != expected {
                return Err(SyncError::NonContiguousBlocks { expected, got: pair[1].rollup_id });
            }
        }
        Ok(())
    }

    async fn process_block(&mut self, block: &DecodedBlock) -> Result<()> {
        block.validate()?;

        for (position, proof) in block.inner_proofs.iter().enumerate() {
            if proof.is_padding() {
                continue;
            }
            let offchain = OffchainTxData::decode(proof.proof_id, &block.offchain_tx_data[position])
                .map_err(|e| SyncError::malformed(block.rollup_id, e.to_string()))?;

            match (proof.proof_id, offchain) {
                (id, OffchainTxData::JoinSplit(data)) if id.is_payment() => {
                    self.handle_payment_tx(block, position, proof, &data).await?
                }
                (ProofId::Account, OffchainTxData::Account(data)) => {
                    self.handle_account_tx(block, position, proof, &data).await?
                }
                (ProofId::DefiDeposit, OffchainTxData::DefiDeposit(data)) => {
                    self.handle_defi_deposit(block, position, proof, &data).await?
                }
                (ProofId::DefiClaim, OffchainTxData::DefiClaim(_)) => self.handle_defi_claim(block, position, proof).await?,
                (id, _) => {
                    return Err(SyncError::malformed(
                        block.rollup_id,
                        format!("off-chain data does not match proof {id:?}"),
                    ))
                }
            }
        }

        self.apply_interaction_results(block).await?;

        let synced = self.user.synced_to_rollup.map_or(block.rollup_id, |c| max(c, block.rollup_id));
        self.user.synced_to_rollup = Some(synced);
        self.batch.update_user(self.user.clone());

        debug!(
            rollup_id = block.rollup_id,
            proofs = block.inner_proofs.len(),
            synced_to_rollup = synced,
            "processed block"
        );
        Ok(())
    }

    // ---- lookups through the staged batch ----

    async fn find_note(&self, nullifier: &Nullifier) -> Result<Option<Note>> {
        if let Some(note) = self.batch.note(nullifier) {
            return Ok(Some(note));
        }
        let mut note = self.db.get_note_by_nullifier(nullifier).await?;
        if let Some(note) = note.as_mut() {
            note.nullified |= self.batch.is_nullified(nullifier);
        }
        Ok(note)
    }

    /// The tx record authored for `tx_id`, while its proof is still pending.
    fn authored_tx(&self, tx_id: &TxId) -> Option<&CoreUserTx> {
        self.pending.get(tx_id).map(|proof| &proof.tx)
    }

    // Staged record, then stored record, then the authored one. The stored
    // record can be gone while the proof is live when orphan removal raced
    // with settlement.
    async fn find_payment_tx(&self, tx_id: &TxId) -> Result<Option<CorePaymentTx>> {
        if let Some(tx) = self.batch.payment_tx(tx_id) {
            return Ok(Some(tx.clone()));
        }
        if let Some(tx) = self.db.get_payment_tx(&self.user.account_public_key, tx_id).await? {
            return Ok(Some(tx));
        }
        Ok(match self.authored_tx(tx_id) {
            Some(CoreUserTx::Payment(tx)) => Some(tx.clone()),
            _ => None,
        })
    }

    async fn find_account_tx(&self, tx_id: &TxId) -> Result<Option<CoreAccountTx>> {
        if let Some(tx) = self.batch.account_tx(tx_id) {
            return Ok(Some(tx.clone()));
        }
        if let Some(tx) = self.db.get_account_tx(&self.user.account_public_key, tx_id).await? {
            return Ok(Some(tx));
        }
        Ok(match self.authored_tx(tx_id) {
            Some(CoreUserTx::Account(tx)) => Some(tx.clone()),
            _ => None,
        })
    }

    async fn find_defi_tx(&self, tx_id: &TxId) -> Result<Option<CoreDefiTx>> {
        if let Some(tx) = self.batch.defi_tx(tx_id) {
            return Ok(Some(tx.clone()));
        }
        if let Some(tx) = self.db.get_defi_tx(&self.user.account_public_key, tx_id).await? {
            return Ok(Some(tx));
        }
        Ok(match self.authored_tx(tx_id) {
            Some(CoreUserTx::Defi(tx)) => Some(tx.clone()),
            _ => None,
        })
    }

    /// Unclaimed DeFi records, staged versions taking precedence.
    async fn unclaimed_defi_txs(&self) -> Result<Vec<CoreDefiTx>> {
        let mut txs: Vec<CoreDefiTx> = self
            .db
            .get_unclaimed_defi_txs(&self.user.account_public_key)
            .await?
            .into_iter()
            .map(|tx| self.batch.defi_tx(&tx.tx_id).cloned().unwrap_or(tx))
            .collect();
        for staged in self.batch.defi_txs() {
            if !txs.iter().any(|tx| tx.tx_id == staged.tx_id) {
                txs.push(staged.clone());
            }
        }
        txs.retain(|tx| tx.claim_settled.is_none());
        Ok(txs)
    }

    // ---- note handling ----

    /// Decrypt a viewing key and keep the note only if it is ours and matches
    /// the published commitment.
    fn recover_note(
        &self,
        viewing_key: &ViewingKey,
        input_nullifier: &Nullifier,
        commitment: &Commitment,
    ) -> Option<TreeNote> {
        let note = self.crypto.decrypt_note(viewing_key, input_nullifier, &self.private_key)?;
        if note.owner != self.user.account_public_key {
            return None;
        }
        if self.crypto.commit_note(&note) != *commitment {
            debug!(commitment = %commitment, "decrypted note does not match its commitment");
            return None;
        }
        Some(note)
    }

    /// Stage a settled output note. Returns false when nothing was staged.
    async fn settle_note(
        &mut self,
        block: &DecodedBlock,
        position: usize,
        slot: usize,
        tree_note: TreeNote,
        commitment: Commitment,
    ) -> Result<bool> {
        if tree_note.value == 0 {
            return Ok(false);
        }
        let nullifier = self.crypto.derive_nullifier(&commitment, &self.private_key);
        if let Some(existing) = self.find_note(&nullifier).await? {
            if !existing.pending || existing.nullified {
                return Ok(false);
            }
        }

        let index = block.leaf_index(position, slot);
        let hash_path = self.world_state.get_hash_path(index).await?;
        self.batch.add_note(Note::settled(tree_note, commitment, nullifier, index, hash_path));
        Ok(true)
    }

    /// Nullify the proof inputs that are ours. Returns the value they held and
    /// whether any input was ours.
    async fn nullify_inputs(&mut self, proof: &InnerProofData) -> Result<(u128, bool)> {
        let mut destroyed = 0u128;
        let mut ours = false;
        for nullifier in [proof.nullifier1, proof.nullifier2] {
            if nullifier.is_zero() {
                continue;
            }
            let Some(note) = self.find_note(&nullifier).await? else {
                continue;
            };
            if note.owner() != &self.user.account_public_key {
                continue;
            }
            ours = true;
            destroyed += note.value();
            if !note.nullified {
                self.batch.nullify_note(nullifier);
            }
        }
        Ok((destroyed, ours))
    }

    // ---- proof kinds ----

    async fn handle_payment_tx(
        &mut self,
        block: &DecodedBlock,
        position: usize,
        proof: &InnerProofData,
        offchain: &OffchainJoinSplitData,
    ) -> Result<()> {
        let [viewing_key1, viewing_key2] = &offchain.viewing_keys;
        let note1 = self.recover_note(viewing_key1, &proof.nullifier1, &proof.note_commitment1);
        let note2 = self.recover_note(viewing_key2, &proof.nullifier2, &proof.note_commitment2);
        if note1.is_none() && note2.is_none() {
            return Ok(());
        }

        let asset_id = note1.as_ref().or(note2.as_ref()).map(|n| n.asset_id).unwrap_or(proof.public_asset_id);
        let recipient_private_output = note1.as_ref().map_or(0, |n| n.value);
        let sender_private_output = note2.as_ref().map_or(0, |n| n.value);
        let is_recipient = note1.is_some();
        let note2_ours = note2.is_some();

        if let Some(note) = note1 {
            self.settle_note(block, position, 0, note, proof.note_commitment1).await?;
        }
        if let Some(note) = note2 {
            self.settle_note(block, position, 1, note, proof.note_commitment2).await?;
        }
        let (private_input, input_ours) = self.nullify_inputs(proof).await?;

        let tx_id = proof.tx_id();
        let record = match self.find_payment_tx(&tx_id).await? {
            Some(tx) if tx.settled.is_some() => None,
            Some(tx) => Some(tx.settled_at(block.mined_at)),
            None => Some(CorePaymentTx {
                tx_id,
                user_id: self.user.account_public_key,
                proof_id: proof.proof_id,
                asset_id,
                public_value: proof.public_value,
                public_owner: (!proof.public_owner.is_zero()).then_some(proof.public_owner),
                private_input,
                recipient_private_output,
                sender_private_output,
                is_recipient,
                is_sender: note2_ours || input_ours,
                tx_ref_no: offchain.tx_ref_no,
                created: block.mined_at,
                settled: Some(block.mined_at),
            }),
        };
        if let Some(record) = record {
            self.batch.upsert_payment_tx(record);
        }
        self.batch.mark_settled(tx_id);
        Ok(())
    }

    async fn handle_account_tx(
        &mut self,
        block: &DecodedBlock,
        position: usize,
        proof: &InnerProofData,
        offchain: &OffchainAccountData,
    ) -> Result<()> {
        if offchain.account_public_key != self.user.account_public_key {
            return Ok(());
        }
        let tx_id = proof.tx_id();
        let existing = self.find_account_tx(&tx_id).await?;
        if existing.as_ref().is_some_and(|tx| tx.settled.is_some()) {
            return Ok(());
        }

        let keys = [offchain.spending_public_key1, offchain.spending_public_key2];
        for (slot, key) in keys.iter().enumerate() {
            if key.is_zero() {
                continue;
            }
            let tree_index = block.leaf_index(position, slot);
            let hash_path = self.world_state.get_hash_path(tree_index).await?;
            self.batch.add_spending_key(SpendingKey {
                user_id: self.user.account_public_key,
                key: *key,
                tree_index,
                hash_path,
            });
        }

        let create = !proof.nullifier1.is_zero();
        let migrated = !create && !proof.nullifier2.is_zero();
        let record = match existing {
            Some(tx) => tx.settled_at(block.mined_at),
            None => CoreAccountTx {
                tx_id,
                user_id: self.user.account_public_key,
                alias_hash: offchain.alias_hash,
                new_spending_public_key1: (!keys[0].is_zero()).then_some(keys[0]),
                new_spending_public_key2: (!keys[1].is_zero()).then_some(keys[1]),
                migrated,
                tx_ref_no: offchain.tx_ref_no,
                created: block.mined_at,
                settled: Some(block.mined_at),
            },
        };
        self.batch.upsert_account_tx(record);
        self.batch.mark_settled(tx_id);
        Ok(())
    }

    /// Which `account_required` flag, if any, reproduces `partial_state`.
    fn partial_state_account_required(&self, secret: &NoteSecret, partial_state: &PartialState) -> Option<bool> {
        [true, false]
            .into_iter()
            .find(|flag| self.crypto.partial_value_commitment(secret, &self.user.account_public_key, *flag) == *partial_state)
    }

    async fn handle_defi_deposit(
        &mut self,
        block: &DecodedBlock,
        position: usize,
        proof: &InnerProofData,
        offchain: &OffchainDefiDepositData,
    ) -> Result<()> {
        let change_note = self.recover_note(&offchain.viewing_key, &proof.nullifier2, &proof.note_commitment2);
        let secret = self
            .crypto
            .derive_shared_secret(&offchain.partial_state_secret_eph_pub_key, &self.private_key);
        let claim_ours = secret
            .as_ref()
            .is_some_and(|s| self.partial_state_account_required(s, &offchain.partial_state).is_some());
        if change_note.is_none() && !claim_ours {
            return Ok(());
        }

        if let Some(note) = change_note {
            self.settle_note(block, position, 1, note, proof.note_commitment2).await?;
        }
        self.nullify_inputs(proof).await?;

        let tx_id = proof.tx_id();
        let existing = self.find_defi_tx(&tx_id).await?;
        if existing.as_ref().is_some_and(|tx| tx.settled.is_some()) {
            return Ok(());
        }

        let interaction_nonce = block.interaction_nonce_for(&offchain.bridge_call_data)?;
        let claim_nullifier = self.crypto.claim_note_nullifier(&proof.note_commitment1);
        let base = existing.unwrap_or_else(|| {
            CoreDefiTx::new(
                tx_id,
                self.user.account_public_key,
                offchain.bridge_call_data,
                offchain.deposit_value,
                offchain.tx_fee,
                offchain.tx_ref_no,
                block.mined_at,
                offchain.partial_state,
                secret.unwrap_or_default(),
            )
        });

        let record = match block.interaction_result(interaction_nonce) {
            Some(event) => base
                .settled_with(block.mined_at, interaction_nonce, false, claim_nullifier)
                .finalised_with(event, block.mined_at)
                .ok_or_else(|| output_share_error(block, interaction_nonce))?,
            None => base.settled_with(block.mined_at, interaction_nonce, true, claim_nullifier),
        };
        debug!(
            tx_id = %tx_id,
            interaction_nonce,
            is_async = ?record.is_async,
            "defi deposit settled"
        );
        self.batch.upsert_defi_tx(record);
        self.batch.mark_settled(tx_id);
        Ok(())
    }

    /// Finalise async deposits from earlier blocks whose result arrived now.
    async fn apply_interaction_results(&mut self, block: &DecodedBlock) -> Result<()> {
        if block.interaction_results.is_empty() {
            return Ok(());
        }
        let open = self.unclaimed_defi_txs().await?;
        for event in &block.interaction_results {
            for tx in open.iter().filter(|tx| tx.is_awaiting_result_for(event.interaction_nonce)) {
                info!(
                    tx_id = %tx.tx_id,
                    interaction_nonce = event.interaction_nonce,
                    success = event.success,
                    "async defi interaction finalised"
                );
                let finalised = tx
                    .finalised_with(event, block.mined_at)
                    .ok_or_else(|| output_share_error(block, event.interaction_nonce))?;
                self.batch.upsert_defi_tx(finalised);
            }
        }
        Ok(())
    }

    async fn handle_defi_claim(&mut self, block: &DecodedBlock, position: usize, proof: &InnerProofData) -> Result<()> {
        let candidates = self.unclaimed_defi_txs().await?;
        let Some(tx) = candidates
            .into_iter()
            .find(|tx| tx.nullifier == Some(proof.nullifier1) || tx.nullifier == Some(proof.nullifier2))
        else {
            debug!(rollup_id = block.rollup_id, position, "claim does not match any of our deposits");
            return Ok(());
        };
        let Some(success) = tx.success else {
            warn!(tx_id = %tx.tx_id, "claim settled before its interaction result");
            return Ok(());
        };
        let Some(account_required) = self.partial_state_account_required(&tx.partial_state_secret, &tx.partial_state)
        else {
            warn!(tx_id = %tx.tx_id, "stored partial state does not belong to this account");
            return Ok(());
        };

        let bridge = &tx.bridge_call_data;
        let interaction_nonce = tx.interaction_nonce.unwrap_or_default();
        let mut outputs: Vec<(usize, u32, u128)> = Vec::with_capacity(2);
        if success {
            let value_a = tx.output_value_a.unwrap_or_default();
            let value_b = tx.output_value_b.unwrap_or_default();
            let resolve = |asset_id| {
                resolve_output_asset_id(asset_id, interaction_nonce).ok_or_else(|| {
                    SyncError::malformed(
                        block.rollup_id,
                        format!("interaction nonce {interaction_nonce} has no virtual asset id"),
                    )
                })
            };
            if value_a > 0 {
                outputs.push((0, resolve(bridge.output_asset_id_a)?, value_a));
            }
            if let Some(asset_b) = bridge.output_asset_id_b {
                if value_b > 0 {
                    outputs.push((1, resolve(asset_b)?, value_b));
                }
            }
        } else {
            outputs.push((0, bridge.input_asset_id_a, tx.deposit_value));
            if let Some(asset_b) = bridge.input_asset_id_b {
                outputs.push((1, asset_b, tx.deposit_value));
            }
        }

        for (slot, asset_id, value) in outputs {
            let tree_note = TreeNote {
                owner: self.user.account_public_key,
                value,
                asset_id,
                account_required,
                note_secret: tx.partial_state_secret,
                creator_pub_key: AccountPublicKey::ZERO,
                input_nullifier: proof.nullifier(slot),
            };
            self.settle_note(block, position, slot, tree_note, proof.commitment(slot)).await?;
        }

        info!(tx_id = %tx.tx_id, success, "defi claim settled");
        self.batch.upsert_defi_tx(tx.claimed_by(proof.tx_id(), block.mined_at));
        Ok(())
    }

    // ---- authored proofs ----

    /// Record a locally authored proof as pending, written immediately.
    pub async fn add_proof(&mut self, proof: AuthoredProof) -> Result<()> {
        self.ensure_running()?;

        let mut ops = self.pending_note_ops(&proof, false);
        if let Some(linked) = &proof.linked_proof {
            ops.extend(self.pending_note_ops(linked, true));
        }
        ops.push(match &proof.tx {
            CoreUserTx::Payment(tx) => WriteOp::UpsertPaymentTx(tx.clone()),
            CoreUserTx::Account(tx) => WriteOp::UpsertAccountTx(tx.clone()),
            CoreUserTx::Defi(tx) => WriteOp::UpsertDefiTx(tx.clone()),
        });

        self.db.apply(&ops).await?;
        info!(tx_id = %proof.tx_id(), ops = ops.len(), "added pending proof");
        self.pending.add(proof);
        Ok(())
    }

    /// Pending notes for the owned, non-zero outputs of `proof`. Outputs of a
    /// linked proof that are chained into the next proof are skipped.
    fn pending_note_ops(&self, proof: &AuthoredProof, linked: bool) -> Vec<WriteOp> {
        let mut ops = Vec::new();
        for (slot, tree_note) in proof.output_notes.iter().enumerate() {
            if tree_note.value == 0 || tree_note.owner != self.user.account_public_key {
                continue;
            }
            let chained = proof.chains_slot(slot);
            if linked && chained {
                continue;
            }
            let commitment = proof.proof_data.commitment(slot);
            let nullifier = self.crypto.derive_nullifier(&commitment, &self.private_key);
            ops.push(WriteOp::AddNote(Note::pending(tree_note.clone(), commitment, nullifier, chained)));
        }
        ops
    }

    // ---- persistence ----

    /// Write the staged batch in one database call.
    ///
    /// On failure the batch stays staged and a later flush retries it.
    pub async fn flush(&mut self) -> Result<Option<FlushReceipt>> {
        self.ensure_running()?;
        if self.batch.is_empty() {
            return Ok(None);
        }

        let ops = self.batch.write_ops();
        if let Err(e) = self.db.apply(&ops).await {
            warn!(error = %e, ops = ops.len(), "flush failed, batch kept for retry");
            return Err(e);
        }

        let settled: Vec<TxId> = self.pending.tx_ids().filter(|tx_id| self.batch.is_settled(tx_id)).copied().collect();
        for tx_id in &settled {
            self.pending.remove(tx_id);
        }
        let settled_proofs = settled.len();
        self.batch = SettlementBatch::new();

        info!(
            ops = ops.len(),
            synced_to_rollup = ?self.user.synced_to_rollup,
            settled_proofs,
            "flushed user state"
        );
        Ok(Some(FlushReceipt {
            ops: ops.len(),
            synced_to_rollup: self.user.synced_to_rollup,
            settled_proofs,
        }))
    }

    /// Optionally flush, then refuse further work.
    pub async fn shutdown(&mut self, flush: bool) -> Result<Option<FlushReceipt>> {
        if self.shut_down {
            return Ok(None);
        }
        let receipt = if flush { self.flush().await? } else { None };
        self.shut_down = true;
        info!(user = %self.user.account_public_key, "user state shut down");
        Ok(receipt)
    }
}

fn output_share_error(block: &DecodedBlock, interaction_nonce: u64) -> SyncError {
    SyncError::malformed(
        block.rollup_id,
        format!("interaction {interaction_nonce} output share does not fit in u128"),
    )
}
