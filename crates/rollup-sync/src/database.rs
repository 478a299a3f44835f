//! Durable per-account state
//!
//! Writes go through `apply`, which must make every op of one call visible
//! together or not at all. Ops are applied in order and later ops observe the
//! effects of earlier ones in the same call.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core_tx::{CoreAccountTx, CoreDefiTx, CorePaymentTx, CoreUserTx};
use crate::error::Result;
use crate::note::Note;
use crate::types::{AccountPublicKey, Commitment, HashPath, Nullifier, SpendingPublicKey, TxId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserData {
    pub account_public_key: AccountPublicKey,
    /// Highest rollup id applied; `None` until the first block.
    pub synced_to_rollup: Option<u64>,
}

impl UserData {
    pub fn new(account_public_key: AccountPublicKey) -> Self {
        Self { account_public_key, synced_to_rollup: None }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendingKey {
    pub user_id: AccountPublicKey,
    pub key: SpendingPublicKey,
    pub tree_index: u64,
    pub hash_path: HashPath,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WriteOp {
    /// Insert or replace the note with this commitment.
    AddNote(Note),
    /// Mark spent. Unknown nullifiers are ignored.
    NullifyNote(Nullifier),
    /// Drop the note entirely.
    RemoveNote(Nullifier),
    UpsertPaymentTx(CorePaymentTx),
    UpsertAccountTx(CoreAccountTx),
    UpsertDefiTx(CoreDefiTx),
    AddSpendingKey(SpendingKey),
    UpdateUser(UserData),
    RemoveUserTx { user_id: AccountPublicKey, tx_id: TxId },
}

#[async_trait]
pub trait Database: Send + Sync {
    async fn get_user(&self, user_id: &AccountPublicKey) -> Result<Option<UserData>>;

    async fn get_note(&self, commitment: &Commitment) -> Result<Option<Note>>;

    async fn get_note_by_nullifier(&self, nullifier: &Nullifier) -> Result<Option<Note>>;

    /// Notes owned by the account that are not nullified, pending included.
    async fn get_notes(&self, user_id: &AccountPublicKey) -> Result<Vec<Note>>;

    async fn get_pending_notes(&self, user_id: &AccountPublicKey) -> Result<Vec<Note>>;

    async fn get_payment_tx(&self, user_id: &AccountPublicKey, tx_id: &TxId) -> Result<Option<CorePaymentTx>>;

    async fn get_account_tx(&self, user_id: &AccountPublicKey, tx_id: &TxId) -> Result<Option<CoreAccountTx>>;

    async fn get_defi_tx(&self, user_id: &AccountPublicKey, tx_id: &TxId) -> Result<Option<CoreDefiTx>>;

    async fn get_pending_user_txs(&self, user_id: &AccountPublicKey) -> Result<Vec<CoreUserTx>>;

    /// DeFi records whose claim has not settled.
    async fn get_unclaimed_defi_txs(&self, user_id: &AccountPublicKey) -> Result<Vec<CoreDefiTx>>;

    async fn get_spending_keys(&self, user_id: &AccountPublicKey) -> Result<Vec<SpendingKey>>;

    async fn get_user_txs(&self, user_id: &AccountPublicKey) -> Result<Vec<CoreUserTx>>;

    async fn apply(&self, ops: &[WriteOp]) -> Result<()>;
}
