//! `Database` over the signed key/value store.
//!
//! Every `apply` call becomes exactly one `KvStore::commit`, so a flush lands
//! as a single signed commit event.

use std::collections::BTreeMap;

use async_trait::async_trait;
use kvstore::{BatchReceipt, Checkpoint, KvStore, Storage, WriteBatch};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;

use crate::core_tx::{CoreAccountTx, CoreDefiTx, CorePaymentTx, CoreUserTx};
use crate::database::{Database, SpendingKey, UserData, WriteOp};
use crate::error::Result;
use crate::note::Note;
use crate::types::{AccountPublicKey, Commitment, Nullifier, TxId};

fn user_key(user_id: &AccountPublicKey) -> String {
    format!("user:{}", hex::encode(user_id.0))
}

fn note_key(commitment: &Commitment) -> String {
    format!("note:{}", hex::encode(commitment.0))
}

fn nullifier_key(nullifier: &Nullifier) -> String {
    format!("nullifier:{}", hex::encode(nullifier.0))
}

fn tx_prefix(user_id: &AccountPublicKey) -> String {
    format!("tx:{}:", hex::encode(user_id.0))
}

fn tx_key(user_id: &AccountPublicKey, tx_id: &TxId) -> String {
    format!("{}{}", tx_prefix(user_id), hex::encode(tx_id.0))
}

fn skey_prefix(user_id: &AccountPublicKey) -> String {
    format!("skey:{}:", hex::encode(user_id.0))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(bincode::deserialize(bytes)?)
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(bincode::serialize(value)?)
}

pub struct KvDatabase<S: Storage> {
    store: RwLock<KvStore<S>>,
    last_receipt: RwLock<Option<BatchReceipt>>,
}

impl<S: Storage> KvDatabase<S> {
    pub fn new(store: KvStore<S>) -> Self {
        Self {
            store: RwLock::new(store),
            last_receipt: RwLock::new(None),
        }
    }

    pub fn with_storage(storage: S) -> Self {
        Self::new(KvStore::new(storage))
    }

    pub async fn last_receipt(&self) -> Option<BatchReceipt> {
        self.last_receipt.read().await.clone()
    }

    pub async fn checkpoint(&self) -> Checkpoint {
        self.store.read().await.checkpoint()
    }

    /// Check the hash chain and signatures of every commit made so far.
    pub async fn verify_commit_log(&self) -> bool {
        let store = self.store.read().await;
        store.verify_commit_log(&store.verifying_key())
    }

    async fn get_value<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let store = self.store.read().await;
        store.get(key.as_bytes())?.map(|bytes| decode(&bytes)).transpose()
    }

    async fn scan<T: DeserializeOwned>(&self, prefix: &str) -> Result<Vec<T>> {
        let store = self.store.read().await;
        store
            .scan_prefix(prefix.as_bytes())?
            .into_iter()
            .map(|(_, bytes)| decode(&bytes))
            .collect()
    }

    async fn user_notes(&self, user_id: &AccountPublicKey) -> Result<Vec<Note>> {
        let notes: Vec<Note> = self.scan("note:").await?;
        Ok(notes.into_iter().filter(|n| n.owner() == user_id).collect())
    }

    async fn user_tx(&self, user_id: &AccountPublicKey, tx_id: &TxId) -> Result<Option<CoreUserTx>> {
        self.get_value(&tx_key(user_id, tx_id)).await
    }
}

/// Pending writes of one `apply` call layered over the committed state.
struct Staged<'a, S: Storage> {
    store: &'a KvStore<S>,
    overlay: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
    batch: WriteBatch,
}

impl<'a, S: Storage> Staged<'a, S> {
    fn new(store: &'a KvStore<S>) -> Self {
        Self {
            store,
            overlay: BTreeMap::new(),
            batch: WriteBatch::new(),
        }
    }

    fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let bytes = match self.overlay.get(key.as_bytes()) {
            Some(staged) => staged.clone(),
            None => self.store.get(key.as_bytes())?,
        };
        bytes.map(|b| decode(&b)).transpose()
    }

    fn put<T: Serialize>(&mut self, key: String, value: &T) -> Result<()> {
        let bytes = encode(value)?;
        self.overlay.insert(key.clone().into_bytes(), Some(bytes.clone()));
        self.batch.put(key, bytes);
        Ok(())
    }

    fn delete(&mut self, key: String) {
        self.overlay.insert(key.clone().into_bytes(), None);
        self.batch.delete(key);
    }

    fn note_by_nullifier(&self, nullifier: &Nullifier) -> Result<Option<Note>> {
        match self.get::<Commitment>(&nullifier_key(nullifier))? {
            Some(commitment) => self.get(&note_key(&commitment)),
            None => Ok(None),
        }
    }

    fn stage(&mut self, op: &WriteOp) -> Result<()> {
        match op {
            WriteOp::AddNote(note) => {
                self.put(note_key(&note.commitment), note)?;
                self.put(nullifier_key(&note.nullifier), &note.commitment)?;
            }
            WriteOp::NullifyNote(nullifier) => {
                if let Some(mut note) = self.note_by_nullifier(nullifier)? {
                    note.nullified = true;
                    self.put(note_key(&note.commitment), &note)?;
                }
            }
            WriteOp::RemoveNote(nullifier) => {
                if let Some(note) = self.note_by_nullifier(nullifier)? {
                    self.delete(note_key(&note.commitment));
                }
                self.delete(nullifier_key(nullifier));
            }
            WriteOp::UpsertPaymentTx(tx) => {
                self.put(tx_key(&tx.user_id, &tx.tx_id), &CoreUserTx::Payment(tx.clone()))?;
            }
            WriteOp::UpsertAccountTx(tx) => {
                self.put(tx_key(&tx.user_id, &tx.tx_id), &CoreUserTx::Account(tx.clone()))?;
            }
            WriteOp::UpsertDefiTx(tx) => {
                self.put(tx_key(&tx.user_id, &tx.tx_id), &CoreUserTx::Defi(tx.clone()))?;
            }
            WriteOp::AddSpendingKey(key) => {
                let storage_key = format!("{}{}", skey_prefix(&key.user_id), hex::encode(key.key.0));
                self.put(storage_key, key)?;
            }
            WriteOp::UpdateUser(user) => {
                self.put(user_key(&user.account_public_key), user)?;
            }
            WriteOp::RemoveUserTx { user_id, tx_id } => {
                self.delete(tx_key(user_id, tx_id));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<S: Storage> Database for KvDatabase<S> {
    async fn get_user(&self, user_id: &AccountPublicKey) -> Result<Option<UserData>> {
        self.get_value(&user_key(user_id)).await
    }

    async fn get_note(&self, commitment: &Commitment) -> Result<Option<Note>> {
        self.get_value(&note_key(commitment)).await
    }

    async fn get_note_by_nullifier(&self, nullifier: &Nullifier) -> Result<Option<Note>> {
        match self.get_value::<Commitment>(&nullifier_key(nullifier)).await? {
            Some(commitment) => self.get_note(&commitment).await,
            None => Ok(None),
        }
    }

    async fn get_notes(&self, user_id: &AccountPublicKey) -> Result<Vec<Note>> {
        let notes = self.user_notes(user_id).await?;
        Ok(notes.into_iter().filter(|n| !n.nullified).collect())
    }

    async fn get_pending_notes(&self, user_id: &AccountPublicKey) -> Result<Vec<Note>> {
        let notes = self.user_notes(user_id).await?;
        Ok(notes.into_iter().filter(|n| n.pending && !n.nullified).collect())
    }

    async fn get_payment_tx(&self, user_id: &AccountPublicKey, tx_id: &TxId) -> Result<Option<CorePaymentTx>> {
        Ok(match self.user_tx(user_id, tx_id).await? {
            Some(CoreUserTx::Payment(tx)) => Some(tx),
            _ => None,
        })
    }

    async fn get_account_tx(&self, user_id: &AccountPublicKey, tx_id: &TxId) -> Result<Option<CoreAccountTx>> {
        Ok(match self.user_tx(user_id, tx_id).await? {
            Some(CoreUserTx::Account(tx)) => Some(tx),
            _ => None,
        })
    }

    async fn get_defi_tx(&self, user_id: &AccountPublicKey, tx_id: &TxId) -> Result<Option<CoreDefiTx>> {
        Ok(match self.user_tx(user_id, tx_id).await? {
            Some(CoreUserTx::Defi(tx)) => Some(tx),
            _ => None,
        })
    }

    async fn get_pending_user_txs(&self, user_id: &AccountPublicKey) -> Result<Vec<CoreUserTx>> {
        let txs = self.get_user_txs(user_id).await?;
        Ok(txs.into_iter().filter(CoreUserTx::is_pending).collect())
    }

    async fn get_unclaimed_defi_txs(&self, user_id: &AccountPublicKey) -> Result<Vec<CoreDefiTx>> {
        let txs = self.get_user_txs(user_id).await?;
        Ok(txs
            .into_iter()
            .filter_map(|tx| match tx {
                CoreUserTx::Defi(tx) if tx.claim_settled.is_none() => Some(tx),
                _ => None,
            })
            .collect())
    }

    async fn get_spending_keys(&self, user_id: &AccountPublicKey) -> Result<Vec<SpendingKey>> {
        self.scan(&skey_prefix(user_id)).await
    }

    async fn get_user_txs(&self, user_id: &AccountPublicKey) -> Result<Vec<CoreUserTx>> {
        self.scan(&tx_prefix(user_id)).await
    }

    async fn apply(&self, ops: &[WriteOp]) -> Result<()> {
        if ops.is_empty() {
            return Ok(());
        }
        let mut store = self.store.write().await;

        let batch = {
            let mut staged = Staged::new(&store);
            for op in ops {
                staged.stage(op)?;
            }
            staged.batch
        };

        let receipt = store.commit(&batch)?;
        debug!(sequence = receipt.sequence, ops = ops.len(), kv_ops = receipt.op_count, "committed write batch");
        *self.last_receipt.write().await = Some(receipt);
        Ok(())
    }
}
