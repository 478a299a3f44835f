//! Block source seam

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::block::DecodedBlock;
use crate::error::Result;
use crate::types::{Commitment, TxId};

/// A tx the network still considers pending.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTx {
    pub tx_id: TxId,
    pub note_commitment1: Commitment,
    pub note_commitment2: Commitment,
}

#[async_trait]
pub trait RollupProvider: Send + Sync {
    async fn get_pending_txs(&self) -> Result<Vec<PendingTx>>;

    /// Up to `take` blocks starting at `from`, in rollup id order.
    async fn get_blocks(&self, from: u64, take: usize) -> Result<Vec<DecodedBlock>>;

    async fn get_latest_rollup_id(&self) -> Result<Option<u64>>;
}
