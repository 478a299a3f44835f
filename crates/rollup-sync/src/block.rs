use serde::{Deserialize, Serialize};

use crate::bridge::{BridgeCallData, DefiInteractionEvent, NUM_BRIDGE_CALLS_PER_BLOCK};
use crate::error::{Result, SyncError};
use crate::proof::{InnerProofData, OffchainTxData};
use crate::types::Timestamp;

/// A rollup block as handed over by the block source.
///
/// `offchain_tx_data[i]` belongs to `inner_proofs[i]`; padding proofs carry an
/// empty blob.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedBlock {
    pub rollup_id: u64,
    pub mined_at: Timestamp,
    pub data_start_index: u64,
    pub inner_proofs: Vec<InnerProofData>,
    pub offchain_tx_data: Vec<Vec<u8>>,
    pub bridge_call_datas: Vec<BridgeCallData>,
    pub interaction_results: Vec<DefiInteractionEvent>,
}

impl DecodedBlock {
    pub fn new(rollup_id: u64, mined_at: Timestamp, data_start_index: u64) -> Self {
        Self {
            rollup_id,
            mined_at,
            data_start_index,
            inner_proofs: Vec::new(),
            offchain_tx_data: Vec::new(),
            bridge_call_datas: Vec::new(),
            interaction_results: Vec::new(),
        }
    }

    pub fn push_proof(&mut self, proof: InnerProofData, offchain: &OffchainTxData) -> Result<&mut Self> {
        self.offchain_tx_data.push(offchain.encode()?);
        self.inner_proofs.push(proof);
        Ok(self)
    }

    /// Append a proof received in its encoded form.
    pub fn push_encoded_proof(&mut self, encoded: &[u8], offchain: Vec<u8>) -> Result<&mut Self> {
        let proof = InnerProofData::decode(encoded)
            .map_err(|e| SyncError::malformed(self.rollup_id, format!("inner proof {}: {e}", self.inner_proofs.len())))?;
        self.inner_proofs.push(proof);
        self.offchain_tx_data.push(offchain);
        Ok(self)
    }

    /// Fill the block with padding proofs up to `rollup_size`.
    pub fn pad_to(&mut self, rollup_size: usize) -> &mut Self {
        while self.inner_proofs.len() < rollup_size {
            self.inner_proofs.push(InnerProofData::padding());
            self.offchain_tx_data.push(Vec::new());
        }
        self
    }

    pub fn with_bridge_call_datas(mut self, bridge_call_datas: Vec<BridgeCallData>) -> Self {
        self.bridge_call_datas = bridge_call_datas;
        self
    }

    pub fn with_interaction_results(mut self, results: Vec<DefiInteractionEvent>) -> Self {
        self.interaction_results = results;
        self
    }

    /// Data tree index of output `slot` of the proof at `position`.
    pub fn leaf_index(&self, position: usize, slot: usize) -> u64 {
        self.data_start_index + 2 * position as u64 + slot as u64
    }

    /// Nonce assigned to a deposit into `bridge_call_data` in this block.
    pub fn interaction_nonce_for(&self, bridge_call_data: &BridgeCallData) -> Result<u64> {
        let position = self
            .bridge_call_datas
            .iter()
            .position(|b| b == bridge_call_data)
            .ok_or_else(|| SyncError::malformed(self.rollup_id, "defi deposit into a bridge the block does not call"))?;
        Ok(self.rollup_id * NUM_BRIDGE_CALLS_PER_BLOCK + position as u64)
    }

    pub fn interaction_result(&self, interaction_nonce: u64) -> Option<&DefiInteractionEvent> {
        self.interaction_results.iter().find(|r| r.interaction_nonce == interaction_nonce)
    }

    /// Structural checks that do not need the account's keys.
    pub fn validate(&self) -> Result<()> {
        if self.offchain_tx_data.len() != self.inner_proofs.len() {
            return Err(SyncError::malformed(
                self.rollup_id,
                format!(
                    "{} proofs but {} off-chain entries",
                    self.inner_proofs.len(),
                    self.offchain_tx_data.len()
                ),
            ));
        }
        if self.bridge_call_datas.len() as u64 > NUM_BRIDGE_CALLS_PER_BLOCK {
            return Err(SyncError::malformed(self.rollup_id, "too many bridge calls"));
        }
        Ok(())
    }
}
