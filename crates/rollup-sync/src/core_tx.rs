//! Per-account transaction records.
//!
//! Records are never patched field by field: every settlement step returns a
//! new record that replaces the stored one.

use serde::{Deserialize, Serialize};

use crate::bridge::{BridgeCallData, DefiInteractionEvent};
use crate::proof::ProofId;
use crate::types::{AccountPublicKey, AliasHash, EthAddress, NoteSecret, Nullifier, PartialState, SpendingPublicKey, Timestamp, TxId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorePaymentTx {
    pub tx_id: TxId,
    pub user_id: AccountPublicKey,
    pub proof_id: ProofId,
    pub asset_id: u32,
    pub public_value: u128,
    pub public_owner: Option<EthAddress>,
    pub private_input: u128,
    pub recipient_private_output: u128,
    pub sender_private_output: u128,
    pub is_recipient: bool,
    pub is_sender: bool,
    pub tx_ref_no: u32,
    pub created: Timestamp,
    pub settled: Option<Timestamp>,
}

impl CorePaymentTx {
    pub fn settled_at(&self, settled: Timestamp) -> Self {
        Self { settled: Some(settled), ..self.clone() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreAccountTx {
    pub tx_id: TxId,
    pub user_id: AccountPublicKey,
    pub alias_hash: AliasHash,
    pub new_spending_public_key1: Option<SpendingPublicKey>,
    pub new_spending_public_key2: Option<SpendingPublicKey>,
    pub migrated: bool,
    pub tx_ref_no: u32,
    pub created: Timestamp,
    pub settled: Option<Timestamp>,
}

impl CoreAccountTx {
    pub fn settled_at(&self, settled: Timestamp) -> Self {
        Self { settled: Some(settled), ..self.clone() }
    }
}

/// Where a DeFi interaction stands from the account's point of view.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DefiTxState {
    /// Authored locally, deposit not yet in a block.
    Pending,
    /// Deposit settled, bridge result not seen yet.
    AwaitingResult,
    /// Result known, claim not yet settled.
    Finalised,
    Claimed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreDefiTx {
    pub tx_id: TxId,
    pub user_id: AccountPublicKey,
    pub bridge_call_data: BridgeCallData,
    pub deposit_value: u128,
    pub tx_fee: u128,
    pub tx_ref_no: u32,
    pub created: Timestamp,
    pub partial_state: PartialState,
    pub partial_state_secret: NoteSecret,
    /// Nullifier of the claim note; the claim proof spends it.
    pub nullifier: Option<Nullifier>,
    pub settled: Option<Timestamp>,
    pub interaction_nonce: Option<u64>,
    pub is_async: Option<bool>,
    pub success: Option<bool>,
    pub output_value_a: Option<u128>,
    pub output_value_b: Option<u128>,
    pub finalised: Option<Timestamp>,
    pub claim_settled: Option<Timestamp>,
    pub claim_tx_id: Option<TxId>,
}

impl CoreDefiTx {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tx_id: TxId,
        user_id: AccountPublicKey,
        bridge_call_data: BridgeCallData,
        deposit_value: u128,
        tx_fee: u128,
        tx_ref_no: u32,
        created: Timestamp,
        partial_state: PartialState,
        partial_state_secret: NoteSecret,
    ) -> Self {
        Self {
            tx_id,
            user_id,
            bridge_call_data,
            deposit_value,
            tx_fee,
            tx_ref_no,
            created,
            partial_state,
            partial_state_secret,
            nullifier: None,
            settled: None,
            interaction_nonce: None,
            is_async: None,
            success: None,
            output_value_a: None,
            output_value_b: None,
            finalised: None,
            claim_settled: None,
            claim_tx_id: None,
        }
    }

    pub fn state(&self) -> DefiTxState {
        if self.claim_settled.is_some() {
            DefiTxState::Claimed
        } else if self.success.is_some() {
            DefiTxState::Finalised
        } else if self.settled.is_some() {
            DefiTxState::AwaitingResult
        } else {
            DefiTxState::Pending
        }
    }

    /// Deposit seen in a block.
    pub fn settled_with(&self, settled: Timestamp, interaction_nonce: u64, is_async: bool, nullifier: Nullifier) -> Self {
        Self {
            settled: Some(settled),
            interaction_nonce: Some(interaction_nonce),
            is_async: Some(is_async),
            nullifier: Some(nullifier),
            ..self.clone()
        }
    }

    /// Bridge result seen. `settled` is left alone.
    /// `None` when the event's totals cannot yield this deposit's share.
    pub fn finalised_with(&self, event: &DefiInteractionEvent, finalised: Timestamp) -> Option<Self> {
        let (output_value_a, output_value_b) = event.output_values_for(self.deposit_value)?;
        Some(Self {
            success: Some(event.success),
            output_value_a: Some(output_value_a),
            output_value_b: Some(output_value_b),
            finalised: Some(finalised),
            ..self.clone()
        })
    }

    pub fn claimed_by(&self, claim_tx_id: TxId, claim_settled: Timestamp) -> Self {
        Self {
            claim_tx_id: Some(claim_tx_id),
            claim_settled: Some(claim_settled),
            ..self.clone()
        }
    }

    pub fn is_awaiting_result_for(&self, interaction_nonce: u64) -> bool {
        self.is_async == Some(true) && self.success.is_none() && self.interaction_nonce == Some(interaction_nonce)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoreUserTx {
    Payment(CorePaymentTx),
    Account(CoreAccountTx),
    Defi(CoreDefiTx),
}

impl CoreUserTx {
    pub fn tx_id(&self) -> TxId {
        match self {
            CoreUserTx::Payment(tx) => tx.tx_id,
            CoreUserTx::Account(tx) => tx.tx_id,
            CoreUserTx::Defi(tx) => tx.tx_id,
        }
    }

    pub fn user_id(&self) -> AccountPublicKey {
        match self {
            CoreUserTx::Payment(tx) => tx.user_id,
            CoreUserTx::Account(tx) => tx.user_id,
            CoreUserTx::Defi(tx) => tx.user_id,
        }
    }

    pub fn settled(&self) -> Option<Timestamp> {
        match self {
            CoreUserTx::Payment(tx) => tx.settled,
            CoreUserTx::Account(tx) => tx.settled,
            CoreUserTx::Defi(tx) => tx.settled,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.settled().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn defi_tx() -> CoreDefiTx {
        CoreDefiTx::new(
            TxId([1u8; 32]),
            AccountPublicKey([2u8; 32]),
            BridgeCallData::new(0, 1, 2),
            64,
            6,
            0,
            Utc::now(),
            PartialState([3u8; 32]),
            NoteSecret([4u8; 32]),
        )
    }

    #[test]
    fn defi_state_walks_forward() {
        let mined = Utc::now();
        let tx = defi_tx();
        assert_eq!(tx.state(), DefiTxState::Pending);

        let tx = tx.settled_with(mined, 7, true, Nullifier([5u8; 32]));
        assert_eq!(tx.state(), DefiTxState::AwaitingResult);
        assert!(tx.is_awaiting_result_for(7));
        assert!(!tx.is_awaiting_result_for(8));

        let event = DefiInteractionEvent {
            bridge_call_data: tx.bridge_call_data,
            interaction_nonce: 7,
            total_input_value: 320,
            total_output_value_a: 64,
            total_output_value_b: 640,
            success: true,
        };
        let later = mined + Duration::seconds(30);
        let tx = tx.finalised_with(&event, later).unwrap();
        assert_eq!(tx.state(), DefiTxState::Finalised);
        assert_eq!(tx.settled, Some(mined));
        assert_eq!(tx.finalised, Some(later));
        assert_eq!((tx.output_value_a, tx.output_value_b), (Some(12), Some(128)));
        assert!(!tx.is_awaiting_result_for(7));

        let tx = tx.claimed_by(TxId([9u8; 32]), later);
        assert_eq!(tx.state(), DefiTxState::Claimed);
    }

    #[test]
    fn transitions_leave_the_original_untouched() {
        let tx = defi_tx();
        let settled = tx.settled_with(Utc::now(), 0, false, Nullifier::ZERO);
        assert!(tx.settled.is_none());
        assert!(settled.settled.is_some());
    }
}
