use serde::{Deserialize, Serialize};

use crate::bridge::BridgeCallData;
use crate::types::{AccountPublicKey, Commitment, HashPath, Nullifier, NoteSecret, PartialState};

/// Plaintext of a value note as committed to the data tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNote {
    pub owner: AccountPublicKey,
    pub value: u128,
    pub asset_id: u32,
    pub account_required: bool,
    pub note_secret: NoteSecret,
    pub creator_pub_key: AccountPublicKey,
    pub input_nullifier: Nullifier,
}

/// Claim note committed by a DeFi deposit; its owner is hidden inside
/// `partial_state`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeClaimNote {
    pub value: u128,
    pub bridge_call_data: BridgeCallData,
    pub defi_interaction_nonce: u64,
    pub fee: u128,
    pub partial_state: PartialState,
    pub input_nullifier: Nullifier,
}

/// A note tracked for the account.
///
/// `pending` notes were authored locally and have no hash path yet; settled
/// notes always carry one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub tree_note: TreeNote,
    pub commitment: Commitment,
    pub nullifier: Nullifier,
    pub allow_chain: bool,
    pub pending: bool,
    pub nullified: bool,
    pub index: Option<u64>,
    pub hash_path: Option<HashPath>,
}

impl Note {
    pub fn pending(tree_note: TreeNote, commitment: Commitment, nullifier: Nullifier, allow_chain: bool) -> Self {
        Self {
            tree_note,
            commitment,
            nullifier,
            allow_chain,
            pending: true,
            nullified: false,
            index: None,
            hash_path: None,
        }
    }

    pub fn settled(tree_note: TreeNote, commitment: Commitment, nullifier: Nullifier, index: u64, hash_path: HashPath) -> Self {
        Self {
            tree_note,
            commitment,
            nullifier,
            allow_chain: false,
            pending: false,
            nullified: false,
            index: Some(index),
            hash_path: Some(hash_path),
        }
    }

    pub fn owner(&self) -> &AccountPublicKey {
        &self.tree_note.owner
    }

    pub fn value(&self) -> u128 {
        self.tree_note.value
    }

    pub fn asset_id(&self) -> u32 {
        self.tree_note.asset_id
    }

    pub fn is_spendable(&self) -> bool {
        !self.pending && !self.nullified
    }
}
