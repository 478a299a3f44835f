//! Inner proof public inputs and the off-chain data published with them.

use serde::{Deserialize, Serialize};

use crate::bridge::BridgeCallData;
use crate::core_tx::CoreUserTx;
use crate::crypto::ViewingKey;
use crate::error::{Result, SyncError};
use crate::note::TreeNote;
use crate::types::{
    AccountPublicKey, AliasHash, Commitment, EthAddress, Hash32, Nullifier, PartialState, SpendingPublicKey, TxId,
};

const FIELD: usize = 32;
const TX_ID_CONTEXT: &str = "rollup-sync 2024 tx id";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ProofId {
    Padding = 0,
    Deposit = 1,
    Withdraw = 2,
    Send = 3,
    Account = 4,
    DefiDeposit = 5,
    DefiClaim = 6,
}

impl ProofId {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => ProofId::Padding,
            1 => ProofId::Deposit,
            2 => ProofId::Withdraw,
            3 => ProofId::Send,
            4 => ProofId::Account,
            5 => ProofId::DefiDeposit,
            6 => ProofId::DefiClaim,
            _ => return None,
        })
    }

    pub fn is_payment(&self) -> bool {
        matches!(self, ProofId::Deposit | ProofId::Withdraw | ProofId::Send)
    }
}

/// Public inputs of one inner proof.
///
/// Encoded as eight 32-byte big-endian fields: proof id, two output
/// commitments, two nullifiers, public value, public owner, public asset id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InnerProofData {
    pub proof_id: ProofId,
    pub note_commitment1: Commitment,
    pub note_commitment2: Commitment,
    pub nullifier1: Nullifier,
    pub nullifier2: Nullifier,
    pub public_value: u128,
    pub public_owner: EthAddress,
    pub public_asset_id: u32,
}

impl InnerProofData {
    pub const ENCODED_LEN: usize = 8 * FIELD;

    pub fn padding() -> Self {
        Self {
            proof_id: ProofId::Padding,
            note_commitment1: Commitment::ZERO,
            note_commitment2: Commitment::ZERO,
            nullifier1: Nullifier::ZERO,
            nullifier2: Nullifier::ZERO,
            public_value: 0,
            public_owner: EthAddress::ZERO,
            public_asset_id: 0,
        }
    }

    pub fn is_padding(&self) -> bool {
        self.proof_id == ProofId::Padding
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::ENCODED_LEN);
        out.extend_from_slice(&uint_field(self.proof_id as u128));
        out.extend_from_slice(self.note_commitment1.as_bytes());
        out.extend_from_slice(self.note_commitment2.as_bytes());
        out.extend_from_slice(self.nullifier1.as_bytes());
        out.extend_from_slice(self.nullifier2.as_bytes());
        out.extend_from_slice(&uint_field(self.public_value));
        out.extend_from_slice(&self.public_owner.to_field());
        out.extend_from_slice(&uint_field(self.public_asset_id as u128));
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::ENCODED_LEN {
            return Err(SyncError::MalformedProof(format!(
                "expected {} bytes, got {}",
                Self::ENCODED_LEN,
                bytes.len()
            )));
        }
        let field = |i: usize| -> Hash32 {
            let mut out = [0u8; FIELD];
            out.copy_from_slice(&bytes[i * FIELD..(i + 1) * FIELD]);
            out
        };

        let raw_id = field_to_uint(&field(0), "proof id")?;
        let proof_id = u8::try_from(raw_id)
            .ok()
            .and_then(ProofId::from_u8)
            .ok_or_else(|| SyncError::MalformedProof(format!("unknown proof id {raw_id}")))?;
        let public_asset_id = u32::try_from(field_to_uint(&field(7), "asset id")?)
            .map_err(|_| SyncError::MalformedProof("asset id out of range".into()))?;
        let owner = field(6);
        if owner[..12].iter().any(|b| *b != 0) {
            return Err(SyncError::MalformedProof("public owner is not an address".into()));
        }

        Ok(Self {
            proof_id,
            note_commitment1: Commitment(field(1)),
            note_commitment2: Commitment(field(2)),
            nullifier1: Nullifier(field(3)),
            nullifier2: Nullifier(field(4)),
            public_value: field_to_uint(&field(5), "public value")?,
            public_owner: EthAddress::from_field(&owner),
            public_asset_id,
        })
    }

    /// Hash of the encoded public inputs.
    pub fn tx_id(&self) -> TxId {
        TxId(blake3::derive_key(TX_ID_CONTEXT, &self.encode()))
    }

    pub fn commitment(&self, slot: usize) -> Commitment {
        if slot == 0 {
            self.note_commitment1
        } else {
            self.note_commitment2
        }
    }

    pub fn nullifier(&self, slot: usize) -> Nullifier {
        if slot == 0 {
            self.nullifier1
        } else {
            self.nullifier2
        }
    }
}

fn uint_field(value: u128) -> Hash32 {
    let mut out = [0u8; FIELD];
    out[16..].copy_from_slice(&value.to_be_bytes());
    out
}

fn field_to_uint(field: &Hash32, what: &str) -> Result<u128> {
    if field[..16].iter().any(|b| *b != 0) {
        return Err(SyncError::MalformedProof(format!("{what} exceeds 128 bits")));
    }
    let mut low = [0u8; 16];
    low.copy_from_slice(&field[16..]);
    Ok(u128::from_be_bytes(low))
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffchainJoinSplitData {
    pub viewing_keys: [ViewingKey; 2],
    pub tx_ref_no: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffchainAccountData {
    pub account_public_key: AccountPublicKey,
    pub alias_hash: AliasHash,
    pub spending_public_key1: SpendingPublicKey,
    pub spending_public_key2: SpendingPublicKey,
    pub tx_ref_no: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffchainDefiDepositData {
    pub bridge_call_data: BridgeCallData,
    pub partial_state: PartialState,
    pub partial_state_secret_eph_pub_key: AccountPublicKey,
    pub deposit_value: u128,
    pub tx_fee: u128,
    /// Viewing key of the change note.
    pub viewing_key: ViewingKey,
    pub tx_ref_no: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffchainDefiClaimData;

/// Off-chain blob of a proof, decoded according to its proof id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OffchainTxData {
    Padding,
    JoinSplit(OffchainJoinSplitData),
    Account(OffchainAccountData),
    DefiDeposit(OffchainDefiDepositData),
    DefiClaim(OffchainDefiClaimData),
}

impl OffchainTxData {
    pub fn decode(proof_id: ProofId, bytes: &[u8]) -> Result<Self> {
        let malformed = |e: bincode::Error| SyncError::MalformedProof(format!("{proof_id:?} offchain data: {e}"));
        Ok(match proof_id {
            ProofId::Padding => OffchainTxData::Padding,
            ProofId::Deposit | ProofId::Withdraw | ProofId::Send => {
                OffchainTxData::JoinSplit(bincode::deserialize(bytes).map_err(malformed)?)
            }
            ProofId::Account => OffchainTxData::Account(bincode::deserialize(bytes).map_err(malformed)?),
            ProofId::DefiDeposit => OffchainTxData::DefiDeposit(bincode::deserialize(bytes).map_err(malformed)?),
            ProofId::DefiClaim => OffchainTxData::DefiClaim(OffchainDefiClaimData),
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let bytes = match self {
            OffchainTxData::Padding | OffchainTxData::DefiClaim(_) => Vec::new(),
            OffchainTxData::JoinSplit(data) => bincode::serialize(data)?,
            OffchainTxData::Account(data) => bincode::serialize(data)?,
            OffchainTxData::DefiDeposit(data) => bincode::serialize(data)?,
        };
        Ok(bytes)
    }
}

/// A proof the account built locally and handed to the network.
#[derive(Clone, Debug)]
pub struct AuthoredProof {
    pub proof_data: InnerProofData,
    /// Bit 1 chains output note 1 forward, bit 2 chains output note 2.
    pub allow_chain: u8,
    pub tx: CoreUserTx,
    pub output_notes: [TreeNote; 2],
    /// Payment proof that feeds this one (chained DeFi deposits).
    pub linked_proof: Option<Box<AuthoredProof>>,
}

impl AuthoredProof {
    pub fn tx_id(&self) -> TxId {
        self.proof_data.tx_id()
    }

    pub fn chains_slot(&self, slot: usize) -> bool {
        let bit = if slot == 0 { 1 } else { 2 };
        self.allow_chain & bit != 0
    }
}
