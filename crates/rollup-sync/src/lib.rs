//! Client-side state synchronizer for a privacy rollup.
//!
//! Turns the public, encrypted block stream into one account's private view:
//! its notes, spending keys and transaction history. `UserState` does the
//! settlement work, `SyncDriver` keeps it fed, and a `Database` (for example
//! `KvDatabase`) holds the result.

mod batch;
pub mod block;
pub mod bridge;
pub mod config;
pub mod core_tx;
pub mod crypto;
pub mod database;
pub mod error;
pub mod kv_database;
pub mod note;
pub mod orphan;
pub mod pending;
pub mod proof;
pub mod provider;
pub mod sync;
pub mod types;
pub mod user_state;
pub mod world_state;

pub use block::DecodedBlock;
pub use bridge::{
    resolve_output_asset_id, BridgeCallData, DefiInteractionEvent, NUM_BRIDGE_CALLS_PER_BLOCK, VIRTUAL_ASSET_ID_FLAG,
    VIRTUAL_ASSET_ID_PLACEHOLDER,
};
pub use config::SyncOptions;
pub use core_tx::{CoreAccountTx, CoreDefiTx, CorePaymentTx, CoreUserTx, DefiTxState};
pub use crypto::{NoteCrypto, StandardNoteCrypto, ViewingKey};
pub use database::{Database, SpendingKey, UserData, WriteOp};
pub use error::{Result, SyncError};
pub use kv_database::KvDatabase;
pub use note::{Note, TreeClaimNote, TreeNote};
pub use orphan::{OrphanReconciler, OrphanReport};
pub use pending::PendingProofStore;
pub use proof::{
    AuthoredProof, InnerProofData, OffchainAccountData, OffchainDefiClaimData, OffchainDefiDepositData,
    OffchainJoinSplitData, OffchainTxData, ProofId,
};
pub use provider::{PendingTx, RollupProvider};
pub use sync::SyncDriver;
pub use types::{
    AccountPrivateKey, AccountPublicKey, AliasHash, Commitment, EthAddress, HashPath, NoteSecret, Nullifier,
    PartialState, SpendingPublicKey, Timestamp, TxId,
};
pub use user_state::{FlushReceipt, ProcessReport, UserState};
pub use world_state::WorldState;
