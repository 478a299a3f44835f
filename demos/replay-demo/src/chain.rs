//! Scripted rollup chain served to the sync driver.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use rand::rngs::StdRng;
use rand::{thread_rng, RngCore, SeedableRng};
use rollup_sync::{
    AccountPrivateKey, AccountPublicKey, BridgeCallData, Commitment, DecodedBlock, DefiInteractionEvent, EthAddress,
    HashPath, InnerProofData, NoteCrypto, NoteSecret, Nullifier, OffchainDefiClaimData, OffchainDefiDepositData,
    OffchainJoinSplitData, OffchainTxData, PendingTx, ProofId, RollupProvider, StandardNoteCrypto, Timestamp,
    TreeClaimNote, TreeNote, ViewingKey, WorldState, NUM_BRIDGE_CALLS_PER_BLOCK,
};

const ROLLUP_SIZE: usize = 2;
const ASSET_ID: u32 = 0;
const DATA_TREE_DEPTH: usize = 32;

type Entry = (InnerProofData, OffchainTxData);

/// Builds blocks that move value in and out of one account.
pub struct ChainBuilder {
    crypto: Arc<StandardNoteCrypto>,
    user: AccountPublicKey,
    user_key: AccountPrivateKey,
    genesis: Timestamp,
    blocks: Vec<DecodedBlock>,
    data_start_index: u64,
    /// The account's unspent notes, oldest first.
    unspent: Vec<(Commitment, u128)>,
}

impl ChainBuilder {
    pub fn new(crypto: Arc<StandardNoteCrypto>, user: AccountPublicKey, user_key: AccountPrivateKey) -> Self {
        Self {
            crypto,
            user,
            user_key,
            genesis: Utc::now() - Duration::hours(1),
            blocks: Vec::new(),
            data_start_index: 0,
            unspent: Vec::new(),
        }
    }

    /// Deposits, a payment out, a DeFi round trip, then padding.
    pub fn script(&mut self, counterparty: AccountPublicKey, padding_blocks: u64) -> Result<()> {
        let user = self.user;
        let l1_owner = EthAddress::random(&mut thread_rng());

        let deposit = self.deposit(user, 100, l1_owner)?;
        self.push_block(vec![deposit], vec![], vec![])?;

        let deposit = self.deposit(user, 50, l1_owner)?;
        let noise = self.stranger_transfer()?;
        self.push_block(vec![deposit, noise], vec![], vec![])?;

        let payment = self.send(counterparty, 30)?;
        self.push_block(vec![payment], vec![], vec![])?;

        let bridge = BridgeCallData::new(1, ASSET_ID, 2);
        let (defi_deposit, claim_secret) = self.defi_deposit(bridge)?;
        let deposit_commitment = defi_deposit.0.note_commitment1;
        let deposit_rollup = self.push_block(vec![defi_deposit], vec![bridge], vec![])?;

        let interaction_nonce = deposit_rollup * NUM_BRIDGE_CALLS_PER_BLOCK;
        let result = DefiInteractionEvent {
            bridge_call_data: bridge,
            interaction_nonce,
            total_input_value: 50,
            total_output_value_a: 100,
            total_output_value_b: 0,
            success: true,
        };
        self.push_block(vec![], vec![], vec![result])?;

        let claim = self.defi_claim(bridge, deposit_commitment, claim_secret, 100)?;
        self.push_block(vec![claim], vec![], vec![])?;

        for _ in 0..padding_blocks {
            self.push_block(vec![], vec![], vec![])?;
        }
        Ok(())
    }

    pub fn into_provider(self) -> ScriptedProvider {
        ScriptedProvider {
            blocks: self.blocks.iter().map(WireBlock::from_block).collect(),
        }
    }

    fn push_block(
        &mut self,
        proofs: Vec<Entry>,
        bridge_call_datas: Vec<BridgeCallData>,
        interaction_results: Vec<DefiInteractionEvent>,
    ) -> Result<u64> {
        let rollup_id = self.blocks.len() as u64;
        let mined_at = self.genesis + Duration::seconds(rollup_id as i64 * 15);
        let mut block = DecodedBlock::new(rollup_id, mined_at, self.data_start_index)
            .with_bridge_call_datas(bridge_call_datas)
            .with_interaction_results(interaction_results);
        for (proof, offchain) in proofs {
            block.push_proof(proof, &offchain)?;
        }
        block.pad_to(ROLLUP_SIZE);

        self.data_start_index += 2 * block.inner_proofs.len() as u64;
        self.blocks.push(block);
        Ok(rollup_id)
    }

    fn note(
        &self,
        owner: &AccountPublicKey,
        value: u128,
        input_nullifier: Nullifier,
        creator: AccountPublicKey,
    ) -> Result<(TreeNote, ViewingKey)> {
        self.crypto
            .create_note(owner, value, ASSET_ID, true, input_nullifier, creator, &mut thread_rng())
            .context("note owner is not a valid account key")
    }

    #[allow(clippy::too_many_arguments)]
    fn join_split(
        &self,
        proof_id: ProofId,
        sender: AccountPublicKey,
        nullifiers: [Nullifier; 2],
        recipient: AccountPublicKey,
        outputs: (u128, u128),
        public_value: u128,
        public_owner: EthAddress,
    ) -> Result<Entry> {
        let (note1, viewing_key1) = self.note(&recipient, outputs.0, nullifiers[0], sender)?;
        let (note2, viewing_key2) = self.note(&sender, outputs.1, nullifiers[1], sender)?;
        let proof = InnerProofData {
            proof_id,
            note_commitment1: self.crypto.commit_note(&note1),
            note_commitment2: self.crypto.commit_note(&note2),
            nullifier1: nullifiers[0],
            nullifier2: nullifiers[1],
            public_value,
            public_owner,
            public_asset_id: ASSET_ID,
        };
        let offchain = OffchainTxData::JoinSplit(OffchainJoinSplitData {
            viewing_keys: [viewing_key1, viewing_key2],
            tx_ref_no: 0,
        });
        Ok((proof, offchain))
    }

    fn random_nullifiers() -> [Nullifier; 2] {
        let mut rng = thread_rng();
        [Nullifier::random(&mut rng), Nullifier::random(&mut rng)]
    }

    /// Oldest unspent note of the account and its nullifier.
    fn spend(&mut self) -> Result<(Nullifier, u128)> {
        if self.unspent.is_empty() {
            anyhow::bail!("script spends more notes than it created");
        }
        let (commitment, value) = self.unspent.remove(0);
        Ok((self.crypto.derive_nullifier(&commitment, &self.user_key), value))
    }

    fn deposit(&mut self, recipient: AccountPublicKey, value: u128, l1_owner: EthAddress) -> Result<Entry> {
        let entry = self.join_split(
            ProofId::Deposit,
            recipient,
            Self::random_nullifiers(),
            recipient,
            (value, 0),
            value,
            l1_owner,
        )?;
        if recipient == self.user {
            self.unspent.push((entry.0.note_commitment1, value));
        }
        Ok(entry)
    }

    fn send(&mut self, recipient: AccountPublicKey, value: u128) -> Result<Entry> {
        let (nullifier, input) = self.spend()?;
        let change = input.checked_sub(value).context("payment exceeds the spent note")?;
        let nullifiers = [nullifier, Nullifier::random(&mut thread_rng())];
        let entry = self.join_split(
            ProofId::Send,
            self.user,
            nullifiers,
            recipient,
            (value, change),
            0,
            EthAddress::ZERO,
        )?;
        self.unspent.push((entry.0.note_commitment2, change));
        Ok(entry)
    }

    fn stranger_transfer(&self) -> Result<Entry> {
        let mut rng = thread_rng();
        let (_, from) = self.crypto.generate_account(&mut rng);
        let (_, to) = self.crypto.generate_account(&mut rng);
        self.join_split(ProofId::Send, from, Self::random_nullifiers(), to, (12, 3), 0, EthAddress::ZERO)
    }

    /// Spend the oldest note into `bridge`. Returns the deposit and the claim
    /// note secret.
    fn defi_deposit(&mut self, bridge: BridgeCallData) -> Result<(Entry, NoteSecret)> {
        let mut rng = thread_rng();
        let (nullifier1, deposit_value) = self.spend()?;
        let nullifier2 = Nullifier::random(&mut rng);

        let (eph_key, eph_pub_key) = self.crypto.generate_account(&mut rng);
        let secret = self
            .crypto
            .derive_note_secret(&self.user, &eph_key)
            .context("account key is not a valid curve point")?;
        let partial_state = self.crypto.partial_value_commitment(&secret, &self.user, true);
        let claim_note = TreeClaimNote {
            value: deposit_value,
            bridge_call_data: bridge,
            defi_interaction_nonce: 0,
            fee: 0,
            partial_state,
            input_nullifier: nullifier1,
        };
        let (change_note, change_viewing_key) = self.note(&self.user, 0, nullifier2, self.user)?;

        let proof = InnerProofData {
            proof_id: ProofId::DefiDeposit,
            note_commitment1: self.crypto.commit_partial_claim(&claim_note),
            note_commitment2: self.crypto.commit_note(&change_note),
            nullifier1,
            nullifier2,
            public_value: 0,
            public_owner: EthAddress::ZERO,
            public_asset_id: 0,
        };
        let offchain = OffchainTxData::DefiDeposit(OffchainDefiDepositData {
            bridge_call_data: bridge,
            partial_state,
            partial_state_secret_eph_pub_key: eph_pub_key,
            deposit_value,
            tx_fee: 0,
            viewing_key: change_viewing_key,
            tx_ref_no: 0,
        });
        Ok(((proof, offchain), secret))
    }

    fn defi_claim(
        &self,
        bridge: BridgeCallData,
        deposit_commitment: Commitment,
        secret: NoteSecret,
        output_value: u128,
    ) -> Result<Entry> {
        let nullifier1 = self.crypto.claim_note_nullifier(&deposit_commitment);
        let nullifier2 = Nullifier::random(&mut thread_rng());
        let output = TreeNote {
            owner: self.user,
            value: output_value,
            asset_id: bridge.output_asset_id_a,
            account_required: true,
            note_secret: secret,
            creator_pub_key: AccountPublicKey::ZERO,
            input_nullifier: nullifier1,
        };
        let proof = InnerProofData {
            proof_id: ProofId::DefiClaim,
            note_commitment1: self.crypto.commit_note(&output),
            note_commitment2: Commitment::random(&mut thread_rng()),
            nullifier1,
            nullifier2,
            public_value: 0,
            public_owner: EthAddress::ZERO,
            public_asset_id: 0,
        };
        Ok((proof, OffchainTxData::DefiClaim(OffchainDefiClaimData)))
    }
}

/// A block as published: inner proofs still in their encoded form.
struct WireBlock {
    rollup_id: u64,
    mined_at: Timestamp,
    data_start_index: u64,
    proofs: Vec<(Vec<u8>, Vec<u8>)>,
    bridge_call_datas: Vec<BridgeCallData>,
    interaction_results: Vec<DefiInteractionEvent>,
}

impl WireBlock {
    fn from_block(block: &DecodedBlock) -> Self {
        Self {
            rollup_id: block.rollup_id,
            mined_at: block.mined_at,
            data_start_index: block.data_start_index,
            proofs: block
                .inner_proofs
                .iter()
                .map(InnerProofData::encode)
                .zip(block.offchain_tx_data.iter().cloned())
                .collect(),
            bridge_call_datas: block.bridge_call_datas.clone(),
            interaction_results: block.interaction_results.clone(),
        }
    }

    fn decode(&self) -> rollup_sync::Result<DecodedBlock> {
        let mut block = DecodedBlock::new(self.rollup_id, self.mined_at, self.data_start_index)
            .with_bridge_call_datas(self.bridge_call_datas.clone())
            .with_interaction_results(self.interaction_results.clone());
        for (encoded, offchain) in &self.proofs {
            block.push_encoded_proof(encoded, offchain.clone())?;
        }
        Ok(block)
    }
}

pub struct ScriptedProvider {
    blocks: Vec<WireBlock>,
}

#[async_trait]
impl RollupProvider for ScriptedProvider {
    async fn get_pending_txs(&self) -> rollup_sync::Result<Vec<PendingTx>> {
        Ok(Vec::new())
    }

    async fn get_blocks(&self, from: u64, take: usize) -> rollup_sync::Result<Vec<DecodedBlock>> {
        self.blocks
            .iter()
            .filter(|b| b.rollup_id >= from)
            .take(take)
            .map(WireBlock::decode)
            .collect()
    }

    async fn get_latest_rollup_id(&self) -> rollup_sync::Result<Option<u64>> {
        Ok(self.blocks.last().map(|b| b.rollup_id))
    }
}

/// Stable per-leaf paths; the demo chain has no real tree behind it.
pub struct SeededWorldState;

#[async_trait]
impl WorldState for SeededWorldState {
    async fn get_hash_path(&self, leaf_index: u64) -> rollup_sync::Result<HashPath> {
        let mut rng = StdRng::seed_from_u64(leaf_index);
        let path = (0..DATA_TREE_DEPTH)
            .map(|_| {
                let mut pair = [[0u8; 32]; 2];
                rng.fill_bytes(&mut pair[0]);
                rng.fill_bytes(&mut pair[1]);
                pair
            })
            .collect();
        Ok(HashPath(path))
    }
}
