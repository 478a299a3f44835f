#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use kvstore::InMemoryStorage;
use rand::RngCore;
use rollup_sync::*;

pub fn mined_at(rollup_id: u64) -> Timestamp {
    Utc.timestamp_opt(1_700_000_000 + rollup_id as i64 * 15, 0).single().unwrap()
}

pub fn random_hash_path(depth: usize) -> HashPath {
    let mut rng = rand::thread_rng();
    HashPath(
        (0..depth)
            .map(|_| {
                let mut left = [0u8; 32];
                let mut right = [0u8; 32];
                rng.fill_bytes(&mut left);
                rng.fill_bytes(&mut right);
                [left, right]
            })
            .collect(),
    )
}

#[derive(Clone, Debug)]
pub struct Account {
    pub private_key: AccountPrivateKey,
    pub public_key: AccountPublicKey,
}

pub fn create_account() -> Account {
    let (private_key, public_key) = StandardNoteCrypto::new().generate_account(&mut rand::thread_rng());
    Account { private_key, public_key }
}

// ---- collaborators ----

/// Hands out random hash paths and remembers the last one per leaf.
#[derive(Default)]
pub struct RecordingWorldState {
    paths: Mutex<BTreeMap<u64, HashPath>>,
}

impl RecordingWorldState {
    pub fn path(&self, leaf_index: u64) -> HashPath {
        self.paths.lock().unwrap().get(&leaf_index).cloned().expect("no hash path generated for leaf")
    }

    pub fn requested(&self) -> Vec<u64> {
        self.paths.lock().unwrap().keys().copied().collect()
    }
}

#[async_trait]
impl WorldState for RecordingWorldState {
    async fn get_hash_path(&self, leaf_index: u64) -> Result<HashPath> {
        let path = random_hash_path(11);
        self.paths.lock().unwrap().insert(leaf_index, path.clone());
        Ok(path)
    }
}

#[derive(Default)]
pub struct MemoryProvider {
    pub pending: Mutex<Vec<PendingTx>>,
    pub blocks: Mutex<Vec<DecodedBlock>>,
    block_fetches: AtomicUsize,
}

impl MemoryProvider {
    /// How many `get_blocks` calls were served.
    pub fn block_fetches(&self) -> usize {
        self.block_fetches.load(Ordering::SeqCst)
    }

    pub fn set_pending(&self, txs: Vec<PendingTx>) {
        *self.pending.lock().unwrap() = txs;
    }

    pub fn push_block(&self, block: DecodedBlock) {
        self.blocks.lock().unwrap().push(block);
    }
}

#[async_trait]
impl RollupProvider for MemoryProvider {
    async fn get_pending_txs(&self) -> Result<Vec<PendingTx>> {
        Ok(self.pending.lock().unwrap().clone())
    }

    async fn get_blocks(&self, from: u64, take: usize) -> Result<Vec<DecodedBlock>> {
        self.block_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .blocks
            .lock()
            .unwrap()
            .iter()
            .filter(|b| b.rollup_id >= from)
            .take(take)
            .cloned()
            .collect())
    }

    async fn get_latest_rollup_id(&self) -> Result<Option<u64>> {
        Ok(self.blocks.lock().unwrap().last().map(|b| b.rollup_id))
    }
}

/// In-memory database that records every `apply` and can be told to fail.
pub struct RecordingDb {
    pub inner: KvDatabase<InMemoryStorage>,
    applied: Mutex<Vec<Vec<WriteOp>>>,
    failures: AtomicUsize,
}

impl RecordingDb {
    pub fn new() -> Self {
        Self {
            inner: KvDatabase::with_storage(InMemoryStorage::new()),
            applied: Mutex::new(Vec::new()),
            failures: AtomicUsize::new(0),
        }
    }

    /// Write straight to the store without recording.
    pub async fn seed(&self, ops: &[WriteOp]) {
        self.inner.apply(ops).await.unwrap();
    }

    pub fn fail_next_applies(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    pub fn applied(&self) -> Vec<Vec<WriteOp>> {
        self.applied.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.applied.lock().unwrap().clear();
    }

    pub fn ops(&self) -> Vec<WriteOp> {
        self.applied().into_iter().flatten().collect()
    }

    pub fn added_notes(&self) -> Vec<Note> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                WriteOp::AddNote(note) => Some(note),
                _ => None,
            })
            .collect()
    }

    pub fn nullified(&self) -> Vec<Nullifier> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                WriteOp::NullifyNote(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    pub fn removed_notes(&self) -> Vec<Nullifier> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                WriteOp::RemoveNote(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    pub fn removed_txs(&self) -> Vec<TxId> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                WriteOp::RemoveUserTx { tx_id, .. } => Some(tx_id),
                _ => None,
            })
            .collect()
    }

    pub fn payment_txs(&self) -> Vec<CorePaymentTx> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                WriteOp::UpsertPaymentTx(tx) => Some(tx),
                _ => None,
            })
            .collect()
    }

    pub fn account_txs(&self) -> Vec<CoreAccountTx> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                WriteOp::UpsertAccountTx(tx) => Some(tx),
                _ => None,
            })
            .collect()
    }

    pub fn defi_txs(&self) -> Vec<CoreDefiTx> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                WriteOp::UpsertDefiTx(tx) => Some(tx),
                _ => None,
            })
            .collect()
    }

    pub fn spending_keys(&self) -> Vec<SpendingKey> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                WriteOp::AddSpendingKey(key) => Some(key),
                _ => None,
            })
            .collect()
    }

    pub fn user_updates(&self) -> Vec<UserData> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                WriteOp::UpdateUser(user) => Some(user),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Database for RecordingDb {
    async fn get_user(&self, user_id: &AccountPublicKey) -> Result<Option<UserData>> {
        self.inner.get_user(user_id).await
    }

    async fn get_note(&self, commitment: &Commitment) -> Result<Option<Note>> {
        self.inner.get_note(commitment).await
    }

    async fn get_note_by_nullifier(&self, nullifier: &Nullifier) -> Result<Option<Note>> {
        self.inner.get_note_by_nullifier(nullifier).await
    }

    async fn get_notes(&self, user_id: &AccountPublicKey) -> Result<Vec<Note>> {
        self.inner.get_notes(user_id).await
    }

    async fn get_pending_notes(&self, user_id: &AccountPublicKey) -> Result<Vec<Note>> {
        self.inner.get_pending_notes(user_id).await
    }

    async fn get_payment_tx(&self, user_id: &AccountPublicKey, tx_id: &TxId) -> Result<Option<CorePaymentTx>> {
        self.inner.get_payment_tx(user_id, tx_id).await
    }

    async fn get_account_tx(&self, user_id: &AccountPublicKey, tx_id: &TxId) -> Result<Option<CoreAccountTx>> {
        self.inner.get_account_tx(user_id, tx_id).await
    }

    async fn get_defi_tx(&self, user_id: &AccountPublicKey, tx_id: &TxId) -> Result<Option<CoreDefiTx>> {
        self.inner.get_defi_tx(user_id, tx_id).await
    }

    async fn get_pending_user_txs(&self, user_id: &AccountPublicKey) -> Result<Vec<CoreUserTx>> {
        self.inner.get_pending_user_txs(user_id).await
    }

    async fn get_unclaimed_defi_txs(&self, user_id: &AccountPublicKey) -> Result<Vec<CoreDefiTx>> {
        self.inner.get_unclaimed_defi_txs(user_id).await
    }

    async fn get_spending_keys(&self, user_id: &AccountPublicKey) -> Result<Vec<SpendingKey>> {
        self.inner.get_spending_keys(user_id).await
    }

    async fn get_user_txs(&self, user_id: &AccountPublicKey) -> Result<Vec<CoreUserTx>> {
        self.inner.get_user_txs(user_id).await
    }

    async fn apply(&self, ops: &[WriteOp]) -> Result<()> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(SyncError::Database("injected write failure".into()));
        }
        self.inner.apply(ops).await?;
        self.applied.lock().unwrap().push(ops.to_vec());
        Ok(())
    }
}

// ---- proof fixtures ----

pub struct GeneratedProof {
    pub proof_data: InnerProofData,
    pub offchain: OffchainTxData,
    pub output_notes: [TreeNote; 2],
    pub tx: CoreUserTx,
}

impl GeneratedProof {
    pub fn entry(&self) -> (InnerProofData, OffchainTxData) {
        (self.proof_data.clone(), self.offchain.clone())
    }

    pub fn tx_id(&self) -> TxId {
        self.proof_data.tx_id()
    }

    pub fn authored(&self, allow_chain: u8) -> AuthoredProof {
        AuthoredProof {
            proof_data: self.proof_data.clone(),
            allow_chain,
            tx: self.tx.clone(),
            output_notes: self.output_notes.clone(),
            linked_proof: None,
        }
    }

    pub fn payment_tx(&self) -> &CorePaymentTx {
        match &self.tx {
            CoreUserTx::Payment(tx) => tx,
            other => panic!("not a payment: {other:?}"),
        }
    }

    pub fn defi_tx(&self) -> &CoreDefiTx {
        match &self.tx {
            CoreUserTx::Defi(tx) => tx,
            other => panic!("not a defi tx: {other:?}"),
        }
    }

    pub fn defi_offchain(&self) -> &OffchainDefiDepositData {
        match &self.offchain {
            OffchainTxData::DefiDeposit(data) => data,
            other => panic!("not a defi deposit: {other:?}"),
        }
    }
}

#[derive(Clone)]
pub struct PaymentArgs {
    pub proof_id: ProofId,
    pub sender: Account,
    pub sender_account_required: bool,
    pub recipient: AccountPublicKey,
    pub recipient_account_required: bool,
    pub asset_id: u32,
    pub input_value1: u128,
    pub input_value2: u128,
    pub output_value1: u128,
    pub output_value2: u128,
    pub public_value: u128,
    pub public_owner: EthAddress,
    pub tx_fee: u128,
    pub valid_commitments: bool,
    /// Spend these nullifiers instead of fresh ones.
    pub nullifiers: Option<(Nullifier, Nullifier)>,
}

impl PaymentArgs {
    pub fn new(sender: &Account, recipient: AccountPublicKey) -> Self {
        Self {
            proof_id: ProofId::Send,
            sender: sender.clone(),
            sender_account_required: true,
            recipient,
            recipient_account_required: true,
            asset_id: 1,
            input_value1: 0,
            input_value2: 0,
            output_value1: 0,
            output_value2: 0,
            public_value: 0,
            public_owner: EthAddress::ZERO,
            tx_fee: 0,
            valid_commitments: true,
            nullifiers: None,
        }
    }

    pub fn transfer(sender: &Account, recipient: AccountPublicKey) -> Self {
        Self {
            input_value1: 80,
            input_value2: 40,
            output_value1: 64,
            output_value2: 36,
            tx_fee: 8,
            ..Self::new(sender, recipient)
        }
    }

    pub fn deposit(recipient: &Account, deposit_value: u128, tx_fee: u128, eth_address: EthAddress) -> Self {
        Self {
            proof_id: ProofId::Deposit,
            output_value1: deposit_value,
            public_value: deposit_value + tx_fee,
            public_owner: eth_address,
            tx_fee,
            ..Self::new(recipient, recipient.public_key)
        }
    }

    pub fn withdraw(
        sender: &Account,
        input_value1: u128,
        input_value2: u128,
        withdraw_value: u128,
        tx_fee: u128,
        recipient: EthAddress,
    ) -> Self {
        Self {
            proof_id: ProofId::Withdraw,
            input_value1,
            input_value2,
            output_value2: input_value1 + input_value2 - withdraw_value - tx_fee,
            public_value: withdraw_value + tx_fee,
            public_owner: recipient,
            tx_fee,
            ..Self::new(sender, sender.public_key)
        }
    }
}

pub struct DefiDepositArgs {
    pub bridge_call_data: BridgeCallData,
    pub sender: Account,
    pub sender_account_required: bool,
    pub claim_recipient: AccountPublicKey,
    pub input_value1: u128,
    pub input_value2: u128,
    pub output_value: u128,
    pub deposit_value: u128,
    pub tx_fee: u128,
}

impl DefiDepositArgs {
    pub fn new(sender: &Account, bridge_call_data: BridgeCallData) -> Self {
        Self {
            bridge_call_data,
            sender: sender.clone(),
            sender_account_required: true,
            claim_recipient: sender.public_key,
            input_value1: 0,
            input_value2: 0,
            output_value: 0,
            deposit_value: 0,
            tx_fee: 0,
        }
    }
}

#[derive(Default)]
pub struct BlockOpts {
    pub data_start_index: u64,
    pub rollup_size: usize,
    pub bridge_call_datas: Vec<BridgeCallData>,
    pub interaction_results: Vec<DefiInteractionEvent>,
}

pub fn rollup_block(rollup_id: u64, proofs: Vec<(InnerProofData, OffchainTxData)>, opts: BlockOpts) -> DecodedBlock {
    let mut block = DecodedBlock::new(rollup_id, mined_at(rollup_id), opts.data_start_index)
        .with_bridge_call_datas(opts.bridge_call_datas)
        .with_interaction_results(opts.interaction_results);
    for (proof, offchain) in proofs {
        block.push_proof(proof, &offchain).unwrap();
    }
    block.pad_to(opts.rollup_size);
    block
}

pub fn simple_block(rollup_id: u64, proofs: Vec<(InnerProofData, OffchainTxData)>) -> DecodedBlock {
    rollup_block(rollup_id, proofs, BlockOpts::default())
}

pub fn random_commitment() -> Commitment {
    Commitment::random(&mut rand::thread_rng())
}

pub fn random_tx_id() -> TxId {
    TxId::random(&mut rand::thread_rng())
}

pub struct Harness {
    pub crypto: Arc<StandardNoteCrypto>,
    pub db: Arc<RecordingDb>,
    pub world: Arc<RecordingWorldState>,
    pub provider: Arc<MemoryProvider>,
    pub user: Account,
    pub state: UserState,
}

impl Harness {
    pub async fn new() -> Self {
        let db = Arc::new(RecordingDb::new());
        let provider = Arc::new(MemoryProvider::default());
        Self::with(create_account(), db, provider).await
    }

    pub async fn with(user: Account, db: Arc<RecordingDb>, provider: Arc<MemoryProvider>) -> Self {
        let crypto = Arc::new(StandardNoteCrypto::new());
        let world = Arc::new(RecordingWorldState::default());
        let mut state = UserState::new(
            UserData::new(user.public_key),
            user.private_key.clone(),
            crypto.clone(),
            db.clone(),
            world.clone(),
            provider.clone(),
        );
        state.init().await.unwrap();
        Self { crypto, db, world, provider, user, state }
    }

    pub fn pk(&self) -> AccountPublicKey {
        self.user.public_key
    }

    /// A settled, unspent note owned by `owner` stored directly in the db.
    pub async fn add_input_note(&self, owner: &AccountPublicKey, asset_id: u32, value: u128, nullifier: Nullifier) {
        let mut rng = rand::thread_rng();
        let tree_note = TreeNote {
            owner: *owner,
            value,
            asset_id,
            account_required: true,
            note_secret: NoteSecret::random(&mut rng),
            creator_pub_key: AccountPublicKey::ZERO,
            input_nullifier: Nullifier::random(&mut rng),
        };
        let note = Note::settled(tree_note, random_commitment(), nullifier, 0, HashPath::default());
        self.db.seed(&[WriteOp::AddNote(note)]).await;
    }

    pub fn fresh_nullifier(&self, owner: &Account) -> Nullifier {
        self.crypto.derive_nullifier(&random_commitment(), &owner.private_key)
    }

    pub async fn payment_proof(&self, args: PaymentArgs) -> GeneratedProof {
        let mut rng = rand::thread_rng();
        let crypto = &self.crypto;

        let (nullifier1, nullifier2) = match args.nullifiers {
            Some(pair) => pair,
            None => {
                let pair = (self.fresh_nullifier(&args.sender), self.fresh_nullifier(&args.sender));
                if args.input_value1 > 0 {
                    self.add_input_note(&args.sender.public_key, args.asset_id, args.input_value1, pair.0).await;
                }
                if args.input_value2 > 0 {
                    self.add_input_note(&args.sender.public_key, args.asset_id, args.input_value2, pair.1).await;
                }
                pair
            }
        };

        let (note1, viewing_key1) = crypto
            .create_note(
                &args.recipient,
                args.output_value1,
                args.asset_id,
                args.recipient_account_required,
                nullifier1,
                args.sender.public_key,
                &mut rng,
            )
            .unwrap();
        let (note2, viewing_key2) = crypto
            .create_note(
                &args.sender.public_key,
                args.output_value2,
                args.asset_id,
                args.sender_account_required,
                nullifier2,
                args.sender.public_key,
                &mut rng,
            )
            .unwrap();

        let (commitment1, commitment2) = if args.valid_commitments {
            (crypto.commit_note(&note1), crypto.commit_note(&note2))
        } else {
            (random_commitment(), random_commitment())
        };

        let proof_data = InnerProofData {
            proof_id: args.proof_id,
            note_commitment1: commitment1,
            note_commitment2: commitment2,
            nullifier1,
            nullifier2,
            public_value: args.public_value,
            public_owner: args.public_owner,
            public_asset_id: 0,
        };
        let offchain = OffchainTxData::JoinSplit(OffchainJoinSplitData {
            viewing_keys: [viewing_key1, viewing_key2],
            tx_ref_no: 0,
        });
        let tx = CorePaymentTx {
            tx_id: proof_data.tx_id(),
            user_id: args.sender.public_key,
            proof_id: args.proof_id,
            asset_id: args.asset_id,
            public_value: args.public_value,
            public_owner: (!args.public_owner.is_zero()).then_some(args.public_owner),
            private_input: args.output_value1 + args.output_value2 + args.tx_fee,
            recipient_private_output: args.output_value1,
            sender_private_output: args.output_value2,
            is_recipient: args.recipient == self.pk(),
            is_sender: args.sender.public_key == self.pk(),
            tx_ref_no: 0,
            created: Utc::now(),
            settled: None,
        };

        GeneratedProof { proof_data, offchain, output_notes: [note1, note2], tx: CoreUserTx::Payment(tx) }
    }

    pub async fn defi_deposit_proof(&self, args: DefiDepositArgs) -> GeneratedProof {
        let mut rng = rand::thread_rng();
        let crypto = &self.crypto;
        let asset_id = args.bridge_call_data.input_asset_id_a;

        let nullifier1 = self.fresh_nullifier(&args.sender);
        let nullifier2 = self.fresh_nullifier(&args.sender);
        self.add_input_note(&args.sender.public_key, asset_id, args.input_value1, nullifier1).await;
        self.add_input_note(&args.sender.public_key, asset_id, args.input_value2, nullifier2).await;

        let (dummy_note, _) = crypto
            .create_note(
                &args.sender.public_key,
                0,
                asset_id,
                args.sender_account_required,
                Nullifier::random(&mut rng),
                args.sender.public_key,
                &mut rng,
            )
            .unwrap();
        let (change_note, change_viewing_key) = crypto
            .create_note(
                &args.sender.public_key,
                args.output_value,
                asset_id,
                args.sender_account_required,
                nullifier2,
                args.sender.public_key,
                &mut rng,
            )
            .unwrap();

        let (eph_private_key, eph_public_key) = crypto.generate_account(&mut rng);
        let claim_secret = crypto.derive_note_secret(&args.claim_recipient, &eph_private_key).unwrap();
        let partial_state =
            crypto.partial_value_commitment(&claim_secret, &args.claim_recipient, args.sender_account_required);
        let claim_note = TreeClaimNote {
            value: args.deposit_value,
            bridge_call_data: args.bridge_call_data,
            defi_interaction_nonce: 0,
            fee: 0,
            partial_state,
            input_nullifier: nullifier1,
        };

        let proof_data = InnerProofData {
            proof_id: ProofId::DefiDeposit,
            note_commitment1: crypto.commit_partial_claim(&claim_note),
            note_commitment2: crypto.commit_note(&change_note),
            nullifier1,
            nullifier2,
            public_value: 0,
            public_owner: EthAddress::ZERO,
            public_asset_id: 0,
        };
        let offchain = OffchainTxData::DefiDeposit(OffchainDefiDepositData {
            bridge_call_data: args.bridge_call_data,
            partial_state,
            partial_state_secret_eph_pub_key: eph_public_key,
            deposit_value: args.deposit_value,
            tx_fee: args.tx_fee,
            viewing_key: change_viewing_key,
            tx_ref_no: 0,
        });
        let partial_state_secret = crypto.derive_shared_secret(&eph_public_key, &args.sender.private_key).unwrap();
        let tx = CoreDefiTx::new(
            proof_data.tx_id(),
            args.sender.public_key,
            args.bridge_call_data,
            args.deposit_value,
            args.tx_fee,
            0,
            Utc::now(),
            partial_state,
            partial_state_secret,
        );

        GeneratedProof { proof_data, offchain, output_notes: [dummy_note, change_note], tx: CoreUserTx::Defi(tx) }
    }

    pub fn account_proof(
        &self,
        user_id: AccountPublicKey,
        new_account_public_key: AccountPublicKey,
        alias_hash: AliasHash,
        spending_keys: (SpendingPublicKey, SpendingPublicKey),
    ) -> (InnerProofData, OffchainTxData) {
        let create = new_account_public_key == user_id;
        let proof_data = InnerProofData {
            proof_id: ProofId::Account,
            note_commitment1: random_commitment(),
            note_commitment2: random_commitment(),
            nullifier1: if create { self.crypto.alias_hash_nullifier(&alias_hash) } else { Nullifier::ZERO },
            nullifier2: self.crypto.account_public_key_nullifier(&user_id),
            public_value: 0,
            public_owner: EthAddress::ZERO,
            public_asset_id: 0,
        };
        let offchain = OffchainTxData::Account(OffchainAccountData {
            account_public_key: new_account_public_key,
            alias_hash,
            spending_public_key1: spending_keys.0,
            spending_public_key2: spending_keys.1,
            tx_ref_no: 0,
        });
        (proof_data, offchain)
    }

    pub fn defi_claim_proof(&self, nullifier1: Nullifier, nullifier2: Nullifier) -> (InnerProofData, OffchainTxData) {
        let proof_data = InnerProofData {
            proof_id: ProofId::DefiClaim,
            note_commitment1: random_commitment(),
            note_commitment2: random_commitment(),
            nullifier1,
            nullifier2,
            public_value: 0,
            public_owner: EthAddress::ZERO,
            public_asset_id: 0,
        };
        (proof_data, OffchainTxData::DefiClaim(OffchainDefiClaimData))
    }
}
