//! Note algorithms: commitments, nullifiers and viewing-key trial decryption.
//!
//! `NoteCrypto` is the seam the settlement engine works through. The shipped
//! `StandardNoteCrypto` uses secp256k1 ECDH for shared secrets,
//! XChaCha20-Poly1305 for viewing keys and domain-separated blake3 for every
//! hash. All operations are deterministic; decryption failing is a normal
//! outcome ("not ours"), never an error.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use k256::ecdh::diffie_hellman;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::{PublicKey, SecretKey};
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::note::{TreeClaimNote, TreeNote};
use crate::types::{AccountPrivateKey, AccountPublicKey, AliasHash, Commitment, NoteSecret, Nullifier, PartialState};

const CTX_NOTE_SECRET: &str = "rollup-sync 2024 note secret";
const CTX_VIEWING_KEY: &str = "rollup-sync 2024 viewing key";
const CTX_VIEWING_NONCE: &str = "rollup-sync 2024 viewing nonce";
const CTX_PARTIAL_STATE: &str = "rollup-sync 2024 partial state";
const CTX_VALUE_NOTE: &str = "rollup-sync 2024 value note commitment";
const CTX_CLAIM_NOTE: &str = "rollup-sync 2024 claim note commitment";
const CTX_VALUE_NULLIFIER: &str = "rollup-sync 2024 value note nullifier";
const CTX_CLAIM_NULLIFIER: &str = "rollup-sync 2024 claim note nullifier";
const CTX_ALIAS_NULLIFIER: &str = "rollup-sync 2024 alias hash nullifier";
const CTX_ACCOUNT_NULLIFIER: &str = "rollup-sync 2024 account key nullifier";

/// value(16) | asset_id(4) | account_required(1) | creator_pub_key(32)
const PLAINTEXT_LEN: usize = 16 + 4 + 1 + 32;

/// Encrypted note payload published off-chain next to an output commitment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewingKey {
    pub ephemeral_pub_key: AccountPublicKey,
    pub ciphertext: Vec<u8>,
}

pub trait NoteCrypto: Send + Sync {
    fn derive_public_key(&self, private_key: &AccountPrivateKey) -> Option<AccountPublicKey>;

    fn derive_nullifier(&self, commitment: &Commitment, private_key: &AccountPrivateKey) -> Nullifier;

    /// Trial-decrypt a viewing key. `input_nullifier` is the proof nullifier in
    /// the same slot and completes the recovered note.
    fn decrypt_note(
        &self,
        viewing_key: &ViewingKey,
        input_nullifier: &Nullifier,
        private_key: &AccountPrivateKey,
    ) -> Option<TreeNote>;

    fn derive_shared_secret(
        &self,
        ephemeral_pub_key: &AccountPublicKey,
        private_key: &AccountPrivateKey,
    ) -> Option<NoteSecret>;

    fn commit_note(&self, note: &TreeNote) -> Commitment;

    fn commit_partial_claim(&self, note: &TreeClaimNote) -> Commitment;

    fn claim_note_nullifier(&self, claim_commitment: &Commitment) -> Nullifier;

    fn partial_value_commitment(
        &self,
        secret: &NoteSecret,
        owner: &AccountPublicKey,
        account_required: bool,
    ) -> PartialState;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct StandardNoteCrypto;

impl StandardNoteCrypto {
    pub fn new() -> Self {
        Self
    }

    pub fn generate_account<R: RngCore + CryptoRng>(&self, rng: &mut R) -> (AccountPrivateKey, AccountPublicKey) {
        let secret = SecretKey::random(rng);
        let mut private_key = [0u8; 32];
        private_key.copy_from_slice(&secret.to_bytes());
        (AccountPrivateKey(private_key), x_only(&secret.public_key()))
    }

    /// Creator side of the note secret: ECDH(ephemeral, owner).
    pub fn derive_note_secret(
        &self,
        owner: &AccountPublicKey,
        ephemeral_private_key: &AccountPrivateKey,
    ) -> Option<NoteSecret> {
        shared_secret(owner, ephemeral_private_key).map(|s| NoteSecret(note_secret_from_shared(&s)))
    }

    /// Build a note for `owner` and the viewing key that lets them find it.
    #[allow(clippy::too_many_arguments)]
    pub fn create_note<R: RngCore + CryptoRng>(
        &self,
        owner: &AccountPublicKey,
        value: u128,
        asset_id: u32,
        account_required: bool,
        input_nullifier: Nullifier,
        creator_pub_key: AccountPublicKey,
        rng: &mut R,
    ) -> Option<(TreeNote, ViewingKey)> {
        let (ephemeral_private_key, ephemeral_pub_key) = self.generate_account(rng);
        let shared = shared_secret(owner, &ephemeral_private_key)?;

        let note = TreeNote {
            owner: *owner,
            value,
            asset_id,
            account_required,
            note_secret: NoteSecret(note_secret_from_shared(&shared)),
            creator_pub_key,
            input_nullifier,
        };

        let mut plaintext = Vec::with_capacity(PLAINTEXT_LEN);
        plaintext.extend_from_slice(&value.to_be_bytes());
        plaintext.extend_from_slice(&asset_id.to_be_bytes());
        plaintext.push(account_required as u8);
        plaintext.extend_from_slice(creator_pub_key.as_bytes());

        let (cipher, nonce) = viewing_cipher(&shared, &ephemeral_pub_key);
        let ciphertext = cipher.encrypt(&nonce, plaintext.as_slice()).ok()?;

        Some((note, ViewingKey { ephemeral_pub_key, ciphertext }))
    }

    pub fn alias_hash_nullifier(&self, alias_hash: &AliasHash) -> Nullifier {
        Nullifier(hash_parts(CTX_ALIAS_NULLIFIER, &[alias_hash.as_bytes()]))
    }

    pub fn account_public_key_nullifier(&self, account: &AccountPublicKey) -> Nullifier {
        Nullifier(hash_parts(CTX_ACCOUNT_NULLIFIER, &[account.as_bytes()]))
    }
}

impl NoteCrypto for StandardNoteCrypto {
    fn derive_public_key(&self, private_key: &AccountPrivateKey) -> Option<AccountPublicKey> {
        let secret = SecretKey::from_slice(private_key.as_bytes()).ok()?;
        Some(x_only(&secret.public_key()))
    }

    fn derive_nullifier(&self, commitment: &Commitment, private_key: &AccountPrivateKey) -> Nullifier {
        Nullifier(hash_parts(CTX_VALUE_NULLIFIER, &[commitment.as_bytes(), private_key.as_bytes()]))
    }

    fn decrypt_note(
        &self,
        viewing_key: &ViewingKey,
        input_nullifier: &Nullifier,
        private_key: &AccountPrivateKey,
    ) -> Option<TreeNote> {
        let shared = shared_secret(&viewing_key.ephemeral_pub_key, private_key)?;
        let (cipher, nonce) = viewing_cipher(&shared, &viewing_key.ephemeral_pub_key);
        let plaintext = cipher.decrypt(&nonce, viewing_key.ciphertext.as_slice()).ok()?;
        if plaintext.len() != PLAINTEXT_LEN {
            return None;
        }

        let value = u128::from_be_bytes(plaintext[0..16].try_into().ok()?);
        let asset_id = u32::from_be_bytes(plaintext[16..20].try_into().ok()?);
        let account_required = match plaintext[20] {
            0 => false,
            1 => true,
            _ => return None,
        };
        let creator_pub_key = AccountPublicKey::from_slice(&plaintext[21..53])?;

        Some(TreeNote {
            owner: self.derive_public_key(private_key)?,
            value,
            asset_id,
            account_required,
            note_secret: NoteSecret(note_secret_from_shared(&shared)),
            creator_pub_key,
            input_nullifier: *input_nullifier,
        })
    }

    fn derive_shared_secret(
        &self,
        ephemeral_pub_key: &AccountPublicKey,
        private_key: &AccountPrivateKey,
    ) -> Option<NoteSecret> {
        shared_secret(ephemeral_pub_key, private_key).map(|s| NoteSecret(note_secret_from_shared(&s)))
    }

    fn commit_note(&self, note: &TreeNote) -> Commitment {
        let partial = self.partial_value_commitment(&note.note_secret, &note.owner, note.account_required);
        Commitment(hash_parts(
            CTX_VALUE_NOTE,
            &[
                partial.as_bytes(),
                &note.value.to_be_bytes(),
                &note.asset_id.to_be_bytes(),
                note.input_nullifier.as_bytes(),
                note.creator_pub_key.as_bytes(),
            ],
        ))
    }

    fn commit_partial_claim(&self, note: &TreeClaimNote) -> Commitment {
        Commitment(hash_parts(
            CTX_CLAIM_NOTE,
            &[
                &note.value.to_be_bytes(),
                &note.bridge_call_data.to_field(),
                &note.fee.to_be_bytes(),
                note.partial_state.as_bytes(),
                note.input_nullifier.as_bytes(),
            ],
        ))
    }

    fn claim_note_nullifier(&self, claim_commitment: &Commitment) -> Nullifier {
        Nullifier(hash_parts(CTX_CLAIM_NULLIFIER, &[claim_commitment.as_bytes()]))
    }

    fn partial_value_commitment(
        &self,
        secret: &NoteSecret,
        owner: &AccountPublicKey,
        account_required: bool,
    ) -> PartialState {
        PartialState(hash_parts(
            CTX_PARTIAL_STATE,
            &[secret.as_bytes(), owner.as_bytes(), &[account_required as u8]],
        ))
    }
}

fn hash_parts(context: &str, parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

fn x_only(public_key: &PublicKey) -> AccountPublicKey {
    let point = public_key.to_encoded_point(true);
    let mut x = [0u8; 32];
    x.copy_from_slice(&point.as_bytes()[1..33]);
    AccountPublicKey(x)
}

/// Lift an x-coordinate to the even-y point. ECDH only depends on x, so the
/// parity choice does not change the shared secret.
fn lift_x(x: &AccountPublicKey) -> Option<PublicKey> {
    let mut sec1 = [0u8; 33];
    sec1[0] = 0x02;
    sec1[1..].copy_from_slice(x.as_bytes());
    PublicKey::from_sec1_bytes(&sec1).ok()
}

fn shared_secret(public_key: &AccountPublicKey, private_key: &AccountPrivateKey) -> Option<[u8; 32]> {
    let public_key = lift_x(public_key)?;
    let secret = SecretKey::from_slice(private_key.as_bytes()).ok()?;
    let shared = diffie_hellman(secret.to_nonzero_scalar(), public_key.as_affine());
    let mut out = [0u8; 32];
    out.copy_from_slice(shared.raw_secret_bytes());
    Some(out)
}

fn note_secret_from_shared(shared: &[u8; 32]) -> [u8; 32] {
    blake3::derive_key(CTX_NOTE_SECRET, shared)
}

fn viewing_cipher(shared: &[u8; 32], ephemeral_pub_key: &AccountPublicKey) -> (XChaCha20Poly1305, XNonce) {
    let key = hash_parts(CTX_VIEWING_KEY, &[shared, ephemeral_pub_key.as_bytes()]);
    // the ephemeral key is fresh per note, so a derived nonce never repeats under one key
    let nonce_bytes = hash_parts(CTX_VIEWING_NONCE, &[ephemeral_pub_key.as_bytes()]);
    let cipher = XChaCha20Poly1305::new(Key::from_slice(&key));
    (cipher, *XNonce::from_slice(&nonce_bytes[..24]))
}
