//! Fixed-size identifiers shared by every layer

use std::fmt;

use chrono::{DateTime, Utc};
use rand_core::RngCore;
use serde::{Deserialize, Serialize};

pub type Hash32 = [u8; 32];

/// Block mined / record settled times.
pub type Timestamp = DateTime<Utc>;

macro_rules! bytes32 {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
        pub struct $name(pub Hash32);

        impl $name {
            pub const ZERO: Self = Self([0u8; 32]);

            pub fn is_zero(&self) -> bool {
                self.0 == [0u8; 32]
            }

            pub fn as_bytes(&self) -> &Hash32 {
                &self.0
            }

            pub fn from_slice(bytes: &[u8]) -> Option<Self> {
                <Hash32>::try_from(bytes).ok().map(Self)
            }

            pub fn random<R: RngCore + ?Sized>(rng: &mut R) -> Self {
                let mut bytes = [0u8; 32];
                rng.fill_bytes(&mut bytes);
                Self(bytes)
            }
        }

        impl From<Hash32> for $name {
            fn from(bytes: Hash32) -> Self {
                Self(bytes)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), hex::encode(self.0))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&hex::encode(self.0))
            }
        }
    };
}

bytes32!(
    /// Hash of a proof's public inputs.
    TxId
);
bytes32!(
    /// Note commitment as it appears in the data tree.
    Commitment
);
bytes32!(Nullifier);
bytes32!(AliasHash);
bytes32!(
    /// Secret shared between a note's creator and its owner.
    NoteSecret
);
bytes32!(
    /// Partial value-note commitment carried by a claim note.
    PartialState
);
bytes32!(
    /// x-coordinate of the account's secp256k1 public key.
    AccountPublicKey
);
bytes32!(SpendingPublicKey);

/// Account scalar. Never printed.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountPrivateKey(pub Hash32);

impl AccountPrivateKey {
    pub fn as_bytes(&self) -> &Hash32 {
        &self.0
    }
}

impl fmt::Debug for AccountPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccountPrivateKey(<redacted>)")
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct EthAddress(pub [u8; 20]);

impl EthAddress {
    pub const ZERO: Self = Self([0u8; 20]);

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    pub fn random<R: RngCore + ?Sized>(rng: &mut R) -> Self {
        let mut bytes = [0u8; 20];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Left-padded to a 32-byte field.
    pub fn to_field(&self) -> Hash32 {
        let mut out = [0u8; 32];
        out[12..].copy_from_slice(&self.0);
        out
    }

    pub fn from_field(field: &Hash32) -> Self {
        let mut out = [0u8; 20];
        out.copy_from_slice(&field[12..]);
        Self(out)
    }
}

impl fmt::Debug for EthAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EthAddress(0x{})", hex::encode(self.0))
    }
}

/// Sibling pairs from leaf to root.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashPath(pub Vec<[Hash32; 2]>);

impl HashPath {
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.iter().flat_map(|[l, r]| l.iter().chain(r.iter()).copied()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eth_address_field_roundtrip_keeps_padding() {
        let addr = EthAddress([7u8; 20]);
        let field = addr.to_field();
        assert_eq!(&field[..12], &[0u8; 12]);
        assert_eq!(EthAddress::from_field(&field), addr);
    }

    #[test]
    fn private_key_debug_is_redacted() {
        let key = AccountPrivateKey([1u8; 32]);
        assert!(!format!("{key:?}").contains("0101"));
    }

    #[test]
    fn from_slice_rejects_wrong_length() {
        assert!(Commitment::from_slice(&[0u8; 31]).is_none());
        assert!(Commitment::from_slice(&[0u8; 32]).is_some());
    }
}
