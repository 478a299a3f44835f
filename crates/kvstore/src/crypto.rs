//! Domain-separated hashing for batch commitments

use crate::{BatchOp, Hash32};

const DOMAIN_PUT: &[u8] = b"put";
const DOMAIN_DELETE: &[u8] = b"del";
const DOMAIN_BATCH: &[u8] = b"batch";

/// op = H("put" || H(key) || H(value)) or H("del" || H(key))
pub fn hash_op(op: &BatchOp) -> Hash32 {
    let mut hasher = blake3::Hasher::new();
    match op {
        BatchOp::Put { key, value } => {
            hasher.update(DOMAIN_PUT);
            hasher.update(blake3::hash(key).as_bytes());
            hasher.update(blake3::hash(value).as_bytes());
        }
        BatchOp::Delete { key } => {
            hasher.update(DOMAIN_DELETE);
            hasher.update(blake3::hash(key).as_bytes());
        }
    }
    hasher.finalize().into()
}

/// batch = H("batch" || op_0 || op_1 || ...), ops in submission order
pub fn hash_batch(ops: &[BatchOp]) -> Hash32 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(DOMAIN_BATCH);
    for op in ops {
        hasher.update(&hash_op(op));
    }
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_hash_depends_on_order() {
        let a = BatchOp::Put { key: b"a".to_vec(), value: b"1".to_vec() };
        let b = BatchOp::Delete { key: b"b".to_vec() };
        assert_ne!(hash_batch(&[a.clone(), b.clone()]), hash_batch(&[b, a]));
    }

    #[test]
    fn put_and_delete_are_separated() {
        let put = BatchOp::Put { key: b"k".to_vec(), value: Vec::new() };
        let del = BatchOp::Delete { key: b"k".to_vec() };
        assert_ne!(hash_op(&put), hash_op(&del));
    }
}
