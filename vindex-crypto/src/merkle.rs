use vindex_types::primitives::Hash;

use crate::hash::blake3_hash;

/// Root of an empty tree.
pub const EMPTY_ROOT: Hash = [0u8; 32];

/// Root of a binary Merkle tree over `leaves`, in the given order.
///
/// An odd node at any level is promoted unchanged. Leaf and internal hashes
/// use distinct prefixes so a leaf can never be mistaken for an inner node.
pub fn merkle_root(leaves: &[Hash]) -> Hash {
    if leaves.is_empty() {
        return EMPTY_ROOT;
    }
    let mut level: Vec<Hash> = leaves.to_vec();
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| match pair {
                [left, right] => hash_internal(left, right),
                [single] => *single,
                _ => EMPTY_ROOT,
            })
            .collect();
    }
    level[0]
}

/// Root over key/value entries. Callers pass entries in key order.
pub fn kv_root<'a, I>(entries: I) -> Hash
where
    I: IntoIterator<Item = (&'a [u8], &'a [u8])>,
{
    let leaves: Vec<Hash> = entries
        .into_iter()
        .map(|(key, value)| hash_kv_leaf(key, value))
        .collect();
    merkle_root(&leaves)
}

// ─── Hash helpers ────────────────────────────────────────────────────────────

pub fn hash_leaf(data: &[u8]) -> Hash {
    let mut buf = Vec::with_capacity(1 + data.len());
    buf.push(0x00);
    buf.extend_from_slice(data);
    blake3_hash(&buf)
}

pub fn hash_kv_leaf(key: &[u8], value: &[u8]) -> Hash {
    let mut buf = Vec::with_capacity(9 + key.len() + value.len());
    buf.push(0x00);
    buf.extend_from_slice(&(key.len() as u64).to_le_bytes());
    buf.extend_from_slice(key);
    buf.extend_from_slice(value);
    blake3_hash(&buf)
}

pub fn hash_internal(left: &Hash, right: &Hash) -> Hash {
    let mut buf = Vec::with_capacity(65);
    buf.push(0x01);
    buf.extend_from_slice(left);
    buf.extend_from_slice(right);
    blake3_hash(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_root() {
        assert_eq!(merkle_root(&[]), EMPTY_ROOT);
    }

    #[test]
    fn test_single_leaf_is_root() {
        let leaf = hash_leaf(b"tx");
        assert_eq!(merkle_root(&[leaf]), leaf);
    }

    #[test]
    fn test_three_leaves_promote_odd_node() {
        let a = hash_leaf(b"a");
        let b = hash_leaf(b"b");
        let c = hash_leaf(b"c");
        let expected = hash_internal(&hash_internal(&a, &b), &c);
        assert_eq!(merkle_root(&[a, b, c]), expected);
    }

    #[test]
    fn test_order_matters() {
        let a = hash_leaf(b"a");
        let b = hash_leaf(b"b");
        assert_ne!(merkle_root(&[a, b]), merkle_root(&[b, a]));
    }

    #[test]
    fn test_kv_root_separates_key_and_value() {
        let r1 = kv_root([(b"ab".as_slice(), b"c".as_slice())]);
        let r2 = kv_root([(b"a".as_slice(), b"bc".as_slice())]);
        assert_ne!(r1, r2);
    }

    proptest! {
        #[test]
        fn prop_changing_any_leaf_changes_root(
            leaves in proptest::collection::vec(any::<[u8; 32]>(), 1..32),
            index in any::<prop::sample::Index>(),
        ) {
            let original = merkle_root(&leaves);
            let mut mutated = leaves.clone();
            let i = index.index(mutated.len());
            mutated[i][0] ^= 0x01;
            prop_assert_ne!(original, merkle_root(&mutated));
        }
    }
}
