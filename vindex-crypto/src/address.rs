use vindex_types::primitives::{Address, PublicKey};

use crate::hash::blake3_hash;

/// Address = BLAKE3(pubkey)[0..20]
pub fn pubkey_to_address(pubkey: &PublicKey) -> Address {
    let hash = blake3_hash(pubkey);
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[..20]);
    address
}

/// True if `address` is the one derived from `pubkey`.
pub fn address_matches(address: &Address, pubkey: &PublicKey) -> bool {
    pubkey_to_address(pubkey) == *address
}
