/// 32-byte BLAKE3 hash.
pub type Hash = [u8; 32];

/// 32-byte Ed25519 public key.
pub type PublicKey = [u8; 32];

/// 64-byte Ed25519 signature.
pub type Signature = [u8; 64];

/// 20-byte address derived from BLAKE3(pubkey)[0..20].
pub type Address = [u8; 20];

/// Token amount in base units (the native denom uses 9 decimals).
pub type Amount = u128;

/// Delegator shares in a validator's pool.
pub type Shares = u128;

/// Denomination symbol, e.g. `"oc"` or `"GOLD"`.
pub type Denom = String;

/// Unix timestamp in seconds. Always block time inside the state machine.
pub type Timestamp = u64;

/// Block height.
pub type Height = u64;

/// Consensus round within a height.
pub type Round = u32;

/// The all-zero hash, used as the parent of the genesis block.
pub const ZERO_HASH: Hash = [0u8; 32];

/// Derive the address of a module account from its label.
///
/// Module accounts (bonded pool, fee pools, treasury) hold balances like any
/// other account but have no key pair.
pub fn module_address(label: &str) -> Address {
    let mut hasher = blake3::Hasher::new_derive_key("vindexchain module account");
    hasher.update(label.as_bytes());
    let digest = hasher.finalize();
    let mut address = [0u8; 20];
    address.copy_from_slice(&digest.as_bytes()[..20]);
    address
}

/// Lowercase hex rendering of an address, as used in storage keys and logs.
pub fn address_hex(address: &Address) -> String {
    hex::encode(address)
}

/// Parse a hex address (with or without a `0x` prefix).
pub fn parse_address(s: &str) -> Option<Address> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(s).ok()?;
    bytes.try_into().ok()
}

/// Serde helper for [u8; 64] fields.
pub mod serde_sig {
    use serde::{self, Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(value: &[u8; 64], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.as_slice().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 64], D::Error>
    where
        D: Deserializer<'de>,
    {
        let v: Vec<u8> = Vec::deserialize(deserializer)?;
        v.try_into()
            .map_err(|_| serde::de::Error::custom("expected 64 bytes for signature"))
    }
}

/// Serde helper rendering fixed-size byte arrays (addresses, keys) as hex strings.
///
/// Used by the genesis file so operators can write `"address": "ab12..."`.
pub mod serde_hex {
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S, const N: usize>(value: &[u8; N], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(value))
    }

    pub fn deserialize<'de, D, const N: usize>(deserializer: D) -> Result<[u8; N], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let s = s.strip_prefix("0x").unwrap_or(&s);
        let bytes = hex::decode(s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom(format!("expected {N} hex-encoded bytes")))
    }
}
