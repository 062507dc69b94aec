use std::fmt;

use ed25519_dalek::{Signer, Verifier};
use vindex_types::primitives::{Address, PublicKey, Signature};

use crate::address::pubkey_to_address;
use crate::error::CryptoError;

/// An Ed25519 signing key for an account or validator.
///
/// The underlying `SigningKey` zeroizes its secret on drop.
pub struct Keypair {
    inner: ed25519_dalek::SigningKey,
}

impl Keypair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        let mut csprng = rand::rngs::OsRng;
        Self {
            inner: ed25519_dalek::SigningKey::generate(&mut csprng),
        }
    }

    /// Create a keypair from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            inner: ed25519_dalek::SigningKey::from_bytes(seed),
        }
    }

    /// Create a keypair from a hex-encoded 32-byte seed, as found in node configs.
    pub fn from_hex_seed(seed_hex: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(seed_hex.trim()).map_err(|e| CryptoError::InvalidKey {
            reason: format!("seed is not valid hex: {e}"),
        })?;
        let seed: [u8; 32] = bytes.try_into().map_err(|_| CryptoError::InvalidKey {
            reason: "seed must be exactly 32 bytes".to_string(),
        })?;
        Ok(Self::from_seed(&seed))
    }

    pub fn public_key(&self) -> PublicKey {
        self.inner.verifying_key().to_bytes()
    }

    /// The account address controlled by this key.
    pub fn address(&self) -> Address {
        pubkey_to_address(&self.public_key())
    }

    /// The 32-byte seed of this keypair.
    pub fn seed(&self) -> [u8; 32] {
        self.inner.to_bytes()
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        self.inner.sign(message).to_bytes()
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("public_key", &hex::encode(self.public_key()))
            .finish_non_exhaustive()
    }
}

/// Verify an Ed25519 signature.
pub fn verify(message: &[u8], signature: &Signature, pubkey: &PublicKey) -> Result<(), CryptoError> {
    let verifying_key =
        ed25519_dalek::VerifyingKey::from_bytes(pubkey).map_err(|e| CryptoError::InvalidKey {
            reason: e.to_string(),
        })?;
    let sig = ed25519_dalek::Signature::from_bytes(signature);
    verifying_key
        .verify(message, &sig)
        .map_err(|_| CryptoError::InvalidSignature { index: 0 })
}

/// Verify many signatures at once, reporting the first invalid index.
///
/// Tries ed25519-dalek batch verification first and only falls back to
/// one-by-one checks when the batch fails.
pub fn batch_verify(
    messages: &[&[u8]],
    signatures: &[Signature],
    pubkeys: &[PublicKey],
) -> Result<(), CryptoError> {
    if messages.len() != signatures.len() || messages.len() != pubkeys.len() {
        return Err(CryptoError::LengthMismatch);
    }
    if messages.is_empty() {
        return Ok(());
    }

    let mut keys = Vec::with_capacity(pubkeys.len());
    for (index, pk) in pubkeys.iter().enumerate() {
        let key = ed25519_dalek::VerifyingKey::from_bytes(pk)
            .map_err(|_| CryptoError::InvalidSignature { index })?;
        keys.push(key);
    }
    let sigs: Vec<ed25519_dalek::Signature> = signatures
        .iter()
        .map(ed25519_dalek::Signature::from_bytes)
        .collect();

    if ed25519_dalek::verify_batch(messages, &sigs, &keys).is_ok() {
        return Ok(());
    }

    for (index, ((msg, sig), key)) in messages.iter().zip(&sigs).zip(&keys).enumerate() {
        if key.verify(msg, sig).is_err() {
            return Err(CryptoError::InvalidSignature { index });
        }
    }
    Ok(())
}
