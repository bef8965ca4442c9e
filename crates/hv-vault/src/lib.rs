//! Sealing of nullifiers before they are persisted.
//!
//! Each nullifier is sealed to the operator's Curve25519 public key with a
//! NaCl box (X25519, XSalsa20-Poly1305) from a fresh ephemeral key pair, so
//! the database alone cannot link spent notes. The blob layout is:
//!
//! ```text
//! ephemeral_pk (32) || nonce (24) || box (16-byte tag || ciphertext)
//! ```
//!
//! Any NaCl `box.Open` with the operator's private key opens these blobs,
//! and [`decrypt`] opens blobs sealed by any NaCl `box.Seal`. Opening only
//! happens offline.

use std::path::Path;

use crypto_box::aead::generic_array::GenericArray;
use crypto_box::aead::Aead;
use crypto_box::{PublicKey, SalsaBox, SecretKey};
use rand_core::{OsRng, RngCore};
use zeroize::Zeroizing;

pub const KEY_SIZE: usize = 32;
pub const NONCE_SIZE: usize = 24;
/// Ephemeral public key plus nonce.
pub const HEADER_SIZE: usize = KEY_SIZE + NONCE_SIZE;
/// Poly1305 tag carried in front of the ciphertext.
pub const TAG_SIZE: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("randomness source failed: {0}")]
    Randomness(String),
    #[error("malformed blob: {0}")]
    Malformed(String),
    #[error("authentication failure")]
    AuthenticationFailure,
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error("key file: {0}")]
    Io(#[from] std::io::Error),
}

/// Encrypts nullifiers under a fixed public key.
#[derive(Clone, Debug)]
pub struct NullifierVault {
    public_key: PublicKey,
}

impl NullifierVault {
    pub fn new(public_key: [u8; KEY_SIZE]) -> Self {
        Self {
            public_key: PublicKey::from(public_key),
        }
    }

    /// Load a raw 32-byte public key file.
    pub fn from_file(path: &Path) -> Result<Self, VaultError> {
        let bytes = std::fs::read(path)?;
        let key: [u8; KEY_SIZE] = bytes.as_slice().try_into().map_err(|_| {
            VaultError::InvalidKey(format!(
                "{}: expected {KEY_SIZE} bytes, got {}",
                path.display(),
                bytes.len()
            ))
        })?;
        Ok(Self::new(key))
    }

    pub fn public_key(&self) -> [u8; KEY_SIZE] {
        self.public_key.to_bytes()
    }

    pub fn encrypt(&self, nullifier: &[u8]) -> Result<Vec<u8>, VaultError> {
        let mut seed = Zeroizing::new([0u8; KEY_SIZE]);
        fill_random(&mut seed[..])?;
        let mut nonce = [0u8; NONCE_SIZE];
        fill_random(&mut nonce)?;
        self.seal(SecretKey::from(*seed), &nonce, nullifier)
    }

    fn seal(
        &self,
        ephemeral: SecretKey,
        nonce: &[u8; NONCE_SIZE],
        nullifier: &[u8],
    ) -> Result<Vec<u8>, VaultError> {
        let ephemeral_pk = ephemeral.public_key();
        let sealed = SalsaBox::new(&self.public_key, &ephemeral)
            .encrypt(GenericArray::from_slice(nonce), nullifier)
            .map_err(|_| VaultError::Malformed("seal failed".into()))?;

        let mut blob = Vec::with_capacity(HEADER_SIZE + sealed.len());
        blob.extend_from_slice(ephemeral_pk.as_bytes());
        blob.extend_from_slice(nonce);
        blob.extend_from_slice(&sealed);
        Ok(blob)
    }
}

/// Open a blob produced by [`NullifierVault::encrypt`].
pub fn decrypt(blob: &[u8], secret: &VaultSecret) -> Result<Vec<u8>, VaultError> {
    if blob.len() < HEADER_SIZE + TAG_SIZE {
        return Err(VaultError::Malformed(format!(
            "blob is {} bytes, header and tag alone are {}",
            blob.len(),
            HEADER_SIZE + TAG_SIZE
        )));
    }
    let (eph, rest) = blob.split_at(KEY_SIZE);
    let (nonce, sealed) = rest.split_at(NONCE_SIZE);

    let mut eph_bytes = [0u8; KEY_SIZE];
    eph_bytes.copy_from_slice(eph);
    let ephemeral_pk = PublicKey::from(eph_bytes);

    SalsaBox::new(&ephemeral_pk, &secret.0)
        .decrypt(GenericArray::from_slice(nonce), sealed)
        .map_err(|_| VaultError::AuthenticationFailure)
}

/// Operator private key. Zeroized on drop.
pub struct VaultSecret(SecretKey);

impl VaultSecret {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(SecretKey::from(bytes))
    }

    pub fn from_hex(s: &str) -> Result<Self, VaultError> {
        let bytes = Zeroizing::new(
            hex::decode(s.trim()).map_err(|e| VaultError::InvalidKey(e.to_string()))?,
        );
        let key: [u8; KEY_SIZE] = bytes.as_slice().try_into().map_err(|_| {
            VaultError::InvalidKey(format!(
                "expected {KEY_SIZE} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self::from_bytes(key))
    }

    pub fn to_hex(&self) -> Zeroizing<String> {
        let bytes = Zeroizing::new(self.0.to_bytes());
        Zeroizing::new(hex::encode(&bytes[..]))
    }

    pub fn public_key(&self) -> [u8; KEY_SIZE] {
        self.0.public_key().to_bytes()
    }
}

/// A fresh operator key pair.
pub struct VaultKeypair {
    pub secret: VaultSecret,
    pub public: [u8; KEY_SIZE],
}

impl VaultKeypair {
    pub fn generate() -> Result<Self, VaultError> {
        let mut seed = Zeroizing::new([0u8; KEY_SIZE]);
        fill_random(&mut seed[..])?;
        let secret = VaultSecret::from_bytes(*seed);
        let public = secret.public_key();
        Ok(Self { secret, public })
    }

    pub fn vault(&self) -> NullifierVault {
        NullifierVault::new(self.public)
    }
}

fn fill_random(buf: &mut [u8]) -> Result<(), VaultError> {
    OsRng
        .try_fill_bytes(buf)
        .map_err(|e| VaultError::Randomness(e.to_string()))
}
