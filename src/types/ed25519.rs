use crate::Error;
use crate::encoding::{base64_decode, base64_encode};
use crate::types::random_bytes;
use ed25519_dalek::hazmat::{ExpandedSecretKey, raw_sign};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use sha2::Sha512;
use std::fmt;
use zeroize::{Zeroize, Zeroizing};

/// An Ed25519 public key, used to verify identity and group session signatures.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Ed25519PublicKey(VerifyingKey);

impl Ed25519PublicKey {
    /// Length of the key in bytes.
    pub const LENGTH: usize = 32;

    /// Returns the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    /// Parses a key from a slice. The slice must hold a valid curve point.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, Error> {
        let bytes: [u8; 32] = bytes.try_into().map_err(|_| {
            Error::MalformedInput(format!(
                "Ed25519 key must be {} bytes, got {}",
                Self::LENGTH,
                bytes.len()
            ))
        })?;

        VerifyingKey::from_bytes(&bytes)
            .map(Self)
            .map_err(|err| Error::MalformedInput(format!("Invalid Ed25519 key: {err}")))
    }

    /// Parses a key from its unpadded base64 form.
    pub fn from_base64(input: &str) -> Result<Self, Error> {
        Self::from_slice(&base64_decode(input)?)
    }

    /// Encodes the key as unpadded base64.
    pub fn to_base64(&self) -> String {
        base64_encode(self.as_bytes())
    }

    /// Verifies a signature over `message` made by the owner of this key.
    pub fn verify(&self, message: &[u8], signature: &Ed25519Signature) -> Result<(), Error> {
        self.0
            .verify_strict(message, &signature.0)
            .map_err(|err| Error::AuthenticationFailed(format!("Invalid signature: {err}")))
    }
}

impl fmt::Debug for Ed25519PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ed25519PublicKey({})", self.to_base64())
    }
}

/// An Ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Ed25519Signature(Signature);

impl Ed25519Signature {
    /// Length of a signature in bytes.
    pub const LENGTH: usize = 64;

    /// Returns the raw signature bytes.
    pub fn to_bytes(&self) -> [u8; 64] {
        self.0.to_bytes()
    }

    /// Parses a signature from a slice, which must be exactly 64 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, Error> {
        let bytes: [u8; 64] = bytes.try_into().map_err(|_| {
            Error::MalformedInput(format!(
                "Ed25519 signature must be {} bytes, got {}",
                Self::LENGTH,
                bytes.len()
            ))
        })?;

        Ok(Self(Signature::from_bytes(&bytes)))
    }

    /// Parses a signature from its unpadded base64 form.
    pub fn from_base64(input: &str) -> Result<Self, Error> {
        Self::from_slice(&base64_decode(input)?)
    }

    /// Encodes the signature as unpadded base64.
    pub fn to_base64(&self) -> String {
        base64_encode(self.to_bytes())
    }
}

impl fmt::Debug for Ed25519Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ed25519Signature({})", self.to_base64())
    }
}

/// Secret half of an Ed25519 pair.
///
/// Keys created here are seeds. Keys migrated from libolm only exist in the
/// expanded (hashed and clamped) form, which can still sign but has no seed.
#[derive(Clone)]
pub(crate) enum Ed25519SecretKey {
    Seed(Box<SigningKey>),
    Expanded(Box<Zeroizing<[u8; 64]>>),
}

/// An Ed25519 signing key pair.
#[derive(Clone)]
pub struct Ed25519Keypair {
    secret_key: Ed25519SecretKey,
    public_key: Ed25519PublicKey,
}

impl Ed25519Keypair {
    /// Generates a fresh random key pair.
    pub fn new() -> Self {
        let mut seed = random_bytes::<32>();
        let signing_key = Box::new(SigningKey::from_bytes(&seed));
        seed.zeroize();
        let public_key = Ed25519PublicKey(signing_key.verifying_key());

        Self {
            secret_key: Ed25519SecretKey::Seed(signing_key),
            public_key,
        }
    }

    pub(crate) fn from_seed(seed: &[u8]) -> Result<Self, Error> {
        let seed: Zeroizing<[u8; 32]> = Zeroizing::new(seed.try_into().map_err(|_| {
            Error::MalformedInput(format!(
                "Ed25519 seed must be 32 bytes, got {}",
                seed.len()
            ))
        })?);
        let signing_key = Box::new(SigningKey::from_bytes(&seed));
        let public_key = Ed25519PublicKey(signing_key.verifying_key());

        Ok(Self {
            secret_key: Ed25519SecretKey::Seed(signing_key),
            public_key,
        })
    }

    /// Restores a pair from a libolm-style expanded secret and its public key.
    pub(crate) fn from_expanded(
        expanded: &[u8],
        public_key: Ed25519PublicKey,
    ) -> Result<Self, Error> {
        let mut key = Box::new(Zeroizing::new([0u8; 64]));
        if expanded.len() != key.len() {
            return Err(Error::MalformedInput(format!(
                "Expanded Ed25519 key must be 64 bytes, got {}",
                expanded.len()
            )));
        }
        key.copy_from_slice(expanded);

        Ok(Self {
            secret_key: Ed25519SecretKey::Expanded(key),
            public_key,
        })
    }

    /// Returns the public half of the pair.
    pub fn public_key(&self) -> Ed25519PublicKey {
        self.public_key
    }

    /// Signs `message`.
    pub fn sign(&self, message: &[u8]) -> Ed25519Signature {
        match &self.secret_key {
            Ed25519SecretKey::Seed(signing_key) => Ed25519Signature(signing_key.sign(message)),
            Ed25519SecretKey::Expanded(bytes) => {
                let expanded = ExpandedSecretKey::from_bytes(bytes);
                Ed25519Signature(raw_sign::<Sha512>(&expanded, message, &self.public_key.0))
            }
        }
    }

    /// The secret bytes and whether they are in expanded form.
    pub(crate) fn secret_bytes(&self) -> (Zeroizing<Vec<u8>>, bool) {
        match &self.secret_key {
            Ed25519SecretKey::Seed(signing_key) => {
                (Zeroizing::new(signing_key.to_bytes().to_vec()), false)
            }
            Ed25519SecretKey::Expanded(bytes) => (Zeroizing::new(bytes.to_vec()), true),
        }
    }
}

impl Default for Ed25519Keypair {
    fn default() -> Self {
        Self::new()
    }
}

/// Expands a seed the way libolm stores Ed25519 secrets.
#[cfg(test)]
pub(crate) fn expand_seed(seed: &[u8; 32]) -> [u8; 64] {
    use sha2::Digest;

    let mut expanded = [0u8; 64];
    expanded.copy_from_slice(&Sha512::digest(seed));
    expanded[0] &= 248;
    expanded[31] &= 127;
    expanded[31] |= 64;
    expanded
}
