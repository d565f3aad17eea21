use crate::encoding::{base64_decode, base64_encode};
use crate::types::random_bytes;
use crate::Error;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use x25519_dalek::{PublicKey, SharedSecret, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// A Curve25519 public key, used for identity keys, pre-keys and ratchet keys.
#[derive(Clone, Copy)]
pub struct Curve25519PublicKey(PublicKey);

impl Curve25519PublicKey {
    /// Length of the key in bytes.
    pub const LENGTH: usize = 32;

    /// Returns the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    /// Returns a copy of the raw key bytes.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    /// Parses a key from a slice, which must be exactly 32 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, Error> {
        let bytes: [u8; 32] = bytes.try_into().map_err(|_| {
            Error::MalformedInput(format!(
                "Curve25519 key must be {} bytes, got {}",
                Self::LENGTH,
                bytes.len()
            ))
        })?;

        Ok(Self::from(bytes))
    }

    /// Parses a key from its unpadded base64 form.
    pub fn from_base64(input: &str) -> Result<Self, Error> {
        Self::from_slice(&base64_decode(input)?)
    }

    /// Encodes the key as unpadded base64.
    pub fn to_base64(&self) -> String {
        base64_encode(self.as_bytes())
    }
}

impl From<[u8; 32]> for Curve25519PublicKey {
    fn from(bytes: [u8; 32]) -> Self {
        Self(PublicKey::from(bytes))
    }
}

impl From<&Curve25519SecretKey> for Curve25519PublicKey {
    fn from(secret: &Curve25519SecretKey) -> Self {
        Self(PublicKey::from(&*secret.0))
    }
}

impl AsRef<PublicKey> for Curve25519PublicKey {
    fn as_ref(&self) -> &PublicKey {
        &self.0
    }
}

impl PartialEq for Curve25519PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for Curve25519PublicKey {}

impl Hash for Curve25519PublicKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_bytes().hash(state);
    }
}

impl PartialOrd for Curve25519PublicKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Curve25519PublicKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_bytes().cmp(other.as_bytes())
    }
}

impl fmt::Debug for Curve25519PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Curve25519PublicKey({})", self.to_base64())
    }
}

impl fmt::Display for Curve25519PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

/// The secret half of a Curve25519 key pair. Wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Curve25519SecretKey(Box<StaticSecret>);

impl Curve25519SecretKey {
    /// Generates a fresh random secret key.
    pub fn new() -> Self {
        Self::from(random_bytes::<32>())
    }

    pub(crate) fn diffie_hellman(&self, public_key: &Curve25519PublicKey) -> SharedSecret {
        self.0.diffie_hellman(public_key.as_ref())
    }

    pub(crate) fn to_bytes(&self) -> Box<Zeroizing<[u8; 32]>> {
        Box::new(Zeroizing::new(self.0.to_bytes()))
    }

    pub(crate) fn from_slice(bytes: &[u8]) -> Result<Self, Error> {
        let mut key = Box::new([0u8; 32]);
        if bytes.len() != key.len() {
            return Err(Error::MalformedInput(format!(
                "Curve25519 secret key must be 32 bytes, got {}",
                bytes.len()
            )));
        }
        key.copy_from_slice(bytes);

        Ok(Self::from(key))
    }
}

impl Default for Curve25519SecretKey {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Box<[u8; 32]>> for Curve25519SecretKey {
    fn from(mut bytes: Box<[u8; 32]>) -> Self {
        let secret = StaticSecret::from(*bytes);
        bytes.zeroize();
        Self(Box::new(secret))
    }
}

/// A Curve25519 key pair.
#[derive(Clone)]
pub struct Curve25519Keypair {
    pub(crate) secret_key: Curve25519SecretKey,
    pub(crate) public_key: Curve25519PublicKey,
}

impl Curve25519Keypair {
    /// Generates a fresh random key pair.
    pub fn new() -> Self {
        Self::from_secret_key(Curve25519SecretKey::new())
    }

    pub(crate) fn from_secret_key(secret_key: Curve25519SecretKey) -> Self {
        let public_key = Curve25519PublicKey::from(&secret_key);

        Self {
            secret_key,
            public_key,
        }
    }

    /// Returns the public half of the pair.
    pub fn public_key(&self) -> Curve25519PublicKey {
        self.public_key
    }

    pub(crate) fn secret_key(&self) -> &Curve25519SecretKey {
        &self.secret_key
    }
}

impl Default for Curve25519Keypair {
    fn default() -> Self {
        Self::new()
    }
}

/// Performs a Diffie-Hellman exchange, refusing low-order public keys.
pub(crate) fn contributory_dh(
    secret: &Curve25519SecretKey,
    public_key: &Curve25519PublicKey,
) -> Result<SharedSecret, Error> {
    let shared = secret.diffie_hellman(public_key);

    if shared.was_contributory() {
        Ok(shared)
    } else {
        Err(Error::ProtocolViolation(format!(
            "Non-contributory Diffie-Hellman with key {public_key}"
        )))
    }
}
