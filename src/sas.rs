//! Short authentication strings for interactive device verification.
//!
//! Both devices create a [`Sas`], swap public keys out of band, and derive the
//! same [`SasBytes`] from the shared secret. Users compare the emoji or decimal
//! rendering of those bytes. Afterwards each device sends a [`Mac`] over its
//! keys, which the other side checks with [`EstablishedSas::verify_mac`].

use crate::cipher::{hkdf_sha256, hmac_sha256};
use crate::encoding::{base64_decode, base64_encode};
use crate::types::{Curve25519Keypair, Curve25519PublicKey, contributory_dh};
use crate::Error;
use hkdf::Hkdf;
use hmac::Mac as _;
use sha2::Sha256;
use std::fmt;
use x25519_dalek::SharedSecret;
use zeroize::Zeroizing;

const SAS_BYTES_LENGTH: usize = 6;
const BASE64_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// A SAS verification before the other device's public key is known.
pub struct Sas {
    keypair: Curve25519Keypair,
}

impl Sas {
    /// Creates a verification object with a fresh ephemeral key.
    pub fn new() -> Self {
        Self {
            keypair: Curve25519Keypair::new(),
        }
    }

    /// Our ephemeral public key, to be sent to the other device.
    pub fn public_key(&self) -> Curve25519PublicKey {
        self.keypair.public_key()
    }

    /// Completes the key agreement. The ephemeral key cannot be used again.
    pub fn diffie_hellman(self, their_public_key: Curve25519PublicKey) -> Result<EstablishedSas, Error> {
        let shared_secret = contributory_dh(self.keypair.secret_key(), &their_public_key)
            .inspect_err(|err| tracing::warn!(%their_public_key, %err, "Rejected SAS public key"))?;

        Ok(EstablishedSas {
            shared_secret: Box::new(shared_secret),
            our_public_key: self.keypair.public_key(),
            their_public_key,
        })
    }

    /// Completes the key agreement with a base64 encoded public key.
    pub fn diffie_hellman_with_raw(self, their_public_key: &str) -> Result<EstablishedSas, Error> {
        let their_public_key = Curve25519PublicKey::from_base64(their_public_key)?;
        self.diffie_hellman(their_public_key)
    }
}

impl Default for Sas {
    fn default() -> Self {
        Self::new()
    }
}

/// A SAS verification after the key agreement.
pub struct EstablishedSas {
    shared_secret: Box<SharedSecret>,
    our_public_key: Curve25519PublicKey,
    their_public_key: Curve25519PublicKey,
}

impl EstablishedSas {
    /// Derives the six bytes users compare, bound to `info`.
    pub fn bytes(&self, info: &str) -> SasBytes {
        let bytes = hkdf_sha256::<SAS_BYTES_LENGTH>(
            None,
            self.shared_secret.as_bytes(),
            info.as_bytes(),
        );

        SasBytes { bytes: *bytes }
    }

    /// Derives `count` bytes bound to `info`, for other short-string encodings.
    pub fn bytes_raw(&self, info: &str, count: usize) -> Result<Vec<u8>, Error> {
        let hkdf = Hkdf::<Sha256>::new(None, self.shared_secret.as_bytes());
        let mut output = vec![0u8; count];

        hkdf.expand(info.as_bytes(), &mut output).map_err(|_| {
            Error::MalformedInput(format!(
                "Cannot derive {count} SAS bytes, HKDF-SHA-256 yields at most 8160"
            ))
        })?;

        Ok(output)
    }

    // Same HKDF as `bytes`, so for one info string the SAS bytes are a prefix
    // of the MAC key. Other clients derive both this way; callers keep them
    // apart with distinct info strings.
    fn mac_key(&self, info: &str) -> Zeroizing<[u8; 32]> {
        hkdf_sha256::<32>(None, self.shared_secret.as_bytes(), info.as_bytes())
    }

    /// Computes a MAC over `input` with a key bound to `info`.
    pub fn calculate_mac(&self, input: &str, info: &str) -> Mac {
        let key = self.mac_key(info);
        let mut mac = hmac_sha256(&key);
        mac.update(input.as_bytes());

        let mut tag = [0u8; 32];
        tag.copy_from_slice(&mac.finalize().into_bytes());
        Mac(tag)
    }

    /// Computes a MAC the way libolm encoded it, for peers that still expect it.
    ///
    /// libolm base64 encoded the HMAC into the buffer holding it, so the
    /// string differs from [`Mac::to_base64`] after its first four characters.
    /// The result cannot be parsed back into a [`Mac`].
    pub fn calculate_mac_invalid_base64(&self, input: &str, info: &str) -> String {
        libolm_in_place_base64(self.calculate_mac(input, info).as_bytes())
    }

    /// Checks a MAC from the other device in constant time.
    pub fn verify_mac(&self, input: &str, info: &str, tag: &Mac) -> bool {
        let key = self.mac_key(info);
        let mut mac = hmac_sha256(&key);
        mac.update(input.as_bytes());

        let verified = mac.verify_slice(&tag.0).is_ok();
        if !verified {
            tracing::debug!(info, "SAS MAC mismatch");
        }

        verified
    }

    /// Our ephemeral public key.
    pub fn our_public_key(&self) -> Curve25519PublicKey {
        self.our_public_key
    }

    /// The other device's ephemeral public key.
    pub fn their_public_key(&self) -> Curve25519PublicKey {
        self.their_public_key
    }
}

impl fmt::Debug for EstablishedSas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EstablishedSas")
            .field("our_public_key", &self.our_public_key)
            .field("their_public_key", &self.their_public_key)
            .finish_non_exhaustive()
    }
}

/// Replays libolm's base64 encoder running with its input and output in one
/// buffer. Each group of three bytes is read after earlier groups overwrote it.
fn libolm_in_place_base64(mac: &[u8; 32]) -> String {
    let mut buffer = [0u8; 43];
    buffer[..32].copy_from_slice(mac);
    let encode = |value: u32| BASE64_ALPHABET[(value & 63) as usize];

    let mut output = 0;
    for input in (0..30).step_by(3) {
        let value = (u32::from(buffer[input]) << 16)
            | (u32::from(buffer[input + 1]) << 8)
            | u32::from(buffer[input + 2]);

        for (offset, shift) in [18, 12, 6, 0].into_iter().enumerate() {
            buffer[output + offset] = encode(value >> shift);
        }
        output += 4;
    }

    let value = ((u32::from(buffer[30]) << 8) | u32::from(buffer[31])) << 2;
    buffer[output] = encode(value >> 12);
    buffer[output + 1] = encode(value >> 6);
    buffer[output + 2] = encode(value);

    buffer.iter().map(|&byte| char::from(byte)).collect()
}

/// The short authentication string, before it is rendered for display.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SasBytes {
    bytes: [u8; SAS_BYTES_LENGTH],
}

impl SasBytes {
    fn as_number(&self) -> u64 {
        self.bytes
            .iter()
            .fold(0u64, |number, byte| (number << 8) | u64::from(*byte))
    }

    /// Seven indices into the 64-entry SAS emoji table, one per 6 bits.
    pub fn emoji_indices(&self) -> [u8; 7] {
        let number = self.as_number();
        let mut indices = [0u8; 7];

        for (index, shift) in indices.iter_mut().zip((6..=42).rev().step_by(6)) {
            *index = ((number >> shift) & 63) as u8;
        }

        indices
    }

    /// Three numbers between 1000 and 9191, one per 13 bits.
    pub fn decimals(&self) -> (u16, u16, u16) {
        let number = self.as_number();
        let group = |shift: u32| ((number >> shift) & 0x1FFF) as u16 + 1000;

        (group(35), group(22), group(9))
    }

    /// The raw bytes.
    pub fn as_bytes(&self) -> &[u8; SAS_BYTES_LENGTH] {
        &self.bytes
    }
}

/// A SAS message authentication code.
#[derive(Clone, PartialEq, Eq)]
pub struct Mac([u8; 32]);

impl Mac {
    /// Length of a MAC in bytes.
    pub const LENGTH: usize = 32;

    /// The raw MAC bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parses a MAC from its raw bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, Error> {
        let bytes: [u8; 32] = bytes.try_into().map_err(|_| {
            Error::MalformedInput(format!("MAC must be 32 bytes, got {}", bytes.len()))
        })?;

        Ok(Self(bytes))
    }

    /// Parses a base64 encoded MAC.
    pub fn from_base64(input: &str) -> Result<Self, Error> {
        Self::from_slice(&base64_decode(input)?)
    }

    /// Encodes the MAC as unpadded base64.
    pub fn to_base64(&self) -> String {
        base64_encode(self.0)
    }
}

impl fmt::Debug for Mac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mac({})", self.to_base64())
    }
}
