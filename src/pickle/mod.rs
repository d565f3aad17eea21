//! Encrypted-at-rest serialization of accounts and sessions.
//!
//! The current format is
//! `base64(version || nonce || AES-256-GCM-SIV(protobuf state))`, keyed by a
//! 32 byte pickle key. The associated data binds the envelope version and the
//! kind of object, so an account pickle can never be opened as a session.
//!
//! The legacy format is libolm's; see [`libolm`].

pub(crate) mod libolm;

use crate::Error;
use crate::cipher::hkdf_sha256;
use crate::encoding::{base64_decode, base64_encode};
use crate::types::random_bytes;
use aes_gcm_siv::aead::{Aead, Payload};
use aes_gcm_siv::{Aes256GcmSiv, KeyInit, Nonce};
use prost::Message;
use zeroize::{Zeroize, Zeroizing};

/// Which serialization a pickle was produced with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PickleFormat {
    /// This crate's own format. Requires a 32 byte key.
    #[default]
    Current,
    /// The libolm format. Accepts a passphrase of any length, decode only.
    Legacy,
}

/// Required length of a current-format pickle key.
pub const PICKLE_KEY_LENGTH: usize = 32;

const PICKLE_VERSION: u8 = 1;
const NONCE_SIZE: usize = 12;
const TAG_SIZE: usize = 16;
const PICKLE_KEY_INFO: &[u8] = b"polyratchet-pickle";

fn check_key(key: &[u8]) -> Result<(), Error> {
    if key.len() == PICKLE_KEY_LENGTH {
        Ok(())
    } else {
        Err(Error::InvalidKeyLength {
            expected: PICKLE_KEY_LENGTH,
            actual: key.len(),
        })
    }
}

fn associated_data(kind: &str) -> Vec<u8> {
    let mut aad = Vec::with_capacity(1 + kind.len());
    aad.push(PICKLE_VERSION);
    aad.extend_from_slice(kind.as_bytes());
    aad
}

fn cipher(key: &[u8]) -> Aes256GcmSiv {
    let cipher_key = hkdf_sha256::<32>(None, key, PICKLE_KEY_INFO);
    Aes256GcmSiv::new(aes_gcm_siv::Key::<Aes256GcmSiv>::from_slice(cipher_key.as_slice()))
}

/// Encrypts serialized state of the given kind.
pub(crate) fn seal(kind: &str, plaintext: &[u8], key: &[u8]) -> Result<String, Error> {
    check_key(key)?;

    let nonce = random_bytes::<NONCE_SIZE>();
    let aad = associated_data(kind);
    let ciphertext = cipher(key).encrypt(
        Nonce::from_slice(nonce.as_slice()),
        Payload {
            msg: plaintext,
            aad: &aad,
        },
    )?;

    let mut envelope = Vec::with_capacity(1 + NONCE_SIZE + ciphertext.len());
    envelope.push(PICKLE_VERSION);
    envelope.extend_from_slice(nonce.as_slice());
    envelope.extend_from_slice(&ciphertext);

    Ok(base64_encode(envelope))
}

/// Decrypts a pickle of the given kind back into serialized state.
pub(crate) fn open(kind: &str, pickle: &str, key: &[u8]) -> Result<Zeroizing<Vec<u8>>, Error> {
    check_key(key)?;

    let envelope = base64_decode(pickle)?;
    if envelope.len() < 1 + NONCE_SIZE + TAG_SIZE {
        return Err(Error::MalformedInput("Pickle is too short".to_string()));
    }

    let (version, rest) = envelope.split_at(1);
    if version[0] != PICKLE_VERSION {
        return Err(Error::MalformedInput(format!(
            "Unsupported pickle version: {}",
            version[0]
        )));
    }

    let (nonce, ciphertext) = rest.split_at(NONCE_SIZE);
    let aad = associated_data(kind);
    let plaintext = cipher(key)
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad: &aad,
            },
        )
        .inspect_err(|_| tracing::warn!(kind, "Pickle failed to authenticate"))?;

    Ok(Zeroizing::new(plaintext))
}

/// Encodes a pickle schema, wipes it, and seals the bytes.
pub(crate) fn seal_message<M: Message + Zeroize>(
    kind: &str,
    mut message: M,
    key: &[u8],
) -> Result<String, Error> {
    let bytes = Zeroizing::new(message.encode_to_vec());
    message.zeroize();

    seal(kind, &bytes, key)
}

/// Opens a pickle and decodes its schema.
pub(crate) fn open_message<M: Message + Default>(
    kind: &str,
    pickle: &str,
    key: &[u8],
) -> Result<M, Error> {
    let bytes = open(kind, pickle, key)?;
    Ok(M::decode(bytes.as_slice())?)
}
