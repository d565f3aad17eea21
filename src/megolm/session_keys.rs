use crate::Error;
use crate::encoding::{base64_decode, base64_encode};
use crate::megolm::MegolmRatchet;
use crate::types::{Ed25519Keypair, Ed25519PublicKey, Ed25519Signature};
use zeroize::Zeroizing;

const SESSION_KEY_VERSION: u8 = 2;
const EXPORTED_SESSION_KEY_VERSION: u8 = 1;

const RATCHET_OFFSET: usize = 5;
const SIGNING_KEY_OFFSET: usize = RATCHET_OFFSET + 128;
const EXPORTED_LENGTH: usize = SIGNING_KEY_OFFSET + Ed25519PublicKey::LENGTH;
const SESSION_KEY_LENGTH: usize = EXPORTED_LENGTH + Ed25519Signature::LENGTH;

/// `version || u32 index || ratchet || signing key`
fn encode(version: u8, ratchet: &MegolmRatchet, signing_key: &Ed25519PublicKey) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(SESSION_KEY_LENGTH);
    bytes.push(version);
    bytes.extend_from_slice(&ratchet.index().to_be_bytes());
    bytes.extend_from_slice(ratchet.as_bytes());
    bytes.extend_from_slice(signing_key.as_bytes());
    bytes
}

fn decode(
    bytes: &[u8],
    version: u8,
    length: usize,
) -> Result<(MegolmRatchet, Ed25519PublicKey), Error> {
    if bytes.len() != length {
        return Err(Error::MalformedInput(format!(
            "Session key must be {length} bytes, got {}",
            bytes.len()
        )));
    }
    if bytes[0] != version {
        return Err(Error::MalformedInput(format!(
            "Unsupported session key version: {}",
            bytes[0]
        )));
    }

    let mut index = [0u8; 4];
    index.copy_from_slice(&bytes[1..RATCHET_OFFSET]);
    let mut parts = Zeroizing::new([0u8; 128]);
    parts.copy_from_slice(&bytes[RATCHET_OFFSET..SIGNING_KEY_OFFSET]);

    let ratchet = MegolmRatchet::from_parts(&parts, u32::from_be_bytes(index));
    let signing_key = Ed25519PublicKey::from_slice(&bytes[SIGNING_KEY_OFFSET..EXPORTED_LENGTH])?;

    Ok((ratchet, signing_key))
}

/// The key an outbound group session hands to its recipients.
///
/// It carries the ratchet state at the current index and is signed by the
/// session's Ed25519 key, so recipients know the key came from the sender.
#[derive(Clone)]
pub struct SessionKey {
    pub(crate) ratchet: MegolmRatchet,
    pub(crate) signing_key: Ed25519PublicKey,
    signature: Ed25519Signature,
}

impl SessionKey {
    pub(crate) fn new(ratchet: &MegolmRatchet, signing_key: &Ed25519Keypair) -> Self {
        let public_key = signing_key.public_key();
        let unsigned = Zeroizing::new(encode(SESSION_KEY_VERSION, ratchet, &public_key));

        Self {
            ratchet: ratchet.clone(),
            signing_key: public_key,
            signature: signing_key.sign(&unsigned),
        }
    }

    /// The index of the first message this key can decrypt.
    pub fn index(&self) -> u32 {
        self.ratchet.index()
    }

    /// Serializes the key. The result holds secret material.
    pub fn to_bytes(&self) -> Zeroizing<Vec<u8>> {
        let mut bytes = Zeroizing::new(encode(
            SESSION_KEY_VERSION,
            &self.ratchet,
            &self.signing_key,
        ));
        bytes.extend_from_slice(&self.signature.to_bytes());
        bytes
    }

    /// Parses a key and verifies its signature.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let (ratchet, signing_key) = decode(bytes, SESSION_KEY_VERSION, SESSION_KEY_LENGTH)?;
        let signature = Ed25519Signature::from_slice(&bytes[EXPORTED_LENGTH..])?;
        signing_key.verify(&bytes[..EXPORTED_LENGTH], &signature)?;

        Ok(Self {
            ratchet,
            signing_key,
            signature,
        })
    }

    /// Encodes the key as unpadded base64.
    pub fn to_base64(&self) -> String {
        base64_encode(self.to_bytes().as_slice())
    }

    /// Parses a base64 key and verifies its signature.
    pub fn from_base64(input: &str) -> Result<Self, Error> {
        let bytes = Zeroizing::new(base64_decode(input)?);
        Self::from_bytes(&bytes)
    }
}

/// An unsigned snapshot of an inbound group session at some index.
#[derive(Clone)]
pub struct ExportedSessionKey {
    pub(crate) ratchet: MegolmRatchet,
    pub(crate) signing_key: Ed25519PublicKey,
}

impl ExportedSessionKey {
    pub(crate) fn new(ratchet: &MegolmRatchet, signing_key: Ed25519PublicKey) -> Self {
        Self {
            ratchet: ratchet.clone(),
            signing_key,
        }
    }

    /// The index of the first message this export can decrypt.
    pub fn index(&self) -> u32 {
        self.ratchet.index()
    }

    /// Serializes the export. The result holds secret material.
    pub fn to_bytes(&self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(encode(
            EXPORTED_SESSION_KEY_VERSION,
            &self.ratchet,
            &self.signing_key,
        ))
    }

    /// Parses an export.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let (ratchet, signing_key) =
            decode(bytes, EXPORTED_SESSION_KEY_VERSION, EXPORTED_LENGTH)?;

        Ok(Self {
            ratchet,
            signing_key,
        })
    }

    /// Encodes the export as unpadded base64.
    pub fn to_base64(&self) -> String {
        base64_encode(self.to_bytes().as_slice())
    }

    /// Parses a base64 export.
    pub fn from_base64(input: &str) -> Result<Self, Error> {
        let bytes = Zeroizing::new(base64_decode(input)?);
        Self::from_bytes(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_key_layout() {
        let signing_key = Ed25519Keypair::new();
        let key = SessionKey::new(&MegolmRatchet::new(), &signing_key);
        let bytes = key.to_bytes();

        assert_eq!(bytes.len(), 229);
        assert_eq!(bytes[0], 2);
        assert_eq!(&bytes[1..5], &[0, 0, 0, 0]);
        assert_eq!(&bytes[133..165], signing_key.public_key().as_bytes());
    }

    #[test]
    fn test_session_key_signature_is_checked() {
        let key = SessionKey::new(&MegolmRatchet::new(), &Ed25519Keypair::new());
        let parsed = SessionKey::from_base64(&key.to_base64()).unwrap();
        assert_eq!(parsed.index(), 0);

        let mut bytes = key.to_bytes();
        bytes[10] ^= 1;
        assert!(matches!(
            SessionKey::from_bytes(&bytes),
            Err(Error::AuthenticationFailed(_))
        ));
    }

    #[test]
    fn test_exported_key_layout() {
        let mut ratchet = MegolmRatchet::new();
        ratchet.advance_to(10);
        let export = ExportedSessionKey::new(&ratchet, Ed25519Keypair::new().public_key());
        let bytes = export.to_bytes();

        assert_eq!(bytes.len(), 165);
        assert_eq!(bytes[0], 1);
        assert_eq!(
            ExportedSessionKey::from_base64(&export.to_base64())
                .unwrap()
                .index(),
            10
        );
    }

    #[test]
    fn test_kinds_are_not_interchangeable() {
        let key = SessionKey::new(&MegolmRatchet::new(), &Ed25519Keypair::new());
        let export = ExportedSessionKey::new(&key.ratchet, key.signing_key);

        assert!(matches!(
            ExportedSessionKey::from_bytes(&key.to_bytes()),
            Err(Error::MalformedInput(_))
        ));
        assert!(matches!(
            SessionKey::from_bytes(&export.to_bytes()),
            Err(Error::MalformedInput(_))
        ));
    }
}
