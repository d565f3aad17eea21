use crate::cipher::Cipher;
use crate::encoding::{base64_decode, base64_encode};
use crate::megolm::MegolmRatchet;
use crate::types::{Ed25519Keypair, Ed25519PublicKey, Ed25519Signature};
use crate::{Error, SessionConfig};
use prost::Message as _;

#[derive(Clone, PartialEq, prost::Message)]
struct MegolmMessageBody {
    #[prost(uint32, optional, tag = "1")]
    message_index: Option<u32>,
    #[prost(bytes = "vec", tag = "2")]
    ciphertext: Vec<u8>,
}

fn encode_body(version: u8, message_index: u32, ciphertext: &[u8]) -> Vec<u8> {
    let body = MegolmMessageBody {
        message_index: Some(message_index),
        ciphertext: ciphertext.to_vec(),
    };

    let mut bytes = Vec::with_capacity(1 + body.encoded_len());
    bytes.push(version);
    body.encode_raw(&mut bytes);
    bytes
}

/// An encrypted Megolm group message.
///
/// Wire format: `version || protobuf(index, ciphertext) || mac || signature`.
/// The MAC covers everything before it and the Ed25519 signature covers
/// everything before the signature.
#[derive(Clone, PartialEq, Eq)]
pub struct MegolmMessage {
    version: u8,
    message_index: u32,
    ciphertext: Vec<u8>,
    /// `version || protobuf` exactly as sent or received.
    body: Vec<u8>,
    mac: Vec<u8>,
    signature: Ed25519Signature,
}

impl MegolmMessage {
    /// Encrypts `plaintext` with the ratchet's current state and signs it.
    pub(crate) fn encrypt(
        ratchet: &MegolmRatchet,
        signing_key: &Ed25519Keypair,
        config: &SessionConfig,
        plaintext: &[u8],
    ) -> Self {
        let cipher = Cipher::new_megolm(ratchet.as_bytes());
        let version = config.message_version();
        let ciphertext = cipher.encrypt(plaintext);

        let body = encode_body(version, ratchet.index(), &ciphertext);
        let mac = cipher.mac(&body)[..config.mac_length()].to_vec();

        let mut signed = body.clone();
        signed.extend_from_slice(&mac);
        let signature = signing_key.sign(&signed);

        Self {
            version,
            message_index: ratchet.index(),
            ciphertext,
            body,
            mac,
            signature,
        }
    }

    /// The ratchet index this message was encrypted at.
    pub fn message_index(&self) -> u32 {
        self.message_index
    }

    /// The raw AES-CBC ciphertext.
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    /// Whether the message carries a truncated, libolm-compatible MAC.
    pub fn mac_truncated(&self) -> bool {
        self.version == SessionConfig::version_1().message_version()
    }

    /// The signature made by the group session's signing key.
    pub fn signature(&self) -> &Ed25519Signature {
        &self.signature
    }

    pub(crate) fn session_config(&self) -> SessionConfig {
        if self.mac_truncated() {
            SessionConfig::version_1()
        } else {
            SessionConfig::version_2()
        }
    }

    /// Serializes the message for transport.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = self.signed_bytes();
        bytes.extend_from_slice(&self.signature.to_bytes());
        bytes
    }

    fn signed_bytes(&self) -> Vec<u8> {
        let capacity = self.body.len() + self.mac.len() + Ed25519Signature::LENGTH;
        let mut bytes = Vec::with_capacity(capacity);
        bytes.extend_from_slice(&self.body);
        bytes.extend_from_slice(&self.mac);
        bytes
    }

    /// Parses a message. Authenticity is not checked here.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let (&version, _) = bytes
            .split_first()
            .ok_or_else(|| Error::MalformedInput("Empty Megolm message".to_string()))?;

        let config = SessionConfig::from_message_version(version).ok_or_else(|| {
            Error::MalformedInput(format!("Unsupported Megolm message version: {version}"))
        })?;

        let trailer = config.mac_length() + Ed25519Signature::LENGTH;
        if bytes.len() < 1 + trailer {
            return Err(Error::MalformedInput(
                "Megolm message is too short".to_string(),
            ));
        }

        let (body, rest) = bytes.split_at(bytes.len() - trailer);
        let (mac, signature) = rest.split_at(config.mac_length());
        let decoded = MegolmMessageBody::decode(&body[1..])?;

        let message_index = decoded.message_index.ok_or_else(|| {
            Error::MalformedInput("Megolm message has no message index".to_string())
        })?;

        Ok(Self {
            version,
            message_index,
            ciphertext: decoded.ciphertext,
            body: body.to_vec(),
            mac: mac.to_vec(),
            signature: Ed25519Signature::from_slice(signature)?,
        })
    }

    /// Encodes the message as unpadded base64.
    pub fn to_base64(&self) -> String {
        base64_encode(self.to_bytes())
    }

    /// Parses a message from unpadded base64.
    pub fn from_base64(input: &str) -> Result<Self, Error> {
        Self::from_bytes(&base64_decode(input)?)
    }

    pub(crate) fn verify_signature(&self, signing_key: &Ed25519PublicKey) -> Result<(), Error> {
        signing_key.verify(&self.signed_bytes(), &self.signature)
    }

    /// Checks the MAC and decrypts with the ratchet at this message's index.
    pub(crate) fn decrypt(&self, ratchet: &MegolmRatchet) -> Result<Vec<u8>, Error> {
        let cipher = Cipher::new_megolm(ratchet.as_bytes());
        cipher.verify_mac(&self.body, &self.mac)?;
        cipher.decrypt(&self.ciphertext)
    }
}

impl std::fmt::Debug for MegolmMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MegolmMessage")
            .field("version", &self.version)
            .field("message_index", &self.message_index)
            .finish_non_exhaustive()
    }
}
