use crate::encoding::{base64_decode, base64_encode};
use crate::types::Curve25519PublicKey;
use crate::{Error, SessionConfig};
use prost::Message as _;
use sha2::{Digest, Sha256};
use std::fmt;

const PRE_KEY_MESSAGE_VERSION: u8 = 3;

#[derive(Clone, PartialEq, prost::Message)]
struct MessageBody {
    #[prost(bytes = "vec", tag = "1")]
    ratchet_key: Vec<u8>,
    #[prost(uint64, optional, tag = "2")]
    chain_index: Option<u64>,
    #[prost(bytes = "vec", tag = "4")]
    ciphertext: Vec<u8>,
}

#[derive(Clone, PartialEq, prost::Message)]
struct PreKeyMessageBody {
    #[prost(bytes = "vec", tag = "1")]
    one_time_key: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    base_key: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    identity_key: Vec<u8>,
    #[prost(bytes = "vec", tag = "4")]
    message: Vec<u8>,
}

/// Wire type of an [`OlmMessage`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// A message that can establish a new session.
    PreKey = 0,
    /// A message within an established session.
    Normal = 1,
}

impl TryFrom<usize> for MessageType {
    type Error = Error;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::PreKey),
            1 => Ok(Self::Normal),
            _ => Err(Error::MalformedInput(format!(
                "Unknown Olm message type: {value}"
            ))),
        }
    }
}

impl From<MessageType> for usize {
    fn from(value: MessageType) -> Self {
        value as usize
    }
}

/// The three public keys a session was established with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionKeys {
    /// Curve25519 identity key of the session initiator.
    pub identity_key: Curve25519PublicKey,
    /// Ephemeral base key generated by the initiator.
    pub base_key: Curve25519PublicKey,
    /// The recipient's one-time or fallback key that was claimed.
    pub one_time_key: Curve25519PublicKey,
}

impl SessionKeys {
    /// Unpadded base64 SHA-256 of the identity, base and one-time keys.
    pub fn session_id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.identity_key.as_bytes());
        hasher.update(self.base_key.as_bytes());
        hasher.update(self.one_time_key.as_bytes());

        base64_encode(hasher.finalize())
    }
}

/// A message within an established Olm session.
///
/// Wire format: `version || protobuf(ratchet_key, chain_index, ciphertext) || mac`.
#[derive(Clone, PartialEq, Eq)]
pub struct Message {
    version: u8,
    ratchet_key: Curve25519PublicKey,
    chain_index: u32,
    ciphertext: Vec<u8>,
    /// `version || protobuf` exactly as sent or received, the MAC input.
    body: Vec<u8>,
    pub(crate) mac: Vec<u8>,
}

impl Message {
    /// An unauthenticated message; the caller fills in the MAC.
    pub(crate) fn new(
        config: &SessionConfig,
        ratchet_key: Curve25519PublicKey,
        chain_index: u32,
        ciphertext: Vec<u8>,
    ) -> Self {
        let version = config.message_version();
        let body = MessageBody {
            ratchet_key: ratchet_key.to_bytes().to_vec(),
            chain_index: Some(u64::from(chain_index)),
            ciphertext: ciphertext.clone(),
        };

        let mut encoded = Vec::with_capacity(1 + body.encoded_len());
        encoded.push(version);
        body.encode_raw(&mut encoded);

        Self {
            version,
            ratchet_key,
            chain_index,
            ciphertext,
            body: encoded,
            mac: Vec::new(),
        }
    }

    /// The sender's current ratchet key.
    pub fn ratchet_key(&self) -> Curve25519PublicKey {
        self.ratchet_key
    }

    /// Position of the message in the sender's chain.
    pub fn chain_index(&self) -> u32 {
        self.chain_index
    }

    /// The raw AES-CBC ciphertext.
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    /// Whether the message carries a truncated, libolm-compatible MAC.
    pub fn mac_truncated(&self) -> bool {
        self.version == SessionConfig::version_1().message_version()
    }

    pub(crate) fn mac(&self) -> &[u8] {
        &self.mac
    }

    pub(crate) fn session_config(&self) -> SessionConfig {
        if self.mac_truncated() {
            SessionConfig::version_1()
        } else {
            SessionConfig::version_2()
        }
    }

    /// The bytes covered by the MAC.
    pub(crate) fn authenticated_bytes(&self) -> &[u8] {
        &self.body
    }

    /// Serializes the message for transport.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.body.len() + self.mac.len());
        bytes.extend_from_slice(&self.body);
        bytes.extend_from_slice(&self.mac);
        bytes
    }

    /// Parses a message. The MAC is checked only on decryption.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let (&version, _) = bytes
            .split_first()
            .ok_or_else(|| Error::MalformedInput("Empty Olm message".to_string()))?;

        let config = SessionConfig::from_message_version(version).ok_or_else(|| {
            Error::MalformedInput(format!("Unsupported Olm message version: {version}"))
        })?;

        if bytes.len() < 1 + config.mac_length() {
            return Err(Error::MalformedInput("Olm message is too short".to_string()));
        }

        let (body, mac) = bytes.split_at(bytes.len() - config.mac_length());
        let decoded = MessageBody::decode(&body[1..])?;

        let chain_index = decoded
            .chain_index
            .ok_or_else(|| Error::MalformedInput("Olm message has no chain index".to_string()))?;
        let chain_index = u32::try_from(chain_index).map_err(|_| {
            Error::MalformedInput(format!("Chain index {chain_index} is out of range"))
        })?;

        if decoded.ciphertext.is_empty() {
            return Err(Error::MalformedInput(
                "Olm message has no ciphertext".to_string(),
            ));
        }

        Ok(Self {
            version,
            ratchet_key: Curve25519PublicKey::from_slice(&decoded.ratchet_key)?,
            chain_index,
            ciphertext: decoded.ciphertext,
            body: body.to_vec(),
            mac: mac.to_vec(),
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
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("version", &self.version)
            .field("ratchet_key", &self.ratchet_key)
            .field("chain_index", &self.chain_index)
            .finish_non_exhaustive()
    }
}

/// A message that carries the keys needed to establish a session.
///
/// Sent by the initiator until it has received a reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreKeyMessage {
    pub(crate) session_keys: SessionKeys,
    pub(crate) message: Message,
}

impl PreKeyMessage {
    pub(crate) fn new(session_keys: SessionKeys, message: Message) -> Self {
        Self {
            session_keys,
            message,
        }
    }

    /// The recipient's one-time or fallback key this message claims.
    pub fn one_time_key(&self) -> Curve25519PublicKey {
        self.session_keys.one_time_key
    }

    /// The initiator's ephemeral base key.
    pub fn base_key(&self) -> Curve25519PublicKey {
        self.session_keys.base_key
    }

    /// The initiator's Curve25519 identity key.
    pub fn identity_key(&self) -> Curve25519PublicKey {
        self.session_keys.identity_key
    }

    /// All three session keys.
    pub fn session_keys(&self) -> SessionKeys {
        self.session_keys
    }

    /// Identifier of the session this message belongs to.
    pub fn session_id(&self) -> String {
        self.session_keys.session_id()
    }

    /// The embedded normal message.
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Serializes the message for transport.
    pub fn to_bytes(&self) -> Vec<u8> {
        let body = PreKeyMessageBody {
            one_time_key: self.session_keys.one_time_key.to_bytes().to_vec(),
            base_key: self.session_keys.base_key.to_bytes().to_vec(),
            identity_key: self.session_keys.identity_key.to_bytes().to_vec(),
            message: self.message.to_bytes(),
        };

        let mut bytes = Vec::with_capacity(1 + body.encoded_len());
        bytes.push(PRE_KEY_MESSAGE_VERSION);
        body.encode_raw(&mut bytes);
        bytes
    }

    /// Parses a pre-key message and its embedded message.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let (&version, body) = bytes
            .split_first()
            .ok_or_else(|| Error::MalformedInput("Empty pre-key message".to_string()))?;

        if version != PRE_KEY_MESSAGE_VERSION {
            return Err(Error::MalformedInput(format!(
                "Unsupported pre-key message version: {version}"
            )));
        }

        let decoded = PreKeyMessageBody::decode(body)?;
        let session_keys = SessionKeys {
            identity_key: Curve25519PublicKey::from_slice(&decoded.identity_key)?,
            base_key: Curve25519PublicKey::from_slice(&decoded.base_key)?,
            one_time_key: Curve25519PublicKey::from_slice(&decoded.one_time_key)?,
        };

        Ok(Self {
            session_keys,
            message: Message::from_bytes(&decoded.message)?,
        })
    }

    /// Encodes the message as unpadded base64.
    pub fn to_base64(&self) -> String {
        base64_encode(self.to_bytes())
    }

    /// Parses a pre-key message from unpadded base64.
    pub fn from_base64(input: &str) -> Result<Self, Error> {
        Self::from_bytes(&base64_decode(input)?)
    }
}

/// Either kind of Olm message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OlmMessage {
    /// A message within an established session.
    Normal(Message),
    /// A message that can establish a session.
    PreKey(PreKeyMessage),
}

impl OlmMessage {
    /// Builds a message from its type tag and base64 body.
    pub fn from_parts(message_type: usize, body: &str) -> Result<Self, Error> {
        match MessageType::try_from(message_type)? {
            MessageType::PreKey => Ok(Self::PreKey(PreKeyMessage::from_base64(body)?)),
            MessageType::Normal => Ok(Self::Normal(Message::from_base64(body)?)),
        }
    }

    /// Splits the message into its type tag and base64 body.
    pub fn to_parts(&self) -> (usize, String) {
        (self.message_type().into(), self.to_base64())
    }

    /// The wire type.
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Normal(_) => MessageType::Normal,
            Self::PreKey(_) => MessageType::PreKey,
        }
    }

    /// Serializes the message body.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Normal(message) => message.to_bytes(),
            Self::PreKey(message) => message.to_bytes(),
        }
    }

    /// Encodes the message body as unpadded base64.
    pub fn to_base64(&self) -> String {
        base64_encode(self.to_bytes())
    }
}

impl From<Message> for OlmMessage {
    fn from(message: Message) -> Self {
        Self::Normal(message)
    }
}

impl From<PreKeyMessage> for OlmMessage {
    fn from(message: PreKeyMessage) -> Self {
        Self::PreKey(message)
    }
}
