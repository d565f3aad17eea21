use crate::ratchet::{DoubleRatchet, Message, OlmMessage, PreKeyMessage, SessionKeys};
use crate::shared_secret::Shared3DHSecret;
use crate::types::Curve25519PublicKey;
use crate::{Error, SessionConfig};
use std::fmt;

/// A pairwise Olm session.
///
/// Wraps a double ratchet together with the keys the session was established
/// with. Until the initiator has decrypted a reply, every message it sends is a
/// [`PreKeyMessage`] so the responder can establish its side of the session.
pub struct Session {
    pub(crate) session_keys: SessionKeys,
    pub(crate) ratchet: DoubleRatchet,
    pub(crate) config: SessionConfig,
}

impl Session {
    pub(crate) fn new_outbound(
        shared_secret: Shared3DHSecret,
        session_keys: SessionKeys,
        config: SessionConfig,
    ) -> Self {
        let (root_key, chain_key) = shared_secret.expand();
        let session = Self {
            session_keys,
            ratchet: DoubleRatchet::for_alice(root_key, chain_key),
            config,
        };
        tracing::debug!(session_id = %session.session_id(), "Created outbound session");

        session
    }

    pub(crate) fn new_inbound(
        shared_secret: Shared3DHSecret,
        session_keys: SessionKeys,
        their_ratchet_key: Curve25519PublicKey,
        config: SessionConfig,
    ) -> Result<Self, Error> {
        let (root_key, chain_key) = shared_secret.expand();
        let session = Self {
            session_keys,
            ratchet: DoubleRatchet::for_bob(root_key, chain_key, their_ratchet_key)?,
            config,
        };
        tracing::debug!(session_id = %session.session_id(), "Created inbound session");

        Ok(session)
    }

    /// Stable identifier derived from the session keys.
    pub fn session_id(&self) -> String {
        self.session_keys.session_id()
    }

    /// The keys this session was established with.
    pub fn session_keys(&self) -> SessionKeys {
        self.session_keys
    }

    /// The session configuration.
    pub fn session_config(&self) -> SessionConfig {
        self.config
    }

    /// Whether any message from the other side has been decrypted.
    pub fn has_received_message(&self) -> bool {
        self.ratchet.has_received_message()
    }

    /// Encrypts `plaintext`, advancing the sending chain by one.
    pub fn encrypt(&mut self, plaintext: impl AsRef<[u8]>) -> OlmMessage {
        let message = self.ratchet.encrypt(&self.config, plaintext.as_ref());

        if self.has_received_message() {
            OlmMessage::Normal(message)
        } else {
            OlmMessage::PreKey(PreKeyMessage::new(self.session_keys, message))
        }
    }

    /// Decrypts a message. The session is left untouched on failure.
    pub fn decrypt(&mut self, message: &OlmMessage) -> Result<Vec<u8>, Error> {
        let message = match message {
            OlmMessage::Normal(message) => message,
            OlmMessage::PreKey(message) => &message.message,
        };

        self.decrypt_message(message)
            .inspect_err(|err| tracing::debug!(session_id = %self.session_id(), %err, "Failed to decrypt"))
    }

    pub(crate) fn decrypt_message(&mut self, message: &Message) -> Result<Vec<u8>, Error> {
        if message.session_config() != self.config {
            return Err(Error::AuthenticationFailed(
                "Message MAC length does not match the session configuration".to_string(),
            ));
        }

        self.ratchet.decrypt(message)
    }

    /// Checks, without decrypting, whether a message belongs to this session.
    ///
    /// A pre-key message matches on its session keys. A normal message matches
    /// when its ratchet key is on one of the two newest receiver chains.
    pub fn session_matches(&self, message: &OlmMessage) -> bool {
        match message {
            OlmMessage::PreKey(message) => message.session_keys == self.session_keys,
            OlmMessage::Normal(message) => self.ratchet.receiving.is_recent(&message.ratchet_key()),
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &self.session_id())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
