use crate::megolm::{ExportedSessionKey, MegolmMessage, MegolmRatchet, SessionKey};
use crate::types::Ed25519PublicKey;
use crate::{Error, SessionConfig};
use std::cmp::Ordering;

/// Plaintext of a group message together with the index it was sent at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecryptedMessage {
    /// The decrypted payload.
    pub plaintext: Vec<u8>,
    /// The ratchet index the message was encrypted at.
    pub message_index: u32,
}

/// How two copies of the same inbound group session relate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionOrdering {
    /// Both can decrypt exactly the same messages.
    Equal,
    /// This session can decrypt more messages than the other.
    Better,
    /// The other session can decrypt more messages.
    Worse,
    /// The sessions do not share a ratchet.
    Unconnected,
}

/// The receiving side of a Megolm session.
///
/// Keeps the ratchet at the first known index alongside the most advanced one,
/// so any message at or after the first known index stays decryptable in any
/// order.
#[derive(Clone)]
pub struct InboundGroupSession {
    pub(crate) initial_ratchet: MegolmRatchet,
    pub(crate) latest_ratchet: MegolmRatchet,
    pub(crate) signing_key: Ed25519PublicKey,
    pub(crate) signing_key_verified: bool,
    pub(crate) config: SessionConfig,
}

impl InboundGroupSession {
    /// Creates a session from a signed session key.
    pub fn new(session_key: &SessionKey, config: SessionConfig) -> Self {
        let session = Self {
            initial_ratchet: session_key.ratchet.clone(),
            latest_ratchet: session_key.ratchet.clone(),
            signing_key: session_key.signing_key,
            signing_key_verified: true,
            config,
        };
        tracing::debug!(
            session_id = %session.session_id(),
            first_known_index = session.first_known_index(),
            "Created inbound group session"
        );

        session
    }

    /// Creates a session from an unsigned export.
    pub fn import(exported_key: &ExportedSessionKey, config: SessionConfig) -> Self {
        let session = Self {
            initial_ratchet: exported_key.ratchet.clone(),
            latest_ratchet: exported_key.ratchet.clone(),
            signing_key: exported_key.signing_key,
            signing_key_verified: false,
            config,
        };
        tracing::debug!(
            session_id = %session.session_id(),
            first_known_index = session.first_known_index(),
            "Imported inbound group session"
        );

        session
    }

    /// Stable identifier: the base64 Ed25519 signing key of the sender.
    pub fn session_id(&self) -> String {
        self.signing_key.to_base64()
    }

    /// The lowest message index this session can decrypt.
    pub fn first_known_index(&self) -> u32 {
        self.initial_ratchet.index()
    }

    /// Whether the session came from a signed [`SessionKey`].
    pub fn signing_key_verified(&self) -> bool {
        self.signing_key_verified
    }

    /// The session configuration.
    pub fn session_config(&self) -> SessionConfig {
        self.config
    }

    /// Exports the ratchet at `index`, which must not precede the first known index.
    pub fn export_at(&self, index: u32) -> Result<ExportedSessionKey, Error> {
        if index < self.first_known_index() {
            return Err(Error::KeyExhausted(format!(
                "Cannot export index {index}, the first known index is {}",
                self.first_known_index()
            )));
        }

        let mut ratchet = if self.latest_ratchet.index() <= index {
            self.latest_ratchet.clone()
        } else {
            self.initial_ratchet.clone()
        };
        ratchet.advance_to(index);

        Ok(ExportedSessionKey::new(&ratchet, self.signing_key))
    }

    /// Exports the ratchet at the first known index.
    pub fn export_at_first_known_index(&self) -> ExportedSessionKey {
        ExportedSessionKey::new(&self.initial_ratchet, self.signing_key)
    }

    /// Whether both sessions descend from the same ratchet and signing key.
    pub fn connected(&self, other: &InboundGroupSession) -> bool {
        if self.signing_key != other.signing_key {
            return false;
        }

        let (mut earlier, later) = if self.first_known_index() <= other.first_known_index() {
            (self.initial_ratchet.clone(), &other.initial_ratchet)
        } else {
            (other.initial_ratchet.clone(), &self.initial_ratchet)
        };
        earlier.advance_to(later.index());

        earlier.as_bytes() == later.as_bytes()
    }

    /// Compares how many messages each of two connected sessions can decrypt.
    pub fn compare(&self, other: &InboundGroupSession) -> SessionOrdering {
        if !self.connected(other) {
            return SessionOrdering::Unconnected;
        }

        match self.first_known_index().cmp(&other.first_known_index()) {
            Ordering::Less => SessionOrdering::Better,
            Ordering::Greater => SessionOrdering::Worse,
            Ordering::Equal => match (self.signing_key_verified, other.signing_key_verified) {
                (true, false) => SessionOrdering::Better,
                (false, true) => SessionOrdering::Worse,
                _ => SessionOrdering::Equal,
            },
        }
    }

    /// Combines two connected copies, keeping the earliest ratchet.
    pub fn merge(&self, other: &InboundGroupSession) -> Option<InboundGroupSession> {
        let mut merged = match self.compare(other) {
            SessionOrdering::Unconnected => return None,
            SessionOrdering::Worse => other.clone(),
            SessionOrdering::Better | SessionOrdering::Equal => self.clone(),
        };

        merged.signing_key_verified = self.signing_key_verified || other.signing_key_verified;
        if other.latest_ratchet.index() > merged.latest_ratchet.index() {
            merged.latest_ratchet = other.latest_ratchet.clone();
        }
        if self.latest_ratchet.index() > merged.latest_ratchet.index() {
            merged.latest_ratchet = self.latest_ratchet.clone();
        }

        Some(merged)
    }

    /// Verifies and decrypts a group message.
    ///
    /// Decryption never moves the first known index, so the same message can
    /// be decrypted again. A failure leaves the session untouched.
    pub fn decrypt(&mut self, message: &MegolmMessage) -> Result<DecryptedMessage, Error> {
        message.verify_signature(&self.signing_key)?;

        if message.session_config() != self.config {
            return Err(Error::AuthenticationFailed(
                "Message MAC length does not match the session configuration".to_string(),
            ));
        }

        let index = message.message_index();
        if index < self.first_known_index() {
            return Err(Error::ProtocolViolation(format!(
                "Message index {index} precedes the first known index {}",
                self.first_known_index()
            )));
        }

        let plaintext = if self.initial_ratchet.index() == index {
            message.decrypt(&self.initial_ratchet)?
        } else if self.latest_ratchet.index() == index {
            message.decrypt(&self.latest_ratchet)?
        } else if self.latest_ratchet.index() < index {
            let mut ratchet = self.latest_ratchet.clone();
            ratchet.advance_to(index);
            let plaintext = message.decrypt(&ratchet)?;
            self.latest_ratchet = ratchet;
            plaintext
        } else {
            let mut ratchet = self.initial_ratchet.clone();
            ratchet.advance_to(index);
            message.decrypt(&ratchet)?
        };

        Ok(DecryptedMessage {
            plaintext,
            message_index: index,
        })
    }
}
