use crate::SessionConfig;
use crate::megolm::{MegolmMessage, MegolmRatchet, SessionKey};
use crate::types::{Ed25519Keypair, Ed25519PublicKey};

/// The sending side of a Megolm session.
///
/// Every call to [`GroupSession::encrypt`] advances the ratchet, so a message
/// index is never reused. Recipients are bootstrapped with
/// [`GroupSession::session_key`].
pub struct GroupSession {
    pub(crate) ratchet: MegolmRatchet,
    pub(crate) signing_key: Ed25519Keypair,
    pub(crate) config: SessionConfig,
}

impl GroupSession {
    /// Creates a session with a random ratchet and signing key.
    pub fn new(config: SessionConfig) -> Self {
        let session = Self {
            ratchet: MegolmRatchet::new(),
            signing_key: Ed25519Keypair::new(),
            config,
        };
        tracing::debug!(session_id = %session.session_id(), "Created outbound group session");

        session
    }

    /// Stable identifier: the base64 Ed25519 signing key.
    pub fn session_id(&self) -> String {
        self.signing_key.public_key().to_base64()
    }

    /// The public key messages are signed with.
    pub fn signing_key(&self) -> Ed25519PublicKey {
        self.signing_key.public_key()
    }

    /// The index the next message will be encrypted at.
    pub fn message_index(&self) -> u32 {
        self.ratchet.index()
    }

    /// The session configuration.
    pub fn session_config(&self) -> SessionConfig {
        self.config
    }

    /// The raw 128 byte ratchet state at the current index.
    pub fn message_key(&self) -> &[u8; 128] {
        self.ratchet.as_bytes()
    }

    /// A signed key letting recipients decrypt from the current index on.
    pub fn session_key(&self) -> SessionKey {
        SessionKey::new(&self.ratchet, &self.signing_key)
    }

    /// Encrypts and signs `plaintext`, then advances the ratchet.
    pub fn encrypt(&mut self, plaintext: impl AsRef<[u8]>) -> MegolmMessage {
        let message = MegolmMessage::encrypt(
            &self.ratchet,
            &self.signing_key,
            &self.config,
            plaintext.as_ref(),
        );
        self.ratchet.advance();

        message
    }
}

impl Default for GroupSession {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}
