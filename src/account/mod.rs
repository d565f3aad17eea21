mod fallback_keys;
mod one_time_keys;

pub(crate) use fallback_keys::{FallbackKey, FallbackKeys};
pub use one_time_keys::OneTimeKeyGenerationResult;
pub(crate) use one_time_keys::OneTimeKeys;

use crate::ratchet::{PreKeyMessage, SessionKeys};
use crate::shared_secret::Shared3DHSecret;
use crate::types::{
    Curve25519Keypair, Curve25519PublicKey, Curve25519SecretKey, Ed25519Keypair, Ed25519PublicKey,
    Ed25519Signature, KeyId,
};
use crate::{AccountConfig, Error, Session, SessionConfig};
use std::collections::HashMap;

/// The public halves of an account's long-term identity keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IdentityKeys {
    /// Key used to sign one-time keys and device information.
    pub ed25519: Ed25519PublicKey,
    /// Key used in the triple Diffie-Hellman that starts a session.
    pub curve25519: Curve25519PublicKey,
}

/// A session created from a pre-key message, with that message's plaintext.
#[derive(Debug)]
pub struct InboundCreationResult {
    /// The newly established session.
    pub session: Session,
    /// The decrypted content of the pre-key message.
    pub plaintext: Vec<u8>,
}

/// A device's long-term identity along with its pre-keys.
///
/// Owns the Ed25519 signing key and the Curve25519 identity key, the pool of
/// one-time keys other devices claim to start sessions, and the reusable
/// fallback keys used when that pool runs dry.
pub struct Account {
    pub(crate) signing_key: Ed25519Keypair,
    pub(crate) diffie_hellman_key: Curve25519Keypair,
    pub(crate) one_time_keys: OneTimeKeys,
    pub(crate) fallback_keys: FallbackKeys,
    pub(crate) config: AccountConfig,
}

impl Account {
    /// Creates an account with fresh identity keys and the default configuration.
    pub fn new() -> Self {
        Self::with_config(AccountConfig::default())
    }

    /// Creates an account with fresh identity keys.
    pub fn with_config(config: AccountConfig) -> Self {
        let account = Self {
            signing_key: Ed25519Keypair::new(),
            diffie_hellman_key: Curve25519Keypair::new(),
            one_time_keys: OneTimeKeys::new(),
            fallback_keys: FallbackKeys::new(),
            config,
        };
        tracing::debug!(curve25519 = %account.curve25519_key(), "Created account");

        account
    }

    /// Returns the configuration for this account.
    pub fn config(&self) -> &AccountConfig {
        &self.config
    }

    /// Both public identity keys.
    pub fn identity_keys(&self) -> IdentityKeys {
        IdentityKeys {
            ed25519: self.ed25519_key(),
            curve25519: self.curve25519_key(),
        }
    }

    /// The public Ed25519 signing key.
    #[inline]
    pub fn ed25519_key(&self) -> Ed25519PublicKey {
        self.signing_key.public_key()
    }

    /// The public Curve25519 identity key.
    #[inline]
    pub fn curve25519_key(&self) -> Curve25519PublicKey {
        self.diffie_hellman_key.public_key()
    }

    /// Signs `message` with the account's Ed25519 key.
    pub fn sign(&self, message: impl AsRef<[u8]>) -> Ed25519Signature {
        self.signing_key.sign(message.as_ref())
    }

    /// How many one-time keys the account advertises it can hold.
    pub fn max_number_of_one_time_keys(&self) -> usize {
        self.config.max_one_time_keys
    }

    /// How many one-time key pairs are currently stored.
    pub fn stored_one_time_key_count(&self) -> usize {
        self.one_time_keys.len()
    }

    /// Generates `count` one-time keys, subject to the account's overflow policy.
    pub fn generate_one_time_keys(
        &mut self,
        count: usize,
    ) -> Result<OneTimeKeyGenerationResult, Error> {
        self.one_time_keys.generate(count, &self.config)
    }

    /// The one-time keys that have not been marked as published.
    pub fn one_time_keys(&self) -> HashMap<KeyId, Curve25519PublicKey> {
        self.one_time_keys.unpublished_public_keys()
    }

    /// Rotates the fallback key.
    ///
    /// Returns the public half of the generation that is no longer usable, if
    /// two generations were already held.
    pub fn generate_fallback_key(&mut self) -> Option<Curve25519PublicKey> {
        let key_id = self.one_time_keys.next_key_id();
        let dropped = self.fallback_keys.generate(key_id);
        tracing::debug!(%key_id, "Generated fallback key");

        dropped
    }

    /// The current fallback key, if it has not been published yet.
    pub fn fallback_key(&self) -> HashMap<KeyId, Curve25519PublicKey> {
        self.fallback_keys.unpublished_fallback_key()
    }

    /// Drops the previous fallback generation. Returns whether one was held.
    pub fn forget_fallback_key(&mut self) -> bool {
        self.fallback_keys.forget_previous()
    }

    /// Marks every one-time key and the current fallback key as published.
    pub fn mark_keys_as_published(&mut self) {
        self.one_time_keys.mark_as_published();
        self.fallback_keys.mark_as_published();
    }

    /// Starts a session with a device whose identity key and one-time (or
    /// fallback) key were obtained out of band.
    pub fn create_outbound_session(
        &self,
        session_config: SessionConfig,
        identity_key: Curve25519PublicKey,
        one_time_key: Curve25519PublicKey,
    ) -> Result<Session, Error> {
        let base_key = Curve25519Keypair::new();
        let shared_secret = Shared3DHSecret::for_alice(
            self.diffie_hellman_key.secret_key(),
            base_key.secret_key(),
            &identity_key,
            &one_time_key,
        )?;

        let session_keys = SessionKeys {
            identity_key: self.curve25519_key(),
            base_key: base_key.public_key(),
            one_time_key,
        };

        Ok(Session::new_outbound(
            shared_secret,
            session_keys,
            session_config,
        ))
    }

    fn find_secret_key(&self, public_key: &Curve25519PublicKey) -> Option<&Curve25519SecretKey> {
        self.one_time_keys
            .get_secret_key(public_key)
            .or_else(|| self.fallback_keys.get_secret_key(public_key))
    }

    /// Establishes a session from a received pre-key message.
    ///
    /// The claimed one-time key is removed only once the message has been
    /// decrypted, so a forged message cannot burn a key. Fallback keys are
    /// never removed.
    pub fn create_inbound_session(
        &mut self,
        their_identity_key: Curve25519PublicKey,
        message: &PreKeyMessage,
    ) -> Result<InboundCreationResult, Error> {
        if message.identity_key() != their_identity_key {
            tracing::warn!(
                expected = %their_identity_key,
                actual = %message.identity_key(),
                "Pre-key message identity key mismatch"
            );
            return Err(Error::ProtocolViolation(
                "The pre-key message was sent by a different identity key".to_string(),
            ));
        }

        let one_time_key = message.one_time_key();
        let secret_key = self.find_secret_key(&one_time_key).ok_or_else(|| {
            tracing::warn!(%one_time_key, "Pre-key message uses an unknown one-time key");
            Error::KeyExhausted(format!(
                "No one-time or fallback key matches {one_time_key}"
            ))
        })?;

        let shared_secret = Shared3DHSecret::for_bob(
            self.diffie_hellman_key.secret_key(),
            secret_key,
            &their_identity_key,
            &message.base_key(),
        )?;

        let mut session = Session::new_inbound(
            shared_secret,
            message.session_keys(),
            message.message().ratchet_key(),
            message.message().session_config(),
        )?;
        let plaintext = session.decrypt_message(message.message())?;

        self.one_time_keys.remove_secret_key(&one_time_key);

        Ok(InboundCreationResult { session, plaintext })
    }

    /// Picks the canonical session when both sides started one concurrently.
    ///
    /// The session initiated by the device with the smaller Curve25519
    /// identity key wins, so both devices keep the same session.
    pub fn resolve_session_race(
        &self,
        their_identity_key: Curve25519PublicKey,
        outbound: Session,
        inbound: Session,
    ) -> Session {
        if self.curve25519_key() <= their_identity_key {
            outbound
        } else {
            inbound
        }
    }
}

impl Default for Account {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OverflowPolicy;
    use crate::ratchet::OlmMessage;

    fn pre_key_message(message: OlmMessage) -> PreKeyMessage {
        match message {
            OlmMessage::PreKey(message) => Some(message),
            OlmMessage::Normal(_) => None,
        }
        .unwrap()
    }

    #[test]
    fn test_identity_keys() {
        let account = Account::new();
        let keys = account.identity_keys();

        assert_eq!(keys.ed25519, account.ed25519_key());
        assert_eq!(keys.curve25519, account.curve25519_key());
        assert!(keys.ed25519.verify(b"payload", &account.sign(b"payload")).is_ok());
    }

    #[test]
    fn test_one_time_key_is_single_use() {
        let alice = Account::new();
        let mut bob = Account::new();
        bob.generate_one_time_keys(1).unwrap();
        let one_time_key = *bob.one_time_keys().values().next().unwrap();

        let mut session = alice
            .create_outbound_session(SessionConfig::version_1(), bob.curve25519_key(), one_time_key)
            .unwrap();
        let message = pre_key_message(session.encrypt("hello"));

        let result = bob
            .create_inbound_session(alice.curve25519_key(), &message)
            .unwrap();
        assert_eq!(result.plaintext, b"hello");
        assert_eq!(bob.stored_one_time_key_count(), 0);

        assert!(matches!(
            bob.create_inbound_session(alice.curve25519_key(), &message),
            Err(Error::KeyExhausted(_))
        ));
    }

    #[test]
    fn test_fallback_key_is_reusable() {
        let alice = Account::new();
        let mut bob = Account::new();
        bob.generate_fallback_key();
        let fallback_key = *bob.fallback_key().values().next().unwrap();

        for _ in 0..2 {
            let mut session = alice
                .create_outbound_session(SessionConfig::version_2(), bob.curve25519_key(), fallback_key)
                .unwrap();
            let message = pre_key_message(session.encrypt("hi"));
            let result = bob
                .create_inbound_session(alice.curve25519_key(), &message)
                .unwrap();

            assert_eq!(result.plaintext, b"hi");
            assert_eq!(result.session.session_config(), SessionConfig::version_2());
        }
    }

    #[test]
    fn test_failed_inbound_session_keeps_key() {
        let alice = Account::new();
        let eve = Account::new();
        let mut bob = Account::new();
        bob.generate_one_time_keys(1).unwrap();
        let one_time_key = *bob.one_time_keys().values().next().unwrap();

        let mut session = alice
            .create_outbound_session(SessionConfig::version_1(), bob.curve25519_key(), one_time_key)
            .unwrap();
        let message = pre_key_message(session.encrypt("hello"));

        assert!(matches!(
            bob.create_inbound_session(eve.curve25519_key(), &message),
            Err(Error::ProtocolViolation(_))
        ));

        // A message claiming Alice's identity without her secret key.
        let mut forged_session = eve
            .create_outbound_session(SessionConfig::version_1(), bob.curve25519_key(), one_time_key)
            .unwrap();
        let mut forged = pre_key_message(forged_session.encrypt("forged"));
        forged.session_keys.identity_key = alice.curve25519_key();

        assert!(matches!(
            bob.create_inbound_session(alice.curve25519_key(), &forged),
            Err(Error::AuthenticationFailed(_))
        ));
        assert_eq!(bob.stored_one_time_key_count(), 1);
        assert!(
            bob.create_inbound_session(alice.curve25519_key(), &message)
                .is_ok()
        );
    }

    #[test]
    fn test_fallback_generations() {
        let mut account = Account::new();

        assert_eq!(account.generate_fallback_key(), None);
        let first = *account.fallback_key().values().next().unwrap();
        assert_eq!(account.generate_fallback_key(), None);
        assert_eq!(account.generate_fallback_key(), Some(first));

        account.mark_keys_as_published();
        assert!(account.fallback_key().is_empty());
        assert!(account.forget_fallback_key());
        assert!(!account.forget_fallback_key());
    }

    #[test]
    fn test_capacity_policies() {
        let mut discarding = Account::with_config(AccountConfig {
            max_one_time_keys: 3,
            one_time_key_capacity: 4,
            overflow_policy: OverflowPolicy::DiscardOldest,
        });
        assert_eq!(discarding.max_number_of_one_time_keys(), 3);
        assert_eq!(discarding.generate_one_time_keys(10).unwrap().created.len(), 3);
        assert_eq!(discarding.generate_one_time_keys(3).unwrap().removed.len(), 2);
        assert_eq!(discarding.stored_one_time_key_count(), 4);

        let mut rejecting = Account::with_config(AccountConfig {
            overflow_policy: OverflowPolicy::Reject,
            ..discarding.config().clone()
        });
        assert!(matches!(
            rejecting.generate_one_time_keys(4),
            Err(Error::ProtocolViolation(_))
        ));
        assert_eq!(rejecting.stored_one_time_key_count(), 0);
    }

    #[test]
    fn test_session_race_is_resolved_identically() {
        let mut alice = Account::new();
        let mut bob = Account::new();
        alice.generate_one_time_keys(1).unwrap();
        bob.generate_one_time_keys(1).unwrap();
        let alice_otk = *alice.one_time_keys().values().next().unwrap();
        let bob_otk = *bob.one_time_keys().values().next().unwrap();

        let mut alice_outbound = alice
            .create_outbound_session(SessionConfig::version_1(), bob.curve25519_key(), bob_otk)
            .unwrap();
        let mut bob_outbound = bob
            .create_outbound_session(SessionConfig::version_1(), alice.curve25519_key(), alice_otk)
            .unwrap();

        let bob_inbound = bob
            .create_inbound_session(
                alice.curve25519_key(),
                &pre_key_message(alice_outbound.encrypt("from alice")),
            )
            .unwrap()
            .session;
        let alice_inbound = alice
            .create_inbound_session(
                bob.curve25519_key(),
                &pre_key_message(bob_outbound.encrypt("from bob")),
            )
            .unwrap()
            .session;

        let alice_choice =
            alice.resolve_session_race(bob.curve25519_key(), alice_outbound, alice_inbound);
        let bob_choice = bob.resolve_session_race(alice.curve25519_key(), bob_outbound, bob_inbound);

        assert_eq!(alice_choice.session_id(), bob_choice.session_id());
    }
}
