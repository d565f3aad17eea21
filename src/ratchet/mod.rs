mod chain;
mod message;
mod state;

pub(crate) use crate::ratchet::chain::{ChainKey, MessageKey};
pub use crate::ratchet::message::{Message, MessageType, OlmMessage, PreKeyMessage, SessionKeys};
pub(crate) use crate::ratchet::state::{ChainStore, ReceiverChain};

use crate::cipher::hkdf_sha256;
use crate::types::{Curve25519Keypair, Curve25519PublicKey, contributory_dh};
use crate::{Error, SessionConfig};
use x25519_dalek::SharedSecret;
use zeroize::{Zeroize, ZeroizeOnDrop};

const RATCHET_INFO: &[u8] = b"OLM_RATCHET";

/// Root of the asymmetric ratchet. Every Diffie-Hellman step replaces it.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub(crate) struct RootKey(pub(crate) Box<[u8; 32]>);

impl RootKey {
    pub(crate) fn new(key: Box<[u8; 32]>) -> Self {
        Self(key)
    }

    /// Mixes a DH output into the root, yielding the next root and a fresh chain.
    pub(crate) fn advance(&self, shared_secret: &SharedSecret) -> (RootKey, ChainKey) {
        let output = hkdf_sha256::<64>(
            Some(self.0.as_slice()),
            shared_secret.as_bytes(),
            RATCHET_INFO,
        );

        let mut root_key = Box::new([0u8; 32]);
        let mut chain_key = Box::new([0u8; 32]);
        root_key.copy_from_slice(&output[..32]);
        chain_key.copy_from_slice(&output[32..]);

        (RootKey(root_key), ChainKey::new(chain_key))
    }
}

/// Our half of the asymmetric ratchet.
///
/// While active we own a ratchet key and a sending chain. After a ratchet step
/// on receipt it turns inactive, holding only the remote key that the next
/// encryption ratchets against.
#[derive(Clone)]
pub(crate) enum SendingRatchet {
    Active {
        root_key: RootKey,
        ratchet_key: Curve25519Keypair,
        chain_key: ChainKey,
    },
    Inactive {
        root_key: RootKey,
        remote_key: Curve25519PublicKey,
    },
}

impl SendingRatchet {
    /// Turns an inactive ratchet active by generating a new ratchet key.
    ///
    /// The remote key of an inactive ratchet passed `contributory_dh` when it
    /// entered the ratchet, in `advance` or `DoubleRatchet::for_bob`.
    fn activate(&self) -> (RootKey, Curve25519Keypair, ChainKey) {
        match self {
            Self::Active {
                root_key,
                ratchet_key,
                chain_key,
            } => (root_key.clone(), ratchet_key.clone(), chain_key.clone()),
            Self::Inactive {
                root_key,
                remote_key,
            } => {
                let ratchet_key = Curve25519Keypair::new();
                let shared_secret = ratchet_key.secret_key().diffie_hellman(remote_key);
                let (root_key, chain_key) = root_key.advance(&shared_secret);
                tracing::debug!(ratchet_key = %ratchet_key.public_key(), "Advanced sending ratchet");

                (root_key, ratchet_key, chain_key)
            }
        }
    }

    /// Computes the ratchet step for a new remote key without applying it.
    fn advance(
        &self,
        remote_key: &Curve25519PublicKey,
    ) -> Result<(SendingRatchet, ReceiverChain), Error> {
        let (root_key, ratchet_key, _) = self.activate();
        let shared_secret = contributory_dh(ratchet_key.secret_key(), remote_key)?;
        let (root_key, chain_key) = root_key.advance(&shared_secret);

        Ok((
            SendingRatchet::Inactive {
                root_key,
                remote_key: *remote_key,
            },
            ReceiverChain::new(*remote_key, chain_key),
        ))
    }
}

/// The Olm double ratchet: one sending side and a store of receiver chains.
#[derive(Clone)]
pub(crate) struct DoubleRatchet {
    pub(crate) sending: SendingRatchet,
    pub(crate) receiving: ChainStore,
}

impl DoubleRatchet {
    /// The initiator starts with a sending chain and no receiver chains.
    pub(crate) fn for_alice(root_key: RootKey, chain_key: ChainKey) -> Self {
        Self {
            sending: SendingRatchet::Active {
                root_key,
                ratchet_key: Curve25519Keypair::new(),
                chain_key,
            },
            receiving: ChainStore::new(),
        }
    }

    /// The responder starts receiving on the initiator's ratchet key.
    ///
    /// Our first encryption ratchets against that key, so a low-order key is
    /// refused here rather than on the first send.
    pub(crate) fn for_bob(
        root_key: RootKey,
        chain_key: ChainKey,
        remote_key: Curve25519PublicKey,
    ) -> Result<Self, Error> {
        contributory_dh(Curve25519Keypair::new().secret_key(), &remote_key)?;

        let mut receiving = ChainStore::new();
        receiving.push(ReceiverChain::new(remote_key, chain_key));

        Ok(Self {
            sending: SendingRatchet::Inactive {
                root_key,
                remote_key,
            },
            receiving,
        })
    }

    /// Our current ratchet key, if the sending side is active.
    #[cfg(test)]
    pub(crate) fn ratchet_key(&self) -> Option<Curve25519PublicKey> {
        match &self.sending {
            SendingRatchet::Active { ratchet_key, .. } => Some(ratchet_key.public_key()),
            SendingRatchet::Inactive { .. } => None,
        }
    }

    pub(crate) fn has_received_message(&self) -> bool {
        !self.receiving.is_empty()
    }

    pub(crate) fn encrypt(&mut self, config: &SessionConfig, plaintext: &[u8]) -> Message {
        let (root_key, ratchet_key, mut chain_key) = self.sending.activate();
        let message = chain_key
            .next_message_key()
            .encrypt(ratchet_key.public_key(), config, plaintext);

        self.sending = SendingRatchet::Active {
            root_key,
            ratchet_key,
            chain_key,
        };

        message
    }

    /// Decrypts a message, stepping the ratchet if it carries a new key.
    ///
    /// A message on a chain that was already evicted from the store looks
    /// like a new ratchet key. The trial step then fails its MAC, so such a
    /// replay is reported as `AuthenticationFailed`.
    pub(crate) fn decrypt(&mut self, message: &Message) -> Result<Vec<u8>, Error> {
        if let Some(chain) = self.receiving.find_mut(&message.ratchet_key()) {
            return chain.decrypt(message);
        }

        let (sending, mut chain) = self.sending.advance(&message.ratchet_key())?;
        let plaintext = chain.decrypt(message)?;

        tracing::debug!(ratchet_key = %message.ratchet_key(), "Created receiver chain");
        self.sending = sending;
        self.receiving.push(chain);

        Ok(plaintext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratchet::state::MAX_RECEIVER_CHAINS;

    fn ratchet_pair() -> (DoubleRatchet, DoubleRatchet) {
        let root_key = RootKey::new(Box::new([1u8; 32]));
        let chain_key = ChainKey::new(Box::new([2u8; 32]));

        let alice = DoubleRatchet::for_alice(root_key.clone(), chain_key.clone());
        let alice_key = alice.ratchet_key().unwrap();
        let bob = DoubleRatchet::for_bob(root_key, chain_key, alice_key).unwrap();

        (alice, bob)
    }

    #[test]
    fn test_ping_pong() {
        let (mut alice, mut bob) = ratchet_pair();
        let config = SessionConfig::version_1();

        for round in 0..4u8 {
            let message = alice.encrypt(&config, &[round]);
            assert_eq!(bob.decrypt(&message).unwrap(), [round]);

            let reply = bob.encrypt(&config, &[round, round]);
            assert_eq!(alice.decrypt(&reply).unwrap(), [round, round]);
        }

        assert!(alice.has_received_message());
        assert!(bob.has_received_message());
        assert_eq!(alice.receiving.iter().count(), 4);
    }

    #[test]
    fn test_each_turn_uses_a_new_ratchet_key() {
        let (mut alice, mut bob) = ratchet_pair();
        let config = SessionConfig::version_2();

        let first = alice.encrypt(&config, b"one");
        bob.decrypt(&first).unwrap();
        let reply = bob.encrypt(&config, b"two");
        alice.decrypt(&reply).unwrap();
        let second = alice.encrypt(&config, b"three");

        assert_ne!(first.ratchet_key(), second.ratchet_key());
        assert_eq!(second.chain_index(), 0);
    }

    #[test]
    fn test_unknown_ratchet_key_fails_without_mutation() {
        let (mut alice, mut bob) = ratchet_pair();
        let (mut stranger, _) = ratchet_pair();
        let config = SessionConfig::version_1();

        bob.decrypt(&alice.encrypt(&config, b"hello")).unwrap();
        let unrelated = stranger.encrypt(&config, b"unrelated");

        assert!(matches!(
            bob.decrypt(&unrelated),
            Err(Error::AuthenticationFailed(_))
        ));
        assert_eq!(bob.receiving.iter().count(), 1);
        assert!(bob.ratchet_key().is_none());
    }

    #[test]
    fn test_low_order_ratchet_key_is_rejected() {
        let (mut alice, mut bob) = ratchet_pair();
        let config = SessionConfig::version_1();
        let message = alice.encrypt(&config, b"payload");
        let forged = Message::new(
            &config,
            Curve25519PublicKey::from([0u8; 32]),
            0,
            message.ciphertext().to_vec(),
        );

        assert!(matches!(
            bob.decrypt(&forged),
            Err(Error::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_low_order_initial_ratchet_key_is_rejected() {
        let result = DoubleRatchet::for_bob(
            RootKey::new(Box::new([1u8; 32])),
            ChainKey::new(Box::new([2u8; 32])),
            Curve25519PublicKey::from([0u8; 32]),
        );

        assert!(matches!(result, Err(Error::ProtocolViolation(_))));
    }

    #[test]
    fn test_replay_on_evicted_chain_fails_authentication() {
        let (mut alice, mut bob) = ratchet_pair();
        let config = SessionConfig::version_1();

        let first = alice.encrypt(&config, b"first");
        bob.decrypt(&first).unwrap();
        let mut latest = first.clone();

        for round in 0..MAX_RECEIVER_CHAINS as u8 {
            alice.decrypt(&bob.encrypt(&config, &[round])).unwrap();
            latest = alice.encrypt(&config, &[round]);
            bob.decrypt(&latest).unwrap();
        }
        assert_eq!(bob.receiving.iter().count(), MAX_RECEIVER_CHAINS);
        assert!(bob.receiving.iter().all(|chain| chain.ratchet_key != first.ratchet_key()));

        assert!(matches!(
            bob.decrypt(&latest),
            Err(Error::ProtocolViolation(_))
        ));
        assert!(matches!(
            bob.decrypt(&first),
            Err(Error::AuthenticationFailed(_))
        ));
        assert_eq!(bob.receiving.iter().count(), MAX_RECEIVER_CHAINS);
    }
}
