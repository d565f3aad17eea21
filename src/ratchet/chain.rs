use crate::cipher::{Cipher, hmac_sha256};
use crate::ratchet::message::Message;
use crate::types::Curve25519PublicKey;
use crate::{Error, SessionConfig};
use hmac::Mac;
use zeroize::{Zeroize, ZeroizeOnDrop};

const MESSAGE_KEY_SEED: &[u8] = &[0x01];
const CHAIN_KEY_SEED: &[u8] = &[0x02];

/// Symmetric ratchet chain for deriving message keys
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub(crate) struct ChainKey {
    pub(crate) key: Box<[u8; 32]>,
    pub(crate) index: u32,
}

impl ChainKey {
    pub(crate) fn new(key: Box<[u8; 32]>) -> Self {
        Self { key, index: 0 }
    }

    pub(crate) fn from_parts(key: Box<[u8; 32]>, index: u32) -> Self {
        Self { key, index }
    }

    pub(crate) fn index(&self) -> u32 {
        self.index
    }

    /// Returns the message key for the current index and advances the chain
    pub(crate) fn next_message_key(&mut self) -> MessageKey {
        let mut message_mac = hmac_sha256(&self.key);
        message_mac.update(MESSAGE_KEY_SEED);
        let mut message_key = Box::new([0u8; 32]);
        message_key.copy_from_slice(&message_mac.finalize().into_bytes());

        let mut chain_mac = hmac_sha256(&self.key);
        chain_mac.update(CHAIN_KEY_SEED);
        self.key.copy_from_slice(&chain_mac.finalize().into_bytes());

        let key = MessageKey {
            key: message_key,
            index: self.index,
        };
        self.index = self.index.wrapping_add(1);

        key
    }
}

/// Single-use key for one Olm message
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub(crate) struct MessageKey {
    pub(crate) key: Box<[u8; 32]>,
    pub(crate) index: u32,
}

impl MessageKey {
    pub(crate) fn encrypt(
        &self,
        ratchet_key: Curve25519PublicKey,
        config: &SessionConfig,
        plaintext: &[u8],
    ) -> Message {
        let cipher = Cipher::new_olm(&self.key);
        let ciphertext = cipher.encrypt(plaintext);

        let mut message = Message::new(config, ratchet_key, self.index, ciphertext);
        let mac = cipher.mac(message.authenticated_bytes());
        message.mac = mac[..config.mac_length()].to_vec();

        message
    }

    pub(crate) fn decrypt(&self, message: &Message) -> Result<Vec<u8>, Error> {
        let cipher = Cipher::new_olm(&self.key);
        cipher.verify_mac(message.authenticated_bytes(), message.mac())?;
        cipher.decrypt(message.ciphertext())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_advances_index() {
        let mut chain = ChainKey::new(Box::new([1u8; 32]));

        let first = chain.next_message_key();
        let second = chain.next_message_key();

        assert_eq!(first.index, 0);
        assert_eq!(second.index, 1);
        assert_eq!(chain.index(), 2);
        assert_ne!(first.key, second.key);
    }

    #[test]
    fn test_chain_is_deterministic() {
        let mut chain = ChainKey::new(Box::new([5u8; 32]));
        let mut copy = chain.clone();

        for _ in 0..3 {
            assert_eq!(chain.next_message_key().key, copy.next_message_key().key);
        }
        assert_eq!(chain.key, copy.key);
    }

    #[test]
    fn test_message_key_round_trip() {
        let mut chain = ChainKey::new(Box::new([9u8; 32]));
        let key = chain.next_message_key();
        let ratchet_key = crate::types::Curve25519Keypair::new().public_key();

        let message = key.encrypt(ratchet_key, &SessionConfig::version_1(), b"payload");

        assert_eq!(message.chain_index(), 0);
        assert_eq!(key.decrypt(&message).unwrap(), b"payload");
        assert!(matches!(
            chain.next_message_key().decrypt(&message),
            Err(Error::AuthenticationFailed(_))
        ));
    }

    #[test]
    fn test_unknown_fields_are_covered_by_the_mac() {
        let mut chain = ChainKey::new(Box::new([3u8; 32]));
        let key = chain.next_message_key();
        let ratchet_key = crate::types::Curve25519Keypair::new().public_key();
        let message = key.encrypt(ratchet_key, &SessionConfig::version_2(), b"payload");

        let mut bytes = message.authenticated_bytes().to_vec();
        bytes.extend_from_slice(&[0x38, 0x2A]);
        let mac = Cipher::new_olm(&key.key).mac(&bytes);
        bytes.extend_from_slice(&mac);

        let extended = Message::from_bytes(&bytes).unwrap();
        assert_eq!(key.decrypt(&extended).unwrap(), b"payload");
    }
}
