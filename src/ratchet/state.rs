use crate::Error;
use crate::ratchet::chain::{ChainKey, MessageKey};
use crate::ratchet::message::Message;
use crate::types::Curve25519PublicKey;
use std::collections::VecDeque;

/// Most receiver chains a session remembers.
pub(crate) const MAX_RECEIVER_CHAINS: usize = 5;
/// Most skipped message keys kept per receiver chain.
pub(crate) const MAX_SKIPPED_KEYS: usize = 40;
/// Furthest a message may run ahead of its chain.
pub(crate) const MAX_MESSAGE_GAP: u32 = 2000;

/// Chain for messages from one of the remote party's ratchet keys.
#[derive(Clone)]
pub(crate) struct ReceiverChain {
    pub(crate) ratchet_key: Curve25519PublicKey,
    pub(crate) chain_key: ChainKey,
    pub(crate) skipped_keys: VecDeque<MessageKey>,
}

impl ReceiverChain {
    pub(crate) fn new(ratchet_key: Curve25519PublicKey, chain_key: ChainKey) -> Self {
        Self {
            ratchet_key,
            chain_key,
            skipped_keys: VecDeque::new(),
        }
    }

    pub(crate) fn belongs_to(&self, ratchet_key: &Curve25519PublicKey) -> bool {
        self.ratchet_key == *ratchet_key
    }

    pub(crate) fn push_skipped_key(&mut self, key: MessageKey) {
        if self.skipped_keys.len() >= MAX_SKIPPED_KEYS {
            self.skipped_keys.pop_front();
        }
        self.skipped_keys.push_back(key);
    }

    /// Decrypts a message on this chain. State only changes on success.
    pub(crate) fn decrypt(&mut self, message: &Message) -> Result<Vec<u8>, Error> {
        let index = message.chain_index();

        if index < self.chain_key.index() {
            let position = self
                .skipped_keys
                .iter()
                .position(|key| key.index == index)
                .ok_or_else(|| {
                    Error::ProtocolViolation(format!(
                        "No message key for index {index}, the message was already decrypted or is too old"
                    ))
                })?;

            let plaintext = self.skipped_keys[position].decrypt(message)?;
            self.skipped_keys.remove(position);

            return Ok(plaintext);
        }

        let gap = index - self.chain_key.index();
        if gap > MAX_MESSAGE_GAP {
            return Err(Error::ProtocolViolation(format!(
                "Message index {index} is {gap} keys ahead of the chain"
            )));
        }

        let mut chain_key = self.chain_key.clone();
        let mut skipped = Vec::with_capacity(gap as usize);
        while chain_key.index() < index {
            skipped.push(chain_key.next_message_key());
        }

        let plaintext = chain_key.next_message_key().decrypt(message)?;

        self.chain_key = chain_key;
        for key in skipped {
            self.push_skipped_key(key);
        }

        Ok(plaintext)
    }
}

/// The receiver chains of a session, newest first.
#[derive(Clone, Default)]
pub(crate) struct ChainStore {
    pub(crate) chains: VecDeque<ReceiverChain>,
}

impl ChainStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, chain: ReceiverChain) {
        if self.chains.len() >= MAX_RECEIVER_CHAINS {
            self.chains.pop_back();
        }
        self.chains.push_front(chain);
    }

    /// Appends an older chain, used when restoring from a pickle.
    pub(crate) fn push_oldest(&mut self, chain: ReceiverChain) {
        if self.chains.len() < MAX_RECEIVER_CHAINS {
            self.chains.push_back(chain);
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    pub(crate) fn find_mut(&mut self, ratchet_key: &Curve25519PublicKey) -> Option<&mut ReceiverChain> {
        self.chains.iter_mut().find(|chain| chain.belongs_to(ratchet_key))
    }

    /// Whether the key belongs to the current or the previous chain.
    pub(crate) fn is_recent(&self, ratchet_key: &Curve25519PublicKey) -> bool {
        self.chains
            .iter()
            .take(2)
            .any(|chain| chain.belongs_to(ratchet_key))
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &ReceiverChain> {
        self.chains.iter()
    }
}
