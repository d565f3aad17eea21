use crate::config::{AccountConfig, OverflowPolicy};
use crate::types::{Curve25519Keypair, Curve25519PublicKey, Curve25519SecretKey, KeyId};
use crate::Error;
use std::collections::{BTreeMap, HashMap};

/// Outcome of a one-time key generation request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OneTimeKeyGenerationResult {
    /// Public halves of the keys that were created.
    pub created: Vec<Curve25519PublicKey>,
    /// Public halves of the oldest keys evicted to stay within capacity.
    pub removed: Vec<Curve25519PublicKey>,
}

#[derive(Clone)]
pub(crate) struct OneTimeKey {
    pub(crate) keypair: Curve25519Keypair,
    pub(crate) published: bool,
}

/// Pool of single-use pre-keys, ordered by key id so the oldest go first.
#[derive(Clone, Default)]
pub(crate) struct OneTimeKeys {
    pub(crate) next_key_id: u64,
    pub(crate) keys: BTreeMap<KeyId, OneTimeKey>,
    pub(crate) key_ids: HashMap<Curve25519PublicKey, KeyId>,
}

impl OneTimeKeys {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Hands out the next key id. Fallback keys draw from the same counter.
    pub(crate) fn next_key_id(&mut self) -> KeyId {
        let key_id = KeyId(self.next_key_id);
        self.next_key_id = self.next_key_id.wrapping_add(1);
        key_id
    }

    pub(crate) fn len(&self) -> usize {
        self.keys.len()
    }

    pub(crate) fn insert(&mut self, key_id: KeyId, keypair: Curve25519Keypair, published: bool) {
        self.key_ids.insert(keypair.public_key(), key_id);
        self.keys.insert(
            key_id,
            OneTimeKey {
                keypair,
                published,
            },
        );
    }

    pub(crate) fn generate(
        &mut self,
        count: usize,
        config: &AccountConfig,
    ) -> Result<OneTimeKeyGenerationResult, Error> {
        let count = match config.overflow_policy {
            OverflowPolicy::Reject => {
                if count > config.max_one_time_keys {
                    return Err(Error::ProtocolViolation(format!(
                        "Requested {count} one-time keys, at most {} may be generated at once",
                        config.max_one_time_keys
                    )));
                }
                if self.len() + count > config.one_time_key_capacity {
                    return Err(Error::ProtocolViolation(format!(
                        "Generating {count} one-time keys would exceed the capacity of {}",
                        config.one_time_key_capacity
                    )));
                }
                count
            }
            OverflowPolicy::DiscardOldest => count.min(config.max_one_time_keys),
        };

        let mut result = OneTimeKeyGenerationResult::default();

        for _ in 0..count {
            let key_id = self.next_key_id();
            let keypair = Curve25519Keypair::new();
            result.created.push(keypair.public_key());
            self.insert(key_id, keypair, false);
        }

        while self.len() > config.one_time_key_capacity {
            if let Some((_, key)) = self.keys.pop_first() {
                let public_key = key.keypair.public_key();
                self.key_ids.remove(&public_key);
                result.removed.push(public_key);
            }
        }

        tracing::debug!(
            created = result.created.len(),
            removed = result.removed.len(),
            "Generated one-time keys"
        );

        Ok(result)
    }

    pub(crate) fn unpublished_public_keys(&self) -> HashMap<KeyId, Curve25519PublicKey> {
        self.keys
            .iter()
            .filter(|(_, key)| !key.published)
            .map(|(key_id, key)| (*key_id, key.keypair.public_key()))
            .collect()
    }

    pub(crate) fn mark_as_published(&mut self) {
        for key in self.keys.values_mut() {
            key.published = true;
        }
    }

    pub(crate) fn get_secret_key(
        &self,
        public_key: &Curve25519PublicKey,
    ) -> Option<&Curve25519SecretKey> {
        self.key_ids
            .get(public_key)
            .and_then(|key_id| self.keys.get(key_id))
            .map(|key| key.keypair.secret_key())
    }

    pub(crate) fn remove_secret_key(&mut self, public_key: &Curve25519PublicKey) -> bool {
        match self.key_ids.remove(public_key) {
            Some(key_id) => self.keys.remove(&key_id).is_some(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(policy: OverflowPolicy) -> AccountConfig {
        AccountConfig {
            max_one_time_keys: 10,
            one_time_key_capacity: 15,
            overflow_policy: policy,
        }
    }

    #[test]
    fn test_generate_and_publish() {
        let mut keys = OneTimeKeys::new();
        let result = keys
            .generate(5, &config(OverflowPolicy::DiscardOldest))
            .unwrap();

        assert_eq!(result.created.len(), 5);
        assert!(result.removed.is_empty());
        assert_eq!(keys.unpublished_public_keys().len(), 5);

        keys.mark_as_published();
        assert!(keys.unpublished_public_keys().is_empty());
        assert_eq!(keys.len(), 5);
    }

    #[test]
    fn test_discard_oldest_clamps_and_evicts() {
        let mut keys = OneTimeKeys::new();
        let config = config(OverflowPolicy::DiscardOldest);

        let first = keys.generate(100, &config).unwrap();
        assert_eq!(first.created.len(), 10);

        let second = keys.generate(10, &config).unwrap();
        assert_eq!(keys.len(), 15);
        assert_eq!(second.removed, first.created[..5].to_vec());
        assert!(keys.get_secret_key(&first.created[0]).is_none());
        assert!(keys.get_secret_key(&first.created[5]).is_some());
    }

    #[test]
    fn test_reject_leaves_pool_untouched() {
        let mut keys = OneTimeKeys::new();
        let config = config(OverflowPolicy::Reject);

        assert!(matches!(
            keys.generate(11, &config),
            Err(Error::ProtocolViolation(_))
        ));
        assert_eq!(keys.len(), 0);

        keys.generate(10, &config).unwrap();
        assert!(matches!(
            keys.generate(6, &config),
            Err(Error::ProtocolViolation(_))
        ));
        assert_eq!(keys.len(), 10);
        assert_eq!(keys.next_key_id, 10);
    }

    #[test]
    fn test_remove_secret_key() {
        let mut keys = OneTimeKeys::new();
        let result = keys
            .generate(2, &config(OverflowPolicy::DiscardOldest))
            .unwrap();

        assert!(keys.remove_secret_key(&result.created[0]));
        assert!(!keys.remove_secret_key(&result.created[0]));
        assert!(keys.get_secret_key(&result.created[1]).is_some());
    }
}
