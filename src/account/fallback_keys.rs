use crate::types::{Curve25519Keypair, Curve25519PublicKey, Curve25519SecretKey, KeyId};
use std::collections::HashMap;

#[derive(Clone)]
pub(crate) struct FallbackKey {
    pub(crate) key_id: KeyId,
    pub(crate) keypair: Curve25519Keypair,
    pub(crate) published: bool,
}

impl FallbackKey {
    pub(crate) fn new(key_id: KeyId) -> Self {
        Self {
            key_id,
            keypair: Curve25519Keypair::new(),
            published: false,
        }
    }

    pub(crate) fn public_key(&self) -> Curve25519PublicKey {
        self.keypair.public_key()
    }
}

/// The current fallback key and the generation before it.
///
/// Fallback keys are reusable, so establishing a session never removes them.
/// The previous generation stays usable for messages that were already in
/// flight when the key was rotated.
#[derive(Clone, Default)]
pub(crate) struct FallbackKeys {
    pub(crate) fallback_key: Option<FallbackKey>,
    pub(crate) previous_fallback_key: Option<FallbackKey>,
}

impl FallbackKeys {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Rotates in a new key and returns the public half of the generation that fell out.
    pub(crate) fn generate(&mut self, key_id: KeyId) -> Option<Curve25519PublicKey> {
        let dropped = self
            .previous_fallback_key
            .take()
            .map(|key| key.public_key());
        self.previous_fallback_key = self.fallback_key.replace(FallbackKey::new(key_id));

        dropped
    }

    pub(crate) fn forget_previous(&mut self) -> bool {
        self.previous_fallback_key.take().is_some()
    }

    pub(crate) fn unpublished_fallback_key(&self) -> HashMap<KeyId, Curve25519PublicKey> {
        self.fallback_key
            .iter()
            .filter(|key| !key.published)
            .map(|key| (key.key_id, key.public_key()))
            .collect()
    }

    pub(crate) fn mark_as_published(&mut self) {
        if let Some(key) = self.fallback_key.as_mut() {
            key.published = true;
        }
    }

    pub(crate) fn get_secret_key(
        &self,
        public_key: &Curve25519PublicKey,
    ) -> Option<&Curve25519SecretKey> {
        self.fallback_key
            .iter()
            .chain(self.previous_fallback_key.iter())
            .find(|key| key.public_key() == *public_key)
            .map(|key| key.keypair.secret_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_generations_are_kept() {
        let mut keys = FallbackKeys::new();

        assert_eq!(keys.generate(KeyId(0)), None);
        let first = keys.fallback_key.as_ref().map(FallbackKey::public_key).unwrap();
        assert_eq!(keys.generate(KeyId(1)), None);
        let second = keys.fallback_key.as_ref().map(FallbackKey::public_key).unwrap();

        assert!(keys.get_secret_key(&first).is_some());
        assert!(keys.get_secret_key(&second).is_some());

        assert_eq!(keys.generate(KeyId(2)), Some(first));
        assert!(keys.get_secret_key(&first).is_none());
        assert!(keys.get_secret_key(&second).is_some());
    }

    #[test]
    fn test_publish_and_forget() {
        let mut keys = FallbackKeys::new();
        keys.generate(KeyId(4));
        assert_eq!(keys.unpublished_fallback_key().len(), 1);
        assert!(keys.unpublished_fallback_key().contains_key(&KeyId(4)));

        keys.mark_as_published();
        assert!(keys.unpublished_fallback_key().is_empty());

        assert!(!keys.forget_previous());
        keys.generate(KeyId(5));
        assert!(keys.forget_previous());
        assert!(keys.previous_fallback_key.is_none());
    }
}
