use super::{AccountConfigPickle, AccountPickle, Ed25519KeypairPickle, OneTimeKeyPickle, missing};
use crate::account::{Account, FallbackKey, FallbackKeys, OneTimeKeys};
use crate::config::{AccountConfig, OverflowPolicy};
use crate::pickle::libolm::{self, Reader};
use crate::pickle::{self, PickleFormat};
use crate::types::{Curve25519Keypair, Curve25519SecretKey, Ed25519Keypair, KeyId};
use crate::Error;
use zeroize::Zeroize;

const PICKLE_KIND: &str = "account";

impl From<&AccountConfig> for AccountConfigPickle {
    fn from(config: &AccountConfig) -> Self {
        Self {
            max_one_time_keys: config.max_one_time_keys as u64,
            one_time_key_capacity: config.one_time_key_capacity as u64,
            reject_overflow: config.overflow_policy == OverflowPolicy::Reject,
        }
    }
}

impl From<&AccountConfigPickle> for AccountConfig {
    fn from(pickle: &AccountConfigPickle) -> Self {
        Self {
            max_one_time_keys: usize::try_from(pickle.max_one_time_keys).unwrap_or(usize::MAX),
            one_time_key_capacity: usize::try_from(pickle.one_time_key_capacity)
                .unwrap_or(usize::MAX),
            overflow_policy: if pickle.reject_overflow {
                OverflowPolicy::Reject
            } else {
                OverflowPolicy::DiscardOldest
            },
        }
    }
}

fn key_pickle(key_id: KeyId, keypair: &Curve25519Keypair, published: bool) -> OneTimeKeyPickle {
    OneTimeKeyPickle {
        key_id: key_id.0,
        secret_key: keypair.secret_key().to_bytes().to_vec(),
        published,
    }
}

fn fallback_from_pickle(pickle: &OneTimeKeyPickle) -> Result<FallbackKey, Error> {
    Ok(FallbackKey {
        key_id: KeyId(pickle.key_id),
        keypair: Curve25519Keypair::from_secret_key(Curve25519SecretKey::from_slice(
            &pickle.secret_key,
        )?),
        published: pickle.published,
    })
}

impl From<&Account> for AccountPickle {
    fn from(account: &Account) -> Self {
        let fallback = |key: &Option<FallbackKey>| {
            key.as_ref()
                .map(|key| key_pickle(key.key_id, &key.keypair, key.published))
        };

        Self {
            signing_key: Some(Ed25519KeypairPickle::from(&account.signing_key)),
            diffie_hellman_key: account.diffie_hellman_key.secret_key().to_bytes().to_vec(),
            one_time_keys: account
                .one_time_keys
                .keys
                .iter()
                .map(|(key_id, key)| key_pickle(*key_id, &key.keypair, key.published))
                .collect(),
            next_key_id: account.one_time_keys.next_key_id,
            fallback_key: fallback(&account.fallback_keys.fallback_key),
            previous_fallback_key: fallback(&account.fallback_keys.previous_fallback_key),
            config: Some(AccountConfigPickle::from(&account.config)),
        }
    }
}

impl TryFrom<&AccountPickle> for Account {
    type Error = Error;

    fn try_from(pickle: &AccountPickle) -> Result<Self, Self::Error> {
        let signing_key = pickle
            .signing_key
            .as_ref()
            .ok_or_else(|| missing("signing key"))?;

        let mut one_time_keys = OneTimeKeys::new();
        for key in &pickle.one_time_keys {
            let keypair =
                Curve25519Keypair::from_secret_key(Curve25519SecretKey::from_slice(&key.secret_key)?);
            one_time_keys.insert(KeyId(key.key_id), keypair, key.published);
        }
        one_time_keys.next_key_id = pickle.next_key_id;

        Ok(Self {
            signing_key: Ed25519Keypair::try_from(signing_key)?,
            diffie_hellman_key: Curve25519Keypair::from_secret_key(
                Curve25519SecretKey::from_slice(&pickle.diffie_hellman_key)?,
            ),
            one_time_keys,
            fallback_keys: FallbackKeys {
                fallback_key: pickle.fallback_key.as_ref().map(fallback_from_pickle).transpose()?,
                previous_fallback_key: pickle
                    .previous_fallback_key
                    .as_ref()
                    .map(fallback_from_pickle)
                    .transpose()?,
            },
            config: pickle
                .config
                .as_ref()
                .map(AccountConfig::from)
                .unwrap_or_default(),
        })
    }
}

impl Account {
    /// Serializes and encrypts the account with a 32 byte key.
    pub fn pickle(&self, pickle_key: &[u8]) -> Result<String, Error> {
        pickle::seal_message(PICKLE_KIND, AccountPickle::from(self), pickle_key)
    }

    /// Restores an account from a pickle.
    ///
    /// [`PickleFormat::Current`] requires the 32 byte key the pickle was made
    /// with. [`PickleFormat::Legacy`] takes the libolm passphrase, of any length.
    pub fn from_pickle(pickle: &str, key: &[u8], format: PickleFormat) -> Result<Self, Error> {
        match format {
            PickleFormat::Current => {
                let mut decoded: AccountPickle = pickle::open_message(PICKLE_KIND, pickle, key)?;
                let account = Self::try_from(&decoded);
                decoded.zeroize();

                account
            }
            PickleFormat::Legacy => {
                let state = libolm::decrypt(pickle, key)?;
                let account = Self::from_libolm(&mut Reader::new(&state))?;
                tracing::debug!(curve25519 = %account.curve25519_key(), "Migrated libolm account");

                Ok(account)
            }
        }
    }

    fn from_libolm(reader: &mut Reader<'_>) -> Result<Self, Error> {
        let version = reader.read_u32()?;
        match version {
            2..=4 => {}
            1 => {
                return Err(Error::MalformedInput(
                    "libolm account pickles of version 1 hold an unusable signing key".to_string(),
                ));
            }
            _ => {
                return Err(Error::MalformedInput(format!(
                    "Unsupported libolm account pickle version: {version}"
                )));
            }
        }

        let signing_key = reader.read_ed25519_keypair()?;
        let diffie_hellman_key = reader.read_curve25519_keypair()?;

        let mut one_time_keys = OneTimeKeys::new();
        let count = reader.read_u32()?;
        for _ in 0..count {
            let (key_id, published, keypair) = read_libolm_key(reader)?;
            one_time_keys.insert(key_id, keypair, published);
        }

        let fallback_keys = match version {
            2 => FallbackKeys::new(),
            // Both slots are always present. The published flag tells which are real.
            3 => {
                let current = read_libolm_fallback_key(reader)?;
                let previous = read_libolm_fallback_key(reader)?;

                if current.published {
                    FallbackKeys {
                        fallback_key: Some(current),
                        previous_fallback_key: previous.published.then_some(previous),
                    }
                } else {
                    FallbackKeys::new()
                }
            }
            _ => {
                let count = reader.read_u8()?;
                if count > 2 {
                    return Err(Error::MalformedInput(format!(
                        "libolm account pickle holds {count} fallback keys"
                    )));
                }

                let mut keys = FallbackKeys::new();
                if count >= 1 {
                    keys.fallback_key = Some(read_libolm_fallback_key(reader)?);
                }
                if count == 2 {
                    keys.previous_fallback_key = Some(read_libolm_fallback_key(reader)?);
                }
                keys
            }
        };

        one_time_keys.next_key_id = u64::from(reader.read_u32()?);

        Ok(Self {
            signing_key,
            diffie_hellman_key,
            one_time_keys,
            fallback_keys,
            config: AccountConfig::default(),
        })
    }
}

fn read_libolm_key(reader: &mut Reader<'_>) -> Result<(KeyId, bool, Curve25519Keypair), Error> {
    let key_id = KeyId(u64::from(reader.read_u32()?));
    let published = reader.read_bool()?;
    let keypair = reader.read_curve25519_keypair()?;

    Ok((key_id, published, keypair))
}

fn read_libolm_fallback_key(reader: &mut Reader<'_>) -> Result<FallbackKey, Error> {
    let (key_id, published, keypair) = read_libolm_key(reader)?;

    Ok(FallbackKey {
        key_id,
        keypair,
        published,
    })
}
