use super::{
    ActiveRatchetPickle, ChainKeyPickle, InactiveRatchetPickle, RatchetStatePickle,
    ReceiverChainPickle, SendingRatchetPickle, SessionKeysPickle, SessionPickle, key_from_slice,
    missing, session_config,
};
use crate::pickle::libolm::{self, Reader};
use crate::pickle::{self, PickleFormat};
use crate::ratchet::{
    ChainKey, ChainStore, DoubleRatchet, MessageKey, ReceiverChain, RootKey, SendingRatchet,
    SessionKeys,
};
use crate::types::{Curve25519Keypair, Curve25519PublicKey, Curve25519SecretKey};
use crate::{Error, Session, SessionConfig};
use zeroize::Zeroize;

const PICKLE_KIND: &str = "session";
const LIBOLM_SESSION_VERSION: u32 = 1;

impl From<&ChainKey> for ChainKeyPickle {
    fn from(chain_key: &ChainKey) -> Self {
        Self {
            key: chain_key.key.to_vec(),
            index: chain_key.index,
        }
    }
}

impl From<&MessageKey> for ChainKeyPickle {
    fn from(message_key: &MessageKey) -> Self {
        Self {
            key: message_key.key.to_vec(),
            index: message_key.index,
        }
    }
}

impl TryFrom<&ChainKeyPickle> for ChainKey {
    type Error = Error;

    fn try_from(pickle: &ChainKeyPickle) -> Result<Self, Self::Error> {
        Ok(ChainKey::from_parts(
            key_from_slice(&pickle.key, "chain key")?,
            pickle.index,
        ))
    }
}

impl TryFrom<&ChainKeyPickle> for MessageKey {
    type Error = Error;

    fn try_from(pickle: &ChainKeyPickle) -> Result<Self, Self::Error> {
        Ok(MessageKey {
            key: key_from_slice(&pickle.key, "message key")?,
            index: pickle.index,
        })
    }
}

impl From<&SendingRatchet> for SendingRatchetPickle {
    fn from(ratchet: &SendingRatchet) -> Self {
        match ratchet {
            SendingRatchet::Active {
                root_key,
                ratchet_key,
                chain_key,
            } => Self {
                root_key: root_key.0.to_vec(),
                state: Some(RatchetStatePickle::Active(ActiveRatchetPickle {
                    ratchet_key: ratchet_key.secret_key().to_bytes().to_vec(),
                    chain_key: Some(ChainKeyPickle::from(chain_key)),
                })),
            },
            SendingRatchet::Inactive {
                root_key,
                remote_key,
            } => Self {
                root_key: root_key.0.to_vec(),
                state: Some(RatchetStatePickle::Inactive(InactiveRatchetPickle {
                    remote_key: remote_key.to_bytes().to_vec(),
                })),
            },
        }
    }
}

impl TryFrom<&SendingRatchetPickle> for SendingRatchet {
    type Error = Error;

    fn try_from(pickle: &SendingRatchetPickle) -> Result<Self, Self::Error> {
        let root_key = RootKey::new(key_from_slice(&pickle.root_key, "root key")?);

        match pickle.state.as_ref().ok_or_else(|| missing("ratchet state"))? {
            RatchetStatePickle::Active(active) => Ok(SendingRatchet::Active {
                root_key,
                ratchet_key: Curve25519Keypair::from_secret_key(Curve25519SecretKey::from_slice(
                    &active.ratchet_key,
                )?),
                chain_key: ChainKey::try_from(
                    active
                        .chain_key
                        .as_ref()
                        .ok_or_else(|| missing("sending chain key"))?,
                )?,
            }),
            RatchetStatePickle::Inactive(inactive) => Ok(SendingRatchet::Inactive {
                root_key,
                remote_key: Curve25519PublicKey::from_slice(&inactive.remote_key)?,
            }),
        }
    }
}

impl From<&ReceiverChain> for ReceiverChainPickle {
    fn from(chain: &ReceiverChain) -> Self {
        Self {
            ratchet_key: chain.ratchet_key.to_bytes().to_vec(),
            chain_key: Some(ChainKeyPickle::from(&chain.chain_key)),
            skipped_keys: chain.skipped_keys.iter().map(ChainKeyPickle::from).collect(),
        }
    }
}

impl TryFrom<&ReceiverChainPickle> for ReceiverChain {
    type Error = Error;

    fn try_from(pickle: &ReceiverChainPickle) -> Result<Self, Self::Error> {
        let mut chain = ReceiverChain::new(
            Curve25519PublicKey::from_slice(&pickle.ratchet_key)?,
            ChainKey::try_from(
                pickle
                    .chain_key
                    .as_ref()
                    .ok_or_else(|| missing("receiver chain key"))?,
            )?,
        );
        for key in &pickle.skipped_keys {
            chain.push_skipped_key(MessageKey::try_from(key)?);
        }

        Ok(chain)
    }
}

impl From<&Session> for SessionPickle {
    fn from(session: &Session) -> Self {
        Self {
            session_keys: Some(SessionKeysPickle {
                identity_key: session.session_keys.identity_key.to_bytes().to_vec(),
                base_key: session.session_keys.base_key.to_bytes().to_vec(),
                one_time_key: session.session_keys.one_time_key.to_bytes().to_vec(),
            }),
            sending_ratchet: Some(SendingRatchetPickle::from(&session.ratchet.sending)),
            receiver_chains: session
                .ratchet
                .receiving
                .iter()
                .map(ReceiverChainPickle::from)
                .collect(),
            version: session.config.version_number().into(),
        }
    }
}

impl TryFrom<&SessionPickle> for Session {
    type Error = Error;

    fn try_from(pickle: &SessionPickle) -> Result<Self, Self::Error> {
        let keys = pickle
            .session_keys
            .as_ref()
            .ok_or_else(|| missing("session keys"))?;
        let session_keys = SessionKeys {
            identity_key: Curve25519PublicKey::from_slice(&keys.identity_key)?,
            base_key: Curve25519PublicKey::from_slice(&keys.base_key)?,
            one_time_key: Curve25519PublicKey::from_slice(&keys.one_time_key)?,
        };

        let mut receiving = ChainStore::new();
        for chain in &pickle.receiver_chains {
            receiving.push_oldest(ReceiverChain::try_from(chain)?);
        }

        Ok(Self {
            session_keys,
            ratchet: DoubleRatchet {
                sending: SendingRatchet::try_from(
                    pickle
                        .sending_ratchet
                        .as_ref()
                        .ok_or_else(|| missing("sending ratchet"))?,
                )?,
                receiving,
            },
            config: session_config(pickle.version)?,
        })
    }
}

impl Session {
    /// Serializes and encrypts the session with a 32 byte key.
    pub fn pickle(&self, pickle_key: &[u8]) -> Result<String, Error> {
        pickle::seal_message(PICKLE_KIND, SessionPickle::from(self), pickle_key)
    }

    /// Restores a session from a pickle in the given format.
    pub fn from_pickle(pickle: &str, key: &[u8], format: PickleFormat) -> Result<Self, Error> {
        match format {
            PickleFormat::Current => {
                let mut decoded: SessionPickle = pickle::open_message(PICKLE_KIND, pickle, key)?;
                let session = Self::try_from(&decoded);
                decoded.zeroize();

                session
            }
            PickleFormat::Legacy => {
                let state = libolm::decrypt(pickle, key)?;
                let session = Self::from_libolm(&mut Reader::new(&state))?;
                tracing::debug!(session_id = %session.session_id(), "Migrated libolm session");

                Ok(session)
            }
        }
    }

    fn from_libolm(reader: &mut Reader<'_>) -> Result<Self, Error> {
        let version = reader.read_u32()?;
        if version != LIBOLM_SESSION_VERSION {
            return Err(Error::MalformedInput(format!(
                "Unsupported libolm session pickle version: {version}"
            )));
        }

        // Implied by the receiver chains.
        let _received_message = reader.read_bool()?;

        let session_keys = SessionKeys {
            identity_key: reader.read_curve25519_public()?,
            base_key: reader.read_curve25519_public()?,
            one_time_key: reader.read_curve25519_public()?,
        };
        let root_key = RootKey::new(reader.read_key()?);

        let mut sender_chain = None;
        for _ in 0..reader.read_u32()? {
            let ratchet_key = reader.read_curve25519_keypair()?;
            let chain_key = ChainKey::from_parts(reader.read_key()?, reader.read_u32()?);
            sender_chain = Some((ratchet_key, chain_key));
        }

        // libolm lists receiver chains and skipped keys newest first.
        let mut chains = Vec::new();
        for _ in 0..reader.read_u32()? {
            let ratchet_key = reader.read_curve25519_public()?;
            let chain_key = ChainKey::from_parts(reader.read_key()?, reader.read_u32()?);
            chains.push(ReceiverChain::new(ratchet_key, chain_key));
        }

        let mut skipped_keys = Vec::new();
        for _ in 0..reader.read_u32()? {
            let ratchet_key = reader.read_curve25519_public()?;
            let message_key = MessageKey {
                key: reader.read_key()?,
                index: reader.read_u32()?,
            };
            skipped_keys.push((ratchet_key, message_key));
        }
        for (ratchet_key, message_key) in skipped_keys.into_iter().rev() {
            if let Some(chain) = chains.iter_mut().find(|chain| chain.belongs_to(&ratchet_key)) {
                chain.push_skipped_key(message_key);
            }
        }

        let sending = match sender_chain {
            Some((ratchet_key, chain_key)) => SendingRatchet::Active {
                root_key,
                ratchet_key,
                chain_key,
            },
            None => SendingRatchet::Inactive {
                root_key,
                remote_key: chains
                    .first()
                    .map(|chain| chain.ratchet_key)
                    .ok_or_else(|| {
                        Error::MalformedInput(
                            "libolm session has neither a sender nor a receiver chain".to_string(),
                        )
                    })?,
            },
        };

        let mut receiving = ChainStore::new();
        for chain in chains {
            receiving.push_oldest(chain);
        }

        Ok(Self {
            session_keys,
            ratchet: DoubleRatchet { sending, receiving },
            config: SessionConfig::version_1(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pickle::libolm::writer::Writer;
    use crate::ratchet::OlmMessage;
    use crate::{Account, Error};

    const PICKLE_KEY: [u8; 32] = [9u8; 32];

    fn established(config: SessionConfig) -> (Session, Session) {
        let alice = Account::new();
        let mut bob = Account::new();
        bob.generate_one_time_keys(1).unwrap();
        let one_time_key = *bob.one_time_keys().values().next().unwrap();

        let mut alice_session = alice
            .create_outbound_session(config, bob.curve25519_key(), one_time_key)
            .unwrap();
        let message = match alice_session.encrypt("first") {
            OlmMessage::PreKey(message) => Some(message),
            OlmMessage::Normal(_) => None,
        }
        .unwrap();
        let bob_session = bob
            .create_inbound_session(alice.curve25519_key(), &message)
            .unwrap()
            .session;

        (alice_session, bob_session)
    }

    #[test]
    fn test_round_trip_keeps_ratchet_state() {
        let (mut alice, mut bob) = established(SessionConfig::version_2());

        let skipped = bob.encrypt("skipped");
        let delivered = bob.encrypt("delivered");
        assert_eq!(alice.decrypt(&delivered).unwrap(), b"delivered");

        let mut alice = Session::from_pickle(
            &alice.pickle(&PICKLE_KEY).unwrap(),
            &PICKLE_KEY,
            PickleFormat::Current,
        )
        .unwrap();
        let mut bob = Session::from_pickle(
            &bob.pickle(&PICKLE_KEY).unwrap(),
            &PICKLE_KEY,
            PickleFormat::Current,
        )
        .unwrap();

        assert_eq!(alice.session_config(), SessionConfig::version_2());
        assert_eq!(alice.decrypt(&skipped).unwrap(), b"skipped");
        assert_eq!(bob.decrypt(&alice.encrypt("after")).unwrap(), b"after");
        assert_eq!(alice.session_id(), bob.session_id());
    }

    #[test]
    fn test_session_pickle_is_not_an_account_pickle() {
        let (alice, _) = established(SessionConfig::version_1());
        let pickle = alice.pickle(&PICKLE_KEY).unwrap();

        assert!(matches!(
            Account::from_pickle(&pickle, &PICKLE_KEY, PickleFormat::Current),
            Err(Error::AuthenticationFailed(_))
        ));
    }

    fn chain_bytes(writer: &mut Writer, chain_key: &ChainKey) {
        writer.bytes(chain_key.key.as_slice()).u32(chain_key.index);
    }

    /// Writes a session in libolm's layout, from a session of our own.
    fn libolm_pickle(session: &Session) -> Writer {
        let mut writer = Writer::default();
        writer
            .u32(1)
            .u8(session.has_received_message().into())
            .bytes(session.session_keys.identity_key.as_bytes())
            .bytes(session.session_keys.base_key.as_bytes())
            .bytes(session.session_keys.one_time_key.as_bytes());

        match &session.ratchet.sending {
            SendingRatchet::Active {
                root_key,
                ratchet_key,
                chain_key,
            } => {
                writer
                    .bytes(root_key.0.as_slice())
                    .u32(1)
                    .bytes(ratchet_key.public_key().as_bytes())
                    .bytes(ratchet_key.secret_key().to_bytes().as_slice());
                chain_bytes(&mut writer, chain_key);
            }
            SendingRatchet::Inactive { root_key, .. } => {
                writer.bytes(root_key.0.as_slice()).u32(0);
            }
        }

        let chains: Vec<_> = session.ratchet.receiving.iter().collect();
        writer.u32(chains.len() as u32);
        for chain in &chains {
            writer.bytes(chain.ratchet_key.as_bytes());
            chain_bytes(&mut writer, &chain.chain_key);
        }

        let skipped: Vec<_> = chains
            .iter()
            .flat_map(|chain| chain.skipped_keys.iter().rev().map(|key| (chain.ratchet_key, key)))
            .collect();
        writer.u32(skipped.len() as u32);
        for (ratchet_key, key) in skipped {
            writer.bytes(ratchet_key.as_bytes()).bytes(key.key.as_slice()).u32(key.index);
        }

        writer
    }

    #[test]
    fn test_legacy_session_continues() {
        let (mut alice, mut bob) = established(SessionConfig::version_1());
        let skipped = alice.encrypt("skipped");
        assert_eq!(bob.decrypt(&alice.encrypt("second")).unwrap(), b"second");

        let passphrase = b"legacy";
        let mut bob = Session::from_pickle(
            &libolm_pickle(&bob).encrypt(passphrase),
            passphrase,
            PickleFormat::Legacy,
        )
        .unwrap();
        let mut alice = Session::from_pickle(
            &libolm_pickle(&alice).encrypt(passphrase),
            passphrase,
            PickleFormat::Legacy,
        )
        .unwrap();

        assert_eq!(bob.session_config(), SessionConfig::version_1());
        assert_eq!(bob.decrypt(&skipped).unwrap(), b"skipped");
        assert_eq!(alice.decrypt(&bob.encrypt("reply")).unwrap(), b"reply");
        assert_eq!(bob.decrypt(&alice.encrypt("again")).unwrap(), b"again");
    }

    #[test]
    fn test_legacy_session_without_chains_is_malformed() {
        let mut writer = Writer::default();
        writer.u32(1).u8(0);
        for _ in 0..3 {
            writer.bytes(Curve25519Keypair::new().public_key().as_bytes());
        }
        writer.bytes(&[1u8; 32]).u32(0).u32(0).u32(0);

        assert!(matches!(
            Session::from_pickle(&writer.encrypt(b"x"), b"x", PickleFormat::Legacy),
            Err(Error::MalformedInput(_))
        ));

        let mut writer = Writer::default();
        writer.u32(2);
        assert!(matches!(
            Session::from_pickle(&writer.encrypt(b"x"), b"x", PickleFormat::Legacy),
            Err(Error::MalformedInput(_))
        ));
    }
}
