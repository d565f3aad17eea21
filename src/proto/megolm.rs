use super::{
    Ed25519KeypairPickle, GroupSessionPickle, InboundGroupSessionPickle, MegolmRatchetPickle,
    missing, session_config,
};
use crate::megolm::{GroupSession, InboundGroupSession, MegolmRatchet};
use crate::pickle::libolm::{self, Reader};
use crate::pickle::{self, PickleFormat};
use crate::types::{Ed25519Keypair, Ed25519PublicKey};
use crate::{Error, SessionConfig};
use zeroize::Zeroize;

const GROUP_SESSION_KIND: &str = "group_session";
const INBOUND_GROUP_SESSION_KIND: &str = "inbound_group_session";

fn ratchet_from_pickle(
    pickle: Option<&MegolmRatchetPickle>,
    field: &str,
) -> Result<MegolmRatchet, Error> {
    MegolmRatchet::try_from(pickle.ok_or_else(|| missing(field))?)
}

impl From<&GroupSession> for GroupSessionPickle {
    fn from(session: &GroupSession) -> Self {
        Self {
            ratchet: Some(MegolmRatchetPickle::from(&session.ratchet)),
            signing_key: Some(Ed25519KeypairPickle::from(&session.signing_key)),
            version: session.config.version_number().into(),
        }
    }
}

impl TryFrom<&GroupSessionPickle> for GroupSession {
    type Error = Error;

    fn try_from(pickle: &GroupSessionPickle) -> Result<Self, Self::Error> {
        Ok(Self {
            ratchet: ratchet_from_pickle(pickle.ratchet.as_ref(), "ratchet")?,
            signing_key: Ed25519Keypair::try_from(
                pickle
                    .signing_key
                    .as_ref()
                    .ok_or_else(|| missing("signing key"))?,
            )?,
            config: session_config(pickle.version)?,
        })
    }
}

impl From<&InboundGroupSession> for InboundGroupSessionPickle {
    fn from(session: &InboundGroupSession) -> Self {
        Self {
            initial_ratchet: Some(MegolmRatchetPickle::from(&session.initial_ratchet)),
            latest_ratchet: Some(MegolmRatchetPickle::from(&session.latest_ratchet)),
            signing_key: session.signing_key.as_bytes().to_vec(),
            signing_key_verified: session.signing_key_verified,
            version: session.config.version_number().into(),
        }
    }
}

impl TryFrom<&InboundGroupSessionPickle> for InboundGroupSession {
    type Error = Error;

    fn try_from(pickle: &InboundGroupSessionPickle) -> Result<Self, Self::Error> {
        Ok(Self {
            initial_ratchet: ratchet_from_pickle(pickle.initial_ratchet.as_ref(), "initial ratchet")?,
            latest_ratchet: ratchet_from_pickle(pickle.latest_ratchet.as_ref(), "latest ratchet")?,
            signing_key: Ed25519PublicKey::from_slice(&pickle.signing_key)?,
            signing_key_verified: pickle.signing_key_verified,
            config: session_config(pickle.version)?,
        })
    }
}

impl GroupSession {
    /// Serializes and encrypts the session with a 32 byte key.
    pub fn pickle(&self, pickle_key: &[u8]) -> Result<String, Error> {
        pickle::seal_message(
            GROUP_SESSION_KIND,
            GroupSessionPickle::from(self),
            pickle_key,
        )
    }

    /// Restores a session from a pickle in the given format.
    pub fn from_pickle(pickle: &str, key: &[u8], format: PickleFormat) -> Result<Self, Error> {
        match format {
            PickleFormat::Current => {
                let mut decoded: GroupSessionPickle =
                    pickle::open_message(GROUP_SESSION_KIND, pickle, key)?;
                let session = Self::try_from(&decoded);
                decoded.zeroize();

                session
            }
            PickleFormat::Legacy => {
                let state = libolm::decrypt(pickle, key)?;
                let mut reader = Reader::new(&state);

                let version = reader.read_u32()?;
                if version != 1 {
                    return Err(Error::MalformedInput(format!(
                        "Unsupported libolm outbound group session pickle version: {version}"
                    )));
                }

                let session = Self {
                    ratchet: reader.read_megolm_ratchet()?,
                    signing_key: reader.read_ed25519_keypair()?,
                    config: SessionConfig::version_1(),
                };
                tracing::debug!(session_id = %session.session_id(), "Migrated libolm group session");

                Ok(session)
            }
        }
    }
}

impl InboundGroupSession {
    /// Serializes and encrypts the session with a 32 byte key.
    pub fn pickle(&self, pickle_key: &[u8]) -> Result<String, Error> {
        pickle::seal_message(
            INBOUND_GROUP_SESSION_KIND,
            InboundGroupSessionPickle::from(self),
            pickle_key,
        )
    }

    /// Restores a session from a pickle in the given format.
    pub fn from_pickle(pickle: &str, key: &[u8], format: PickleFormat) -> Result<Self, Error> {
        match format {
            PickleFormat::Current => {
                let mut decoded: InboundGroupSessionPickle =
                    pickle::open_message(INBOUND_GROUP_SESSION_KIND, pickle, key)?;
                let session = Self::try_from(&decoded);
                decoded.zeroize();

                session
            }
            PickleFormat::Legacy => {
                let state = libolm::decrypt(pickle, key)?;
                let mut reader = Reader::new(&state);

                let version = reader.read_u32()?;
                if !(1..=2).contains(&version) {
                    return Err(Error::MalformedInput(format!(
                        "Unsupported libolm inbound group session pickle version: {version}"
                    )));
                }

                let initial_ratchet = reader.read_megolm_ratchet()?;
                let latest_ratchet = reader.read_megolm_ratchet()?;
                let signing_key = reader.read_ed25519_public()?;
                // Version 1 sessions could only be created from a signed session key.
                let signing_key_verified = version == 1 || reader.read_bool()?;

                let session = Self {
                    initial_ratchet,
                    latest_ratchet,
                    signing_key,
                    signing_key_verified,
                    config: SessionConfig::version_1(),
                };
                tracing::debug!(
                    session_id = %session.session_id(),
                    first_known_index = session.first_known_index(),
                    "Migrated libolm inbound group session"
                );

                Ok(session)
            }
        }
    }
}
