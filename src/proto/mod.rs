//! Protobuf schemas for pickled state, and the conversions to and from them.

mod account;
mod megolm;
mod session;

use crate::megolm::MegolmRatchet;
use crate::types::{Ed25519Keypair, Ed25519PublicKey};
use crate::{Error, SessionConfig};
use zeroize::{Zeroize, Zeroizing};

#[derive(Clone, PartialEq, prost::Message, Zeroize)]
pub(crate) struct Ed25519KeypairPickle {
    #[prost(bytes = "vec", tag = "1")]
    pub(crate) secret_key: Vec<u8>,
    #[prost(bool, tag = "2")]
    pub(crate) expanded: bool,
    #[prost(bytes = "vec", tag = "3")]
    pub(crate) public_key: Vec<u8>,
}

#[derive(Clone, PartialEq, prost::Message, Zeroize)]
pub(crate) struct OneTimeKeyPickle {
    #[prost(uint64, tag = "1")]
    pub(crate) key_id: u64,
    #[prost(bytes = "vec", tag = "2")]
    pub(crate) secret_key: Vec<u8>,
    #[prost(bool, tag = "3")]
    pub(crate) published: bool,
}

#[derive(Clone, PartialEq, prost::Message, Zeroize)]
pub(crate) struct AccountConfigPickle {
    #[prost(uint64, tag = "1")]
    pub(crate) max_one_time_keys: u64,
    #[prost(uint64, tag = "2")]
    pub(crate) one_time_key_capacity: u64,
    #[prost(bool, tag = "3")]
    pub(crate) reject_overflow: bool,
}

#[derive(Clone, PartialEq, prost::Message, Zeroize)]
pub(crate) struct AccountPickle {
    #[prost(message, optional, tag = "1")]
    pub(crate) signing_key: Option<Ed25519KeypairPickle>,
    #[prost(bytes = "vec", tag = "2")]
    pub(crate) diffie_hellman_key: Vec<u8>,
    #[prost(message, repeated, tag = "3")]
    pub(crate) one_time_keys: Vec<OneTimeKeyPickle>,
    #[prost(uint64, tag = "4")]
    pub(crate) next_key_id: u64,
    #[prost(message, optional, tag = "5")]
    pub(crate) fallback_key: Option<OneTimeKeyPickle>,
    #[prost(message, optional, tag = "6")]
    pub(crate) previous_fallback_key: Option<OneTimeKeyPickle>,
    #[prost(message, optional, tag = "7")]
    pub(crate) config: Option<AccountConfigPickle>,
}

#[derive(Clone, PartialEq, prost::Message, Zeroize)]
pub(crate) struct SessionKeysPickle {
    #[prost(bytes = "vec", tag = "1")]
    pub(crate) identity_key: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub(crate) base_key: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub(crate) one_time_key: Vec<u8>,
}

#[derive(Clone, PartialEq, prost::Message, Zeroize)]
pub(crate) struct ChainKeyPickle {
    #[prost(bytes = "vec", tag = "1")]
    pub(crate) key: Vec<u8>,
    #[prost(uint32, tag = "2")]
    pub(crate) index: u32,
}

#[derive(Clone, PartialEq, prost::Message, Zeroize)]
pub(crate) struct ActiveRatchetPickle {
    #[prost(bytes = "vec", tag = "1")]
    pub(crate) ratchet_key: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub(crate) chain_key: Option<ChainKeyPickle>,
}

#[derive(Clone, PartialEq, prost::Message, Zeroize)]
pub(crate) struct InactiveRatchetPickle {
    #[prost(bytes = "vec", tag = "1")]
    pub(crate) remote_key: Vec<u8>,
}

#[derive(Clone, PartialEq, prost::Oneof, Zeroize)]
pub(crate) enum RatchetStatePickle {
    #[prost(message, tag = "2")]
    Active(ActiveRatchetPickle),
    #[prost(message, tag = "3")]
    Inactive(InactiveRatchetPickle),
}

#[derive(Clone, PartialEq, prost::Message, Zeroize)]
pub(crate) struct SendingRatchetPickle {
    #[prost(bytes = "vec", tag = "1")]
    pub(crate) root_key: Vec<u8>,
    #[prost(oneof = "RatchetStatePickle", tags = "2, 3")]
    pub(crate) state: Option<RatchetStatePickle>,
}

#[derive(Clone, PartialEq, prost::Message, Zeroize)]
pub(crate) struct ReceiverChainPickle {
    #[prost(bytes = "vec", tag = "1")]
    pub(crate) ratchet_key: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub(crate) chain_key: Option<ChainKeyPickle>,
    #[prost(message, repeated, tag = "3")]
    pub(crate) skipped_keys: Vec<ChainKeyPickle>,
}

#[derive(Clone, PartialEq, prost::Message, Zeroize)]
pub(crate) struct SessionPickle {
    #[prost(message, optional, tag = "1")]
    pub(crate) session_keys: Option<SessionKeysPickle>,
    #[prost(message, optional, tag = "2")]
    pub(crate) sending_ratchet: Option<SendingRatchetPickle>,
    #[prost(message, repeated, tag = "3")]
    pub(crate) receiver_chains: Vec<ReceiverChainPickle>,
    #[prost(uint32, tag = "4")]
    pub(crate) version: u32,
}

#[derive(Clone, PartialEq, prost::Message, Zeroize)]
pub(crate) struct MegolmRatchetPickle {
    #[prost(bytes = "vec", tag = "1")]
    pub(crate) parts: Vec<u8>,
    #[prost(uint32, tag = "2")]
    pub(crate) counter: u32,
}

#[derive(Clone, PartialEq, prost::Message, Zeroize)]
pub(crate) struct GroupSessionPickle {
    #[prost(message, optional, tag = "1")]
    pub(crate) ratchet: Option<MegolmRatchetPickle>,
    #[prost(message, optional, tag = "2")]
    pub(crate) signing_key: Option<Ed25519KeypairPickle>,
    #[prost(uint32, tag = "3")]
    pub(crate) version: u32,
}

#[derive(Clone, PartialEq, prost::Message, Zeroize)]
pub(crate) struct InboundGroupSessionPickle {
    #[prost(message, optional, tag = "1")]
    pub(crate) initial_ratchet: Option<MegolmRatchetPickle>,
    #[prost(message, optional, tag = "2")]
    pub(crate) latest_ratchet: Option<MegolmRatchetPickle>,
    #[prost(bytes = "vec", tag = "3")]
    pub(crate) signing_key: Vec<u8>,
    #[prost(bool, tag = "4")]
    pub(crate) signing_key_verified: bool,
    #[prost(uint32, tag = "5")]
    pub(crate) version: u32,
}

fn missing(field: &str) -> Error {
    Error::MalformedInput(format!("Pickle is missing the {field}"))
}

/// Copies a 32 byte secret out of a pickle field.
fn key_from_slice(bytes: &[u8], field: &str) -> Result<Box<[u8; 32]>, Error> {
    let mut key = Box::new([0u8; 32]);
    if bytes.len() != key.len() {
        return Err(Error::MalformedInput(format!(
            "Pickled {field} must be 32 bytes, got {}",
            bytes.len()
        )));
    }
    key.copy_from_slice(bytes);
    Ok(key)
}

fn session_config(version: u32) -> Result<SessionConfig, Error> {
    SessionConfig::from_version_number(version).ok_or_else(|| {
        Error::MalformedInput(format!("Unsupported session config version: {version}"))
    })
}

impl From<&Ed25519Keypair> for Ed25519KeypairPickle {
    fn from(keypair: &Ed25519Keypair) -> Self {
        let (secret_key, expanded) = keypair.secret_bytes();

        Self {
            secret_key: secret_key.to_vec(),
            expanded,
            public_key: keypair.public_key().as_bytes().to_vec(),
        }
    }
}

impl TryFrom<&Ed25519KeypairPickle> for Ed25519Keypair {
    type Error = Error;

    fn try_from(pickle: &Ed25519KeypairPickle) -> Result<Self, Self::Error> {
        let public_key = Ed25519PublicKey::from_slice(&pickle.public_key)?;

        let keypair = if pickle.expanded {
            Ed25519Keypair::from_expanded(&pickle.secret_key, public_key)?
        } else {
            Ed25519Keypair::from_seed(&pickle.secret_key)?
        };

        if keypair.public_key() != public_key {
            return Err(Error::MalformedInput(
                "Pickled Ed25519 key pair does not match its public key".to_string(),
            ));
        }

        Ok(keypair)
    }
}

impl From<&MegolmRatchet> for MegolmRatchetPickle {
    fn from(ratchet: &MegolmRatchet) -> Self {
        Self {
            parts: ratchet.as_bytes().to_vec(),
            counter: ratchet.index(),
        }
    }
}

impl TryFrom<&MegolmRatchetPickle> for MegolmRatchet {
    type Error = Error;

    fn try_from(pickle: &MegolmRatchetPickle) -> Result<Self, Self::Error> {
        let mut parts = Zeroizing::new([0u8; 128]);
        if pickle.parts.len() != parts.len() {
            return Err(Error::MalformedInput(format!(
                "Pickled Megolm ratchet must be 128 bytes, got {}",
                pickle.parts.len()
            )));
        }
        parts.copy_from_slice(&pickle.parts);

        Ok(MegolmRatchet::from_parts(&parts, pickle.counter))
    }
}
