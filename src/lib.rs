mod account;
pub use account::{Account, IdentityKeys, InboundCreationResult, OneTimeKeyGenerationResult};

mod cipher;

mod config;
pub use config::{AccountConfig, OverflowPolicy, ProtocolVersion, SessionConfig};

mod encoding;
pub use encoding::{base64_decode, base64_encode};

mod error;
pub use error::Error;

pub mod megolm;

mod pickle;
pub use pickle::{PICKLE_KEY_LENGTH, PickleFormat};

mod proto;

mod ratchet;
pub use ratchet::{Message, MessageType, OlmMessage, PreKeyMessage, SessionKeys};

pub mod sas;

mod session;
pub use session::Session;

mod shared_secret;

mod types;
pub use types::{
    Curve25519Keypair, Curve25519PublicKey, Curve25519SecretKey, Ed25519Keypair, Ed25519PublicKey,
    Ed25519Signature, KeyId,
};
