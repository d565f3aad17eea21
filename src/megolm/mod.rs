//! Megolm, the one-to-many group ratchet.

mod group_session;
mod inbound_group_session;
mod message;
mod ratchet;
mod session_keys;

pub use group_session::GroupSession;
pub use inbound_group_session::{DecryptedMessage, InboundGroupSession, SessionOrdering};
pub use message::MegolmMessage;
pub use ratchet::MegolmRatchet;
pub use session_keys::{ExportedSessionKey, SessionKey};
