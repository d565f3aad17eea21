#[macro_use]
extern crate afl;
use polyratchet::{Account, Message, OlmMessage, PreKeyMessage, Session, SessionConfig};

fn get_session() -> Session {
    // The Victim
    let alice = Account::new();

    // The Attacker context
    let mut bob = Account::new();
    bob.generate_one_time_keys(1).expect("Setup failed");
    let one_time_key = *bob.one_time_keys().values().next().expect("Setup failed");

    alice
        .create_outbound_session(SessionConfig::version_1(), bob.curve25519_key(), one_time_key)
        .expect("Setup failed")
}

fn main() {
    let mut session = get_session();

    fuzz!(|data: &[u8]| {
        if let Ok(message) = Message::from_bytes(data) {
            let _ = session.decrypt(&OlmMessage::Normal(message));
        } else if let Ok(message) = PreKeyMessage::from_bytes(data) {
            let _ = session.decrypt(&OlmMessage::PreKey(message));
        }
    });
}
