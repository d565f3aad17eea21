#[macro_use]
extern crate afl;
use polyratchet::{OlmMessage, megolm::MegolmMessage};

fn main() {
    fuzz!(|data: &[u8]| {
        if let Some((&message_type, body)) = data.split_first() {
            if let Ok(body) = std::str::from_utf8(body) {
                let _ = OlmMessage::from_parts(usize::from(message_type % 3), body);
            }
        }
        let _ = MegolmMessage::from_bytes(data);
    });
}
