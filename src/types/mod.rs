mod curve25519;
mod ed25519;
mod key_id;

pub use curve25519::{Curve25519Keypair, Curve25519PublicKey, Curve25519SecretKey};
pub(crate) use curve25519::contributory_dh;
#[cfg(test)]
pub(crate) use ed25519::expand_seed;
pub use ed25519::{Ed25519Keypair, Ed25519PublicKey, Ed25519Signature};
pub use key_id::KeyId;

use rand::RngCore;

/// Fills a boxed array from the thread-local CSPRNG.
pub(crate) fn random_bytes<const N: usize>() -> Box<[u8; N]> {
    let mut bytes = Box::new([0u8; N]);
    rand::rng().fill_bytes(bytes.as_mut_slice());
    bytes
}
