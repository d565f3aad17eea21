use crate::Error;
use crate::cipher::hkdf_sha256;
use crate::ratchet::{ChainKey, RootKey};
use crate::types::{Curve25519PublicKey, Curve25519SecretKey, contributory_dh};
use zeroize::{Zeroize, ZeroizeOnDrop};

const ROOT_INFO: &[u8] = b"OLM_ROOT";

/// The concatenated output of the three Diffie-Hellman exchanges that start an
/// Olm session.
#[derive(Zeroize, ZeroizeOnDrop)]
pub(crate) struct Shared3DHSecret(Box<[u8; 96]>);

impl Shared3DHSecret {
    fn from_parts(
        first: (&Curve25519SecretKey, &Curve25519PublicKey),
        second: (&Curve25519SecretKey, &Curve25519PublicKey),
        third: (&Curve25519SecretKey, &Curve25519PublicKey),
    ) -> Result<Self, Error> {
        let mut secret = Box::new([0u8; 96]);

        for (chunk, (secret_key, public_key)) in
            secret.chunks_exact_mut(32).zip([first, second, third])
        {
            let shared = contributory_dh(secret_key, public_key)?;
            chunk.copy_from_slice(shared.as_bytes());
        }

        Ok(Self(secret))
    }

    /// The initiator's side: `DH(I_A, O_B) || DH(E_A, I_B) || DH(E_A, O_B)`.
    pub(crate) fn for_alice(
        identity_key: &Curve25519SecretKey,
        base_key: &Curve25519SecretKey,
        their_identity_key: &Curve25519PublicKey,
        their_one_time_key: &Curve25519PublicKey,
    ) -> Result<Self, Error> {
        Self::from_parts(
            (identity_key, their_one_time_key),
            (base_key, their_identity_key),
            (base_key, their_one_time_key),
        )
    }

    /// The responder's side: `DH(O_B, I_A) || DH(I_B, E_A) || DH(O_B, E_A)`.
    pub(crate) fn for_bob(
        identity_key: &Curve25519SecretKey,
        one_time_key: &Curve25519SecretKey,
        their_identity_key: &Curve25519PublicKey,
        their_base_key: &Curve25519PublicKey,
    ) -> Result<Self, Error> {
        Self::from_parts(
            (one_time_key, their_identity_key),
            (identity_key, their_base_key),
            (one_time_key, their_base_key),
        )
    }

    /// Derives the initial root key and chain key.
    pub(crate) fn expand(&self) -> (RootKey, ChainKey) {
        let output = hkdf_sha256::<64>(None, self.0.as_slice(), ROOT_INFO);

        let mut root_key = Box::new([0u8; 32]);
        let mut chain_key = Box::new([0u8; 32]);
        root_key.copy_from_slice(&output[..32]);
        chain_key.copy_from_slice(&output[32..]);

        (RootKey::new(root_key), ChainKey::new(chain_key))
    }
}
