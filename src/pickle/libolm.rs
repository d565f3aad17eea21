//! Read-only support for pickles produced by libolm.
//!
//! A libolm pickle is `base64(AES-256-CBC(state) || HMAC-SHA-256(..)[..8])`,
//! with the cipher keys expanded from the passphrase by HKDF. The state is a
//! flat big-endian binary layout, versioned per object type.

use crate::Error;
use crate::cipher::Cipher;
use crate::encoding::base64_decode;
use crate::megolm::MegolmRatchet;
use crate::types::{Curve25519Keypair, Curve25519PublicKey, Curve25519SecretKey};
use crate::types::{Ed25519Keypair, Ed25519PublicKey};
use zeroize::Zeroizing;

/// Decrypts a libolm pickle into its binary state.
pub(crate) fn decrypt(pickle: &str, passphrase: &[u8]) -> Result<Zeroizing<Vec<u8>>, Error> {
    let bytes = base64_decode(pickle)?;

    Cipher::new_pickle(passphrase)
        .decrypt_pickle(&bytes)
        .inspect_err(|_| tracing::warn!("Legacy pickle failed to decrypt"))
}

/// Cursor over libolm's binary pickle layout.
pub(crate) struct Reader<'a> {
    bytes: &'a [u8],
}

impl<'a> Reader<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8], Error> {
        if self.bytes.len() < count {
            return Err(Error::MalformedInput(
                "Legacy pickle ended unexpectedly".to_string(),
            ));
        }

        let (head, tail) = self.bytes.split_at(count);
        self.bytes = tail;
        Ok(head)
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, Error> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn read_bool(&mut self) -> Result<bool, Error> {
        Ok(self.read_u8()? != 0)
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, Error> {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(self.take(4)?);
        Ok(u32::from_be_bytes(bytes))
    }

    pub(crate) fn read_key(&mut self) -> Result<Box<[u8; 32]>, Error> {
        let mut key = Box::new([0u8; 32]);
        key.copy_from_slice(self.take(32)?);
        Ok(key)
    }

    pub(crate) fn read_curve25519_public(&mut self) -> Result<Curve25519PublicKey, Error> {
        Curve25519PublicKey::from_slice(self.take(32)?)
    }

    /// A Curve25519 pair is stored as public key then secret key.
    pub(crate) fn read_curve25519_keypair(&mut self) -> Result<Curve25519Keypair, Error> {
        let public_key = self.read_curve25519_public()?;
        let secret_key = Curve25519SecretKey::from_slice(self.take(32)?)?;
        let keypair = Curve25519Keypair::from_secret_key(secret_key);

        if keypair.public_key() != public_key {
            return Err(Error::MalformedInput(
                "Legacy pickle holds a mismatched Curve25519 key pair".to_string(),
            ));
        }

        Ok(keypair)
    }

    pub(crate) fn read_ed25519_public(&mut self) -> Result<Ed25519PublicKey, Error> {
        Ed25519PublicKey::from_slice(self.take(32)?)
    }

    /// An Ed25519 pair is stored as public key then 64 byte expanded secret.
    pub(crate) fn read_ed25519_keypair(&mut self) -> Result<Ed25519Keypair, Error> {
        let public_key = self.read_ed25519_public()?;
        Ed25519Keypair::from_expanded(self.take(64)?, public_key)
    }

    /// A Megolm ratchet is stored as its 128 byte state then the counter.
    pub(crate) fn read_megolm_ratchet(&mut self) -> Result<MegolmRatchet, Error> {
        let mut parts = Box::new(Zeroizing::new([0u8; 128]));
        parts.copy_from_slice(self.take(128)?);
        let counter = self.read_u32()?;

        Ok(MegolmRatchet::from_parts(&parts, counter))
    }
}

/// Writer for the same layout, used to build fixtures.
#[cfg(test)]
pub(crate) mod writer {
    use crate::cipher::Cipher;
    use crate::encoding::base64_encode;

    #[derive(Default)]
    pub(crate) struct Writer {
        pub(crate) bytes: Vec<u8>,
    }

    impl Writer {
        pub(crate) fn u8(&mut self, value: u8) -> &mut Self {
            self.bytes.push(value);
            self
        }

        pub(crate) fn u32(&mut self, value: u32) -> &mut Self {
            self.bytes.extend_from_slice(&value.to_be_bytes());
            self
        }

        pub(crate) fn bytes(&mut self, value: &[u8]) -> &mut Self {
            self.bytes.extend_from_slice(value);
            self
        }

        pub(crate) fn encrypt(&self, passphrase: &[u8]) -> String {
            base64_encode(Cipher::new_pickle(passphrase).encrypt_pickle(&self.bytes))
        }
    }
}
