use crate::Error;
use aes::Aes256;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hkdf::Hkdf;
use hmac::digest::KeyInit;
use hmac::digest::generic_array::GenericArray;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::Zeroizing;

pub(crate) type HmacSha256 = Hmac<Sha256>;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

const OLM_KEYS_INFO: &[u8] = b"OLM_KEYS";
const MEGOLM_KEYS_INFO: &[u8] = b"MEGOLM_KEYS";
const PICKLE_KEYS_INFO: &[u8] = b"Pickle";

/// Length of the MAC appended to libolm pickles.
pub(crate) const PICKLE_MAC_LENGTH: usize = 8;

/// HKDF-SHA-256 into a fixed-size, self-wiping buffer.
pub(crate) fn hkdf_sha256<const N: usize>(
    salt: Option<&[u8]>,
    ikm: &[u8],
    info: &[u8],
) -> Zeroizing<[u8; N]> {
    const { assert!(N <= 255 * 32, "HKDF-SHA-256 output is limited to 8160 bytes") };

    let hkdf = Hkdf::<Sha256>::new(salt, ikm);
    let mut okm = Zeroizing::new([0u8; N]);
    // Expansion only fails for outputs longer than 255 blocks.
    let _ = hkdf.expand(info, okm.as_mut_slice());

    okm
}

/// HMAC-SHA-256 keyed with a 32 byte secret.
pub(crate) fn hmac_sha256(key: &[u8; 32]) -> HmacSha256 {
    // HMAC zero-pads short keys to the block size, so doing it here is equivalent.
    let mut block = Zeroizing::new([0u8; 64]);
    block[..32].copy_from_slice(key);

    <HmacSha256 as KeyInit>::new(GenericArray::from_slice(block.as_slice()))
}

/// AES-256-CBC with an HMAC-SHA-256 tag, keyed from a single secret.
///
/// This is the cipher libolm uses for Olm messages, Megolm messages and
/// pickles. Each use derives 80 bytes with HKDF: the AES key, the MAC key and
/// the IV.
pub(crate) struct Cipher {
    keys: Zeroizing<[u8; 80]>,
}

impl Cipher {
    pub(crate) fn new_olm(message_key: &[u8; 32]) -> Self {
        Self {
            keys: hkdf_sha256(None, message_key, OLM_KEYS_INFO),
        }
    }

    pub(crate) fn new_megolm(ratchet: &[u8; 128]) -> Self {
        Self {
            keys: hkdf_sha256(None, ratchet, MEGOLM_KEYS_INFO),
        }
    }

    pub(crate) fn new_pickle(passphrase: &[u8]) -> Self {
        Self {
            keys: hkdf_sha256(None, passphrase, PICKLE_KEYS_INFO),
        }
    }

    fn aes_key(&self) -> Zeroizing<[u8; 32]> {
        let mut key = Zeroizing::new([0u8; 32]);
        key.copy_from_slice(&self.keys[..32]);
        key
    }

    fn mac_key(&self) -> Zeroizing<[u8; 32]> {
        let mut key = Zeroizing::new([0u8; 32]);
        key.copy_from_slice(&self.keys[32..64]);
        key
    }

    fn iv(&self) -> [u8; 16] {
        let mut iv = [0u8; 16];
        iv.copy_from_slice(&self.keys[64..80]);
        iv
    }

    pub(crate) fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        let key = self.aes_key();
        let iv = self.iv();

        Aes256CbcEnc::new(
            GenericArray::from_slice(key.as_slice()),
            GenericArray::from_slice(&iv),
        )
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext)
    }

    pub(crate) fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, Error> {
        let key = self.aes_key();
        let iv = self.iv();

        Aes256CbcDec::new(
            GenericArray::from_slice(key.as_slice()),
            GenericArray::from_slice(&iv),
        )
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| Error::AuthenticationFailed("Invalid ciphertext padding".to_string()))
    }

    /// Full 32 byte MAC over `bytes`.
    pub(crate) fn mac(&self, bytes: &[u8]) -> [u8; 32] {
        let mut mac = hmac_sha256(&self.mac_key());
        mac.update(bytes);
        mac.finalize().into_bytes().into()
    }

    /// Checks a tag over `bytes`. Tags shorter than 32 bytes are truncated MACs.
    pub(crate) fn verify_mac(&self, bytes: &[u8], tag: &[u8]) -> Result<(), Error> {
        let mut mac = hmac_sha256(&self.mac_key());
        mac.update(bytes);

        let result = if tag.len() == 32 {
            mac.verify_slice(tag)
        } else {
            mac.verify_truncated_left(tag)
        };

        result.map_err(|_| Error::AuthenticationFailed("MAC verification failed".to_string()))
    }

    /// Encrypts a libolm pickle: ciphertext followed by a truncated MAC.
    #[cfg(test)]
    pub(crate) fn encrypt_pickle(&self, plaintext: &[u8]) -> Vec<u8> {
        let mut ciphertext = self.encrypt(plaintext);
        let mac = self.mac(&ciphertext);
        ciphertext.extend_from_slice(&mac[..PICKLE_MAC_LENGTH]);
        ciphertext
    }

    /// Decrypts a libolm pickle after checking its truncated MAC.
    pub(crate) fn decrypt_pickle(&self, bytes: &[u8]) -> Result<Zeroizing<Vec<u8>>, Error> {
        if bytes.len() < PICKLE_MAC_LENGTH {
            return Err(Error::MalformedInput("Pickle is too short".to_string()));
        }

        let (ciphertext, tag) = bytes.split_at(bytes.len() - PICKLE_MAC_LENGTH);
        self.verify_mac(ciphertext, tag)?;

        Ok(Zeroizing::new(self.decrypt(ciphertext)?))
    }
}
