use crate::encoding::base64_encode;
use std::fmt;

/// Identifier of a one-time or fallback key within an account.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyId(pub(crate) u64);

impl KeyId {
    /// Encodes the identifier as base64 of its big-endian bytes.
    pub fn to_base64(self) -> String {
        base64_encode(self.0.to_be_bytes())
    }

    /// Returns the numeric identifier.
    pub fn value(self) -> u64 {
        self.0
    }
}

impl From<u64> for KeyId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}
