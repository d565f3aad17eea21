/// Errors that can occur during Olm, Megolm and SAS operations.
#[derive(thiserror::Error, Debug, Clone, Eq, PartialEq)]
pub enum Error {
    /// A pickle key was not exactly the required length.
    #[error("Invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength {
        /// The number of bytes the key must have.
        expected: usize,
        /// The number of bytes that were supplied.
        actual: usize,
    },

    /// A key, message or pickle could not be parsed.
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// A MAC, signature, padding or AEAD check failed.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// No usable key material exists for the request.
    #[error("Key exhausted: {0}")]
    KeyExhausted(String),

    /// A protocol rule was violated.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),
}

impl From<aes_gcm_siv::Error> for Error {
    fn from(value: aes_gcm_siv::Error) -> Self {
        Self::AuthenticationFailed(value.to_string())
    }
}

impl From<base64::DecodeError> for Error {
    fn from(value: base64::DecodeError) -> Self {
        Self::MalformedInput(format!("Invalid base64: {value}"))
    }
}

impl From<prost::DecodeError> for Error {
    fn from(value: prost::DecodeError) -> Self {
        Self::MalformedInput(format!("Invalid protobuf encoding: {value}"))
    }
}
