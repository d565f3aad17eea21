use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};

/// Standard alphabet without padding on output, lenient about padding on input.
const ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Encodes bytes as unpadded standard base64.
pub fn base64_encode(input: impl AsRef<[u8]>) -> String {
    ENGINE.encode(input)
}

/// Decodes standard base64, padded or not.
pub fn base64_decode(input: impl AsRef<[u8]>) -> Result<Vec<u8>, base64::DecodeError> {
    ENGINE.decode(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding_omits_padding() {
        assert_eq!(base64_encode(b"ab"), "YWI");
        assert_eq!(base64_encode([0u8; 32]).len(), 43);
    }

    #[test]
    fn test_decoding_accepts_both_padding_styles() {
        assert_eq!(base64_decode("YWI").unwrap(), b"ab");
        assert_eq!(base64_decode("YWI=").unwrap(), b"ab");
        assert!(base64_decode("Y!I").is_err());
    }
}
