//! Challenge-response signing for the local protocol.
//!
//! The device hands out a one-time hex nonce; the client must fold it into a
//! double SHA-256 over the shared api key and the exact command payload it is
//! about to post. The device recomputes the hash, so the payload bytes signed
//! here must match the posted `command`/`value` fields verbatim.

use sha2::Digest;
use sha2::Sha256;

/// Compute the `response` field for a local command post.
///
/// `signature = SHA256(api_key || challenge_bytes || "{command}={value}")`
/// `response  = hex(SHA256(api_key || signature))`
///
/// Pure function: identical inputs always produce the identical hex string.
pub fn sign_command(
    api_key: &[u8],
    challenge_hex: &str,
    command: &str,
    value: &str,
) -> Result<String, hex::FromHexError> {
    let challenge = hex::decode(challenge_hex.trim())?;
    let payload = format!("{}={}", command, value);

    let mut hasher = Sha256::new();
    hasher.update(api_key);
    hasher.update(&challenge);
    hasher.update(payload.as_bytes());
    let signature = hasher.finalize();

    let mut hasher = Sha256::new();
    hasher.update(api_key);
    hasher.update(signature);
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signing_is_deterministic() {
        let key = [0xde, 0xad, 0xbe, 0xef];
        let a = sign_command(&key, "a1b2", "height", "4").unwrap();
        let b = sign_command(&key, "a1b2", "height", "4").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_signing_matches_manual_double_hash() {
        // challenge "a1b2" decodes to the raw bytes 0xa1 0xb2, and the signed
        // payload is the literal string "height=4".
        let key = [0xde, 0xad, 0xbe, 0xef];

        let mut hasher = Sha256::new();
        hasher.update(key);
        hasher.update([0xa1, 0xb2]);
        hasher.update(b"height=4");
        let signature = hasher.finalize();

        let mut hasher = Sha256::new();
        hasher.update(key);
        hasher.update(signature);
        let expected = hex::encode(hasher.finalize());

        assert_eq!(sign_command(&key, "a1b2", "height", "4").unwrap(), expected);
    }

    #[test]
    fn test_signing_varies_with_inputs() {
        let key = [0x01, 0x02];
        let base = sign_command(&key, "a1b2", "height", "4").unwrap();
        assert_ne!(base, sign_command(&key, "a1b3", "height", "4").unwrap());
        assert_ne!(base, sign_command(&key, "a1b2", "power", "4").unwrap());
        assert_ne!(base, sign_command(&key, "a1b2", "height", "5").unwrap());
        assert_ne!(base, sign_command(&[0x01], "a1b2", "height", "4").unwrap());
    }

    #[test]
    fn test_whitespace_around_challenge_is_ignored() {
        let key = [0x01];
        assert_eq!(
            sign_command(&key, "a1b2\n", "power", "1").unwrap(),
            sign_command(&key, "a1b2", "power", "1").unwrap()
        );
    }

    #[test]
    fn test_invalid_challenge_hex() {
        assert!(sign_command(&[0x01], "not-hex", "power", "1").is_err());
    }
}
