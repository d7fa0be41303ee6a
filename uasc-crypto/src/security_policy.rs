use std::fmt;
use std::str::FromStr;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use uasc_types::StatusCode;

type HmacSha256 = Hmac<Sha256>;

pub const SECURITY_POLICY_NONE_URI: &str = "http://opcfoundation.org/UA/SecurityPolicy#None";
pub const SECURITY_POLICY_BASIC256SHA256_URI: &str =
    "http://opcfoundation.org/UA/SecurityPolicy#Basic256Sha256";

/// The negotiated security algorithm suite for a channel. Only `None` and
/// `Basic256Sha256` are implemented; any other policy URI on the wire is
/// recognised (so a clear `BadSecurityPolicyRejected` can be returned)
/// without being implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SecurityPolicy {
    #[default]
    None,
    Basic256Sha256,
    Unknown,
}

impl SecurityPolicy {
    pub fn to_uri(self) -> &'static str {
        match self {
            SecurityPolicy::None => SECURITY_POLICY_NONE_URI,
            SecurityPolicy::Basic256Sha256 => SECURITY_POLICY_BASIC256SHA256_URI,
            SecurityPolicy::Unknown => "",
        }
    }

    /// Length, in bytes, the nonce exchanged during OpenSecureChannel must
    /// have under this policy. `None` exchanges no real entropy and is not
    /// validated; the others feed `derive_keys`.
    pub fn secure_channel_nonce_length(self) -> usize {
        match self {
            SecurityPolicy::None => 0,
            SecurityPolicy::Basic256Sha256 => 32,
            SecurityPolicy::Unknown => 0,
        }
    }

    pub fn symmetric_signature_size(self) -> usize {
        match self {
            SecurityPolicy::None => 0,
            SecurityPolicy::Basic256Sha256 => 32,
            SecurityPolicy::Unknown => 0,
        }
    }

    pub fn symmetric_key_length(self) -> usize {
        match self {
            SecurityPolicy::None => 0,
            SecurityPolicy::Basic256Sha256 => 32,
            SecurityPolicy::Unknown => 0,
        }
    }

    pub fn symmetric_block_size(self) -> usize {
        match self {
            SecurityPolicy::None => 1,
            SecurityPolicy::Basic256Sha256 => 16,
            SecurityPolicy::Unknown => 1,
        }
    }

    /// Derives signing key, encrypting key and IV for one direction from a
    /// shared secret and the peer's nonce, using the P_SHA256 keyed PRF
    /// (RFC 5246 §5, as referenced by OPC UA Part 6 §6.7.5).
    pub fn derive_keys(self, secret: &[u8], seed: &[u8]) -> (Vec<u8>, Vec<u8>, Vec<u8>) {
        if self == SecurityPolicy::None {
            return (Vec::new(), Vec::new(), Vec::new());
        }
        let signing_length = self.symmetric_signature_size();
        let encrypting_length = self.symmetric_key_length();
        let iv_length = self.symmetric_block_size();
        let total = signing_length + encrypting_length + iv_length;
        let bytes = p_sha256(secret, seed, total);
        let signing_key = bytes[..signing_length].to_vec();
        let encrypting_key = bytes[signing_length..signing_length + encrypting_length].to_vec();
        let iv = bytes[signing_length + encrypting_length..total].to_vec();
        (signing_key, encrypting_key, iv)
    }
}

/// P_SHA256(secret, seed) PRF, truncated/extended to `length` bytes.
fn p_sha256(secret: &[u8], seed: &[u8], length: usize) -> Vec<u8> {
    let mut result = Vec::with_capacity(length + 32);
    let mut a = hmac_sha256(secret, seed);
    while result.len() < length {
        let mut input = a.clone();
        input.extend_from_slice(seed);
        result.extend_from_slice(&hmac_sha256(secret, &input));
        a = hmac_sha256(secret, &a);
    }
    result.truncate(length);
    result
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

impl FromStr for SecurityPolicy {
    type Err = StatusCode;

    fn from_str(uri: &str) -> Result<Self, Self::Err> {
        Ok(match uri {
            "" | SECURITY_POLICY_NONE_URI => SecurityPolicy::None,
            SECURITY_POLICY_BASIC256SHA256_URI => SecurityPolicy::Basic256Sha256,
            _ => SecurityPolicy::Unknown,
        })
    }
}

impl fmt::Display for SecurityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_uri())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_uri_is_recognised_but_not_implemented() {
        assert_eq!(
            SecurityPolicy::from_str("http://opcfoundation.org/UA/SecurityPolicy#Aes256_Sha256_RsaPss")
                .unwrap(),
            SecurityPolicy::Unknown
        );
    }

    #[test]
    fn none_derives_no_keys() {
        let (sign, enc, iv) = SecurityPolicy::None.derive_keys(b"secret", b"seed");
        assert!(sign.is_empty() && enc.is_empty() && iv.is_empty());
    }

    #[test]
    fn basic256sha256_derives_expected_lengths() {
        let (sign, enc, iv) = SecurityPolicy::Basic256Sha256.derive_keys(b"a-secret-nonce", b"a-seed-nonce");
        assert_eq!(sign.len(), 32);
        assert_eq!(enc.len(), 32);
        assert_eq!(iv.len(), 16);
    }

    #[test]
    fn derivation_is_deterministic() {
        let a = SecurityPolicy::Basic256Sha256.derive_keys(b"secret", b"seed");
        let b = SecurityPolicy::Basic256Sha256.derive_keys(b"secret", b"seed");
        assert_eq!(a, b);
    }

    #[test]
    fn derivation_depends_on_direction() {
        let client = SecurityPolicy::Basic256Sha256.derive_keys(b"server-nonce", b"client-nonce");
        let server = SecurityPolicy::Basic256Sha256.derive_keys(b"client-nonce", b"server-nonce");
        assert_ne!(client, server);
    }
}
