//! Default, swappable cryptography capability for the secure channel core:
//! security policy negotiation, symmetric/asymmetric sign-verify-encrypt-
//! decrypt, key derivation, nonce generation, and an in-memory certificate
//! store. None of this is on the hot path of the chunk/channel state
//! machines — it is consumed through [`CryptoProvider`] so a different
//! implementation (e.g. backed by a hardware security module) can be
//! substituted without touching `uasc-core`.

pub mod asymmetric;
pub mod certificate_store;
pub mod pkey;
pub mod random;
pub mod security_policy;
pub mod symmetric;
pub mod x509;

pub use certificate_store::{CertificateStore, MemoryCertificateStore};
pub use pkey::{PrivateKey, PublicKey};
pub use security_policy::SecurityPolicy;

use uasc_types::EncodingResult;

/// Everything the secure channel state machine needs from cryptography,
/// gathered behind one trait so `uasc-core` never imports `aes`/`rsa`/`sha2`
/// directly.
pub trait CryptoProvider: Send + Sync {
    fn security_policy(&self) -> SecurityPolicy;

    fn generate_nonce(&self) -> uasc_types::ByteString {
        random::byte_string(self.security_policy().secure_channel_nonce_length().max(1))
    }

    fn derive_channel_keys(&self, secret: &[u8], seed: &[u8]) -> (Vec<u8>, Vec<u8>, Vec<u8>) {
        self.security_policy().derive_keys(secret, seed)
    }

    fn symmetric_sign(&self, signing_key: &[u8], data: &[u8]) -> EncodingResult<Vec<u8>> {
        symmetric::sign(signing_key, data)
    }

    fn symmetric_verify(&self, signing_key: &[u8], data: &[u8], signature: &[u8]) -> EncodingResult<()> {
        symmetric::verify(signing_key, data, signature)
    }

    fn symmetric_encrypt(&self, key: &[u8], iv: &[u8], plaintext: &[u8]) -> EncodingResult<Vec<u8>> {
        symmetric::encrypt(key, iv, plaintext)
    }

    fn symmetric_decrypt(&self, key: &[u8], iv: &[u8], ciphertext: &[u8]) -> EncodingResult<Vec<u8>> {
        symmetric::decrypt(key, iv, ciphertext)
    }
}

/// The software `CryptoProvider` used unless an embedder supplies their
/// own. `policy` is fixed at construction since a channel's policy is
/// settled once, at OPN time.
pub struct DefaultCryptoProvider {
    policy: SecurityPolicy,
}

impl DefaultCryptoProvider {
    pub fn new(policy: SecurityPolicy) -> Self {
        Self { policy }
    }
}

impl CryptoProvider for DefaultCryptoProvider {
    fn security_policy(&self) -> SecurityPolicy {
        self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_provider_generates_policy_sized_nonce() {
        let provider = DefaultCryptoProvider::new(SecurityPolicy::Basic256Sha256);
        let nonce = provider.generate_nonce();
        assert_eq!(nonce.as_bytes().len(), 32);
    }

    #[test]
    fn none_policy_generates_single_byte_nonce() {
        let provider = DefaultCryptoProvider::new(SecurityPolicy::None);
        let nonce = provider.generate_nonce();
        assert_eq!(nonce.as_bytes().len(), 1);
    }
}
