use sha1::{Digest, Sha1};
use uasc_types::{ByteString, Error, EncodingResult, StatusCode};

use crate::pkey::PrivateKey;

/// Size, in bytes, of the SHA-1 thumbprint used by
/// `AsymmetricSecurityHeader::receiver_certificate_thumbprint`.
pub const THUMBPRINT_SIZE: usize = 20;

pub fn thumbprint(der: &[u8]) -> [u8; THUMBPRINT_SIZE] {
    let mut hasher = Sha1::new();
    hasher.update(der);
    hasher.finalize().into()
}

/// Source of this application's own identity (certificate + private key)
/// and a place to register trusted peer certificates. File-based PKI
/// storage is out of scope for this core; [`MemoryCertificateStore`] is
/// the default, in-process implementation.
pub trait CertificateStore: Send + Sync {
    fn read_own_cert(&self) -> EncodingResult<ByteString>;
    fn read_own_pkey(&self) -> EncodingResult<PrivateKey>;
    fn is_trusted(&self, der: &[u8]) -> bool;
}

#[derive(Clone)]
pub struct MemoryCertificateStore {
    own_cert: ByteString,
    own_key: Option<PrivateKey>,
    trusted: Vec<Vec<u8>>,
}

impl MemoryCertificateStore {
    pub fn new() -> Self {
        Self {
            own_cert: ByteString::null(),
            own_key: None,
            trusted: Vec::new(),
        }
    }

    pub fn with_identity(mut self, cert_der: Vec<u8>, key: PrivateKey) -> Self {
        self.own_cert = ByteString::from(cert_der);
        self.own_key = Some(key);
        self
    }

    pub fn trust(&mut self, der: Vec<u8>) {
        self.trusted.push(der);
    }
}

impl Default for MemoryCertificateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CertificateStore for MemoryCertificateStore {
    fn read_own_cert(&self) -> EncodingResult<ByteString> {
        if self.own_cert.is_null() {
            Err(Error::new(
                StatusCode::BadCertificateInvalid,
                "no local certificate configured",
            ))
        } else {
            Ok(self.own_cert.clone())
        }
    }

    fn read_own_pkey(&self) -> EncodingResult<PrivateKey> {
        self.own_key.clone().ok_or_else(|| {
            Error::new(
                StatusCode::BadCertificateInvalid,
                "no local private key configured",
            )
        })
    }

    fn is_trusted(&self, der: &[u8]) -> bool {
        self.trusted.iter().any(|t| t.as_slice() == der)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thumbprint_is_deterministic() {
        let data = b"certificate bytes";
        assert_eq!(thumbprint(data), thumbprint(data));
    }

    #[test]
    fn empty_store_rejects_reads() {
        let store = MemoryCertificateStore::new();
        assert!(store.read_own_cert().is_err());
        assert!(store.read_own_pkey().is_err());
    }

    #[test]
    fn trust_registers_a_certificate() {
        let mut store = MemoryCertificateStore::new();
        let der = vec![1, 2, 3];
        assert!(!store.is_trusted(&der));
        store.trust(der.clone());
        assert!(store.is_trusted(&der));
    }
}
