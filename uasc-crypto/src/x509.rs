use rsa::pkcs8::DecodePublicKey;
use rsa::RsaPublicKey;
use x509_cert::der::{Decode, Encode};
use x509_cert::Certificate;

use uasc_types::{Error, EncodingResult, StatusCode};

use crate::pkey::PublicKey;

/// Parses a DER-encoded X.509 certificate and extracts its RSA public key,
/// used to verify the asymmetric signature on an OpenSecureChannel request
/// and to encrypt the response back to the sender.
pub fn public_key_from_certificate(der: &[u8]) -> EncodingResult<PublicKey> {
    let cert = Certificate::from_der(der)
        .map_err(|e| Error::new(StatusCode::BadCertificateInvalid, e.to_string()))?;
    let spki = cert.tbs_certificate.subject_public_key_info;
    let spki_der = spki
        .to_der()
        .map_err(|e| Error::new(StatusCode::BadCertificateInvalid, e.to_string()))?;
    let public_key = RsaPublicKey::from_public_key_der(&spki_der)
        .map_err(|e| Error::new(StatusCode::BadCertificateInvalid, e.to_string()))?;
    Ok(PublicKey::from_rsa(public_key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_garbage_der() {
        assert!(public_key_from_certificate(&[1, 2, 3]).is_err());
    }
}
