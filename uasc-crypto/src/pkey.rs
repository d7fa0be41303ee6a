use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::sha2::Sha256;
use rsa::signature::{RandomizedSigner, SignatureEncoding, Verifier};
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use uasc_types::{Error, EncodingResult, StatusCode};

/// An RSA private key used for the asymmetric signature/decryption
/// operations of the OpenSecureChannel handshake.
#[derive(Clone)]
pub struct PrivateKey(RsaPrivateKey);

impl PrivateKey {
    pub fn from_pkcs1_der(der: &[u8]) -> EncodingResult<Self> {
        use rsa::pkcs1::DecodeRsaPrivateKey;
        RsaPrivateKey::from_pkcs1_der(der)
            .map(PrivateKey)
            .map_err(|e| Error::new(StatusCode::BadCertificateInvalid, e))
    }

    pub fn generate(bits: usize) -> EncodingResult<Self> {
        let mut rng = rand::thread_rng();
        RsaPrivateKey::new(&mut rng, bits)
            .map(PrivateKey)
            .map_err(|e| Error::new(StatusCode::BadInternalError, e))
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.to_public_key())
    }

    pub fn size(&self) -> usize {
        self.0.size()
    }

    pub fn sign_sha256(&self, data: &[u8]) -> EncodingResult<Vec<u8>> {
        let signing_key = SigningKey::<Sha256>::new(self.0.clone());
        let mut rng = rand::thread_rng();
        let signature = signing_key.sign_with_rng(&mut rng, data);
        Ok(signature.to_vec())
    }

    pub fn decrypt(&self, ciphertext: &[u8]) -> EncodingResult<Vec<u8>> {
        self.0
            .decrypt(Pkcs1v15Encrypt, ciphertext)
            .map_err(|e| Error::new(StatusCode::BadSecurityChecksFailed, e))
    }
}

/// An RSA public key, usually extracted from a peer's certificate.
#[derive(Clone)]
pub struct PublicKey(RsaPublicKey);

impl PublicKey {
    pub fn from_rsa(key: RsaPublicKey) -> Self {
        PublicKey(key)
    }

    pub fn from_pkcs1_der(der: &[u8]) -> EncodingResult<Self> {
        use rsa::pkcs1::DecodeRsaPublicKey;
        RsaPublicKey::from_pkcs1_der(der)
            .map(PublicKey)
            .map_err(|e| Error::new(StatusCode::BadCertificateInvalid, e))
    }

    pub fn size(&self) -> usize {
        self.0.size()
    }

    pub fn verify_sha256(&self, data: &[u8], signature: &[u8]) -> EncodingResult<()> {
        let verifying_key = VerifyingKey::<Sha256>::new(self.0.clone());
        let signature = Signature::try_from(signature)
            .map_err(|e| Error::new(StatusCode::BadApplicationSignatureInvalid, e))?;
        verifying_key
            .verify(data, &signature)
            .map_err(|e| Error::new(StatusCode::BadApplicationSignatureInvalid, e))
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> EncodingResult<Vec<u8>> {
        let mut rng = rand::thread_rng();
        self.0
            .encrypt(&mut rng, Pkcs1v15Encrypt, plaintext)
            .map_err(|e| Error::new(StatusCode::BadSecurityChecksFailed, e))
    }
}
