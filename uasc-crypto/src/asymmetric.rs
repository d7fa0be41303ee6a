use uasc_types::EncodingResult;

use crate::pkey::{PrivateKey, PublicKey};

/// RSA-PKCS1v15 plaintext block size: the cipher block size minus the
/// eleven bytes of PKCS1v15 padding overhead.
pub fn plain_text_block_size(cipher_text_block_size: usize) -> usize {
    cipher_text_block_size.saturating_sub(11)
}

pub fn sign(private_key: &PrivateKey, data: &[u8]) -> EncodingResult<Vec<u8>> {
    private_key.sign_sha256(data)
}

pub fn verify(public_key: &PublicKey, data: &[u8], signature: &[u8]) -> EncodingResult<()> {
    public_key.verify_sha256(data, signature)
}

pub fn encrypt(public_key: &PublicKey, plaintext: &[u8]) -> EncodingResult<Vec<u8>> {
    public_key.encrypt(plaintext)
}

pub fn decrypt(private_key: &PrivateKey, ciphertext: &[u8]) -> EncodingResult<Vec<u8>> {
    private_key.decrypt(ciphertext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_block_size_accounts_for_padding() {
        assert_eq!(plain_text_block_size(256), 245);
    }

    #[test]
    fn sign_verify_encrypt_decrypt_round_trip() {
        let private = PrivateKey::generate(2048).unwrap();
        let public = private.public_key();
        let sig = sign(&private, b"nonce-bytes").unwrap();
        assert!(verify(&public, b"nonce-bytes", &sig).is_ok());

        let ciphertext = encrypt(&public, b"short secret").unwrap();
        let plaintext = decrypt(&private, &ciphertext).unwrap();
        assert_eq!(plaintext, b"short secret");
    }
}
