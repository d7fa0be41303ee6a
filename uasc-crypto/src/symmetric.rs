use aes::Aes256;
use cbc::cipher::{block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uasc_types::{Error, EncodingResult, StatusCode};

type HmacSha256 = Hmac<Sha256>;
type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Computes the HMAC-SHA256 signature appended to a symmetrically secured
/// chunk. The signature covers everything in `data` (header through
/// payload, before the signature itself is appended).
pub fn sign(signing_key: &[u8], data: &[u8]) -> EncodingResult<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(signing_key)
        .map_err(|e| Error::new(StatusCode::BadSecurityChecksFailed, e))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Verifies a previously computed signature in constant time.
pub fn verify(signing_key: &[u8], data: &[u8], signature: &[u8]) -> EncodingResult<()> {
    let mut mac = HmacSha256::new_from_slice(signing_key)
        .map_err(|e| Error::new(StatusCode::BadSecurityChecksFailed, e))?;
    mac.update(data);
    mac.verify_slice(signature)
        .map_err(|_| Error::new(StatusCode::BadSecurityChecksFailed, "symmetric signature mismatch"))
}

/// Encrypts `plaintext` (already padded to a multiple of the AES block
/// size by the caller) in place, returning the ciphertext.
pub fn encrypt(encrypting_key: &[u8], iv: &[u8], plaintext: &[u8]) -> EncodingResult<Vec<u8>> {
    let encryptor = Aes256CbcEnc::new_from_slices(encrypting_key, iv)
        .map_err(|e| Error::new(StatusCode::BadSecurityChecksFailed, e))?;
    let mut buf = plaintext.to_vec();
    let len = buf.len();
    let result = encryptor
        .encrypt_padded_mut::<NoPadding>(&mut buf, len)
        .map_err(|e| Error::new(StatusCode::BadSecurityChecksFailed, e.to_string()))?;
    Ok(result.to_vec())
}

pub fn decrypt(encrypting_key: &[u8], iv: &[u8], ciphertext: &[u8]) -> EncodingResult<Vec<u8>> {
    let decryptor = Aes256CbcDec::new_from_slices(encrypting_key, iv)
        .map_err(|e| Error::new(StatusCode::BadSecurityChecksFailed, e))?;
    let mut buf = ciphertext.to_vec();
    let result = decryptor
        .decrypt_padded_mut::<NoPadding>(&mut buf)
        .map_err(|e| Error::new(StatusCode::BadSecurityChecksFailed, e.to_string()))?;
    Ok(result.to_vec())
}

/// Minimum padding byte count the standard requires below/above a 2048-bit
/// asymmetric key, mirrored here for the symmetric padding computation
/// chunker layer uses ahead of `encrypt`.
pub fn minimum_padding(key_length: usize) -> usize {
    if key_length <= 256 {
        1
    } else {
        2
    }
}

/// Computes how many padding bytes must be appended so that
/// `bytes_to_write + signature_size + padding` is a multiple of the cipher
/// block size, per OPC UA Part 6 §6.7.2.
pub fn padding_size(plain_text_block_size: usize, bytes_to_write: usize, signature_size: usize) -> usize {
    let remainder = (bytes_to_write + signature_size + 1) % plain_text_block_size;
    if remainder == 0 {
        0
    } else {
        plain_text_block_size - remainder
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_round_trip() {
        let key = vec![7u8; 32];
        let data = b"some chunk bytes";
        let sig = sign(&key, data).unwrap();
        assert!(verify(&key, data, &sig).is_ok());
    }

    #[test]
    fn verify_rejects_tampered_data() {
        let key = vec![7u8; 32];
        let sig = sign(&key, b"original").unwrap();
        assert!(verify(&key, b"tampered!", &sig).is_err());
    }

    #[test]
    fn encrypt_then_decrypt_round_trip() {
        let key = vec![1u8; 32];
        let iv = vec![2u8; 16];
        let plaintext = b"sixteen byte!!!!".to_vec();
        let ciphertext = encrypt(&key, &iv, &plaintext).unwrap();
        assert_ne!(ciphertext, plaintext);
        let decrypted = decrypt(&key, &iv, &ciphertext).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn padding_size_fills_to_block_boundary() {
        let padding = padding_size(16, 10, 32);
        assert_eq!((10 + 32 + 1 + padding) % 16, 0);
    }
}
