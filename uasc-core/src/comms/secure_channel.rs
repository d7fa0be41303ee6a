use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, trace};
use uasc_types::{
    ByteString, DecodingOptions, Error, EncodingResult, MessageSecurityMode, StatusCode, UtcTime,
};
use uasc_crypto::certificate_store::CertificateStore;
use uasc_crypto::{PrivateKey, PublicKey, SecurityPolicy};

use crate::comms::message_chunk::{MessageChunk, MessageChunkType};
use crate::comms::security_header::{AsymmetricSecurityHeader, SecurityHeader, SymmetricSecurityHeader};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Role {
    #[default]
    Unknown,
    Client,
    Server,
}

/// Derived keys for a generation of symmetric tokens still usable to
/// decrypt chunks sent against it, alongside the instant it stops being
/// honoured. Kept around during renewal so in-flight MSG chunks signed
/// under the previous token still verify.
#[derive(Clone)]
struct RemoteKeys {
    signing_key: Vec<u8>,
    encrypting_key: Vec<u8>,
    iv: Vec<u8>,
    expires_at: Instant,
}

/// Owns one secure channel's cryptographic state: the negotiated policy
/// and mode, the current (and, briefly, previous) security token, the
/// nonces and certificates exchanged during the handshake, and the
/// symmetric keys derived from them. Shared, single-owner state per
/// channel: the channel FSM in `uasc-channel` is the only writer.
pub struct SecureChannel {
    role: Role,
    security_policy: SecurityPolicy,
    security_mode: MessageSecurityMode,
    secure_channel_id: u32,
    token_created_at: UtcTime,
    token_created_at_instant: Instant,
    token_lifetime: u32,
    token_id: u32,
    cert: Option<ByteString>,
    private_key: Option<PrivateKey>,
    remote_cert: Option<ByteString>,
    remote_nonce: ByteString,
    local_nonce: ByteString,
    remote_keys: HashMap<u32, RemoteKeys>,
    local_keys: Option<(Vec<u8>, Vec<u8>, Vec<u8>)>,
    certificate_store: Arc<dyn CertificateStore>,
    decoding_options: DecodingOptions,
}

impl SecureChannel {
    pub fn new(
        certificate_store: Arc<dyn CertificateStore>,
        role: Role,
        decoding_options: DecodingOptions,
    ) -> Self {
        SecureChannel {
            role,
            security_policy: SecurityPolicy::None,
            security_mode: MessageSecurityMode::None,
            secure_channel_id: 0,
            token_created_at: UtcTime::now(),
            token_created_at_instant: Instant::now(),
            token_lifetime: 0,
            token_id: 0,
            cert: None,
            private_key: None,
            remote_cert: None,
            remote_nonce: ByteString::null(),
            local_nonce: ByteString::null(),
            remote_keys: HashMap::new(),
            local_keys: None,
            certificate_store,
            decoding_options,
        }
    }

    pub fn is_client_role(&self) -> bool {
        self.role == Role::Client
    }

    pub fn decoding_options(&self) -> &DecodingOptions {
        &self.decoding_options
    }

    pub fn secure_channel_id(&self) -> u32 {
        self.secure_channel_id
    }

    pub fn set_secure_channel_id(&mut self, id: u32) {
        self.secure_channel_id = id;
    }

    pub fn token_id(&self) -> u32 {
        self.token_id
    }

    pub fn certificate_store(&self) -> &Arc<dyn CertificateStore> {
        &self.certificate_store
    }

    /// Loads this application's own certificate and private key from the
    /// certificate store and installs them on the channel, ready for the
    /// next OPN to sign/encrypt with.
    pub fn load_own_identity(&mut self) -> EncodingResult<()> {
        self.cert = Some(self.certificate_store.read_own_cert()?);
        self.private_key = Some(self.certificate_store.read_own_pkey()?);
        Ok(())
    }

    pub fn security_policy(&self) -> SecurityPolicy {
        self.security_policy
    }

    pub fn set_security_policy(&mut self, policy: SecurityPolicy) {
        self.security_policy = policy;
    }

    pub fn security_mode(&self) -> MessageSecurityMode {
        self.security_mode
    }

    pub fn set_security_mode(&mut self, mode: MessageSecurityMode) {
        self.security_mode = mode;
    }

    pub fn set_cert(&mut self, cert: Option<ByteString>) {
        self.cert = cert;
    }

    pub fn cert(&self) -> Option<&ByteString> {
        self.cert.as_ref()
    }

    pub fn set_private_key(&mut self, key: Option<PrivateKey>) {
        self.private_key = key;
    }

    pub fn set_remote_cert(&mut self, cert: Option<ByteString>) {
        self.remote_cert = cert;
    }

    /// The peer's certificate, captured off the sender certificate field of
    /// the OpenSecureChannel request that established this channel.
    pub fn remote_cert(&self) -> Option<&ByteString> {
        self.remote_cert.as_ref()
    }

    pub fn set_remote_cert_from_byte_string(&mut self, cert: &ByteString) -> EncodingResult<()> {
        self.remote_cert = Some(cert.clone());
        Ok(())
    }

    pub fn local_nonce_as_byte_string(&self) -> ByteString {
        self.local_nonce.clone()
    }

    pub fn create_random_nonce(&mut self) {
        self.local_nonce = uasc_crypto::random::byte_string(
            self.security_policy.secure_channel_nonce_length().max(1),
        );
    }

    pub fn set_remote_nonce_from_byte_string(&mut self, nonce: &ByteString) -> EncodingResult<()> {
        let expected = self.security_policy.secure_channel_nonce_length();
        if self.security_policy != SecurityPolicy::None
            && nonce.as_bytes().len() != expected
        {
            return Err(Error::new(
                StatusCode::BadNonceInvalid,
                format!(
                    "expected a {expected} byte nonce for {:?}, got {}",
                    self.security_policy,
                    nonce.as_bytes().len()
                ),
            ));
        }
        self.remote_nonce = nonce.clone();
        Ok(())
    }

    /// Clears the channel's current token so `make_security_header` falls
    /// back to an Issue-style OPN header; used at the start of a fresh
    /// connection attempt.
    pub fn clear_security_token(&mut self) {
        self.secure_channel_id = 0;
        self.token_id = 0;
        self.token_created_at = UtcTime::now();
        self.token_created_at_instant = Instant::now();
        self.token_lifetime = 0;
        self.remote_keys.clear();
        self.local_keys = None;
    }

    pub fn set_security_token(&mut self, channel_id: u32, token_id: u32, lifetime: u32) {
        // Keep the previous generation's keys reachable until their
        // lifetime elapses: in-flight MSG chunks signed under the old
        // token must still verify during the renewal overlap.
        if let Some((signing, encrypting, iv)) = self.local_keys.take() {
            self.remote_keys.insert(
                self.token_id,
                RemoteKeys {
                    signing_key: signing,
                    encrypting_key: encrypting,
                    iv,
                    expires_at: self.token_created_at_instant
                        + Duration::from_millis(self.token_lifetime as u64),
                },
            );
        }
        self.secure_channel_id = channel_id;
        self.token_id = token_id;
        self.token_created_at = UtcTime::now();
        self.token_created_at_instant = Instant::now();
        self.token_lifetime = lifetime;
        debug!("secure channel {channel_id} token {token_id} set, lifetime {lifetime}ms");
    }

    /// True once 75% of the current token's lifetime has elapsed, matching
    /// the renewal threshold used by conformant clients.
    pub fn should_renew_security_token(&self) -> bool {
        if self.token_lifetime == 0 {
            return false;
        }
        let renew_lifetime = (self.token_lifetime as u64) * 3 / 4;
        self.token_created_at_instant.elapsed() >= Duration::from_millis(renew_lifetime)
    }

    pub fn token_renewal_deadline(&self) -> Instant {
        self.token_created_at_instant + Duration::from_millis(self.token_lifetime as u64 * 4 / 3)
    }

    pub fn make_security_header(&self, message_type: MessageChunkType) -> SecurityHeader {
        if message_type.is_open_secure_channel() {
            if self.security_policy == SecurityPolicy::None {
                SecurityHeader::Asymmetric(AsymmetricSecurityHeader::none())
            } else {
                let thumbprint = self
                    .remote_cert
                    .as_ref()
                    .map(|c| ByteString::from(uasc_crypto::certificate_store::thumbprint(c.as_bytes()).to_vec()))
                    .unwrap_or_else(ByteString::null);
                SecurityHeader::Asymmetric(AsymmetricSecurityHeader::new(
                    self.security_policy.to_uri(),
                    self.cert.clone().unwrap_or_else(ByteString::null),
                    thumbprint,
                ))
            }
        } else {
            SecurityHeader::Symmetric(SymmetricSecurityHeader {
                token_id: self.token_id,
            })
        }
    }

    /// Derives this channel's symmetric keys for both directions from the
    /// exchanged nonces: `local_keys` secures what we send, the entry
    /// recorded against the current `token_id` in `remote_keys` verifies
    /// what we receive.
    pub fn derive_keys(&mut self) {
        if self.security_policy == SecurityPolicy::None {
            return;
        }
        let (local_nonce, remote_nonce) = (self.local_nonce.as_bytes(), self.remote_nonce.as_bytes());
        let local = self.security_policy.derive_keys(remote_nonce, local_nonce);
        let remote = self.security_policy.derive_keys(local_nonce, remote_nonce);
        self.local_keys = Some(local);
        self.remote_keys.insert(
            self.token_id,
            RemoteKeys {
                signing_key: remote.0,
                encrypting_key: remote.1,
                iv: remote.2,
                expires_at: self.token_created_at_instant
                    + Duration::from_millis(self.token_lifetime as u64 * 4 / 3),
            },
        );
        trace!("derived symmetric keys for token {}", self.token_id);
    }

    fn remote_public_key(&self) -> EncodingResult<PublicKey> {
        let cert = self.remote_cert.as_ref().ok_or_else(|| {
            Error::new(StatusCode::BadCertificateInvalid, "no remote certificate on channel")
        })?;
        uasc_crypto::x509::public_key_from_certificate(cert.as_bytes())
    }

    fn own_private_key(&self) -> EncodingResult<&PrivateKey> {
        self.private_key
            .as_ref()
            .ok_or_else(|| Error::new(StatusCode::BadCertificateInvalid, "no local private key on channel"))
    }

    /// Signs (and, under `SignAndEncrypt`, encrypts) a fully assembled
    /// chunk (header + security header + sequence header + body,
    /// unpadded) in place, appending padding and signature as required by
    /// the negotiated mode. Returns the number of bytes written.
    pub fn apply_security(&self, message_type: MessageChunkType, chunk: &[u8]) -> EncodingResult<Vec<u8>> {
        if self.security_mode == MessageSecurityMode::None || self.security_policy == SecurityPolicy::None {
            return Ok(chunk.to_vec());
        }
        if message_type.is_open_secure_channel() {
            self.asymmetric_sign_and_encrypt(chunk)
        } else {
            self.symmetric_sign_and_encrypt(chunk)
        }
    }

    fn asymmetric_sign_and_encrypt(&self, chunk: &[u8]) -> EncodingResult<Vec<u8>> {
        let private_key = self.own_private_key()?;
        let mut data = chunk.to_vec();
        if self.security_mode != MessageSecurityMode::None {
            let signature = uasc_crypto::asymmetric::sign(private_key, &data)?;
            data.extend_from_slice(&signature);
        }
        if self.security_mode == MessageSecurityMode::SignAndEncrypt {
            let public_key = self.remote_public_key()?;
            data = uasc_crypto::asymmetric::encrypt(&public_key, &data)?;
        }
        Ok(data)
    }

    fn symmetric_sign_and_encrypt(&self, chunk: &[u8]) -> EncodingResult<Vec<u8>> {
        let (signing_key, encrypting_key, iv) = self.local_keys.as_ref().ok_or_else(|| {
            Error::new(StatusCode::BadSecurityChecksFailed, "no local symmetric keys derived yet")
        })?;
        let mut data = chunk.to_vec();
        if self.security_mode == MessageSecurityMode::SignAndEncrypt {
            data = uasc_crypto::symmetric::encrypt(encrypting_key, iv, &data)?;
        }
        let signature = uasc_crypto::symmetric::sign(signing_key, &data)?;
        data.extend_from_slice(&signature);
        Ok(data)
    }

    /// Verifies and, if applicable, decrypts a received chunk's body
    /// (everything after the header through to the end of the buffer),
    /// returning the signed/encrypted region restored to plaintext
    /// without its trailing signature.
    pub fn verify_and_remove_security(
        &mut self,
        message_type: MessageChunkType,
        secured: &[u8],
    ) -> EncodingResult<Vec<u8>> {
        if self.security_mode == MessageSecurityMode::None || self.security_policy == SecurityPolicy::None {
            return Ok(secured.to_vec());
        }
        if message_type.is_open_secure_channel() {
            self.asymmetric_verify_and_decrypt(secured)
        } else {
            self.symmetric_verify_and_decrypt(secured)
        }
    }

    fn asymmetric_verify_and_decrypt(&self, secured: &[u8]) -> EncodingResult<Vec<u8>> {
        let mut data = secured.to_vec();
        if self.security_mode == MessageSecurityMode::SignAndEncrypt {
            let private_key = self.own_private_key()?;
            data = uasc_crypto::asymmetric::decrypt(private_key, &data)?;
        }
        if self.security_mode != MessageSecurityMode::None {
            let public_key = self.remote_public_key()?;
            let signature_size = public_key.size();
            if data.len() < signature_size {
                return Err(Error::new(StatusCode::BadSecurityChecksFailed, "chunk shorter than signature"));
            }
            let split = data.len() - signature_size;
            let (body, signature) = data.split_at(split);
            uasc_crypto::asymmetric::verify(&public_key, body, signature)?;
            data.truncate(split);
        }
        Ok(data)
    }

    fn symmetric_verify_and_decrypt(&mut self, secured: &[u8]) -> EncodingResult<Vec<u8>> {
        self.expire_remote_keys();
        let keys = self.remote_keys.get(&self.token_id).ok_or_else(|| {
            Error::new(StatusCode::BadSecureChannelTokenUnknown, "unknown security token id")
        })?;
        let mut data = secured.to_vec();
        let signature_size = self.security_policy.symmetric_signature_size();
        if data.len() < signature_size {
            return Err(Error::new(StatusCode::BadSecurityChecksFailed, "chunk shorter than signature"));
        }
        let split = data.len() - signature_size;
        let (body, signature) = data.split_at(split);
        uasc_crypto::symmetric::verify(&keys.signing_key, body, signature)?;
        data.truncate(split);
        if self.security_mode == MessageSecurityMode::SignAndEncrypt {
            data = uasc_crypto::symmetric::decrypt(&keys.encrypting_key, &keys.iv, &data)?;
        }
        Ok(data)
    }

    fn expire_remote_keys(&mut self) {
        let now = Instant::now();
        self.remote_keys.retain(|id, k| *id == self.token_id || k.expires_at > now);
    }

    pub fn minimum_padding(&self) -> usize {
        let key_length = self
            .private_key
            .as_ref()
            .map(|k| k.size())
            .unwrap_or(self.security_policy.symmetric_block_size());
        uasc_crypto::symmetric::minimum_padding(key_length)
    }

    pub fn padding_size(&self, plain_text_block_size: usize, bytes_to_write: usize, signature_size: usize) -> usize {
        uasc_crypto::symmetric::padding_size(plain_text_block_size, bytes_to_write, signature_size)
    }

    pub fn signature_size(&self, header: &SecurityHeader) -> usize {
        match header {
            SecurityHeader::Asymmetric(_) => self
                .private_key
                .as_ref()
                .map(|k| k.size())
                .unwrap_or(0),
            SecurityHeader::Symmetric(_) => self.security_policy.symmetric_signature_size(),
        }
    }
}
