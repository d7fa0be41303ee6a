use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use uasc_channel::{Channel, ChannelState};
use uasc_crypto::certificate_store;
use uasc_types::{
    ActivateSessionRequest, ActivateSessionResponse, ByteString, CloseSessionRequest,
    CloseSessionResponse, CreateSessionRequest, CreateSessionResponse, IdentityToken, NodeId,
    ResponseHeader, SignatureData, StatusCode, UAString,
};

use crate::info::ServerInfo;
use crate::session::Session;

static NEXT_SESSION_ID: AtomicU32 = AtomicU32::new(1);

fn next_session_id() -> (NodeId, u32) {
    let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
    (NodeId::new(1, id), id)
}

/// Owns every session on the server, independent of which channel each one
/// is currently bound to (or orphaned from).
pub struct SessionManager {
    sessions: HashMap<NodeId, Session>,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionManager {
    pub fn new() -> Self {
        SessionManager {
            sessions: HashMap::new(),
        }
    }

    pub fn find_by_token(&self, authentication_token: &NodeId) -> Option<&Session> {
        self.sessions
            .values()
            .find(|s| s.authentication_token() == authentication_token)
    }

    fn find_by_token_mut(&mut self, authentication_token: &NodeId) -> Option<&mut Session> {
        self.sessions
            .values_mut()
            .find(|s| s.authentication_token() == authentication_token)
    }

    pub fn get(&self, session_id: &NodeId) -> Option<&Session> {
        self.sessions.get(session_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn create_session(
        &mut self,
        channel: &Channel,
        info: &ServerInfo,
        request: &CreateSessionRequest,
    ) -> Result<CreateSessionResponse, StatusCode> {
        if channel.state() != ChannelState::Connected {
            return Err(StatusCode::BadSecureChannelIdInvalid);
        }
        if self.sessions.len() >= info.max_sessions {
            return Err(StatusCode::BadTooManySessions);
        }
        if request.endpoint_url.is_null() {
            return Err(StatusCode::BadTcpEndpointUrlInvalid);
        }
        info.matching_endpoint_descriptions(&request.endpoint_url)
            .ok_or(StatusCode::BadTcpEndpointUrlInvalid)?;

        let peer_certificate_thumbprint = if request.client_certificate.is_null() {
            None
        } else {
            Some(certificate_store::thumbprint(request.client_certificate.as_bytes()).to_vec())
        };

        let session_timeout_ms = (request.requested_session_timeout.max(0.0) as u64)
            .clamp(info.min_session_timeout_ms, info.max_session_timeout_ms);

        let authentication_token = NodeId::new(0, uasc_crypto::random::byte_string(32));
        let server_nonce = uasc_crypto::random::byte_string(32);
        let (session_id, session_id_numeric) = next_session_id();

        let session = Session::new(
            session_id.clone(),
            session_id_numeric,
            authentication_token.clone(),
            channel.id,
            Duration::from_millis(session_timeout_ms),
            request.endpoint_url.clone(),
            request.session_name.clone(),
            request.client_nonce.clone(),
            server_nonce.clone(),
            peer_certificate_thumbprint,
        );
        info!("created session {session_id} on channel {}", channel.id);
        self.sessions.insert(session_id.clone(), session);

        Ok(CreateSessionResponse {
            response_header: ResponseHeader::new_good(&request.request_header),
            session_id,
            authentication_token,
            revised_session_timeout: session_timeout_ms as f64,
            server_nonce,
            server_certificate: info.server_certificate.clone(),
            server_signature_signature: ByteString::null(),
            server_signature_algorithm: UAString::null(),
            max_request_message_size: 0,
        })
    }

    pub fn activate_session(
        &mut self,
        channel: &Channel,
        request: &ActivateSessionRequest,
    ) -> Result<ActivateSessionResponse, StatusCode> {
        let authentication_token = &request.request_header.authentication_token;
        let now = Instant::now();

        let peer_thumbprint = channel_peer_thumbprint(channel);
        let identity = validate_identity_token(&request.user_identity_token)?;

        let Some(session) = self.find_by_token_mut(authentication_token) else {
            return Err(StatusCode::BadSessionIdInvalid);
        };
        if session.is_timed_out(now) {
            session.close();
            return Err(StatusCode::BadSessionClosed);
        }
        if session.channel_id() != channel.id {
            if session.peer_certificate_thumbprint() != peer_thumbprint.as_deref() {
                warn!(
                    "rejecting re-activation of session onto channel {} with a different peer certificate",
                    channel.id
                );
                return Err(StatusCode::BadSecureChannelIdInvalid);
            }
        }

        let server_nonce = uasc_crypto::random::byte_string(32);
        session.activate(channel.id, identity, server_nonce.clone(), peer_thumbprint);
        let session_id = session.session_id().clone();
        debug!("session {session_id} activated on channel {}", channel.id);

        Ok(ActivateSessionResponse {
            response_header: ResponseHeader::new_good(&request.request_header),
            server_nonce,
            results: None,
        })
    }

    pub fn close_session(
        &mut self,
        request: &CloseSessionRequest,
    ) -> Result<CloseSessionResponse, StatusCode> {
        let authentication_token = &request.request_header.authentication_token;
        let Some(session_id) = self.find_by_token(authentication_token).map(|s| s.session_id().clone()) else {
            return Err(StatusCode::BadSessionIdInvalid);
        };
        if let Some(session) = self.sessions.get_mut(&session_id) {
            session.close();
        }
        self.sessions.remove(&session_id);
        Ok(CloseSessionResponse {
            response_header: ResponseHeader::new_good(&request.request_header),
        })
    }

    /// Verifies the session bound to `authentication_token` is activated
    /// and bound to `channel_id` before the caller dispatches the request
    /// body to the application façade.
    pub fn authorize_request(
        &mut self,
        channel_id: u32,
        authentication_token: &NodeId,
    ) -> Result<&Session, StatusCode> {
        let now = Instant::now();
        let session = self
            .find_by_token_mut(authentication_token)
            .ok_or(StatusCode::BadSessionIdInvalid)?;
        if session.is_timed_out(now) {
            session.close();
            return Err(StatusCode::BadSessionClosed);
        }
        if !session.is_activated() {
            return Err(StatusCode::BadSessionNotActivated);
        }
        if session.channel_id() != channel_id {
            return Err(StatusCode::BadSecureChannelIdInvalid);
        }
        session.refresh_deadline();
        Ok(&*session)
    }

    /// Authorizes `authentication_token` against `channel_id`, then hands
    /// the request body to the façade with a context carrying the session
    /// and request-id. The request-id echo lets the façade match its
    /// eventual `SendRequest` reply back to this inbound call.
    pub fn route_request(
        &mut self,
        channel_id: u32,
        authentication_token: &NodeId,
        request_id: u32,
        body: &uasc_types::RequestMessage,
        facade: &dyn crate::facade::ApplicationFacade,
    ) -> Result<(), StatusCode> {
        let session = self.authorize_request(channel_id, authentication_token)?;
        let ctx = crate::facade::RequestContext {
            channel_id,
            session,
            request_id,
        };
        facade.on_request(&ctx, body);
        Ok(())
    }

    /// A channel dropped: every session bound to it survives as `Orphaned`
    /// rather than being destroyed, so the client can re-activate with the
    /// same authentication token on a new channel.
    pub fn on_channel_disconnected(&mut self, channel_id: u32) -> Vec<NodeId> {
        let mut orphaned = Vec::new();
        for session in self.sessions.values_mut() {
            if session.channel_id() == channel_id && session.is_activated() {
                session.mark_orphaned();
                orphaned.push(session.session_id().clone());
            }
        }
        orphaned
    }

    pub fn on_session_timeout(&mut self, session_id: &NodeId) {
        if let Some(session) = self.sessions.remove(session_id) {
            debug!("session {session_id} timed out, releasing");
            drop(session);
        }
    }

    /// Returns ids of every session whose deadline has passed, and the
    /// earliest deadline among those that haven't — the caller uses the
    /// latter to schedule the next expiry sweep.
    pub fn expired_sessions(&self, now: Instant) -> (Vec<NodeId>, Option<Instant>) {
        let mut expired = Vec::new();
        let mut next_deadline = None;
        for session in self.sessions.values() {
            if session.deadline() <= now {
                expired.push(session.session_id().clone());
            } else {
                next_deadline = Some(match next_deadline {
                    Some(d) if d < session.deadline() => d,
                    _ => session.deadline(),
                });
            }
        }
        (expired, next_deadline)
    }
}

fn channel_peer_thumbprint(channel: &Channel) -> Option<Vec<u8>> {
    channel
        .secure_channel()
        .remote_cert()
        .filter(|c| !c.is_null())
        .map(|c| certificate_store::thumbprint(c.as_bytes()).to_vec())
}

/// Shape-only validation: confirms the token is one of the three supported
/// kinds with a non-null policy id. Credential verification (password
/// correctness, certificate trust) is an application concern this core
/// does not implement.
fn validate_identity_token(token: &IdentityToken) -> Result<IdentityToken, StatusCode> {
    let policy_id_is_present = match token {
        IdentityToken::Anonymous { policy_id } => !policy_id.is_null(),
        IdentityToken::UserName { policy_id, .. } => !policy_id.is_null(),
        IdentityToken::X509 { policy_id, .. } => !policy_id.is_null(),
    };
    if policy_id_is_present {
        Ok(token.clone())
    } else {
        Err(StatusCode::BadIdentityTokenInvalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use uasc_core::comms::Role;
    use uasc_core::ChannelLimits;
    use uasc_crypto::MemoryCertificateStore;
    use uasc_types::{ApplicationDescription, RequestHeader, UtcTime};

    fn connected_channel() -> Channel {
        let mut channel = Channel::new(Role::Server, Arc::new(MemoryCertificateStore::new()), ChannelLimits::default());
        let hello = uasc_types::HelloMessage::new("opc.tcp://localhost:4840", 8192, 8192, 0, 0);
        let ack = channel.on_hello(&hello, &ChannelLimits::default()).unwrap();
        let _ = ack;
        let request = uasc_types::OpenSecureChannelRequest {
            request_header: RequestHeader::dummy(),
            client_protocol_version: 0,
            request_type: uasc_types::SecurityTokenRequestType::Issue,
            security_mode: uasc_types::MessageSecurityMode::None,
            client_nonce: uasc_types::ByteString::null(),
            requested_lifetime: 60_000,
        };
        channel.on_open_secure_channel_request(&request, 3_600_000).unwrap();
        channel
    }

    fn info() -> ServerInfo {
        ServerInfo {
            server_certificate: ByteString::null(),
            application: ApplicationDescription::default(),
            endpoints: vec![uasc_types::EndpointDescription {
                endpoint_url: UAString::from("opc.tcp://localhost:4840"),
                server: ApplicationDescription::default(),
                server_certificate: ByteString::null(),
                security_mode: uasc_types::MessageSecurityMode::None,
                security_policy_uri: UAString::from("http://opcfoundation.org/UA/SecurityPolicy#None"),
                user_identity_tokens: None,
                transport_profile_uri: UAString::null(),
                security_level: 0,
            }],
            max_sessions: 10,
            min_session_timeout_ms: 1_000,
            max_session_timeout_ms: 3_600_000,
        }
    }

    fn create_request() -> CreateSessionRequest {
        CreateSessionRequest {
            request_header: RequestHeader::new(NodeId::null(), UtcTime::now(), 1),
            client_description: ApplicationDescription::default(),
            server_uri: UAString::null(),
            endpoint_url: UAString::from("opc.tcp://localhost:4840"),
            session_name: UAString::from("test-session"),
            client_nonce: ByteString::from(vec![1, 2, 3]),
            client_certificate: ByteString::null(),
            requested_session_timeout: 120_000.0,
            max_response_message_size: 0,
        }
    }

    #[test]
    fn create_session_succeeds_on_connected_channel() {
        let channel = connected_channel();
        let mut manager = SessionManager::new();
        let response = manager.create_session(&channel, &info(), &create_request()).unwrap();
        assert_eq!(manager.len(), 1);
        assert!(!response.authentication_token.is_null());
    }

    #[test]
    fn create_session_rejects_unknown_endpoint() {
        let channel = connected_channel();
        let mut manager = SessionManager::new();
        let mut request = create_request();
        request.endpoint_url = UAString::from("opc.tcp://nope:4840");
        assert_eq!(
            manager.create_session(&channel, &info(), &request).unwrap_err(),
            StatusCode::BadTcpEndpointUrlInvalid
        );
    }

    #[test]
    fn create_session_enforces_max_sessions() {
        let channel = connected_channel();
        let mut limited = info();
        limited.max_sessions = 0;
        let mut manager = SessionManager::new();
        assert_eq!(
            manager.create_session(&channel, &limited, &create_request()).unwrap_err(),
            StatusCode::BadTooManySessions
        );
    }

    #[test]
    fn activate_then_authorize_succeeds() {
        let channel = connected_channel();
        let mut manager = SessionManager::new();
        let created = manager.create_session(&channel, &info(), &create_request()).unwrap();

        let activate_request = ActivateSessionRequest {
            request_header: RequestHeader::new(created.authentication_token.clone(), UtcTime::now(), 2),
            client_signature: SignatureData::default(),
            client_software_certificates: None,
            locale_ids: None,
            user_identity_token: IdentityToken::Anonymous { policy_id: UAString::from("anonymous") },
            user_token_signature: SignatureData::default(),
        };
        manager.activate_session(&channel, &activate_request).unwrap();

        let session = manager.authorize_request(channel.id, &created.authentication_token).unwrap();
        assert!(session.is_activated());
    }

    #[test]
    fn authorize_before_activation_is_rejected() {
        let channel = connected_channel();
        let mut manager = SessionManager::new();
        let created = manager.create_session(&channel, &info(), &create_request()).unwrap();
        assert_eq!(
            manager.authorize_request(channel.id, &created.authentication_token).unwrap_err(),
            StatusCode::BadSessionNotActivated
        );
    }

    #[test]
    fn disconnect_orphans_activated_sessions() {
        let channel = connected_channel();
        let mut manager = SessionManager::new();
        let created = manager.create_session(&channel, &info(), &create_request()).unwrap();
        let activate_request = ActivateSessionRequest {
            request_header: RequestHeader::new(created.authentication_token.clone(), UtcTime::now(), 2),
            client_signature: SignatureData::default(),
            client_software_certificates: None,
            locale_ids: None,
            user_identity_token: IdentityToken::Anonymous { policy_id: UAString::from("anonymous") },
            user_token_signature: SignatureData::default(),
        };
        manager.activate_session(&channel, &activate_request).unwrap();

        let orphaned = manager.on_channel_disconnected(channel.id);
        assert_eq!(orphaned.len(), 1);
        assert_eq!(
            manager.authorize_request(channel.id, &created.authentication_token).unwrap_err(),
            StatusCode::BadSessionNotActivated
        );
    }

    struct RecordingFacade {
        requests: std::sync::Mutex<Vec<u32>>,
    }

    impl crate::facade::ApplicationFacade for RecordingFacade {
        fn on_request(&self, ctx: &crate::facade::RequestContext<'_>, _body: &uasc_types::RequestMessage) {
            self.requests.lock().unwrap().push(ctx.request_id);
        }
        fn on_response(&self, _request_id: u32, _response: &uasc_types::ResponseMessage) {}
        fn on_send_failure(&self, _request_id: u32, _status: StatusCode) {}
        fn on_session_activated(&self, _session_id: &NodeId) {}
        fn on_channel_connected(&self, _channel_id: u32) {}
        fn on_channel_disconnected(&self, _channel_id: u32, _status: StatusCode) {}
    }

    #[test]
    fn orphaned_session_reactivates_on_new_channel_with_matching_certificate() {
        let mut channel_one = connected_channel();
        let cert = ByteString::from(vec![1, 2, 3, 4]);
        channel_one.secure_channel_mut().set_remote_cert(Some(cert.clone()));

        let mut manager = SessionManager::new();
        let created = manager.create_session(&channel_one, &info(), &create_request()).unwrap();
        let activate_request = ActivateSessionRequest {
            request_header: RequestHeader::new(created.authentication_token.clone(), UtcTime::now(), 2),
            client_signature: SignatureData::default(),
            client_software_certificates: None,
            locale_ids: None,
            user_identity_token: IdentityToken::Anonymous { policy_id: UAString::from("anonymous") },
            user_token_signature: SignatureData::default(),
        };
        manager.activate_session(&channel_one, &activate_request).unwrap();
        manager.on_channel_disconnected(channel_one.id);

        let mut channel_two = connected_channel();
        channel_two.secure_channel_mut().set_remote_cert(Some(cert));
        let reactivate_request = ActivateSessionRequest {
            request_header: RequestHeader::new(created.authentication_token.clone(), UtcTime::now(), 3),
            client_signature: SignatureData::default(),
            client_software_certificates: None,
            locale_ids: None,
            user_identity_token: IdentityToken::Anonymous { policy_id: UAString::from("anonymous") },
            user_token_signature: SignatureData::default(),
        };
        manager.activate_session(&channel_two, &reactivate_request).unwrap();

        let session = manager.authorize_request(channel_two.id, &created.authentication_token).unwrap();
        assert!(session.is_activated());
    }

    #[test]
    fn orphaned_session_rejects_reactivation_on_channel_with_different_certificate() {
        let mut channel_one = connected_channel();
        channel_one
            .secure_channel_mut()
            .set_remote_cert(Some(ByteString::from(vec![1, 2, 3, 4])));

        let mut manager = SessionManager::new();
        let created = manager.create_session(&channel_one, &info(), &create_request()).unwrap();
        let activate_request = ActivateSessionRequest {
            request_header: RequestHeader::new(created.authentication_token.clone(), UtcTime::now(), 2),
            client_signature: SignatureData::default(),
            client_software_certificates: None,
            locale_ids: None,
            user_identity_token: IdentityToken::Anonymous { policy_id: UAString::from("anonymous") },
            user_token_signature: SignatureData::default(),
        };
        manager.activate_session(&channel_one, &activate_request).unwrap();
        manager.on_channel_disconnected(channel_one.id);

        let mut channel_two = connected_channel();
        channel_two
            .secure_channel_mut()
            .set_remote_cert(Some(ByteString::from(vec![9, 9, 9, 9])));
        let reactivate_request = ActivateSessionRequest {
            request_header: RequestHeader::new(created.authentication_token.clone(), UtcTime::now(), 3),
            client_signature: SignatureData::default(),
            client_software_certificates: None,
            locale_ids: None,
            user_identity_token: IdentityToken::Anonymous { policy_id: UAString::from("anonymous") },
            user_token_signature: SignatureData::default(),
        };
        assert_eq!(
            manager.activate_session(&channel_two, &reactivate_request).unwrap_err(),
            StatusCode::BadSecureChannelIdInvalid
        );
    }

    #[test]
    fn route_request_dispatches_to_facade_once_authorized() {
        let channel = connected_channel();
        let mut manager = SessionManager::new();
        let created = manager.create_session(&channel, &info(), &create_request()).unwrap();
        let activate_request = ActivateSessionRequest {
            request_header: RequestHeader::new(created.authentication_token.clone(), UtcTime::now(), 2),
            client_signature: SignatureData::default(),
            client_software_certificates: None,
            locale_ids: None,
            user_identity_token: IdentityToken::Anonymous { policy_id: UAString::from("anonymous") },
            user_token_signature: SignatureData::default(),
        };
        manager.activate_session(&channel, &activate_request).unwrap();

        let facade = RecordingFacade { requests: std::sync::Mutex::new(Vec::new()) };
        let body = uasc_types::RequestMessage::CloseSecureChannel(uasc_types::CloseSecureChannelRequest {
            request_header: RequestHeader::new(created.authentication_token.clone(), UtcTime::now(), 3),
        });
        manager
            .route_request(channel.id, &created.authentication_token, 99, &body, &facade)
            .unwrap();
        assert_eq!(facade.requests.lock().unwrap().as_slice(), &[99]);
    }
}
