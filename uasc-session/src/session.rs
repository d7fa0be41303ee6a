use std::time::{Duration, Instant};

use uasc_types::{ByteString, IdentityToken, NodeId, UAString};

/// Lifecycle states a [`Session`] moves through. `Creating` and
/// `UserAuthenticating` are transient — this core has no asynchronous
/// identity-provider callback, so both resolve within the same call that
/// entered them — but are kept as distinct states since a future facade
/// hook may suspend there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Creating,
    Created,
    UserAuthenticating,
    Activated,
    Closing,
    Closed,
    Orphaned,
}

/// One client session: identity, owning channel, and the deadline that
/// governs both inactivity timeout and orphan recovery.
#[derive(Debug, Clone)]
pub struct Session {
    session_id: NodeId,
    session_id_numeric: u32,
    authentication_token: NodeId,
    channel_id: u32,
    state: SessionState,
    client_nonce: ByteString,
    server_nonce: ByteString,
    identity: IdentityToken,
    endpoint_url: UAString,
    session_name: UAString,
    timeout: Duration,
    deadline: Instant,
    peer_certificate_thumbprint: Option<Vec<u8>>,
}

impl Session {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_id: NodeId,
        session_id_numeric: u32,
        authentication_token: NodeId,
        channel_id: u32,
        timeout: Duration,
        endpoint_url: UAString,
        session_name: UAString,
        client_nonce: ByteString,
        server_nonce: ByteString,
        peer_certificate_thumbprint: Option<Vec<u8>>,
    ) -> Self {
        Session {
            session_id,
            session_id_numeric,
            authentication_token,
            channel_id,
            state: SessionState::Created,
            client_nonce,
            server_nonce,
            identity: IdentityToken::default(),
            endpoint_url,
            session_name,
            timeout,
            deadline: Instant::now() + timeout,
            peer_certificate_thumbprint,
        }
    }

    pub fn session_id(&self) -> &NodeId {
        &self.session_id
    }

    pub fn session_id_numeric(&self) -> u32 {
        self.session_id_numeric
    }

    pub fn authentication_token(&self) -> &NodeId {
        &self.authentication_token
    }

    pub fn channel_id(&self) -> u32 {
        self.channel_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_activated(&self) -> bool {
        self.state == SessionState::Activated
    }

    pub fn server_nonce(&self) -> &ByteString {
        &self.server_nonce
    }

    pub fn client_nonce(&self) -> &ByteString {
        &self.client_nonce
    }

    pub fn endpoint_url(&self) -> &UAString {
        &self.endpoint_url
    }

    pub fn identity(&self) -> &IdentityToken {
        &self.identity
    }

    pub fn peer_certificate_thumbprint(&self) -> Option<&[u8]> {
        self.peer_certificate_thumbprint.as_deref()
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn is_timed_out(&self, now: Instant) -> bool {
        self.deadline < now
    }

    /// Binds the session onto (possibly a new) channel, records the caller's
    /// identity, rolls a fresh server nonce and refreshes the timeout
    /// deadline. Called on first activation and on every re-activation.
    pub fn activate(
        &mut self,
        channel_id: u32,
        identity: IdentityToken,
        server_nonce: ByteString,
        peer_certificate_thumbprint: Option<Vec<u8>>,
    ) {
        self.channel_id = channel_id;
        self.identity = identity;
        self.server_nonce = server_nonce;
        self.peer_certificate_thumbprint = peer_certificate_thumbprint;
        self.state = SessionState::Activated;
        self.refresh_deadline();
    }

    pub fn refresh_deadline(&mut self) {
        self.deadline = Instant::now() + self.timeout;
    }

    /// The channel the session was bound to has disconnected: the session
    /// survives, unreachable, until either re-activated on a new channel or
    /// its deadline passes.
    pub fn mark_orphaned(&mut self) {
        self.state = SessionState::Orphaned;
        self.refresh_deadline();
    }

    pub fn close(&mut self) {
        self.state = SessionState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_session() -> Session {
        Session::new(
            NodeId::new(1, 1u32),
            1,
            NodeId::new(0, ByteString::from(vec![1, 2, 3])),
            42,
            Duration::from_secs(60),
            UAString::from("opc.tcp://localhost:4840"),
            UAString::from("test"),
            ByteString::null(),
            ByteString::null(),
            None,
        )
    }

    #[test]
    fn new_session_starts_created() {
        let session = new_session();
        assert_eq!(session.state(), SessionState::Created);
        assert!(!session.is_activated());
    }

    #[test]
    fn activate_binds_channel_and_marks_activated() {
        let mut session = new_session();
        session.activate(7, IdentityToken::default(), ByteString::null(), None);
        assert!(session.is_activated());
        assert_eq!(session.channel_id(), 7);
    }

    #[test]
    fn orphaned_session_is_not_activated() {
        let mut session = new_session();
        session.activate(7, IdentityToken::default(), ByteString::null(), None);
        session.mark_orphaned();
        assert_eq!(session.state(), SessionState::Orphaned);
        assert!(!session.is_activated());
    }
}
