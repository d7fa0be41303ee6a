//! Drives two [`Runtime`]s (client + server) over an in-process loopback
//! transport, end to end: handshake, GetEndpoints, session creation and
//! activation, and a channel drop.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use uasc_channel::{ApplicationEvent, Dispatcher, Event, SocketEvent, SocketHandle, Transport};
use uasc_core::comms::Role;
use uasc_core::ChannelLimits;
use uasc_crypto::{MemoryCertificateStore, SecurityPolicy};
use uasc_session::{ApplicationFacade, RequestContext, ServerInfo};
use uasc_types::{
    ActivateSessionRequest, ApplicationDescription, ByteString, CreateSessionRequest,
    EndpointDescription, GetEndpointsRequest, IdentityToken, MessageSecurityMode, NodeId,
    RequestHeader, RequestMessage, ResponseMessage, SignatureData, StatusCode, UAString, UtcTime,
};

use uasc::Runtime;

const ENDPOINT_URL: &str = "opc.tcp://host:4841/ep";

/// A [`Transport`] fake that delivers every byte written on one side as an
/// inbound `Bytes` event on a fixed peer sender, standing in for a real
/// socket pair. `peer` is filled in after both runtimes exist, since each
/// needs the other's event sender.
struct LoopbackTransport {
    peer: Arc<OnceLock<mpsc::Sender<Event>>>,
    handle: SocketHandle,
}

impl Transport for LoopbackTransport {
    fn open(&mut self, _url: &str) -> SocketHandle {
        self.handle
    }

    fn write(&mut self, handle: SocketHandle, buffer: Vec<u8>) {
        let Some(peer) = self.peer.get() else { return };
        let peer = peer.clone();
        tokio::spawn(async move {
            let _ = peer.send(Event::Socket(SocketEvent::Bytes(handle, buffer))).await;
        });
    }

    fn close(&mut self, handle: SocketHandle) {
        let Some(peer) = self.peer.get() else { return };
        let peer = peer.clone();
        tokio::spawn(async move {
            let _ = peer
                .send(Event::Socket(SocketEvent::Disconnected(handle, StatusCode::BadConnectionClosed)))
                .await;
        });
    }
}

#[derive(Debug)]
enum FacadeEvent {
    Response(u32, ResponseMessage),
    SendFailure(u32, StatusCode),
    SessionActivated(NodeId),
    ChannelConnected(u32),
    ChannelDisconnected(u32, StatusCode),
}

struct RecordingFacade {
    events: mpsc::UnboundedSender<FacadeEvent>,
}

impl ApplicationFacade for RecordingFacade {
    fn on_request(&self, _ctx: &RequestContext<'_>, _body: &RequestMessage) {}

    fn on_response(&self, request_id: u32, response: &ResponseMessage) {
        let _ = self.events.send(FacadeEvent::Response(request_id, response.clone()));
    }

    fn on_send_failure(&self, request_id: u32, status: StatusCode) {
        let _ = self.events.send(FacadeEvent::SendFailure(request_id, status));
    }

    fn on_session_activated(&self, session_id: &NodeId) {
        let _ = self.events.send(FacadeEvent::SessionActivated(session_id.clone()));
    }

    fn on_channel_connected(&self, channel_id: u32) {
        let _ = self.events.send(FacadeEvent::ChannelConnected(channel_id));
    }

    fn on_channel_disconnected(&self, channel_id: u32, status: StatusCode) {
        let _ = self.events.send(FacadeEvent::ChannelDisconnected(channel_id, status));
    }
}

fn server_info() -> ServerInfo {
    ServerInfo {
        server_certificate: ByteString::null(),
        application: ApplicationDescription::default(),
        endpoints: vec![EndpointDescription {
            endpoint_url: UAString::from(ENDPOINT_URL),
            server: ApplicationDescription::default(),
            server_certificate: ByteString::null(),
            security_mode: MessageSecurityMode::None,
            security_policy_uri: UAString::from(SecurityPolicy::None.to_uri()),
            user_identity_tokens: None,
            transport_profile_uri: UAString::null(),
            security_level: 0,
        }],
        max_sessions: 10,
        min_session_timeout_ms: 1_000,
        max_session_timeout_ms: 3_600_000,
    }
}

async fn next_event(events: &mut mpsc::UnboundedReceiver<FacadeEvent>) -> FacadeEvent {
    timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("facade event within deadline")
        .expect("facade sender still alive")
}

/// Wires up a connected client/server pair sharing a loopback transport and
/// spawns both `serve` loops in the background. Returns the client's event
/// sender (for driving it) and a receiver of each side's facade events.
fn spawn_pair() -> (
    mpsc::Sender<Event>,
    mpsc::UnboundedReceiver<FacadeEvent>,
    mpsc::UnboundedReceiver<FacadeEvent>,
) {
    let to_server: Arc<OnceLock<mpsc::Sender<Event>>> = Arc::new(OnceLock::new());
    let to_client: Arc<OnceLock<mpsc::Sender<Event>>> = Arc::new(OnceLock::new());

    let client_transport = LoopbackTransport { peer: to_server.clone(), handle: 1 };
    let server_transport = LoopbackTransport { peer: to_client.clone(), handle: 1 };

    let cert_store = Arc::new(MemoryCertificateStore::new());
    let limits = ChannelLimits::default();

    let client_dispatcher = Dispatcher::new(Role::Client, limits.clone(), cert_store.clone())
        .with_client_security(SecurityPolicy::None, MessageSecurityMode::None, 3_600_000);
    let server_dispatcher = Dispatcher::new(Role::Server, limits, cert_store);

    let mut client_runtime = Runtime::new(client_transport, client_dispatcher);
    let mut server_runtime = Runtime::new(server_transport, server_dispatcher).listen(server_info(), ENDPOINT_URL);

    to_server.set(server_runtime.sender()).unwrap();
    to_client.set(client_runtime.sender()).unwrap();

    let client_sender = client_runtime.sender();
    let server_sender = server_runtime.sender();

    // The server's socket handle (1) needs a decoder registered before any
    // bytes arrive on it; a real listener would do this on accept.
    tokio::spawn(async move {
        let _ = server_sender.send(Event::Socket(SocketEvent::Created(1))).await;
    });

    let (server_tx, server_events) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let facade = RecordingFacade { events: server_tx };
        server_runtime.serve(&facade).await;
    });

    let (client_tx, client_events) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let facade = RecordingFacade { events: client_tx };
        client_runtime.serve(&facade).await;
    });

    (client_sender, client_events, server_events)
}

#[tokio::test(flavor = "multi_thread")]
async fn handshake_and_get_endpoints_round_trip() {
    let (client_sender, mut client_events, mut server_events) = spawn_pair();
    tokio::spawn(async move { while server_events.recv().await.is_some() {} });

    client_sender
        .send(Event::Application(ApplicationEvent::Connect { url: ENDPOINT_URL.to_string() }))
        .await
        .unwrap();

    let channel_id = match next_event(&mut client_events).await {
        FacadeEvent::ChannelConnected(id) => id,
        other => panic!("expected ChannelConnected, got {other:?}"),
    };

    let request = RequestMessage::GetEndpoints(GetEndpointsRequest {
        request_header: RequestHeader::new(NodeId::null(), UtcTime::now(), 1),
        endpoint_url: UAString::from(ENDPOINT_URL),
        locale_ids: None,
        profile_uris: None,
    });
    client_sender
        .send(Event::Application(ApplicationEvent::SendRequest {
            channel_id,
            request_id: 2,
            request,
            timeout: Some(Duration::from_secs(5)),
        }))
        .await
        .unwrap();

    match next_event(&mut client_events).await {
        FacadeEvent::Response(2, ResponseMessage::GetEndpoints(resp)) => {
            let endpoints = resp.endpoints.expect("at least one endpoint");
            assert_eq!(endpoints.len(), 1);
            assert_eq!(endpoints[0].endpoint_url.as_ref(), ENDPOINT_URL);
        }
        other => panic!("expected a GetEndpoints response, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn session_creation_and_activation_round_trip_then_channel_drops() {
    let (client_sender, mut client_events, mut server_events) = spawn_pair();

    client_sender
        .send(Event::Application(ApplicationEvent::Connect { url: ENDPOINT_URL.to_string() }))
        .await
        .unwrap();
    let channel_id = match next_event(&mut client_events).await {
        FacadeEvent::ChannelConnected(id) => id,
        other => panic!("expected ChannelConnected, got {other:?}"),
    };
    match next_event(&mut server_events).await {
        FacadeEvent::ChannelConnected(id) => assert_eq!(id, channel_id),
        other => panic!("expected the server to report ChannelConnected too, got {other:?}"),
    }

    let create_request = RequestMessage::CreateSession(CreateSessionRequest {
        request_header: RequestHeader::new(NodeId::null(), UtcTime::now(), 1),
        client_description: ApplicationDescription::default(),
        server_uri: UAString::null(),
        endpoint_url: UAString::from(ENDPOINT_URL),
        session_name: UAString::from("integration-test"),
        client_nonce: ByteString::from(vec![9, 9, 9]),
        client_certificate: ByteString::null(),
        requested_session_timeout: 60_000.0,
        max_response_message_size: 0,
    });
    client_sender
        .send(Event::Application(ApplicationEvent::SendRequest {
            channel_id,
            request_id: 2,
            request: create_request,
            timeout: Some(Duration::from_secs(5)),
        }))
        .await
        .unwrap();

    let created_token = match next_event(&mut client_events).await {
        FacadeEvent::Response(2, ResponseMessage::CreateSession(resp)) => resp.authentication_token,
        other => panic!("expected a CreateSession response, got {other:?}"),
    };

    let activate_request = RequestMessage::ActivateSession(ActivateSessionRequest {
        request_header: RequestHeader::new(created_token.clone(), UtcTime::now(), 3),
        client_signature: SignatureData::default(),
        client_software_certificates: None,
        locale_ids: None,
        user_identity_token: IdentityToken::Anonymous { policy_id: UAString::from("anonymous") },
        user_token_signature: SignatureData::default(),
    });
    client_sender
        .send(Event::Application(ApplicationEvent::SendRequest {
            channel_id,
            request_id: 3,
            request: activate_request,
            timeout: Some(Duration::from_secs(5)),
        }))
        .await
        .unwrap();

    match next_event(&mut client_events).await {
        FacadeEvent::Response(3, ResponseMessage::ActivateSession(_)) => {}
        other => panic!("expected an ActivateSession response, got {other:?}"),
    }

    // Closing from the client side tears down the shared loopback socket,
    // which the server observes as a disconnect and uses to orphan the
    // session it had just activated.
    client_sender
        .send(Event::Application(ApplicationEvent::CloseChannel { channel_id }))
        .await
        .unwrap();

    match next_event(&mut server_events).await {
        FacadeEvent::ChannelDisconnected(id, _) => assert_eq!(id, channel_id),
        other => panic!("expected ChannelDisconnected, got {other:?}"),
    }
}
