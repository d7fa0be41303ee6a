use std::collections::HashMap;

use log::warn;
use uasc_core::comms::{MessageChunkType, Role};
use uasc_core::ChannelLimits;
use uasc_crypto::SecurityPolicy;
use uasc_types::{
    CloseSecureChannelResponse, DecodingOptions, MessageSecurityMode, RequestMessage,
    ResponseMessage, StatusCode,
};

use crate::fsm::{Channel, ReceiveOutcome};
use crate::framing::{FrameDecoder, TcpFrame};
use crate::registry::ChannelRegistry;
use crate::transport::SocketHandle;

/// What the dispatcher produced after feeding in one batch of socket bytes.
pub enum DispatchOutcome {
    /// Nothing is ready to hand to the application yet (partial frame, or a
    /// handshake step handled internally).
    Pending,
    /// Bytes the caller should write back to the socket (ACK, OPN response,
    /// CLO response, or an ERR frame).
    Send(SocketHandle, Vec<u8>),
    /// A decoded application request, ready for the session layer.
    Request {
        channel_id: u32,
        request_id: u32,
        request: RequestMessage,
    },
    /// A decoded application response (server acting as a client would not
    /// normally see this, but OPN/CLO responses flow through here too on
    /// the client side). `newly_connected` is set the first time a channel's
    /// OpenSecureChannel Issue response lands, not on renewals.
    Response {
        channel_id: u32,
        request_id: u32,
        response: ResponseMessage,
        newly_connected: bool,
    },
    /// The server just finished processing an Issue OpenSecureChannel
    /// request: `buffer` is the response to write, and the channel is now
    /// in `Connected` state for the first time.
    ChannelEstablished {
        handle: SocketHandle,
        buffer: Vec<u8>,
        channel_id: u32,
    },
    /// A pending outbound request failed (its chunk set was aborted).
    SendFailure { channel_id: u32, request_id: u32, status: StatusCode },
    /// The channel violated the protocol badly enough to require teardown.
    FatalError(SocketHandle, StatusCode),
}

/// Routes inbound bytes to the right channel, decodes HEL/ACK/OPN/CLO/MSG
/// frames, and drives each channel's FSM. Owns no socket I/O itself; the
/// caller (event loop) is responsible for actually reading/writing bytes.
pub struct Dispatcher {
    role: Role,
    limits: ChannelLimits,
    certificate_store: std::sync::Arc<dyn uasc_crypto::certificate_store::CertificateStore>,
    decoders: HashMap<SocketHandle, FrameDecoder>,
    socket_to_channel: HashMap<SocketHandle, u32>,
    channel_to_socket: HashMap<u32, SocketHandle>,
    client_security_policy: SecurityPolicy,
    client_security_mode: MessageSecurityMode,
    requested_lifetime_ms: u32,
}

impl Dispatcher {
    pub fn new(
        role: Role,
        limits: ChannelLimits,
        certificate_store: std::sync::Arc<dyn uasc_crypto::certificate_store::CertificateStore>,
    ) -> Self {
        Dispatcher {
            role,
            limits,
            certificate_store,
            decoders: HashMap::new(),
            socket_to_channel: HashMap::new(),
            channel_to_socket: HashMap::new(),
            client_security_policy: SecurityPolicy::None,
            client_security_mode: MessageSecurityMode::None,
            requested_lifetime_ms: 3_600_000,
        }
    }

    /// Sets the policy/mode this dispatcher issues OpenSecureChannel with on
    /// the client side, right after a HELLO/ACK exchange completes. Has no
    /// effect on a server-role dispatcher.
    pub fn with_client_security(
        mut self,
        policy: SecurityPolicy,
        mode: MessageSecurityMode,
        requested_lifetime_ms: u32,
    ) -> Self {
        self.client_security_policy = policy;
        self.client_security_mode = mode;
        self.requested_lifetime_ms = requested_lifetime_ms;
        self
    }

    pub fn on_socket_created(&mut self, handle: SocketHandle) {
        self.decoders.insert(handle, FrameDecoder::new());
    }

    pub fn on_socket_closed(&mut self, handle: SocketHandle, registry: &mut ChannelRegistry) {
        self.decoders.remove(&handle);
        if let Some(channel_id) = self.socket_to_channel.remove(&handle) {
            self.channel_to_socket.remove(&channel_id);
            if let Some(channel) = registry.get_mut(channel_id) {
                channel.mark_closed();
            }
        }
    }

    /// Binds a socket to a channel the caller (event loop) has already
    /// created on the client side, e.g. right before sending its HELLO.
    pub fn bind_client_channel(&mut self, handle: SocketHandle, channel_id: u32) {
        self.bind(handle, channel_id);
    }

    /// Creates a fresh client-role channel for a newly-opened socket, binds
    /// it, and returns the HELLO frame to write. No-op (returns `Pending`)
    /// if this dispatcher isn't client-role.
    pub fn connect_client(
        &mut self,
        handle: SocketHandle,
        endpoint_url: &str,
        registry: &mut ChannelRegistry,
    ) -> DispatchOutcome {
        if self.role != Role::Client {
            return DispatchOutcome::Pending;
        }
        let mut channel = Channel::new(self.role, self.certificate_store.clone(), self.limits.clone());
        let hello = channel.make_hello(endpoint_url, &self.limits);
        let channel_id = registry.insert(channel);
        self.bind(handle, channel_id);

        match crate::framing::encode_handshake_frame(b"HEL", &hello) {
            Ok(bytes) => DispatchOutcome::Send(handle, bytes),
            Err(e) => DispatchOutcome::FatalError(handle, e.status()),
        }
    }

    fn bind(&mut self, handle: SocketHandle, channel_id: u32) {
        self.socket_to_channel.insert(handle, channel_id);
        self.channel_to_socket.insert(channel_id, handle);
    }

    pub fn channel_for_socket(&self, handle: SocketHandle) -> Option<u32> {
        self.socket_to_channel.get(&handle).copied()
    }

    pub fn socket_for_channel(&self, channel_id: u32) -> Option<SocketHandle> {
        self.channel_to_socket.get(&channel_id).copied()
    }

    /// Feeds freshly-received bytes for `handle` through the frame decoder,
    /// driving any number of channel FSM transitions and returning at most
    /// one actionable outcome per call (more frames may already be buffered;
    /// the event loop should call this again until it sees `Pending`).
    pub fn on_bytes(
        &mut self,
        handle: SocketHandle,
        bytes: &[u8],
        registry: &mut ChannelRegistry,
    ) -> DispatchOutcome {
        let Some(decoder) = self.decoders.get_mut(&handle) else {
            return DispatchOutcome::Pending;
        };
        decoder.push(bytes);

        let channel_id = self.socket_to_channel.get(&handle).copied();
        let decoding_options = channel_id
            .and_then(|id| registry.get(id))
            .map(|c| c.secure_channel().decoding_options().clone())
            .unwrap_or_else(DecodingOptions::minimal);

        let frame = match decoder.next_frame(&decoding_options) {
            Ok(Some(frame)) => frame,
            Ok(None) => return DispatchOutcome::Pending,
            Err(e) => return DispatchOutcome::FatalError(handle, e.status()),
        };

        match frame {
            TcpFrame::Hello(hello) => self.handle_hello(handle, &hello, registry),
            TcpFrame::Acknowledge(ack) => self.handle_ack(handle, &ack, registry),
            TcpFrame::Error(err) => {
                warn!("peer sent ERR {:?}: {}", err.error, err.reason);
                DispatchOutcome::FatalError(handle, err.error)
            }
            TcpFrame::ReverseHello(_) => {
                DispatchOutcome::FatalError(handle, StatusCode::BadTcpMessageTypeInvalid)
            }
            TcpFrame::Chunk(chunk) => self.handle_chunk(handle, chunk, registry),
        }
    }

    fn handle_hello(
        &mut self,
        handle: SocketHandle,
        hello: &uasc_types::HelloMessage,
        registry: &mut ChannelRegistry,
    ) -> DispatchOutcome {
        if self.role != Role::Server {
            return DispatchOutcome::FatalError(handle, StatusCode::BadTcpMessageTypeInvalid);
        }
        let mut channel = Channel::new(self.role, self.certificate_store.clone(), self.limits.clone());
        let ack = match channel.on_hello(hello, &self.limits) {
            Ok(ack) => ack,
            Err(e) => return DispatchOutcome::FatalError(handle, e.status()),
        };
        let channel_id = registry.insert(channel);
        self.bind(handle, channel_id);

        match crate::framing::encode_handshake_frame(b"ACK", &ack) {
            Ok(bytes) => DispatchOutcome::Send(handle, bytes),
            Err(e) => DispatchOutcome::FatalError(handle, e.status()),
        }
    }

    fn handle_ack(
        &mut self,
        handle: SocketHandle,
        ack: &uasc_types::AcknowledgeMessage,
        registry: &mut ChannelRegistry,
    ) -> DispatchOutcome {
        let Some(channel_id) = self.socket_to_channel.get(&handle).copied() else {
            return DispatchOutcome::FatalError(handle, StatusCode::BadTcpMessageTypeInvalid);
        };
        let Some(channel) = registry.get_mut(channel_id) else {
            return DispatchOutcome::FatalError(handle, StatusCode::BadTcpSecureChannelUnknown);
        };
        if let Err(e) = channel.on_ack(ack) {
            return DispatchOutcome::FatalError(handle, e.status());
        }

        let request_id = channel.allocate_request_id();
        let request = match channel.make_open_secure_channel_request(
            self.client_security_policy,
            self.client_security_mode,
            self.requested_lifetime_ms,
            request_id,
        ) {
            Ok(r) => r,
            Err(e) => return DispatchOutcome::FatalError(handle, e.status()),
        };
        let message = RequestMessage::OpenSecureChannel(request);
        match channel.encode_message(MessageChunkType::OpenSecureChannel, request_id, &message) {
            Ok(chunks) => DispatchOutcome::Send(handle, concat_chunks(&chunks)),
            Err(e) => DispatchOutcome::FatalError(handle, e.status()),
        }
    }

    fn handle_chunk(
        &mut self,
        handle: SocketHandle,
        chunk: uasc_core::comms::MessageChunk,
        registry: &mut ChannelRegistry,
    ) -> DispatchOutcome {
        let Some(channel_id) = self.socket_to_channel.get(&handle).copied() else {
            return DispatchOutcome::FatalError(handle, StatusCode::BadTcpSecureChannelUnknown);
        };
        let header = match chunk.message_header(&DecodingOptions::minimal()) {
            Ok(h) => h,
            Err(e) => return DispatchOutcome::FatalError(handle, e.status()),
        };

        match header.message_type {
            MessageChunkType::OpenSecureChannel => self.handle_opn_chunk(handle, channel_id, chunk, registry),
            MessageChunkType::CloseSecureChannel => self.handle_clo_chunk(handle, channel_id, chunk, registry),
            MessageChunkType::Message => {
                let Some(channel) = registry.get_mut(channel_id) else {
                    return DispatchOutcome::FatalError(handle, StatusCode::BadTcpSecureChannelUnknown);
                };
                // A server sees request bodies on MSG chunks, a client sees
                // the matching responses; the leading type id alone can't
                // disambiguate since the two enums don't share a namespace.
                if self.role == Role::Server {
                    match channel.receive_chunk::<RequestMessage>(chunk) {
                        Ok(ReceiveOutcome::Pending) => DispatchOutcome::Pending,
                        Ok(ReceiveOutcome::Message { request_id, message }) => DispatchOutcome::Request {
                            channel_id,
                            request_id,
                            request: message,
                        },
                        Ok(ReceiveOutcome::SendFailure { request_id, status }) => {
                            DispatchOutcome::SendFailure { channel_id, request_id, status }
                        }
                        Err(e) => DispatchOutcome::FatalError(handle, e.status()),
                    }
                } else {
                    match channel.receive_chunk::<ResponseMessage>(chunk) {
                        Ok(ReceiveOutcome::Pending) => DispatchOutcome::Pending,
                        Ok(ReceiveOutcome::Message { request_id, message }) => DispatchOutcome::Response {
                            channel_id,
                            request_id,
                            response: message,
                            newly_connected: false,
                        },
                        Ok(ReceiveOutcome::SendFailure { request_id, status }) => {
                            DispatchOutcome::SendFailure { channel_id, request_id, status }
                        }
                        Err(e) => DispatchOutcome::FatalError(handle, e.status()),
                    }
                }
            }
        }
    }

    fn handle_opn_chunk(
        &mut self,
        handle: SocketHandle,
        channel_id: u32,
        chunk: uasc_core::comms::MessageChunk,
        registry: &mut ChannelRegistry,
    ) -> DispatchOutcome {
        let Some(channel) = registry.get_mut(channel_id) else {
            return DispatchOutcome::FatalError(handle, StatusCode::BadTcpSecureChannelUnknown);
        };

        if self.role == Role::Server {
            match channel.receive_chunk::<RequestMessage>(chunk) {
                Ok(ReceiveOutcome::Message {
                    message: RequestMessage::OpenSecureChannel(request),
                    ..
                }) => {
                    let is_issue = request.request_type == uasc_types::SecurityTokenRequestType::Issue;
                    let response = match channel.on_open_secure_channel_request(&request, 3_600_000) {
                        Ok(r) => r,
                        Err(e) => return DispatchOutcome::FatalError(handle, e.status()),
                    };
                    let response_message = ResponseMessage::OpenSecureChannel(response);
                    match channel.encode_message(MessageChunkType::OpenSecureChannel, 0, &response_message) {
                        Ok(chunks) => {
                            let buffer = concat_chunks(&chunks);
                            if is_issue {
                                DispatchOutcome::ChannelEstablished { handle, buffer, channel_id }
                            } else {
                                DispatchOutcome::Send(handle, buffer)
                            }
                        }
                        Err(e) => DispatchOutcome::FatalError(handle, e.status()),
                    }
                }
                Ok(_) => DispatchOutcome::FatalError(handle, StatusCode::BadTcpMessageTypeInvalid),
                Err(e) => DispatchOutcome::FatalError(handle, e.status()),
            }
        } else {
            let was_first_connect = channel.state() == crate::fsm::ChannelState::ScConnecting;
            let outcome = match channel.receive_chunk::<ResponseMessage>(chunk) {
                Ok(ReceiveOutcome::Message {
                    message: ResponseMessage::OpenSecureChannel(response),
                    request_id,
                }) => match channel.on_open_secure_channel_response(&response) {
                    Ok(()) => Ok((channel.id, request_id, response)),
                    Err(e) => Err(e.status()),
                },
                Ok(_) => Err(StatusCode::BadTcpMessageTypeInvalid),
                Err(e) => Err(e.status()),
            };

            match outcome {
                Ok((real_id, request_id, response)) => {
                    if real_id != channel_id {
                        registry.rekey(channel_id, real_id);
                        self.bind(handle, real_id);
                    }
                    DispatchOutcome::Response {
                        channel_id: real_id,
                        request_id,
                        response: ResponseMessage::OpenSecureChannel(response),
                        newly_connected: was_first_connect,
                    }
                }
                Err(status) => DispatchOutcome::FatalError(handle, status),
            }
        }
    }

    fn handle_clo_chunk(
        &mut self,
        handle: SocketHandle,
        channel_id: u32,
        chunk: uasc_core::comms::MessageChunk,
        registry: &mut ChannelRegistry,
    ) -> DispatchOutcome {
        let Some(channel) = registry.get_mut(channel_id) else {
            return DispatchOutcome::FatalError(handle, StatusCode::BadTcpSecureChannelUnknown);
        };
        match channel.receive_chunk::<RequestMessage>(chunk) {
            Ok(ReceiveOutcome::Message {
                message: RequestMessage::CloseSecureChannel(request),
                request_id,
            }) => {
                channel.close();
                let response = CloseSecureChannelResponse {
                    response_header: uasc_types::ResponseHeader::new_good(&request.request_header),
                };
                let response_message = ResponseMessage::CloseSecureChannel(response);
                match channel.encode_message(MessageChunkType::CloseSecureChannel, request_id, &response_message) {
                    Ok(chunks) => DispatchOutcome::Send(handle, concat_chunks(&chunks)),
                    Err(e) => DispatchOutcome::FatalError(handle, e.status()),
                }
            }
            Ok(_) => DispatchOutcome::FatalError(handle, StatusCode::BadTcpMessageTypeInvalid),
            Err(e) => DispatchOutcome::FatalError(handle, e.status()),
        }
    }
}

fn concat_chunks(chunks: &[uasc_core::comms::MessageChunk]) -> Vec<u8> {
    let mut out = Vec::new();
    for chunk in chunks {
        out.extend_from_slice(&chunk.data);
    }
    out
}
