use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::debug;
use rand::RngCore;
use uasc_core::comms::{Chunker, MessageChunk, MessageChunkType, Role, SecureChannel};
use uasc_core::ChannelLimits;
use uasc_crypto::certificate_store::CertificateStore;
use uasc_crypto::SecurityPolicy;
use uasc_types::{
    AcknowledgeMessage, ByteString, DecodableMessage, DepthGauge, Error, EncodingResult,
    HelloMessage, Message, MessageSecurityMode, NodeId, OpenSecureChannelRequest,
    OpenSecureChannelResponse, SecurityTokenRequestType, StatusCode,
};

use crate::assembly::{AssemblyOutcome, MessageAssembly};

pub const PROTOCOL_VERSION: u32 = 0;

/// Channel lifecycle state, shared by the table in spec's §4.3: client and
/// server walk the same states, starting from different entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Init,
    Negotiating,
    ScInit,
    ScConnecting,
    Connected,
    ScRenewing,
    Closing,
    Closed,
}

/// Buffer and message-size parameters negotiated during HELLO/ACK and
/// frozen for the lifetime of the socket connection.
#[derive(Debug, Clone, Copy)]
pub struct NegotiatedParams {
    pub send_buffer_size: u32,
    pub receive_buffer_size: u32,
    pub max_message_size: u32,
    pub max_chunk_count: u32,
}

struct PendingRequest {
    deadline: Option<Instant>,
}

/// One secure channel's full state: its cryptographic half
/// ([`SecureChannel`]), the handshake/lifecycle FSM, negotiated transport
/// parameters, the single open inbound [`MessageAssembly`], and outbound
/// bookkeeping (sequence numbers, request ids, pending replies).
pub struct Channel {
    pub id: u32,
    role: Role,
    state: ChannelState,
    secure_channel: SecureChannel,
    limits: ChannelLimits,
    negotiated: Option<NegotiatedParams>,
    endpoint_url: Option<String>,
    assembly: Option<MessageAssembly>,
    last_received_sequence_number: u32,
    next_sequence_number: u32,
    next_request_id: u32,
    pending_requests: HashMap<u32, PendingRequest>,
}

impl Channel {
    pub fn new(
        role: Role,
        certificate_store: Arc<dyn CertificateStore>,
        limits: ChannelLimits,
    ) -> Self {
        let decoding_depth_gauge = Arc::new(DepthGauge::new(100));
        let decoding_options = limits.to_decoding_options(decoding_depth_gauge);
        let secure_channel = SecureChannel::new(certificate_store, role, decoding_options);
        Channel {
            id: 0,
            role,
            state: ChannelState::Init,
            secure_channel,
            limits,
            negotiated: None,
            endpoint_url: None,
            assembly: None,
            last_received_sequence_number: 0,
            next_sequence_number: 1,
            next_request_id: 1,
            pending_requests: HashMap::new(),
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn secure_channel(&self) -> &SecureChannel {
        &self.secure_channel
    }

    pub fn secure_channel_mut(&mut self) -> &mut SecureChannel {
        &mut self.secure_channel
    }

    pub fn negotiated(&self) -> Option<&NegotiatedParams> {
        self.negotiated.as_ref()
    }

    fn require_state(&self, expected: &[ChannelState], op: &str) -> EncodingResult<()> {
        if self.state != ChannelState::Closed && expected.contains(&self.state) {
            Ok(())
        } else {
            Err(Error::new(
                StatusCode::BadTcpMessageTypeInvalid,
                format!("{op} is invalid in channel state {:?}", self.state),
            ))
        }
    }

    // ---- Client side --------------------------------------------------

    pub fn make_hello(&mut self, endpoint_url: &str, limits: &ChannelLimits) -> HelloMessage {
        self.require_state(&[ChannelState::Init], "HELLO").ok();
        self.endpoint_url = Some(endpoint_url.to_string());
        self.state = ChannelState::Negotiating;
        HelloMessage {
            protocol_version: PROTOCOL_VERSION,
            receive_buffer_size: limits.receive_buffer_size as u32,
            send_buffer_size: limits.send_buffer_size as u32,
            max_message_size: limits.max_message_size as u32,
            max_chunk_count: limits.max_chunk_count as u32,
            endpoint_url: endpoint_url.into(),
        }
    }

    pub fn on_ack(&mut self, ack: &AcknowledgeMessage) -> EncodingResult<()> {
        self.require_state(&[ChannelState::Negotiating], "ACK")?;
        if ack.protocol_version > PROTOCOL_VERSION {
            return Err(Error::new(
                StatusCode::BadProtocolVersionUnsupported,
                "server responded with an unsupported protocol version",
            ));
        }
        self.negotiated = Some(NegotiatedParams {
            send_buffer_size: ack.send_buffer_size,
            receive_buffer_size: ack.receive_buffer_size,
            max_message_size: ack.max_message_size,
            max_chunk_count: ack.max_chunk_count,
        });
        self.state = ChannelState::ScConnecting;
        Ok(())
    }

    /// Builds an OpenSecureChannelRequest, either the initial `Issue` or a
    /// `Renew` once `should_renew` fires.
    pub fn make_open_secure_channel_request(
        &mut self,
        security_policy: SecurityPolicy,
        security_mode: MessageSecurityMode,
        requested_lifetime: u32,
        request_handle: u32,
    ) -> EncodingResult<OpenSecureChannelRequest> {
        let request_type = match self.state {
            ChannelState::ScConnecting => SecurityTokenRequestType::Issue,
            ChannelState::Connected => SecurityTokenRequestType::Renew,
            _ => {
                return Err(Error::new(
                    StatusCode::BadTcpMessageTypeInvalid,
                    "OpenSecureChannelRequest is invalid outside ScConnecting/Connected",
                ))
            }
        };
        if request_type == SecurityTokenRequestType::Renew {
            self.state = ChannelState::ScRenewing;
        }
        self.secure_channel.set_security_policy(security_policy);
        self.secure_channel.set_security_mode(security_mode);
        self.secure_channel.create_random_nonce();

        Ok(OpenSecureChannelRequest {
            request_header: uasc_types::RequestHeader::new(
                NodeId::null(),
                uasc_types::UtcTime::now(),
                request_handle,
            ),
            client_protocol_version: PROTOCOL_VERSION,
            request_type,
            security_mode,
            client_nonce: self.secure_channel.local_nonce_as_byte_string(),
            requested_lifetime,
        })
    }

    pub fn on_open_secure_channel_response(
        &mut self,
        response: &OpenSecureChannelResponse,
    ) -> EncodingResult<()> {
        self.require_state(&[ChannelState::ScConnecting, ChannelState::ScRenewing], "OpenSecureChannelResponse")?;
        self.id = response.security_token.channel_id;
        self.secure_channel.set_secure_channel_id(response.security_token.channel_id);
        self.secure_channel.set_remote_nonce_from_byte_string(&response.server_nonce)?;
        self.secure_channel.set_security_token(
            response.security_token.channel_id,
            response.security_token.token_id,
            response.security_token.revised_lifetime,
        );
        self.secure_channel.derive_keys();
        self.state = ChannelState::Connected;
        debug!("channel {} connected (client)", self.id);
        Ok(())
    }

    pub fn should_renew(&self) -> bool {
        self.state == ChannelState::Connected && self.secure_channel.should_renew_security_token()
    }

    // ---- Server side ----------------------------------------------------

    pub fn on_hello(
        &mut self,
        hello: &HelloMessage,
        server_limits: &ChannelLimits,
    ) -> EncodingResult<AcknowledgeMessage> {
        self.require_state(&[ChannelState::Init], "HELLO")?;
        if hello.protocol_version > PROTOCOL_VERSION {
            return Err(Error::new(
                StatusCode::BadProtocolVersionUnsupported,
                "client HELLO requests an unsupported protocol version",
            ));
        }
        self.endpoint_url = Some(hello.endpoint_url.to_string());

        let negotiated = NegotiatedParams {
            send_buffer_size: min_zero_infinite(
                server_limits.receive_buffer_size as u32,
                hello.send_buffer_size,
            ),
            receive_buffer_size: min_zero_infinite(
                server_limits.send_buffer_size as u32,
                hello.receive_buffer_size,
            ),
            max_message_size: min_zero_infinite(
                server_limits.max_message_size as u32,
                hello.max_message_size,
            ),
            max_chunk_count: min_zero_infinite(
                server_limits.max_chunk_count as u32,
                hello.max_chunk_count,
            ),
        };
        self.negotiated = Some(negotiated);
        self.state = ChannelState::ScInit;

        Ok(AcknowledgeMessage {
            protocol_version: PROTOCOL_VERSION,
            receive_buffer_size: negotiated.receive_buffer_size,
            send_buffer_size: negotiated.send_buffer_size,
            max_message_size: negotiated.max_message_size,
            max_chunk_count: negotiated.max_chunk_count,
        })
    }

    /// Handles an inbound OpenSecureChannelRequest: an `Issue` is only
    /// legal fresh off `ScInit`, a `Renew` only while `Connected`.
    pub fn on_open_secure_channel_request(
        &mut self,
        request: &OpenSecureChannelRequest,
        requested_lifetime_default: u32,
    ) -> EncodingResult<OpenSecureChannelResponse> {
        match (self.state, request.request_type) {
            (ChannelState::ScInit, SecurityTokenRequestType::Issue) => {}
            (ChannelState::Connected, SecurityTokenRequestType::Renew) => {
                self.state = ChannelState::ScRenewing;
            }
            _ => {
                return Err(Error::new(
                    StatusCode::BadSecurityChecksFailed,
                    "OpenSecureChannelRequest is not legal in the current channel state",
                ))
            }
        }

        if self.id == 0 {
            self.id = allocate_channel_id();
        }
        self.secure_channel.set_secure_channel_id(self.id);

        self.secure_channel.set_security_mode(request.security_mode);
        self.secure_channel.set_remote_nonce_from_byte_string(&request.client_nonce)?;
        self.secure_channel.create_random_nonce();

        let token_id = allocate_token_id();
        let lifetime = if request.requested_lifetime == 0 {
            requested_lifetime_default
        } else {
            request.requested_lifetime
        };
        self.secure_channel.set_security_token(self.id, token_id, lifetime);
        self.secure_channel.derive_keys();
        self.state = ChannelState::Connected;
        debug!("channel {} connected (server), token {token_id}", self.id);

        Ok(OpenSecureChannelResponse {
            response_header: uasc_types::ResponseHeader::new_good(&request.request_header),
            server_protocol_version: PROTOCOL_VERSION,
            security_token: uasc_types::ChannelSecurityToken {
                channel_id: self.id,
                token_id,
                created_at: uasc_types::UtcTime::now(),
                revised_lifetime: lifetime,
            },
            server_nonce: self.secure_channel.local_nonce_as_byte_string(),
        })
    }

    // ---- Shared: chunk send/receive -------------------------------------

    pub fn allocate_request_id(&mut self) -> u32 {
        let id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1).max(1);
        id
    }

    pub fn register_pending(&mut self, request_id: u32, timeout: Option<Duration>) {
        self.pending_requests.insert(
            request_id,
            PendingRequest {
                deadline: timeout.map(|t| Instant::now() + t),
            },
        );
    }

    pub fn take_pending(&mut self, request_id: u32) -> bool {
        self.pending_requests.remove(&request_id).is_some()
    }

    pub fn expired_pending(&mut self) -> Vec<u32> {
        let now = Instant::now();
        let expired: Vec<u32> = self
            .pending_requests
            .iter()
            .filter(|(_, p)| p.deadline.is_some_and(|d| d <= now))
            .map(|(id, _)| *id)
            .collect();
        for id in &expired {
            self.pending_requests.remove(id);
        }
        expired
    }

    pub fn fail_all_pending(&mut self) -> Vec<u32> {
        self.pending_requests.drain().map(|(id, _)| id).collect()
    }

    /// Encodes `message` into chunks of `message_type`, ready for the
    /// socket layer, advancing the channel's outbound sequence number.
    pub fn encode_message(
        &mut self,
        message_type: MessageChunkType,
        request_id: u32,
        message: &impl Message,
    ) -> EncodingResult<Vec<MessageChunk>> {
        let max_send = self.negotiated.map(|n| n.max_message_size as usize).unwrap_or(0);
        let max_chunk_size = self
            .negotiated
            .map(|n| n.send_buffer_size as usize)
            .unwrap_or(8192)
            .max(256);
        let result = Chunker::encode(
            self.next_sequence_number,
            request_id,
            max_send,
            max_chunk_size,
            message_type,
            &self.secure_channel,
            message,
            StatusCode::BadRequestTooLarge,
        );
        match result {
            Ok(chunks) => {
                self.next_sequence_number = self.next_sequence_number.wrapping_add(chunks.len() as u32).max(1);
                Ok(chunks)
            }
            Err(e) => {
                self.next_sequence_number = self.next_sequence_number.wrapping_add(1).max(1);
                Err(e)
            }
        }
    }

    /// Builds the single `A` chunk that must go out on the wire when
    /// `encode_message` rejects a message as oversize, advancing the
    /// outbound sequence number the same way a normal send would.
    pub fn encode_abort_chunk(
        &mut self,
        message_type: MessageChunkType,
        request_id: u32,
        status: StatusCode,
    ) -> EncodingResult<MessageChunk> {
        let chunk = Chunker::encode_abort(self.next_sequence_number, request_id, message_type, &self.secure_channel, status);
        self.next_sequence_number = self.next_sequence_number.wrapping_add(1).max(1);
        chunk
    }

    /// Feeds one received, still-secured chunk into the channel: accumulates
    /// it into the open assembly and, once a message is complete, decodes
    /// and returns it.
    pub fn receive_chunk<T: DecodableMessage>(
        &mut self,
        chunk: MessageChunk,
    ) -> EncodingResult<ReceiveOutcome<T>> {
        let decoding_options = self.secure_channel.decoding_options().clone();
        let header = chunk.message_header(&decoding_options)?;

        if header.secure_channel_id != self.id && self.id != 0 {
            return Err(Error::new(
                StatusCode::BadTcpSecureChannelUnknown,
                "chunk's secure channel id does not match this channel",
            ));
        }
        if !matches!(
            self.state,
            ChannelState::ScInit | ChannelState::ScConnecting | ChannelState::Connected | ChannelState::ScRenewing
        ) {
            return Err(Error::new(
                StatusCode::BadTcpMessageTypeInvalid,
                "MSG/OPN/CLO chunks are only valid once the handshake has started",
            ));
        }

        let sequence_header = {
            use std::io::Cursor;
            use uasc_core::comms::SecurityHeader;
            let mut cursor = Cursor::new(chunk.body());
            let is_open = header.message_type.is_open_secure_channel();
            let security_header = SecurityHeader::decode_from_stream(&mut cursor, is_open, &decoding_options)?;
            if let SecurityHeader::Asymmetric(asym) = &security_header {
                if !asym.sender_certificate.is_null() {
                    self.secure_channel.set_remote_cert(Some(asym.sender_certificate.clone()));
                }
            }
            <uasc_core::comms::SequenceHeader as uasc_types::SimpleBinaryDecodable>::decode(&mut cursor, &decoding_options)?
        };

        if self.last_received_sequence_number != 0
            && sequence_header.sequence_number != self.last_received_sequence_number.wrapping_add(1)
            && self.assembly.is_none()
        {
            return Err(Error::new(
                StatusCode::BadSequenceNumberInvalid,
                "received sequence number is not the expected successor",
            ));
        }
        self.last_received_sequence_number = sequence_header.sequence_number;

        let outcome = MessageAssembly::accept(
            &mut self.assembly,
            chunk,
            sequence_header.request_id,
            self.limits.max_chunk_count,
            self.limits.max_message_size,
        )?;

        match outcome {
            AssemblyOutcome::Pending => Ok(ReceiveOutcome::Pending),
            AssemblyOutcome::Aborted(status) => Ok(ReceiveOutcome::SendFailure {
                request_id: sequence_header.request_id,
                status,
            }),
            AssemblyOutcome::Complete(chunks) => {
                let message = Chunker::decode::<T>(&chunks, &mut self.secure_channel)?;
                Ok(ReceiveOutcome::Message {
                    request_id: sequence_header.request_id,
                    message,
                })
            }
        }
    }

    pub fn close(&mut self) {
        if self.state != ChannelState::Closed {
            self.state = ChannelState::Closing;
        }
    }

    pub fn mark_closed(&mut self) {
        self.state = ChannelState::Closed;
        self.secure_channel.clear_security_token();
    }
}

pub enum ReceiveOutcome<T> {
    Pending,
    Message { request_id: u32, message: T },
    SendFailure { request_id: u32, status: StatusCode },
}

fn min_zero_infinite(server: u32, client: u32) -> u32 {
    if client == 0 {
        server
    } else if server == 0 {
        client
    } else {
        client.min(server)
    }
}

fn allocate_channel_id() -> u32 {
    loop {
        let id = rand::thread_rng().next_u32();
        if id != 0 {
            return id;
        }
    }
}

fn allocate_token_id() -> u32 {
    allocate_channel_id()
}
