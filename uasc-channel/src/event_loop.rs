use std::time::Duration;

use log::{error, warn};
use tokio::sync::mpsc;
use uasc_types::{RequestMessage, ResponseMessage, StatusCode};

use crate::dispatcher::{DispatchOutcome, Dispatcher};
use crate::registry::ChannelRegistry;
use crate::transport::{SocketEvent, SocketHandle, Transport};

/// Timer-driven work the event loop schedules against itself: token renewal,
/// outbound request timeouts, and (once a session layer sits above this)
/// session timeouts. The inner ids are opaque to the timer; only the event
/// loop interprets them.
#[derive(Debug, Clone, Copy)]
pub enum TimerEvent {
    TokenRenewal { channel_id: u32 },
    OutboundRequestTimeout { channel_id: u32, request_id: u32 },
}

/// Requests the application makes of the event loop. `ConnectRequest` opens
/// a fresh socket and channel; `SendRequest` encodes and queues a message on
/// an already-connected channel; `CloseChannel` starts a graceful CLO
/// handshake.
pub enum ApplicationEvent {
    Connect { url: String },
    SendRequest {
        channel_id: u32,
        request_id: u32,
        request: RequestMessage,
        timeout: Option<Duration>,
    },
    /// Server side reply to a decoded `Request` notification: echoes
    /// `request_id` as the chunk's sequence-layer request id, same as the
    /// inbound request carried it.
    SendResponse {
        channel_id: u32,
        request_id: u32,
        response: ResponseMessage,
    },
    CloseChannel { channel_id: u32 },
}

pub enum Event {
    Socket(SocketEvent),
    Timer(TimerEvent),
    Application(ApplicationEvent),
}

/// Everything the event loop reports upward once it has processed an event
/// to completion. The owner (session/server layer) reacts to these; the
/// event loop itself has no notion of sessions.
#[derive(Debug)]
pub enum LoopNotification {
    /// A `Connect` request allocated this channel id and sent its HELLO;
    /// the caller can use this to correlate the eventual `ChannelConnected`
    /// (or teardown) with the URL it asked to open.
    ChannelOpening { channel_id: u32, url: String },
    ChannelConnected { channel_id: u32 },
    ChannelDisconnected { channel_id: u32, status: StatusCode },
    Request { channel_id: u32, request_id: u32, request: RequestMessage },
    Response { channel_id: u32, request_id: u32, response: ResponseMessage },
    SendFailure { channel_id: u32, request_id: u32, status: StatusCode },
}

/// The single-threaded cooperative scheduler described for this core: one
/// bounded inbound queue, one consumer, every event driven to completion
/// before the next is dequeued. Generic over the transport so tests can run
/// it against an in-memory fake instead of real sockets.
pub struct EventLoop<T: Transport> {
    transport: T,
    dispatcher: Dispatcher,
    registry: ChannelRegistry,
    events: mpsc::Receiver<Event>,
    sender: mpsc::Sender<Event>,
}

const EVENT_QUEUE_CAPACITY: usize = 1024;

impl<T: Transport> EventLoop<T> {
    pub fn new(transport: T, dispatcher: Dispatcher) -> (Self, mpsc::Sender<Event>) {
        let (sender, events) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let handle = sender.clone();
        (
            EventLoop {
                transport,
                dispatcher,
                registry: ChannelRegistry::new(),
                events,
                sender,
            },
            handle,
        )
    }

    pub fn sender(&self) -> mpsc::Sender<Event> {
        self.sender.clone()
    }

    /// Read-only access to a tracked channel, for a caller (the session
    /// layer) that needs to inspect channel state between processing steps.
    pub fn channel(&self, channel_id: u32) -> Option<&crate::fsm::Channel> {
        self.registry.get(channel_id)
    }

    /// Runs until the event channel is closed, processing exactly one event
    /// to completion per iteration and forwarding whatever it produced.
    pub async fn run(&mut self, notifications: mpsc::Sender<LoopNotification>) {
        while let Some(event) = self.events.recv().await {
            for notification in self.handle_event(event) {
                if notifications.send(notification).await.is_err() {
                    return;
                }
            }
        }
    }

    /// Waits for and processes exactly one event, returning the
    /// notifications it produced (or `None` once every sender has dropped).
    /// Lets an owner that needs read access to channel state between steps
    /// (the session layer) drive the loop itself instead of spawning `run`.
    pub async fn step(&mut self) -> Option<Vec<LoopNotification>> {
        let event = self.events.recv().await?;
        Some(self.handle_event(event))
    }

    /// Processes one event and returns every notification it produced (an
    /// inbound byte batch can yield more than one, or none).
    pub fn handle_event(&mut self, event: Event) -> Vec<LoopNotification> {
        match event {
            Event::Socket(socket_event) => self.handle_socket_event(socket_event),
            Event::Timer(timer_event) => self.handle_timer_event(timer_event),
            Event::Application(app_event) => self.handle_application_event(app_event),
        }
    }

    fn handle_socket_event(&mut self, event: SocketEvent) -> Vec<LoopNotification> {
        match event {
            SocketEvent::Created(handle) => {
                self.dispatcher.on_socket_created(handle);
                Vec::new()
            }
            SocketEvent::Connected(_handle) => Vec::new(),
            SocketEvent::Bytes(handle, bytes) => self.drain_bytes(handle, &bytes),
            SocketEvent::Disconnected(handle, status) => {
                let channel_id = self.dispatcher.channel_for_socket(handle);
                warn!("socket {handle} disconnected: {status}");
                self.dispatcher.on_socket_closed(handle, &mut self.registry);
                channel_id
                    .map(|id| vec![LoopNotification::ChannelDisconnected { channel_id: id, status }])
                    .unwrap_or_default()
            }
            SocketEvent::WriteDone(_handle) => Vec::new(),
        }
    }

    /// One socket byte delivery can contain several whole frames back to
    /// back; keep dispatching until the decoder has nothing left to give.
    fn drain_bytes(&mut self, handle: SocketHandle, bytes: &[u8]) -> Vec<LoopNotification> {
        let mut notifications = Vec::new();
        let mut outcome = self.dispatcher.on_bytes(handle, bytes, &mut self.registry);
        loop {
            match outcome {
                DispatchOutcome::Pending => break,
                DispatchOutcome::Send(to, buffer) => {
                    self.transport.write(to, buffer);
                }
                DispatchOutcome::Request { channel_id, request_id, request } => {
                    notifications.push(LoopNotification::Request { channel_id, request_id, request });
                }
                DispatchOutcome::Response { channel_id, request_id, response, newly_connected } => {
                    if let Some(channel) = self.registry.get_mut(channel_id) {
                        channel.take_pending(request_id);
                    }
                    if newly_connected {
                        notifications.push(LoopNotification::ChannelConnected { channel_id });
                    }
                    notifications.push(LoopNotification::Response { channel_id, request_id, response });
                }
                DispatchOutcome::ChannelEstablished { handle: to, buffer, channel_id } => {
                    self.transport.write(to, buffer);
                    notifications.push(LoopNotification::ChannelConnected { channel_id });
                }
                DispatchOutcome::SendFailure { channel_id, request_id, status } => {
                    notifications.push(LoopNotification::SendFailure { channel_id, request_id, status });
                }
                DispatchOutcome::FatalError(handle, status) => {
                    error!("socket {handle} protocol violation, tearing down: {status}");
                    if let Some(channel_id) = self.dispatcher.channel_for_socket(handle) {
                        notifications.push(LoopNotification::ChannelDisconnected { channel_id, status });
                    }
                    self.transport.close(handle);
                    self.dispatcher.on_socket_closed(handle, &mut self.registry);
                    break;
                }
            }
            outcome = self.dispatcher.on_bytes(handle, &[], &mut self.registry);
        }
        notifications
    }

    fn handle_timer_event(&mut self, event: TimerEvent) -> Vec<LoopNotification> {
        match event {
            TimerEvent::TokenRenewal { channel_id } => self.renew_token(channel_id),
            TimerEvent::OutboundRequestTimeout { channel_id, request_id } => {
                let Some(channel) = self.registry.get_mut(channel_id) else {
                    return Vec::new();
                };
                if channel.take_pending(request_id) {
                    vec![LoopNotification::SendFailure {
                        channel_id,
                        request_id,
                        status: StatusCode::BadTimeout,
                    }]
                } else {
                    Vec::new()
                }
            }
        }
    }

    /// Client-side token renewal: builds a Renew OpenSecureChannelRequest on
    /// the existing channel's own policy/mode and sends it over the bound
    /// socket. A no-op if the channel isn't due for renewal, isn't a client
    /// channel, or has no bound socket.
    fn renew_token(&mut self, channel_id: u32) -> Vec<LoopNotification> {
        let Some(socket) = self.dispatcher.socket_for_channel(channel_id) else {
            return Vec::new();
        };
        let Some(channel) = self.registry.get_mut(channel_id) else {
            return Vec::new();
        };
        if !channel.should_renew() {
            return Vec::new();
        }
        let policy = channel.secure_channel().security_policy();
        let mode = channel.secure_channel().security_mode();
        let request_handle = channel.allocate_request_id();
        let request = match channel.make_open_secure_channel_request(policy, mode, 3_600_000, request_handle) {
            Ok(r) => r,
            Err(e) => {
                warn!("channel {channel_id} failed to build renewal request: {}", e.status());
                return Vec::new();
            }
        };
        let request_message = RequestMessage::OpenSecureChannel(request);
        match channel.encode_message(uasc_core::comms::MessageChunkType::OpenSecureChannel, request_handle, &request_message) {
            Ok(chunks) => {
                for chunk in chunks {
                    self.transport.write(socket, chunk.data);
                }
                Vec::new()
            }
            Err(e) => {
                warn!("channel {channel_id} failed to encode renewal request: {}", e.status());
                Vec::new()
            }
        }
    }

    fn handle_application_event(&mut self, event: ApplicationEvent) -> Vec<LoopNotification> {
        match event {
            ApplicationEvent::Connect { url } => {
                let handle = self.transport.open(&url);
                self.dispatcher.on_socket_created(handle);
                match self.dispatcher.connect_client(handle, &url, &mut self.registry) {
                    DispatchOutcome::Send(to, buffer) => {
                        self.transport.write(to, buffer);
                        let channel_id = self.dispatcher.channel_for_socket(handle).unwrap_or(0);
                        vec![LoopNotification::ChannelOpening { channel_id, url }]
                    }
                    DispatchOutcome::FatalError(handle, status) => {
                        self.transport.close(handle);
                        self.dispatcher.on_socket_closed(handle, &mut self.registry);
                        warn!("failed to open channel to {url}: {status}");
                        Vec::new()
                    }
                    _ => Vec::new(),
                }
            }
            ApplicationEvent::SendRequest {
                channel_id,
                request_id,
                request,
                timeout,
            } => {
                let Some(channel) = self.registry.get_mut(channel_id) else {
                    return vec![LoopNotification::SendFailure {
                        channel_id,
                        request_id,
                        status: StatusCode::BadSecureChannelClosed,
                    }];
                };
                channel.register_pending(request_id, timeout);
                match channel.encode_message(
                    uasc_core::comms::MessageChunkType::Message,
                    request_id,
                    &request,
                ) {
                    Ok(chunks) => {
                        if let Some(socket) = self.dispatcher.socket_for_channel(channel_id) {
                            for chunk in chunks {
                                self.transport.write(socket, chunk.data);
                            }
                        }
                        Vec::new()
                    }
                    Err(e) => {
                        channel.take_pending(request_id);
                        if let Ok(abort) = channel.encode_abort_chunk(
                            uasc_core::comms::MessageChunkType::Message,
                            request_id,
                            StatusCode::BadTcpMessageTooLarge,
                        ) {
                            if let Some(socket) = self.dispatcher.socket_for_channel(channel_id) {
                                self.transport.write(socket, abort.data);
                            }
                        }
                        vec![LoopNotification::SendFailure {
                            channel_id,
                            request_id,
                            status: e.status(),
                        }]
                    }
                }
            }
            ApplicationEvent::SendResponse {
                channel_id,
                request_id,
                response,
            } => {
                let Some(channel) = self.registry.get_mut(channel_id) else {
                    return Vec::new();
                };
                match channel.encode_message(uasc_core::comms::MessageChunkType::Message, request_id, &response) {
                    Ok(chunks) => {
                        if let Some(socket) = self.dispatcher.socket_for_channel(channel_id) {
                            for chunk in chunks {
                                self.transport.write(socket, chunk.data);
                            }
                        }
                    }
                    Err(e) => {
                        warn!("channel {channel_id} failed to encode response: {}", e.status());
                        if let Ok(abort) = channel.encode_abort_chunk(
                            uasc_core::comms::MessageChunkType::Message,
                            request_id,
                            StatusCode::BadTcpMessageTooLarge,
                        ) {
                            if let Some(socket) = self.dispatcher.socket_for_channel(channel_id) {
                                self.transport.write(socket, abort.data);
                            }
                        }
                    }
                }
                Vec::new()
            }
            ApplicationEvent::CloseChannel { channel_id } => {
                if let Some(channel) = self.registry.get_mut(channel_id) {
                    channel.close();
                    if let Some(socket) = self.dispatcher.socket_for_channel(channel_id) {
                        self.transport.close(socket);
                    }
                }
                Vec::new()
            }
        }
    }
}
