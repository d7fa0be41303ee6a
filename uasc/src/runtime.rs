//! The runtime value an embedder constructs once and drives, tying the
//! channel event loop to the session manager and the one application
//! service this core answers directly (GetEndpoints). Everything past that
//! goes to the injected [`ApplicationFacade`].

use log::{debug, warn};
use tokio::sync::mpsc;

use uasc_channel::{ApplicationEvent, Dispatcher, Event, EventLoop, LoopNotification, Transport};
use uasc_server::{get_endpoints, EndpointListener};
use uasc_session::{ApplicationFacade, ServerInfo, SessionManager};
use uasc_types::{
    RequestHeader, RequestMessage, ResponseHeader, ResponseMessage, ServiceFault, StatusCode,
    UtcTime,
};

/// Owns the channel event loop plus the server-side bookkeeping layered on
/// top of it. A client-only runtime simply never calls [`Runtime::listen`];
/// `sessions`/`listener`/`info` stay idle but cost nothing to carry.
pub struct Runtime<T: Transport> {
    event_loop: EventLoop<T>,
    sender: mpsc::Sender<Event>,
    sessions: SessionManager,
    listener: Option<EndpointListener>,
    info: Option<ServerInfo>,
}

impl<T: Transport> Runtime<T> {
    pub fn new(transport: T, dispatcher: Dispatcher) -> Self {
        let (event_loop, sender) = EventLoop::new(transport, dispatcher);
        Runtime {
            event_loop,
            sender,
            sessions: SessionManager::new(),
            listener: None,
            info: None,
        }
    }

    /// Enables the server-side services (GetEndpoints, session lifecycle)
    /// and starts tracking accepted channels against `endpoint_url`.
    pub fn listen(mut self, info: ServerInfo, endpoint_url: impl Into<String>) -> Self {
        self.listener = Some(EndpointListener::new(endpoint_url));
        self.info = Some(info);
        self
    }

    pub fn sender(&self) -> mpsc::Sender<Event> {
        self.sender.clone()
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn listener(&self) -> Option<&EndpointListener> {
        self.listener.as_ref()
    }

    /// Opens a fresh client-role channel to `url`. The eventual
    /// [`LoopNotification::ChannelConnected`] (or a disconnect) arrives
    /// through [`Runtime::serve`].
    pub async fn connect(&self, url: impl Into<String>) {
        let _ = self
            .sender
            .send(Event::Application(ApplicationEvent::Connect { url: url.into() }))
            .await;
    }

    pub async fn send_request(
        &self,
        channel_id: u32,
        request_id: u32,
        request: RequestMessage,
        timeout: Option<std::time::Duration>,
    ) {
        let _ = self
            .sender
            .send(Event::Application(ApplicationEvent::SendRequest {
                channel_id,
                request_id,
                request,
                timeout,
            }))
            .await;
    }

    pub async fn close_channel(&self, channel_id: u32) {
        let _ = self
            .sender
            .send(Event::Application(ApplicationEvent::CloseChannel { channel_id }))
            .await;
    }

    /// Drives the event loop one step at a time for as long as the
    /// transport keeps producing events, routing every notification either
    /// to the services this core owns directly or to `facade`. Returns once
    /// every sender handle (including this runtime's own) has dropped.
    pub async fn serve(&mut self, facade: &dyn ApplicationFacade) {
        while let Some(notifications) = self.event_loop.step().await {
            for notification in notifications {
                self.handle_notification(notification, facade).await;
            }
        }
    }

    async fn handle_notification(&mut self, notification: LoopNotification, facade: &dyn ApplicationFacade) {
        match notification {
            LoopNotification::ChannelOpening { channel_id, url } => {
                debug!("channel {channel_id} opening to {url}");
            }
            LoopNotification::ChannelConnected { channel_id } => {
                if let Some(listener) = &mut self.listener {
                    let _ = listener.accept(channel_id);
                }
                facade.on_channel_connected(channel_id);
            }
            LoopNotification::ChannelDisconnected { channel_id, status } => {
                if let Some(listener) = &mut self.listener {
                    listener.forget(channel_id);
                }
                for session_id in self.sessions.on_channel_disconnected(channel_id) {
                    debug!("session {session_id} orphaned by channel {channel_id} disconnect");
                }
                facade.on_channel_disconnected(channel_id, status);
            }
            LoopNotification::Request { channel_id, request_id, request } => {
                self.handle_request(channel_id, request_id, request, facade).await;
            }
            LoopNotification::Response { request_id, response, .. } => {
                facade.on_response(request_id, &response);
            }
            LoopNotification::SendFailure { request_id, status, .. } => {
                facade.on_send_failure(request_id, status);
            }
        }
    }

    /// Answers the four services this core handles without the façade: the
    /// other two `RequestMessage` variants (OpenSecureChannel,
    /// CloseSecureChannel) never reach here, since the dispatcher intercepts
    /// those chunk types before a `Request` notification is ever produced.
    async fn handle_request(
        &mut self,
        channel_id: u32,
        request_id: u32,
        request: RequestMessage,
        facade: &dyn ApplicationFacade,
    ) {
        let Some(info) = &self.info else {
            warn!("channel {channel_id} sent a session request but this runtime has no server info");
            return;
        };

        let response = match request {
            RequestMessage::GetEndpoints(req) => ResponseMessage::GetEndpoints(get_endpoints(info, &req)),
            RequestMessage::CreateSession(req) => {
                let Some(channel) = self.event_loop.channel(channel_id) else {
                    return;
                };
                match self.sessions.create_session(channel, info, &req) {
                    Ok(resp) => ResponseMessage::CreateSession(resp),
                    Err(status) => fault(&req.request_header, status),
                }
            }
            RequestMessage::ActivateSession(req) => {
                let Some(channel) = self.event_loop.channel(channel_id) else {
                    return;
                };
                match self.sessions.activate_session(channel, &req) {
                    Ok(resp) => {
                        facade.on_session_activated(&req.request_header.authentication_token);
                        ResponseMessage::ActivateSession(resp)
                    }
                    Err(status) => fault(&req.request_header, status),
                }
            }
            RequestMessage::CloseSession(req) => match self.sessions.close_session(&req) {
                Ok(resp) => ResponseMessage::CloseSession(resp),
                Err(status) => fault(&req.request_header, status),
            },
            RequestMessage::OpenSecureChannel(req) => {
                warn!("channel {channel_id} sent OpenSecureChannel as an application message");
                fault(&req.request_header, StatusCode::BadTcpMessageTypeInvalid)
            }
            RequestMessage::CloseSecureChannel(req) => {
                warn!("channel {channel_id} sent CloseSecureChannel as an application message");
                fault(&req.request_header, StatusCode::BadTcpMessageTypeInvalid)
            }
        };

        let _ = self
            .sender
            .send(Event::Application(ApplicationEvent::SendResponse {
                channel_id,
                request_id,
                response,
            }))
            .await;
    }
}

fn fault(request_header: &RequestHeader, status: StatusCode) -> ResponseMessage {
    ResponseMessage::Fault(ServiceFault {
        response_header: ResponseHeader::new_service_result(UtcTime::now(), request_header, status),
    })
}
