use uasc_types::{ResponseMessage, StatusCode};

use crate::session::Session;

/// Context `route_request` hands to the application façade alongside a
/// decoded request body: which channel and session it arrived on, the
/// caller's identity, and the request-id to echo back in the eventual
/// response.
pub struct RequestContext<'a> {
    pub channel_id: u32,
    pub session: &'a Session,
    pub request_id: u32,
}

/// Upcalls the core makes into the embedding application, per the external
/// collaborator boundary: everything past GetEndpoints is opaque to this
/// core, handed off here instead of interpreted.
pub trait ApplicationFacade: Send + Sync {
    fn on_request(&self, ctx: &RequestContext<'_>, body: &uasc_types::RequestMessage);
    fn on_response(&self, request_id: u32, response: &ResponseMessage);
    fn on_send_failure(&self, request_id: u32, status: StatusCode);
    fn on_session_activated(&self, session_id: &uasc_types::NodeId);
    fn on_channel_connected(&self, channel_id: u32);
    fn on_channel_disconnected(&self, channel_id: u32, status: StatusCode);
}
