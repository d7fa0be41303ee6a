//! Session layer: the per-session state machine, the server-wide facts the
//! session manager and GetEndpoints both need, the upcall boundary into the
//! embedding application, and the manager that owns every session on top of
//! whichever channels the channel layer currently has open.

pub mod facade;
pub mod info;
pub mod manager;
pub mod session;

pub use facade::{ApplicationFacade, RequestContext};
pub use info::ServerInfo;
pub use manager::SessionManager;
pub use session::{Session, SessionState};
