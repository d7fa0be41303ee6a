//! Ties the channel, session and server layers into a single runtime value
//! an embedder constructs once and drives: no process-wide singleton, per
//! the design note against global mutable state.

pub mod runtime;
pub mod transport;

pub use runtime::Runtime;
pub use transport::TcpTransport;
