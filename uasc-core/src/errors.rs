//! Errors specific to this crate's state machines, distinct from the
//! leaf [`uasc_types::Error`] that the wire codec produces.

use thiserror::Error;

/// Failure modes of the channel/session layer that are not themselves
/// wire-codec errors: they describe why an operation could not be
/// attempted at all.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("channel is not in a state that allows this operation: {0}")]
    InvalidChannelState(String),
    #[error("session is not in a state that allows this operation: {0}")]
    InvalidSessionState(String),
    #[error("no security token has been negotiated yet")]
    NoSecurityToken,
    #[error("chunk set failed validation: {0}")]
    ChunkValidation(String),
}
