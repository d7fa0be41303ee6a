//! Wire-level plumbing shared by the channel and session layers: chunk
//! framing, security headers, the secure channel's cryptographic state,
//! and the ambient config/error types the rest of the workspace builds on.

pub mod comms;
pub mod config;
pub mod errors;

pub use comms::{hostname_port_from_url, Chunker, MessageChunk, MessageChunkType, Role, SecureChannel, SecurityHeader};
pub use config::{ChannelLimits, Config, ConfigError};
pub use errors::CoreError;
