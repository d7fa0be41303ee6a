pub mod chunker;
pub mod message_chunk;
pub mod secure_channel;
pub mod security_header;
pub mod url;

pub use chunker::Chunker;
pub use message_chunk::{MessageChunk, MessageChunkHeader, MessageChunkType, MessageIsFinalType};
pub use secure_channel::{Role, SecureChannel};
pub use security_header::{AsymmetricSecurityHeader, SecurityHeader, SequenceHeader, SymmetricSecurityHeader};
pub use url::hostname_port_from_url;
