//! Built-in wire types and service messages for the secure channel and
//! session layers: the OPC UA binary encoding, status codes, headers, and
//! the small set of service request/response bodies this core needs to
//! carry.

pub mod basic_types;
pub mod byte_string;
pub mod diagnostic_info;
pub mod encoding;
pub mod extension_object;
pub mod message;
pub mod node_id;
pub mod qualified_name;
pub mod request_header;
pub mod response_header;
pub mod service_messages;
pub mod status_code;
pub mod string;

pub use basic_types::{Guid, UtcTime};
pub use byte_string::ByteString;
pub use diagnostic_info::DiagnosticInfo;
pub use encoding::{
    read_f32, read_f64, read_i16, read_i32, read_i64, read_u16, read_u32, read_u64, read_u8,
    skip_bytes, write_bytes, write_f32, write_f64, write_i16, write_i32, write_i64, write_u16,
    write_u32, write_u64, write_u8, BinaryDecodable, BinaryEncodable, DecodingOptions, DepthGauge,
    DepthLock, Error, EncodingResult, SimpleBinaryDecodable, SimpleBinaryEncodable, UaNullable,
};
pub use extension_object::ExtensionObject;
pub use message::{binary_id, DecodableMessage, Message, RequestMessage, ResponseMessage};
pub use node_id::{Identifier, NodeId};
pub use qualified_name::{LocalizedText, QualifiedName};
pub use request_header::{IntegerId, RequestHeader};
pub use response_header::{AsRequestHandle, ResponseHeader};
pub use service_messages::*;
pub use status_code::StatusCode;
pub use string::UAString;
