use std::fmt;
use std::io::{Read, Write};

use crate::basic_types::Guid;
use crate::byte_string::ByteString;
use crate::encoding::{
    read_u16, read_u8, write_u16, write_u8, DecodingOptions, Error, EncodingResult,
    SimpleBinaryDecodable, SimpleBinaryEncodable, UaNullable,
};
use crate::string::UAString;

/// The identifier half of a `NodeId`: numeric, string, GUID or opaque
/// byte-string, matching the four OPC UA identifier encodings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identifier {
    Numeric(u32),
    String(UAString),
    Guid(Guid),
    ByteString(ByteString),
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Numeric(v) => write!(f, "i={v}"),
            Identifier::String(v) => write!(f, "s={v}"),
            Identifier::Guid(v) => write!(f, "g={:?}", v.as_bytes()),
            Identifier::ByteString(v) => write!(f, "b={}", v.as_base64()),
        }
    }
}

const NODE_ID_TWO_BYTE: u8 = 0x00;
const NODE_ID_FOUR_BYTE: u8 = 0x01;
const NODE_ID_NUMERIC: u8 = 0x02;
const NODE_ID_STRING: u8 = 0x03;
const NODE_ID_GUID: u8 = 0x04;
const NODE_ID_BYTE_STRING: u8 = 0x05;

/// Identifies a node (or, for the handshake/session messages in this crate,
/// an opaque service-call token such as the anonymous authentication
/// token). `namespace_index` 0 is the OPC UA namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeId {
    pub namespace_index: u16,
    pub identifier: Identifier,
}

impl Default for NodeId {
    fn default() -> Self {
        NodeId::null()
    }
}

impl NodeId {
    pub fn new(namespace_index: u16, identifier: impl Into<Identifier>) -> Self {
        NodeId {
            namespace_index,
            identifier: identifier.into(),
        }
    }

    pub fn null() -> Self {
        NodeId {
            namespace_index: 0,
            identifier: Identifier::Numeric(0),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(
            (&self.identifier, self.namespace_index),
            (Identifier::Numeric(0), 0)
        )
    }
}

impl UaNullable for NodeId {
    fn is_ua_null(&self) -> bool {
        self.is_null()
    }
}

impl From<u32> for Identifier {
    fn from(v: u32) -> Self {
        Identifier::Numeric(v)
    }
}

impl From<&str> for Identifier {
    fn from(v: &str) -> Self {
        Identifier::String(UAString::from(v))
    }
}

impl From<ByteString> for Identifier {
    fn from(v: ByteString) -> Self {
        Identifier::ByteString(v)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ns={};{}", self.namespace_index, self.identifier)
    }
}

impl SimpleBinaryEncodable for NodeId {
    fn byte_len(&self) -> usize {
        match (&self.identifier, self.namespace_index) {
            (Identifier::Numeric(v), 0) if *v <= 255 => 2,
            (Identifier::Numeric(v), ns) if ns <= 255 && *v <= 65535 => 4,
            (Identifier::Numeric(_), _) => 7,
            (Identifier::String(v), _) => 3 + v.byte_len(),
            (Identifier::Guid(v), _) => 3 + v.byte_len(),
            (Identifier::ByteString(v), _) => 3 + v.byte_len(),
        }
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<usize> {
        match (&self.identifier, self.namespace_index) {
            (Identifier::Numeric(v), 0) if *v <= 255 => {
                let mut size = write_u8(stream, NODE_ID_TWO_BYTE)?;
                size += write_u8(stream, *v as u8)?;
                Ok(size)
            }
            (Identifier::Numeric(v), ns) if ns <= 255 && *v <= 65535 => {
                let mut size = write_u8(stream, NODE_ID_FOUR_BYTE)?;
                size += write_u8(stream, ns as u8)?;
                size += write_u16(stream, *v as u16)?;
                Ok(size)
            }
            (Identifier::Numeric(v), ns) => {
                let mut size = write_u8(stream, NODE_ID_NUMERIC)?;
                size += write_u16(stream, ns)?;
                size += crate::encoding::write_u32(stream, *v)?;
                Ok(size)
            }
            (Identifier::String(v), ns) => {
                let mut size = write_u8(stream, NODE_ID_STRING)?;
                size += write_u16(stream, ns)?;
                size += v.encode(stream)?;
                Ok(size)
            }
            (Identifier::Guid(v), ns) => {
                let mut size = write_u8(stream, NODE_ID_GUID)?;
                size += write_u16(stream, ns)?;
                size += v.encode(stream)?;
                Ok(size)
            }
            (Identifier::ByteString(v), ns) => {
                let mut size = write_u8(stream, NODE_ID_BYTE_STRING)?;
                size += write_u16(stream, ns)?;
                size += v.encode(stream)?;
                Ok(size)
            }
        }
    }
}

impl SimpleBinaryDecodable for NodeId {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        decoding_options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        let encoding = read_u8(stream)?;
        match encoding {
            NODE_ID_TWO_BYTE => {
                let v = read_u8(stream)?;
                Ok(NodeId::new(0, v as u32))
            }
            NODE_ID_FOUR_BYTE => {
                let ns = read_u8(stream)?;
                let v = read_u16(stream)?;
                Ok(NodeId::new(ns as u16, v as u32))
            }
            NODE_ID_NUMERIC => {
                let ns = read_u16(stream)?;
                let v = crate::encoding::read_u32(stream)?;
                Ok(NodeId::new(ns, v))
            }
            NODE_ID_STRING => {
                let ns = read_u16(stream)?;
                let v = UAString::decode(stream, decoding_options)?;
                Ok(NodeId {
                    namespace_index: ns,
                    identifier: Identifier::String(v),
                })
            }
            NODE_ID_GUID => {
                let ns = read_u16(stream)?;
                let v = Guid::decode(stream, decoding_options)?;
                Ok(NodeId {
                    namespace_index: ns,
                    identifier: Identifier::Guid(v),
                })
            }
            NODE_ID_BYTE_STRING => {
                let ns = read_u16(stream)?;
                let v = ByteString::decode(stream, decoding_options)?;
                Ok(NodeId {
                    namespace_index: ns,
                    identifier: Identifier::ByteString(v),
                })
            }
            other => Err(Error::decoding(format!(
                "unrecognised NodeId encoding byte {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_byte_node_id_round_trip() {
        let id = NodeId::new(0, 42u32);
        let mut buf = Vec::new();
        id.encode(&mut buf).unwrap();
        assert_eq!(buf.len(), id.byte_len());
        let mut cursor = std::io::Cursor::new(buf);
        let decoded = NodeId::decode(&mut cursor, &DecodingOptions::default()).unwrap();
        assert_eq!(id, decoded);
    }

    #[test]
    fn string_node_id_round_trip() {
        let id = NodeId::new(2, "MyNode");
        let mut buf = Vec::new();
        id.encode(&mut buf).unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let decoded = NodeId::decode(&mut cursor, &DecodingOptions::default()).unwrap();
        assert_eq!(id, decoded);
    }

    #[test]
    fn null_node_id() {
        assert!(NodeId::null().is_null());
        assert!(!NodeId::new(0, 1u32).is_null());
    }
}
