use std::io::{Read, Write};

use crate::byte_string::ByteString;
use crate::encoding::{
    read_u8, write_u8, DecodingOptions, Error, EncodingResult, SimpleBinaryDecodable,
    SimpleBinaryEncodable, UaNullable,
};
use crate::node_id::NodeId;

const ENCODING_NONE: u8 = 0x00;
const ENCODING_BYTE_STRING: u8 = 0x01;

/// An opaque, type-tagged extension value. Only the "no body" and
/// "opaque byte-string body" encodings are modelled: this core never needs
/// to interpret the contents of `additional_header` fields, it only needs
/// to carry them faithfully.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ExtensionObject {
    pub node_id: NodeId,
    pub body: Option<ByteString>,
}

impl ExtensionObject {
    pub fn null() -> Self {
        ExtensionObject {
            node_id: NodeId::null(),
            body: None,
        }
    }

    pub fn is_null(&self) -> bool {
        self.node_id.is_null() && self.body.is_none()
    }
}

impl UaNullable for ExtensionObject {
    fn is_ua_null(&self) -> bool {
        self.is_null()
    }
}

impl SimpleBinaryEncodable for ExtensionObject {
    fn byte_len(&self) -> usize {
        self.node_id.byte_len()
            + 1
            + self.body.as_ref().map(|b| b.byte_len()).unwrap_or(0)
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<usize> {
        let mut size = self.node_id.encode(stream)?;
        match &self.body {
            None => size += write_u8(stream, ENCODING_NONE)?,
            Some(b) => {
                size += write_u8(stream, ENCODING_BYTE_STRING)?;
                size += b.encode(stream)?;
            }
        }
        Ok(size)
    }
}

impl SimpleBinaryDecodable for ExtensionObject {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        decoding_options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        let node_id = NodeId::decode(stream, decoding_options)?;
        let encoding = read_u8(stream)?;
        let body = match encoding {
            ENCODING_NONE => None,
            ENCODING_BYTE_STRING => Some(ByteString::decode(stream, decoding_options)?),
            other => {
                return Err(Error::decoding(format!(
                    "unsupported ExtensionObject body encoding {other}"
                )))
            }
        };
        Ok(ExtensionObject { node_id, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_extension_object_round_trip() {
        let eo = ExtensionObject::null();
        let mut buf = Vec::new();
        eo.encode(&mut buf).unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let decoded = ExtensionObject::decode(&mut cursor, &DecodingOptions::default()).unwrap();
        assert!(decoded.is_null());
    }

    #[test]
    fn byte_string_body_round_trip() {
        let eo = ExtensionObject {
            node_id: NodeId::new(1, 99u32),
            body: Some(ByteString::from(vec![1, 2, 3])),
        };
        let mut buf = Vec::new();
        eo.encode(&mut buf).unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let decoded = ExtensionObject::decode(&mut cursor, &DecodingOptions::default()).unwrap();
        assert_eq!(eo, decoded);
    }
}
