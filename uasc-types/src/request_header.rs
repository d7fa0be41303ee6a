use std::io::{Read, Write};

use crate::basic_types::UtcTime;
use crate::encoding::{
    read_u32, write_u32, DecodingOptions, EncodingResult, SimpleBinaryDecodable,
    SimpleBinaryEncodable, UaNullable,
};
use crate::extension_object::ExtensionObject;
use crate::node_id::NodeId;
use crate::string::UAString;

pub type IntegerId = u32;

/// Common header carried by every service request, binding it to a session
/// (via `authentication_token`) and a request handle used to match
/// responses and to request cancellation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RequestHeader {
    pub authentication_token: NodeId,
    pub timestamp: UtcTime,
    pub request_handle: IntegerId,
    pub return_diagnostics: u32,
    pub audit_entry_id: UAString,
    pub timeout_hint: u32,
    pub additional_header: ExtensionObject,
}

impl RequestHeader {
    pub fn new(authentication_token: NodeId, timestamp: UtcTime, request_handle: IntegerId) -> Self {
        RequestHeader {
            authentication_token,
            timestamp,
            request_handle,
            return_diagnostics: 0,
            audit_entry_id: UAString::null(),
            timeout_hint: 0,
            additional_header: ExtensionObject::null(),
        }
    }

    pub fn dummy() -> Self {
        RequestHeader::new(NodeId::null(), UtcTime::now(), 1)
    }
}

impl UaNullable for RequestHeader {}

impl SimpleBinaryEncodable for RequestHeader {
    fn byte_len(&self) -> usize {
        self.authentication_token.byte_len()
            + self.timestamp.byte_len()
            + 4
            + 4
            + self.audit_entry_id.byte_len()
            + 4
            + self.additional_header.byte_len()
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<usize> {
        let mut size = self.authentication_token.encode(stream)?;
        size += self.timestamp.encode(stream)?;
        size += write_u32(stream, self.request_handle)?;
        size += write_u32(stream, self.return_diagnostics)?;
        size += self.audit_entry_id.encode(stream)?;
        size += write_u32(stream, self.timeout_hint)?;
        size += self.additional_header.encode(stream)?;
        Ok(size)
    }
}

impl SimpleBinaryDecodable for RequestHeader {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        decoding_options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        Ok(RequestHeader {
            authentication_token: NodeId::decode(stream, decoding_options)?,
            timestamp: UtcTime::decode(stream, decoding_options)?,
            request_handle: read_u32(stream)?,
            return_diagnostics: read_u32(stream)?,
            audit_entry_id: UAString::decode(stream, decoding_options)?,
            timeout_hint: read_u32(stream)?,
            additional_header: ExtensionObject::decode(stream, decoding_options)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_header_round_trip() {
        let header = RequestHeader::new(NodeId::new(0, 7u32), UtcTime::now(), 42);
        let mut buf = Vec::new();
        header.encode(&mut buf).unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let decoded = RequestHeader::decode(&mut cursor, &DecodingOptions::default()).unwrap();
        assert_eq!(header, decoded);
    }
}
