use std::io::{Read, Write};

use crate::basic_types::UtcTime;
use crate::diagnostic_info::DiagnosticInfo;
use crate::encoding::{
    read_u32, write_u32, DecodingOptions, EncodingResult, SimpleBinaryDecodable,
    SimpleBinaryEncodable, UaNullable,
};
use crate::extension_object::ExtensionObject;
use crate::request_header::RequestHeader;
use crate::status_code::StatusCode;
use crate::string::UAString;

/// Resolves a request handle either from a full `RequestHeader` or a bare
/// handle value, so response constructors can be called from either a
/// pending-request record or a header in hand.
pub trait AsRequestHandle {
    fn request_handle(&self) -> u32;
}

impl AsRequestHandle for &RequestHeader {
    fn request_handle(&self) -> u32 {
        self.request_handle
    }
}

impl AsRequestHandle for u32 {
    fn request_handle(&self) -> u32 {
        *self
    }
}

/// Common header carried by every service response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ResponseHeader {
    pub timestamp: UtcTime,
    pub request_handle: u32,
    pub service_result: StatusCode,
    pub service_diagnostics: DiagnosticInfo,
    pub string_table: Option<Vec<UAString>>,
    pub additional_header: ExtensionObject,
}

impl ResponseHeader {
    pub fn new_good(request_header: &RequestHeader) -> Self {
        Self::new_service_result(UtcTime::now(), request_header, StatusCode::Good)
    }

    pub fn new_service_result(
        timestamp: UtcTime,
        request_header: impl AsRequestHandle,
        service_result: StatusCode,
    ) -> Self {
        ResponseHeader {
            timestamp,
            request_handle: request_header.request_handle(),
            service_result,
            service_diagnostics: DiagnosticInfo::null(),
            string_table: None,
            additional_header: ExtensionObject::null(),
        }
    }

    pub fn new_timestamped_service_result(
        timestamp: UtcTime,
        request_header: &RequestHeader,
        service_result: StatusCode,
    ) -> Self {
        Self::new_service_result(timestamp, request_header, service_result)
    }

    pub fn null() -> Self {
        ResponseHeader::default()
    }
}

impl UaNullable for ResponseHeader {}

impl SimpleBinaryEncodable for ResponseHeader {
    fn byte_len(&self) -> usize {
        self.timestamp.byte_len()
            + 4
            + 4
            + self.service_diagnostics.byte_len()
            + crate::encoding::byte_len_array(&self.string_table)
            + self.additional_header.byte_len()
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<usize> {
        let mut size = self.timestamp.encode(stream)?;
        size += write_u32(stream, self.request_handle)?;
        size += write_u32(stream, self.service_result.bits())?;
        size += self.service_diagnostics.encode(stream)?;
        size += self.string_table.encode(stream)?;
        size += self.additional_header.encode(stream)?;
        Ok(size)
    }
}

impl SimpleBinaryDecodable for ResponseHeader {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        decoding_options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        Ok(ResponseHeader {
            timestamp: UtcTime::decode(stream, decoding_options)?,
            request_handle: read_u32(stream)?,
            service_result: StatusCode::from_bits(read_u32(stream)?),
            service_diagnostics: DiagnosticInfo::decode(stream, decoding_options)?,
            string_table: SimpleBinaryDecodable::decode(stream, decoding_options)?,
            additional_header: ExtensionObject::decode(stream, decoding_options)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node_id::NodeId;

    #[test]
    fn response_header_good_round_trip() {
        let req = RequestHeader::new(NodeId::null(), UtcTime::now(), 9);
        let resp = ResponseHeader::new_good(&req);
        let mut buf = Vec::new();
        resp.encode(&mut buf).unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let decoded = ResponseHeader::decode(&mut cursor, &DecodingOptions::default()).unwrap();
        assert_eq!(resp, decoded);
        assert_eq!(decoded.request_handle, 9);
        assert!(decoded.service_result.is_good());
    }
}
