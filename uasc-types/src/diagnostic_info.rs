use std::io::{Read, Write};

use crate::encoding::{
    read_i32, write_i32, DecodingOptions, EncodingResult, SimpleBinaryDecodable,
    SimpleBinaryEncodable, UaNullable,
};
use crate::status_code::StatusCode;
use crate::string::UAString;

const HAS_SYMBOLIC_ID: u8 = 0x01;
const HAS_NAMESPACE: u8 = 0x02;
const HAS_LOCALIZED_TEXT: u8 = 0x04;
const HAS_LOCALE: u8 = 0x08;
const HAS_ADDITIONAL_INFO: u8 = 0x10;
const HAS_INNER_STATUS_CODE: u8 = 0x20;
const HAS_INNER_DIAGNOSTIC_INFO: u8 = 0x40;

/// Extended error context a peer may attach to a response. Every field is
/// optional; the server side of this core never populates more than
/// `inner_status_code`, but decoding must still accept a fully populated
/// structure from a conformant peer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct DiagnosticInfo {
    pub symbolic_id: Option<i32>,
    pub namespace_uri: Option<i32>,
    pub locale: Option<i32>,
    pub localized_text: Option<i32>,
    pub additional_info: Option<UAString>,
    pub inner_status_code: Option<StatusCode>,
    pub inner_diagnostic_info: Option<Box<DiagnosticInfo>>,
}

impl DiagnosticInfo {
    pub fn null() -> Self {
        DiagnosticInfo::default()
    }

    pub fn is_null(&self) -> bool {
        self == &DiagnosticInfo::default()
    }

    fn mask(&self) -> u8 {
        let mut mask = 0u8;
        if self.symbolic_id.is_some() {
            mask |= HAS_SYMBOLIC_ID;
        }
        if self.namespace_uri.is_some() {
            mask |= HAS_NAMESPACE;
        }
        if self.localized_text.is_some() {
            mask |= HAS_LOCALIZED_TEXT;
        }
        if self.locale.is_some() {
            mask |= HAS_LOCALE;
        }
        if self.additional_info.is_some() {
            mask |= HAS_ADDITIONAL_INFO;
        }
        if self.inner_status_code.is_some() {
            mask |= HAS_INNER_STATUS_CODE;
        }
        if self.inner_diagnostic_info.is_some() {
            mask |= HAS_INNER_DIAGNOSTIC_INFO;
        }
        mask
    }
}

impl UaNullable for DiagnosticInfo {
    fn is_ua_null(&self) -> bool {
        self.is_null()
    }
}

impl SimpleBinaryEncodable for DiagnosticInfo {
    fn byte_len(&self) -> usize {
        let mut size = 1;
        if self.symbolic_id.is_some() {
            size += 4;
        }
        if self.namespace_uri.is_some() {
            size += 4;
        }
        if self.locale.is_some() {
            size += 4;
        }
        if self.localized_text.is_some() {
            size += 4;
        }
        if let Some(v) = &self.additional_info {
            size += v.byte_len();
        }
        if self.inner_status_code.is_some() {
            size += 4;
        }
        if let Some(v) = &self.inner_diagnostic_info {
            size += v.byte_len();
        }
        size
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<usize> {
        let mask = self.mask();
        let mut size = crate::encoding::write_u8(stream, mask)?;
        if let Some(v) = self.symbolic_id {
            size += write_i32(stream, v)?;
        }
        if let Some(v) = self.namespace_uri {
            size += write_i32(stream, v)?;
        }
        if let Some(v) = self.locale {
            size += write_i32(stream, v)?;
        }
        if let Some(v) = self.localized_text {
            size += write_i32(stream, v)?;
        }
        if let Some(v) = &self.additional_info {
            size += v.encode(stream)?;
        }
        if let Some(v) = self.inner_status_code {
            size += crate::encoding::write_u32(stream, v.bits())?;
        }
        if let Some(v) = &self.inner_diagnostic_info {
            size += v.encode(stream)?;
        }
        Ok(size)
    }
}

impl SimpleBinaryDecodable for DiagnosticInfo {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        decoding_options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        let _depth_lock = decoding_options.depth_lock()?;
        let mask = crate::encoding::read_u8(stream)?;
        let mut info = DiagnosticInfo::default();
        if mask & HAS_SYMBOLIC_ID != 0 {
            info.symbolic_id = Some(read_i32(stream)?);
        }
        if mask & HAS_NAMESPACE != 0 {
            info.namespace_uri = Some(read_i32(stream)?);
        }
        if mask & HAS_LOCALE != 0 {
            info.locale = Some(read_i32(stream)?);
        }
        if mask & HAS_LOCALIZED_TEXT != 0 {
            info.localized_text = Some(read_i32(stream)?);
        }
        if mask & HAS_ADDITIONAL_INFO != 0 {
            info.additional_info = Some(UAString::decode(stream, decoding_options)?);
        }
        if mask & HAS_INNER_STATUS_CODE != 0 {
            info.inner_status_code = Some(StatusCode::from_bits(crate::encoding::read_u32(
                stream,
            )?));
        }
        if mask & HAS_INNER_DIAGNOSTIC_INFO != 0 {
            info.inner_diagnostic_info =
                Some(Box::new(DiagnosticInfo::decode(stream, decoding_options)?));
        }
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_diagnostic_info_is_one_byte() {
        let di = DiagnosticInfo::null();
        let mut buf = Vec::new();
        di.encode(&mut buf).unwrap();
        assert_eq!(buf, vec![0u8]);
    }

    #[test]
    fn nested_diagnostic_info_round_trip() {
        let di = DiagnosticInfo {
            inner_status_code: Some(StatusCode::BadTimeout),
            inner_diagnostic_info: Some(Box::new(DiagnosticInfo {
                additional_info: Some(UAString::from("context")),
                ..Default::default()
            })),
            ..Default::default()
        };
        let mut buf = Vec::new();
        di.encode(&mut buf).unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let decoded = DiagnosticInfo::decode(&mut cursor, &DecodingOptions::default()).unwrap();
        assert_eq!(di, decoded);
    }
}
