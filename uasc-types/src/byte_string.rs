use std::io::{Read, Write};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::encoding::{
    read_i32, write_bytes, write_i32, DecodingOptions, Error, EncodingResult,
    SimpleBinaryDecodable, SimpleBinaryEncodable, UaNullable,
};

/// An opaque array of bytes, nullable independently of being empty (a null
/// `ByteString` and an empty one are distinct on the wire: length `-1` vs
/// length `0`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ByteString {
    value: Option<Vec<u8>>,
}

impl ByteString {
    pub fn null() -> Self {
        ByteString { value: None }
    }

    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }

    pub fn is_empty(&self) -> bool {
        self.value.as_ref().map(|v| v.is_empty()).unwrap_or(true)
    }

    pub fn is_null_or_empty(&self) -> bool {
        self.is_null() || self.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.value.as_deref().unwrap_or(&[])
    }

    pub fn value(&self) -> Option<&Vec<u8>> {
        self.value.as_ref()
    }

    pub fn into_value(self) -> Option<Vec<u8>> {
        self.value
    }

    pub fn as_base64(&self) -> String {
        STANDARD.encode(self.as_bytes())
    }

    pub fn from_base64(s: &str) -> EncodingResult<Self> {
        STANDARD
            .decode(s)
            .map(|v| ByteString::from(v))
            .map_err(Error::decoding)
    }
}

impl UaNullable for ByteString {
    fn is_ua_null(&self) -> bool {
        self.is_null()
    }
}

impl AsRef<[u8]> for ByteString {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl From<Vec<u8>> for ByteString {
    fn from(v: Vec<u8>) -> Self {
        ByteString { value: Some(v) }
    }
}

impl From<&[u8]> for ByteString {
    fn from(v: &[u8]) -> Self {
        ByteString {
            value: Some(v.to_vec()),
        }
    }
}

impl SimpleBinaryEncodable for ByteString {
    fn byte_len(&self) -> usize {
        4 + self.value.as_ref().map(|v| v.len()).unwrap_or(0)
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<usize> {
        match &self.value {
            None => write_i32(stream, -1),
            Some(v) => {
                let mut size = write_i32(stream, v.len() as i32)?;
                size += write_bytes(stream, v)?;
                Ok(size)
            }
        }
    }
}

impl SimpleBinaryDecodable for ByteString {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        decoding_options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        let len = read_i32(stream)?;
        if len == -1 {
            Ok(ByteString::null())
        } else if len < -1 {
            Err(Error::decoding("negative byte string length"))
        } else if len as usize > decoding_options.max_byte_string_length {
            Err(Error::decoding("byte string exceeds configured maximum length"))
        } else {
            let mut buf = vec![0u8; len as usize];
            stream.read_exact(&mut buf).map_err(Error::from)?;
            Ok(ByteString::from(buf))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_string_null_distinct_from_empty() {
        let null = ByteString::null();
        let empty = ByteString::from(Vec::new());
        assert!(null.is_null());
        assert!(!empty.is_null());
        assert!(empty.is_empty());
    }

    #[test]
    fn byte_string_round_trip() {
        let bs = ByteString::from(vec![1, 2, 3, 4]);
        let mut buf = Vec::new();
        bs.encode(&mut buf).unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let decoded = ByteString::decode(&mut cursor, &DecodingOptions::default()).unwrap();
        assert_eq!(bs, decoded);
    }

    #[test]
    fn byte_string_null_round_trip() {
        let bs = ByteString::null();
        let mut buf = Vec::new();
        bs.encode(&mut buf).unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let decoded = ByteString::decode(&mut cursor, &DecodingOptions::default()).unwrap();
        assert!(decoded.is_null());
    }

    #[test]
    fn byte_string_rejects_oversized_length() {
        let mut buf = Vec::new();
        write_i32(&mut buf, 1_000_000).unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let opts = DecodingOptions::minimal();
        assert!(ByteString::decode(&mut cursor, &opts).is_err());
    }

    #[test]
    fn base64_round_trip() {
        let bs = ByteString::from(vec![9, 8, 7]);
        let encoded = bs.as_base64();
        let decoded = ByteString::from_base64(&encoded).unwrap();
        assert_eq!(bs, decoded);
    }
}
