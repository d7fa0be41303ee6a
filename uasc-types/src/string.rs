use std::io::{Read, Write};

use crate::encoding::{
    read_i32, write_bytes, write_i32, DecodingOptions, Error, EncodingResult,
    SimpleBinaryDecodable, SimpleBinaryEncodable, UaNullable,
};

/// A UTF-8 string, nullable independently of being empty, exactly like
/// [`crate::byte_string::ByteString`] but length-prefixed over UTF-8 bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct UAString {
    value: Option<String>,
}

impl UAString {
    pub fn null() -> Self {
        UAString { value: None }
    }

    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }

    pub fn is_empty(&self) -> bool {
        self.value.as_deref().map(str::is_empty).unwrap_or(true)
    }

    pub fn as_ref(&self) -> &str {
        self.value.as_deref().unwrap_or("")
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }
}

impl UaNullable for UAString {
    fn is_ua_null(&self) -> bool {
        self.is_null()
    }
}

impl From<&str> for UAString {
    fn from(s: &str) -> Self {
        UAString {
            value: Some(s.to_string()),
        }
    }
}

impl From<String> for UAString {
    fn from(s: String) -> Self {
        UAString { value: Some(s) }
    }
}

impl From<UAString> for String {
    fn from(s: UAString) -> Self {
        s.value.unwrap_or_default()
    }
}

impl std::fmt::Display for UAString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}

impl SimpleBinaryEncodable for UAString {
    fn byte_len(&self) -> usize {
        4 + self.value.as_ref().map(|v| v.len()).unwrap_or(0)
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<usize> {
        match &self.value {
            None => write_i32(stream, -1),
            Some(v) => {
                let bytes = v.as_bytes();
                let mut size = write_i32(stream, bytes.len() as i32)?;
                size += write_bytes(stream, bytes)?;
                Ok(size)
            }
        }
    }
}

impl SimpleBinaryDecodable for UAString {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        decoding_options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        let len = read_i32(stream)?;
        if len == -1 {
            Ok(UAString::null())
        } else if len < -1 {
            Err(Error::decoding("negative string length"))
        } else if len as usize > decoding_options.max_string_length {
            Err(Error::decoding("string exceeds configured maximum length"))
        } else {
            let mut buf = vec![0u8; len as usize];
            stream.read_exact(&mut buf).map_err(Error::from)?;
            String::from_utf8(buf)
                .map(UAString::from)
                .map_err(Error::decoding)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_round_trip() {
        let s = UAString::from("hello world");
        let mut buf = Vec::new();
        s.encode(&mut buf).unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let decoded = UAString::decode(&mut cursor, &DecodingOptions::default()).unwrap();
        assert_eq!(s, decoded);
    }

    #[test]
    fn string_rejects_invalid_utf8() {
        let mut buf = Vec::new();
        write_i32(&mut buf, 1).unwrap();
        buf.push(0xff);
        let mut cursor = std::io::Cursor::new(buf);
        assert!(UAString::decode(&mut cursor, &DecodingOptions::default()).is_err());
    }
}
