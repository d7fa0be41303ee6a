use std::io::{Read, Write};

use crate::encoding::{
    read_u16, write_u16, DecodingOptions, EncodingResult, SimpleBinaryDecodable,
    SimpleBinaryEncodable, UaNullable,
};
use crate::string::UAString;

/// A name qualified by a namespace index, e.g. a browse name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct QualifiedName {
    pub namespace_index: u16,
    pub name: UAString,
}

impl QualifiedName {
    pub fn new(namespace_index: u16, name: impl Into<UAString>) -> Self {
        QualifiedName {
            namespace_index,
            name: name.into(),
        }
    }

    pub fn null() -> Self {
        QualifiedName::default()
    }
}

impl UaNullable for QualifiedName {
    fn is_ua_null(&self) -> bool {
        self.name.is_null()
    }
}

impl SimpleBinaryEncodable for QualifiedName {
    fn byte_len(&self) -> usize {
        2 + self.name.byte_len()
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<usize> {
        let mut size = write_u16(stream, self.namespace_index)?;
        size += self.name.encode(stream)?;
        Ok(size)
    }
}

impl SimpleBinaryDecodable for QualifiedName {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        decoding_options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        let namespace_index = read_u16(stream)?;
        let name = UAString::decode(stream, decoding_options)?;
        Ok(QualifiedName {
            namespace_index,
            name,
        })
    }
}

/// Human-readable text with an optional locale, e.g. a user-facing server
/// description. The encoding mask selects which of locale/text are present
/// so null and empty remain distinguishable per field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct LocalizedText {
    pub locale: UAString,
    pub text: UAString,
}

impl LocalizedText {
    pub fn new(locale: impl Into<UAString>, text: impl Into<UAString>) -> Self {
        LocalizedText {
            locale: locale.into(),
            text: text.into(),
        }
    }

    pub fn null() -> Self {
        LocalizedText::default()
    }
}

impl UaNullable for LocalizedText {
    fn is_ua_null(&self) -> bool {
        self.locale.is_null() && self.text.is_null()
    }
}

const HAS_LOCALE: u8 = 0x01;
const HAS_TEXT: u8 = 0x02;

impl SimpleBinaryEncodable for LocalizedText {
    fn byte_len(&self) -> usize {
        let mut size = 1;
        if !self.locale.is_null() {
            size += self.locale.byte_len();
        }
        if !self.text.is_null() {
            size += self.text.byte_len();
        }
        size
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<usize> {
        let mut mask = 0u8;
        if !self.locale.is_null() {
            mask |= HAS_LOCALE;
        }
        if !self.text.is_null() {
            mask |= HAS_TEXT;
        }
        let mut size = crate::encoding::write_u8(stream, mask)?;
        if mask & HAS_LOCALE != 0 {
            size += self.locale.encode(stream)?;
        }
        if mask & HAS_TEXT != 0 {
            size += self.text.encode(stream)?;
        }
        Ok(size)
    }
}

impl SimpleBinaryDecodable for LocalizedText {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        decoding_options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        let mask = crate::encoding::read_u8(stream)?;
        let locale = if mask & HAS_LOCALE != 0 {
            UAString::decode(stream, decoding_options)?
        } else {
            UAString::null()
        };
        let text = if mask & HAS_TEXT != 0 {
            UAString::decode(stream, decoding_options)?
        } else {
            UAString::null()
        };
        Ok(LocalizedText { locale, text })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualified_name_round_trip() {
        let qn = QualifiedName::new(3, "Temperature");
        let mut buf = Vec::new();
        qn.encode(&mut buf).unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let decoded = QualifiedName::decode(&mut cursor, &DecodingOptions::default()).unwrap();
        assert_eq!(qn, decoded);
    }

    #[test]
    fn localized_text_partial_mask() {
        let lt = LocalizedText::new(UAString::null(), "no locale");
        let mut buf = Vec::new();
        lt.encode(&mut buf).unwrap();
        assert_eq!(buf[0], HAS_TEXT);
        let mut cursor = std::io::Cursor::new(buf);
        let decoded = LocalizedText::decode(&mut cursor, &DecodingOptions::default()).unwrap();
        assert_eq!(lt, decoded);
    }
}
