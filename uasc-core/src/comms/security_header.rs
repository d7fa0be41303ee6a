use std::io::{Read, Write};

use uasc_types::{
    read_u32, write_u32, ByteString, DecodingOptions, Error, EncodingResult,
    SimpleBinaryDecodable, SimpleBinaryEncodable, StatusCode, UAString, UaNullable,
};
use uasc_crypto::certificate_store::THUMBPRINT_SIZE;

/// Certificate bytes above this length are rejected without attempting to
/// parse them, so a hostile HELLO/OPN cannot force a large allocation
/// before any policy negotiation has happened.
pub const MAX_CERTIFICATE_LENGTH: usize = 7500;

/// `token_id` identifying which generation of derived symmetric keys
/// secures this chunk (MSG/CLO).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SymmetricSecurityHeader {
    pub token_id: u32,
}

impl UaNullable for SymmetricSecurityHeader {}

impl SimpleBinaryEncodable for SymmetricSecurityHeader {
    fn byte_len(&self) -> usize {
        4
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<usize> {
        write_u32(stream, self.token_id)
    }
}

impl SimpleBinaryDecodable for SymmetricSecurityHeader {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        _decoding_options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        Ok(SymmetricSecurityHeader {
            token_id: read_u32(stream)?,
        })
    }
}

/// Security header carried by an OPN chunk: the negotiated policy plus the
/// sender's own certificate and, once known, the thumbprint of the
/// receiver's certificate the sender encrypted against.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct AsymmetricSecurityHeader {
    pub security_policy_uri: UAString,
    pub sender_certificate: ByteString,
    pub receiver_certificate_thumbprint: ByteString,
}

impl AsymmetricSecurityHeader {
    pub fn none() -> Self {
        AsymmetricSecurityHeader {
            security_policy_uri: UAString::from(uasc_crypto::SecurityPolicy::None.to_uri()),
            sender_certificate: ByteString::null(),
            receiver_certificate_thumbprint: ByteString::null(),
        }
    }

    pub fn new(policy_uri: &str, sender_certificate: ByteString, receiver_thumbprint: ByteString) -> Self {
        AsymmetricSecurityHeader {
            security_policy_uri: UAString::from(policy_uri),
            sender_certificate,
            receiver_certificate_thumbprint: receiver_thumbprint,
        }
    }

    fn validate(&self) -> EncodingResult<()> {
        if self.sender_certificate.as_bytes().len() > MAX_CERTIFICATE_LENGTH {
            return Err(Error::new(
                StatusCode::BadCertificateInvalid,
                "sender certificate exceeds the maximum accepted length",
            ));
        }
        if !self.receiver_certificate_thumbprint.is_null()
            && self.receiver_certificate_thumbprint.as_bytes().len() != THUMBPRINT_SIZE
        {
            return Err(Error::new(
                StatusCode::BadCertificateInvalid,
                "receiver certificate thumbprint is not 20 bytes",
            ));
        }
        Ok(())
    }
}

impl UaNullable for AsymmetricSecurityHeader {}

impl SimpleBinaryEncodable for AsymmetricSecurityHeader {
    fn byte_len(&self) -> usize {
        self.security_policy_uri.byte_len()
            + self.sender_certificate.byte_len()
            + self.receiver_certificate_thumbprint.byte_len()
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<usize> {
        self.validate()?;
        let mut size = self.security_policy_uri.encode(stream)?;
        size += self.sender_certificate.encode(stream)?;
        size += self.receiver_certificate_thumbprint.encode(stream)?;
        Ok(size)
    }
}

impl SimpleBinaryDecodable for AsymmetricSecurityHeader {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        decoding_options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        let header = AsymmetricSecurityHeader {
            security_policy_uri: UAString::decode(stream, decoding_options)?,
            sender_certificate: ByteString::decode(stream, decoding_options)?,
            receiver_certificate_thumbprint: ByteString::decode(stream, decoding_options)?,
        };
        header.validate()?;
        Ok(header)
    }
}

/// Either shape of security header, selected by the chunk's message type:
/// OPN chunks carry [`AsymmetricSecurityHeader`], MSG/CLO carry
/// [`SymmetricSecurityHeader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityHeader {
    Asymmetric(AsymmetricSecurityHeader),
    Symmetric(SymmetricSecurityHeader),
}

impl SecurityHeader {
    pub fn decode_from_stream<S: Read + ?Sized>(
        stream: &mut S,
        is_open_secure_channel: bool,
        decoding_options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        if is_open_secure_channel {
            Ok(SecurityHeader::Asymmetric(AsymmetricSecurityHeader::decode(
                stream,
                decoding_options,
            )?))
        } else {
            Ok(SecurityHeader::Symmetric(SymmetricSecurityHeader::decode(
                stream,
                decoding_options,
            )?))
        }
    }

    pub fn byte_len(&self) -> usize {
        match self {
            SecurityHeader::Asymmetric(h) => h.byte_len(),
            SecurityHeader::Symmetric(h) => h.byte_len(),
        }
    }

    pub fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<usize> {
        match self {
            SecurityHeader::Asymmetric(h) => h.encode(stream),
            SecurityHeader::Symmetric(h) => h.encode(stream),
        }
    }
}

/// Per-chunk sequence header: strictly increasing `sequence_number` plus
/// the `request_id` binding every chunk of a message to the same request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SequenceHeader {
    pub sequence_number: u32,
    pub request_id: u32,
}

impl UaNullable for SequenceHeader {}

impl SimpleBinaryEncodable for SequenceHeader {
    fn byte_len(&self) -> usize {
        8
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<usize> {
        let mut size = write_u32(stream, self.sequence_number)?;
        size += write_u32(stream, self.request_id)?;
        Ok(size)
    }
}

impl SimpleBinaryDecodable for SequenceHeader {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        _decoding_options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        Ok(SequenceHeader {
            sequence_number: read_u32(stream)?,
            request_id: read_u32(stream)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_header_round_trip() {
        let header = AsymmetricSecurityHeader::none();
        let mut buf = Vec::new();
        header.encode(&mut buf).unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let decoded =
            AsymmetricSecurityHeader::decode(&mut cursor, &DecodingOptions::default()).unwrap();
        assert_eq!(header, decoded);
    }

    #[test]
    fn bad_thumbprint_length_is_rejected() {
        let header = AsymmetricSecurityHeader::new(
            "http://opcfoundation.org/UA/SecurityPolicy#None",
            ByteString::null(),
            ByteString::from(vec![1, 2, 3]),
        );
        let mut buf = Vec::new();
        assert!(header.encode(&mut buf).is_err());
    }

    #[test]
    fn sequence_header_round_trip() {
        let header = SequenceHeader {
            sequence_number: 5,
            request_id: 9,
        };
        let mut buf = Vec::new();
        header.encode(&mut buf).unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let decoded = SequenceHeader::decode(&mut cursor, &DecodingOptions::default()).unwrap();
        assert_eq!(header, decoded);
    }
}
