use std::io::{Cursor, Read, Write};

use uasc_types::{
    read_u32, write_u32, DecodingOptions, Error, EncodingResult, SimpleBinaryDecodable,
    SimpleBinaryEncodable, StatusCode, UaNullable,
};

/// `message_type` (3 bytes) + `is_final` (1 byte) + `message_size` (4
/// bytes) + `secure_channel_id` (4 bytes).
pub const MESSAGE_CHUNK_HEADER_SIZE: usize = 3 + 1 + 4 + 4;

/// Offset of the `message_size` field within the header, used when a
/// chunk's declared size needs patching after the body is written.
pub const MESSAGE_SIZE_OFFSET: usize = 3 + 1;

const MESSAGE_CHUNK: [u8; 3] = *b"MSG";
const OPEN_SECURE_CHANNEL_CHUNK: [u8; 3] = *b"OPN";
const CLOSE_SECURE_CHANNEL_CHUNK: [u8; 3] = *b"CLO";

const CHUNK_FINAL: u8 = b'F';
const CHUNK_INTERMEDIATE: u8 = b'C';
const CHUNK_FINAL_ERROR: u8 = b'A';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageChunkType {
    Message,
    OpenSecureChannel,
    CloseSecureChannel,
}

impl MessageChunkType {
    pub fn is_open_secure_channel(self) -> bool {
        matches!(self, MessageChunkType::OpenSecureChannel)
    }

    fn marker(self) -> [u8; 3] {
        match self {
            MessageChunkType::Message => MESSAGE_CHUNK,
            MessageChunkType::OpenSecureChannel => OPEN_SECURE_CHANNEL_CHUNK,
            MessageChunkType::CloseSecureChannel => CLOSE_SECURE_CHANNEL_CHUNK,
        }
    }

    fn from_marker(marker: [u8; 3]) -> EncodingResult<Self> {
        Ok(match marker {
            MESSAGE_CHUNK => MessageChunkType::Message,
            OPEN_SECURE_CHANNEL_CHUNK => MessageChunkType::OpenSecureChannel,
            CLOSE_SECURE_CHANNEL_CHUNK => MessageChunkType::CloseSecureChannel,
            _ => {
                return Err(Error::new(
                    StatusCode::BadTcpMessageTypeInvalid,
                    "unrecognised chunk message type marker",
                ))
            }
        })
    }
}

/// Whether this chunk is the only (or last) piece of a message, an
/// intermediate piece, or an abort marker replacing the rest of the
/// message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageIsFinalType {
    Intermediate,
    Final,
    FinalError,
}

impl MessageIsFinalType {
    fn marker(self) -> u8 {
        match self {
            MessageIsFinalType::Intermediate => CHUNK_INTERMEDIATE,
            MessageIsFinalType::Final => CHUNK_FINAL,
            MessageIsFinalType::FinalError => CHUNK_FINAL_ERROR,
        }
    }

    fn from_marker(marker: u8) -> EncodingResult<Self> {
        Ok(match marker {
            CHUNK_FINAL => MessageIsFinalType::Final,
            CHUNK_INTERMEDIATE => MessageIsFinalType::Intermediate,
            CHUNK_FINAL_ERROR => MessageIsFinalType::FinalError,
            _ => {
                return Err(Error::new(
                    StatusCode::BadTcpMessageTypeInvalid,
                    "unrecognised chunk is-final marker",
                ))
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageChunkHeader {
    pub message_type: MessageChunkType,
    pub is_final: MessageIsFinalType,
    pub message_size: u32,
    pub secure_channel_id: u32,
}

impl UaNullable for MessageChunkHeader {}

impl SimpleBinaryEncodable for MessageChunkHeader {
    fn byte_len(&self) -> usize {
        MESSAGE_CHUNK_HEADER_SIZE
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<usize> {
        uasc_types::write_bytes(stream, &self.message_type.marker())?;
        uasc_types::write_u8(stream, self.is_final.marker())?;
        write_u32(stream, self.message_size)?;
        write_u32(stream, self.secure_channel_id)?;
        Ok(MESSAGE_CHUNK_HEADER_SIZE)
    }
}

impl SimpleBinaryDecodable for MessageChunkHeader {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        decoding_options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        let mut marker = [0u8; 3];
        stream
            .read_exact(&mut marker)
            .map_err(uasc_types::Error::from)?;
        let message_type = MessageChunkType::from_marker(marker)?;
        let is_final = MessageIsFinalType::from_marker(uasc_types::read_u8(stream)?)?;
        let message_size = read_u32(stream)?;
        if message_size as usize > decoding_options.max_message_size {
            return Err(Error::new(
                StatusCode::BadTcpMessageTooLarge,
                "chunk claims a message size above the configured maximum",
            ));
        }
        let secure_channel_id = read_u32(stream)?;
        Ok(MessageChunkHeader {
            message_type,
            is_final,
            message_size,
            secure_channel_id,
        })
    }
}

/// One physical chunk as it travels on the wire: a header followed by the
/// (still possibly encrypted/signed) security header, sequence header and
/// body bytes. `data` always holds the full encoded chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageChunk {
    pub data: Vec<u8>,
}

impl MessageChunk {
    pub fn new(
        message_type: MessageChunkType,
        is_final: MessageIsFinalType,
        secure_channel_id: u32,
        header_and_body: &[u8],
    ) -> EncodingResult<Self> {
        let header = MessageChunkHeader {
            message_type,
            is_final,
            message_size: (MESSAGE_CHUNK_HEADER_SIZE + header_and_body.len()) as u32,
            secure_channel_id,
        };
        let mut data = Vec::with_capacity(header.message_size as usize);
        header.encode(&mut data)?;
        data.extend_from_slice(header_and_body);
        Ok(MessageChunk { data })
    }

    pub fn message_header(&self, decoding_options: &DecodingOptions) -> EncodingResult<MessageChunkHeader> {
        let mut cursor = Cursor::new(&self.data);
        MessageChunkHeader::decode(&mut cursor, decoding_options)
    }

    pub fn body(&self) -> &[u8] {
        &self.data[MESSAGE_CHUNK_HEADER_SIZE..]
    }

    pub fn decode<S: Read + ?Sized>(
        stream: &mut S,
        decoding_options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        let mut header_buf = [0u8; MESSAGE_CHUNK_HEADER_SIZE];
        stream
            .read_exact(&mut header_buf)
            .map_err(uasc_types::Error::from)?;
        let mut cursor = Cursor::new(&header_buf[..]);
        let header = MessageChunkHeader::decode(&mut cursor, decoding_options)?;

        let mut data = Vec::with_capacity(header.message_size as usize);
        data.extend_from_slice(&header_buf);
        let remaining = header.message_size as usize - MESSAGE_CHUNK_HEADER_SIZE;
        let mut body = vec![0u8; remaining];
        stream.read_exact(&mut body).map_err(uasc_types::Error::from)?;
        data.extend_from_slice(&body);
        Ok(MessageChunk { data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trip() {
        let header = MessageChunkHeader {
            message_type: MessageChunkType::Message,
            is_final: MessageIsFinalType::Final,
            message_size: 123,
            secure_channel_id: 7,
        };
        let mut buf = Vec::new();
        header.encode(&mut buf).unwrap();
        assert_eq!(buf.len(), MESSAGE_CHUNK_HEADER_SIZE);
        let mut cursor = Cursor::new(buf);
        let decoded = MessageChunkHeader::decode(&mut cursor, &DecodingOptions::default()).unwrap();
        assert_eq!(header, decoded);
    }

    #[test]
    fn chunk_round_trip_through_stream() {
        let chunk = MessageChunk::new(
            MessageChunkType::OpenSecureChannel,
            MessageIsFinalType::Final,
            1,
            b"hello body",
        )
        .unwrap();
        let mut cursor = Cursor::new(chunk.data.clone());
        let decoded = MessageChunk::decode(&mut cursor, &DecodingOptions::default()).unwrap();
        assert_eq!(chunk, decoded);
        assert_eq!(decoded.body(), b"hello body");
    }

    #[test]
    fn oversized_message_size_is_rejected() {
        let header = MessageChunkHeader {
            message_type: MessageChunkType::Message,
            is_final: MessageIsFinalType::Final,
            message_size: u32::MAX,
            secure_channel_id: 1,
        };
        let mut buf = Vec::new();
        header.encode(&mut buf).unwrap();
        let mut cursor = Cursor::new(buf);
        assert!(MessageChunkHeader::decode(&mut cursor, &DecodingOptions::default()).is_err());
    }
}
