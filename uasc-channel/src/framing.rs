use std::io::Cursor;

use uasc_types::{
    AcknowledgeMessage, DecodingOptions, Error, EncodingResult, ErrorMessage, ReverseHelloMessage,
    SimpleBinaryDecodable, SimpleBinaryEncodable, StatusCode,
};

use uasc_core::comms::MessageChunk;

/// One complete frame pulled off the wire: either a fixed-shape TCP
/// handshake message (HEL/ACK/ERR/RHE) or a chunk belonging to an
/// OPN/MSG/CLO message.
#[derive(Debug)]
pub enum TcpFrame {
    Hello(uasc_types::HelloMessage),
    Acknowledge(AcknowledgeMessage),
    Error(ErrorMessage),
    ReverseHello(ReverseHelloMessage),
    Chunk(MessageChunk),
}

const HEADER_SIZE: usize = 8;

/// Accumulates raw socket bytes and yields complete [`TcpFrame`]s as soon as
/// enough bytes for one have arrived, mirroring how a framed codec sits
/// between a byte stream and the chunk/message layer above it.
#[derive(Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        FrameDecoder { buffer: Vec::new() }
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Pulls the next complete frame out of the accumulated buffer, if one
    /// has fully arrived. Returns `Ok(None)` when more bytes are needed.
    pub fn next_frame(&mut self, decoding_options: &DecodingOptions) -> EncodingResult<Option<TcpFrame>> {
        if self.buffer.len() < HEADER_SIZE {
            return Ok(None);
        }
        let marker = [self.buffer[0], self.buffer[1], self.buffer[2]];
        let message_size = u32::from_le_bytes([
            self.buffer[4],
            self.buffer[5],
            self.buffer[6],
            self.buffer[7],
        ]) as usize;

        if message_size < HEADER_SIZE || message_size > decoding_options.max_message_size.max(HEADER_SIZE) {
            return Err(Error::new(
                StatusCode::BadTcpMessageTooLarge,
                "frame declares an invalid or oversize message size",
            ));
        }
        if self.buffer.len() < message_size {
            return Ok(None);
        }

        let frame_bytes: Vec<u8> = self.buffer.drain(..message_size).collect();
        let mut body = Cursor::new(&frame_bytes[HEADER_SIZE..]);

        let frame = match &marker {
            b"HEL" => TcpFrame::Hello(uasc_types::HelloMessage::decode(&mut body, decoding_options)?),
            b"ACK" => TcpFrame::Acknowledge(AcknowledgeMessage::decode(&mut body, decoding_options)?),
            b"ERR" => TcpFrame::Error(ErrorMessage::decode(&mut body, decoding_options)?),
            b"RHE" => TcpFrame::ReverseHello(ReverseHelloMessage::decode(&mut body, decoding_options)?),
            b"MSG" | b"OPN" | b"CLO" => {
                let mut cursor = Cursor::new(frame_bytes.as_slice());
                TcpFrame::Chunk(MessageChunk::decode(&mut cursor, decoding_options)?)
            }
            _ => {
                return Err(Error::new(
                    StatusCode::BadTcpMessageTypeInvalid,
                    "unrecognised TCP frame marker",
                ))
            }
        };
        Ok(Some(frame))
    }
}

/// Encodes a fixed-shape handshake message with its 8-byte TCP header:
/// 3-byte ASCII marker, a reserved `F` byte, and the little-endian total
/// message size.
pub fn encode_handshake_frame(marker: &[u8; 3], body: &impl SimpleBinaryEncodable) -> EncodingResult<Vec<u8>> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + body.byte_len());
    buf.extend_from_slice(marker);
    buf.push(b'F');
    buf.extend_from_slice(&0u32.to_le_bytes());
    body.encode(&mut buf)?;
    let total = buf.len() as u32;
    buf[4..8].copy_from_slice(&total.to_le_bytes());
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uasc_types::HelloMessage;

    #[test]
    fn partial_bytes_yield_no_frame_yet() {
        let mut decoder = FrameDecoder::new();
        decoder.push(&[b'H', b'E', b'L', b'F']);
        let options = DecodingOptions::default();
        assert!(decoder.next_frame(&options).unwrap().is_none());
    }

    #[test]
    fn a_complete_hello_frame_round_trips() {
        let hello = HelloMessage::new("opc.tcp://localhost:4840", 8192, 8192, 0, 0);
        let bytes = encode_handshake_frame(b"HEL", &hello).unwrap();

        let mut decoder = FrameDecoder::new();
        decoder.push(&bytes[..4]);
        let options = DecodingOptions::default();
        assert!(decoder.next_frame(&options).unwrap().is_none());

        decoder.push(&bytes[4..]);
        let frame = decoder.next_frame(&options).unwrap().unwrap();
        assert!(matches!(frame, TcpFrame::Hello(h) if h.endpoint_url == hello.endpoint_url));
    }

    #[test]
    fn frames_split_across_many_pushes_still_decode() {
        let hello = HelloMessage::new("opc.tcp://localhost:4840", 8192, 8192, 0, 0);
        let bytes = encode_handshake_frame(b"HEL", &hello).unwrap();
        let mut decoder = FrameDecoder::new();
        for byte in &bytes {
            decoder.push(std::slice::from_ref(byte));
        }
        let options = DecodingOptions::default();
        assert!(decoder.next_frame(&options).unwrap().is_some());
    }
}
