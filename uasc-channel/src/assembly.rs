use uasc_core::comms::{MessageChunk, MessageChunkType, MessageIsFinalType};
use uasc_types::{Error, EncodingResult, StatusCode};

/// Accumulates the chunks of one in-flight inbound message, keyed by
/// `request_id`, until an `F` or `A` chunk closes it. Created on the first
/// `C` chunk for a request-id, destroyed when the message completes, aborts,
/// or the owning channel tears down.
pub struct MessageAssembly {
    request_id: u32,
    message_type: MessageChunkType,
    chunks: Vec<MessageChunk>,
    accumulated_size: usize,
}

/// What happened after feeding one chunk into an assembly.
pub enum AssemblyOutcome {
    /// More chunks are still expected.
    Pending,
    /// The message is complete; its chunks are ready for `Chunker::decode`.
    Complete(Vec<MessageChunk>),
    /// An abort chunk closed the request without completing it. The
    /// embedded status is what the sender reported as the failure reason.
    Aborted(StatusCode),
}

impl MessageAssembly {
    fn new(request_id: u32, message_type: MessageChunkType) -> Self {
        MessageAssembly {
            request_id,
            message_type,
            chunks: Vec::new(),
            accumulated_size: 0,
        }
    }

    pub fn request_id(&self) -> u32 {
        self.request_id
    }

    /// Feeds one chunk into the open assembly for `request_id` (or starts a
    /// new one if `current` is `None`). `max_chunks`/`max_message_size` of
    /// zero disable the corresponding check.
    pub fn accept(
        current: &mut Option<MessageAssembly>,
        chunk: MessageChunk,
        request_id: u32,
        max_chunks: usize,
        max_message_size: usize,
    ) -> EncodingResult<AssemblyOutcome> {
        let header = chunk.message_header(&uasc_types::DecodingOptions::default())?;

        if let Some(assembly) = current {
            if assembly.request_id != request_id {
                *current = None;
                return Err(Error::new(
                    StatusCode::BadSequenceNumberInvalid,
                    "received a chunk for a different request-id while an assembly is open",
                ));
            }
        } else {
            *current = Some(MessageAssembly::new(request_id, header.message_type));
        }

        let assembly = current.as_mut().unwrap();

        match header.is_final {
            MessageIsFinalType::FinalError => {
                let reason = Self::decode_abort_reason(&chunk);
                *current = None;
                Ok(AssemblyOutcome::Aborted(reason))
            }
            MessageIsFinalType::Intermediate | MessageIsFinalType::Final => {
                assembly.accumulated_size += chunk.body().len();
                assembly.chunks.push(chunk);

                if max_chunks != 0 && assembly.chunks.len() > max_chunks {
                    *current = None;
                    return Err(Error::new(
                        StatusCode::BadTcpMessageTooLarge,
                        "message exceeds the configured maximum chunk count",
                    ));
                }
                if max_message_size != 0 && assembly.accumulated_size > max_message_size {
                    *current = None;
                    return Err(Error::new(
                        StatusCode::BadTcpMessageTooLarge,
                        "assembled message exceeds the configured maximum size",
                    ));
                }

                if header.is_final == MessageIsFinalType::Final {
                    let chunks = std::mem::take(&mut assembly.chunks);
                    *current = None;
                    Ok(AssemblyOutcome::Complete(chunks))
                } else {
                    Ok(AssemblyOutcome::Pending)
                }
            }
        }
    }

    /// `A` chunk bodies carry the security header and sequence header (same
    /// as any other chunk) followed by `StatusCode + Reason:String`, written
    /// in the clear past those headers (abort chunks are never encrypted).
    fn decode_abort_reason(chunk: &MessageChunk) -> StatusCode {
        use std::io::Cursor;
        use uasc_core::comms::{SecurityHeader, SequenceHeader};
        use uasc_types::SimpleBinaryDecodable;

        let decoding_options = uasc_types::DecodingOptions::default();
        let Ok(header) = chunk.message_header(&decoding_options) else {
            return StatusCode::BadUnexpectedError;
        };
        let mut cursor = Cursor::new(chunk.body());
        let is_open_secure_channel = header.message_type.is_open_secure_channel();
        if SecurityHeader::decode_from_stream(&mut cursor, is_open_secure_channel, &decoding_options).is_err() {
            return StatusCode::BadUnexpectedError;
        }
        if SequenceHeader::decode(&mut cursor, &decoding_options).is_err() {
            return StatusCode::BadUnexpectedError;
        }
        StatusCode::decode(&mut cursor, &decoding_options).unwrap_or(StatusCode::BadUnexpectedError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uasc_types::{write_u32, SimpleBinaryEncodable};

    fn data_chunk(is_final: MessageIsFinalType, secure_channel_id: u32, body: &[u8]) -> MessageChunk {
        MessageChunk::new(MessageChunkType::Message, is_final, secure_channel_id, body).unwrap()
    }

    #[test]
    fn single_final_chunk_completes_immediately() {
        let mut current = None;
        let chunk = data_chunk(MessageIsFinalType::Final, 1, b"payload");
        let outcome = MessageAssembly::accept(&mut current, chunk, 7, 0, 0).unwrap();
        assert!(matches!(outcome, AssemblyOutcome::Complete(c) if c.len() == 1));
        assert!(current.is_none());
    }

    #[test]
    fn intermediate_then_final_completes_with_two_chunks() {
        let mut current = None;
        let first = data_chunk(MessageIsFinalType::Intermediate, 1, b"abcd");
        let outcome = MessageAssembly::accept(&mut current, first, 9, 0, 0).unwrap();
        assert!(matches!(outcome, AssemblyOutcome::Pending));

        let second = data_chunk(MessageIsFinalType::Final, 1, b"efgh");
        let outcome = MessageAssembly::accept(&mut current, second, 9, 0, 0).unwrap();
        assert!(matches!(outcome, AssemblyOutcome::Complete(c) if c.len() == 2));
    }

    #[test]
    fn exceeding_max_chunks_aborts_the_assembly() {
        let mut current = None;
        let first = data_chunk(MessageIsFinalType::Intermediate, 1, b"a");
        MessageAssembly::accept(&mut current, first, 1, 1, 0).unwrap();
        let second = data_chunk(MessageIsFinalType::Intermediate, 1, b"b");
        let result = MessageAssembly::accept(&mut current, second, 1, 1, 0);
        assert!(result.is_err());
        assert!(current.is_none());
    }

    #[test]
    fn abort_chunk_yields_status_and_clears_assembly() {
        use uasc_core::comms::SymmetricSecurityHeader;

        let mut current = None;
        let mut body = Vec::new();
        SymmetricSecurityHeader { token_id: 1 }.encode(&mut body).unwrap();
        write_u32(&mut body, 5).unwrap(); // sequence number
        write_u32(&mut body, 5).unwrap(); // request id
        write_u32(&mut body, StatusCode::BadTcpMessageTooLarge.bits()).unwrap();
        uasc_types::UAString::null().encode(&mut body).unwrap();
        let chunk = data_chunk(MessageIsFinalType::FinalError, 1, &body);
        let outcome = MessageAssembly::accept(&mut current, chunk, 5, 0, 0).unwrap();
        assert!(matches!(outcome, AssemblyOutcome::Aborted(s) if s == StatusCode::BadTcpMessageTooLarge));
        assert!(current.is_none());
    }

    #[test]
    fn mismatched_request_id_is_rejected() {
        let mut current = None;
        let first = data_chunk(MessageIsFinalType::Intermediate, 1, b"a");
        MessageAssembly::accept(&mut current, first, 1, 0, 0).unwrap();
        let second = data_chunk(MessageIsFinalType::Final, 1, b"b");
        let result = MessageAssembly::accept(&mut current, second, 2, 0, 0);
        assert!(result.is_err());
    }
}
