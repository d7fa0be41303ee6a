use std::io::Cursor;

use uasc_types::{
    write_u32, DecodableMessage, DecodingOptions, Error, EncodingResult, Message, NodeId,
    SimpleBinaryDecodable, SimpleBinaryEncodable, StatusCode, UAString,
};

use crate::comms::message_chunk::{MessageChunk, MessageChunkType, MessageIsFinalType};
use crate::comms::secure_channel::SecureChannel;
use crate::comms::security_header::{SecurityHeader, SequenceHeader};

/// Reassembles and re-splits messages across one or more [`MessageChunk`]s,
/// applying (or removing) the security the channel's current mode and
/// policy call for. Holds no state of its own; every call takes the
/// channel whose keys and token it should use.
pub struct Chunker;

impl Chunker {
    /// Confirms a set of chunks about to be reassembled all belong to the
    /// same message: same secure channel id, the same `request_id` for
    /// every chunk, and strictly incrementing sequence numbers starting
    /// from `starting_sequence_number` (0 disables the starting check, used
    /// before the first real sequence number is known).
    pub fn validate_chunks(
        starting_sequence_number: u32,
        secure_channel: &SecureChannel,
        chunks: &[MessageChunk],
    ) -> EncodingResult<()> {
        let decoding_options = secure_channel.decoding_options().clone();
        let mut expected_sequence_number = starting_sequence_number;
        let mut request_id = None;

        for (i, chunk) in chunks.iter().enumerate() {
            let header = chunk.message_header(&decoding_options)?;
            if header.secure_channel_id != secure_channel.secure_channel_id()
                && secure_channel.secure_channel_id() != 0
            {
                return Err(Error::new(
                    StatusCode::BadTcpSecureChannelUnknown,
                    "chunk's secure channel id does not match this channel",
                ));
            }

            let mut cursor = Cursor::new(chunk.body());
            let is_open_secure_channel = header.message_type.is_open_secure_channel();
            let _ = SecurityHeader::decode_from_stream(&mut cursor, is_open_secure_channel, &decoding_options)?;
            let sequence_header = SequenceHeader::decode_from_cursor(&mut cursor, &decoding_options)?;

            if i == 0 {
                if starting_sequence_number != 0 && sequence_header.sequence_number != starting_sequence_number {
                    return Err(Error::new(
                        StatusCode::BadSequenceNumberInvalid,
                        "first chunk's sequence number does not match the expected starting value",
                    ));
                }
                expected_sequence_number = sequence_header.sequence_number;
                request_id = Some(sequence_header.request_id);
            } else {
                if sequence_header.sequence_number != expected_sequence_number + 1 {
                    return Err(Error::new(
                        StatusCode::BadSequenceNumberInvalid,
                        "chunk sequence numbers are not strictly incrementing",
                    ));
                }
                expected_sequence_number = sequence_header.sequence_number;
                if Some(sequence_header.request_id) != request_id {
                    return Err(Error::new(
                        StatusCode::BadSequenceNumberInvalid,
                        "chunks of the same message carry different request ids",
                    ));
                }
            }
        }
        Ok(())
    }

    /// Encodes `message` as one or more chunks no larger than
    /// `max_chunk_size`, securing each with `secure_channel`. Errors with
    /// `BadRequestTooLarge`/`BadResponseTooLarge` if the whole message
    /// exceeds `max_message_size` even after splitting.
    #[allow(clippy::too_many_arguments)]
    pub fn encode(
        sequence_number: u32,
        request_id: u32,
        max_message_size: usize,
        max_chunk_size: usize,
        message_type: MessageChunkType,
        secure_channel: &SecureChannel,
        message: &impl Message,
        oversize_status: StatusCode,
    ) -> EncodingResult<Vec<MessageChunk>> {
        let body_bytes = {
            let mut buf = Vec::with_capacity(message.byte_len() + 4);
            let type_id = message.type_id();
            type_id.encode(&mut buf)?;
            message.encode(&mut buf)?;
            buf
        };

        if max_message_size != 0 && body_bytes.len() > max_message_size {
            return Err(Error::new(
                oversize_status,
                format!(
                    "encoded message is {} bytes, over the {} byte limit",
                    body_bytes.len(),
                    max_message_size
                ),
            ));
        }

        let security_header = secure_channel.make_security_header(message_type);
        let fixed_overhead = crate::comms::message_chunk::MESSAGE_CHUNK_HEADER_SIZE
            + security_header.byte_len()
            + 8 /* sequence header */
            + secure_channel.minimum_padding();
        let signature_size = secure_channel.signature_size(&security_header);
        let usable_per_chunk = max_chunk_size.saturating_sub(fixed_overhead + signature_size).max(1);

        let mut chunks = Vec::new();
        let mut offset = 0;
        let mut seq = sequence_number;
        while offset < body_bytes.len() || chunks.is_empty() {
            let end = (offset + usable_per_chunk).min(body_bytes.len());
            let is_last = end == body_bytes.len();
            let is_final = if is_last {
                MessageIsFinalType::Final
            } else {
                MessageIsFinalType::Intermediate
            };

            let mut plain = Vec::new();
            security_header.encode(&mut plain)?;
            let sequence_header = SequenceHeader { sequence_number: seq, request_id };
            sequence_header.encode(&mut plain)?;
            plain.extend_from_slice(&body_bytes[offset..end]);

            let secured = secure_channel.apply_security(message_type, &plain)?;
            chunks.push(MessageChunk::new(
                message_type,
                is_final,
                secure_channel.secure_channel_id(),
                &secured,
            )?);

            offset = end;
            seq += 1;
        }
        Ok(chunks)
    }

    /// Builds a single `A` (abort) chunk carrying `status` and an empty
    /// reason string. Abort chunks are sent in the clear past the security
    /// and sequence headers, never encrypted or signed, matching HEL/ACK/ERR.
    pub fn encode_abort(
        sequence_number: u32,
        request_id: u32,
        message_type: MessageChunkType,
        secure_channel: &SecureChannel,
        status: StatusCode,
    ) -> EncodingResult<MessageChunk> {
        let security_header = secure_channel.make_security_header(message_type);
        let mut plain = Vec::new();
        security_header.encode(&mut plain)?;
        let sequence_header = SequenceHeader { sequence_number, request_id };
        sequence_header.encode(&mut plain)?;
        write_u32(&mut plain, status.bits())?;
        UAString::null().encode(&mut plain)?;

        MessageChunk::new(
            message_type,
            MessageIsFinalType::FinalError,
            secure_channel.secure_channel_id(),
            &plain,
        )
    }

    /// Reassembles a validated chunk set into one message of type `T`,
    /// removing security from each chunk's body before concatenating.
    pub fn decode<T: DecodableMessage>(
        chunks: &[MessageChunk],
        secure_channel: &mut SecureChannel,
    ) -> EncodingResult<T> {
        if chunks.is_empty() {
            return Err(Error::new(StatusCode::BadDecodingError, "no chunks to decode"));
        }
        let decoding_options = secure_channel.decoding_options().clone();
        let mut plaintext = Vec::new();

        for chunk in chunks {
            let header = chunk.message_header(&decoding_options)?;
            let mut cursor = Cursor::new(chunk.body());
            let is_open_secure_channel = header.message_type.is_open_secure_channel();
            let _ = SecurityHeader::decode_from_stream(&mut cursor, is_open_secure_channel, &decoding_options)?;
            let _ = SequenceHeader::decode_from_cursor(&mut cursor, &decoding_options)?;
            let secured_body = &chunk.body()[cursor.position() as usize..];
            let restored = secure_channel.verify_and_remove_security(header.message_type, secured_body)?;
            plaintext.extend_from_slice(&restored);
        }

        let mut cursor = Cursor::new(plaintext);
        let node_id = NodeId::decode(&mut cursor, &decoding_options)?;
        T::decode_by_object_id(&node_id, &mut cursor, &decoding_options)
    }
}

trait SequenceHeaderDecodeExt {
    fn decode_from_cursor(
        cursor: &mut Cursor<&[u8]>,
        decoding_options: &DecodingOptions,
    ) -> EncodingResult<SequenceHeader>;
}

impl SequenceHeaderDecodeExt for SequenceHeader {
    fn decode_from_cursor(
        cursor: &mut Cursor<&[u8]>,
        decoding_options: &DecodingOptions,
    ) -> EncodingResult<SequenceHeader> {
        <SequenceHeader as uasc_types::SimpleBinaryDecodable>::decode(cursor, decoding_options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use uasc_crypto::MemoryCertificateStore;
    use uasc_types::{CloseSecureChannelRequest, RequestHeader, RequestMessage};

    fn new_channel() -> SecureChannel {
        let mut channel = SecureChannel::new(
            Arc::new(MemoryCertificateStore::new()),
            crate::comms::secure_channel::Role::Client,
            DecodingOptions::default(),
        );
        channel.set_secure_channel_id(42);
        channel
    }

    #[test]
    fn encode_then_decode_round_trips_a_small_message() {
        let channel = new_channel();
        let request = RequestMessage::CloseSecureChannel(CloseSecureChannelRequest {
            request_header: RequestHeader::dummy(),
        });
        let chunks = Chunker::encode(
            1,
            10,
            0,
            8192,
            MessageChunkType::CloseSecureChannel,
            &channel,
            &request,
            StatusCode::BadRequestTooLarge,
        )
        .unwrap();
        assert_eq!(chunks.len(), 1);

        Chunker::validate_chunks(1, &channel, &chunks).unwrap();

        let mut channel = channel;
        let decoded: RequestMessage = Chunker::decode(&chunks, &mut channel).unwrap();
        match decoded {
            RequestMessage::CloseSecureChannel(_) => {}
            other => panic!("unexpected message decoded: {other:?}"),
        }
    }

    #[test]
    fn validate_chunks_rejects_non_contiguous_sequence_numbers() {
        let channel = new_channel();
        let request = RequestMessage::CloseSecureChannel(CloseSecureChannelRequest {
            request_header: RequestHeader::dummy(),
        });
        let mut chunks = Chunker::encode(
            1,
            10,
            0,
            8192,
            MessageChunkType::CloseSecureChannel,
            &channel,
            &request,
            StatusCode::BadRequestTooLarge,
        )
        .unwrap();
        let more = Chunker::encode(
            5,
            10,
            0,
            8192,
            MessageChunkType::CloseSecureChannel,
            &channel,
            &request,
            StatusCode::BadRequestTooLarge,
        )
        .unwrap();
        chunks.extend(more);
        assert!(Chunker::validate_chunks(1, &channel, &chunks).is_err());
    }

    #[test]
    fn oversized_message_is_rejected_before_chunking() {
        let channel = new_channel();
        let request = RequestMessage::CloseSecureChannel(CloseSecureChannelRequest {
            request_header: RequestHeader::dummy(),
        });
        let result = Chunker::encode(
            1,
            10,
            4,
            8192,
            MessageChunkType::CloseSecureChannel,
            &channel,
            &request,
            StatusCode::BadRequestTooLarge,
        );
        assert!(result.is_err());
    }
}
