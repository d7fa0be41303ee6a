use std::io::{Read, Write};

use crate::encoding::{DecodingOptions, Error, EncodingResult, SimpleBinaryDecodable, SimpleBinaryEncodable};
use crate::node_id::NodeId;
use crate::service_messages::*;

/// Binary type ids carried as the leading `NodeId` of every OPN/MSG/CLO
/// chunk body, so the receiver can tell which request or response follows
/// without out-of-band knowledge. HEL/ACK/ERR/RHE frames are not prefixed
/// this way: their shape is fixed by the TCP message type alone.
pub mod binary_id {
    pub const OPEN_SECURE_CHANNEL_REQUEST: u32 = 1;
    pub const OPEN_SECURE_CHANNEL_RESPONSE: u32 = 2;
    pub const CLOSE_SECURE_CHANNEL_REQUEST: u32 = 3;
    pub const CLOSE_SECURE_CHANNEL_RESPONSE: u32 = 4;
    pub const CREATE_SESSION_REQUEST: u32 = 5;
    pub const CREATE_SESSION_RESPONSE: u32 = 6;
    pub const ACTIVATE_SESSION_REQUEST: u32 = 7;
    pub const ACTIVATE_SESSION_RESPONSE: u32 = 8;
    pub const CLOSE_SESSION_REQUEST: u32 = 9;
    pub const CLOSE_SESSION_RESPONSE: u32 = 10;
    pub const GET_ENDPOINTS_REQUEST: u32 = 11;
    pub const GET_ENDPOINTS_RESPONSE: u32 = 12;
    pub const SERVICE_FAULT: u32 = 13;
}

/// A message that can appear as the body of an OPN/MSG/CLO chunk,
/// identified on the wire by a leading numeric `NodeId`.
pub trait Message: SimpleBinaryEncodable {
    fn type_id(&self) -> NodeId;
}

/// A [`Message`] enum (request or response side) that can be reconstructed
/// from the leading `NodeId` carried on an OPN/MSG/CLO chunk body.
pub trait DecodableMessage: Message + Sized {
    fn decode_by_object_id<S: Read + ?Sized>(
        node_id: &NodeId,
        stream: &mut S,
        decoding_options: &DecodingOptions,
    ) -> EncodingResult<Self>;
}

macro_rules! request_response_enum {
    ($enum_name:ident { $($variant:ident($ty:ty) = $id:path),* $(,)? }) => {
        #[derive(Debug, Clone, PartialEq)]
        pub enum $enum_name {
            $($variant($ty),)*
        }

        impl SimpleBinaryEncodable for $enum_name {
            fn byte_len(&self) -> usize {
                match self {
                    $($enum_name::$variant(m) => m.byte_len(),)*
                }
            }

            fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<usize> {
                match self {
                    $($enum_name::$variant(m) => m.encode(stream),)*
                }
            }
        }

        impl crate::encoding::UaNullable for $enum_name {}

        impl Message for $enum_name {
            fn type_id(&self) -> NodeId {
                match self {
                    $($enum_name::$variant(_) => NodeId::new(0, $id),)*
                }
            }
        }

        $(
            impl From<$ty> for $enum_name {
                fn from(m: $ty) -> Self {
                    $enum_name::$variant(m)
                }
            }
        )*

        impl $enum_name {
            pub fn decode_by_object_id<S: Read + ?Sized>(
                node_id: &NodeId,
                stream: &mut S,
                decoding_options: &DecodingOptions,
            ) -> EncodingResult<Self> {
                <Self as DecodableMessage>::decode_by_object_id(node_id, stream, decoding_options)
            }
        }

        impl DecodableMessage for $enum_name {
            fn decode_by_object_id<S: Read + ?Sized>(
                node_id: &NodeId,
                stream: &mut S,
                decoding_options: &DecodingOptions,
            ) -> EncodingResult<Self> {
                let crate::node_id::Identifier::Numeric(id) = &node_id.identifier else {
                    return Err(Error::decoding(format!(
                        "non-numeric message type id {node_id}"
                    )));
                };
                Ok(match *id {
                    $($id => $enum_name::$variant(<$ty>::decode(stream, decoding_options)?),)*
                    other => {
                        return Err(Error::decoding(format!(
                            "unrecognised message type id {other}"
                        )))
                    }
                })
            }
        }
    };
}

request_response_enum!(RequestMessage {
    OpenSecureChannel(OpenSecureChannelRequest) = binary_id::OPEN_SECURE_CHANNEL_REQUEST,
    CloseSecureChannel(CloseSecureChannelRequest) = binary_id::CLOSE_SECURE_CHANNEL_REQUEST,
    CreateSession(CreateSessionRequest) = binary_id::CREATE_SESSION_REQUEST,
    ActivateSession(ActivateSessionRequest) = binary_id::ACTIVATE_SESSION_REQUEST,
    CloseSession(CloseSessionRequest) = binary_id::CLOSE_SESSION_REQUEST,
    GetEndpoints(GetEndpointsRequest) = binary_id::GET_ENDPOINTS_REQUEST,
});

request_response_enum!(ResponseMessage {
    OpenSecureChannel(OpenSecureChannelResponse) = binary_id::OPEN_SECURE_CHANNEL_RESPONSE,
    CloseSecureChannel(CloseSecureChannelResponse) = binary_id::CLOSE_SECURE_CHANNEL_RESPONSE,
    CreateSession(CreateSessionResponse) = binary_id::CREATE_SESSION_RESPONSE,
    ActivateSession(ActivateSessionResponse) = binary_id::ACTIVATE_SESSION_RESPONSE,
    CloseSession(CloseSessionResponse) = binary_id::CLOSE_SESSION_RESPONSE,
    GetEndpoints(GetEndpointsResponse) = binary_id::GET_ENDPOINTS_RESPONSE,
    Fault(ServiceFault) = binary_id::SERVICE_FAULT,
});

impl ResponseMessage {
    pub fn request_handle(&self) -> u32 {
        match self {
            ResponseMessage::OpenSecureChannel(m) => m.response_header.request_handle,
            ResponseMessage::CloseSecureChannel(m) => m.response_header.request_handle,
            ResponseMessage::CreateSession(m) => m.response_header.request_handle,
            ResponseMessage::ActivateSession(m) => m.response_header.request_handle,
            ResponseMessage::CloseSession(m) => m.response_header.request_handle,
            ResponseMessage::GetEndpoints(m) => m.response_header.request_handle,
            ResponseMessage::Fault(m) => m.response_header.request_handle,
        }
    }
}

impl RequestMessage {
    pub fn request_handle(&self) -> u32 {
        match self {
            RequestMessage::OpenSecureChannel(m) => m.request_header.request_handle,
            RequestMessage::CloseSecureChannel(m) => m.request_header.request_handle,
            RequestMessage::CreateSession(m) => m.request_header.request_handle,
            RequestMessage::ActivateSession(m) => m.request_header.request_handle,
            RequestMessage::CloseSession(m) => m.request_header.request_handle,
            RequestMessage::GetEndpoints(m) => m.request_header.request_handle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic_types::UtcTime;
    use crate::request_header::RequestHeader;

    #[test]
    fn request_message_round_trip_by_object_id() {
        let req = RequestMessage::from(CloseSecureChannelRequest {
            request_header: RequestHeader::new(NodeId::null(), UtcTime::now(), 5),
        });
        let mut buf = Vec::new();
        let type_id = req.type_id();
        req.encode(&mut buf).unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let decoded = RequestMessage::decode_by_object_id(
            &type_id,
            &mut cursor,
            &DecodingOptions::default(),
        )
        .unwrap();
        assert_eq!(req, decoded);
    }

    #[test]
    fn unknown_type_id_is_rejected() {
        let mut buf = Vec::new();
        let opts = DecodingOptions::default();
        let bogus = NodeId::new(0, 9999u32);
        let result = RequestMessage::decode_by_object_id(&bogus, &mut std::io::Cursor::new(&mut buf), &opts);
        assert!(result.is_err());
    }
}
