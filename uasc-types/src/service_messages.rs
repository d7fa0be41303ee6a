use std::io::{Read, Write};

use crate::basic_types::UtcTime;
use crate::byte_string::ByteString;
use crate::encoding::{
    read_u32, write_u32, DecodingOptions, Error, EncodingResult, SimpleBinaryDecodable,
    SimpleBinaryEncodable, UaNullable,
};
use crate::extension_object::ExtensionObject;
use crate::node_id::NodeId;
use crate::qualified_name::LocalizedText;
use crate::request_header::RequestHeader;
use crate::response_header::ResponseHeader;
use crate::status_code::StatusCode;
use crate::string::UAString;

/// Declares a plain field-by-field binary message: byte_len/encode/decode
/// are each the sum/sequence over the declared fields, in order. Used for
/// every service request/response in this module; anything with a more
/// irregular layout (bitmasked presence, enum discriminants) is written out
/// by hand instead of reaching for this macro.
macro_rules! simple_message {
    ($(#[$meta:meta])* $name:ident { $($field:ident: $ty:ty),* $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq)]
        pub struct $name {
            $(pub $field: $ty,)*
        }

        impl UaNullable for $name {}

        impl SimpleBinaryEncodable for $name {
            fn byte_len(&self) -> usize {
                0 $(+ self.$field.byte_len())*
            }

            fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<usize> {
                let mut size = 0;
                $(size += self.$field.encode(stream)?;)*
                Ok(size)
            }
        }

        impl SimpleBinaryDecodable for $name {
            fn decode<S: Read + ?Sized>(
                stream: &mut S,
                decoding_options: &DecodingOptions,
            ) -> EncodingResult<Self> {
                Ok($name {
                    $($field: SimpleBinaryDecodable::decode(stream, decoding_options)?,)*
                })
            }
        }
    };
}

// ---------------------------------------------------------------------
// TCP handshake messages (HEL / ACK / ERR / RHE)
// ---------------------------------------------------------------------

simple_message!(
    /// Sent by the client immediately after connecting, proposing protocol
    /// version and buffer sizes.
    HelloMessage {
        protocol_version: u32,
        receive_buffer_size: u32,
        send_buffer_size: u32,
        max_message_size: u32,
        max_chunk_count: u32,
        endpoint_url: UAString,
    }
);

impl HelloMessage {
    pub fn new(
        endpoint_url: &str,
        receive_buffer_size: u32,
        send_buffer_size: u32,
        max_message_size: u32,
        max_chunk_count: u32,
    ) -> Self {
        HelloMessage {
            protocol_version: 0,
            receive_buffer_size,
            send_buffer_size,
            max_message_size,
            max_chunk_count,
            endpoint_url: UAString::from(endpoint_url),
        }
    }
}

simple_message!(
    /// Sent by the server in reply to HELLO, settling on the final buffer
    /// sizes for the connection (the minimum of each side's proposal).
    AcknowledgeMessage {
        protocol_version: u32,
        receive_buffer_size: u32,
        send_buffer_size: u32,
        max_message_size: u32,
        max_chunk_count: u32,
    }
);

impl AcknowledgeMessage {
    pub fn new(
        protocol_version: u32,
        receive_buffer_size: u32,
        send_buffer_size: u32,
        max_message_size: u32,
        max_chunk_count: u32,
    ) -> Self {
        AcknowledgeMessage {
            protocol_version,
            receive_buffer_size,
            send_buffer_size,
            max_message_size,
            max_chunk_count,
        }
    }
}

simple_message!(
    /// Sent by either side to report a fatal, connection-terminating
    /// error, in place of a normal response.
    ErrorMessage {
        error: StatusCode,
        reason: UAString,
    }
);

impl ErrorMessage {
    pub fn from_status_code(status: StatusCode) -> Self {
        ErrorMessage {
            error: status,
            reason: UAString::from(status.name()),
        }
    }
}

simple_message!(
    /// Sent by a server configured for the reverse-connect pattern to
    /// initiate a connection toward a waiting client.
    ReverseHelloMessage {
        server_uri: UAString,
        endpoint_url: UAString,
    }
);

// ---------------------------------------------------------------------
// Secure channel enums
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MessageSecurityMode {
    Invalid = 0,
    #[default]
    None = 1,
    Sign = 2,
    SignAndEncrypt = 3,
}

impl UaNullable for MessageSecurityMode {}

impl SimpleBinaryEncodable for MessageSecurityMode {
    fn byte_len(&self) -> usize {
        4
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<usize> {
        write_u32(stream, *self as u32)
    }
}

impl SimpleBinaryDecodable for MessageSecurityMode {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        _decoding_options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        Ok(match read_u32(stream)? {
            1 => MessageSecurityMode::None,
            2 => MessageSecurityMode::Sign,
            3 => MessageSecurityMode::SignAndEncrypt,
            _ => MessageSecurityMode::Invalid,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SecurityTokenRequestType {
    #[default]
    Issue = 0,
    Renew = 1,
}

impl UaNullable for SecurityTokenRequestType {}

impl SimpleBinaryEncodable for SecurityTokenRequestType {
    fn byte_len(&self) -> usize {
        4
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<usize> {
        write_u32(stream, *self as u32)
    }
}

impl SimpleBinaryDecodable for SecurityTokenRequestType {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        _decoding_options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        Ok(match read_u32(stream)? {
            0 => SecurityTokenRequestType::Issue,
            1 => SecurityTokenRequestType::Renew,
            other => {
                return Err(Error::decoding(format!(
                    "unrecognised SecurityTokenRequestType {other}"
                )))
            }
        })
    }
}

simple_message!(
    /// Describes the lifetime of one generation of derived channel keys.
    ChannelSecurityToken {
        channel_id: u32,
        token_id: u32,
        created_at: UtcTime,
        revised_lifetime: u32,
    }
);

// ---------------------------------------------------------------------
// OpenSecureChannel / CloseSecureChannel
// ---------------------------------------------------------------------

simple_message!(
    OpenSecureChannelRequest {
        request_header: RequestHeader,
        client_protocol_version: u32,
        request_type: SecurityTokenRequestType,
        security_mode: MessageSecurityMode,
        client_nonce: ByteString,
        requested_lifetime: u32,
    }
);

simple_message!(
    OpenSecureChannelResponse {
        response_header: ResponseHeader,
        server_protocol_version: u32,
        security_token: ChannelSecurityToken,
        server_nonce: ByteString,
    }
);

simple_message!(
    CloseSecureChannelRequest {
        request_header: RequestHeader,
    }
);

simple_message!(
    CloseSecureChannelResponse {
        response_header: ResponseHeader,
    }
);

// ---------------------------------------------------------------------
// Session lifecycle
// ---------------------------------------------------------------------

simple_message!(
    ApplicationDescription {
        application_uri: UAString,
        product_uri: UAString,
        application_name: LocalizedText,
        application_type: u32,
        gateway_server_uri: UAString,
        discovery_profile_uri: UAString,
        discovery_urls: Option<Vec<UAString>>,
    }
);

simple_message!(
    CreateSessionRequest {
        request_header: RequestHeader,
        client_description: ApplicationDescription,
        server_uri: UAString,
        endpoint_url: UAString,
        session_name: UAString,
        client_nonce: ByteString,
        client_certificate: ByteString,
        requested_session_timeout: f64,
        max_response_message_size: u32,
    }
);

simple_message!(
    CreateSessionResponse {
        response_header: ResponseHeader,
        session_id: NodeId,
        authentication_token: NodeId,
        revised_session_timeout: f64,
        server_nonce: ByteString,
        server_certificate: ByteString,
        server_signature_signature: ByteString,
        server_signature_algorithm: UAString,
        max_request_message_size: u32,
    }
);

/// The three identity token shapes this core round-trips without
/// interpreting credentials: anonymous (no secret), username/password
/// (opaque, policy-encrypted password bytes), and X509 (certificate-only).
/// All three share the wire shape "policy id + opaque payload", carried as
/// an [`ExtensionObject`] with a byte-string body by the real protocol;
/// this core exposes the decoded payload directly since it never needs to
/// re-encode it into a generic extension object for forwarding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdentityToken {
    Anonymous { policy_id: UAString },
    UserName {
        policy_id: UAString,
        user_name: UAString,
        password: ByteString,
        encryption_algorithm: UAString,
    },
    X509 {
        policy_id: UAString,
        certificate_data: ByteString,
    },
}

impl Default for IdentityToken {
    fn default() -> Self {
        IdentityToken::Anonymous {
            policy_id: UAString::null(),
        }
    }
}

impl UaNullable for IdentityToken {}

const IDENTITY_ANONYMOUS: u8 = 0;
const IDENTITY_USER_NAME: u8 = 1;
const IDENTITY_X509: u8 = 2;

impl SimpleBinaryEncodable for IdentityToken {
    fn byte_len(&self) -> usize {
        1 + match self {
            IdentityToken::Anonymous { policy_id } => policy_id.byte_len(),
            IdentityToken::UserName {
                policy_id,
                user_name,
                password,
                encryption_algorithm,
            } => {
                policy_id.byte_len()
                    + user_name.byte_len()
                    + password.byte_len()
                    + encryption_algorithm.byte_len()
            }
            IdentityToken::X509 {
                policy_id,
                certificate_data,
            } => policy_id.byte_len() + certificate_data.byte_len(),
        }
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<usize> {
        let mut size = 0;
        match self {
            IdentityToken::Anonymous { policy_id } => {
                size += crate::encoding::write_u8(stream, IDENTITY_ANONYMOUS)?;
                size += policy_id.encode(stream)?;
            }
            IdentityToken::UserName {
                policy_id,
                user_name,
                password,
                encryption_algorithm,
            } => {
                size += crate::encoding::write_u8(stream, IDENTITY_USER_NAME)?;
                size += policy_id.encode(stream)?;
                size += user_name.encode(stream)?;
                size += password.encode(stream)?;
                size += encryption_algorithm.encode(stream)?;
            }
            IdentityToken::X509 {
                policy_id,
                certificate_data,
            } => {
                size += crate::encoding::write_u8(stream, IDENTITY_X509)?;
                size += policy_id.encode(stream)?;
                size += certificate_data.encode(stream)?;
            }
        }
        Ok(size)
    }
}

impl SimpleBinaryDecodable for IdentityToken {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        decoding_options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        let tag = crate::encoding::read_u8(stream)?;
        Ok(match tag {
            IDENTITY_ANONYMOUS => IdentityToken::Anonymous {
                policy_id: UAString::decode(stream, decoding_options)?,
            },
            IDENTITY_USER_NAME => IdentityToken::UserName {
                policy_id: UAString::decode(stream, decoding_options)?,
                user_name: UAString::decode(stream, decoding_options)?,
                password: ByteString::decode(stream, decoding_options)?,
                encryption_algorithm: UAString::decode(stream, decoding_options)?,
            },
            IDENTITY_X509 => IdentityToken::X509 {
                policy_id: UAString::decode(stream, decoding_options)?,
                certificate_data: ByteString::decode(stream, decoding_options)?,
            },
            other => {
                return Err(Error::decoding(format!(
                    "unrecognised identity token tag {other}"
                )))
            }
        })
    }
}

simple_message!(
    SignatureData {
        algorithm: UAString,
        signature: ByteString,
    }
);

simple_message!(
    ActivateSessionRequest {
        request_header: RequestHeader,
        client_signature: SignatureData,
        client_software_certificates: Option<Vec<ByteString>>,
        locale_ids: Option<Vec<UAString>>,
        user_identity_token: IdentityToken,
        user_token_signature: SignatureData,
    }
);

simple_message!(
    ActivateSessionResponse {
        response_header: ResponseHeader,
        server_nonce: ByteString,
        results: Option<Vec<StatusCode>>,
    }
);

simple_message!(
    CloseSessionRequest {
        request_header: RequestHeader,
        delete_subscriptions: bool,
    }
);

simple_message!(
    CloseSessionResponse {
        response_header: ResponseHeader,
    }
);

// ---------------------------------------------------------------------
// GetEndpoints (the one application service this core implements)
// ---------------------------------------------------------------------

simple_message!(
    UserTokenPolicy {
        policy_id: UAString,
        token_type: u32,
        issued_token_type: UAString,
        issuer_endpoint_url: UAString,
        security_policy_uri: UAString,
    }
);

simple_message!(
    EndpointDescription {
        endpoint_url: UAString,
        server: ApplicationDescription,
        server_certificate: ByteString,
        security_mode: MessageSecurityMode,
        security_policy_uri: UAString,
        user_identity_tokens: Option<Vec<UserTokenPolicy>>,
        transport_profile_uri: UAString,
        security_level: u8,
    }
);

simple_message!(
    GetEndpointsRequest {
        request_header: RequestHeader,
        endpoint_url: UAString,
        locale_ids: Option<Vec<UAString>>,
        profile_uris: Option<Vec<UAString>>,
    }
);

simple_message!(
    GetEndpointsResponse {
        response_header: ResponseHeader,
        endpoints: Option<Vec<EndpointDescription>>,
    }
);

simple_message!(
    /// Also used stand-alone as the body of an abort/service-fault
    /// notification, per `ServiceFault` in the base protocol.
    ServiceFault {
        response_header: ResponseHeader,
    }
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_round_trip() {
        let hello = HelloMessage::new("opc.tcp://localhost:4840", 8192, 8192, 0, 0);
        let mut buf = Vec::new();
        hello.encode(&mut buf).unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let decoded = HelloMessage::decode(&mut cursor, &DecodingOptions::default()).unwrap();
        assert_eq!(hello, decoded);
    }

    #[test]
    fn acknowledge_round_trip() {
        let ack = AcknowledgeMessage::new(0, 8192, 8192, 0, 0);
        let mut buf = Vec::new();
        ack.encode(&mut buf).unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let decoded = AcknowledgeMessage::decode(&mut cursor, &DecodingOptions::default()).unwrap();
        assert_eq!(ack, decoded);
    }

    #[test]
    fn error_message_round_trip() {
        let err = ErrorMessage::from_status_code(StatusCode::BadTcpEndpointUrlInvalid);
        let mut buf = Vec::new();
        err.encode(&mut buf).unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let decoded = ErrorMessage::decode(&mut cursor, &DecodingOptions::default()).unwrap();
        assert_eq!(err.error, decoded.error);
    }

    #[test]
    fn identity_token_anonymous_round_trip() {
        let token = IdentityToken::Anonymous {
            policy_id: UAString::from("anonymous"),
        };
        let mut buf = Vec::new();
        token.encode(&mut buf).unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let decoded = IdentityToken::decode(&mut cursor, &DecodingOptions::default()).unwrap();
        assert_eq!(token, decoded);
    }

    #[test]
    fn identity_token_username_round_trip() {
        let token = IdentityToken::UserName {
            policy_id: UAString::from("username_basic256"),
            user_name: UAString::from("alice"),
            password: ByteString::from(vec![1, 2, 3]),
            encryption_algorithm: UAString::null(),
        };
        let mut buf = Vec::new();
        token.encode(&mut buf).unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let decoded = IdentityToken::decode(&mut cursor, &DecodingOptions::default()).unwrap();
        assert_eq!(token, decoded);
    }

    #[test]
    fn open_secure_channel_request_round_trip() {
        let req = OpenSecureChannelRequest {
            request_header: RequestHeader::dummy(),
            client_protocol_version: 0,
            request_type: SecurityTokenRequestType::Issue,
            security_mode: MessageSecurityMode::None,
            client_nonce: ByteString::null(),
            requested_lifetime: 60_000,
        };
        let mut buf = Vec::new();
        req.encode(&mut buf).unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let decoded =
            OpenSecureChannelRequest::decode(&mut cursor, &DecodingOptions::default()).unwrap();
        assert_eq!(req.requested_lifetime, decoded.requested_lifetime);
        assert_eq!(req.request_type, decoded.request_type);
    }

    #[test]
    fn get_endpoints_response_round_trip() {
        let resp = GetEndpointsResponse {
            response_header: ResponseHeader::null(),
            endpoints: Some(vec![EndpointDescription {
                endpoint_url: UAString::from("opc.tcp://localhost:4840"),
                server: ApplicationDescription::default(),
                server_certificate: ByteString::null(),
                security_mode: MessageSecurityMode::None,
                security_policy_uri: UAString::from("http://opcfoundation.org/UA/SecurityPolicy#None"),
                user_identity_tokens: Some(vec![UserTokenPolicy {
                    policy_id: UAString::from("anonymous"),
                    token_type: 0,
                    issued_token_type: UAString::null(),
                    issuer_endpoint_url: UAString::null(),
                    security_policy_uri: UAString::null(),
                }]),
                transport_profile_uri: UAString::null(),
                security_level: 0,
            }]),
        };
        let mut buf = Vec::new();
        resp.encode(&mut buf).unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let decoded =
            GetEndpointsResponse::decode(&mut cursor, &DecodingOptions::default()).unwrap();
        assert_eq!(resp, decoded);
    }
}
