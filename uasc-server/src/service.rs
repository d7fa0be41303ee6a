use uasc_session::ServerInfo;
use uasc_types::{GetEndpointsRequest, GetEndpointsResponse, ResponseHeader};

/// The one application service this core answers directly instead of
/// handing off to the façade: a client needs it before it has a session to
/// route anything else through.
pub fn get_endpoints(info: &ServerInfo, request: &GetEndpointsRequest) -> GetEndpointsResponse {
    let endpoints = info.matching_endpoint_descriptions(&request.endpoint_url);
    GetEndpointsResponse {
        response_header: ResponseHeader::new_good(&request.request_header),
        endpoints,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uasc_crypto::SecurityPolicy;
    use uasc_types::{
        ApplicationDescription, ByteString, EndpointDescription, MessageSecurityMode, NodeId,
        RequestHeader, UAString, UtcTime,
    };

    fn info() -> ServerInfo {
        ServerInfo {
            server_certificate: ByteString::null(),
            application: ApplicationDescription::default(),
            endpoints: vec![EndpointDescription {
                endpoint_url: UAString::from("opc.tcp://host:4841/ep"),
                server: ApplicationDescription::default(),
                server_certificate: ByteString::null(),
                security_mode: MessageSecurityMode::None,
                security_policy_uri: UAString::from(SecurityPolicy::None.to_uri()),
                user_identity_tokens: None,
                transport_profile_uri: UAString::null(),
                security_level: 0,
            }],
            max_sessions: 10,
            min_session_timeout_ms: 1_000,
            max_session_timeout_ms: 3_600_000,
        }
    }

    #[test]
    fn returns_matching_endpoint_for_requested_url() {
        let request = GetEndpointsRequest {
            request_header: RequestHeader::new(NodeId::null(), UtcTime::now(), 2),
            endpoint_url: UAString::from("opc.tcp://host:4841/ep"),
            locale_ids: None,
            profile_uris: None,
        };
        let response = get_endpoints(&info(), &request);
        let endpoints = response.endpoints.unwrap();
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].endpoint_url.as_ref(), "opc.tcp://host:4841/ep");
    }

    #[test]
    fn returns_none_for_unknown_url() {
        let request = GetEndpointsRequest {
            request_header: RequestHeader::new(NodeId::null(), UtcTime::now(), 2),
            endpoint_url: UAString::from("opc.tcp://nope/ep"),
            locale_ids: None,
            profile_uris: None,
        };
        let response = get_endpoints(&info(), &request);
        assert!(response.endpoints.is_none());
    }
}
