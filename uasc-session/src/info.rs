use uasc_crypto::SecurityPolicy;
use uasc_types::{
    ApplicationDescription, ByteString, EndpointDescription, MessageSecurityMode, UAString,
};

/// Server-wide facts the session manager and the GetEndpoints service both
/// need: the server's own certificate and application description, and the
/// endpoints it serves.
pub struct ServerInfo {
    pub server_certificate: ByteString,
    pub application: ApplicationDescription,
    pub endpoints: Vec<EndpointDescription>,
    pub max_sessions: usize,
    pub min_session_timeout_ms: u64,
    pub max_session_timeout_ms: u64,
}

impl ServerInfo {
    /// Endpoint descriptions matching `endpoint_url`, or every endpoint if
    /// the caller passed no url. `None` only when there are no endpoints at
    /// all matching the filter.
    pub fn matching_endpoint_descriptions(&self, endpoint_url: &UAString) -> Option<Vec<EndpointDescription>> {
        let matches: Vec<EndpointDescription> = if endpoint_url.is_null() || endpoint_url.is_empty() {
            self.endpoints.clone()
        } else {
            self.endpoints
                .iter()
                .filter(|e| e.endpoint_url.as_ref() == endpoint_url.as_ref())
                .cloned()
                .collect()
        };
        if matches.is_empty() {
            None
        } else {
            Some(matches)
        }
    }

    pub fn endpoint_exists(
        &self,
        endpoint_url: &str,
        security_policy: SecurityPolicy,
        security_mode: MessageSecurityMode,
    ) -> bool {
        self.endpoints.iter().any(|e| {
            e.endpoint_url.as_ref() == endpoint_url
                && e.security_policy_uri.as_ref() == security_policy.to_uri()
                && e.security_mode == security_mode
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(url: &str) -> EndpointDescription {
        EndpointDescription {
            endpoint_url: UAString::from(url),
            server: ApplicationDescription::default(),
            server_certificate: ByteString::null(),
            security_mode: MessageSecurityMode::None,
            security_policy_uri: UAString::from(SecurityPolicy::None.to_uri()),
            user_identity_tokens: None,
            transport_profile_uri: UAString::null(),
            security_level: 0,
        }
    }

    fn info(endpoints: Vec<EndpointDescription>) -> ServerInfo {
        ServerInfo {
            server_certificate: ByteString::null(),
            application: ApplicationDescription::default(),
            endpoints,
            max_sessions: 10,
            min_session_timeout_ms: 1_000,
            max_session_timeout_ms: 3_600_000,
        }
    }

    #[test]
    fn null_url_returns_every_endpoint() {
        let info = info(vec![endpoint("opc.tcp://a"), endpoint("opc.tcp://b")]);
        let matches = info.matching_endpoint_descriptions(&UAString::null()).unwrap();
        assert_eq!(matches.len(), 2);
    }

    #[test]
    fn specific_url_filters_down() {
        let info = info(vec![endpoint("opc.tcp://a"), endpoint("opc.tcp://b")]);
        let matches = info
            .matching_endpoint_descriptions(&UAString::from("opc.tcp://b"))
            .unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].endpoint_url.as_ref(), "opc.tcp://b");
    }

    #[test]
    fn unmatched_url_returns_none() {
        let info = info(vec![endpoint("opc.tcp://a")]);
        assert!(info.matching_endpoint_descriptions(&UAString::from("opc.tcp://nope")).is_none());
    }

    #[test]
    fn endpoint_exists_checks_policy_and_mode() {
        let info = info(vec![endpoint("opc.tcp://a")]);
        assert!(info.endpoint_exists("opc.tcp://a", SecurityPolicy::None, MessageSecurityMode::None));
        assert!(!info.endpoint_exists("opc.tcp://a", SecurityPolicy::None, MessageSecurityMode::Sign));
    }
}
