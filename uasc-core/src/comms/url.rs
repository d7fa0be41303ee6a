//! Parsing of `opc.tcp://host:port/path` endpoint urls, shared by the
//! client-side transport and server-side endpoint matching.

use url::Url;

use uasc_types::StatusCode;

pub const OPC_TCP_SCHEME: &str = "opc.tcp";

pub fn is_opc_tcp_url(url: &str) -> bool {
    Url::parse(url)
        .map(|u| u.scheme() == OPC_TCP_SCHEME)
        .unwrap_or(false)
}

/// Splits an endpoint url into the host/port pair a transport connects to,
/// defaulting the port when the url omits one.
pub fn hostname_port_from_url(url: &str, default_port: u16) -> Result<(String, u16), StatusCode> {
    let url = Url::parse(url).map_err(|_| StatusCode::BadTcpEndpointUrlInvalid)?;
    if url.scheme() != OPC_TCP_SCHEME || !url.has_host() {
        return Err(StatusCode::BadTcpEndpointUrlInvalid);
    }
    let host = url.host_str().unwrap().to_string();
    let port = url.port().unwrap_or(default_port);
    Ok((host, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_opc_tcp_scheme() {
        assert!(is_opc_tcp_url("opc.tcp://host:4841/ep"));
        assert!(!is_opc_tcp_url("http://host:4841/ep"));
    }

    #[test]
    fn splits_host_and_explicit_port() {
        let (host, port) = hostname_port_from_url("opc.tcp://host:4841/ep", 4840).unwrap();
        assert_eq!(host, "host");
        assert_eq!(port, 4841);
    }

    #[test]
    fn falls_back_to_default_port() {
        let (host, port) = hostname_port_from_url("opc.tcp://host/ep", 4840).unwrap();
        assert_eq!(host, "host");
        assert_eq!(port, 4840);
    }

    #[test]
    fn rejects_non_tcp_scheme() {
        assert_eq!(
            hostname_port_from_url("http://host/ep", 4840).unwrap_err(),
            StatusCode::BadTcpEndpointUrlInvalid
        );
    }
}
