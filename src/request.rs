//! Client-side request construction: turning a `ws://`/`wss://` URL plus a
//! generated key into the literal bytes of the opening HTTP/1.1 request.

use crate::handshake::HandshakeError;
use url::Url;

/// The pieces of a parsed WebSocket URL needed to open the TCP connection and
/// write the request line: the request text itself, the `host:port` to dial,
/// and whether the URL asked for TLS (which this crate doesn't terminate).
pub(crate) struct ParsedRequest {
    pub request: String,
    pub host_with_port: String,
    pub use_tls: bool,
}

/// Builds the GET request for `ws_url` using `key` as the `Sec-WebSocket-Key`.
///
/// Since everything here is bytes going straight onto the wire, the request is
/// assembled as a plain string rather than through a generic HTTP request type.
pub(crate) fn construct_http_request(ws_url: &str, key: &str) -> Result<ParsedRequest, HandshakeError> {
    let parsed_url = Url::parse(ws_url)?;

    let use_tls = match parsed_url.scheme() {
        "ws" => false,
        "wss" => true,
        other => return Err(HandshakeError::UnsupportedScheme(other.to_string())),
    };
    let default_port = if use_tls { 443 } else { 80 };

    let host = parsed_url
        .host_str()
        .ok_or(HandshakeError::UrlMissingHost)?;
    let port = parsed_url.port().unwrap_or(default_port);
    let host_with_port = format!("{host}:{port}");

    // The Host header carries the port only when the URL specified one explicitly.
    let host_header = match parsed_url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };

    let request_path = match parsed_url.query() {
        Some(query) => format!("{}?{}", parsed_url.path(), query),
        None => parsed_url.path().to_string(),
    };

    let request = format!(
        "GET {request_path} HTTP/1.1\r\n\
         Host: {host_header}\r\n\
         Connection: Upgrade\r\n\
         Upgrade: websocket\r\n\
         Sec-WebSocket-Key: {key}\r\n\
         Sec-WebSocket-Version: 13\r\n\
         \r\n"
    );

    Ok(ParsedRequest {
        request,
        host_with_port,
        use_tls,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_request_with_default_port() {
        let parsed = construct_http_request("ws://example.com/chat", "dGhlIHNhbXBsZSBub25jZQ==").unwrap();
        assert!(parsed.request.starts_with("GET /chat HTTP/1.1\r\n"));
        assert!(parsed.request.contains("Host: example.com\r\n"));
        assert!(parsed.request.contains("Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n"));
        assert_eq!(parsed.host_with_port, "example.com:80");
        assert!(!parsed.use_tls);
    }

    #[test]
    fn preserves_explicit_port_and_query() {
        let parsed = construct_http_request("ws://example.com:9001/chat?id=1", "key").unwrap();
        assert!(parsed.request.starts_with("GET /chat?id=1 HTTP/1.1\r\n"));
        assert!(parsed.request.contains("Host: example.com:9001\r\n"));
        assert_eq!(parsed.host_with_port, "example.com:9001");
    }

    #[test]
    fn wss_is_recognized_but_flagged_for_tls() {
        let parsed = construct_http_request("wss://example.com/", "key").unwrap();
        assert!(parsed.use_tls);
        assert_eq!(parsed.host_with_port, "example.com:443");
    }

    #[test]
    fn rejects_non_websocket_scheme() {
        let err = construct_http_request("http://example.com/", "key").unwrap_err();
        assert!(matches!(err, HandshakeError::UnsupportedScheme(scheme) if scheme == "http"));
    }
}
