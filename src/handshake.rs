//! The opening HTTP/1.1 Upgrade exchange (RFC 6455 §1.3/§4), in both roles.
//!
//! This is deliberately the thin, external-collaborator surface named in §4.4/§6.2
//! of the design: it produces an upgraded transport and hands it straight to
//! [`crate::connection::Connection`]. None of the Autobahn-style conformance work
//! lives here — that's the codec and state machine. A caller who already has an
//! upgraded transport (behind an HTTP router, or wrapped in TLS) can skip this
//! module entirely and construct a `Connection` directly.

use crate::config::{Role, WebSocketConfig};
use crate::connection::Connection;
use crate::request::construct_http_request;
use crate::utils::{generate_websocket_accept_value, generate_websocket_key};
use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};

/// Largest header block this module will buffer before giving up; guards against
/// a peer that never sends the trailing blank line.
const MAX_HEADER_BYTES: usize = 16 * 1024;
const HEADER_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Failures on the handshake surface, distinct from [`crate::error::Error`] since
/// they all occur before a `Connection` (and its message-layer taxonomy) exists.
#[derive(Error, Debug)]
pub enum HandshakeError {
    #[error("handshake I/O failed: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("invalid websocket URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("malformed HTTP message: {0}")]
    HttpParse(#[from] httparse::Error),

    #[error("unsupported URL scheme {0:?}, expected \"ws\" or \"wss\"")]
    UnsupportedScheme(String),

    #[error("websocket URL is missing a host")]
    UrlMissingHost,

    #[error("wss:// requires a caller-supplied TLS stream; this crate does not terminate TLS itself")]
    TlsNotSupported,

    #[error("peer did not complete the HTTP header block before the read timeout")]
    Timeout,

    #[error("peer closed the connection before sending a complete HTTP header block")]
    IncompleteHeaders,

    #[error("request line was not a GET request")]
    NotAGetRequest,

    #[error("missing or invalid Upgrade header")]
    MissingUpgradeHeader,

    #[error("missing or invalid Connection header")]
    MissingConnectionHeader,

    #[error("missing or unsupported Sec-WebSocket-Version header, expected 13")]
    UnsupportedVersion,

    #[error("missing Sec-WebSocket-Key header")]
    MissingSecWebSocketKey,

    #[error("server responded with status {0} instead of 101 Switching Protocols")]
    NotSwitchingProtocols(u16),

    #[error("Sec-WebSocket-Accept did not match the value derived from the request key")]
    AcceptMismatch,
}

/// Reads raw bytes one line at a time until a blank line (`\r\n` or a lone `\n`)
/// is seen — exactly up to the trailing blank line and no further. Any bytes
/// the peer sent after it stay buffered inside `reader` for the `Connection`
/// that wraps it next, rather than being discarded.
async fn read_header_block<T>(reader: &mut BufReader<T>) -> Result<BytesMut, HandshakeError>
where
    T: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(1024);
    let result = timeout(HEADER_READ_TIMEOUT, async {
        loop {
            let mut line = Vec::new();
            let n = reader.read_until(b'\n', &mut line).await?;
            if n == 0 {
                return Err(HandshakeError::IncompleteHeaders);
            }
            let is_blank = matches!(line.as_slice(), b"\r\n" | b"\n");
            buf.extend_from_slice(&line);
            if buf.len() > MAX_HEADER_BYTES {
                return Err(HandshakeError::IncompleteHeaders);
            }
            if is_blank {
                break;
            }
        }
        Ok(buf)
    })
    .await;

    match result {
        Ok(inner) => inner,
        Err(_elapsed) => Err(HandshakeError::Timeout),
    }
}

fn header_value<'a>(headers: &'a [httparse::Header<'a>], name: &str) -> Option<&'a str> {
    headers.iter().find_map(|header| {
        if header.name.eq_ignore_ascii_case(name) {
            std::str::from_utf8(header.value).ok()
        } else {
            None
        }
    })
}

fn header_has_token(headers: &[httparse::Header], name: &str, token: &str) -> bool {
    header_value(headers, name)
        .map(|value| value.split(',').any(|t| t.trim().eq_ignore_ascii_case(token)))
        .unwrap_or(false)
}

/// Server side of the handshake: validates an incoming HTTP/1.1 upgrade request
/// (parsed with `httparse`) and returns a `Connection` in the `Server` role
/// wrapping the buffered transport.
pub async fn accept<T>(
    transport: T,
    config: WebSocketConfig,
) -> Result<Connection<BufReader<T>>, HandshakeError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(transport);
    let raw = read_header_block(&mut reader).await?;

    let mut header_storage = [httparse::EMPTY_HEADER; 32];
    let mut request = httparse::Request::new(&mut header_storage);
    match request.parse(&raw)? {
        httparse::Status::Complete(_) => {}
        httparse::Status::Partial => return Err(HandshakeError::IncompleteHeaders),
    }

    if request.method != Some("GET") {
        return Err(HandshakeError::NotAGetRequest);
    }
    if !header_has_token(request.headers, "Upgrade", "websocket") {
        return Err(HandshakeError::MissingUpgradeHeader);
    }
    if !header_has_token(request.headers, "Connection", "Upgrade") {
        return Err(HandshakeError::MissingConnectionHeader);
    }
    if header_value(request.headers, "Sec-WebSocket-Version") != Some("13") {
        return Err(HandshakeError::UnsupportedVersion);
    }
    let key = header_value(request.headers, "Sec-WebSocket-Key")
        .ok_or(HandshakeError::MissingSecWebSocketKey)?
        .to_string();

    let accept_value = generate_websocket_accept_value(key);
    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Connection: Upgrade\r\n\
         Upgrade: websocket\r\n\
         Sec-WebSocket-Accept: {accept_value}\r\n\
         \r\n"
    );
    reader.write_all(response.as_bytes()).await?;

    log::debug!("completed server-side websocket handshake");
    Ok(Connection::new(reader, Role::Server, config))
}

/// Client side of the handshake: opens a TCP connection to the URL's host,
/// writes the upgrade request, and validates the `101` response before handing
/// back a `Connection` in the `Client` role. `wss://` URLs are recognized for
/// port selection but this crate does not terminate TLS itself — see
/// [`HandshakeError::TlsNotSupported`].
pub async fn connect(ws_url: &str) -> Result<Connection<BufReader<TcpStream>>, HandshakeError> {
    connect_with_config(ws_url, WebSocketConfig::default()).await
}

pub async fn connect_with_config(
    ws_url: &str,
    config: WebSocketConfig,
) -> Result<Connection<BufReader<TcpStream>>, HandshakeError> {
    let key = generate_websocket_key();
    let parsed = construct_http_request(ws_url, &key)?;
    if parsed.use_tls {
        return Err(HandshakeError::TlsNotSupported);
    }

    let stream = TcpStream::connect(&parsed.host_with_port).await?;
    let mut reader = BufReader::new(stream);
    reader.write_all(parsed.request.as_bytes()).await?;

    let raw = read_header_block(&mut reader).await?;

    let mut header_storage = [httparse::EMPTY_HEADER; 32];
    let mut response = httparse::Response::new(&mut header_storage);
    match response.parse(&raw)? {
        httparse::Status::Complete(_) => {}
        httparse::Status::Partial => return Err(HandshakeError::IncompleteHeaders),
    }

    let status = response.code.unwrap_or(0);
    if status != 101 {
        return Err(HandshakeError::NotSwitchingProtocols(status));
    }

    let expected_accept = generate_websocket_accept_value(key);
    let actual_accept = header_value(response.headers, "Sec-WebSocket-Accept").unwrap_or("");
    if actual_accept != expected_accept {
        return Err(HandshakeError::AcceptMismatch);
    }

    log::debug!(
        "completed client-side websocket handshake with {}",
        parsed.host_with_port
    );
    Ok(Connection::new(reader, Role::Client, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt};

    #[tokio::test]
    async fn accept_derives_the_rfc_test_vector_accept_value() {
        let (mut client_io, server_io) = duplex(4096);
        let request = "GET /chat HTTP/1.1\r\n\
                        Host: example.com\r\n\
                        Upgrade: websocket\r\n\
                        Connection: Upgrade\r\n\
                        Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
                        Sec-WebSocket-Version: 13\r\n\
                        \r\n";
        client_io.write_all(request.as_bytes()).await.unwrap();

        let conn = accept(server_io, WebSocketConfig::default()).await.unwrap();
        drop(conn);

        let mut response = vec![0u8; 4096];
        let n = timeout(Duration::from_millis(200), client_io.read(&mut response))
            .await
            .unwrap()
            .unwrap();
        let response = String::from_utf8_lossy(&response[..n]);
        assert!(response.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(response.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));
    }

    #[tokio::test]
    async fn accept_rejects_a_request_missing_the_websocket_key() {
        let (mut client_io, server_io) = duplex(4096);
        let request = "GET /chat HTTP/1.1\r\n\
                        Host: example.com\r\n\
                        Upgrade: websocket\r\n\
                        Connection: Upgrade\r\n\
                        Sec-WebSocket-Version: 13\r\n\
                        \r\n";
        client_io.write_all(request.as_bytes()).await.unwrap();

        let result = accept(server_io, WebSocketConfig::default()).await;
        assert!(matches!(result, Err(HandshakeError::MissingSecWebSocketKey)));
    }

    #[tokio::test]
    async fn accept_rejects_a_non_get_request() {
        let (mut client_io, server_io) = duplex(4096);
        let request = "POST /chat HTTP/1.1\r\n\
                        Host: example.com\r\n\
                        Upgrade: websocket\r\n\
                        Connection: Upgrade\r\n\
                        Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
                        Sec-WebSocket-Version: 13\r\n\
                        \r\n";
        client_io.write_all(request.as_bytes()).await.unwrap();

        let result = accept(server_io, WebSocketConfig::default()).await;
        assert!(matches!(result, Err(HandshakeError::NotAGetRequest)));
    }

    #[tokio::test]
    async fn accept_leaves_post_handshake_bytes_untouched() {
        let (mut client_io, server_io) = duplex(4096);
        let request = "GET /chat HTTP/1.1\r\n\
                        Host: example.com\r\n\
                        Upgrade: websocket\r\n\
                        Connection: Upgrade\r\n\
                        Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
                        Sec-WebSocket-Version: 13\r\n\
                        \r\n";
        client_io.write_all(request.as_bytes()).await.unwrap();

        let mut conn = accept(server_io, WebSocketConfig::default()).await.unwrap();

        // drain the 101 response so the duplex pipe doesn't fill up
        let mut response = vec![0u8; 4096];
        timeout(Duration::from_millis(200), client_io.read(&mut response))
            .await
            .unwrap()
            .unwrap();

        crate::codec::write_frame(&mut client_io, Role::Client, true, crate::frame::OpCode::Text, b"hi")
            .await
            .unwrap();
        let message = conn.read_message().await.unwrap();
        assert_eq!(message, crate::message::Message::Text("hi".into()));
    }
}
