//! The per-message state machine: fragmentation assembly, control-frame handling,
//! the close handshake, and the payload-level checks the codec can't perform on its
//! own (UTF-8 validity, close-code validity).

use crate::codec::{read_frame, write_close_frame, write_frame};
use crate::config::{Role, WebSocketConfig};
use crate::error::{Error, ProtocolViolation};
use crate::frame::OpCode;
use crate::message::Message;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

/// A WebSocket endpoint wrapping an already-upgraded, exclusively-owned transport.
///
/// Not `Clone`, not `Sync` for concurrent use: a single Connection is driven by one
/// task at a time, serializing its own `read_message`/`send_message`/`close` calls.
pub struct Connection<T> {
    transport: T,
    role: Role,
    config: WebSocketConfig,
}

impl<T> Connection<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(transport: T, role: Role, config: WebSocketConfig) -> Self {
        Connection {
            transport,
            role,
            config,
        }
    }

    /// Sends `payload` as a single, unfragmented frame of the opcode implied by
    /// `message`. Fragmenting outgoing messages is not exposed here; a caller
    /// needing that writes frames directly against the lower-level codec.
    pub async fn send_message(&mut self, message: Message) -> Result<(), Error> {
        let opcode = message.opcode();
        let payload = message.into_bytes();
        if payload.len() > self.config.max_message_size {
            return Err(Error::Protocol(ProtocolViolation::MessageTooLarge(
                payload.len(),
            )));
        }
        write_frame(&mut self.transport, self.role, true, opcode, &payload).await
    }

    /// Pumps frames until a complete message is assembled, a Close frame is
    /// exchanged, or a protocol violation terminates the connection.
    pub async fn read_message(&mut self) -> Result<Message, Error> {
        let mut started = false;
        let mut first_opcode = OpCode::Text;
        let mut accumulator: Vec<u8> = Vec::new();

        loop {
            let frame = read_frame(&mut self.transport, self.role, &self.config).await?;

            if frame.opcode.is_control() {
                match frame.opcode {
                    OpCode::Close => return self.handle_close(frame.payload).await,
                    OpCode::Ping => {
                        log::debug!("answering ping with pong ({} byte payload)", frame.payload.len());
                        write_frame(&mut self.transport, self.role, true, OpCode::Pong, &frame.payload)
                            .await?;
                        continue;
                    }
                    OpCode::Pong => continue,
                    // `is_control` also covers reserved opcodes 0xB-0xF, but `read_frame`
                    // never returns a frame with a reserved opcode (it Closes or Drops
                    // first), so only Close/Ping/Pong ever reach this match.
                    _ => unreachable!("read_frame never returns a frame with a reserved opcode"),
                }
            }

            if frame.opcode == OpCode::Continuation && !started {
                return Err(self
                    .abort(ProtocolViolation::UnexpectedContinuation)
                    .await);
            }

            if frame.opcode != OpCode::Continuation && started {
                return Err(self.abort(ProtocolViolation::InterleavedDataFrame).await);
            }

            if !started {
                first_opcode = frame.opcode;
                started = true;
            }

            accumulator.extend_from_slice(&frame.payload);
            if accumulator.len() > self.config.max_message_size {
                return Err(self
                    .abort(ProtocolViolation::MessageTooLarge(accumulator.len()))
                    .await);
            }

            if frame.fin {
                break;
            }
        }

        match first_opcode {
            OpCode::Text => match String::from_utf8(accumulator) {
                Ok(text) => Ok(Message::Text(text)),
                Err(_) => {
                    log::warn!("dropping connection: text message was not valid UTF-8");
                    let _ = self.transport.shutdown().await;
                    Err(Error::Protocol(ProtocolViolation::NonUtf8Text))
                }
            },
            _ => Ok(Message::Binary(accumulator)),
        }
    }

    async fn handle_close(&mut self, payload: Vec<u8>) -> Result<Message, Error> {
        let code = match payload.len() {
            0 => 1000,
            1 => return Err(self.abort(ProtocolViolation::InvalidClosePayload).await),
            _ => {
                let code = u16::from_be_bytes([payload[0], payload[1]]);
                if payload.len() > 2 && std::str::from_utf8(&payload[2..]).is_err() {
                    return Err(self.abort(ProtocolViolation::NonUtf8CloseReason).await);
                }
                code
            }
        };

        if !is_valid_close_code(code) {
            return Err(self.abort(ProtocolViolation::InvalidCloseCode(code)).await);
        }

        log::debug!("close handshake complete, echoing code {code}");
        if let Err(write_err) = write_close_frame(&mut self.transport, self.role, code).await {
            log::error!("failed to echo close frame: {write_err}");
        }
        let _ = self.transport.shutdown().await;
        Err(Error::ConnectionClosed)
    }

    async fn abort(&mut self, violation: ProtocolViolation) -> Error {
        log::warn!("websocket protocol violation, closing with code 1002: {violation}");
        if let Err(write_err) = write_close_frame(&mut self.transport, self.role, 1002).await {
            log::error!("failed to send close frame after protocol violation: {write_err}");
        }
        let _ = self.transport.shutdown().await;
        Error::Protocol(violation)
    }

    /// Sends a Close frame carrying `code` (default 1000, substituting 1002 if
    /// `code` is not a valid close code) and shuts the transport.
    pub async fn close(&mut self, code: Option<u16>) -> Result<(), Error> {
        let code = code.unwrap_or(1000);
        let code = if is_valid_close_code(code) { code } else { 1002 };
        write_close_frame(&mut self.transport, self.role, code).await?;
        self.transport.shutdown().await?;
        Ok(())
    }

    /// Shuts the transport without sending a Close frame.
    pub async fn drop_connection(&mut self) -> Result<(), Error> {
        self.transport.shutdown().await?;
        Ok(())
    }
}

impl Connection<tokio::net::TcpStream> {
    pub fn peer_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.peer_addr()
    }
}

impl Connection<tokio::io::BufReader<tokio::net::TcpStream>> {
    /// Same as the bare-`TcpStream` overload, for the buffered transport
    /// `handshake::connect`/`handshake::accept` hand back.
    pub fn peer_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.get_ref().peer_addr()
    }
}

/// §4.2: valid close codes are `[1000..1003]`, `[1007..1011]`, `[3000..4999]`.
/// 1005/1006 are reserved (never sent on the wire) and fall outside these ranges.
fn is_valid_close_code(code: u16) -> bool {
    (1000..=1003).contains(&code) || (1007..=1011).contains(&code) || (3000..=4999).contains(&code)
}
