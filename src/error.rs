//! The core error taxonomy: the three kinds a [`crate::connection::Connection`] can
//! surface (`Socket`, `ConnectionClosed`, `Protocol`), plus the specific RFC 6455
//! violation behind every `Protocol` error.

use std::io;
use thiserror::Error;

/// Errors surfaced by the frame codec and connection state machine.
///
/// Handshake failures use the separate [`crate::handshake::HandshakeError`], since
/// they occur before a `Connection` (and this taxonomy) exists.
#[derive(Error, Debug)]
pub enum Error {
    /// The underlying transport failed, hit EOF mid-frame, or the per-frame read
    /// timeout elapsed. Fatal; the connection must not be used again.
    #[error("socket error: {source}")]
    Socket {
        #[from]
        source: io::Error,
    },

    /// A valid Close frame was received and echoed; the close handshake is complete.
    /// Terminal but not erroneous.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// The peer violated RFC 6455. By the time this is returned, the connection has
    /// already reacted (Close(1002) or a silent drop, per [`ProtocolViolation`]).
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolViolation),
}

/// The specific RFC 6455 conformance failure behind an [`Error::Protocol`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolViolation {
    #[error("reserved header bit set without a negotiated extension")]
    ReservedBitSet,

    #[error("a control frame must not be fragmented")]
    ControlFrameFragmented,

    #[error("a control frame payload must not exceed 125 bytes")]
    ControlFramePayloadTooLarge,

    #[error("opcode is reserved and carries no defined meaning")]
    ReservedOpcode,

    #[error("masking policy violated for this role")]
    MaskingPolicyViolated,

    #[error("extended payload length has its reserved high bit set")]
    OversizedLength,

    #[error("frame payload of {0} bytes exceeds the configured max_frame_size")]
    FrameTooLarge(usize),

    #[error("assembled message of {0} bytes exceeds the configured max_message_size")]
    MessageTooLarge(usize),

    #[error("continuation frame received with no fragmented message in progress")]
    UnexpectedContinuation,

    #[error("a new data frame arrived while a fragmented message was in progress")]
    InterleavedDataFrame,

    #[error("close frame carried a single-byte payload")]
    InvalidClosePayload,

    #[error("close frame reason text is not valid UTF-8")]
    NonUtf8CloseReason,

    #[error("close code {0} is not a valid WebSocket close code")]
    InvalidCloseCode(u16),

    #[error("text message payload is not valid UTF-8")]
    NonUtf8Text,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_error_wraps_violation() {
        let err: Error = ProtocolViolation::ReservedOpcode.into();
        match err {
            Error::Protocol(ProtocolViolation::ReservedOpcode) => {}
            other => panic!("unexpected error variant: {other:?}"),
        }
    }
}
