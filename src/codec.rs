//! Stateless (per the transport passed in) frame-level reader/writer: header
//! layout, length encoding, masking, and the RFC-mandated Close/Drop reactions
//! to a malformed frame.
//!
//! These functions take `&mut` access to the raw transport directly rather than
//! to a `Connection`, because reacting to a wire-level violation (RSV bits set,
//! a reserved opcode, an oversized control frame) requires writing a Close frame
//! or shutting the socket from inside the read itself (§4.1) — there is no
//! separate channel to hand that reaction to.

use crate::config::{Role, WebSocketConfig};
use crate::error::{Error, ProtocolViolation};
use crate::frame::{Frame, OpCode};
use rand::Rng;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

/// Reads and validates exactly one frame per RFC 6455 §5, reacting to any
/// conformance violation by writing a Close(1002) frame (or, for reserved
/// opcodes, silently) and shutting the transport before returning the error.
pub(crate) async fn read_frame<T>(
    transport: &mut T,
    role: Role,
    config: &WebSocketConfig,
) -> Result<Frame, Error>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let mut header = [0u8; 2];
    transport.read_exact(&mut header).await?;

    // The first bit tells us whether this is the final fragment of the message;
    // the next three are the reserved bits, which must be zero with no
    // negotiated extensions; the low nibble is the opcode.
    let fin = (header[0] & 0b1000_0000) != 0;
    let rsv = (header[0] & 0b0111_0000) >> 4;
    let opcode = OpCode::from_byte(header[0]);

    if rsv != 0 {
        return Err(abort_with_close(transport, role, 1002, ProtocolViolation::ReservedBitSet).await);
    }

    // The mask bit is the top bit of byte 1; the remaining 7 bits are the
    // payload length, or an escape to a 16/64-bit extended length.
    let masked = (header[1] & 0b1000_0000) != 0;
    let len7 = header[1] & 0b0111_1111;

    let payload_len: usize = match len7 {
        126 => {
            let mut ext = [0u8; 2];
            transport.read_exact(&mut ext).await?;
            u16::from_be_bytes(ext) as usize
        }
        127 => {
            let mut ext = [0u8; 8];
            transport.read_exact(&mut ext).await?;
            let ext_len = u64::from_be_bytes(ext);
            if ext_len & (1 << 63) != 0 {
                return Err(
                    abort_with_close(transport, role, 1002, ProtocolViolation::OversizedLength).await,
                );
            }
            ext_len as usize
        }
        small => small as usize,
    };

    if opcode.is_control() && payload_len > 125 {
        return Err(abort_with_close(
            transport,
            role,
            1002,
            ProtocolViolation::ControlFramePayloadTooLarge,
        )
        .await);
    }

    if opcode.is_control() && !fin {
        return Err(abort_with_close(
            transport,
            role,
            1002,
            ProtocolViolation::ControlFrameFragmented,
        )
        .await);
    }

    if opcode.is_reserved() {
        return Err(abort_with_drop(transport, ProtocolViolation::ReservedOpcode).await);
    }

    if role.requires_masked_incoming() != masked {
        return Err(abort_with_close(
            transport,
            role,
            1002,
            ProtocolViolation::MaskingPolicyViolated,
        )
        .await);
    }

    if payload_len > config.max_frame_size {
        return Err(abort_with_close(
            transport,
            role,
            1002,
            ProtocolViolation::FrameTooLarge(payload_len),
        )
        .await);
    }

    let mask = if masked {
        let mut key = [0u8; 4];
        transport.read_exact(&mut key).await?;
        Some(key)
    } else {
        None
    };

    let mut payload = vec![0u8; payload_len];
    match timeout(config.frame_read_timeout, transport.read_exact(&mut payload)).await {
        Ok(Ok(_)) => {}
        Ok(Err(io_err)) => return Err(io_err.into()),
        Err(_elapsed) => {
            return Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "timed out reading frame payload",
            )
            .into())
        }
    }

    if let Some(key) = mask {
        for (i, byte) in payload.iter_mut().enumerate() {
            *byte ^= key[i % 4];
        }
    }

    Ok(Frame {
        fin,
        rsv: 0,
        opcode,
        masked,
        payload,
    })
}

/// Writes exactly one frame, masking the payload and setting the mask bit
/// iff `role` is `Client`, per RFC 6455 §5.1/§5.3.
pub(crate) async fn write_frame<T>(
    transport: &mut T,
    role: Role,
    fin: bool,
    opcode: OpCode,
    payload: &[u8],
) -> Result<(), Error>
where
    T: AsyncWrite + Unpin,
{
    let first_byte = ((fin as u8) << 7) | opcode.as_u8();
    transport.write_all(&[first_byte]).await?;

    let mask_bit = if role.masks_outgoing() { 0b1000_0000 } else { 0 };
    let len = payload.len();

    if len < 126 {
        transport.write_all(&[mask_bit | len as u8]).await?;
    } else if len <= 0xFFFF {
        let ext = (len as u16).to_be_bytes();
        transport
            .write_all(&[mask_bit | 126, ext[0], ext[1]])
            .await?;
    } else {
        let ext = (len as u64).to_be_bytes();
        let mut header = Vec::with_capacity(9);
        header.push(mask_bit | 127);
        header.extend_from_slice(&ext);
        transport.write_all(&header).await?;
    }

    if role.masks_outgoing() {
        // RFC 6455 §5.3 requires the mask to be unpredictable; this draws from
        // the thread-local OS-seeded generator rather than a seedable instance.
        let mask: [u8; 4] = rand::rng().random();
        transport.write_all(&mask).await?;

        let masked_payload: Vec<u8> = payload
            .iter()
            .enumerate()
            .map(|(i, byte)| byte ^ mask[i % 4])
            .collect();
        transport.write_all(&masked_payload).await?;
    } else {
        transport.write_all(payload).await?;
    }

    Ok(())
}

pub(crate) async fn write_close_frame<T>(transport: &mut T, role: Role, code: u16) -> Result<(), Error>
where
    T: AsyncWrite + Unpin,
{
    write_frame(transport, role, true, OpCode::Close, &code.to_be_bytes()).await
}

async fn abort_with_close<T>(
    transport: &mut T,
    role: Role,
    code: u16,
    violation: ProtocolViolation,
) -> Error
where
    T: AsyncWrite + Unpin,
{
    log::warn!("websocket protocol violation, closing with code {code}: {violation}");
    if let Err(write_err) = write_close_frame(transport, role, code).await {
        log::error!("failed to send close frame after protocol violation: {write_err}");
    }
    let _ = transport.shutdown().await;
    Error::Protocol(violation)
}

async fn abort_with_drop<T>(transport: &mut T, violation: ProtocolViolation) -> Error
where
    T: AsyncWrite + Unpin,
{
    log::warn!("websocket protocol violation, dropping connection without a close frame: {violation}");
    let _ = transport.shutdown().await;
    Error::Protocol(violation)
}
