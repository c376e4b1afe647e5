//! Length-prefixed framing for [`Packet`]s.
//!
//! A frame is a 4-byte big-endian payload length followed by exactly that
//! many payload bytes. The payload is the bincode encoding of a [`Packet`]
//! with fixed-width integers, so its first four bytes are the little-endian
//! variant tag. There is no resynchronization: a decode failure leaves the
//! byte stream in an unknown position and the connection must be dropped.

use crate::Packet;
use bincode::Options;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of the length header in front of every payload.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Largest payload accepted by default (1 MiB).
pub const MAX_FRAME_LEN: usize = 1_048_576;

const VARIANT_TAG_LEN: usize = 4;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("truncated frame: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("invalid frame length {0}")]
    InvalidLength(u32),

    #[error("unknown message variant tag {0}")]
    UnknownVariant(u32),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("failed to encode message: {0}")]
    Encoding(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CodecError {
    /// True for the decode failures that mean the peer sent garbage.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            CodecError::Truncated { .. }
                | CodecError::InvalidLength(_)
                | CodecError::UnknownVariant(_)
                | CodecError::InvalidPayload(_)
        )
    }
}

fn wire_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
        .reject_trailing_bytes()
}

fn validate_length(len: u32, max_len: usize) -> Result<usize, CodecError> {
    let len_usize = len as usize;
    if len_usize == 0 || len_usize > max_len {
        return Err(CodecError::InvalidLength(len));
    }
    Ok(len_usize)
}

fn decode_payload(payload: &[u8]) -> Result<Packet, CodecError> {
    if payload.len() < VARIANT_TAG_LEN {
        return Err(CodecError::InvalidPayload(format!(
            "{} byte payload is shorter than the variant tag",
            payload.len()
        )));
    }

    let tag = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
    if tag >= Packet::VARIANT_COUNT {
        return Err(CodecError::UnknownVariant(tag));
    }

    wire_options()
        .deserialize(payload)
        .map_err(|e| CodecError::InvalidPayload(e.to_string()))
}

/// Encodes a packet into a complete frame, header included.
pub fn encode(packet: &Packet) -> Result<Vec<u8>, CodecError> {
    let payload = wire_options()
        .serialize(packet)
        .map_err(|e| CodecError::Encoding(e.to_string()))?;

    if payload.len() > MAX_FRAME_LEN {
        return Err(CodecError::Encoding(format!(
            "{} payload of {} bytes exceeds the {} byte frame limit",
            packet.kind(),
            payload.len(),
            MAX_FRAME_LEN
        )));
    }

    let mut frame = Vec::with_capacity(LENGTH_PREFIX_LEN + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Decodes the first frame in `buf`.
///
/// Returns `Ok(None)` while the buffer holds less than one whole frame, and
/// the number of bytes consumed alongside the packet otherwise.
pub fn decode_frame(buf: &[u8], max_len: usize) -> Result<Option<(Packet, usize)>, CodecError> {
    if buf.len() < LENGTH_PREFIX_LEN {
        return Ok(None);
    }

    let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
    let len = validate_length(len, max_len)?;
    let total = LENGTH_PREFIX_LEN + len;
    if buf.len() < total {
        return Ok(None);
    }

    let packet = decode_payload(&buf[LENGTH_PREFIX_LEN..total])?;
    Ok(Some((packet, total)))
}

/// Decodes a buffer holding exactly one frame.
pub fn decode(buf: &[u8]) -> Result<Packet, CodecError> {
    match decode_frame(buf, MAX_FRAME_LEN)? {
        Some((packet, used)) if used == buf.len() => Ok(packet),
        Some((_, used)) => Err(CodecError::InvalidPayload(format!(
            "{} trailing bytes after frame",
            buf.len() - used
        ))),
        None => {
            let expected = if buf.len() < LENGTH_PREFIX_LEN {
                LENGTH_PREFIX_LEN
            } else {
                LENGTH_PREFIX_LEN + u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize
            };
            Err(CodecError::Truncated {
                expected,
                actual: buf.len(),
            })
        }
    }
}

/// Reads one frame from `reader`.
///
/// `Ok(None)` means the peer closed the stream cleanly on a frame boundary.
/// Not cancel-safe: dropping the future mid-frame loses the partial read.
pub async fn read_frame<R>(reader: &mut R, max_len: usize) -> Result<Option<Packet>, CodecError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; LENGTH_PREFIX_LEN];
    let filled = read_fully(reader, &mut header).await?;
    if filled == 0 {
        return Ok(None);
    }
    if filled < LENGTH_PREFIX_LEN {
        return Err(CodecError::Truncated {
            expected: LENGTH_PREFIX_LEN,
            actual: filled,
        });
    }

    let len = validate_length(u32::from_be_bytes(header), max_len)?;
    let mut payload = vec![0u8; len];
    let filled = read_fully(reader, &mut payload).await?;
    if filled < len {
        return Err(CodecError::Truncated {
            expected: len,
            actual: filled,
        });
    }

    decode_payload(&payload).map(Some)
}

/// Encodes and writes one frame, flushing afterwards.
pub async fn write_frame<W>(writer: &mut W, packet: &Packet) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode(packet)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

// Like read_exact, but reports how far it got before EOF.
async fn read_fully<R>(reader: &mut R, buf: &mut [u8]) -> Result<usize, CodecError>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
