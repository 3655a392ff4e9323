//! Length-prefixed JSON framing used by every TCP link in the system
//!
//! A frame is a 4-byte big-endian body length followed by a UTF-8 JSON body.
//! Bodies are never empty and always shorter than [`MAX_FRAME_LEN`]. Any
//! framing error is fatal to the connection it happened on.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::ErrorKind;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Exclusive upper bound on a frame body, in bytes
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Size of the length prefix
pub const HEADER_LEN: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("connection closed")]
    Closed,
    #[error("connection closed in the middle of a frame")]
    Truncated,
    #[error("zero-length frame")]
    Empty,
    #[error("frame body of {0} bytes exceeds the {MAX_FRAME_LEN}-byte limit")]
    Oversized(usize),
    #[error("invalid JSON body: {0}")]
    Json(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FrameError {
    /// True when the peer went away, as opposed to sending garbage
    pub fn is_disconnect(&self) -> bool {
        matches!(self, FrameError::Closed | FrameError::Truncated | FrameError::Io(_))
    }
}

fn check_len(len: usize) -> Result<(), FrameError> {
    if len == 0 {
        Err(FrameError::Empty)
    } else if len >= MAX_FRAME_LEN {
        Err(FrameError::Oversized(len))
    } else {
        Ok(())
    }
}

/// Serializes a message into a complete frame (header + body)
pub fn encode_frame<T: Serialize>(message: &T) -> Result<Vec<u8>, FrameError> {
    let body = serde_json::to_vec(message)?;
    check_len(body.len())?;

    let mut frame = Vec::with_capacity(HEADER_LEN + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Writes one message as a frame and flushes the writer
pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let frame = encode_frame(message)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads exactly one frame body without parsing it
///
/// The declared length is validated before any body byte is read, so an
/// oversized or empty frame never causes an allocation or a parse attempt.
pub async fn read_frame_bytes<R>(reader: &mut R) -> Result<Vec<u8>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    let mut filled = 0;
    while filled < HEADER_LEN {
        let n = reader.read(&mut header[filled..]).await?;
        if n == 0 {
            return Err(if filled == 0 {
                FrameError::Closed
            } else {
                FrameError::Truncated
            });
        }
        filled += n;
    }

    let len = u32::from_be_bytes(header) as usize;
    check_len(len)?;

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await.map_err(|e| {
        if e.kind() == ErrorKind::UnexpectedEof {
            FrameError::Truncated
        } else {
            FrameError::Io(e)
        }
    })?;
    Ok(body)
}

/// Reads one frame and parses its JSON body
pub async fn read_frame<R, T>(reader: &mut R) -> Result<T, FrameError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let body = read_frame_bytes(reader).await?;
    Ok(serde_json::from_slice(&body)?)
}
