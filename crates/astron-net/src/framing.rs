//! Length-prefixed framing for Astron TCP streams.
//!
//! Every datagram on the wire is a length-prefixed frame:
//!
//! ```text
//! +-------------------+--------------------+
//! | length (2 bytes)  |   payload          |
//! | u16 little-endian |   (length bytes)   |
//! +-------------------+--------------------+
//! ```
//!
//! The length does **not** include the 2 prefix bytes. There is no magic
//! number and no checksum.

use std::io::ErrorKind;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Bytes in the length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 2;

#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Largest payload accepted in either direction. Defaults to the prefix
    /// limit of 65535.
    pub max_payload_size: u16,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: u16::MAX,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame of {size} bytes is over the {max} byte limit")]
    PayloadTooLarge { size: usize, max: u16 },

    /// The peer hung up, possibly mid-frame.
    #[error("stream ended")]
    ConnectionClosed,

    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
}

fn check_size(len: usize, config: &FrameConfig) -> Result<u16, FrameError> {
    match u16::try_from(len) {
        Ok(size) if size <= config.max_payload_size => Ok(size),
        _ => Err(FrameError::PayloadTooLarge {
            size: len,
            max: config.max_payload_size,
        }),
    }
}

/// Prefix `payload` with its length, ready to be written to the socket.
pub fn encode_frame(payload: &[u8], config: &FrameConfig) -> Result<Vec<u8>, FrameError> {
    let len = check_size(payload.len(), config)?;
    let mut frame = Vec::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

async fn fill<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> Result<(), FrameError> {
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(FrameError::ConnectionClosed),
        Err(e) => Err(e.into()),
    }
}

/// Await one whole frame and return its payload.
///
/// EOF anywhere inside the frame is [`FrameError::ConnectionClosed`].
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    config: &FrameConfig,
) -> Result<Vec<u8>, FrameError> {
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    fill(reader, &mut prefix).await?;
    let declared = usize::from(u16::from_le_bytes(prefix));
    check_size(declared, config)?;

    let mut payload = vec![0u8; declared];
    fill(reader, &mut payload).await?;
    Ok(payload)
}

/// Frame `payload` and flush it to `writer`.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
    config: &FrameConfig,
) -> Result<(), FrameError> {
    writer.write_all(&encode_frame(payload, config)?).await?;
    writer.flush().await?;
    Ok(())
}

/// Reassembles frames from arbitrarily split socket reads.
///
/// Bytes past the end of a complete frame stay buffered and start the next
/// frame.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: Vec<u8>,
    config: FrameConfig,
}

impl FrameBuffer {
    pub fn new(config: FrameConfig) -> Self {
        Self {
            buf: Vec::new(),
            config,
        }
    }

    /// Append a chunk read from the socket.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Bytes held that do not yet form a complete frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Take the next complete payload, if one is buffered.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        if self.buf.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }
        let declared = u16::from_le_bytes([self.buf[0], self.buf[1]]);
        if declared > self.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: usize::from(declared),
                max: self.config.max_payload_size,
            });
        }

        let end = LENGTH_PREFIX_SIZE + usize::from(declared);
        if self.buf.len() < end {
            return Ok(None);
        }
        let payload = self.buf[LENGTH_PREFIX_SIZE..end].to_vec();
        self.buf.drain(..end);
        Ok(Some(payload))
    }
}
