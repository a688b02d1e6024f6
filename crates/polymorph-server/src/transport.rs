//! Length-prefixed stream framing.
//!
//! Every protocol unit, the cleartext handshake record as well as each
//! encrypted frame, travels as:
//!
//! ```text
//! ┌──────────────┬──────────────────────┐
//! │ len: u32 BE  │ body: len bytes      │
//! └──────────────┴──────────────────────┘
//! ```
//!
//! Zero-length bodies and bodies above the configured maximum are protocol
//! errors.

use bytes::{Buf, BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ServerError;

/// Size of the length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Largest body accepted unless configured otherwise.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024;

/// Framed reader/writer over a byte stream.
#[derive(Debug)]
pub struct FrameTransport<S> {
    stream: S,
    buf: BytesMut,
    max_frame_size: usize,
}

impl<S> FrameTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap `stream`, rejecting bodies larger than `max_frame_size`.
    pub fn new(stream: S, max_frame_size: usize) -> Self {
        Self { stream, buf: BytesMut::with_capacity(LENGTH_PREFIX_SIZE + 1024), max_frame_size }
    }

    /// Read the next body.
    ///
    /// Returns `Ok(None)` on a clean end of stream between frames.
    ///
    /// # Errors
    ///
    /// - `ServerError::Protocol` for a zero-length or oversize frame
    /// - `ServerError::Transport` if the stream fails or ends mid-frame
    pub async fn read_frame(&mut self) -> Result<Option<Vec<u8>>, ServerError> {
        loop {
            if let Some(body) = self.parse_frame()? {
                return Ok(Some(body));
            }

            if self.stream.read_buf(&mut self.buf).await? == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(ServerError::Transport(format!(
                    "stream ended with {} bytes of a partial frame",
                    self.buf.len()
                )));
            }
        }
    }

    /// Try to split one complete body off the read buffer.
    fn parse_frame(&mut self) -> Result<Option<Vec<u8>>, ServerError> {
        if self.buf.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }

        let len = (&self.buf[..LENGTH_PREFIX_SIZE]).get_u32() as usize;
        self.check_len(len)?;

        let total = LENGTH_PREFIX_SIZE + len;
        if self.buf.len() < total {
            self.buf.reserve(total - self.buf.len());
            return Ok(None);
        }

        self.buf.advance(LENGTH_PREFIX_SIZE);
        Ok(Some(self.buf.split_to(len).to_vec()))
    }

    /// Write one body with its length prefix.
    ///
    /// # Errors
    ///
    /// - `ServerError::Protocol` if `body` is empty or oversize
    /// - `ServerError::Transport` if the write fails
    pub async fn write_frame(&mut self, body: &[u8]) -> Result<(), ServerError> {
        self.check_len(body.len())?;
        let len = u32::try_from(body.len())
            .map_err(|_| ServerError::Protocol(format!("frame of {} bytes", body.len())))?;

        let mut out = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + body.len());
        out.put_u32(len);
        out.put_slice(body);

        self.stream.write_all(&out).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Shut down the write half.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Transport` if the shutdown fails.
    pub async fn shutdown(&mut self) -> Result<(), ServerError> {
        self.stream.shutdown().await?;
        Ok(())
    }

    fn check_len(&self, len: usize) -> Result<(), ServerError> {
        if len == 0 {
            return Err(ServerError::Protocol("empty frame".to_string()));
        }
        if len > self.max_frame_size {
            return Err(ServerError::Protocol(format!(
                "frame of {len} bytes exceeds maximum {}",
                self.max_frame_size
            )));
        }
        Ok(())
    }
}
