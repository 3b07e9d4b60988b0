use bytes::{Buf, BytesMut};
use std::fmt::Display;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use super::{ClientMessage, FrameError};

/// Longest line accepted from a peer, excluding the terminator.
pub const MAX_LINE_LEN: usize = 1024;

pub fn from_socket(socket: TcpStream) -> (ConnectionTx, ConnectionRx) {
    let (read_stream, write_stream) = socket.into_split();
    (ConnectionTx::new(write_stream), ConnectionRx::new(read_stream))
}

#[derive(Debug)]
pub struct ConnectionTx<W = OwnedWriteHalf> {
    write_stream: BufWriter<W>,
}

pub struct ConnectionRx<R = OwnedReadHalf> {
    read_stream: R,
    buffer: BytesMut,
}

impl<W: AsyncWrite + Unpin> ConnectionTx<W> {
    pub fn new(write_stream: W) -> Self {
        Self {
            write_stream: BufWriter::new(write_stream),
        }
    }

    /// Write one message as a single newline terminated line. Outbound lines are not capped.
    pub async fn write_frame(&mut self, frame: &impl Display) -> Result<(), FrameError> {
        let line = format!("{frame}\n");
        self.write_stream.write_all(line.as_bytes()).await?;
        self.write_stream.flush().await?;
        Ok(())
    }
}

impl<R: AsyncRead + Unpin> ConnectionRx<R> {
    pub fn new(read_stream: R) -> Self {
        Self {
            read_stream,
            buffer: BytesMut::with_capacity(256),
        }
    }

    /// Read the next non-blank line and decode it.
    ///
    /// Returns `Ok(None)` when the peer closed the connection cleanly. A line that fails to
    /// decode is consumed and reported as [`FrameError::Malformed`], after which reading can
    /// continue.
    pub async fn read_frame(&mut self) -> Result<Option<ClientMessage>, FrameError> {
        loop {
            if let Some(line) = self.parse_line()? {
                if line.trim().is_empty() {
                    continue;
                }
                tracing::trace!("Decoding line {line:?}");
                return Ok(Some(line.parse::<ClientMessage>()?));
            }

            if self.read_stream.read_buf(&mut self.buffer).await? == 0 {
                if self.buffer.is_empty() {
                    // Remote closed Connection
                    return Ok(None);
                } else {
                    // Connection closed while still sending data
                    return Err(FrameError::ConnectionReset);
                }
            }
        }
    }

    fn parse_line(&mut self) -> Result<Option<String>, FrameError> {
        let Some(end) = self.buffer.iter().position(|&b| b == b'\n') else {
            if self.buffer.len() > MAX_LINE_LEN {
                tracing::debug!(buffered = self.buffer.len(), "Unterminated line too long");
                return Err(FrameError::FrameLength);
            }
            return Ok(None);
        };
        if end > MAX_LINE_LEN {
            return Err(FrameError::FrameLength);
        }

        // Consume the line and its terminator from the buffer
        let line = self.buffer.split_to(end);
        self.buffer.advance(1);
        let line = std::str::from_utf8(&line).map_err(|_| FrameError::Encoding)?;
        Ok(Some(line.trim_end_matches('\r').to_owned()))
    }
}
