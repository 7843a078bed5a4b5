//! TCP transport.
//!
//! Each frame is JSON preceded by its length as a 4-byte big-endian
//! integer. Frames above `max_frame_size` are refused in both directions.

use super::{Frame, FrameSink, FrameStream, Transport, TransportOptions};
use crate::error::TransportError;
use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::debug;

/// Constructors for socket-backed transports.
pub struct TcpTransport;

impl TcpTransport {
    /// Dial `addr` and wrap the connection.
    pub async fn connect<A: ToSocketAddrs>(addr: A, options: TransportOptions) -> Result<Transport, TransportError> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self::from_stream(stream, options))
    }

    /// Wrap an accepted or already connected socket.
    pub fn from_stream(stream: TcpStream, options: TransportOptions) -> Transport {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "Could not set TCP_NODELAY");
        }
        let peer = stream.peer_addr().map(|a| a.to_string()).unwrap_or_default();
        debug!(peer = %peer, "Wrapping TCP stream");

        let (read, write) = stream.into_split();
        Transport::new(
            options,
            Box::new(TcpSink {
                writer: write,
                max_frame_size: options.max_frame_size,
            }),
            Box::new(TcpFrameStream {
                reader: BufReader::new(read),
                max_frame_size: options.max_frame_size,
            }),
        )
    }
}

struct TcpSink {
    writer: OwnedWriteHalf,
    max_frame_size: usize,
}

#[async_trait]
impl FrameSink for TcpSink {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        let data = serde_json::to_vec(&frame).map_err(|e| TransportError::Decode(e.to_string()))?;
        if data.len() > self.max_frame_size {
            return Err(TransportError::FrameTooLarge {
                size: data.len(),
                max: self.max_frame_size,
            });
        }
        let len = u32::try_from(data.len()).map_err(|_| TransportError::FrameTooLarge {
            size: data.len(),
            max: self.max_frame_size,
        })?;

        self.writer.write_all(&len.to_be_bytes()).await?;
        self.writer.write_all(&data).await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

struct TcpFrameStream {
    reader: BufReader<OwnedReadHalf>,
    max_frame_size: usize,
}

impl TcpFrameStream {
    async fn read_frame(&mut self) -> Result<Frame, TransportError> {
        let mut len_buf = [0u8; 4];
        self.reader.read_exact(&mut len_buf).await?;

        let len = u32::from_be_bytes(len_buf) as usize;
        if len > self.max_frame_size {
            return Err(TransportError::FrameTooLarge {
                size: len,
                max: self.max_frame_size,
            });
        }

        let mut buf = vec![0u8; len];
        self.reader.read_exact(&mut buf).await?;
        serde_json::from_slice(&buf).map_err(|e| TransportError::Decode(e.to_string()))
    }
}

#[async_trait]
impl FrameStream for TcpFrameStream {
    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>> {
        match self.read_frame().await {
            Ok(frame) => Some(Ok(frame)),
            Err(TransportError::Closed) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
