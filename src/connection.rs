// ABOUTME: Provides TCP connection management for CMPP protocol communication
// ABOUTME: Implements frame-based I/O with buffering; frame widths follow the negotiated version

use crate::codec::{CodecError, Frame, RawFrame};
use crate::datatypes::ProtocolVersion;
use bytes::BytesMut;
use std::io;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("connection reset by peer")]
    ResetByPeer,
}

/// Read buffer size. CMPP frames are small (512 bytes max by default).
const READ_BUFFER_CAPACITY: usize = 4 * 1024;

/// Pull bytes from `reader` until one whole frame can be cut from `buffer`.
///
/// `Ok(None)` means the peer closed the stream on a frame boundary. Closing
/// mid-frame is [`ConnectionError::ResetByPeer`].
async fn read_raw_from<R>(
    reader: &mut R,
    buffer: &mut BytesMut,
    max_frame_length: u32,
) -> Result<Option<RawFrame>, ConnectionError>
where
    R: AsyncRead + Unpin,
{
    loop {
        if let Some(frame) = RawFrame::split_from(buffer, max_frame_length)? {
            return Ok(Some(frame));
        }

        // `0` indicates "end of stream"
        if 0 == reader.read_buf(buffer).await? {
            return if buffer.is_empty() {
                Ok(None)
            } else {
                Err(ConnectionError::ResetByPeer)
            };
        }
    }
}

/// Read side of a split socket, used by the gateway's per-connection reader task
#[derive(Debug)]
pub struct FrameReader<R> {
    reader: R,
    buffer: BytesMut,
    max_frame_length: u32,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R, max_frame_length: u32) -> Self {
        Self {
            reader,
            buffer: BytesMut::with_capacity(READ_BUFFER_CAPACITY),
            max_frame_length,
        }
    }

    /// Next complete frame, undecoded
    pub async fn read_raw(&mut self) -> Result<Option<RawFrame>, ConnectionError> {
        read_raw_from(&mut self.reader, &mut self.buffer, self.max_frame_length).await
    }
}

/// CMPP connection over one TCP stream.
///
/// Handles frame-based I/O only; the session state machine (login, heartbeat,
/// terminate) lives with the caller. The protocol version decides field widths
/// for every frame read or written and may be changed after login.
#[derive(Debug)]
pub struct Connection {
    // Write-buffered so a frame goes out in a single flush
    stream: BufWriter<TcpStream>,

    buffer: BytesMut,

    version: ProtocolVersion,

    max_frame_length: u32,
}

impl Connection {
    pub fn new(socket: TcpStream, version: ProtocolVersion, max_frame_length: u32) -> Connection {
        Connection {
            stream: BufWriter::new(socket),
            buffer: BytesMut::with_capacity(READ_BUFFER_CAPACITY),
            version,
            max_frame_length,
        }
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    /// Read the next complete frame without decoding its body
    pub async fn read_raw(&mut self) -> Result<Option<RawFrame>, ConnectionError> {
        read_raw_from(&mut self.stream, &mut self.buffer, self.max_frame_length).await
    }

    /// Read a single `Frame` value from the underlying stream.
    ///
    /// Waits until enough data is buffered to parse a frame; anything left in
    /// the buffer is kept for the next call. Returns `None` when the peer
    /// closed the stream cleanly.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>, ConnectionError> {
        match self.read_raw().await? {
            Some(raw) => Ok(Some(raw.decode(self.version)?)),
            None => Ok(None),
        }
    }

    /// Encode and write a single `Frame`, then flush
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<(), ConnectionError> {
        let bytes = frame.to_bytes(self.version)?;
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Flush and close the write side
    pub async fn shutdown(&mut self) -> Result<(), ConnectionError> {
        self.stream.flush().await?;
        self.stream.shutdown().await?;
        Ok(())
    }
}
