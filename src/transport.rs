//! Frame-oriented stream transport.
//!
//! [`FrameStream`] is a thin wrapper around any async byte stream (a
//! `tokio::net::TcpStream` in production, an in-memory duplex in tests) that
//! speaks [`Frame`]s instead of raw bytes.  Every exchange is exactly one
//! [`FRAME_SIZE`]-byte write or read; partial frames never reach callers.
//!
//! Protocol logic lives elsewhere; this module owns only byte I/O.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::{Error, TransportError};
use crate::frame::{Frame, FRAME_SIZE};

/// Write every byte of `buf`, looping over short writes.
pub async fn write_all<W>(writer: &mut W, buf: &[u8]) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    let mut sent = 0;
    while sent < buf.len() {
        match writer.write(&buf[sent..]).await {
            Ok(0) => return Err(TransportError::WriteZero),
            Ok(n) => sent += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(TransportError::Write(e)),
        }
    }
    writer.flush().await.map_err(TransportError::Write)
}

/// Fill `buf` completely.
///
/// A zero-byte read means the peer closed its side and is reported as
/// [`TransportError::PeerClosed`], distinct from a genuine read error.
pub async fn read_all<R>(reader: &mut R, buf: &mut [u8]) -> Result<(), TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await {
            Ok(0) => return Err(TransportError::PeerClosed),
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(TransportError::Read(e)),
        }
    }
    Ok(())
}

/// A stream that carries whole frames.
#[derive(Debug)]
pub struct FrameStream<S> {
    inner: S,
    io_timeout: Option<Duration>,
}

impl FrameStream<TcpStream> {
    /// Open a TCP connection to `addr` (`"host:port"`).
    pub async fn connect(addr: &str, io_timeout: Option<Duration>) -> Result<Self, TransportError> {
        let connect = TcpStream::connect(addr);
        let stream = with_deadline(io_timeout, async {
            connect.await.map_err(|source| TransportError::Connect {
                addr: addr.to_string(),
                source,
            })
        })
        .await?;
        // Frames are small and latency-bound.
        let _ = stream.set_nodelay(true);
        Ok(Self::new(stream).with_timeout(io_timeout))
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.inner.peer_addr().ok()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.local_addr().ok()
    }
}

impl<S> FrameStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            io_timeout: None,
        }
    }

    /// Bound every subsequent read and write by `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Encode and send one frame.
    pub async fn send(&mut self, frame: &Frame) -> Result<(), TransportError> {
        let buf = frame.encode();
        let timeout = self.io_timeout;
        with_deadline(timeout, write_all(&mut self.inner, &buf)).await
    }

    /// Read exactly one frame's worth of bytes without interpreting them.
    pub async fn recv_raw(&mut self) -> Result<[u8; FRAME_SIZE], TransportError> {
        let mut buf = [0u8; FRAME_SIZE];
        let timeout = self.io_timeout;
        with_deadline(timeout, read_all(&mut self.inner, &mut buf)).await?;
        Ok(buf)
    }

    /// Wait as long as it takes for the next frame to start, then read the
    /// rest of it under the deadline.
    ///
    /// For server loops on persistent connections, where a peer may stay
    /// silent between frames for any length of time.
    pub async fn next_raw(&mut self) -> Result<[u8; FRAME_SIZE], TransportError> {
        let mut buf = [0u8; FRAME_SIZE];
        read_all(&mut self.inner, &mut buf[..1]).await?;
        let timeout = self.io_timeout;
        with_deadline(timeout, read_all(&mut self.inner, &mut buf[1..])).await?;
        Ok(buf)
    }

    /// Read, decode and checksum-verify one frame.
    pub async fn recv(&mut self) -> Result<Frame, Error> {
        let buf = self.recv_raw().await?;
        let frame = Frame::decode(&buf)?;
        frame.verify()?;
        Ok(frame)
    }

    /// Send `request` and wait for the single reply.
    pub async fn request(&mut self, request: &Frame) -> Result<Frame, Error> {
        self.send(request).await?;
        self.recv().await
    }

    /// Flush and shut down the write half.
    pub async fn shutdown(&mut self) -> Result<(), TransportError> {
        self.inner.shutdown().await.map_err(TransportError::Write)
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

async fn with_deadline<T, F>(timeout: Option<Duration>, fut: F) -> Result<T, TransportError>
where
    F: Future<Output = Result<T, TransportError>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .unwrap_or(Err(TransportError::Timeout(limit))),
        None => fut.await,
    }
}
