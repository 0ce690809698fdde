//! Worker process: registers with the coordinator, then serves clients.
//!
//! The distortion itself is simulated: a well-formed `0x03` request is
//! acknowledged immediately with an empty `0x03` frame.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::category::Category;
use crate::config::WorkerConfig;
use crate::error::{Error, Result, TransportError};
use crate::frame::{Frame, FrameType, FRAME_SIZE};
use crate::payload::{Payload, WorkerRegistration, WorkerRequest, CON_KO};
use crate::registry::Endpoint;
use crate::transport::FrameStream;

/// Pause after a failed `accept` (e.g. out of file descriptors).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// A registered worker, ready to accept client connections.
pub struct WorkerSession {
    category: Category,
    advertised: Endpoint,
    listener: TcpListener,
    coordinator: FrameStream<TcpStream>,
    io_timeout: Option<Duration>,
}

impl WorkerSession {
    /// Bind the client-facing listener, then register with the coordinator.
    ///
    /// The listener is bound first so the advertised port is already
    /// accepting when the coordinator starts handing it out.
    pub async fn start(config: &WorkerConfig, io_timeout: Option<Duration>) -> Result<Self> {
        let bind_addr = format!("0.0.0.0:{}", config.port);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|source| Error::Bind {
                addr: bind_addr,
                source,
            })?;
        let port = listener.local_addr()?.port();
        let advertised = Endpoint::new(config.ip.clone(), port);

        let mut coordinator =
            FrameStream::connect(&config.coordinator_addr(), io_timeout).await?;
        let registration = WorkerRegistration {
            category: config.category,
            ip: advertised.ip.clone(),
            port,
        };
        let request = Frame::new(FrameType::WorkerConnect, registration.encode()?)?;
        let reply = coordinator.request(&request).await?;
        match reply.frame_type {
            FrameType::WorkerConnect => {}
            FrameType::Error => {
                return Err(Error::Rejected("coordinator refused the registration".into()))
            }
            other => {
                return Err(Error::ProtocolViolation {
                    expected: FrameType::WorkerConnect,
                    actual: other,
                })
            }
        }
        log::info!(
            "[worker] registered as {} worker at {advertised} with {}",
            config.category,
            config.coordinator_addr()
        );

        Ok(Self {
            category: config.category,
            advertised,
            listener,
            coordinator,
            io_timeout,
        })
    }

    pub fn category(&self) -> Category {
        self.category
    }

    /// Endpoint sent to the coordinator.
    pub fn advertised(&self) -> &Endpoint {
        &self.advertised
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve clients until `shutdown` flips, then tell the coordinator.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        log::info!("[worker] waiting for distortion requests on {}", self.advertised);
        let mut clients = JoinSet::new();

        while !*shutdown.borrow() {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((socket, peer)) => {
                        log::info!("[worker] accepted connection from {peer}");
                        let stream = FrameStream::new(socket).with_timeout(self.io_timeout);
                        clients.spawn(serve_client(stream, peer));
                    }
                    Err(e) => {
                        log::warn!("[worker] accept failed: {e}");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
                Some(done) = clients.join_next(), if !clients.is_empty() => {
                    if let Err(e) = done {
                        log::warn!("[worker] client task failed: {e}");
                    }
                }
            }
        }

        clients.shutdown().await;
        self.disconnect().await
    }

    async fn disconnect(&mut self) -> Result<()> {
        let notice = Frame::new(FrameType::Disconnect, self.category.as_str().as_bytes().to_vec())?;
        self.coordinator.send(&notice).await?;
        let _ = self.coordinator.shutdown().await;
        log::info!("[worker] disconnected from coordinator");
        Ok(())
    }
}

/// Answer one client connection with exactly one frame.
pub async fn serve_client<S>(mut stream: FrameStream<S>, peer: SocketAddr)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let raw = match stream.recv_raw().await {
        Ok(raw) => raw,
        Err(TransportError::PeerClosed) => {
            log::debug!("[worker] {peer} closed before sending a frame");
            return;
        }
        Err(e) => {
            log::warn!("[worker] {peer}: {e}");
            return;
        }
    };
    let reply = respond(&raw);
    if let Err(e) = stream.send(&reply).await {
        log::warn!("[worker] {peer}: {e}");
    }
}

/// Build the reply for one raw request frame.
pub fn respond(raw: &[u8; FRAME_SIZE]) -> Frame {
    let frame = match Frame::decode(raw) {
        Ok(frame) => frame,
        Err(e) => {
            log::warn!("[worker] {e}");
            return Frame::error();
        }
    };
    if let Err(e) = frame.verify() {
        log::warn!("[worker] {e}");
        return Frame::error();
    }
    if frame.frame_type != FrameType::WorkerRequest {
        log::warn!("[worker] unexpected frame type {}", frame.frame_type);
        return Frame::error();
    }

    match WorkerRequest::decode(&frame.data) {
        Ok(req) => {
            log::info!(
                "[worker] distorting {} for {} ({} bytes, md5 {}, factor {})",
                req.file_name,
                req.username,
                req.size,
                req.md5,
                req.factor
            );
            Frame::empty(FrameType::WorkerRequest)
        }
        Err(e) => {
            log::warn!("[worker] rejecting request {:?}: {e}", frame.text());
            Frame::new(FrameType::WorkerRequest, CON_KO.as_bytes().to_vec())
                .unwrap_or_else(|_| Frame::error())
        }
    }
}
