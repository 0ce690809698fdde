//! Client session: login, distortion requests and logout.
//!
//! The coordinator connection is persistent.  Once the coordinator names a
//! worker, the worker exchange runs on its own task so the session can
//! accept the next command right away.

use std::path::Path;
use std::time::Duration;

use md5::{Digest, Md5};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use crate::category::Category;
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::frame::{Frame, FrameType};
use crate::payload::{ConnectRequest, DistortReply, DistortRequest, Payload, WorkerRequest, CON_KO};
use crate::registry::Endpoint;
use crate::state::ClientState;
use crate::transport::FrameStream;

/// Worker's answer to a `0x03` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerAck {
    Accepted,
    Rejected(String),
}

/// A worker exchange running in the background.
#[derive(Debug)]
pub struct WorkerExchange {
    pub worker: Endpoint,
    pub file_name: String,
    handle: JoinHandle<Result<WorkerAck>>,
}

impl WorkerExchange {
    /// Wait for the worker's answer.
    pub async fn wait(self) -> Result<WorkerAck> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(Error::Io(std::io::Error::other(e))),
        }
    }
}

const DIGEST_CHUNK: usize = 64 * 1024;

/// File facts sent along with a worker request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigest {
    pub size: u64,
    pub md5: String,
}

impl FileDigest {
    /// Hash the file at `path` in fixed-size chunks.
    pub async fn of(path: &Path) -> Result<Self> {
        let mut file = File::open(path).await?;
        let mut hasher = Md5::new();
        let mut buf = vec![0u8; DIGEST_CHUNK];
        let mut size = 0u64;
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            size += n as u64;
        }
        Ok(Self {
            size,
            md5: hex::encode(hasher.finalize()),
        })
    }

    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self {
            size: bytes.len() as u64,
            md5: hex::encode(Md5::digest(bytes)),
        }
    }
}

pub struct ClientSession {
    config: ClientConfig,
    state: ClientState,
    stream: Option<FrameStream<TcpStream>>,
    io_timeout: Option<Duration>,
}

impl ClientSession {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            state: ClientState::Disconnected,
            stream: None,
            io_timeout: None,
        }
    }

    /// Bound every frame read/write (coordinator and worker) by `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.io_timeout = timeout;
        self
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state != ClientState::Disconnected
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Log in to the coordinator with a `0x01` frame.
    pub async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Err(Error::AlreadyConnected);
        }

        let mut stream =
            FrameStream::connect(&self.config.coordinator_addr(), self.io_timeout).await?;
        let local = stream
            .local_addr()
            .ok_or_else(|| Error::Usage("socket has no local address".into()))?;
        let request = ConnectRequest {
            username: self.config.username.clone(),
            ip: local.ip().to_string(),
            port: local.port(),
        };
        let frame = Frame::new(FrameType::Connect, request.encode()?)?;
        let reply = stream.request(&frame).await?;

        match reply.frame_type {
            FrameType::Connect if reply.is_empty() => {
                log::info!(
                    "[client] {} connected to {}",
                    self.config.username,
                    self.config.coordinator_addr()
                );
                self.stream = Some(stream);
                self.state = ClientState::Connected;
                Ok(())
            }
            FrameType::Connect => Err(Error::Rejected(reply.text().into_owned())),
            FrameType::Error => Err(Error::Rejected(CON_KO.to_string())),
            other => Err(Error::ProtocolViolation {
                expected: FrameType::Connect,
                actual: other,
            }),
        }
    }

    /// Ask the coordinator for a worker and hand `file_name` to it.
    ///
    /// Returns once the coordinator has answered; the worker exchange
    /// continues on the returned [`WorkerExchange`].
    pub async fn distort(&mut self, file_name: &str, factor: &str) -> Result<WorkerExchange> {
        let category = Category::from_file_name(file_name).ok_or_else(|| {
            Error::Usage(format!("{file_name}: only .txt, .wav, .mp3, .jpg and .png files"))
        })?;
        if self.state != ClientState::Connected {
            return Err(Error::NotConnected);
        }
        let digest = FileDigest::of(&self.config.folder.join(file_name)).await?;

        let request = DistortRequest::new(category, file_name);
        let frame = Frame::new(FrameType::Distort, request.encode()?)?;
        self.state = ClientState::AwaitingWorkerRedirect;
        let sent = match self.stream.as_mut() {
            Some(stream) => stream.request(&frame).await,
            None => Err(Error::NotConnected),
        };
        let reply = match sent {
            Ok(reply) => reply,
            Err(e) => {
                self.drop_connection();
                return Err(e);
            }
        };
        self.state = ClientState::Connected;

        match reply.frame_type {
            FrameType::Distort => {}
            FrameType::Error => return Err(Error::Rejected("coordinator refused the request".into())),
            other => {
                return Err(Error::ProtocolViolation {
                    expected: FrameType::Distort,
                    actual: other,
                })
            }
        }
        let worker = match DistortReply::decode(&reply.data)? {
            DistortReply::Worker(endpoint) => endpoint,
            DistortReply::NoWorker => return Err(Error::NoWorkerAvailable(category)),
            DistortReply::UnknownMedia => return Err(Error::UnknownCategory),
        };
        log::info!("[client] {category} worker for {file_name} is {worker}");

        let request = WorkerRequest {
            username: self.config.username.clone(),
            file_name: file_name.to_string(),
            size: digest.size,
            md5: digest.md5,
            factor: factor.to_string(),
        };
        let handle = tokio::spawn(exchange(worker.clone(), request, self.io_timeout));
        Ok(WorkerExchange {
            worker,
            file_name: file_name.to_string(),
            handle,
        })
    }

    /// Send `0x07` and close the coordinator connection.
    pub async fn logout(&mut self) -> Result<()> {
        let Some(mut stream) = self.stream.take() else {
            self.state = ClientState::Disconnected;
            return Err(Error::NotConnected);
        };
        self.state = ClientState::Disconnected;

        let frame = Frame::new(FrameType::Disconnect, self.config.username.as_bytes().to_vec())?;
        stream.send(&frame).await?;
        let _ = stream.shutdown().await;
        log::info!("[client] {} logged out", self.config.username);
        Ok(())
    }

    fn drop_connection(&mut self) {
        self.stream = None;
        self.state = ClientState::Disconnected;
    }
}

/// One request/reply round with a worker on a fresh connection.
async fn exchange(
    worker: Endpoint,
    request: WorkerRequest,
    io_timeout: Option<Duration>,
) -> Result<WorkerAck> {
    let mut stream = FrameStream::connect(&worker.to_string(), io_timeout).await?;
    let frame = Frame::new(FrameType::WorkerRequest, request.encode()?)?;
    let reply = stream.request(&frame).await?;
    let _ = stream.shutdown().await;

    match reply.frame_type {
        FrameType::WorkerRequest if reply.is_empty() => Ok(WorkerAck::Accepted),
        FrameType::WorkerRequest => Ok(WorkerAck::Rejected(reply.text().into_owned())),
        other => Err(Error::ProtocolViolation {
            expected: FrameType::WorkerRequest,
            actual: other,
        }),
    }
}
