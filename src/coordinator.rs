//! Coordinator: accepts clients and workers, routes distortion requests.
//!
//! # Per-connection state machine
//!
//! ```text
//!  AWAIT_FRAME ──256 bytes──▶ VALIDATE ──ok──▶ DISPATCH ──reply──▶ AWAIT_FRAME
//!      │                        │   │              │
//!      │ peer closed / error    │   │ bad length   │ 0x07 disconnect
//!      ▼                        │   └─▶ 0x09, back to AWAIT_FRAME
//!   CLOSED ◀── 0x09 ◀── bad checksum                ▼
//!                                                  CLOSED
//! ```
//!
//! Connections are persistent: a socket carries any number of frames until
//! the peer disconnects.  Every accepted socket runs on its own task; the
//! only state shared between tasks is the [`WorkerRegistry`].

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::category::Category;
use crate::config::CoordinatorOptions;
use crate::error::{Error, Result, TransportError};
use crate::frame::{Frame, FrameType};
use crate::payload::{
    ConnectRequest, DistortReply, DistortRequest, Payload, WorkerRegistration, CON_KO,
};
use crate::registry::{Endpoint, WorkerRegistry};
use crate::transport::FrameStream;

/// Who is on the other end of a connection, learned from its frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    User(String),
    Worker(Category),
}

/// Per-connection memory.
#[derive(Debug, Default)]
pub struct Session {
    identity: Option<Identity>,
    registered: Option<(Category, Endpoint)>,
}

impl Session {
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Called once when the connection ends, however it ends.
    fn finish(&mut self, registry: &WorkerRegistry, options: &CoordinatorOptions) {
        if !options.clear_on_disconnect {
            return;
        }
        if let Some((category, endpoint)) = self.registered.take() {
            if registry.clear_if(category, &endpoint) {
                log::info!("[coordinator] {category} worker at {endpoint} is no longer available");
            }
        }
    }
}

/// What the connection loop should do after a frame is dispatched.
#[derive(Debug, PartialEq, Eq)]
pub enum Action {
    Reply(Frame),
    Close,
}

/// Route one validated frame.
///
/// Pure apart from the registry, whose lock is taken and released inside the
/// call; no I/O happens here.
pub fn dispatch(frame: &Frame, session: &mut Session, registry: &WorkerRegistry) -> Action {
    match frame.frame_type {
        FrameType::Connect => handle_connect(frame, session),
        FrameType::WorkerConnect => handle_worker_connect(frame, session, registry),
        FrameType::Distort => handle_distort(frame, registry),
        FrameType::Disconnect => {
            log::info!(
                "[coordinator] disconnect from {} ({:?})",
                frame.text(),
                session.identity
            );
            Action::Close
        }
        other => {
            log::warn!("[coordinator] unexpected frame type {other}");
            Action::Reply(Frame::error())
        }
    }
}

fn handle_connect(frame: &Frame, session: &mut Session) -> Action {
    match ConnectRequest::decode(&frame.data) {
        Ok(req) => {
            log::info!(
                "[coordinator] new user connected: {} ({}:{})",
                req.username,
                req.ip,
                req.port
            );
            session.identity = Some(Identity::User(req.username));
            Action::Reply(Frame::empty(FrameType::Connect))
        }
        Err(e) => {
            log::warn!("[coordinator] invalid connect payload {:?}: {e}", frame.text());
            Action::Reply(text_reply(FrameType::Connect, CON_KO))
        }
    }
}

fn handle_worker_connect(frame: &Frame, session: &mut Session, registry: &WorkerRegistry) -> Action {
    let reg = match WorkerRegistration::decode(&frame.data) {
        Ok(reg) => reg,
        Err(e) => {
            log::warn!("[coordinator] invalid worker registration {:?}: {e}", frame.text());
            return Action::Reply(Frame::error());
        }
    };

    let endpoint = Endpoint::new(reg.ip, reg.port);
    let previous = registry.register(reg.category, endpoint.clone());
    match previous {
        Some(old) if old.endpoint != endpoint => log::info!(
            "[coordinator] {} worker at {endpoint} replaces {}",
            reg.category,
            old.endpoint
        ),
        _ => log::info!(
            "[coordinator] new {} worker connected at {endpoint}, ready to distort",
            reg.category
        ),
    }
    session.identity = Some(Identity::Worker(reg.category));
    session.registered = Some((reg.category, endpoint));
    Action::Reply(Frame::empty(FrameType::WorkerConnect))
}

fn handle_distort(frame: &Frame, registry: &WorkerRegistry) -> Action {
    let req = match DistortRequest::decode(&frame.data) {
        Ok(req) => req,
        Err(e) => {
            log::warn!("[coordinator] invalid distortion request {:?}: {e}", frame.text());
            return Action::Reply(Frame::error());
        }
    };

    let reply = match req.category() {
        Err(_) => DistortReply::UnknownMedia,
        Ok(category) => match registry.lookup(category) {
            Some(endpoint) => DistortReply::Worker(endpoint),
            None => DistortReply::NoWorker,
        },
    };
    log::info!(
        "[coordinator] distortion of {} ({}) -> {reply:?}",
        req.file_name,
        req.media_type
    );

    match reply.encode() {
        Ok(data) => match Frame::new(FrameType::Distort, data) {
            Ok(frame) => Action::Reply(frame),
            Err(e) => {
                log::warn!("[coordinator] cannot frame distortion reply: {e}");
                Action::Reply(Frame::error())
            }
        },
        Err(e) => {
            log::warn!("[coordinator] cannot encode distortion reply: {e}");
            Action::Reply(Frame::error())
        }
    }
}

fn text_reply(frame_type: FrameType, text: &str) -> Frame {
    Frame::new(frame_type, text.as_bytes().to_vec()).unwrap_or_else(|_| Frame::error())
}

/// Drive one accepted connection until it closes.
pub async fn serve_connection<S>(
    mut stream: FrameStream<S>,
    peer: SocketAddr,
    registry: WorkerRegistry,
    options: CoordinatorOptions,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut session = Session::default();

    loop {
        let raw = match stream.next_raw().await {
            Ok(raw) => raw,
            Err(TransportError::PeerClosed) => {
                log::debug!("[coordinator] {peer} closed the connection");
                break;
            }
            Err(e) => {
                log::warn!("[coordinator] {peer}: {e}");
                break;
            }
        };

        let frame = match Frame::decode(&raw) {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("[coordinator] {peer}: {e}");
                if let Err(e) = stream.send(&Frame::error()).await {
                    log::warn!("[coordinator] {peer}: {e}");
                    break;
                }
                continue;
            }
        };
        log::debug!(
            "[coordinator] ← {} len={} checksum={:#06x} from {peer}",
            frame.frame_type,
            frame.data_len(),
            frame.checksum
        );

        if let Err(e) = frame.verify() {
            log::warn!("[coordinator] {peer}: {e}; closing");
            let _ = stream.send(&Frame::error()).await;
            break;
        }

        match dispatch(&frame, &mut session, &registry) {
            Action::Reply(reply) => {
                if let Err(e) = stream.send(&reply).await {
                    log::warn!("[coordinator] {peer}: {e}");
                    break;
                }
            }
            Action::Close => break,
        }
    }

    session.finish(&registry, &options);
}

/// Pause after a failed `accept` (e.g. out of file descriptors).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// The coordinator server.
pub struct Coordinator {
    listeners: Vec<TcpListener>,
    registry: WorkerRegistry,
    options: CoordinatorOptions,
}

impl Coordinator {
    /// Bind every address in `addrs` (`"ip:port"`, port `0` for ephemeral).
    pub async fn bind<A: AsRef<str>>(addrs: &[A], options: CoordinatorOptions) -> Result<Self> {
        let mut listeners = Vec::with_capacity(addrs.len());
        for addr in addrs {
            let addr = addr.as_ref();
            let listener = TcpListener::bind(addr).await.map_err(|source| Error::Bind {
                addr: addr.to_string(),
                source,
            })?;
            listeners.push(listener);
        }
        Ok(Self {
            listeners,
            registry: WorkerRegistry::new(),
            options,
        })
    }

    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.listeners
            .iter()
            .filter_map(|l| l.local_addr().ok())
            .collect()
    }

    /// Handle to the shared registry.
    pub fn registry(&self) -> WorkerRegistry {
        self.registry.clone()
    }

    /// Serve until `shutdown` flips to `true` (or its sender is dropped).
    ///
    /// Connection tasks still running at shutdown are aborted.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut loops = JoinSet::new();
        for listener in self.listeners {
            if let Ok(addr) = listener.local_addr() {
                log::info!("[coordinator] listening on {addr}");
            }
            loops.spawn(accept_loop(
                listener,
                self.registry.clone(),
                self.options,
                shutdown.clone(),
            ));
        }
        while let Some(done) = loops.join_next().await {
            if let Err(e) = done {
                log::warn!("[coordinator] accept loop failed: {e}");
            }
        }
        log::info!("[coordinator] stopped");
        Ok(())
    }
}

async fn accept_loop(
    listener: TcpListener,
    registry: WorkerRegistry,
    options: CoordinatorOptions,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut connections = JoinSet::new();

    while !*shutdown.borrow() {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            accepted = listener.accept() => match accepted {
                Ok((socket, peer)) => {
                    log::info!("[coordinator] new connection from {peer}");
                    let _ = socket.set_nodelay(true);
                    let stream = FrameStream::new(socket).with_timeout(options.io_timeout);
                    connections.spawn(serve_connection(stream, peer, registry.clone(), options));
                }
                Err(e) => {
                    log::warn!("[coordinator] accept failed: {e}");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
            Some(done) = connections.join_next(), if !connections.is_empty() => {
                if let Err(e) = done {
                    log::warn!("[coordinator] connection task failed: {e}");
                }
            }
        }
    }

    connections.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{DISTORT_KO, MEDIA_KO};
    use tokio::io::{duplex, AsyncWriteExt};

    fn frame(t: FrameType, data: &str) -> Frame {
        Frame::new(t, data.as_bytes().to_vec()).unwrap()
    }

    fn reply(action: Action) -> Frame {
        match action {
            Action::Reply(f) => f,
            Action::Close => panic!("expected a reply, got Close"),
        }
    }

    #[test]
    fn connect_acknowledged_with_empty_payload() {
        let registry = WorkerRegistry::new();
        let mut session = Session::default();
        let out = reply(dispatch(
            &frame(FrameType::Connect, "alice&127.0.0.1&9000"),
            &mut session,
            &registry,
        ));
        assert_eq!(out.frame_type, FrameType::Connect);
        assert!(out.is_empty());
        assert_eq!(session.identity(), Some(&Identity::User("alice".into())));
    }

    #[test]
    fn bad_connect_payload_gets_con_ko() {
        let registry = WorkerRegistry::new();
        let out = reply(dispatch(
            &frame(FrameType::Connect, "alice-only"),
            &mut Session::default(),
            &registry,
        ));
        assert_eq!(out.frame_type, FrameType::Connect);
        assert_eq!(out.data, CON_KO.as_bytes());
    }

    #[test]
    fn worker_registration_updates_registry() {
        let registry = WorkerRegistry::new();
        let mut session = Session::default();
        let out = reply(dispatch(
            &frame(FrameType::WorkerConnect, "Text&10.0.0.5&7000"),
            &mut session,
            &registry,
        ));
        assert_eq!(out.frame_type, FrameType::WorkerConnect);
        assert!(out.is_empty());
        assert_eq!(
            registry.lookup(Category::Text),
            Some(Endpoint::new("10.0.0.5", 7000))
        );
    }

    #[test]
    fn bad_worker_registration_gets_error_frame() {
        let registry = WorkerRegistry::new();
        for payload in ["Text&10.0.0.5", "Video&10.0.0.5&7000", "Text&10.0.0.5&0"] {
            let out = reply(dispatch(
                &frame(FrameType::WorkerConnect, payload),
                &mut Session::default(),
                &registry,
            ));
            assert_eq!(out.frame_type, FrameType::Error, "{payload}");
        }
        assert_eq!(registry.snapshot(), vec![None, None]);
    }

    #[test]
    fn distort_routes_by_category() {
        let registry = WorkerRegistry::new();
        registry.register(Category::Media, Endpoint::new("10.0.0.6", 7001));
        let mut session = Session::default();

        let text = reply(dispatch(&frame(FrameType::Distort, "Text&notes.txt"), &mut session, &registry));
        assert_eq!(text.data, DISTORT_KO.as_bytes());

        let media = reply(dispatch(&frame(FrameType::Distort, "Media&song.mp3"), &mut session, &registry));
        assert_eq!(media.frame_type, FrameType::Distort);
        assert_eq!(media.data, b"10.0.0.6&7001");

        let video = reply(dispatch(&frame(FrameType::Distort, "Video&clip.mp4"), &mut session, &registry));
        assert_eq!(video.data, MEDIA_KO.as_bytes());
    }

    #[test]
    fn distort_without_file_name_gets_error_frame() {
        let out = reply(dispatch(
            &frame(FrameType::Distort, "Text"),
            &mut Session::default(),
            &WorkerRegistry::new(),
        ));
        assert_eq!(out.frame_type, FrameType::Error);
    }

    #[test]
    fn disconnect_closes_without_touching_registry() {
        let registry = WorkerRegistry::new();
        let mut session = Session::default();
        dispatch(&frame(FrameType::WorkerConnect, "Media&10.0.0.6&7001"), &mut session, &registry);
        assert_eq!(
            dispatch(&frame(FrameType::Disconnect, "Media"), &mut session, &registry),
            Action::Close
        );
        session.finish(&registry, &CoordinatorOptions::default());
        assert!(registry.lookup(Category::Media).is_some());
    }

    #[test]
    fn clear_on_disconnect_releases_own_slot() {
        let registry = WorkerRegistry::new();
        let options = CoordinatorOptions {
            clear_on_disconnect: true,
            ..Default::default()
        };
        let mut session = Session::default();
        dispatch(&frame(FrameType::WorkerConnect, "Media&10.0.0.6&7001"), &mut session, &registry);
        dispatch(&frame(FrameType::Disconnect, "Media"), &mut session, &registry);
        session.finish(&registry, &options);
        assert_eq!(registry.lookup(Category::Media), None);
    }

    #[test]
    fn unknown_types_get_error_frame() {
        for t in [FrameType::Unknown(0x42), FrameType::Error, FrameType::WorkerRequest] {
            let out = reply(dispatch(&frame(t, ""), &mut Session::default(), &WorkerRegistry::new()));
            assert_eq!(out.frame_type, FrameType::Error);
            assert!(out.is_empty());
        }
    }

    #[tokio::test]
    async fn malformed_frame_keeps_connection_open() {
        let (a, b) = duplex(4096);
        let registry = WorkerRegistry::new();
        let peer: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let server = tokio::spawn(serve_connection(
            FrameStream::new(b),
            peer,
            registry.clone(),
            CoordinatorOptions::default(),
        ));

        let mut a = a;
        let mut bad = frame(FrameType::Connect, "x").encode();
        bad[1] = 0xff;
        bad[2] = 0xff;
        a.write_all(&bad).await.unwrap();
        let mut client = FrameStream::new(a);
        assert_eq!(client.recv().await.unwrap().frame_type, FrameType::Error);

        // Still serving on the same connection.
        let ok = client
            .request(&frame(FrameType::Connect, "alice&127.0.0.1&9000"))
            .await
            .unwrap();
        assert_eq!(ok.frame_type, FrameType::Connect);
        assert!(ok.is_empty());

        drop(client);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn checksum_mismatch_closes_connection() {
        let (a, b) = duplex(4096);
        let server = tokio::spawn(serve_connection(
            FrameStream::new(b),
            "127.0.0.1:1".parse().unwrap(),
            WorkerRegistry::new(),
            CoordinatorOptions::default(),
        ));

        let mut a = a;
        let mut bad = frame(FrameType::Connect, "alice&127.0.0.1&9000").encode();
        bad[4] ^= 0x20;
        a.write_all(&bad).await.unwrap();
        let mut client = FrameStream::new(a);
        assert_eq!(client.recv().await.unwrap().frame_type, FrameType::Error);

        server.await.unwrap();
        assert!(matches!(
            client.recv_raw().await,
            Err(TransportError::PeerClosed)
        ));
    }
}
