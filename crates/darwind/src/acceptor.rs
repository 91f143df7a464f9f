//! Listening socket — accepts one connection per session on a UNIX stream
//! or TCP socket, generalized from `listen_address` per §6. Sessions are
//! tracked in a `JoinSet` so shutdown can wait for in-flight connections to
//! finish before returning, per §5's graceful-shutdown contract.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use anyhow::{Context as _, Result};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream, UnixListener, UnixStream};
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinSet;

use darwin_core::wire::DecodeLimits;
use darwin_services::Classifier;
use darwin_services::TaskContext;

use crate::session::Session;

/// One accepted connection, dispatched to without caring which transport it
/// came in on.
pub enum Stream {
    Unix(UnixStream),
    Tcp(TcpStream),
}

impl AsyncRead for Stream {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Stream::Unix(s) => Pin::new(s).poll_read(cx, buf),
            Stream::Tcp(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Stream {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            Stream::Unix(s) => Pin::new(s).poll_write(cx, buf),
            Stream::Tcp(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Stream::Unix(s) => Pin::new(s).poll_flush(cx),
            Stream::Tcp(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Stream::Unix(s) => Pin::new(s).poll_shutdown(cx),
            Stream::Tcp(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

enum RawListener {
    Unix(UnixListener),
    Tcp(TcpListener),
}

/// `host:port` binds TCP; anything else is a UNIX socket path, matching the
/// forwarder's own address convention (§4.4). UDP listening sockets are not
/// implemented: `CoreArgs` carries no flag to select datagram mode for the
/// primary listen socket, only for the next-filter address.
pub struct Acceptor {
    listener: RawListener,
    unix_path: Option<PathBuf>,
    classifier: Arc<dyn Classifier>,
    ctx: Arc<TaskContext>,
    pool: Arc<Semaphore>,
    limits: DecodeLimits,
    shutdown: broadcast::Receiver<()>,
}

impl Acceptor {
    pub async fn bind(
        address: &str,
        classifier: Arc<dyn Classifier>,
        ctx: Arc<TaskContext>,
        pool: Arc<Semaphore>,
        limits: DecodeLimits,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<Self> {
        let (listener, unix_path) = match address.parse::<SocketAddr>() {
            Ok(addr) => {
                let listener = TcpListener::bind(addr)
                    .await
                    .with_context(|| format!("binding tcp listen socket {address}"))?;
                (RawListener::Tcp(listener), None)
            }
            Err(_) => {
                let path = PathBuf::from(address);
                let _ = std::fs::remove_file(&path);
                let listener = UnixListener::bind(&path)
                    .with_context(|| format!("binding unix listen socket {}", path.display()))?;
                (RawListener::Unix(listener), Some(path))
            }
        };

        Ok(Self { listener, unix_path, classifier, ctx, pool, limits, shutdown })
    }

    /// Accepts connections until shutdown, spawning one session task per
    /// connection. Waits for every spawned session to finish before
    /// returning, so in-flight requests survive a shutdown signal.
    pub async fn run(mut self) {
        let mut sessions = JoinSet::new();

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("acceptor: closing, waiting for in-flight sessions");
                    break;
                }
                accepted = Self::accept(&self.listener) => {
                    match accepted {
                        Ok(stream) => {
                            let session = Session::new(
                                stream,
                                self.classifier.clone(),
                                self.ctx.clone(),
                                self.pool.clone(),
                                self.limits,
                            );
                            sessions.spawn(session.run());
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "acceptor: error accepting connection");
                        }
                    }
                }
            }
        }

        while sessions.join_next().await.is_some() {}

        if let Some(path) = &self.unix_path {
            let _ = std::fs::remove_file(path);
        }
    }

    async fn accept(listener: &RawListener) -> std::io::Result<Stream> {
        match listener {
            RawListener::Unix(l) => l.accept().await.map(|(s, _)| Stream::Unix(s)),
            RawListener::Tcp(l) => l.accept().await.map(|(s, _)| Stream::Tcp(s)),
        }
    }
}
