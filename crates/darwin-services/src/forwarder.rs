//! Downstream connector — delivers serialised packets to the next filter
//! over UNIX stream, TCP stream, or UDP datagram, with reconnect and retry
//! (§4.4).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket, UnixStream};
use tokio::sync::Mutex;

/// The forwarder's target address, resolved once at construction.
#[derive(Debug, Clone)]
pub enum Target {
    Unix(PathBuf),
    Tcp(SocketAddr),
    Udp(SocketAddr),
}

impl Target {
    /// `host:port` (or `[v6]:port`) parses as TCP/UDP per `is_udp`;
    /// anything else is a UNIX socket path, matching
    /// `Network::ParseSocketAddress`.
    pub fn parse(address: &str, is_udp: bool) -> Result<Self, ForwardError> {
        match address.rfind(':') {
            Some(colon) => {
                let mut host = &address[..colon];
                if host.starts_with('[') && host.ends_with(']') {
                    host = &host[1..host.len() - 1];
                }
                let port_str = &address[colon + 1..];
                let port: u16 = port_str
                    .parse()
                    .map_err(|_| ForwardError::InvalidAddress(format!("bad port in '{address}'")))?;
                let ip: std::net::IpAddr = host
                    .parse()
                    .map_err(|_| ForwardError::InvalidAddress(format!("bad host in '{address}'")))?;
                let addr = SocketAddr::new(ip, port);
                Ok(if is_udp { Target::Udp(addr) } else { Target::Tcp(addr) })
            }
            None => Ok(Target::Unix(PathBuf::from(address))),
        }
    }
}

enum Connection {
    None,
    Unix(UnixStream),
    Tcp(TcpStream),
    Udp(UdpSocket),
}

impl Connection {
    fn is_connected(&self) -> bool {
        !matches!(self, Connection::None)
    }

    async fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        match self {
            Connection::Unix(s) => s.write_all(buf).await,
            Connection::Tcp(s) => s.write_all(buf).await,
            Connection::Udp(s) => s.send(buf).await.map(|_| ()),
            Connection::None => Err(std::io::Error::new(std::io::ErrorKind::NotConnected, "not connected")),
        }
    }
}

struct State {
    connection: Connection,
    /// Consecutive connect failures since the last successful connect.
    /// Persists across `send` calls, matching `_nb_attempts` in the
    /// original: once it reaches `max_attempts` it stays exhausted, and
    /// every subsequent send gets exactly one more doomed attempt, until a
    /// connect finally succeeds and resets it to zero.
    attempts: u32,
}

/// Persistent client connection to the next filter. A single async mutex
/// around the connection serialises writes, matching the spec's "forwarder
/// writes are serialised per forwarder instance" guarantee — there is never
/// more than one in-flight write on the same stream socket.
pub struct Forwarder {
    target: Target,
    max_attempts: u32,
    attempts_delay: Duration,
    state: Mutex<State>,
    pending: AtomicUsize,
}

impl Forwarder {
    pub fn new(target: Target, max_attempts: u32, attempts_delay: Duration) -> Self {
        Self {
            target,
            max_attempts,
            attempts_delay,
            state: Mutex::new(State { connection: Connection::None, attempts: 0 }),
            pending: AtomicUsize::new(0),
        }
    }

    /// Number of sends currently in flight. Exposed for tests and monitoring
    /// only — the forwarder itself never inspects this.
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Relaxed)
    }

    /// Attempt to deliver `buf` to the next filter. Never returns an error:
    /// failures are logged and the buffer is dropped per §4.4 step 2.
    pub async fn send(&self, buf: &[u8]) {
        self.pending.fetch_add(1, Ordering::Relaxed);
        let mut state = self.state.lock().await;
        self.send_locked(&mut state, buf).await;
        self.pending.fetch_sub(1, Ordering::Relaxed);
    }

    async fn send_locked(&self, state: &mut State, buf: &[u8]) {
        let is_udp = matches!(self.target, Target::Udp(_));

        loop {
            if !state.connection.is_connected() {
                loop {
                    match self.connect().await {
                        Ok(conn) => {
                            state.connection = conn;
                            state.attempts = 0;
                            tracing::debug!(target = ?self.target, "forwarder: connected");
                            break;
                        }
                        Err(e) => {
                            state.attempts += 1;
                            tracing::warn!(target = ?self.target, error = %e, attempts = state.attempts, "forwarder: connect failed");
                            if state.attempts >= self.max_attempts {
                                tracing::error!(target = ?self.target, "forwarder: dropping packet, max connect attempts reached");
                                return;
                            }
                            tokio::time::sleep(self.attempts_delay).await;
                        }
                    }
                }
            }

            match state.connection.write_all(buf).await {
                Ok(()) => {
                    state.attempts = 0;
                    return;
                }
                Err(e) => {
                    tracing::warn!(target = ?self.target, error = %e, "forwarder: send failed");
                    state.connection = Connection::None;
                    if is_udp {
                        // UDP gets no write-retry beyond the initial connect loop.
                        tracing::error!(target = ?self.target, "forwarder: dropping UDP packet after send error");
                        return;
                    }
                    // Resubmit through the connect step above.
                }
            }
        }
    }

    async fn connect(&self) -> std::io::Result<Connection> {
        match &self.target {
            Target::Unix(path) => UnixStream::connect(path).await.map(Connection::Unix),
            Target::Tcp(addr) => TcpStream::connect(addr).await.map(Connection::Tcp),
            Target::Udp(addr) => {
                let bind_addr: SocketAddr = if addr.is_ipv6() { "[::]:0".parse().unwrap() } else { "0.0.0.0:0".parse().unwrap() };
                let socket = UdpSocket::bind(bind_addr).await?;
                socket.connect(addr).await?;
                Ok(Connection::Udp(socket))
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("invalid forwarder address: {0}")]
    InvalidAddress(String),
}
