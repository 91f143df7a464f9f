//! Monitoring socket — a bare UNIX listener that answers every connection
//! with the literal bytes `{}` and closes it, used by orchestration tooling
//! as a liveness probe (§4.7).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::io::AsyncWriteExt;
use tokio::net::UnixListener;
use tokio::sync::broadcast;

const RESPONSE: &[u8] = b"{}";

pub struct Monitor {
    socket_path: PathBuf,
    listener: UnixListener,
    shutdown: broadcast::Receiver<()>,
}

impl Monitor {
    pub fn bind(socket_path: impl AsRef<Path>, shutdown: broadcast::Receiver<()>) -> Result<Self> {
        let socket_path = socket_path.as_ref().to_path_buf();
        let _ = std::fs::remove_file(&socket_path);
        let listener = UnixListener::bind(&socket_path)
            .with_context(|| format!("failed to bind monitor socket at {}", socket_path.display()))?;
        Ok(Self { socket_path, listener, shutdown })
    }

    /// Accepts connections until told to shut down, replying `{}` to each.
    /// A send error on one connection does not stop the loop; only
    /// shutdown does, matching `Monitor::HandleAccept`'s closed-acceptor
    /// check.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::debug!("monitor: closing acceptor");
                    break;
                }
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((mut stream, _)) => {
                            if let Err(e) = stream.write_all(RESPONSE).await {
                                tracing::warn!(error = %e, "monitor: failed to send monitoring data");
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "monitor: error accepting connection");
                        }
                    }
                }
            }
        }
        let _ = std::fs::remove_file(&self.socket_path);
    }
}
