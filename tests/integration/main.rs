//! Darwin integration test harness.
//!
//! These tests spawn the real `darwind` binary and drive it over its actual
//! UNIX-socket interfaces (packet socket + monitor socket), per §10.4.
//! Daemon tests run serialized via DAEMON_LOCK since they bind fixed paths
//! under the system temp directory.
//!
//!   cargo build -p darwind
//!   cargo test --test integration

#![allow(clippy::zombie_processes)]

use anyhow::{bail, Context, Result};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Child, Command};
use std::thread;
use std::time::Duration;

use darwin_core::wire::{DecodeLimits, Packet, PacketType, ResponseKind};

mod config_errors;
mod hostlookup_e2e;
mod lifecycle;
mod monitor;

/// Serializes all daemon-spawning tests so fixed socket/pid paths never
/// collide between tests running in parallel.
pub static DAEMON_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

fn darwind_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).parent().unwrap().parent().unwrap().join("target/debug/darwind")
}

pub fn binary_available() -> bool {
    darwind_path().exists()
}

/// A fresh, uniquely-named scratch directory under the system temp dir,
/// removed on drop. Socket paths live here so tests can run concurrently
/// with different `TestPaths` instances as long as they don't hold
/// `DAEMON_LOCK` over conflicting names.
pub struct TestPaths {
    pub dir: PathBuf,
}

impl TestPaths {
    pub fn new(label: &str) -> Self {
        static COUNTER: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
        let id = COUNTER.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!("darwin-it-{label}-{}-{id}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("create scratch dir");
        Self { dir }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let p = self.path(name);
        let mut f = std::fs::File::create(&p).expect("create scratch file");
        write!(f, "{contents}").expect("write scratch file");
        p
    }
}

impl Drop for TestPaths {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

/// Spawns `darwind` with the given positional arguments (no `filter_name`
/// prefix needed — callers pass the full positional list per §4.7) plus any
/// trailing flags. Stdout/stderr are inherited so a failing daemon's logs
/// show up in the test output.
pub fn spawn_daemon(args: &[&str]) -> Child {
    Command::new(darwind_path()).args(args).spawn().expect("failed to spawn darwind")
}

/// Polls for a UNIX socket to accept connections, up to `attempts * 50ms`.
pub fn wait_for_socket(path: &PathBuf, attempts: u32) -> Result<()> {
    for attempt in 1..=attempts {
        if std::os::unix::net::UnixStream::connect(path).is_ok() {
            return Ok(());
        }
        if attempt < attempts {
            thread::sleep(Duration::from_millis(50));
        }
    }
    bail!("socket {} not accepting connections after {} attempts", path.display(), attempts)
}

/// Kills a spawned daemon and waits for it to exit, ignoring errors — used
/// in test teardown where the daemon may have already exited on its own.
pub fn kill_daemon(mut child: Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Sends `sig` to a running child by pid, via the `kill` utility — avoids
/// pulling in a signal-sending crate for a handful of tests.
pub fn send_signal(child: &Child, sig: &str) -> Result<()> {
    let status = Command::new("kill").args([sig, &child.id().to_string()]).status().context("running kill")?;
    if !status.success() {
        bail!("kill {sig} {} failed", child.id());
    }
    Ok(())
}

/// Builds a request packet with a JSON-array body, matching the wire shape
/// every classifier's `parse_entry` expects (§3, §4.1).
pub fn build_request(response_kind: ResponseKind, body: &str) -> Vec<u8> {
    let mut packet = Packet::new(PacketType::Filter, response_kind, 0, [0u8; 16]);
    packet.body = body.as_bytes().to_vec();
    packet.encode()
}

/// Sends one packet over `stream` and reads back exactly one decoded
/// response packet, matching the session's one-packet-per-read-pass
/// contract (§4.6).
pub fn roundtrip(stream: &mut std::os::unix::net::UnixStream, request: &[u8]) -> Result<Packet> {
    use std::io::Read;

    stream.write_all(request).context("writing request")?;

    let mut buf = Vec::new();
    let mut scratch = [0u8; 4096];
    loop {
        let limits = DecodeLimits::default();
        if buf.len() >= darwin_core::wire::PacketHeader::SIZE {
            if let Ok((packet, _consumed)) = Packet::decode(&buf, &limits) {
                return Ok(packet);
            }
        }
        let n = stream.read(&mut scratch).context("reading response")?;
        if n == 0 {
            bail!("connection closed before a full response packet arrived");
        }
        buf.extend_from_slice(&scratch[..n]);
    }
}
