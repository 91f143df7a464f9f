//! darwind — Darwin filter daemon binary. One process serves one filter
//! (hostlookup, useragent, yara, buffer), chosen by `filter_name` (§4.7).

mod acceptor;
mod core;
mod session;

use anyhow::Result;
use darwin_core::config::CoreArgs;
use tokio::sync::broadcast;

use crate::core::Core;

fn main() -> Result<()> {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    let args = CoreArgs::parse(&argv).map_err(|e| {
        eprintln!("usage: darwind <filter_name> <config_path> <monitor_socket_path> <pid_path> <listen_address> <nb_threads> <cache_size> <threshold> <output> [next_filter_address] [--daemon] [--log-level <level>]");
        e
    })?;

    if args.daemon {
        daemonize()?;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(run(args));
    if let Err(e) = &result {
        tracing::error!(error = %e, "darwind: fatal startup error");
    }
    result
}

async fn run(args: CoreArgs) -> Result<()> {
    let filter_name = args.filter_name.clone();
    let core = Core::configure(args)?;
    let alerts = core.alert_manager();

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    spawn_signal_handlers(shutdown_tx, alerts);

    tracing::info!(filter = %filter_name, "darwind: starting");
    core.run(shutdown_rx).await
}

/// `SIGINT`/`SIGTERM`/`SIGQUIT` trigger graceful shutdown; `SIGUSR1`/`SIGHUP`
/// rotate the alert log, matching `main()`'s `rotateLogsHandler` plus the
/// shutdown signals §5 and §6 both name.
fn spawn_signal_handlers(shutdown_tx: broadcast::Sender<()>, alerts: Option<std::sync::Arc<darwin_services::AlertManager>>) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let mut int = signal(SignalKind::interrupt()).expect("install SIGINT handler");
        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        let mut quit = signal(SignalKind::quit()).expect("install SIGQUIT handler");
        tokio::select! {
            _ = int.recv() => tracing::info!("received SIGINT"),
            _ = term.recv() => tracing::info!("received SIGTERM"),
            _ = quit.recv() => tracing::info!("received SIGQUIT"),
        }
        let _ = shutdown_tx.send(());
    });

    tokio::spawn(async move {
        let mut usr1 = signal(SignalKind::user_defined1()).expect("install SIGUSR1 handler");
        let mut hup = signal(SignalKind::hangup()).expect("install SIGHUP handler");
        loop {
            tokio::select! {
                _ = usr1.recv() => {}
                _ = hup.recv() => {}
            }
            tracing::info!("rotating logs");
            if let Some(mgr) = &alerts {
                mgr.rotate();
            }
        }
    });
}

/// Equivalent of the original's `daemon(1, 0)`: fork, detach from the
/// controlling terminal, and redirect stdio to `/dev/null`, without
/// changing the working directory (`nochdir=1`).
fn daemonize() -> Result<()> {
    unsafe {
        match libc::fork() {
            -1 => anyhow::bail!("fork failed: {}", std::io::Error::last_os_error()),
            0 => {}
            _ => std::process::exit(0),
        }
        if libc::setsid() == -1 {
            anyhow::bail!("setsid failed: {}", std::io::Error::last_os_error());
        }
        let devnull = std::ffi::CString::new("/dev/null").unwrap();
        let fd = libc::open(devnull.as_ptr(), libc::O_RDWR);
        if fd >= 0 {
            libc::dup2(fd, 0);
            libc::dup2(fd, 1);
            libc::dup2(fd, 2);
            if fd > 2 {
                libc::close(fd);
            }
        }
    }
    Ok(())
}
