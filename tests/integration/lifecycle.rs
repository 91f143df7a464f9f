//! Core lifecycle (§4.7, §6): the PID file is written on start and removed
//! on a graceful `SIGTERM`.

use crate::*;
use std::time::Duration;

#[test]
fn pid_file_is_written_and_removed_on_sigterm() {
    let _guard = DAEMON_LOCK.lock().unwrap();
    if !binary_available() {
        eprintln!("SKIP: darwind not built — run: cargo build -p darwind");
        return;
    }

    let paths = TestPaths::new("lifecycle");
    paths.write("database.txt", "evil.example\n");
    let db_path = paths.path("database.txt");
    let config = paths.write("config.json", &format!(r#"{{"database": "{}", "db_type": "text"}}"#, db_path.display()));

    let listen = paths.path("filter.sock");
    let monitor = paths.path("monitor.sock");
    let pid_dir = paths.path("pid");
    std::fs::create_dir_all(&pid_dir).unwrap();
    let pid_file = pid_dir.join("hostlookup.pid");

    let child = spawn_daemon(&[
        "hostlookup",
        config.to_str().unwrap(),
        monitor.to_str().unwrap(),
        pid_dir.to_str().unwrap(),
        listen.to_str().unwrap(),
        "1",
        "0",
        "50",
        "NONE",
    ]);

    if wait_for_socket(&listen, 40).is_err() {
        kill_daemon(child);
        panic!("darwind never bound its listen socket");
    }

    assert!(pid_file.exists(), "pid file should exist once the daemon is accepting connections");
    let contents = std::fs::read_to_string(&pid_file).unwrap();
    assert_eq!(contents.trim().parse::<u32>().unwrap(), child.id());

    send_signal(&child, "-TERM").expect("sending SIGTERM");

    let mut removed = false;
    for _ in 0..40 {
        if !pid_file.exists() {
            removed = true;
            break;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    assert!(removed, "pid file should be removed after graceful shutdown");

    kill_daemon(child);
}

#[test]
fn startup_fails_on_unknown_filter_name() {
    let _guard = DAEMON_LOCK.lock().unwrap();
    if !binary_available() {
        eprintln!("SKIP: darwind not built — run: cargo build -p darwind");
        return;
    }

    let paths = TestPaths::new("unknown-filter");
    let config = paths.write("config.json", "{}");
    let listen = paths.path("filter.sock");
    let monitor = paths.path("monitor.sock");
    let pid_dir = paths.path("pid");
    std::fs::create_dir_all(&pid_dir).unwrap();

    let mut child = spawn_daemon(&[
        "nonexistent",
        config.to_str().unwrap(),
        monitor.to_str().unwrap(),
        pid_dir.to_str().unwrap(),
        listen.to_str().unwrap(),
        "1",
        "0",
        "50",
        "NONE",
    ]);

    let status = child.wait().expect("waiting for darwind to exit");
    assert!(!status.success(), "an unknown filter_name must exit non-zero per §4.7");
    assert!(!listen.exists(), "a filter that failed to configure must never bind its listen socket");
}
