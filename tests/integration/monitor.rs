//! Monitor socket probe (§6): any connection gets the literal bytes `{}`
//! and is closed, independent of the filter's own listen socket.

use crate::*;
use std::io::Read;
use std::os::unix::net::UnixStream;

#[test]
fn monitor_socket_answers_with_empty_object() {
    let _guard = DAEMON_LOCK.lock().unwrap();
    if !binary_available() {
        eprintln!("SKIP: darwind not built — run: cargo build -p darwind");
        return;
    }

    let paths = TestPaths::new("monitor");
    paths.write("database.txt", "evil.example\n");
    let db_path = paths.path("database.txt");
    let config = paths.write("config.json", &format!(r#"{{"database": "{}", "db_type": "text"}}"#, db_path.display()));

    let listen = paths.path("filter.sock");
    let monitor = paths.path("monitor.sock");
    let pid_dir = paths.path("pid");
    std::fs::create_dir_all(&pid_dir).unwrap();

    let mut child = spawn_daemon(&[
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

    if wait_for_socket(&monitor, 40).is_err() {
        kill_daemon(child);
        panic!("darwind never bound its monitor socket");
    }

    let mut stream = UnixStream::connect(&monitor).expect("connect to monitor socket");
    let mut buf = [0u8; 2];
    stream.read_exact(&mut buf).expect("read monitor response");
    assert_eq!(&buf, b"{}");

    kill_daemon(child);
}

#[test]
fn monitor_keeps_accepting_across_repeated_probes() {
    let _guard = DAEMON_LOCK.lock().unwrap();
    if !binary_available() {
        eprintln!("SKIP: darwind not built — run: cargo build -p darwind");
        return;
    }

    let paths = TestPaths::new("monitor-repeat");
    paths.write("database.txt", "evil.example\n");
    let db_path = paths.path("database.txt");
    let config = paths.write("config.json", &format!(r#"{{"database": "{}", "db_type": "text"}}"#, db_path.display()));

    let listen = paths.path("filter.sock");
    let monitor = paths.path("monitor.sock");
    let pid_dir = paths.path("pid");
    std::fs::create_dir_all(&pid_dir).unwrap();

    let mut child = spawn_daemon(&[
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

    if wait_for_socket(&monitor, 40).is_err() {
        kill_daemon(child);
        panic!("darwind never bound its monitor socket");
    }

    // The accept loop must keep serving liveness probes one after another,
    // not just the first connection (this is the `Monitor::HandleAccept`
    // contract the session-handling code is grounded on).
    for _ in 0..5 {
        let mut stream = UnixStream::connect(&monitor).expect("connect to monitor socket");
        let mut buf = [0u8; 2];
        stream.read_exact(&mut buf).expect("read monitor response");
        assert_eq!(&buf, b"{}");
    }

    kill_daemon(child);
}
