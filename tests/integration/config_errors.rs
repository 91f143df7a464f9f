//! Startup failure paths (§7): configuration errors are fatal before any
//! socket is bound, with exit code 1 per §4.7.

use crate::*;

#[test]
fn missing_config_file_exits_nonzero() {
    let _guard = DAEMON_LOCK.lock().unwrap();
    if !binary_available() {
        eprintln!("SKIP: darwind not built — run: cargo build -p darwind");
        return;
    }

    let paths = TestPaths::new("missing-config");
    let config = paths.path("does-not-exist.json");
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

    let status = child.wait().expect("waiting for darwind to exit");
    assert_eq!(status.code(), Some(1));
}

#[test]
fn hostlookup_missing_database_key_exits_nonzero() {
    let _guard = DAEMON_LOCK.lock().unwrap();
    if !binary_available() {
        eprintln!("SKIP: darwind not built — run: cargo build -p darwind");
        return;
    }

    let paths = TestPaths::new("missing-database-key");
    let config = paths.write("config.json", "{}");
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

    let status = child.wait().expect("waiting for darwind to exit");
    assert_eq!(status.code(), Some(1));
}

#[test]
fn too_few_positional_arguments_exits_nonzero() {
    let _guard = DAEMON_LOCK.lock().unwrap();
    if !binary_available() {
        eprintln!("SKIP: darwind not built — run: cargo build -p darwind");
        return;
    }

    let mut child = spawn_daemon(&["hostlookup", "/tmp/whatever.json"]);
    let status = child.wait().expect("waiting for darwind to exit");
    assert_eq!(status.code(), Some(1));
}
