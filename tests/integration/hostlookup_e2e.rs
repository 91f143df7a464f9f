//! End-to-end hostlookup scenario from §8: a text database containing
//! "evil.example", a two-entry request, and a BACK response whose
//! certitudes are `[100, 0]`.

use crate::*;
use darwin_core::wire::ResponseKind;
use std::os::unix::net::UnixStream;

#[test]
fn hostlookup_hit_and_miss_round_trip() {
    let _guard = DAEMON_LOCK.lock().unwrap();
    if !binary_available() {
        eprintln!("SKIP: darwind not built — run: cargo build -p darwind");
        return;
    }

    let paths = TestPaths::new("hostlookup");
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
        "2",
        "100",
        "50",
        "RAW",
    ]);

    if wait_for_socket(&listen, 40).is_err() {
        kill_daemon(child);
        panic!("darwind never bound its listen socket");
    }

    let mut stream = UnixStream::connect(&listen).expect("connect to filter socket");
    let body = r#"[["evil.example"],["good.example"]]"#;
    let request = build_request(ResponseKind::Back, body);
    let response = roundtrip(&mut stream, &request).expect("round trip with darwind");

    assert_eq!(response.certitudes, vec![100, 0]);
    assert_eq!(response.body, body.as_bytes(), "RAW output mode echoes the original request body");

    kill_daemon(child);
}
