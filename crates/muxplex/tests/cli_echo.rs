#![cfg(all(unix, feature = "cli"))]

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/muxplex-cli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn spawn_echo(path: &Path) -> Child {
    Command::new(env!("CARGO_BIN_EXE_muxplex"))
        .args(["--log-level", "error", "echo", "--once"])
        .arg(path)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .expect("echo command should start")
}

fn wait_for_socket(path: &Path, timeout: Duration) {
    let start = Instant::now();
    while !path.exists() {
        if start.elapsed() >= timeout {
            panic!("echo server did not bind {}", path.display());
        }
        thread::sleep(Duration::from_millis(25));
    }
}

fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Option<i32> {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait().expect("wait should succeed") {
            return status.code();
        }
        if start.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            panic!("process did not exit in time");
        }
        thread::sleep(Duration::from_millis(25));
    }
}

#[test]
fn send_round_trips_through_echo_server() {
    let dir = unique_temp_dir("echo");
    let sock_path = dir.join("echo.sock");
    let mut server = spawn_echo(&sock_path);
    wait_for_socket(&sock_path, Duration::from_secs(3));

    let output = Command::new(env!("CARGO_BIN_EXE_muxplex"))
        .args(["--log-level", "error", "--format", "json", "send"])
        .arg(&sock_path)
        .args(["--data", "hello muxplex", "-n", "4", "--chunk-size", "3"])
        .output()
        .expect("send should run");

    assert_eq!(
        output.status.code(),
        Some(0),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let rows: Vec<serde_json::Value> = String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("stdout line should be json"))
        .collect();
    assert_eq!(rows.len(), 4);
    for (expected_id, row) in rows.iter().enumerate() {
        assert_eq!(row["stream_id"], expected_id as u64);
        assert_eq!(row["matched"], true);
        assert_eq!(row["payload"], "hello muxplex");
    }

    assert_eq!(wait_with_timeout(&mut server, Duration::from_secs(5)), Some(0));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn send_without_server_fails() {
    let dir = unique_temp_dir("nosrv");
    let output = Command::new(env!("CARGO_BIN_EXE_muxplex"))
        .args(["--log-level", "error", "send"])
        .arg(dir.join("missing.sock"))
        .args(["--data", "x"])
        .output()
        .expect("send should run");

    assert_eq!(output.status.code(), Some(1));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn send_rejects_stream_count_out_of_range() {
    let output = Command::new(env!("CARGO_BIN_EXE_muxplex"))
        .args(["--log-level", "error", "send", "/tmp/unused.sock"])
        .args(["--data", "x", "-n", "300"])
        .output()
        .expect("send should run");

    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn echo_refuses_to_replace_regular_file() {
    let dir = unique_temp_dir("occupied");
    let path = dir.join("occupied");
    std::fs::write(&path, b"data").expect("file should be writable");

    let mut server = spawn_echo(&path);
    assert_ne!(wait_with_timeout(&mut server, Duration::from_secs(5)), Some(0));
    assert_eq!(std::fs::read(&path).expect("file should remain"), b"data");

    let _ = std::fs::remove_dir_all(&dir);
}
