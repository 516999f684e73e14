use std::fs;
use std::net::{SocketAddr, SocketAddrV4};
use std::path::Path;
use std::process::Output;
use std::time::Duration;
use tcp_fileshare::config::ServerConfig;
use tcp_fileshare::server::Server;
use tokio::process::Command;
use tokio::task::JoinHandle;

const SERVER_BIN: &str = env!("CARGO_BIN_EXE_server");
const CLIENT_BIN: &str = env!("CARGO_BIN_EXE_client");

fn start_server(root: &Path) -> (SocketAddrV4, JoinHandle<()>) {
    let config = ServerConfig {
        listen: "127.0.0.1:0".parse().unwrap(),
        root: root.to_path_buf(),
        max_clients: 5,
        log_level: "info".to_string(),
    };
    let server = Server::bind(&config).unwrap();
    let addr = match server.local_addr().unwrap() {
        SocketAddr::V4(addr) => addr,
        other => panic!("unexpected listener address: {other}"),
    };
    let handle = tokio::spawn(server.run_until(std::future::pending()));
    (addr, handle)
}

async fn run(bin: &str, args: &[&str]) -> Output {
    let child = Command::new(bin)
        .args(args)
        .env_remove("RUST_LOG")
        .kill_on_drop(true)
        .output();
    tokio::time::timeout(Duration::from_secs(30), child)
        .await
        .unwrap()
        .unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn client_reports_received_and_missing_files() {
    let root = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    fs::write(root.path().join("a.txt"), b"hello").unwrap();
    let (addr, server) = start_server(root.path());
    let addr = addr.to_string();
    let out_dir = out.path().to_str().unwrap();

    let output = run(CLIENT_BIN, &["-c", &addr, "-f", "a.txt", "-o", out_dir]).await;
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output).trim(), "File received: a.txt");
    assert_eq!(fs::read(out.path().join("a.txt")).unwrap(), b"hello");

    let output = run(CLIENT_BIN, &["-c", &addr, "-f", "missing.txt", "-o", out_dir]).await;
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(
        stdout(&output).trim(),
        "File not found on the server: missing.txt"
    );
    assert!(!out.path().join("missing.txt").exists());

    server.abort();
}

#[tokio::test]
async fn client_fails_when_server_is_unreachable() {
    let port = {
        let sock = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        sock.local_addr().unwrap().port()
    };
    let out = tempfile::tempdir().unwrap();
    let addr = format!("127.0.0.1:{port}");

    let output = run(
        CLIENT_BIN,
        &["-c", &addr, "-f", "a.txt", "-o", out.path().to_str().unwrap()],
    )
    .await;
    assert!(!output.status.success());
    assert!(stdout(&output).is_empty());
    assert!(stderr(&output).contains("Error connecting to server"));
}

#[tokio::test]
async fn client_rejects_filename_outside_output_folder() {
    let out = tempfile::tempdir().unwrap();
    let out_dir = out.path().to_str().unwrap();

    for name in ["/etc/passwd", "../escape.txt"] {
        let output = run(CLIENT_BIN, &["-c", "127.0.0.1:9000", "-f", name, "-o", out_dir]).await;
        assert!(!output.status.success(), "accepted {name}");
        assert!(stderr(&output).contains("Invalid filename"));
    }
    assert_eq!(fs::read_dir(out.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn client_usage_errors_exit_non_zero() {
    let output = run(CLIENT_BIN, &["-c", "127.0.0.1:9000", "-f", "a.txt"]).await;
    assert_eq!(output.status.code(), Some(2));

    let output = run(CLIENT_BIN, &["-c", "nowhere", "-f", "a.txt", "-o", "."]).await;
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Invalid address"));
}

#[tokio::test]
async fn server_fails_when_root_is_not_a_directory() {
    let base = tempfile::tempdir().unwrap();
    let file = base.path().join("not-a-dir");
    fs::write(&file, b"x").unwrap();

    let output = run(
        SERVER_BIN,
        &["-c", "127.0.0.1:9", "-f", file.to_str().unwrap()],
    )
    .await;
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Not a directory"));
}

#[tokio::test]
async fn server_usage_errors_exit_non_zero() {
    let output = run(SERVER_BIN, &["-c", "127.0.0.1:9000"]).await;
    assert_eq!(output.status.code(), Some(2));

    let output = run(SERVER_BIN, &["-c", "127.0.0.1:9000", "-f", ".", "--max-clients", "0"]).await;
    assert!(!output.status.success());
    assert!(stderr(&output).contains("max_clients must be at least 1"));
}
