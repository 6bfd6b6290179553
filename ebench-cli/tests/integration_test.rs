//! End-to-end tests for the `ebench` binary.

use std::fs;
use std::net::{TcpListener, TcpStream};
use std::process::{Child, Command, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

fn ebench() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_ebench"));
    cmd.env("RUST_LOG", "warn");
    cmd
}

fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    listener.local_addr().unwrap().port()
}

/// A `serve` process killed on drop
struct Server(Child);

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

fn start_server(endpoint: &str, extra: &[&str]) -> Server {
    let child = ebench()
        .args(["serve", "--endpoint", endpoint])
        .args(extra)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("Failed to start ebench serve");
    let server = Server(child);

    let deadline = Instant::now() + Duration::from_secs(10);
    while TcpStream::connect(endpoint).is_err() {
        assert!(Instant::now() < deadline, "server did not start on {}", endpoint);
        sleep(Duration::from_millis(50));
    }
    server
}

/// Test CLI help output
#[test]
fn test_cli_help() {
    let output = ebench().arg("--help").output().expect("Failed to run ebench --help");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("serve"), "Missing serve command");
    assert!(stdout.contains("amplify"), "Missing amplify command");
    assert!(stdout.contains("scenario"), "Missing scenario command");
}

/// Test CLI version output
#[test]
fn test_cli_version() {
    let output = ebench().arg("--version").output().expect("Failed to run ebench --version");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("ebench"), "Missing program name in version");
    assert!(stdout.contains("0.1.0"), "Missing version number");
}

/// Invalid combinations are rejected before anything connects
#[test]
fn test_amplify_rejects_invalid_config() {
    let output = ebench()
        .args(["amplify", "--connections", "1", "--concurrency", "50"])
        .output()
        .expect("Failed to run ebench amplify");
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Invalid amplifier configuration"), "stderr: {}", stderr);
}

#[test]
fn test_amplify_without_proxy_fails() {
    let endpoint = format!("127.0.0.1:{}", free_port());
    let output = ebench()
        .args(["amplify", "--endpoint", &endpoint, "-n", "10"])
        .output()
        .expect("Failed to run ebench amplify");
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to open connection"), "stderr: {}", stderr);
}

#[test]
fn test_serve_then_amplify_with_report() {
    let endpoint = format!("127.0.0.1:{}", free_port());
    let _server = start_server(&endpoint, &["--batch-size", "4", "--batch-linger-ms", "2"]);

    let report_path = std::env::temp_dir().join(format!("ebench_report_{}.json", std::process::id()));
    let _ = fs::remove_file(&report_path);

    let output = ebench()
        .args([
            "amplify",
            "--endpoint",
            &endpoint,
            "--connections",
            "2",
            "--concurrency",
            "4",
            "-n",
            "120",
            "-o",
            report_path.to_str().unwrap(),
        ])
        .output()
        .expect("Failed to run ebench amplify");

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    println!("stdout: {}", stdout);
    println!("stderr: {}", stderr);
    assert!(output.status.success(), "Command failed: {}", stderr);
    assert!(stdout.contains("Achieved QPS"), "Missing report");

    let report: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&report_path).unwrap()).unwrap();
    assert_eq!(report["issued"], 120);
    assert_eq!(report["succeeded"], 120);
    assert!(report["latency"]["p50_us"].as_u64().unwrap() > 0);

    let _ = fs::remove_file(&report_path);
}

#[test]
fn test_scenario_against_turbo_proxy() {
    let endpoint = format!("127.0.0.1:{}", free_port());
    let _server = start_server(&endpoint, &["--turbo"]);

    let output = ebench()
        .args(["scenario", "--endpoint", &endpoint])
        .output()
        .expect("Failed to run ebench scenario");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout.contains("create product"));
    assert!(stdout.contains("\"mavic\""));
}
