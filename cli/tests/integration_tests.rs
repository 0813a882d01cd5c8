use std::io::Write;
use std::net::TcpListener;
use std::process::{Child, Command as StdCommand};
use std::time::{Duration, Instant};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::NamedTempFile;

/// Helper to create a test QCL source file.
fn create_qcl_file(content: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".qcl")
        .tempfile()
        .unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn garbled_cmd() -> Command {
    Command::cargo_bin("garbled").unwrap()
}

#[test]
fn test_help_command() {
    garbled_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("garbled circuit runner"));
}

#[test]
fn test_local_and() {
    let file = create_qcl_file(
        "package main\n\
         func main(a, b uint8) uint8 {\n\
         \treturn a & b\n\
         }\n",
    );
    garbled_cmd()
        .arg("-i")
        .arg("0xF0,0x0F")
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Result[0]: 0"));
}

#[test]
fn test_local_addition_with_carry() {
    let file = create_qcl_file(
        "package main\n\
         func main(a, b uint4) uint5 {\n\
         \treturn a + b\n\
         }\n",
    );
    garbled_cmd()
        .arg("-i")
        .arg("15,1")
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Result[0]: 16"));
}

#[test]
fn test_compile_error_exits_nonzero() {
    let file = create_qcl_file("package main\nfunc main(a uint8) uint8 {\nreturn b\n}\n");
    garbled_cmd()
        .arg("-i")
        .arg("1")
        .arg(file.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("undefined"));
}

#[test]
fn test_missing_file_exits_nonzero() {
    garbled_cmd().arg("-i").arg("1").assert().failure();
}

/// Full streamed session between two processes over localhost: the
/// millionaires' problem, garbler at 1000000 and evaluator at 999999.
#[test]
fn test_streaming_millionaires() {
    let port = free_port();
    let endpoint = format!("127.0.0.1:{port}");

    let evaluator: Child = StdCommand::new(env!("CARGO_BIN_EXE_garbled"))
        .args([
            "--stream", "--listen", "--once", "-e", &endpoint, "-i", "999999",
        ])
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()
        .unwrap();

    let file = create_qcl_file(
        "package main\n\
         func main(a, b uint) bool {\n\
         \treturn a < b\n\
         }\n",
    );

    // The listener may not be up yet when the first dial goes out.
    let garbler = retry(Duration::from_secs(10), || {
        let out = StdCommand::new(env!("CARGO_BIN_EXE_garbled"))
            .args(["--stream", "-e", &endpoint, "-i", "1000000"])
            .arg(file.path())
            .output()
            .unwrap();
        out.status.success().then_some(out)
    });

    let stdout = String::from_utf8_lossy(&garbler.stdout).to_string();
    // 1000000 < 999999 is false.
    assert!(stdout.contains("Result[0]: 0"), "{stdout}");

    let out = evaluator.wait_with_output().unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("Result[0]: 0x0"), "{stdout}");
}

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn retry<T>(budget: Duration, mut f: impl FnMut() -> Option<T>) -> T {
    let start = Instant::now();
    loop {
        if let Some(value) = f() {
            return value;
        }
        if start.elapsed() > budget {
            panic!("operation did not succeed in {budget:?}");
        }
        std::thread::sleep(Duration::from_millis(100));
    }
}
