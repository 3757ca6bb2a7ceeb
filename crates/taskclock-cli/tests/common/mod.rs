//! Common utilities for CLI E2E tests.
//!
//! Every test gets its own data directory, so config and database never
//! leak between tests or into the real user's directory.

#![allow(dead_code)]

use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

pub struct Output {
    pub stdout: String,
    pub stderr: String,
    pub code: i32,
}

fn command(data_dir: &Path, args: &[&str]) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_taskclock"));
    cmd.args(args)
        .env("TASKCLOCK_DATA_DIR", data_dir)
        .env_remove("TASKCLOCK_LOG")
        .env_remove("RUST_LOG");
    cmd
}

fn collect(output: std::process::Output) -> Output {
    Output {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        code: output.status.code().unwrap_or(-1),
    }
}

/// Invoke the CLI and return its output.
pub fn run_cli(data_dir: &Path, args: &[&str]) -> Output {
    let output = command(data_dir, args)
        .output()
        .expect("Failed to execute CLI command");
    collect(output)
}

/// Invoke the CLI with `input` piped to stdin.
pub fn run_cli_with_input(data_dir: &Path, args: &[&str], input: &str) -> Output {
    let mut child = command(data_dir, args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to spawn CLI command");
    child
        .stdin
        .take()
        .expect("stdin is piped")
        .write_all(input.as_bytes())
        .expect("Failed to write stdin");
    collect(child.wait_with_output().expect("Failed to wait for CLI"))
}

/// Invoke the CLI and expect success.
pub fn run_cli_success(data_dir: &Path, args: &[&str]) -> String {
    let out = run_cli(data_dir, args);
    assert_eq!(
        out.code, 0,
        "CLI command failed: {:?}\nstderr: {}",
        args, out.stderr
    );
    out.stdout
}

/// Invoke the CLI and expect failure.
pub fn run_cli_failure(data_dir: &Path, args: &[&str]) -> Output {
    let out = run_cli(data_dir, args);
    assert_ne!(out.code, 0, "CLI command unexpectedly succeeded: {:?}", args);
    out
}

/// Parse JSON output from CLI.
pub fn parse_json(json: &str) -> serde_json::Value {
    serde_json::from_str(json).expect("Failed to parse JSON output")
}
