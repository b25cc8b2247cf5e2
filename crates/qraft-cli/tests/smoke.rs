//! Smoke tests for the `qraft` binary.
//!
//! None of these reach the network or need a Python installation.

use std::process::Command;

fn qraft(home: &std::path::Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_qraft"));
    // Keep the user's real config out of the picture.
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env_remove("QRAFT_API_URL");
    cmd
}

// ── Help ──────────────────────────────────────────────────────────────────────

#[test]
fn binary_responds_to_help() {
    let home = tempfile::tempdir().unwrap();
    let output = qraft(home.path()).arg("--help").output().expect("failed to execute qraft");
    assert!(output.status.success(), "qraft --help should exit 0");
    let stdout = String::from_utf8_lossy(&output.stdout);
    for sub in ["generate", "local", "check", "health"] {
        assert!(stdout.contains(sub), "help output should list {sub}");
    }
}

#[test]
fn generate_help_documents_flags() {
    let home = tempfile::tempdir().unwrap();
    let output = qraft(home.path())
        .args(["generate", "--help"])
        .output()
        .expect("failed to execute qraft generate --help");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--background-url"));
    assert!(stdout.contains("--image"));
    assert!(stdout.contains("--copy"));
}

// ── Validation before any call ────────────────────────────────────────────────

#[test]
fn empty_content_fails_without_network() {
    let home = tempfile::tempdir().unwrap();
    // Nothing listens on this port; a request would fail with a network error.
    let output = qraft(home.path())
        .args(["--api-url", "http://127.0.0.1:9", "generate", "   "])
        .output()
        .expect("failed to execute qraft generate");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Error generating image: QR code content is empty"),
        "unexpected stderr: {stderr}"
    );
    assert!(!stderr.contains("network error"));
}

#[test]
fn malformed_config_is_reported() {
    let home = tempfile::tempdir().unwrap();
    let config = home.path().join("bad.toml");
    std::fs::write(&config, "[service\n").unwrap();

    let output = qraft(home.path())
        .args(["--config", config.to_str().unwrap(), "health"])
        .output()
        .expect("failed to execute qraft health");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("config error"), "unexpected stderr: {stderr}");
}

#[test]
fn check_with_missing_python_fails_cleanly() {
    let home = tempfile::tempdir().unwrap();
    let config = home.path().join("config.toml");
    std::fs::write(&config, "[runtime]\npython = \"/nonexistent/python3\"\n").unwrap();

    let output = qraft(home.path())
        .args(["--config", config.to_str().unwrap(), "check"])
        .output()
        .expect("failed to execute qraft check");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("not found"), "unexpected stderr: {stderr}");
}
