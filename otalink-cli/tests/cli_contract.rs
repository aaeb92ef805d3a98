//! Integration tests for core CLI contract behavior.

use {predicates::prelude::*, std::fs, tempfile::tempdir};

fn cli_cmd() -> assert_cmd::Command {
    assert_cmd::cargo::cargo_bin_cmd!("otalink")
}

#[test]
fn help_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("otalink"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn short_help_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("-h")
        .assert()
        .success()
        .stdout(predicate::str::contains("otalink"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn version_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")))
        .stderr(predicate::str::is_empty());
}

#[test]
fn short_version_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("-V")
        .assert()
        .success()
        .stdout(predicate::str::contains("otalink"))
        .stderr(predicate::str::is_empty());
}

// ============================================================================
// Exit Code Tests - Following CLI Standards Contract
// ============================================================================

/// Exit code 0: successful operations
#[test]
fn exit_code_zero_on_success() {
    // --help exits 0
    let mut cmd = cli_cmd();
    cmd.arg("--help").assert().success().code(0);

    // --version exits 0
    let mut cmd = cli_cmd();
    cmd.arg("--version").assert().success().code(0);

    // completions bash exits 0 (doesn't require hardware)
    let mut cmd = cli_cmd();
    cmd.args(["completions", "bash"]).assert().success().code(0);
}

/// Exit code 2: usage error (unknown command, invalid arguments)
#[test]
fn exit_code_two_for_usage_error_unknown_command() {
    let mut cmd = cli_cmd();
    cmd.arg("unknown-command-xyz")
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("unrecognized").or(predicate::str::contains("error")));
}

#[test]
fn exit_code_two_for_usage_error_invalid_flag() {
    let mut cmd = cli_cmd();
    cmd.arg("--invalid-flag-xyz").assert().failure().code(2);
}

#[test]
fn exit_code_two_for_missing_firmware_arg() {
    // send without the firmware positional is a clap usage error
    let mut cmd = cli_cmd();
    cmd.arg("send")
        .assert()
        .failure()
        .code(2)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("FIRMWARE").or(predicate::str::contains("firmware")));
}

/// Exit code 1: runtime failure (missing file, unreachable port)
#[test]
fn exit_code_one_for_missing_firmware_file() {
    let dir = tempdir().expect("tempdir should be created");
    let nonexistent = dir.path().join("does_not_exist.bin");

    let mut cmd = cli_cmd();
    cmd.arg("send")
        .arg(nonexistent.as_os_str())
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn exit_code_one_for_unreachable_port() {
    let dir = tempdir().expect("tempdir should be created");
    let firmware = dir.path().join("fw.bin");
    fs::write(&firmware, b"\x01\x02\x03\x04").expect("write test firmware");

    let mut cmd = cli_cmd();
    cmd.arg("--non-interactive")
        .arg("-p")
        .arg("INVALID_PORT_NAME_XYZ")
        .arg("send")
        .arg(&firmware)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Failed to open port"));
}

#[test]
fn exit_code_one_for_unreachable_monitor_port() {
    let mut cmd = cli_cmd();
    cmd.arg("--non-interactive")
        .arg("-p")
        .arg("INVALID_PORT_NAME_XYZ")
        .arg("monitor")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Failed to open port"));
}

// ============================================================================
// Unknown Command/Flag Suggestion Tests
// ============================================================================

#[test]
fn unknown_command_suggests_similar() {
    let mut cmd = cli_cmd();
    cmd.arg("sned") // typo for send
        .assert()
        .failure()
        .stderr(predicate::str::contains("send").or(predicate::str::contains("did you mean")));
}

#[test]
fn unknown_flag_suggests_similar() {
    let mut cmd = cli_cmd();
    cmd.arg("ports")
        .arg("--jason") // typo for --json
        .assert()
        .failure()
        .stderr(predicate::str::contains("json").or(predicate::str::contains("did you mean")));
}

// ============================================================================
// stdout/stderr Separation Tests
// ============================================================================

#[test]
fn send_usage_error_writes_to_stderr_only() {
    let mut cmd = cli_cmd();
    cmd.arg("send")
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::is_empty().not());
}

#[test]
fn ports_status_output_goes_to_stderr() {
    // Without --json the listing is status output, so stdout stays empty
    let mut cmd = cli_cmd();
    cmd.arg("ports")
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn completions_command_writes_to_stdout() {
    let mut cmd = cli_cmd();
    cmd.args(["completions", "bash"])
        .assert()
        .success()
        .stderr(predicate::str::is_empty())
        .stdout(predicate::str::contains("_otalink()"));
}

// ============================================================================
// -- Option Terminator Tests
// ============================================================================

#[test]
fn option_terminator_allows_dash_prefixed_operand() {
    let dir = tempdir().expect("tempdir should be created");

    let mut cmd = cli_cmd();
    // Exit 1 (file missing), not 2: the operand parsed as a path
    cmd.current_dir(dir.path())
        .arg("send")
        .arg("--")
        .arg("-dashed.bin")
        .assert()
        .failure()
        .code(1);
}

// ============================================================================
// Non-Interactive Mode Tests
// ============================================================================

#[test]
fn non_interactive_flag_is_recognized() {
    let mut cmd = cli_cmd();
    cmd.arg("--non-interactive")
        .arg("--version")
        .assert()
        .success();
}

#[test]
fn non_interactive_environment_variable_works() {
    // OTALINK_NON_INTERACTIVE must use "true", not "1"
    let mut cmd = cli_cmd();
    cmd.env("OTALINK_NON_INTERACTIVE", "true")
        .arg("--version")
        .assert()
        .success();
}

#[test]
fn port_environment_variable_works() {
    let dir = tempdir().expect("tempdir should be created");
    let firmware = dir.path().join("fw.bin");
    fs::write(&firmware, b"\x01\x02\x03\x04").expect("write test firmware");

    // The env port is unreachable, proving OTALINK_PORT was picked up
    let mut cmd = cli_cmd();
    cmd.env("OTALINK_PORT", "INVALID_ENV_PORT_XYZ")
        .arg("--non-interactive")
        .arg("send")
        .arg(&firmware)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("INVALID_ENV_PORT_XYZ"));
}

// ============================================================================
// JSON Output Purity Tests
// ============================================================================

#[test]
fn ports_json_returns_valid_json() {
    let mut cmd = cli_cmd();
    let output = cmd
        .args(["ports", "--json"])
        .output()
        .expect("command should execute");

    let stdout = String::from_utf8_lossy(&output.stdout);
    let parsed: serde_json::Value =
        serde_json::from_str(&stdout).expect("ports --json should emit valid JSON");
    assert!(parsed.is_array(), "ports --json should return an array");
}

#[test]
fn json_output_is_valid_json_without_extra_lines() {
    let mut cmd = cli_cmd();
    let output = cmd
        .args(["ports", "--json"])
        .assert()
        .success()
        .get_output()
        .clone();

    let stdout = String::from_utf8(output.stdout).expect("stdout should be utf-8");
    let stderr = String::from_utf8(output.stderr).expect("stderr should be utf-8");

    let parsed: serde_json::Value =
        serde_json::from_str(&stdout).expect("stdout should be pure JSON");
    assert!(parsed.is_array());
    assert!(
        stderr.is_empty(),
        "JSON output should not have stderr: got {stderr}"
    );
}

// ============================================================================
// Configuration Tests
// ============================================================================

#[test]
fn invalid_config_warns_but_continues() {
    let dir = tempdir().expect("tempdir should be created");
    let config = dir.path().join("otalink.toml");
    fs::write(&config, "invalid toml [[[").expect("write invalid config");

    let output = cli_cmd()
        .current_dir(dir.path())
        .arg("ports")
        .output()
        .expect("command should execute");

    // Config errors are warnings, not fatal
    assert!(
        output.status.success(),
        "command should succeed despite config warning"
    );
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("config"),
        "should warn about the bad config file"
    );
}

#[test]
fn config_file_from_flag_is_used() {
    let dir = tempdir().expect("tempdir should be created");
    let config = dir.path().join("custom.toml");
    fs::write(
        &config,
        r#"
[link]
port = "INVALID_CONFIG_PORT_XYZ"
"#,
    )
    .expect("write config");
    let firmware = dir.path().join("fw.bin");
    fs::write(&firmware, b"\x01\x02\x03\x04").expect("write test firmware");

    // The configured port is unreachable, proving --config was honored
    let mut cmd = cli_cmd();
    cmd.env_remove("OTALINK_PORT")
        .arg("--non-interactive")
        .arg("--config")
        .arg(&config)
        .arg("send")
        .arg(&firmware)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("INVALID_CONFIG_PORT_XYZ"));
}

// ============================================================================
// TTY Detection Tests (colors/animations disabled on non-TTY)
// ============================================================================

#[test]
fn colors_disabled_when_not_tty() {
    let mut cmd = cli_cmd();
    let output = cmd.arg("--help").assert().success().get_output().clone();

    let stdout = String::from_utf8(output.stdout).expect("stdout should be utf-8");
    // ANSI color codes should NOT appear in non-TTY output
    assert!(
        !stdout.contains("\x1b["),
        "Colors should be disabled in non-TTY mode"
    );
}

#[test]
fn help_includes_usage() {
    let mut cmd = cli_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"));
}
