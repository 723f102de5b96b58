//! Integration tests for core CLI contract behavior.

use {predicates::prelude::*, std::fs, tempfile::tempdir};

/// 4 data bytes at 0x3000, then a start address record.
const SREC_IMAGE: &str = "S107300012345678B4\nS9030000FC\n";

/// 4 data bytes at 0x0100 and an end of file record.
const IHEX_IMAGE: &str = ":0401000001020304F1\n:00000001FF\n";

fn cli_cmd() -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("stmflash");
    cmd.env_remove("STMFLASH_PORT")
        .env_remove("STMFLASH_BAUD")
        .env_remove("STMFLASH_FLASH_SIZE")
        .env("NO_COLOR", "1");
    cmd
}

#[test]
fn help_exits_zero_and_writes_stdout_only() {
    cli_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("stmflash"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn version_exits_zero_and_writes_stdout_only() {
    cli_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("stmflash"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn subcommand_help_lists_options() {
    cli_cmd()
        .args(["flash", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--erase"))
        .stdout(predicate::str::contains("--verify"))
        .stdout(predicate::str::contains("--go"));
}

#[test]
fn completions_command_writes_to_stdout() {
    cli_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("stmflash"));
}

#[test]
fn completions_without_shell_is_usage_error() {
    cli_cmd()
        .arg("completions")
        .assert()
        .code(2)
        .stdout(predicate::str::is_empty());
}

#[test]
fn exit_code_two_for_usage_error_unknown_command() {
    cli_cmd()
        .arg("definitely-not-a-command")
        .assert()
        .code(2)
        .stdout(predicate::str::is_empty());
}

#[test]
fn exit_code_two_for_invalid_address() {
    cli_cmd()
        .args(["read", "0xZZ", "16"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Invalid hex address"));
}

#[test]
fn erase_without_all_is_usage_error() {
    cli_cmd()
        .args(["--non-interactive", "erase"])
        .assert()
        .code(2)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("--all"));
}

#[test]
fn unprotect_requires_a_protection_kind() {
    cli_cmd().arg("unprotect").assert().code(2);
}

#[test]
fn inspect_srecord_reports_to_stderr() {
    let dir = tempdir().expect("tempdir should be created");
    let path = dir.path().join("app.s19");
    fs::write(&path, SREC_IMAGE).expect("image should be written");

    cli_cmd()
        .arg("inspect")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("S-record"))
        .stderr(predicate::str::contains("0x00003000"));
}

#[test]
fn inspect_srecord_json_on_stdout() {
    let dir = tempdir().expect("tempdir should be created");
    let path = dir.path().join("app.s19");
    fs::write(&path, SREC_IMAGE).expect("image should be written");

    let output = cli_cmd()
        .args(["inspect", "--json"])
        .arg(&path)
        .output()
        .expect("command should execute");
    assert!(output.status.success());

    let parsed: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    assert_eq!(parsed["ok"], true);
    assert_eq!(parsed["data"]["format"], "S-record");
    assert_eq!(parsed["data"]["bytes"], 4);
    assert_eq!(parsed["data"]["blocks"][0]["address"], "0x00003000");
    assert_eq!(parsed["data"]["start_address"], "0x00000000");
}

#[test]
fn inspect_intel_hex_json_on_stdout() {
    let dir = tempdir().expect("tempdir should be created");
    let path = dir.path().join("app.hex");
    fs::write(&path, IHEX_IMAGE).expect("image should be written");

    let output = cli_cmd()
        .args(["inspect", "--json"])
        .arg(&path)
        .output()
        .expect("command should execute");
    assert!(output.status.success());

    let parsed: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    assert_eq!(parsed["data"]["format"], "Intel HEX");
    assert_eq!(parsed["data"]["bytes"], 4);
    assert_eq!(parsed["data"]["blocks"][0]["address"], "0x00000100");
}

#[test]
fn inspect_binary_needs_an_address() {
    let dir = tempdir().expect("tempdir should be created");
    let path = dir.path().join("app.bin");
    fs::write(&path, [0u8; 300]).expect("image should be written");

    cli_cmd()
        .arg("inspect")
        .arg(&path)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("address"));

    let output = cli_cmd()
        .args(["inspect", "--json", "--address", "0x08000000"])
        .arg(&path)
        .output()
        .expect("command should execute");
    assert!(output.status.success());
    let parsed: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    assert_eq!(parsed["data"]["block_count"], 2);
    assert_eq!(parsed["data"]["blocks"][1]["address"], "0x08000100");
}

#[test]
fn inspect_missing_file_keeps_stdout_clean() {
    let dir = tempdir().expect("tempdir should be created");
    let missing = dir.path().join("not_there.s19");

    cli_cmd()
        .args(["inspect", "--json"])
        .arg(&missing)
        .assert()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn inspect_corrupt_record_names_the_line() {
    let dir = tempdir().expect("tempdir should be created");
    let path = dir.path().join("bad.s19");
    fs::write(&path, "S107300012345678B4\nS107300012345678FF\n").expect("image should be written");

    cli_cmd()
        .arg("inspect")
        .arg(&path)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Line 2"));
}

#[test]
fn non_interactive_flash_with_multiple_firmwares_fails_fast() {
    let dir = tempdir().expect("tempdir should be created");
    fs::write(dir.path().join("a.s19"), SREC_IMAGE).expect("image should be written");
    fs::write(dir.path().join("b.hex"), IHEX_IMAGE).expect("image should be written");

    cli_cmd()
        .current_dir(dir.path())
        .args(["--non-interactive", "flash"])
        .assert()
        .code(2)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("multiple"));
}

#[test]
fn list_ports_json_returns_envelope() {
    let output = cli_cmd()
        .args(["list-ports", "--json"])
        .output()
        .expect("command should execute");
    assert!(output.status.success());

    let parsed: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    assert_eq!(parsed["ok"], true);
    assert!(parsed["data"]["ports"].is_array());
}
