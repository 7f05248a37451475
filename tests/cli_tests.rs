//! End-to-end CLI tests driving the rastro binary

use assert_cmd::Command;
use predicates::prelude::*;

fn rastro() -> Command {
    Command::cargo_bin("rastro").expect("binary exists")
}

#[test]
fn test_help_succeeds() {
    rastro()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"))
        .stdout(predicate::str::contains("--add"))
        .stdout(predicate::str::contains("--logs"));
}

#[test]
fn test_no_arguments_fails() {
    rastro()
        .assert()
        .failure()
        .stderr(predicate::str::contains("no operation requested"));
}

#[test]
fn test_register_sample_and_dump_logs() {
    rastro()
        .args(["-A", "foo", "-e", "-s", "foo", "-L"])
        .assert()
        .success()
        .stdout(predicate::str::contains("e foo"))
        .stdout(predicate::str::contains("r foo"));
}

#[test]
fn test_sample_without_register_fails() {
    rastro()
        .args(["-s", "foo"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no probe installed for 'foo'"));
}

#[test]
fn test_settings_dump_lists_targets() {
    rastro()
        .args(["-A", "foo", "-A", "bar", "-p"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Logger        : Disable"))
        .stdout(predicate::str::contains("[Indx] [Reg] function_name"))
        .stdout(predicate::str::contains("[ Y ] foo"))
        .stdout(predicate::str::contains("[ Y ] bar"));
}

#[test]
fn test_enable_and_disable_logger_conflict() {
    rastro()
        .args(["-e", "-d"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn test_sample_count_multiplies_events() {
    rastro()
        .args(["-A", "foo", "-e", "-s", "foo", "--sample-count", "3", "-L"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[6] r foo"));
}

#[test]
fn test_json_log_output() {
    rastro()
        .args(["-A", "foo", "-e", "-s", "foo", "-L", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"target\": \"foo\""))
        .stdout(predicate::str::contains("\"kind\": \"enter\""))
        .stdout(predicate::str::contains("\"kind\": \"exit\""));
}

#[test]
fn test_no_record_timestamp_omits_prefix() {
    rastro()
        .args(["-A", "foo", "-n", "-e", "-s", "foo", "-L"])
        .assert()
        .success()
        .stdout(predicate::str::contains("nsec").not())
        .stdout(predicate::str::contains("[1] e foo"));
}

#[test]
fn test_ts_format_requires_timestamp_flag() {
    rastro()
        .args(["--ts-format", "relative-first"])
        .assert()
        .failure();
}

#[test]
fn test_delete_unknown_function_fails() {
    rastro()
        .args(["-D", "missing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not registered"));
}
