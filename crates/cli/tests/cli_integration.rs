//! CLI integration tests for the `timbre` binary.
//!
//! Uses `assert_cmd` to spawn the binary and verify exit codes, stdout, and
//! stderr against fixtures written into a fresh temp directory per test.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn timbre() -> Command {
    Command::cargo_bin("timbre").expect("binary exists")
}

fn write_file(dir: &Path, name: &str, contents: &str) {
    fs::write(dir.join(name), contents).expect("fixture write");
}

#[test]
fn help_exits_0_with_description() {
    timbre()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Timbre configuration language toolchain",
        ));
}

#[test]
fn version_exits_0() {
    timbre()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("timbre"));
}

#[test]
fn resolve_prints_the_resolved_expression() {
    let tmp = TempDir::new().expect("tempdir");
    write_file(tmp.path(), "id", "λ(a : Type) → λ(x : a) → x");
    write_file(tmp.path(), "main", "./id Bool True");

    timbre()
        .arg("resolve")
        .arg(tmp.path().join("main"))
        .assert()
        .success()
        .stdout(predicate::str::contains("λ(a : Type) → λ(x : a) → x"));
}

#[test]
fn type_prints_the_inferred_type() {
    let tmp = TempDir::new().expect("tempdir");
    write_file(tmp.path(), "main", "{ retries = 3, verbose = True }");

    timbre()
        .arg("type")
        .arg(tmp.path().join("main"))
        .assert()
        .success()
        .stdout(predicate::str::contains("retries : Integer"))
        .stdout(predicate::str::contains("verbose : Bool"));
}

#[test]
fn hash_prints_a_sha256_code() {
    let tmp = TempDir::new().expect("tempdir");
    write_file(tmp.path(), "main", "λ(x : Bool) → x == False");

    let first = timbre()
        .arg("hash")
        .arg(tmp.path().join("main"))
        .assert()
        .success()
        .stdout(predicate::str::starts_with("sha256:"));
    let first_out = String::from_utf8(first.get_output().stdout.clone()).expect("utf-8");

    // α-equivalent source hashes identically
    write_file(tmp.path(), "renamed", "λ(y : Bool) → y == False");
    let second = timbre()
        .arg("hash")
        .arg(tmp.path().join("renamed"))
        .assert()
        .success();
    let second_out = String::from_utf8(second.get_output().stdout.clone()).expect("utf-8");
    assert_eq!(first_out, second_out);
}

#[test]
fn json_output_wraps_the_result() {
    let tmp = TempDir::new().expect("tempdir");
    write_file(tmp.path(), "main", "True && False");

    let assert = timbre()
        .arg("resolve")
        .arg(tmp.path().join("main"))
        .arg("--output")
        .arg("json")
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("utf-8");
    let parsed: serde_json::Value = serde_json::from_str(stdout.trim()).expect("valid json");
    assert_eq!(parsed["resolved"], "True && False");
}

#[test]
fn missing_input_file_fails_with_an_error() {
    timbre()
        .arg("resolve")
        .arg("/no/such/file")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"));
}

#[test]
fn unresolvable_import_fails_with_the_import_name() {
    let tmp = TempDir::new().expect("tempdir");
    write_file(tmp.path(), "main", "./ghost");

    timbre()
        .arg("resolve")
        .arg(tmp.path().join("main"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("ghost"));
}

#[test]
fn type_errors_are_reported() {
    let tmp = TempDir::new().expect("tempdir");
    write_file(tmp.path(), "main", "True True");

    timbre()
        .arg("type")
        .arg(tmp.path().join("main"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a function"));
}
