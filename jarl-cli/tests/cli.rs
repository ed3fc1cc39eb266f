//! Process-level tests for the `jarl` CLI driver.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn jarl_bin() -> Command {
    Command::cargo_bin("jarl").expect("jarl binary should build")
}

fn script(contents: &str) -> (TempDir, std::path::PathBuf) {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("main.jarl");
    std::fs::write(&path, contents).expect("write script");
    (dir, path)
}

#[test]
fn runs_a_script_and_prints_its_output() {
    let (_dir, path) = script("print 1 + 2 * 3");
    jarl_bin()
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::eq("7\n"));
}

#[test]
fn exits_non_zero_on_a_semantic_error() {
    let (_dir, path) = script("var = 1");
    jarl_bin().arg(&path).assert().failure();
}

#[test]
fn exits_non_zero_on_a_runtime_error() {
    let (_dir, path) = script("1 / 0");
    jarl_bin().arg(&path).assert().failure();
}

#[test]
fn exits_non_zero_when_the_script_does_not_exist() {
    jarl_bin().arg("/nonexistent/main.jarl").assert().failure();
}

#[test]
fn verbose_flag_is_accepted() {
    let (_dir, path) = script("print 1");
    jarl_bin()
        .arg("--verbose")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::eq("1\n"));
}
