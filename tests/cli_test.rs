//! CLI smoke tests.
//!
//! Exercise the commands that work without credentials and the exit-code
//! contract for missing configuration.

#![allow(clippy::expect_used)]

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn command(tmp: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("test-smith").expect("binary");
    cmd.current_dir(tmp.path())
        .env_remove("PRIMARY_API_KEY")
        .env_remove("MODEL_PROVIDER")
        .env_remove("WEB_SEARCH_API_KEYS")
        .env_remove("LOG_LEVEL")
        .env_remove("STRUCTURED_LOGS_JSON");
    cmd
}

#[test]
fn workflows_lists_all_registered() {
    let tmp = TempDir::new().expect("tmp");
    command(&tmp)
        .arg("workflows")
        .assert()
        .success()
        .stdout(predicate::str::contains("deep-research"))
        .stdout(predicate::str::contains("quick-research"))
        .stdout(predicate::str::contains("fact-check"))
        .stdout(predicate::str::contains("comparative"))
        .stdout(predicate::str::contains("causal-inference"))
        .stdout(predicate::str::contains("code-investigation"));
}

#[test]
fn workflows_detailed_shows_entries() {
    let tmp = TempDir::new().expect("tmp");
    command(&tmp)
        .args(["workflows", "--detailed"])
        .assert()
        .success()
        .stdout(predicate::str::contains("entry: master_plan"));
}

#[test]
fn workflows_json_output_parses() {
    let tmp = TempDir::new().expect("tmp");
    let output = command(&tmp)
        .args(["--format", "json", "workflows"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let parsed: serde_json::Value =
        serde_json::from_slice(&output).expect("workflows JSON output");
    assert_eq!(parsed.as_array().expect("array").len(), 6);
}

#[test]
fn run_without_credentials_exits_2() {
    let tmp = TempDir::new().expect("tmp");
    command(&tmp)
        .args(["run", "what is rust"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("PRIMARY_API_KEY"));
}

#[test]
fn list_reports_empty_dir() {
    let tmp = TempDir::new().expect("tmp");
    command(&tmp)
        .args(["list", "reports"])
        .assert()
        .success()
        .stdout(predicate::str::contains("no reports yet"));
}

#[test]
fn unknown_subcommand_fails() {
    let tmp = TempDir::new().expect("tmp");
    command(&tmp).arg("frobnicate").assert().failure();
}
