//! End-to-end tests for the monobuild binary

#![cfg(unix)]

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;

const CONFIG: &str = r#"
[targets.proto]
type = "auxiliary"
commands.init = ["echo proto-init >> ../order.log"]
commands.build = ["echo proto-build >> ../order.log"]

[targets.api]
type = "language"
depends_on = ["proto"]
commands.build = ["echo api-build >> ../order.log"]
commands.test = ["echo api-test >> ../order.log"]

[targets.web]
type = "language"
depends_on = ["api"]
commands.build = ["echo web-build >> ../order.log"]
commands.test = ["echo web-test >> ../order.log; exit 1"]
"#;

fn repo(config: &str) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("monobuild.toml"), config).unwrap();
    for name in ["proto", "api", "web"] {
        fs::create_dir_all(dir.path().join(name)).unwrap();
    }
    dir
}

fn monobuild(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("monobuild").unwrap();
    cmd.current_dir(dir)
        .arg("--no-color")
        .env("MONOBUILD_WORKERS", "2");
    cmd
}

fn order_log(dir: &Path) -> Vec<String> {
    fs::read_to_string(dir.join("order.log"))
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

#[test]
fn check_reports_valid_config() {
    let dir = repo(CONFIG);

    monobuild(dir.path())
        .arg("check")
        .assert()
        .success()
        .stdout(predicate::str::contains("is valid (3 targets)"));
}

#[test]
fn check_rejects_cycles() {
    let dir = repo(
        r#"
        [targets.a]
        type = "language"
        depends_on = ["b"]

        [targets.b]
        type = "language"
        depends_on = ["a"]
        "#,
    );

    monobuild(dir.path())
        .arg("check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("circular"));
}

#[test]
fn run_builds_in_dependency_order() {
    let dir = repo(CONFIG);

    monobuild(dir.path()).args(["run", "build"]).assert().success();

    assert_eq!(
        order_log(dir.path()),
        vec!["proto-build", "api-build", "web-build"]
    );
}

#[test]
fn run_selected_target_includes_dependencies_only() {
    let dir = repo(CONFIG);

    monobuild(dir.path())
        .args(["run", "build", "api"])
        .assert()
        .success();

    assert_eq!(order_log(dir.path()), vec!["proto-build", "api-build"]);
}

#[test]
fn run_failure_sets_exit_code() {
    let dir = repo(CONFIG);

    monobuild(dir.path())
        .args(["run", "test"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("[web] test"));

    // proto has no test command and is skipped, not failed
    assert_eq!(order_log(dir.path()), vec!["api-test", "web-test"]);
}

#[test]
fn ci_json_reports_phases() {
    let dir = repo(CONFIG);

    let output = monobuild(dir.path())
        .args(["ci", "--json"])
        .assert()
        .failure()
        .get_output()
        .stdout
        .clone();

    let result: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(result["success"], serde_json::json!(false));
    assert_eq!(result["target_results"]["web"]["success"], serde_json::json!(false));

    let log = order_log(dir.path());
    assert_eq!(log.first().map(String::as_str), Some("proto-init"));
}

#[test]
fn graph_renders_dot() {
    let dir = repo(CONFIG);

    monobuild(dir.path())
        .args(["graph", "--format", "dot"])
        .assert()
        .success()
        .stdout(predicate::str::contains("digraph"))
        .stdout(predicate::str::contains("\"api\""));
}

#[test]
fn list_plain_is_dependency_ordered() {
    let dir = repo(CONFIG);

    monobuild(dir.path())
        .args(["list", "--format", "plain"])
        .assert()
        .success()
        .stdout("proto\napi\nweb\n");
}
