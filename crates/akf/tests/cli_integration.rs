//! CLI integration tests for the AKF command-line interface.
//!
//! These tests cover argument parsing, help output, and the commands that
//! need no guest: `plan` and `modules`.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get a command for the akf binary with an isolated config directory.
fn akf(config_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("akf").unwrap();
    cmd.env("AKF_CONFIG_DIR", config_dir.path())
        .env_remove("AKF_CONFIG")
        .env_remove("AKF_GUEST");
    cmd
}

fn write_scenario(dir: &TempDir, name: &str, body: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, body).unwrap();
    path
}

const BROWSE: &str = r#"
name: browse
steps:
  - module: chromium_service_start
  - module: capability_call
    args:
      capability: Chromium
      action: visit
      args: {url: "http://example.com"}
  - module: chromium_service_stop
"#;

// ─────────────────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_help_displays() {
    let dir = TempDir::new().unwrap();
    akf(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("forensic scenario automation"));
}

#[test]
fn test_version_displays() {
    let dir = TempDir::new().unwrap();
    akf(&dir)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("akf"));
}

#[test]
fn test_help_lists_subcommands() {
    let dir = TempDir::new().unwrap();
    akf(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("agent"))
        .stdout(predicate::str::contains("plan"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("services"))
        .stdout(predicate::str::contains("modules"))
        .stdout(predicate::str::contains("capability").not());
}

#[test]
fn test_run_requires_guest() {
    let dir = TempDir::new().unwrap();
    let scenario = write_scenario(&dir, "s.yaml", BROWSE);
    akf(&dir)
        .arg("run")
        .arg(&scenario)
        .assert()
        .failure()
        .stderr(predicate::str::contains("--guest"));
}

#[test]
fn test_services_rejects_unknown_subcommand() {
    let dir = TempDir::new().unwrap();
    akf(&dir)
        .args(["services", "--host", "127.0.0.1", "restart"])
        .assert()
        .failure();
}

// ─────────────────────────────────────────────────────────────────────────────
// Offline Commands
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_plan_prints_script() {
    let dir = TempDir::new().unwrap();
    let scenario = write_scenario(&dir, "s.yaml", BROWSE);
    akf(&dir)
        .arg("plan")
        .arg(&scenario)
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "let chromium = connect(hypervisor.guest_address(), \"Chromium\")",
        ))
        .stdout(predicate::str::contains("chromium.visit("))
        .stdout(predicate::str::contains("release(chromium)"));
}

#[test]
fn test_plan_json_lists_operations() {
    let dir = TempDir::new().unwrap();
    let scenario = write_scenario(&dir, "s.yaml", BROWSE);
    let output = akf(&dir).arg("--json").arg("plan").arg(&scenario).output().unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["name"], "browse");
    let ops = value["operations"].as_array().unwrap();
    assert_eq!(ops.len(), 3);
    assert_eq!(ops[0]["op"], "start");
    assert_eq!(ops[1]["method"], "visit");
    assert_eq!(ops[2]["op"], "stop");
}

#[test]
fn test_plan_writes_file() {
    let dir = TempDir::new().unwrap();
    let scenario = write_scenario(&dir, "s.yaml", BROWSE);
    let out = dir.path().join("out.akf");
    akf(&dir)
        .arg("plan")
        .arg(&scenario)
        .arg("--out")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote 3 statements"));
    assert!(std::fs::read_to_string(&out).unwrap().contains("release(chromium)"));
}

#[test]
fn test_plan_rejects_unknown_module() {
    let dir = TempDir::new().unwrap();
    let scenario = write_scenario(&dir, "s.yaml", "name: bad\nsteps:\n  - module: teleport\n");
    akf(&dir)
        .arg("plan")
        .arg(&scenario)
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown module: teleport"));
}

#[test]
fn test_plan_missing_file_fails() {
    let dir = TempDir::new().unwrap();
    akf(&dir)
        .args(["plan", "does-not-exist.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load scenario"));
}

#[test]
fn test_modules_lists_builtins() {
    let dir = TempDir::new().unwrap();
    akf(&dir)
        .arg("modules")
        .assert()
        .success()
        .stdout(predicate::str::contains("chromium_visit_urls"))
        .stdout(predicate::str::contains("capability_start"))
        .stdout(predicate::str::contains("prefetch"));
}

#[test]
fn test_capability_rejects_unknown_name() {
    let dir = TempDir::new().unwrap();
    akf(&dir)
        .args(["capability", "Nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown built-in capability"));
}
