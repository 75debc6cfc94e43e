//! Smoke tests -- verify the binary runs and key subcommands exist.

use assert_cmd::Command;

#[test]
fn test_cli_help() {
    Command::cargo_bin("testdeck")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicates::str::contains(
            "Self-hosted REST backend for browser UI-test management",
        ));
}

#[test]
fn test_cli_version() {
    Command::cargo_bin("testdeck")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicates::str::contains("testdeck"));
}

#[test]
fn test_serve_subcommand_exists() {
    Command::cargo_bin("testdeck")
        .unwrap()
        .args(["serve", "--help"])
        .assert()
        .success();
}

#[test]
fn test_migrate_applies_schema() {
    let dir = tempfile::TempDir::new().unwrap();
    let db = dir.path().join("testdeck.db");

    Command::cargo_bin("testdeck")
        .unwrap()
        .args(["migrate", "--db", db.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicates::str::contains("Migrations applied"));

    assert!(db.exists());
}

#[test]
fn test_seed_admin_creates_user() {
    let dir = tempfile::TempDir::new().unwrap();
    let db = dir.path().join("testdeck.db");

    Command::cargo_bin("testdeck")
        .unwrap()
        .args([
            "seed-admin",
            "--db",
            db.to_str().unwrap(),
            "--email",
            "admin@example.test",
            "--password",
            "hunter2",
        ])
        .assert()
        .success()
        .stdout(predicates::str::contains("admin@example.test"));
}
