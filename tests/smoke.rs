//! Smoke tests -- verify the binary runs and its subcommands are wired.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_cli_help() {
    Command::cargo_bin("gojo")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Daily summary email scheduler"));
}

#[test]
fn test_cli_version() {
    Command::cargo_bin("gojo")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("gojo"));
}

#[test]
fn test_subcommands_exist() {
    for sub in ["serve", "status", "dry-run", "run-now"] {
        Command::cargo_bin("gojo")
            .unwrap()
            .args([sub, "--help"])
            .assert()
            .success();
    }
}

#[test]
fn test_dry_run_lists_working_days() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("gojo.toml");
    std::fs::write(
        &config,
        "[schedule]\ntime = \"09:00\"\nworking_days = [\"Mon\", \"Tue\", \"Wed\", \"Thu\", \"Fri\"]\n",
    )
    .unwrap();

    Command::cargo_bin("gojo")
        .unwrap()
        .args(["--config", config.to_str().unwrap(), "dry-run", "--days", "14"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Upcoming runs (next 14 days)"))
        .stdout(predicate::str::contains("09:00"))
        .stdout(predicate::str::contains("Sat").not());
}

#[test]
fn test_bad_schedule_time_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("gojo.toml");
    std::fs::write(&config, "[schedule]\ntime = \"25:99\"\n").unwrap();

    Command::cargo_bin("gojo")
        .unwrap()
        .args(["--config", config.to_str().unwrap(), "dry-run"])
        .assert()
        .failure();
}

#[test]
fn test_dry_run_days_out_of_range_is_rejected() {
    for days in ["0", "3651", "18446744073709551615"] {
        Command::cargo_bin("gojo")
            .unwrap()
            .args(["dry-run", "--days", days])
            .assert()
            .failure()
            .stderr(predicate::str::contains("--days"));
    }
}
