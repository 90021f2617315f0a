// Command line surface of the stable-routines binary

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

fn cli() -> Command {
    Command::cargo_bin("stable-routines").unwrap()
}

#[test]
fn test_help_lists_commands() {
    cli()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("preview"))
        .stdout(predicate::str::contains("--config"));
}

#[test]
fn test_preview_prints_dates_with_weekdays() {
    // 2025-01-06 is a Monday and a Swedish holiday
    cli()
        .args([
            "preview",
            "--start",
            "2025-01-06",
            "--end",
            "2025-01-12",
            "--pattern",
            "custom",
            "--days",
            "1,3",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("📅 SCHEDULE PREVIEW"))
        .stdout(predicate::str::contains("(2 dates)"))
        .stdout(predicate::str::contains("2025-01-06 Mon  🎉 holiday"))
        .stdout(predicate::str::contains("2025-01-08 Wed"));
}

#[test]
fn test_preview_json_holidays_only() {
    let output = cli()
        .args([
            "preview",
            "--start",
            "2025-12-22",
            "--end",
            "2025-12-28",
            "--pattern",
            "custom",
            "--include-holidays",
            "--json",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());

    let dates: Vec<String> = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(dates, vec!["2025-12-24", "2025-12-25", "2025-12-26"]);
}

#[test]
fn test_preview_uses_configured_extra_holidays() {
    let mut config = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(config, "[schedule]\nextra_holidays = [\"2025-08-15\"]").unwrap();

    let output = cli()
        .arg("--config")
        .arg(config.path())
        .args([
            "preview",
            "--start",
            "2025-08-11",
            "--end",
            "2025-08-17",
            "--pattern",
            "custom",
            "--include-holidays",
            "--json",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());

    let dates: Vec<String> = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(dates, vec!["2025-08-15"]);
}

#[test]
fn test_preview_rejects_reversed_range() {
    cli()
        .args(["preview", "--start", "2025-02-10", "--end", "2025-02-01"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--end must not be before --start"));
}

#[test]
fn test_preview_rejects_overlong_range() {
    cli()
        .args(["preview", "--start", "0001-01-01", "--end", "9999-12-31"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("range may cover at most 366 days"));
}

#[test]
fn test_preview_range_limit_follows_config() {
    let mut config = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(config, "[schedule]\nmax_range_days = 7").unwrap();

    cli()
        .arg("--config")
        .arg(config.path())
        .args(["preview", "--start", "2025-03-01", "--end", "2025-03-08"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("at most 7 days"));
}

#[test]
fn test_preview_rejects_unknown_pattern() {
    cli()
        .args([
            "preview",
            "--start",
            "2025-02-01",
            "--end",
            "2025-02-10",
            "--pattern",
            "fortnightly",
        ])
        .assert()
        .failure();
}
