use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const BANK_CSV: &str = "\
Posting Date,Description,Amount,Balance
04/01/2025,DIRECT DEP ACME CORP PAYROLL,5000.00,8000.00
04/02/2025,MORTGAGE PAYMENT,-2400.00,5600.00
04/03/2025,ZELLE PAYMENT TO JOHN,-200.00,5400.00
04/05/2025,DIVIDEND SCHWAB,150.00,5550.00
04/06/2025,STARBCKS #123,-6.00,5544.00
04/07/2025,QQQ ZXVY 0091,-44.00,5500.00
bad date,BROKEN ROW,1.00,
";

const MORTGAGE_CSV: &str = "\
Period,Total,Principal,Interest
2025-04,2400.00,800.00,1600.00
";

fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

fn flowbook(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("flowbook").unwrap();
    cmd.env("HOME", home).env("NO_COLOR", "1").env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_analyze_text_report() {
    let dir = TempDir::new().unwrap();
    let bank = write(&dir, "bank.csv", BANK_CSV);
    let mortgage = write(&dir, "mortgage.csv", MORTGAGE_CSV);
    flowbook(dir.path())
        .arg("analyze")
        .arg(&bank)
        .arg("--mortgage")
        .arg(&mortgage)
        .assert()
        .success()
        .stdout(predicate::str::contains("Overall cash flow"))
        .stdout(predicate::str::contains("$5,150.00"))
        .stdout(predicate::str::contains("Mortgage Interest"))
        .stdout(predicate::str::contains("Interest paid"))
        .stdout(predicate::str::contains("Daily burn"))
        .stdout(predicate::str::contains("row 8: dropped"));
}

#[test]
fn test_analyze_json() {
    let dir = TempDir::new().unwrap();
    let bank = write(&dir, "bank.csv", BANK_CSV);
    let mortgage = write(&dir, "mortgage.csv", MORTGAGE_CSV);
    let output = flowbook(dir.path())
        .args(["analyze", "--json", "--mortgage"])
        .arg(&mortgage)
        .arg(&bank)
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["summary"]["overall"]["total_income"], "5150.00");
    assert_eq!(json["summary"]["overall"]["mortgage_interest"], "1600.00");
    assert_eq!(json["dropped_rows"][0]["row"], 8);
    assert_eq!(json["summary"]["mortgage"]["payments_split"], 1);
    assert_eq!(json["summary"]["mortgage"]["total_principal"], "800.00");
    assert!(json["validation"]["balance_breaks"].as_array().unwrap().is_empty());
}

#[test]
fn test_analyze_single_month() {
    let dir = TempDir::new().unwrap();
    let bank = write(&dir, "bank.csv", BANK_CSV);
    flowbook(dir.path())
        .args(["analyze", "--month", "2025-04"])
        .arg(&bank)
        .assert()
        .success()
        .stdout(predicate::str::contains("Cash flow for 2025-04"));

    flowbook(dir.path())
        .args(["analyze", "--month", "2024-01"])
        .arg(&bank)
        .assert()
        .failure()
        .stderr(predicate::str::contains("no transactions in 2024-01"));
}

#[test]
fn test_invalid_month_is_rejected_by_parser() {
    let dir = TempDir::new().unwrap();
    let bank = write(&dir, "bank.csv", BANK_CSV);
    flowbook(dir.path())
        .args(["analyze", "--month", "April"])
        .arg(&bank)
        .assert()
        .failure()
        .stderr(predicate::str::contains("YYYY-MM"));
}

#[test]
fn test_register_shows_flows() {
    let dir = TempDir::new().unwrap();
    let bank = write(&dir, "bank.csv", BANK_CSV);
    flowbook(dir.path())
        .arg("register")
        .arg(&bank)
        .assert()
        .success()
        .stdout(predicate::str::contains("INTERNAL_TRANSFER"))
        .stdout(predicate::str::contains("Personal Transfer"))
        .stdout(predicate::str::contains("Investment Income"));
}

#[test]
fn test_flagged_lists_uncategorized() {
    let dir = TempDir::new().unwrap();
    let bank = write(&dir, "bank.csv", BANK_CSV);
    flowbook(dir.path())
        .arg("flagged")
        .arg(&bank)
        .assert()
        .success()
        .stdout(predicate::str::contains("QQQ ZXVY 0091"))
        .stdout(predicate::str::contains("need review"));
}

#[test]
fn test_custom_rule_from_config() {
    let dir = TempDir::new().unwrap();
    let bank = write(&dir, "bank.csv", BANK_CSV);
    let config = write(
        &dir,
        "settings.json",
        r#"{"custom_rules": [{"description_contains": "QQQ", "category": "Hobbies"}]}"#,
    );
    flowbook(dir.path())
        .arg("flagged")
        .arg(&bank)
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("QQQ ZXVY 0091").not());
}

#[test]
fn test_invalid_config_fails() {
    let dir = TempDir::new().unwrap();
    let bank = write(&dir, "bank.csv", BANK_CSV);
    let config = write(&dir, "settings.json", r#"{"confidence_threshold": 3}"#);
    flowbook(dir.path())
        .arg("analyze")
        .arg(&bank)
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::starts_with("Error: loading settings"));
}

#[test]
fn test_missing_file_fails_with_context() {
    let dir = TempDir::new().unwrap();
    flowbook(dir.path())
        .args(["analyze", "does-not-exist.csv"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("reading does-not-exist.csv"));
}

#[test]
fn test_init_then_rules() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("conf").join("settings.json");
    flowbook(dir.path())
        .arg("init")
        .arg("--path")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote default settings"));
    assert!(path.exists());

    flowbook(dir.path())
        .arg("init")
        .arg("--path")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    flowbook(dir.path())
        .arg("rules")
        .arg("--config")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("MORTGAGE PAYMENT"))
        .stdout(predicate::str::contains("Pattern rules"));
}
