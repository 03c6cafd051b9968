//! Integration tests for the ledger export CLI.
//!
//! These tests run the actual binary against fixture data files, with the
//! configuration and output files placed in a temporary directory.

use assert_cmd::Command;
use ledger_export::{Config, CsvMapping, LookupEntry};
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::{tempdir, TempDir};

/// Get path to a fixture data file
fn test_data_path(filename: &str) -> String {
    format!("tests/data/{}", filename)
}

/// A scratch directory holding the config and output files for one test
struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new(config: &Config) -> Self {
        let dir = tempdir().unwrap();
        let workspace = Workspace { dir };
        config.save(&workspace.config_path()).unwrap();
        workspace
    }

    fn config_path(&self) -> PathBuf {
        self.dir.path().join("config.json")
    }

    fn output_path(&self) -> PathBuf {
        self.dir.path().join("ledger.dat")
    }

    fn reload_config(&self) -> Config {
        Config::load(&self.config_path()).unwrap()
    }

    fn output(&self) -> String {
        fs::read_to_string(self.output_path()).unwrap_or_default()
    }
}

fn run(workspace: &Workspace, args: &[&str]) -> assert_cmd::assert::Assert {
    let mut cmd = Command::cargo_bin("ledger-export").unwrap();
    cmd.arg("--config")
        .arg(workspace.config_path())
        .arg("--output-file")
        .arg(workspace.output_path())
        .args(args)
        .assert()
}

fn bank_mapping() -> CsvMapping {
    CsvMapping {
        ledger_account_name: "Assets:Chequing".to_string(),
        csv_date_format: "%d-%b-%Y".to_string(),
        date_col: 1,
        desc_col: 2,
        money_cols: vec![3],
        negate_amount: false,
        note_cols: vec![4],
        currency: "eur".to_string(),
        header_row: 1,
    }
}

#[test]
fn test_csv_statement_end_to_end() {
    let mut config = Config::default();
    config
        .csv
        .account
        .insert("my-bank".to_string(), bank_mapping());
    config.ledger_account_lookups.push(LookupEntry {
        search: "GROCERY".to_string(),
        account_name: "Expenses:Groceries".to_string(),
        description: "Groceries".to_string(),
        discard_transaction: false,
    });
    config.ledger_account_lookups.push(LookupEntry {
        search: "INTERNAL TRANSFER".to_string(),
        account_name: "Assets:Savings".to_string(),
        description: "Internal transfer".to_string(),
        discard_transaction: true,
    });
    let workspace = Workspace::new(&config);

    run(
        &workspace,
        &["csv", "my-bank", &test_data_path("bank_statement.csv")],
    )
    .success();

    let output = workspace.output();

    // Classified row uses the entry's description and account.
    assert!(output.contains("2021-02-03 * Groceries"));
    assert!(output.contains("Expenses:Groceries"));
    assert!(output.contains("; card ending 1234"));

    // Unrecognized descriptor falls back to the unknown-expense account.
    assert!(output.contains("2021-02-04 * SALARY ACME CORP"));
    assert!(output.contains("Expenses:Unknown"));

    // Discarded descriptor produced nothing.
    assert!(!output.contains("INTERNAL TRANSFER"));

    // The salary descriptor was learned and persisted.
    let reloaded = workspace.reload_config();
    assert!(reloaded
        .ledger_account_lookups
        .iter()
        .any(|e| e.search == "SALARY ACME CORP" && e.account_name == "Expenses:Unknown"));
}

#[test]
fn test_csv_unknown_mapping_writes_stub() {
    let workspace = Workspace::new(&Config::default());

    run(
        &workspace,
        &["csv", "amro-mastercard", &test_data_path("bank_statement.csv")],
    )
    .success();

    assert!(workspace.output().is_empty());

    let reloaded = workspace.reload_config();
    assert_eq!(
        reloaded.csv.account.get("amro-mastercard"),
        Some(&CsvMapping::stub())
    );
}

#[test]
fn test_stripe_export_end_to_end() {
    let workspace = Workspace::new(&Config::default());

    run(
        &workspace,
        &["stripe", &test_data_path("stripe_export.json")],
    )
    .success();

    let output = workspace.output();

    // The charge from the first payout, with customer metadata.
    assert!(output.contains("2021-01-31 * Stripe Payout"));
    assert!(output.contains("Income:Stripe:Customer-cus_9"));
    assert!(output.contains("; CustomerCity: Toronto"));
    assert!(output.contains("Correlates to Stripe payout po_1 from 2021-02-02 for amount 9.70 USD"));

    // The settlement record itself renders nothing.
    assert!(!output.contains("txn_settlement"));

    // The refund from the second payout, with the original fee added back.
    assert!(output.contains("Stripe Customer Refund"));
    assert!(output.contains("; Original Stripe fee: 0.15 USD"));

    // Cursor and auto-populated account defaults were persisted.
    let reloaded = workspace.reload_config();
    assert_eq!(
        reloaded.stripe.most_recently_processed_payout.as_deref(),
        Some("po_2")
    );
    assert_eq!(
        reloaded.ledger_accounts.get("income").map(String::as_str),
        Some("Income:Stripe")
    );
    assert!(reloaded.ledger_accounts.contains_key("bank_account_ba_1abc"));
}

#[test]
fn test_stripe_second_run_resumes_after_cursor() {
    let workspace = Workspace::new(&Config::default());

    run(
        &workspace,
        &["stripe", &test_data_path("stripe_export.json")],
    )
    .success();
    let first = workspace.output();

    // Nothing new after the cursor, so the output file does not grow.
    run(
        &workspace,
        &["stripe", &test_data_path("stripe_export.json")],
    )
    .success();
    assert_eq!(workspace.output(), first);
}

#[test]
fn test_output_file_is_appended_not_truncated() {
    let mut config = Config::default();
    config
        .csv
        .account
        .insert("my-bank".to_string(), bank_mapping());
    let workspace = Workspace::new(&config);

    run(
        &workspace,
        &["csv", "my-bank", &test_data_path("bank_statement.csv")],
    )
    .success();
    let first_len = workspace.output().len();

    run(
        &workspace,
        &["csv", "my-bank", &test_data_path("bank_statement.csv")],
    )
    .success();
    assert_eq!(workspace.output().len(), first_len * 2);
}

#[test]
fn test_missing_subcommand_fails() {
    let workspace = Workspace::new(&Config::default());
    run(&workspace, &[]).failure();
}

#[test]
fn test_missing_input_file_reports_error() {
    let workspace = Workspace::new(&Config::default());

    run(&workspace, &["stripe", "no-such-export.json"])
        .failure()
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn test_stdout_used_without_output_file() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("config.json");
    let mut config = Config::default();
    config
        .csv
        .account
        .insert("my-bank".to_string(), bank_mapping());
    config.save(&config_path).unwrap();

    let mut cmd = Command::cargo_bin("ledger-export").unwrap();
    cmd.arg("--config")
        .arg(&config_path)
        .args(["csv", "my-bank"])
        .arg(test_data_path("bank_statement.csv"))
        .assert()
        .success()
        .stdout(predicate::str::contains("SALARY ACME CORP"));
}
