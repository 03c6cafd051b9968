//! Persistent flat configuration store.
//!
//! All state that survives between runs lives here: the ledger account
//! overrides, the learned account lookup list, the Stripe pagination cursor,
//! and the per-profile CSV mappings. The store is a single JSON file loaded
//! into a typed structure and written back atomically at the end of a run.
//!
//! There is no ambient global configuration; a `Config` is passed by
//! reference into each runner.

use crate::error::Result;
use crate::ledger::DEFAULT_DATE_FORMAT;
use crate::lookup::LookupEntry;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Top-level configuration, mirrored one-to-one in the JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Ledger date rendering pattern (chrono format string)
    pub date_format_string: String,

    /// Account name overrides: `income`, `stripe_fees`,
    /// `bank_account_<destination-id>`, `tax_account_<tax-rate-id>`
    pub ledger_accounts: BTreeMap<String, String>,

    /// Ordered account classification rules, grown during runs
    pub ledger_account_lookups: Vec<LookupEntry>,

    /// Stripe ingestion settings
    pub stripe: StripeSettings,

    /// CSV ingestion settings
    pub csv: CsvSettings,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            date_format_string: DEFAULT_DATE_FORMAT.to_string(),
            ledger_accounts: BTreeMap::new(),
            ledger_account_lookups: Vec::new(),
            stripe: StripeSettings::default(),
            csv: CsvSettings::default(),
        }
    }
}

/// Settings for the Stripe ingestion path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StripeSettings {
    /// Attach customer address comments to charge entries
    pub add_customer_metadata: bool,

    /// Pagination cursor: id of the most recently seen payout
    pub most_recently_processed_payout: Option<String>,
}

impl Default for StripeSettings {
    fn default() -> Self {
        StripeSettings {
            add_customer_metadata: true,
            most_recently_processed_payout: None,
        }
    }
}

/// Settings for the CSV ingestion path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvSettings {
    /// Named mapping profiles, keyed by the `--mapping` argument
    pub account: BTreeMap<String, CsvMapping>,
}

/// Column mapping for one CSV account profile. All columns are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvMapping {
    /// Primary ledger account the statement belongs to
    pub ledger_account_name: String,

    /// chrono format string for the statement's date column
    pub csv_date_format: String,

    /// Date column
    pub date_col: usize,

    /// Description column
    pub desc_col: usize,

    /// One (signed) or two (debit, credit) money columns
    pub money_cols: Vec<usize>,

    /// Flip the sign of both postings
    pub negate_amount: bool,

    /// Columns copied into comment lines; 0 entries are skipped
    pub note_cols: Vec<usize>,

    /// Currency code applied to both postings
    pub currency: String,

    /// 1-based row to skip as a header; 0 means no header
    pub header_row: usize,
}

impl Default for CsvMapping {
    fn default() -> Self {
        CsvMapping::stub()
    }
}

impl CsvMapping {
    /// The generic profile synthesized when a requested mapping is absent,
    /// meant to be reviewed and edited by the user before the next run.
    pub fn stub() -> Self {
        CsvMapping {
            ledger_account_name: "Assets:Bank".to_string(),
            csv_date_format: "%d-%b-%Y".to_string(),
            date_col: 1,
            desc_col: 2,
            money_cols: vec![3],
            negate_amount: false,
            note_cols: vec![4, 5],
            currency: "eur".to_string(),
            header_row: 0,
        }
    }
}

impl Config {
    /// Loads the configuration from a JSON file.
    ///
    /// A missing file yields the defaults, so a first run can start from an
    /// empty store.
    pub fn load(path: &Path) -> Result<Config> {
        if !path.exists() {
            debug!(
                "Config file {} does not exist yet, starting from defaults",
                path.display()
            );
            return Ok(Config::default());
        }
        let data = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Writes the configuration back atomically (temp file + rename).
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Returns the account name override for `key` under `ledger_accounts`,
    /// or auto-populates it with `default` and logs a warning.
    pub fn ledger_account(&mut self, key: &str, default: &str) -> String {
        if let Some(account) = self.ledger_accounts.get(key) {
            return account.clone();
        }
        warn!(
            "No account map set for ledger_accounts.{}, using the default value of {} instead",
            key, default
        );
        self.ledger_accounts
            .insert(key.to_string(), default.to_string());
        default.to_string()
    }
}
