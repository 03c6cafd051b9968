//! Error types for the ledger export pipeline.

use thiserror::Error;

/// Result type alias for export operations
pub type Result<T> = std::result::Result<T, ExportError>;

/// Errors that can occur while converting financial records into ledger
/// entries.
///
/// There is no retry logic anywhere in this crate: every variant aborts the
/// current run. Recoverable conditions (missing account mappings, unsupported
/// reporting categories, card payouts) are logged as warnings instead of
/// being surfaced here.
#[derive(Error, Debug)]
pub enum ExportError {
    /// Failed to read input or write ledger output
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV reading error, including invalid UTF-8 in a record
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The configuration store could not be decoded or encoded
    #[error("configuration store error: {0}")]
    ConfigStore(#[from] serde_json::Error),

    /// A `ledger_account_lookups` search pattern failed to compile
    #[error("invalid account lookup pattern: {0}")]
    LookupPattern(#[from] regex::Error),

    /// A date value did not match the configured date format
    #[error("unable to parse date: {0}")]
    DateParse(#[from] chrono::ParseError),

    /// A unix timestamp outside the representable range
    #[error("timestamp {0} is out of range")]
    TimestampOutOfRange(i64),

    /// A money value that could not be parsed after symbol stripping
    #[error("'{value}' does not appear to be a valid money representation")]
    MoneyParse { value: String },

    /// The CSV mapping designates an unsupported number of money columns
    #[error("you should have only 1 or 2 designated 'money_cols', got {count}")]
    MoneyColumnCount { count: usize },

    /// A configured column index of zero (columns are 1-based)
    #[error("invalid {name} column '{index}'")]
    InvalidColumn { name: &'static str, index: usize },

    /// A configured column falls outside the CSV record
    #[error("column {column} is out of range for a CSV record with {record_len} columns")]
    ColumnOutOfRange { column: usize, record_len: usize },

    /// Postings for a currency do not sum to zero
    #[error("transaction postings for currency {currency} sum to {sum}, expected zero")]
    UnbalancedTransaction { currency: String, sum: String },

    /// The payout source failed mid-iteration
    #[error("payout source error: {0}")]
    Ingestion(String),
}
