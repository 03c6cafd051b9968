//! # Ledger Export
//!
//! Converts payment processor payout data and bank/card CSV statements into
//! double-entry ledger-format text.
//!
//! ## Design Principles
//!
//! - **Decimal arithmetic**: Money uses `rust_decimal`, never floats
//! - **Balanced by construction**: every transaction's postings must sum to
//!   zero per currency before it can be rendered
//! - **Self-extending classification**: unrecognized transaction descriptors
//!   are learned into the persisted lookup list for the user to refine
//! - **Append-only output**: rendered entries are written to a text file the
//!   user curates; nothing is ever rewritten in place
//!
//! ## Example
//!
//! ```no_run
//! use ledger_export::{Config, CsvRunner};
//!
//! let mut config = Config::default();
//! let mut output = Vec::new();
//! let mut runner = CsvRunner::new(&mut output, &mut config);
//! runner.run("my-bank", "03-Feb-2021,POS GROCERY,-17.80\n".as_bytes()).unwrap();
//! ```

pub mod config;
pub mod csv_import;
pub mod error;
pub mod ledger;
pub mod lookup;
pub mod money;
pub mod stripe;

pub use config::{Config, CsvMapping, CsvSettings, StripeSettings};
pub use csv_import::CsvRunner;
pub use error::{ExportError, Result};
pub use ledger::{LedgerTransaction, TransactionPosting};
pub use lookup::{AccountLookup, LookupEntry};
pub use money::Money;
pub use stripe::{
    BalanceTransaction, JsonExportSource, Payout, StripeRunner, StripeSource,
};
