//! Ledger transaction aggregate: balanced postings plus text rendering.
//!
//! A [`LedgerTransaction`] is constructed once per input record, validated
//! against the zero-sum invariant, rendered, and discarded. The only
//! mutations allowed after construction are appended comments and a date
//! format override, both of which must happen before rendering.

use crate::error::{ExportError, Result};
use crate::money::Money;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;

/// Default ledger date rendering pattern (chrono format string).
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

/// One account/amount/currency line within a transaction.
///
/// Not independently persisted; postings exist only as members of a
/// [`LedgerTransaction`].
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionPosting {
    /// Ledger account name, e.g. `Expenses:Stripe Fees`
    pub account: String,

    /// Signed amount in major currency units
    pub amount: Money,

    /// ISO-like currency code; uppercased on output
    pub currency: String,
}

/// A dated, described group of postings whose amounts sum to zero.
///
/// # Invariant
///
/// For postings sharing a currency, the amounts must sum to within 1e-8 of
/// zero at construction time. Violation is a permanent construction error; an
/// unbalanced transaction indicates either a bug or an unmodeled transaction
/// category and is never silently corrected.
#[derive(Debug, Clone)]
pub struct LedgerTransaction {
    date: DateTime<Utc>,
    date_format: String,
    cleared: bool,
    description: String,
    comments: Vec<String>,
    postings: Vec<TransactionPosting>,
}

impl LedgerTransaction {
    /// Validates the zero-sum invariant and constructs the transaction.
    pub fn new(
        date: DateTime<Utc>,
        description: &str,
        postings: Vec<TransactionPosting>,
    ) -> Result<Self> {
        let mut sums: BTreeMap<&str, Money> = BTreeMap::new();
        for posting in &postings {
            let sum = sums.entry(posting.currency.as_str()).or_insert(Money::ZERO);
            *sum += posting.amount;
        }

        for (currency, sum) in sums {
            if !sum.approx_is_zero() {
                return Err(ExportError::UnbalancedTransaction {
                    currency: currency.to_uppercase(),
                    sum: sum.to_string(),
                });
            }
        }

        Ok(LedgerTransaction {
            date,
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            cleared: true,
            description: description.to_string(),
            comments: Vec::new(),
            postings,
        })
    }

    /// Appends a free-form comment line.
    pub fn add_comment(&mut self, comment: impl Into<String>) {
        self.comments.push(comment.into());
    }

    /// Appends a `Key: value` comment line, skipped when the value is empty.
    pub fn add_key_val_comment(&mut self, key: &str, value: &str) {
        if !value.is_empty() {
            self.comments.push(format!("{}: {}", key, value));
        }
    }

    /// Overrides the date rendering pattern (chrono format string).
    pub fn set_date_format(&mut self, pattern: &str) {
        self.date_format = pattern.to_string();
    }

    /// Formats a unix timestamp with this transaction's date pattern, in UTC.
    pub fn format_date(&self, timestamp: i64) -> Result<String> {
        let date = utc_datetime(timestamp)?;
        Ok(date.format(&self.date_format).to_string())
    }

    /// The postings of this transaction, in construction order.
    pub fn postings(&self) -> &[TransactionPosting] {
        &self.postings
    }
}

/// Converts a unix timestamp to a UTC datetime, so that rendering is
/// reproducible regardless of local time zone.
pub fn utc_datetime(timestamp: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .ok_or(ExportError::TimestampOutOfRange(timestamp))
}

/// Formats a minor-unit amount as `<value to 2dp> <UPPERCASE CURRENCY>`.
pub fn format_minor_amount(minor: i64, currency: &str) -> String {
    format!(
        "{:.2} {}",
        Money::from_minor_units(minor),
        currency.to_uppercase()
    )
}

/// Collapses every run of whitespace to a single space and trims the ends.
fn sanitize_description(description: &str) -> String {
    description.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl fmt::Display for LedgerTransaction {
    /// Renders the transaction as a ledger-format text block.
    ///
    /// Header line, comment lines prefixed with `; `, then posting lines with
    /// account names padded to the widest account in this transaction and
    /// amounts formatted to exactly two decimal places. The block ends with a
    /// newline; the caller adds the blank separator line between blocks.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = if self.cleared { "*" } else { "!" };
        writeln!(
            f,
            "{} {} {}",
            self.date.format(&self.date_format),
            marker,
            sanitize_description(&self.description)
        )?;

        for comment in &self.comments {
            writeln!(f, "    ; {}", comment)?;
        }

        let width = self
            .postings
            .iter()
            .map(|p| p.account.len())
            .max()
            .unwrap_or(0);

        for posting in &self.postings {
            writeln!(
                f,
                "    {:<width$}  {:.2} {}",
                posting.account,
                posting.amount,
                posting.currency.to_uppercase(),
                width = width
            )?;
        }

        Ok(())
    }
}
