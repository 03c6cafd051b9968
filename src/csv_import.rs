//! Bank/card CSV statement ingestion.
//!
//! Each data row becomes a two-posting transaction: the configured primary
//! account on one side and a counter account resolved through the description
//! classifier on the other. Column layout comes from a named mapping profile
//! in the configuration; an unknown profile name synthesizes a stub profile
//! for the user to edit, and that run produces no output.

use crate::config::{Config, CsvMapping};
use crate::error::{ExportError, Result};
use crate::ledger::{LedgerTransaction, TransactionPosting};
use crate::lookup::AccountLookup;
use crate::money;
use chrono::{NaiveDate, NaiveTime};
use csv::ReaderBuilder;
use log::{debug, info, warn};
use std::io::{Read, Write};

/// Fallback counter account for descriptors the classifier has never seen.
const DEFAULT_COUNTER_ACCOUNT: &str = "Expenses:Unknown";

/// Fallback primary account when the mapping leaves it empty.
const DEFAULT_PRIMARY_ACCOUNT: &str = "Assets:Bank";

/// Fallback currency when the mapping leaves it empty.
const DEFAULT_CURRENCY: &str = "eur";

/// Drives the CSV path: reads a statement, maps each row through the
/// configured profile, and writes the rendered entries.
pub struct CsvRunner<'a, W: Write> {
    writer: W,
    config: &'a mut Config,
}

impl<'a, W: Write> CsvRunner<'a, W> {
    pub fn new(writer: W, config: &'a mut Config) -> Self {
        CsvRunner { writer, config }
    }

    /// Processes one statement under the named mapping profile. Returns the
    /// number of rows converted.
    ///
    /// When no profile with that name exists, a stub profile is written into
    /// the configuration and the statement is left unprocessed so the user
    /// can adjust the columns first.
    pub fn run<R: Read>(&mut self, mapping_name: &str, input: R) -> Result<u64> {
        let mapping = match self.config.csv.account.get(mapping_name) {
            Some(mapping) => mapping.clone(),
            None => {
                warn!(
                    "No CSV mapping named {} found; writing a stub mapping to the config \
                     for you to edit",
                    mapping_name
                );
                self.config
                    .csv
                    .account
                    .insert(mapping_name.to_string(), CsvMapping::stub());
                return Ok(0);
            }
        };

        if mapping.date_col < 1 {
            return Err(ExportError::InvalidColumn {
                name: "date",
                index: mapping.date_col,
            });
        }
        if mapping.desc_col < 1 {
            return Err(ExportError::InvalidColumn {
                name: "description",
                index: mapping.desc_col,
            });
        }

        let mut lookup = AccountLookup::from_entries(self.config.ledger_account_lookups.clone())?;

        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(input);

        let mut processed: u64 = 0;
        for (idx, record) in reader.records().enumerate() {
            let record = record?;
            let row = idx + 1;

            if mapping.header_row == row {
                debug!("Skipping header row {}", row);
                continue;
            }

            if self.process_record(&record, &mapping, &mut lookup)? {
                processed += 1;
            }
        }

        self.config.ledger_account_lookups = lookup.entries().to_vec();
        info!("Successfully processed {} CSV rows", processed);
        Ok(processed)
    }

    /// Converts one data row. Returns `false` when the row was discarded.
    fn process_record(
        &mut self,
        record: &csv::StringRecord,
        mapping: &CsvMapping,
        lookup: &mut AccountLookup,
    ) -> Result<bool> {
        let fields: Vec<&str> = record.iter().collect();

        // All configured columns must exist in this row.
        let mut max_col = mapping.date_col.max(mapping.desc_col);
        for &c in mapping.money_cols.iter().chain(mapping.note_cols.iter()) {
            max_col = max_col.max(c);
        }
        if max_col > fields.len() {
            return Err(ExportError::ColumnOutOfRange {
                column: max_col,
                record_len: fields.len(),
            });
        }

        let raw_date = fields[mapping.date_col - 1].trim();
        let date = NaiveDate::parse_from_str(raw_date, &mapping.csv_date_format)?
            .and_time(NaiveTime::MIN)
            .and_utc();

        let description = fields[mapping.desc_col - 1].trim();
        let entry = lookup
            .get_or_add(description, DEFAULT_COUNTER_ACCOUNT)?
            .clone();

        if entry.discard_transaction {
            debug!(
                "Discarding CSV row {:?} as per lookup entry {:?}",
                description, entry
            );
            return Ok(false);
        }

        let mut amount = money::coerce_columns(&fields, &mapping.money_cols)?;
        if mapping.negate_amount {
            amount = -amount;
        }

        let primary_account = if mapping.ledger_account_name.is_empty() {
            DEFAULT_PRIMARY_ACCOUNT.to_string()
        } else {
            mapping.ledger_account_name.clone()
        };
        let currency = if mapping.currency.is_empty() {
            DEFAULT_CURRENCY.to_string()
        } else {
            mapping.currency.clone()
        };

        let postings = vec![
            TransactionPosting {
                account: primary_account,
                amount,
                currency: currency.clone(),
            },
            TransactionPosting {
                account: entry.account_name.clone(),
                amount: -amount,
                currency,
            },
        ];

        let mut txn = LedgerTransaction::new(date, &entry.description, postings)?;
        txn.set_date_format(&self.config.date_format_string);

        for &col in &mapping.note_cols {
            // 0 is the conventional "unused" placeholder in stub mappings.
            if col == 0 {
                continue;
            }
            let note = fields[col - 1].trim();
            if !note.is_empty() {
                txn.add_comment(note);
            }
        }

        writeln!(self.writer, "{}", txn)?;
        Ok(true)
    }
}
