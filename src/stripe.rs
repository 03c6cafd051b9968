//! Stripe ingestion path: normalized payout data model, the ingestion-source
//! contract, and the per-category posting builders.
//!
//! Network pagination against the Stripe API is out of scope; this module
//! consumes already-fetched, normalized records through the [`StripeSource`]
//! trait. The shipped [`JsonExportSource`] reads such records from a local
//! JSON export file so the `stripe` subcommand works on offline data.

use crate::config::Config;
use crate::error::{ExportError, Result};
use crate::ledger::{format_minor_amount, utc_datetime, LedgerTransaction, TransactionPosting};
use crate::lookup::{AccountLookup, LookupEntry};
use crate::money::{self, Money};
use log::{debug, info, warn};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;

/// Built-in default account names, used when no override is configured.
const DEFAULT_INCOME_ACCOUNT: &str = "Income:Stripe";
const DEFAULT_FEES_ACCOUNT: &str = "Expenses:Stripe Fees";
const DEFAULT_BANK_ACCOUNT: &str = "Assets:Bank";
const DEFAULT_TAX_ACCOUNT: &str = "Liabilities:SalesTax";

/// Stable classifier search keys for accounts not tied to a raw descriptor.
const INCOME_SEARCH_KEY: &str = "stripe-income-source";
const FEES_SEARCH_KEY: &str = "stripe-fees";

/// A processor-initiated transfer of accumulated funds to a destination,
/// bundling one or more balance transactions.
#[derive(Debug, Clone, Deserialize)]
pub struct Payout {
    pub id: String,

    /// Payout amount in minor units (cents)
    pub amount: i64,

    pub currency: String,

    /// Creation timestamp (unix seconds); drives the pagination cursor
    pub created: i64,

    /// Arrival timestamp (unix seconds), used in correlation comments
    pub arrival_date: i64,

    /// `paid` payouts are the only ones processed
    #[serde(default = "default_payout_status")]
    pub status: String,

    /// `bank_account` or `card`; card payouts are skipped with a warning
    #[serde(default)]
    pub payout_type: String,

    /// Identifier of the expanded destination (bank account)
    #[serde(default)]
    pub destination_id: String,
}

fn default_payout_status() -> String {
    "paid".to_string()
}

fn default_exchange_rate() -> f64 {
    1.0
}

/// A processor-reported financial event within a payout.
#[derive(Debug, Clone, Deserialize)]
pub struct BalanceTransaction {
    pub id: String,

    /// Classification tag selecting the posting-builder logic:
    /// `charge`, `refund`, `dispute`, `fee`, `payout`, ...
    pub reporting_category: String,

    /// Gross amount in minor units
    pub amount: i64,

    /// Processor fee in minor units
    pub fee: i64,

    /// Net amount in minor units (`amount - fee`)
    pub net: i64,

    pub currency: String,

    /// Creation timestamp (unix seconds); becomes the ledger entry date
    pub created: i64,

    /// Rate from the source currency into this transaction's currency
    #[serde(default = "default_exchange_rate")]
    pub exchange_rate: f64,

    /// Expanded source charge/refund details, when available
    #[serde(default)]
    pub source: Option<TxnSource>,
}

/// Details pulled off the expanded source chain
/// (charge → invoice → tax amounts, charge → balance transaction).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TxnSource {
    /// Customer identifier, suffixes the income account when present
    pub customer_id: Option<String>,

    /// Customer billing address for the metadata comments
    pub billing_address: Option<BillingAddress>,

    /// Invoice tax line items, decomposed into liability postings
    pub tax_amounts: Vec<TaxAmount>,

    /// For refunds: the fee of the original charge's balance transaction
    pub original_charge_fee: Option<i64>,
}

/// One invoice tax line item.
#[derive(Debug, Clone, Deserialize)]
pub struct TaxAmount {
    pub tax_rate_id: String,

    /// Tax amount in minor units of `currency`
    pub amount: i64,

    /// May differ from the parent transaction's currency, in which case the
    /// amount is normalized via the stored exchange rate
    pub currency: String,
}

/// Customer billing address metadata.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BillingAddress {
    pub city: String,
    pub state: String,
    pub country: String,
    pub postal_code: String,
}

/// Contract for the external payout/balance-transaction supplier.
///
/// Implementations yield records in a defined order (payout list order, then
/// balance-transaction order within a payout). A terminal error is surfaced
/// as `Err`, distinct from an empty result.
pub trait StripeSource {
    /// Lists paid payouts, optionally resuming after a saved cursor.
    fn payouts(&mut self, starting_after: Option<&str>) -> Result<Vec<Payout>>;

    /// Lists the balance transactions bundled in one payout, with the
    /// invoice/charge/charge-balance-transaction chain expanded.
    fn balance_transactions(&mut self, payout_id: &str) -> Result<Vec<BalanceTransaction>>;
}

/// Shape of a local JSON payout export.
#[derive(Debug, Deserialize)]
struct ExportFile {
    payouts: Vec<Payout>,

    /// Balance transactions keyed by payout id
    #[serde(default)]
    balance_transactions: BTreeMap<String, Vec<BalanceTransaction>>,
}

/// [`StripeSource`] backed by a local JSON export file.
pub struct JsonExportSource {
    data: ExportFile,
}

impl JsonExportSource {
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let data: ExportFile = serde_json::from_reader(reader)?;
        Ok(JsonExportSource { data })
    }
}

impl StripeSource for JsonExportSource {
    fn payouts(&mut self, starting_after: Option<&str>) -> Result<Vec<Payout>> {
        let mut skipping = starting_after.is_some();
        let mut result = Vec::new();
        for payout in &self.data.payouts {
            if skipping {
                if Some(payout.id.as_str()) == starting_after {
                    skipping = false;
                }
                continue;
            }
            if payout.status == "paid" {
                result.push(payout.clone());
            }
        }
        Ok(result)
    }

    fn balance_transactions(&mut self, payout_id: &str) -> Result<Vec<BalanceTransaction>> {
        Ok(self
            .data
            .balance_transactions
            .get(payout_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// Drives the Stripe path: iterates payouts, dispatches balance transactions
/// to the per-category builders, writes the rendered entries, and maintains
/// the pagination cursor.
pub struct StripeRunner<'a, S: StripeSource, W: Write> {
    source: S,
    writer: W,
    config: &'a mut Config,
    lookup: AccountLookup,
}

impl<'a, S: StripeSource, W: Write> StripeRunner<'a, S, W> {
    /// Creates a runner, compiling the persisted account lookup list.
    pub fn new(source: S, writer: W, config: &'a mut Config) -> Result<Self> {
        let lookup = AccountLookup::from_entries(config.ledger_account_lookups.clone())?;
        Ok(StripeRunner {
            source,
            writer,
            config,
            lookup,
        })
    }

    /// Processes every payout after the saved cursor. Returns the number of
    /// payouts seen.
    ///
    /// The persisted cursor is the payout with the greatest creation
    /// timestamp, computed as a running maximum over the listed order, not
    /// simply the last payout iterated.
    pub fn run(&mut self) -> Result<u64> {
        let cursor = self.config.stripe.most_recently_processed_payout.clone();
        let payouts = self
            .source
            .payouts(cursor.as_deref())
            .map_err(|e| ExportError::Ingestion(e.to_string()))?;

        let mut most_recent_created: i64 = 0;
        let mut processed: u64 = 0;

        for payout in &payouts {
            processed += 1;

            if payout.created > most_recent_created {
                most_recent_created = payout.created;
                debug!(
                    "Saving payout id {} as the most recently seen payout",
                    payout.id
                );
                self.config.stripe.most_recently_processed_payout = Some(payout.id.clone());
            }

            self.process_payout(payout)?;
        }

        self.config.ledger_account_lookups = self.lookup.entries().to_vec();
        info!("Successfully processed {} Stripe payouts", processed);
        Ok(processed)
    }

    fn process_payout(&mut self, payout: &Payout) -> Result<()> {
        debug!(
            "Processing stripe payout {} for {} (paid out to {} {})",
            payout.id,
            format_minor_amount(payout.amount, &payout.currency),
            payout.payout_type,
            payout.destination_id
        );

        if payout.payout_type == "card" {
            warn!(
                "Payouts to cards (vs bank accounts) are not supported; ignoring payout {}",
                payout.id
            );
            return Ok(());
        }

        let transactions = self
            .source
            .balance_transactions(&payout.id)
            .map_err(|e| ExportError::Ingestion(e.to_string()))?;

        for bt in &transactions {
            self.process_balance_transaction(bt, payout)?;
        }

        Ok(())
    }

    /// Dispatches one balance transaction to its category builder.
    ///
    /// Only the payment-related reporting categories are modeled. The
    /// `payout` category is skipped silently: that settlement record is
    /// already fully covered by the sum of its constituent categories and
    /// would double-count.
    fn process_balance_transaction(
        &mut self,
        bt: &BalanceTransaction,
        payout: &Payout,
    ) -> Result<()> {
        debug!("Processing stripe balance transaction {}", bt.id);

        match bt.reporting_category.as_str() {
            "payout" => {
                debug!(
                    "Ignoring balance transaction {} as this payout is covered by its \
                     constituent categories",
                    bt.id
                );
                Ok(())
            }
            "charge" => self.process_charge(bt, payout),
            "dispute" => self.process_dispute(bt, payout),
            "refund" => self.process_refund(bt, payout),
            "fee" => self.process_fee(bt, payout),
            other => {
                warn!(
                    "Balance transactions with the {} reporting category are not supported; \
                     skipping {}",
                    other, bt.id
                );
                Ok(())
            }
        }
    }

    /// Resolves the destination bank account through the classifier, keyed by
    /// the payout's destination id.
    fn bank_account(&mut self, payout: &Payout) -> Result<LookupEntry> {
        let destination = payout.destination_id.to_lowercase();
        let default = self
            .config
            .ledger_account(&format!("bank_account_{}", destination), DEFAULT_BANK_ACCOUNT);
        Ok(self.lookup.get_or_add(&destination, &default)?.clone())
    }

    /// Resolves the income account, suffixed per customer when one is known.
    fn income_account(&mut self, customer_id: Option<&str>) -> Result<LookupEntry> {
        let base = self
            .config
            .ledger_account("income", DEFAULT_INCOME_ACCOUNT);
        let (key, default) = match customer_id {
            Some(id) => (
                format!("{}:{}", INCOME_SEARCH_KEY, id),
                format!("{}:Customer-{}", base, id),
            ),
            None => (INCOME_SEARCH_KEY.to_string(), base),
        };
        Ok(self.lookup.get_or_add(&key, &default)?.clone())
    }

    /// Resolves the processor-fees expense account.
    fn fees_account(&mut self) -> Result<LookupEntry> {
        let default = self
            .config
            .ledger_account("stripe_fees", DEFAULT_FEES_ACCOUNT);
        Ok(self.lookup.get_or_add(FEES_SEARCH_KEY, &default)?.clone())
    }

    /// Resolves one per-tax-rate liability account.
    fn tax_account(&mut self, tax_rate_id: &str) -> Result<LookupEntry> {
        let rate = tax_rate_id.to_lowercase();
        let default = self
            .config
            .ledger_account(&format!("tax_account_{}", rate), DEFAULT_TAX_ACCOUNT);
        Ok(self.lookup.get_or_add(&rate, &default)?.clone())
    }

    /// Builds the tax liability postings and returns the accumulated tax in
    /// the transaction's own currency (minor units).
    fn tax_postings(
        &mut self,
        bt: &BalanceTransaction,
        postings: &mut Vec<TransactionPosting>,
    ) -> Result<i64> {
        let mut total_tax: i64 = 0;

        if let Some(source) = &bt.source {
            for tax in &source.tax_amounts {
                let entry = self.tax_account(&tax.tax_rate_id)?;

                let normalized = if tax.currency.eq_ignore_ascii_case(&bt.currency) {
                    tax.amount
                } else {
                    money::normalize_minor_units(tax.amount, bt.exchange_rate)?
                };
                total_tax += normalized;

                postings.push(TransactionPosting {
                    account: entry.account_name,
                    amount: -Money::from_minor_units(normalized),
                    currency: bt.currency.clone(),
                });
            }
        }

        Ok(total_tax)
    }

    /// Attaches the payout correlation comment and, when enabled, customer
    /// address metadata.
    fn annotate(
        &self,
        txn: &mut LedgerTransaction,
        bt: &BalanceTransaction,
        payout: &Payout,
    ) -> Result<()> {
        txn.add_comment(format!(
            "Correlates to Stripe payout {} from {} for amount {}",
            payout.id,
            txn.format_date(payout.arrival_date)?,
            format_minor_amount(payout.amount, &payout.currency)
        ));

        if self.config.stripe.add_customer_metadata {
            if let Some(address) = bt.source.as_ref().and_then(|s| s.billing_address.as_ref()) {
                txn.add_key_val_comment("CustomerCity", &address.city);
                txn.add_key_val_comment("CustomerState", &address.state);
                txn.add_key_val_comment("CustomerCountry", &address.country);
                txn.add_key_val_comment("CustomerPostalCode", &address.postal_code);
            }
        }

        Ok(())
    }

    fn emit(&mut self, txn: &LedgerTransaction) -> Result<()> {
        writeln!(self.writer, "{}", txn)?;
        Ok(())
    }

    /// Charge: tax liabilities, income net of tax, processor fee, bank net.
    fn process_charge(&mut self, bt: &BalanceTransaction, payout: &Payout) -> Result<()> {
        let bank = self.bank_account(payout)?;
        let customer = bt
            .source
            .as_ref()
            .and_then(|s| s.customer_id.clone());
        let income = self.income_account(customer.as_deref())?;

        if income.discard_transaction {
            debug!(
                "Discarding balance transaction {} as per lookup entry {:?}",
                bt.id, income
            );
            return Ok(());
        }

        let mut postings = Vec::new();
        let total_tax = self.tax_postings(bt, &mut postings)?;
        let fees = self.fees_account()?;

        postings.push(TransactionPosting {
            account: income.account_name,
            amount: -Money::from_minor_units(bt.amount - total_tax),
            currency: bt.currency.clone(),
        });
        postings.push(TransactionPosting {
            account: fees.account_name,
            amount: Money::from_minor_units(bt.fee),
            currency: bt.currency.clone(),
        });
        postings.push(TransactionPosting {
            account: bank.account_name,
            amount: Money::from_minor_units(bt.net),
            currency: bt.currency.clone(),
        });

        let mut txn = LedgerTransaction::new(utc_datetime(bt.created)?, "Stripe Payout", postings)?;
        txn.set_date_format(&self.config.date_format_string);
        self.annotate(&mut txn, bt, payout)?;
        self.emit(&txn)
    }

    /// Refund: mirrors a charge with inverted signs, adding the original
    /// charge's fee back to both the income and destination lines since the
    /// refund reverses that fee's effect.
    fn process_refund(&mut self, bt: &BalanceTransaction, payout: &Payout) -> Result<()> {
        let bank = self.bank_account(payout)?;
        let customer = bt
            .source
            .as_ref()
            .and_then(|s| s.customer_id.clone());
        let income = self.income_account(customer.as_deref())?;

        if income.discard_transaction {
            debug!(
                "Discarding balance transaction {} as per lookup entry {:?}",
                bt.id, income
            );
            return Ok(());
        }

        let mut postings = Vec::new();
        let total_tax = self.tax_postings(bt, &mut postings)?;
        let fees = self.fees_account()?;

        let original_fee = bt
            .source
            .as_ref()
            .and_then(|s| s.original_charge_fee)
            .unwrap_or(0);

        postings.push(TransactionPosting {
            account: income.account_name,
            amount: -Money::from_minor_units(bt.amount - total_tax + original_fee),
            currency: bt.currency.clone(),
        });
        postings.push(TransactionPosting {
            account: fees.account_name,
            amount: Money::from_minor_units(bt.fee),
            currency: bt.currency.clone(),
        });
        postings.push(TransactionPosting {
            account: bank.account_name,
            amount: Money::from_minor_units(bt.net + original_fee),
            currency: bt.currency.clone(),
        });

        let mut txn =
            LedgerTransaction::new(utc_datetime(bt.created)?, "Stripe Customer Refund", postings)?;
        txn.set_date_format(&self.config.date_format_string);
        self.annotate(&mut txn, bt, payout)?;
        if original_fee > 0 {
            txn.add_key_val_comment(
                "Original Stripe fee",
                &format_minor_amount(original_fee, &payout.currency),
            );
        }
        self.emit(&txn)
    }

    /// Dispute: no tax decomposition; gross against income, fee, net to bank.
    fn process_dispute(&mut self, bt: &BalanceTransaction, payout: &Payout) -> Result<()> {
        let bank = self.bank_account(payout)?;
        let customer = bt
            .source
            .as_ref()
            .and_then(|s| s.customer_id.clone());
        let income = self.income_account(customer.as_deref())?;

        if income.discard_transaction {
            debug!(
                "Discarding balance transaction {} as per lookup entry {:?}",
                bt.id, income
            );
            return Ok(());
        }

        let fees = self.fees_account()?;

        let postings = vec![
            TransactionPosting {
                account: income.account_name,
                amount: -Money::from_minor_units(bt.amount),
                currency: bt.currency.clone(),
            },
            TransactionPosting {
                account: fees.account_name,
                amount: Money::from_minor_units(bt.fee),
                currency: bt.currency.clone(),
            },
            TransactionPosting {
                account: bank.account_name,
                amount: Money::from_minor_units(bt.net),
                currency: bt.currency.clone(),
            },
        ];

        let mut txn =
            LedgerTransaction::new(utc_datetime(bt.created)?, "Stripe Dispute Charge", postings)?;
        txn.set_date_format(&self.config.date_format_string);
        self.annotate(&mut txn, bt, payout)?;
        self.emit(&txn)
    }

    /// Standalone account fee, not tied to a charge.
    fn process_fee(&mut self, bt: &BalanceTransaction, payout: &Payout) -> Result<()> {
        let bank = self.bank_account(payout)?;
        let fees = self.fees_account()?;

        if fees.discard_transaction {
            debug!(
                "Discarding balance transaction {} as per lookup entry {:?}",
                bt.id, fees
            );
            return Ok(());
        }

        let postings = vec![
            TransactionPosting {
                account: fees.account_name,
                amount: -Money::from_minor_units(bt.amount),
                currency: bt.currency.clone(),
            },
            TransactionPosting {
                account: bank.account_name,
                amount: Money::from_minor_units(bt.amount),
                currency: bt.currency.clone(),
            },
        ];

        let mut txn =
            LedgerTransaction::new(utc_datetime(bt.created)?, "Stripe Account Fees", postings)?;
        txn.set_date_format(&self.config.date_format_string);
        self.annotate(&mut txn, bt, payout)?;
        self.emit(&txn)
    }
}
