//! Self-extending regex lookup table mapping raw transaction descriptors to
//! ledger account names.
//!
//! The entry list is ordered and first-match-wins: earlier entries shadow
//! later ones, and a catch-all pattern like `.*` only fires when nothing
//! above it matched. Descriptors that match no entry grow the list, so later
//! records (and later runs, once the list is persisted) reuse the learned
//! classification.

use crate::error::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// One persisted classification rule.
///
/// `search` is a regular expression matched unanchored against the candidate
/// descriptor. Entries appended automatically by [`AccountLookup::get_or_add`]
/// use the descriptor itself as both `search` and `description`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupEntry {
    /// Regex pattern matched against the raw descriptor
    pub search: String,

    /// Resolved ledger account name
    pub account_name: String,

    /// Human-readable transaction description for the rendered entry
    #[serde(default)]
    pub description: String,

    /// When set, records resolving to this entry produce no output at all
    #[serde(default)]
    pub discard_transaction: bool,
}

/// The ordered, self-extending account classification cache.
///
/// Patterns are compiled once when the list is loaded (or an entry is
/// appended) and cached alongside their entries; a malformed pattern is a
/// configuration error, never silently skipped.
pub struct AccountLookup {
    entries: Vec<LookupEntry>,
    patterns: Vec<Regex>,
    grew: bool,
}

impl AccountLookup {
    /// Builds a lookup cache from persisted entries, compiling every pattern.
    pub fn from_entries(entries: Vec<LookupEntry>) -> Result<Self> {
        let mut patterns = Vec::with_capacity(entries.len());
        for entry in &entries {
            patterns.push(Regex::new(&entry.search)?);
        }
        Ok(AccountLookup {
            entries,
            patterns,
            grew: false,
        })
    }

    /// Resolves a descriptor to its classification entry, learning it if
    /// necessary.
    ///
    /// Scans the list in order and returns the first entry whose pattern
    /// matches `search_key`. On a miss, appends a new entry using the
    /// descriptor as its own search pattern and `default_account` as the
    /// account name, and returns that.
    pub fn get_or_add(&mut self, search_key: &str, default_account: &str) -> Result<&LookupEntry> {
        for (idx, pattern) in self.patterns.iter().enumerate() {
            if pattern.is_match(search_key) {
                return Ok(&self.entries[idx]);
            }
        }

        let entry = LookupEntry {
            search: search_key.to_string(),
            account_name: default_account.to_string(),
            description: search_key.to_string(),
            discard_transaction: false,
        };
        log::debug!(
            "Updating lookup list 'ledger_account_lookups' with new entry {:?}",
            entry
        );

        self.patterns.push(Regex::new(&entry.search)?);
        self.entries.push(entry);
        self.grew = true;

        // Safety: an entry was pushed immediately above
        Ok(self.entries.last().expect("entry was just appended"))
    }

    /// The current entry list, in match order, for persistence.
    pub fn entries(&self) -> &[LookupEntry] {
        &self.entries
    }

    /// Whether any entries were learned since this cache was loaded.
    pub fn grew(&self) -> bool {
        self.grew
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(search: &str, account: &str) -> LookupEntry {
        LookupEntry {
            search: search.to_string(),
            account_name: account.to_string(),
            description: search.to_string(),
            discard_transaction: false,
        }
    }

    #[test]
    fn test_first_match_wins_over_catch_all() {
        let mut lookup = AccountLookup::from_entries(vec![
            entry("(?i)stripe", "Income:Stripe"),
            entry(".*", "Expenses:Unknown"),
        ])
        .unwrap();

        let found = lookup.get_or_add("STRIPE PAYOUT", "Expenses:Default").unwrap();
        assert_eq!(found.account_name, "Income:Stripe");
        assert!(!lookup.grew());
    }

    #[test]
    fn test_unanchored_substring_match() {
        let mut lookup =
            AccountLookup::from_entries(vec![entry("GROCER", "Expenses:Groceries")]).unwrap();

        let found = lookup
            .get_or_add("POS PURCHASE GROCERY TOWN 0123", "Expenses:Unknown")
            .unwrap();
        assert_eq!(found.account_name, "Expenses:Groceries");
    }

    #[test]
    fn test_miss_appends_exactly_one_entry() {
        let mut lookup = AccountLookup::from_entries(vec![]).unwrap();

        let added = lookup
            .get_or_add("ACME UTILITIES 001", "Expenses:Unknown")
            .unwrap();
        assert_eq!(added.search, "ACME UTILITIES 001");
        assert_eq!(added.description, "ACME UTILITIES 001");
        assert_eq!(added.account_name, "Expenses:Unknown");
        assert!(!added.discard_transaction);

        assert_eq!(lookup.entries().len(), 1);
        assert!(lookup.grew());

        // Second resolution reuses the learned entry.
        lookup
            .get_or_add("ACME UTILITIES 001", "Expenses:Other")
            .unwrap();
        assert_eq!(lookup.entries().len(), 1);
    }

    #[test]
    fn test_learned_entry_matches_later_records() {
        let mut lookup = AccountLookup::from_entries(vec![]).unwrap();
        lookup.get_or_add("PAYROLL JULY", "Income:Salary").unwrap();

        // The learned pattern is itself a regex, matched as a substring.
        let found = lookup
            .get_or_add("PAYROLL JULY CORRECTION", "Expenses:Unknown")
            .unwrap();
        assert_eq!(found.account_name, "Income:Salary");
        assert_eq!(lookup.entries().len(), 1);
    }

    #[test]
    fn test_malformed_pattern_is_an_error() {
        let result = AccountLookup::from_entries(vec![entry("[0-9]++", "Assets:Bank")]);
        assert!(result.is_err());
    }

    #[test]
    fn test_entry_order_preserved_through_serde() {
        let entries = vec![
            entry("first", "Expenses:A"),
            LookupEntry {
                search: "second".to_string(),
                account_name: "Expenses:B".to_string(),
                description: "A discarded mapping".to_string(),
                discard_transaction: true,
            },
        ];

        let json = serde_json::to_string(&entries).unwrap();
        let decoded: Vec<LookupEntry> = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, entries);
        assert!(decoded[1].discard_transaction);
    }
}
