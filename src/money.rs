//! Decimal money type with parsing and exchange-rate normalization.
//!
//! Uses `rust_decimal` internally (96-bit mantissa) so that cent amounts stay
//! exact after division by 100 and multiplication by an exchange rate.

use crate::error::{ExportError, Result};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

/// Comparison tolerance for balance checks.
///
/// Two money values are considered equal when they differ by less than 1e-8.
fn tolerance() -> Decimal {
    Decimal::new(1, 8)
}

/// A currency-independent decimal money value.
///
/// The currency code lives on the posting, not here; see
/// [`TransactionPosting`](crate::ledger::TransactionPosting).
///
/// # Examples
///
/// ```
/// use ledger_export::Money;
///
/// let amount = Money::parse("$1,234.56", false).unwrap();
/// assert_eq!(format!("{:.2}", amount), "1234.56");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Money(Decimal);

impl Money {
    /// The additive identity.
    pub const ZERO: Self = Money(Decimal::ZERO);

    /// Parses a raw money string as it appears in a CSV export.
    ///
    /// An empty string is treated as zero. A leading `+` or `-` records the
    /// sign; every remaining character that is not a decimal digit or `.` is
    /// stripped (currency symbols, thousands separators, whitespace). The
    /// residue must parse as a non-negative decimal literal.
    ///
    /// When `is_debit` is true the sign is forced negative regardless of any
    /// parsed sign, per the debit-column convention.
    pub fn parse(raw: &str, is_debit: bool) -> Result<Money> {
        if raw.is_empty() {
            return Ok(Money::ZERO);
        }

        let mut negated = false;
        let rest = match raw.chars().next() {
            Some('-') => {
                negated = true;
                &raw[1..]
            }
            Some('+') => &raw[1..],
            _ => raw,
        };

        if is_debit {
            negated = true;
        }

        let digits: String = rest
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '.')
            .collect();

        let value: Decimal = digits.parse().map_err(|_| ExportError::MoneyParse {
            value: raw.to_string(),
        })?;

        Ok(if negated { Money(-value) } else { Money(value) })
    }

    /// Converts an integer minor-unit amount (cents) into major units.
    pub fn from_minor_units(minor: i64) -> Money {
        Money(Decimal::from(minor) / Decimal::from(100))
    }

    /// Returns `true` if this value is within tolerance of zero.
    pub fn approx_is_zero(&self) -> bool {
        self.0.abs() < tolerance()
    }

    /// Returns `true` if the two values differ by less than the tolerance.
    pub fn approx_eq(&self, other: &Money) -> bool {
        (self.0 - other.0).abs() < tolerance()
    }
}

/// Reads one or two configured money columns from a CSV record and reports
/// their sum.
///
/// Column indices are 1-based. With two columns, the first is treated as a
/// debit (forced negative) and the second as a credit; with a single column
/// no forced negation occurs. Any other column count is a configuration
/// error. The result can always be inverted via the `negate_amount` mapping
/// flag.
pub fn coerce_columns(fields: &[&str], money_cols: &[usize]) -> Result<Money> {
    if money_cols.is_empty() || money_cols.len() > 2 {
        return Err(ExportError::MoneyColumnCount {
            count: money_cols.len(),
        });
    }

    let debit_col = money_cols[0];
    if debit_col < 1 {
        return Err(ExportError::InvalidColumn {
            name: "money",
            index: debit_col,
        });
    }
    let raw_debit = fields.get(debit_col - 1).copied().unwrap_or_default();
    log::debug!("Raw debit value: {:?}", raw_debit);

    // A lone money column carries its own sign; only the debit half of a
    // debit/credit pair is forced negative.
    let debit = Money::parse(raw_debit, money_cols.len() == 2)?;

    let mut credit = Money::ZERO;
    if let Some(&credit_col) = money_cols.get(1) {
        if credit_col < 1 {
            return Err(ExportError::InvalidColumn {
                name: "money",
                index: credit_col,
            });
        }
        let raw_credit = fields.get(credit_col - 1).copied().unwrap_or_default();
        log::debug!("Raw credit value: {:?}", raw_credit);
        credit = Money::parse(raw_credit, false)?;
    }

    Ok(debit + credit)
}

/// Converts a minor-unit amount into the parent transaction's currency using
/// its stored exchange rate.
///
/// The product is rounded to the nearest integer minor unit with
/// half-away-from-zero rounding.
pub fn normalize_minor_units(minor: i64, exchange_rate: f64) -> Result<i64> {
    let rate = Decimal::from_f64(exchange_rate).ok_or_else(|| ExportError::MoneyParse {
        value: exchange_rate.to_string(),
    })?;

    let scaled = (Decimal::from(minor) * rate)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);

    scaled.to_i64().ok_or(ExportError::MoneyParse {
        value: scaled.to_string(),
    })
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Money(self.0 - rhs.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Neg for Money {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Money(-self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty_is_zero() {
        assert_eq!(Money::parse("", false).unwrap(), Money::ZERO);
    }

    #[test]
    fn test_parse_plain_value() {
        let m = Money::parse("42.50", false).unwrap();
        assert_eq!(format!("{:.2}", m), "42.50");
    }

    #[test]
    fn test_parse_strips_symbols_and_separators() {
        let m = Money::parse("$1,234.56", false).unwrap();
        assert_eq!(format!("{:.2}", m), "1234.56");

        let m = Money::parse("€ 12.50", false).unwrap();
        assert_eq!(format!("{:.2}", m), "12.50");
    }

    #[test]
    fn test_parse_leading_signs() {
        let m = Money::parse("-17.80", false).unwrap();
        assert_eq!(format!("{:.2}", m), "-17.80");

        let m = Money::parse("+17.80", false).unwrap();
        assert_eq!(format!("{:.2}", m), "17.80");
    }

    #[test]
    fn test_parse_debit_forces_negative() {
        let m = Money::parse("42.50", true).unwrap();
        assert_eq!(format!("{:.2}", m), "-42.50");

        // An explicit minus sign stays negative; debit never double-negates.
        let m = Money::parse("-42.50", true).unwrap();
        assert_eq!(format!("{:.2}", m), "-42.50");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Money::parse("n/a", false).is_err());
        assert!(Money::parse("1.2.3", false).is_err());
    }

    #[test]
    fn test_parse_format_idempotence() {
        let m = Money::parse("1,234.567", false).unwrap();
        let rendered = format!("{:.2}", m);
        let reparsed = Money::parse(&rendered, false).unwrap();
        assert_eq!(format!("{:.2}", reparsed), rendered);
    }

    #[test]
    fn test_from_minor_units() {
        assert_eq!(format!("{:.2}", Money::from_minor_units(1000)), "10.00");
        assert_eq!(format!("{:.2}", Money::from_minor_units(-30)), "-0.30");
        assert_eq!(format!("{:.2}", Money::from_minor_units(1)), "0.01");
    }

    #[test]
    fn test_coerce_single_column_is_never_negated() {
        let fields = ["42.50"];
        let m = coerce_columns(&fields, &[1]).unwrap();
        assert_eq!(format!("{:.2}", m), "42.50");
    }

    #[test]
    fn test_coerce_two_columns_negates_debit() {
        let fields = ["42.50", "10.00"];
        let m = coerce_columns(&fields, &[1, 2]).unwrap();
        assert_eq!(format!("{:.2}", m), "-32.50");
    }

    #[test]
    fn test_coerce_two_columns_with_empty_credit() {
        let fields = ["42.50", ""];
        let m = coerce_columns(&fields, &[1, 2]).unwrap();
        assert_eq!(format!("{:.2}", m), "-42.50");
    }

    #[test]
    fn test_coerce_rejects_bad_column_counts() {
        let fields = ["1.00", "2.00", "3.00"];
        assert!(matches!(
            coerce_columns(&fields, &[]),
            Err(ExportError::MoneyColumnCount { count: 0 })
        ));
        assert!(matches!(
            coerce_columns(&fields, &[1, 2, 3]),
            Err(ExportError::MoneyColumnCount { count: 3 })
        ));
    }

    #[test]
    fn test_coerce_rejects_zero_column() {
        let fields = ["1.00"];
        assert!(matches!(
            coerce_columns(&fields, &[0]),
            Err(ExportError::InvalidColumn { .. })
        ));
    }

    #[test]
    fn test_normalize_identity_rate() {
        assert_eq!(normalize_minor_units(250, 1.0).unwrap(), 250);
    }

    #[test]
    fn test_normalize_rounds_half_away_from_zero() {
        // 5 * 0.5 = 2.5, which banker's rounding would turn into 2
        assert_eq!(normalize_minor_units(5, 0.5).unwrap(), 3);
        assert_eq!(normalize_minor_units(-5, 0.5).unwrap(), -3);
    }

    #[test]
    fn test_normalize_typical_fx_rate() {
        // 250 * 1.1339 = 283.475
        assert_eq!(normalize_minor_units(250, 1.1339).unwrap(), 283);
        // 101 * 1.5 = 151.5
        assert_eq!(normalize_minor_units(101, 1.5).unwrap(), 152);
    }

    #[test]
    fn test_approx_zero_tolerance() {
        let tiny = Money(Decimal::new(1, 9));
        assert!(tiny.approx_is_zero());

        let not_tiny = Money(Decimal::new(1, 7));
        assert!(!not_tiny.approx_is_zero());
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::parse("10.00", false).unwrap();
        let b = Money::parse("4.25", false).unwrap();
        assert_eq!(format!("{:.2}", a - b), "5.75");
        assert_eq!(format!("{:.2}", a + (-b)), "5.75");
        assert!((a - b).approx_eq(&Money::parse("5.75", false).unwrap()));
        assert!((a - b - a + b).approx_is_zero());
    }
}
