//! Amount normalization and display helpers for amounts and timestamps,
//! French locale.

use chrono::{DateTime, TimeZone};
use rust_decimal::{Decimal, RoundingStrategy};
use std::fmt::Display;

const GROUP_SEPARATOR: char = '\u{202f}';
const CURRENCY_SEPARATOR: char = '\u{a0}';

/// Brings an amount to two decimal places.
///
/// sqlite keeps decimal columns as REAL, so a stored `0.30` comes back as
/// `0.3` (or with binary noise); every amount read from storage goes
/// through here.
pub fn normalize_amount(amount: Decimal) -> Decimal {
    let mut normalized = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    normalized.rescale(2);
    normalized
}

/// Formats an amount in euros the way `fr-FR` does: `1 234,50 €`.
pub fn format_currency(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };

    let digits = format!("{:.2}", rounded.abs());
    let (units, cents) = digits.split_once('.').unwrap_or((digits.as_str(), "00"));

    let mut grouped = String::with_capacity(units.len() + units.len() / 3);
    for (i, ch) in units.chars().enumerate() {
        if i > 0 && (units.len() - i) % 3 == 0 {
            grouped.push(GROUP_SEPARATOR);
        }
        grouped.push(ch);
    }

    format!("{sign}{grouped},{cents}{CURRENCY_SEPARATOR}€")
}

/// Formats a timestamp as `dd/mm/yyyy hh:mm`.
pub fn format_date<Tz>(date: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    date.format("%d/%m/%Y %H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    #[test]
    fn amounts_come_back_with_two_decimals() {
        assert_eq!(normalize_amount(dec!(0.3)).to_string(), "0.30");
        assert_eq!(normalize_amount(dec!(20)).to_string(), "20.00");
        assert_eq!(normalize_amount(dec!(0.30000000000000004)).to_string(), "0.30");
        assert_eq!(normalize_amount(dec!(19.989999999999998)).to_string(), "19.99");
    }

    #[test]
    fn currency_uses_comma_and_narrow_spaces() {
        assert_eq!(format_currency(dec!(20)), "20,00\u{a0}€");
        assert_eq!(format_currency(dec!(1234.5)), "1\u{202f}234,50\u{a0}€");
        assert_eq!(
            format_currency(dec!(1234567.891)),
            "1\u{202f}234\u{202f}567,89\u{a0}€"
        );
    }

    #[test]
    fn currency_rounds_half_away_from_zero() {
        assert_eq!(format_currency(dec!(0.005)), "0,01\u{a0}€");
        assert_eq!(format_currency(dec!(-2.5)), "-2,50\u{a0}€");
        assert_eq!(format_currency(dec!(-0.001)), "0,00\u{a0}€");
    }

    #[test]
    fn date_is_day_first() {
        let date = Utc.with_ymd_and_hms(2025, 3, 7, 9, 5, 0).unwrap();
        assert_eq!(format_date(&date), "07/03/2025 09:05");
    }
}
