//! Monetary amount parsing for Brazilian notation.

use std::str::FromStr;

use rust_decimal::Decimal;

use super::patterns::{AMOUNT, CURRENCY};

/// Parse an amount written either as `1.234,56` (Brazilian) or `1234.56`.
///
/// Currency markers (`R$`, `BRL`), colons and whitespace are ignored. When both
/// separators appear, the rightmost one is the decimal mark. A lone `.`
/// followed by exactly three digits is read as a thousands separator.
pub fn parse_amount(text: &str) -> Option<Decimal> {
    let cleaned = CURRENCY.replace_all(text.trim(), "");
    if cleaned.is_empty() || !AMOUNT.is_match(&cleaned) {
        return None;
    }

    let last_comma = cleaned.rfind(',');
    let last_dot = cleaned.rfind('.');

    let normalized = match (last_comma, last_dot) {
        (Some(c), Some(d)) if c > d => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (Some(_), None) => {
            if cleaned.matches(',').count() > 1 {
                return None;
            }
            cleaned.replace(',', ".")
        }
        (None, Some(d)) => {
            let dots = cleaned.matches('.').count();
            let fraction_len = cleaned.len() - d - 1;
            if dots > 1 || fraction_len == 3 {
                cleaned.replace('.', "")
            } else {
                cleaned.into_owned()
            }
        }
        (None, None) => cleaned.into_owned(),
    };

    Decimal::from_str(&normalized).ok()
}

/// Format an amount as `1.234,56`.
pub fn format_amount(amount: Decimal) -> String {
    let rounded = amount.round_dp(2);
    let negative = rounded.is_sign_negative() && !rounded.is_zero();
    let abs = rounded.abs().to_string();

    let (int_part, frac_part) = match abs.split_once('.') {
        Some((i, f)) => (i.to_string(), format!("{f:0<2}")),
        None => (abs.clone(), "00".to_string()),
    };

    let mut grouped = String::new();
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }

    format!("{}{},{}", if negative { "-" } else { "" }, grouped, frac_part)
}
