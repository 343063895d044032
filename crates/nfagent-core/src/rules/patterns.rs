//! Common regex patterns for Brazilian invoice fields.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Anything that is not a digit.
    pub static ref NON_DIGIT: Regex = Regex::new(r"\D").unwrap();

    /// Formatted CNPJ: 11.222.333/0001-81
    pub static ref CNPJ_FORMATTED: Regex = Regex::new(
        r"^\d{2}\.?\d{3}\.?\d{3}/?\d{4}-?\d{2}$"
    ).unwrap();

    /// Formatted CPF: 123.456.789-09
    pub static ref CPF_FORMATTED: Regex = Regex::new(
        r"^\d{3}\.?\d{3}\.?\d{3}-?\d{2}$"
    ).unwrap();

    /// Access key, optionally grouped in blocks of four as printed on a DANFE.
    pub static ref ACCESS_KEY: Regex = Regex::new(
        r"^(?:NFe)?(?:\d{4}[\s.]?){10}\d{4}$"
    ).unwrap();

    /// Monetary amount with an optional currency marker.
    pub static ref AMOUNT: Regex = Regex::new(
        r"^-?[\d.,]*\d$"
    ).unwrap();

    /// Currency markers stripped before parsing.
    pub static ref CURRENCY: Regex = Regex::new(
        r"(?i)R\$|BRL|reais|:|\s|\u{00a0}"
    ).unwrap();
}

/// Keep only the digits of `value`.
pub fn digits(value: &str) -> String {
    NON_DIGIT.replace_all(value, "").into_owned()
}
