//! NF-e access key (chave de acesso) validation.

use super::patterns::{ACCESS_KEY, digits};

/// Length of an NF-e access key in digits.
pub const ACCESS_KEY_LEN: usize = 44;

/// Why an access key was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessKeyIssue {
    /// Not 44 digits after removing grouping.
    Length(usize),
    /// 44 digits, but separated by characters other than spaces or dots.
    Format,
    /// Check digit does not match.
    CheckDigit { expected: u32, found: u32 },
}

/// Strip the `NFe` prefix and grouping characters.
pub fn normalize(value: &str) -> String {
    digits(value.trim().trim_start_matches("NFe"))
}

/// Validate a key's length and modulo-11 check digit.
pub fn check(value: &str) -> Result<(), AccessKeyIssue> {
    let key = normalize(value);
    if key.len() != ACCESS_KEY_LEN {
        return Err(AccessKeyIssue::Length(key.len()));
    }
    if !ACCESS_KEY.is_match(value.trim()) {
        return Err(AccessKeyIssue::Format);
    }

    let nums: Vec<u32> = key.chars().filter_map(|c| c.to_digit(10)).collect();
    let expected = check_digit(&nums[..ACCESS_KEY_LEN - 1]);
    let found = nums[ACCESS_KEY_LEN - 1];

    if expected == found {
        Ok(())
    } else {
        Err(AccessKeyIssue::CheckDigit { expected, found })
    }
}

/// Weights 2..=9 cycle from the rightmost digit.
fn check_digit(body: &[u32]) -> u32 {
    let sum: u32 = body
        .iter()
        .rev()
        .zip((2..=9).cycle())
        .map(|(d, w)| d * w)
        .sum();
    match sum % 11 {
        0 | 1 => 0,
        r => 11 - r,
    }
}
