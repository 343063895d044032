//! CNPJ and CPF extraction and checksum validation.

use super::patterns::{CNPJ_FORMATTED, CPF_FORMATTED, digits};

/// Kind of Brazilian tax identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaxIdKind {
    /// Company registry number (14 digits).
    Cnpj,
    /// Individual taxpayer number (11 digits).
    Cpf,
}

/// Classify and validate a tax identifier.
///
/// Returns `None` when the value is neither a checksum-valid CNPJ nor CPF.
pub fn classify(value: &str) -> Option<TaxIdKind> {
    let trimmed = value.trim();
    if CNPJ_FORMATTED.is_match(trimmed) && validate_cnpj(trimmed) {
        Some(TaxIdKind::Cnpj)
    } else if CPF_FORMATTED.is_match(trimmed) && validate_cpf(trimmed) {
        Some(TaxIdKind::Cpf)
    } else {
        None
    }
}

/// Validate a CNPJ check digits (formatting characters are ignored).
pub fn validate_cnpj(value: &str) -> bool {
    let d = to_digits(value);
    if d.len() != 14 || all_same(&d) {
        return false;
    }

    const W1: [u32; 12] = [5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];
    const W2: [u32; 13] = [6, 5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];

    let first = mod11_digit(&d[..12], &W1);
    let second = mod11_digit(&d[..13], &W2);
    d[12] == first && d[13] == second
}

/// Validate a CPF check digits (formatting characters are ignored).
pub fn validate_cpf(value: &str) -> bool {
    let d = to_digits(value);
    if d.len() != 11 || all_same(&d) {
        return false;
    }

    let check = |len: usize| -> u32 {
        let sum: u32 = d[..len]
            .iter()
            .enumerate()
            .map(|(i, &n)| n * (len as u32 + 1 - i as u32))
            .sum();
        (sum * 10) % 11 % 10
    };

    d[9] == check(9) && d[10] == check(10)
}

fn mod11_digit(digits: &[u32], weights: &[u32]) -> u32 {
    let sum: u32 = digits.iter().zip(weights).map(|(d, w)| d * w).sum();
    match sum % 11 {
        0 | 1 => 0,
        r => 11 - r,
    }
}

fn to_digits(value: &str) -> Vec<u32> {
    digits(value).chars().filter_map(|c| c.to_digit(10)).collect()
}

fn all_same(d: &[u32]) -> bool {
    d.windows(2).all(|w| w[0] == w[1])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_cnpj() {
        assert!(validate_cnpj("11.222.333/0001-81"));
        assert!(validate_cnpj("11222333000181"));
    }

    #[test]
    fn test_invalid_cnpj() {
        assert!(!validate_cnpj("11.222.333/0001-82"));
        assert!(!validate_cnpj("00000000000000"));
        assert!(!validate_cnpj("1122233300018"));
    }

    #[test]
    fn test_valid_cpf() {
        assert!(validate_cpf("529.982.247-25"));
        assert!(validate_cpf("52998224725"));
    }

    #[test]
    fn test_invalid_cpf() {
        assert!(!validate_cpf("529.982.247-26"));
        assert!(!validate_cpf("111.111.111-11"));
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify("11.222.333/0001-81"), Some(TaxIdKind::Cnpj));
        assert_eq!(classify("529.982.247-25"), Some(TaxIdKind::Cpf));
        assert_eq!(classify("12345"), None);
    }
}
