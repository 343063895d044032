//! Advisory validation rules for extracted invoice records.
//!
//! Nothing here rejects a record. The issues are reported back to the model
//! alongside the save confirmation so it can mention them to the user.

pub mod access_key;
pub mod amounts;
pub mod patterns;
pub mod tax_id;

use rust_decimal::Decimal;

use crate::models::record::InvoiceRecord;
use access_key::AccessKeyIssue;

/// Check a record and describe anything that looks wrong.
pub fn validate(record: &InvoiceRecord) -> Vec<String> {
    let mut issues = Vec::new();

    if let Some(key) = &record.access_key {
        match access_key::check(key) {
            Ok(()) => {}
            // NFS-e verification codes are short alphanumerics; only flag digit strings.
            Err(AccessKeyIssue::Length(len)) if len >= 40 => {
                issues.push(format!("access key has {len} digits, expected 44"));
            }
            Err(AccessKeyIssue::Length(_)) => {}
            Err(AccessKeyIssue::Format) => {
                issues.push("access key has 44 digits but unexpected separators".to_string());
            }
            Err(AccessKeyIssue::CheckDigit { expected, found }) => issues.push(format!(
                "access key check digit is {found}, expected {expected}"
            )),
        }
    }

    for (label, value) in [
        ("issuer tax id", &record.issuer_tax_id),
        ("recipient tax id", &record.recipient_tax_id),
    ] {
        if let Some(id) = value {
            if tax_id::classify(id).is_none() {
                issues.push(format!("{label} '{id}' is not a valid CNPJ or CPF"));
            }
        }
    }

    for (label, value) in [
        ("total value", record.total_value),
        ("tax base", record.tax_base),
        ("ISS value", record.iss_value),
        ("ICMS value", record.icms_value),
    ] {
        if value.is_some_and(|v| v < Decimal::ZERO) {
            issues.push(format!("{label} is negative"));
        }
    }

    if let Some(total) = record.total_value {
        for (label, tax) in [("ISS", record.iss_value), ("ICMS", record.icms_value)] {
            if tax.is_some_and(|t| t > total) {
                issues.push(format!("{label} value exceeds the total value"));
            }
        }
    }

    issues
}
