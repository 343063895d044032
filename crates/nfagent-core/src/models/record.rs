//! The structured invoice record filled in by the model.
//!
//! Every field is optional: extraction quality varies too much between an NF-e
//! XML and a phone photo of a receipt to require anything.

use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value, json};

use crate::error::ToolError;
use crate::rules::amounts::parse_amount;

/// Number of columns in a persisted record row.
pub const FIELD_COUNT: usize = 16;

/// How a field is typed in the tool schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Free-form text.
    Text,
    /// Monetary amount.
    Amount,
}

/// Column metadata: name, kind and the description shown to the model.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub description: &'static str,
}

const fn text(name: &'static str, description: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        kind: FieldKind::Text,
        description,
    }
}

const fn amount(name: &'static str, description: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        kind: FieldKind::Amount,
        description,
    }
}

/// Record columns in persisted order.
pub const FIELDS: [FieldSpec; FIELD_COUNT] = [
    text(
        "access_key",
        "NF-e access key (44 digits) or the NFS-e verification code",
    ),
    text(
        "invoice_number",
        "Invoice number, e.g. 'Number: 1254200' or 'No 255376898'",
    ),
    text(
        "emission_date",
        "Emission date and time as printed, e.g. '20/09/2025 19:51:09'",
    ),
    text("issuer_tax_id", "CNPJ of the issuer, digits only"),
    text("issuer_name", "Legal name of the issuer"),
    text(
        "issuer_address",
        "Full issuer address (street, number, district)",
    ),
    text(
        "issuer_municipality",
        "Issuer municipality and state, e.g. 'Sao Paulo UF: SP'",
    ),
    text("recipient_tax_id", "CNPJ or CPF of the recipient, digits only"),
    text("recipient_name", "Legal name of the recipient"),
    text(
        "recipient_address",
        "Full recipient address (street, number, district)",
    ),
    text(
        "recipient_municipality",
        "Recipient municipality and state, e.g. 'Sao Paulo UF: SP'",
    ),
    amount(
        "total_value",
        "Total invoice value without currency symbol, e.g. 138.95",
    ),
    amount("tax_base", "Tax base used for ISS or ICMS"),
    amount("iss_value", "ISS amount (service tax)"),
    amount("icms_value", "ICMS amount (goods tax)"),
    text(
        "service_description",
        "Text describing the services rendered",
    ),
];

/// A single invoice's extracted fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvoiceRecord {
    #[serde(deserialize_with = "lenient_text")]
    pub access_key: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub invoice_number: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub emission_date: Option<String>,

    #[serde(deserialize_with = "lenient_text")]
    pub issuer_tax_id: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub issuer_name: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub issuer_address: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub issuer_municipality: Option<String>,

    #[serde(deserialize_with = "lenient_text")]
    pub recipient_tax_id: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub recipient_name: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub recipient_address: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub recipient_municipality: Option<String>,

    #[serde(
        deserialize_with = "lenient_amount",
        serialize_with = "amount_as_number"
    )]
    pub total_value: Option<Decimal>,
    #[serde(
        deserialize_with = "lenient_amount",
        serialize_with = "amount_as_number"
    )]
    pub tax_base: Option<Decimal>,
    #[serde(
        deserialize_with = "lenient_amount",
        serialize_with = "amount_as_number"
    )]
    pub iss_value: Option<Decimal>,
    #[serde(
        deserialize_with = "lenient_amount",
        serialize_with = "amount_as_number"
    )]
    pub icms_value: Option<Decimal>,

    #[serde(deserialize_with = "lenient_text")]
    pub service_description: Option<String>,
}

impl InvoiceRecord {
    /// Build a record from save-tool arguments.
    ///
    /// Accepts `{"record": {...}}` as advertised in the tool schema, or the bare
    /// field object some models send instead.
    pub fn from_tool_args(args: &Value) -> Result<Self, ToolError> {
        let payload = match args.get("record") {
            Some(inner) if inner.is_object() => inner,
            Some(Value::Null) | None => args,
            Some(other) => {
                return Err(ToolError::InvalidArguments(format!(
                    "'record' must be an object, got {other}"
                )));
            }
        };

        if !payload.is_object() {
            return Err(ToolError::InvalidArguments(
                "expected an object of invoice fields".to_string(),
            ));
        }

        Self::deserialize(payload).map_err(|e| ToolError::InvalidArguments(e.to_string()))
    }

    /// Cell values in [`FIELDS`] order.
    pub fn cells(&self) -> [Option<String>; FIELD_COUNT] {
        let amount = |v: &Option<Decimal>| v.map(|d| d.normalize().to_string());
        [
            self.access_key.clone(),
            self.invoice_number.clone(),
            self.emission_date.clone(),
            self.issuer_tax_id.clone(),
            self.issuer_name.clone(),
            self.issuer_address.clone(),
            self.issuer_municipality.clone(),
            self.recipient_tax_id.clone(),
            self.recipient_name.clone(),
            self.recipient_address.clone(),
            self.recipient_municipality.clone(),
            amount(&self.total_value),
            amount(&self.tax_base),
            amount(&self.iss_value),
            amount(&self.icms_value),
            self.service_description.clone(),
        ]
    }

    /// One CSV row; missing fields become empty cells.
    pub fn to_row(&self) -> Vec<String> {
        self.cells()
            .into_iter()
            .map(Option::unwrap_or_default)
            .collect()
    }

    /// Whether no field is populated.
    pub fn is_empty(&self) -> bool {
        self.cells().iter().all(Option::is_none)
    }

    /// Populated fields only, keyed by column name.
    pub fn populated_fields(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map.into_iter().filter(|(_, v)| !v.is_null()).collect(),
            _ => Map::new(),
        }
    }

    /// JSON schema of the record, used as the save tool's `record` parameter.
    pub fn json_schema() -> Value {
        let properties: Map<String, Value> = FIELDS
            .iter()
            .map(|field| {
                let types = match field.kind {
                    FieldKind::Text => json!(["string", "null"]),
                    FieldKind::Amount => json!(["number", "string", "null"]),
                };
                (
                    field.name.to_string(),
                    json!({ "type": types, "description": field.description }),
                )
            })
            .collect();

        json!({
            "type": "object",
            "description": "Invoice fields. Every field is optional; use null when absent.",
            "properties": properties,
        })
    }
}

/// Column headers in persisted order.
pub fn column_names() -> [&'static str; FIELD_COUNT] {
    FIELDS.map(|f| f.name)
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
        }
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!("expected text, found {other}"))),
    }
}

fn lenient_amount<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => {
            let raw = n.to_string();
            Decimal::from_str(&raw)
                .or_else(|_| Decimal::from_scientific(&raw))
                .map(Some)
                .map_err(|e| serde::de::Error::custom(format!("invalid amount {raw}: {e}")))
        }
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => parse_amount(&s)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid amount '{s}'"))),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected an amount, found {other}"
        ))),
    }
}

fn amount_as_number<S>(value: &Option<Decimal>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(d) => {
            let f = d
                .to_f64()
                .ok_or_else(|| serde::ser::Error::custom(format!("amount {d} out of range")))?;
            serializer.serialize_f64(f)
        }
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_from_wrapped_args() {
        let args = json!({
            "record": {
                "invoice_number": "1254200",
                "issuer_tax_id": "11222333000181",
                "total_value": "R$ 1.234,56",
                "iss_value": 12.5
            }
        });

        let record = InvoiceRecord::from_tool_args(&args).unwrap();
        assert_eq!(record.invoice_number.as_deref(), Some("1254200"));
        assert_eq!(record.total_value, Some(Decimal::from_str("1234.56").unwrap()));
        assert_eq!(record.iss_value, Some(Decimal::from_str("12.5").unwrap()));
        assert_eq!(record.recipient_name, None);
    }

    #[test]
    fn test_from_bare_args_with_numbers_and_blanks() {
        let args = json!({ "invoice_number": 255376898, "issuer_name": "   ", "tax_base": "" });

        let record = InvoiceRecord::from_tool_args(&args).unwrap();
        assert_eq!(record.invoice_number.as_deref(), Some("255376898"));
        assert_eq!(record.issuer_name, None);
        assert_eq!(record.tax_base, None);
    }

    #[test]
    fn test_empty_args_give_empty_record() {
        let record = InvoiceRecord::from_tool_args(&json!({})).unwrap();
        assert!(record.is_empty());
        assert_eq!(record.to_row(), vec![String::new(); FIELD_COUNT]);
    }

    #[test]
    fn test_rejects_garbage_amount() {
        let err = InvoiceRecord::from_tool_args(&json!({ "total_value": "about ten" }))
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[test]
    fn test_rejects_non_object_args() {
        assert!(InvoiceRecord::from_tool_args(&json!("nope")).is_err());
        assert!(InvoiceRecord::from_tool_args(&json!({ "record": [1, 2] })).is_err());
    }

    #[test]
    fn test_row_follows_column_order() {
        let record = InvoiceRecord {
            access_key: Some("k".to_string()),
            total_value: Some(Decimal::from_str("138.950").unwrap()),
            service_description: Some("software license".to_string()),
            ..Default::default()
        };

        let row = record.to_row();
        assert_eq!(row.len(), column_names().len());
        assert_eq!(row[0], "k");
        assert_eq!(row[11], "138.95");
        assert_eq!(row[15], "software license");
    }

    #[test]
    fn test_columns_match_serde_names() {
        let value = serde_json::to_value(InvoiceRecord::default()).unwrap();
        let mut serde_names: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        let mut columns: Vec<_> = column_names().iter().map(|s| s.to_string()).collect();
        serde_names.sort();
        columns.sort();
        assert_eq!(serde_names, columns);
    }

    #[test]
    fn test_populated_fields_skip_nulls() {
        let record = InvoiceRecord {
            invoice_number: Some("42".to_string()),
            total_value: Some(Decimal::from_str("10.50").unwrap()),
            ..Default::default()
        };

        let fields = record.populated_fields();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields["invoice_number"], json!("42"));
        assert_eq!(fields["total_value"], json!(10.5));
    }

    #[test]
    fn test_schema_lists_every_field() {
        let schema = InvoiceRecord::json_schema();
        let properties = schema["properties"].as_object().unwrap();
        assert_eq!(properties.len(), FIELD_COUNT);
        assert_eq!(
            properties["total_value"]["type"],
            json!(["number", "string", "null"])
        );
    }
}
