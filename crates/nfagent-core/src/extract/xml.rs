//! NF-e XML field lookup.
//!
//! Elements are matched by their namespace-resolved local names, so documents
//! using a prefixed `nfe:` namespace and documents using the default namespace
//! are read the same way.

use std::path::Path;

use quick_xml::NsReader;
use quick_xml::events::Event;
use quick_xml::name::{Namespace, ResolveResult};
use tracing::{debug, info};

use super::{Result, ensure_exists};
use crate::error::ExtractionError;

/// Namespace of the NF-e schema.
pub const NFE_NAMESPACE: &[u8] = b"http://www.portalfiscal.inf.br/nfe";

/// Returned when the document parses but none of the known fields are present.
pub const NOTHING_FOUND: &str = "No structured data could be extracted from the XML.";

/// Element paths (suffixes) and the label each one is reported under.
const FIELD_PATHS: &[(&[&str], &str)] = &[
    (&["ide", "nNF"], "Invoice Number"),
    (&["ide", "dhEmi"], "Emission Date"),
    (&["emit", "CNPJ"], "Issuer CNPJ"),
    (&["emit", "xNome"], "Issuer Name"),
    (&["enderEmit", "xLgr"], "Issuer Street"),
    (&["enderEmit", "nro"], "Issuer Street Number"),
    (&["enderEmit", "xBairro"], "Issuer District"),
    (&["enderEmit", "xMun"], "Issuer Municipality"),
    (&["enderEmit", "UF"], "Issuer State"),
    (&["dest", "CNPJ"], "Recipient CNPJ/CPF"),
    (&["dest", "CPF"], "Recipient CNPJ/CPF"),
    (&["dest", "xNome"], "Recipient Name"),
    (&["enderDest", "xLgr"], "Recipient Street"),
    (&["enderDest", "nro"], "Recipient Street Number"),
    (&["enderDest", "xBairro"], "Recipient District"),
    (&["enderDest", "xMun"], "Recipient Municipality"),
    (&["enderDest", "UF"], "Recipient State"),
    (&["ICMSTot", "vBC"], "Tax Base"),
    (&["ICMSTot", "vICMS"], "ICMS Value"),
    (&["ICMSTot", "vNF"], "Total Value"),
];

/// Placeholder pushed for elements outside the NF-e namespace.
const FOREIGN: &str = "";

/// Extract the main NF-e fields as `Label: value` lines.
pub fn extract_nfe_fields(path: &Path) -> Result<String> {
    ensure_exists(path)?;
    info!("Extracting NF-e fields from {}", path.display());

    let content = std::fs::read_to_string(path)?;
    let fields = parse_nfe_fields(&content)?;

    if fields.is_empty() {
        return Ok(NOTHING_FOUND.to_string());
    }

    debug!("Found {} NF-e fields", fields.len());
    Ok(fields
        .iter()
        .map(|(label, value)| format!("{label}: {value}"))
        .collect::<Vec<_>>()
        .join("\n"))
}

/// Parse an NF-e document into labelled fields, in first-seen order.
///
/// The first occurrence of each label wins; a recipient's CNPJ takes the
/// label before a CPF can.
pub fn parse_nfe_fields(content: &str) -> Result<Vec<(&'static str, String)>> {
    let mut reader = NsReader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<String> = Vec::new();
    let mut fields: Vec<(&'static str, String)> = Vec::new();
    let mut push_field = |label: &'static str, value: String| {
        if !value.is_empty() && !fields.iter().any(|(l, _)| *l == label) {
            fields.push((label, value));
        }
    };

    loop {
        let (ns, event) = reader
            .read_resolved_event()
            .map_err(|e| ExtractionError::Xml(e.to_string()))?;
        let in_nfe = matches!(ns, ResolveResult::Bound(Namespace(n)) if n == NFE_NAMESPACE);

        match event {
            Event::Start(e) => {
                let local = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if in_nfe && local == "infNFe" {
                    let id = e
                        .try_get_attribute("Id")
                        .map_err(|e| ExtractionError::Xml(e.to_string()))?;
                    if let Some(attr) = id {
                        let value = attr
                            .unescape_value()
                            .map_err(|e| ExtractionError::Xml(e.to_string()))?;
                        push_field("Access Key", value.trim_start_matches("NFe").to_string());
                    }
                }
                stack.push(if in_nfe { local } else { FOREIGN.to_string() });
            }
            Event::End(_) => {
                stack.pop();
            }
            Event::Text(t) => {
                let value = t
                    .unescape()
                    .map_err(|e| ExtractionError::Xml(e.to_string()))?;
                if let Some(label) = label_for(&stack) {
                    push_field(label, value.trim().to_string());
                }
            }
            Event::CData(c) => {
                let value = c
                    .decode()
                    .map_err(|e| ExtractionError::Xml(e.to_string()))?;
                if let Some(label) = label_for(&stack) {
                    push_field(label, value.trim().to_string());
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(fields)
}

fn label_for(stack: &[String]) -> Option<&'static str> {
    FIELD_PATHS.iter().find_map(|(suffix, label)| {
        let matches = stack.len() >= suffix.len()
            && stack[stack.len() - suffix.len()..]
                .iter()
                .zip(suffix.iter())
                .all(|(a, b)| a == b);
        matches.then_some(*label)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<nfeProc xmlns="http://www.portalfiscal.inf.br/nfe" versao="4.00">
  <NFe>
    <infNFe Id="NFe35250911222333000181550010000012541000000018" versao="4.00">
      <ide><nNF>1254</nNF><dhEmi>2025-09-20T19:51:09-03:00</dhEmi></ide>
      <emit>
        <CNPJ>11222333000181</CNPJ>
        <xNome>Mercado Exemplo &amp; Filhos LTDA</xNome>
        <enderEmit><xLgr>Rua A</xLgr><nro>10</nro><xMun>Sao Paulo</xMun><UF>SP</UF></enderEmit>
      </emit>
      <dest>
        <CPF>52998224725</CPF>
        <xNome>Maria Silva</xNome>
      </dest>
      <total><ICMSTot><vBC>100.00</vBC><vICMS>18.00</vICMS><vNF>138.95</vNF></ICMSTot></total>
    </infNFe>
  </NFe>
</nfeProc>"#;

    #[test]
    fn test_parse_default_namespace() {
        let fields = parse_nfe_fields(SAMPLE).unwrap();
        let get = |label: &str| {
            fields
                .iter()
                .find(|(l, _)| *l == label)
                .map(|(_, v)| v.as_str())
        };

        assert_eq!(
            get("Access Key"),
            Some("35250911222333000181550010000012541000000018")
        );
        assert_eq!(get("Invoice Number"), Some("1254"));
        assert_eq!(get("Issuer CNPJ"), Some("11222333000181"));
        assert_eq!(get("Issuer Name"), Some("Mercado Exemplo & Filhos LTDA"));
        assert_eq!(get("Issuer Municipality"), Some("Sao Paulo"));
        assert_eq!(get("Recipient CNPJ/CPF"), Some("52998224725"));
        assert_eq!(get("Recipient Name"), Some("Maria Silva"));
        assert_eq!(get("Total Value"), Some("138.95"));
        assert_eq!(get("ICMS Value"), Some("18.00"));
    }

    #[test]
    fn test_prefixed_namespace() {
        let xml = r#"<nfe:NFe xmlns:nfe="http://www.portalfiscal.inf.br/nfe">
            <nfe:infNFe Id="NFe123"><nfe:emit><nfe:CNPJ>999</nfe:CNPJ></nfe:emit></nfe:infNFe>
        </nfe:NFe>"#;

        let fields = parse_nfe_fields(xml).unwrap();
        assert_eq!(
            fields,
            vec![
                ("Access Key", "123".to_string()),
                ("Issuer CNPJ", "999".to_string())
            ]
        );
    }

    #[test]
    fn test_cdata_text_is_read() {
        let xml = r#"<NFe xmlns="http://www.portalfiscal.inf.br/nfe"><infNFe>
            <emit><xNome><![CDATA[Padaria Pao & Cia]]></xNome></emit>
            <dest><enderDest><xLgr><![CDATA[ Av. <Central> ]]></xLgr></enderDest></dest>
        </infNFe></NFe>"#;

        let fields = parse_nfe_fields(xml).unwrap();
        assert_eq!(
            fields,
            vec![
                ("Issuer Name", "Padaria Pao & Cia".to_string()),
                ("Recipient Street", "Av. <Central>".to_string())
            ]
        );
    }

    #[test]
    fn test_foreign_namespace_is_ignored() {
        let xml = r#"<root xmlns="urn:other"><emit><CNPJ>999</CNPJ></emit></root>"#;
        assert!(parse_nfe_fields(xml).unwrap().is_empty());
    }

    #[test]
    fn test_extract_reports_nothing_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.xml");
        std::fs::write(&path, "<root/>").unwrap();

        assert_eq!(extract_nfe_fields(&path).unwrap(), NOTHING_FOUND);
    }

    #[test]
    fn test_extract_formats_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nota.xml");
        std::fs::write(&path, SAMPLE).unwrap();

        let text = extract_nfe_fields(&path).unwrap();
        assert!(text.starts_with("Access Key: 3525"));
        assert!(text.contains("\nTotal Value: 138.95"));
    }

    #[test]
    fn test_malformed_xml_is_an_error() {
        let result = parse_nfe_fields("<a><b></a>");
        assert!(matches!(result, Err(ExtractionError::Xml(_))));
    }
}
