//! Instructions given to the model.

use std::path::Path;

use super::tools::ToolKind;
use crate::extract::ExtractorKind;

/// System instruction describing the extract-then-save procedure.
pub fn system_prompt() -> String {
    format!(
        "You are an assistant specialised in processing Brazilian invoices (NF-e, NFC-e and NFS-e).\n\
         Follow a two-step procedure.\n\
         \n\
         Step 1: raw extraction.\n\
         - The user gives you the path of a file (XML, PDF, HTML, PNG, JPG).\n\
         - Pick the extraction tool that matches the file type:\n\
         \x20 - .xml: '{xml}'\n\
         \x20 - .pdf: '{pdf}'\n\
         \x20 - .html or .htm: '{html}'\n\
         \x20 - .png, .jpg or .jpeg: '{image}'\n\
         - You will receive the raw text found by the tool.\n\
         \n\
         Step 2: structuring and saving.\n\
         - Read the raw text and fill in the invoice fields you can find: access key, \
         invoice number, emission date, issuer and recipient tax ids, names, addresses and \
         municipalities, total value, tax base, ISS, ICMS and the service description.\n\
         - Clean the values: remove 'R$' from amounts and keep only digits in CNPJ/CPF.\n\
         - Use null for anything the document does not contain. Never invent values.\n\
         - Once the fields are structured you MUST call '{save}' to save them.\n\
         - NEVER call '{save}' before you have the data.\n\
         - Finally, tell the user that the file was saved and where.",
        xml = ToolKind::ExtractXml,
        pdf = ToolKind::ExtractPdf,
        html = ToolKind::ExtractHtml,
        image = ToolKind::ExtractImage,
        save = ToolKind::SaveRecord,
    )
}

/// The user turn that starts processing of `path`.
pub fn file_request(path: &Path) -> String {
    let hint = ExtractorKind::from_path(path)
        .map(|kind| format!(" It looks like a {} file.", kind.as_str().to_uppercase()))
        .unwrap_or_default();
    format!(
        "Process the invoice at '{}'.{hint} Extract its data and save it.",
        path.display()
    )
}
