//! File naming from recognized invoice fields.

use crate::models::fields::FieldConfig;
use crate::models::invoice::{Invoice, InvoiceData};

/// Characters that are not allowed in file names on common filesystems.
const FORBIDDEN: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Extension used when the original name has none.
pub const DEFAULT_EXTENSION: &str = "pdf";

/// Compute the output file name for an invoice.
///
/// Invoices without recognized data keep their original name.
pub fn generate_file_name(invoice: &Invoice, fields: &[FieldConfig], separator: &str) -> String {
    match invoice.data() {
        Some(data) => name_from_data(data, invoice.original_name(), fields, separator),
        None => invoice.original_name().to_string(),
    }
}

/// Join the enabled field values in order and keep the original extension.
///
/// Values are trimmed and sanitized one by one; empty parts are skipped, so a
/// value made only of forbidden characters leaves no stray separator. If
/// nothing is left the original name is returned unchanged.
pub fn name_from_data(
    data: &InvoiceData,
    original_name: &str,
    fields: &[FieldConfig],
    separator: &str,
) -> String {
    let mut enabled: Vec<&FieldConfig> = fields.iter().filter(|f| f.enabled).collect();
    enabled.sort_by_key(|f| f.order);

    let parts: Vec<String> = enabled
        .iter()
        .map(|f| data.get(f.name).trim())
        .filter(|value| !value.is_empty())
        .map(sanitize_part)
        .filter(|part| !part.is_empty())
        .collect();

    if parts.is_empty() {
        return original_name.to_string();
    }

    format!("{}.{}", parts.join(separator), file_extension(original_name))
}

/// Remove characters that cannot appear in a file name.
pub fn sanitize_part(value: &str) -> String {
    value
        .chars()
        .filter(|c| !FORBIDDEN.contains(c) && !c.is_ascii_control())
        .collect()
}

/// Segment after the last dot, or `pdf` when there is none.
pub fn file_extension(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => ext,
        _ => DEFAULT_EXTENSION,
    }
}
