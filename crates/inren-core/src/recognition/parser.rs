//! Parsing model output into [`InvoiceData`].

use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, trace};

use crate::error::ParseError;
use crate::models::fields::FieldName;
use crate::models::invoice::InvoiceData;

lazy_static! {
    // First `{` through last `}`, across lines.
    static ref JSON_OBJECT: Regex = Regex::new(r"(?s)\{.*\}").unwrap();

    // YYYY-MM-DD, YYYY/MM/DD, YYYY.MM.DD
    static ref DATE_YMD: Regex = Regex::new(
        r"^(\d{4})[./\-](\d{1,2})[./\-](\d{1,2})$"
    ).unwrap();

    // DD.MM.YYYY, DD/MM/YYYY
    static ref DATE_DMY: Regex = Regex::new(
        r"^(\d{1,2})[./](\d{1,2})[./](\d{4})$"
    ).unwrap();

    // YYYY年MM月DD日
    static ref DATE_CJK: Regex = Regex::new(
        r"^(\d{4})\s*年\s*(\d{1,2})\s*月\s*(\d{1,2})\s*日$"
    ).unwrap();
}

/// The `{...}` region of a response, tolerating prose or code fences around it.
pub fn extract_json_object(content: &str) -> Option<&str> {
    JSON_OBJECT.find(content).map(|m| m.as_str())
}

/// Parse a model response into invoice data.
///
/// Every field is present in the result; missing or unusable values become
/// the empty string, and the date is normalized to `YYYY-MM-DD` when it is in
/// a recognizable layout.
pub fn parse_response(content: &str) -> Result<InvoiceData, ParseError> {
    let json = extract_json_object(content).ok_or(ParseError::NoJsonObject)?;
    trace!("Extracted JSON region: {}", json);

    let value: Value =
        serde_json::from_str(json).map_err(|e| ParseError::Malformed(e.to_string()))?;

    let Value::Object(object) = value else {
        return Err(ParseError::Malformed("expected a JSON object".to_string()));
    };

    let field = |name: FieldName| field_text(object.get(name.key()));

    let data = InvoiceData {
        seller_name: field(FieldName::SellerName),
        seller_tax_id: field(FieldName::SellerTaxId),
        buyer_name: field(FieldName::BuyerName),
        buyer_tax_id: field(FieldName::BuyerTaxId),
        amount: field(FieldName::Amount),
        date: normalize_date(&field(FieldName::Date)),
        invoice_number: field(FieldName::InvoiceNumber),
    };

    debug!(
        "Parsed invoice: seller='{}' amount='{}' date='{}'",
        data.seller_name, data.amount, data.date
    );
    Ok(data)
}

/// Coerce a JSON value to field text.
///
/// Strings pass through and non-zero numbers keep their literal; null,
/// booleans, zero and nested values are treated as absent.
fn field_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Number(number)) if !is_zero(number) => number.to_string(),
        _ => String::new(),
    }
}

fn is_zero(number: &serde_json::Number) -> bool {
    number.as_f64().is_some_and(|n| n == 0.0)
}

/// Rewrite common date layouts to `YYYY-MM-DD`; anything else is returned unchanged.
pub fn normalize_date(raw: &str) -> String {
    let text = raw.trim();

    let parts = if let Some(caps) = DATE_YMD.captures(text).or_else(|| DATE_CJK.captures(text)) {
        Some((caps[1].to_string(), caps[2].to_string(), caps[3].to_string()))
    } else {
        DATE_DMY
            .captures(text)
            .map(|caps| (caps[3].to_string(), caps[2].to_string(), caps[1].to_string()))
    };

    let date = parts.and_then(|(year, month, day)| {
        NaiveDate::from_ymd_opt(
            year.parse().ok()?,
            month.parse().ok()?,
            day.parse().ok()?,
        )
    });

    match date {
        Some(date) => date.format("%Y-%m-%d").to_string(),
        None => raw.to_string(),
    }
}
