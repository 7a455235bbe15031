//! Field selection used when composing file names.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// One of the keys of [`InvoiceData`](super::invoice::InvoiceData).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldName {
    SellerName,
    SellerTaxId,
    BuyerName,
    BuyerTaxId,
    Amount,
    Date,
    InvoiceNumber,
}

impl FieldName {
    /// All fields, in the order the model is asked to return them.
    pub const ALL: [FieldName; 7] = [
        Self::SellerName,
        Self::SellerTaxId,
        Self::BuyerName,
        Self::BuyerTaxId,
        Self::Amount,
        Self::Date,
        Self::InvoiceNumber,
    ];

    /// JSON key of the field.
    pub fn key(self) -> &'static str {
        match self {
            Self::SellerName => "sellerName",
            Self::SellerTaxId => "sellerTaxId",
            Self::BuyerName => "buyerName",
            Self::BuyerTaxId => "buyerTaxId",
            Self::Amount => "amount",
            Self::Date => "date",
            Self::InvoiceNumber => "invoiceNumber",
        }
    }

    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            Self::SellerName => "Seller name",
            Self::SellerTaxId => "Seller tax ID",
            Self::BuyerName => "Buyer name",
            Self::BuyerTaxId => "Buyer tax ID",
            Self::Amount => "Amount",
            Self::Date => "Invoice date",
            Self::InvoiceNumber => "Invoice number",
        }
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for FieldName {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|f| f.key().eq_ignore_ascii_case(s))
            .ok_or_else(|| ModelError::UnknownField(s.to_string()))
    }
}

/// Whether and where a field participates in naming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldConfig {
    pub name: FieldName,
    pub label: String,
    pub enabled: bool,
    /// Sort key; need not be contiguous.
    pub order: i32,
}

impl FieldConfig {
    pub fn new(name: FieldName, enabled: bool, order: i32) -> Self {
        Self {
            name,
            label: name.label().to_string(),
            enabled,
            order,
        }
    }

    /// All seven fields in key order; seller, amount and date enabled.
    pub fn defaults() -> Vec<FieldConfig> {
        FieldName::ALL
            .into_iter()
            .enumerate()
            .map(|(i, name)| {
                let enabled = matches!(
                    name,
                    FieldName::SellerName | FieldName::Amount | FieldName::Date
                );
                FieldConfig::new(name, enabled, i as i32)
            })
            .collect()
    }

    /// Build a selection from an ordered list of names: listed fields are
    /// enabled in the given order, the rest are disabled.
    pub fn from_names(names: &[FieldName]) -> Vec<FieldConfig> {
        let mut fields: Vec<FieldConfig> = names
            .iter()
            .enumerate()
            .map(|(i, name)| FieldConfig::new(*name, true, i as i32))
            .collect();

        let offset = fields.len() as i32;
        fields.extend(
            FieldName::ALL
                .into_iter()
                .filter(|name| !names.contains(name))
                .enumerate()
                .map(|(i, name)| FieldConfig::new(name, false, offset + i as i32)),
        );
        fields
    }
}
