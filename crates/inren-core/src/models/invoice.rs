//! Invoice records and the structured data recognized from them.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::fields::FieldName;
use crate::error::ModelError;

/// Structured fields extracted from one invoice.
///
/// Every field is always present; anything the model could not resolve is
/// the empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InvoiceData {
    /// Seller (issuer) name.
    pub seller_name: String,

    /// Seller tax identifier.
    pub seller_tax_id: String,

    /// Buyer (receiver) name.
    pub buyer_name: String,

    /// Buyer tax identifier.
    pub buyer_tax_id: String,

    /// Invoice amount as a numeric literal.
    pub amount: String,

    /// Issue date, `YYYY-MM-DD`.
    pub date: String,

    /// Invoice number.
    pub invoice_number: String,
}

impl InvoiceData {
    /// Value of a field by name.
    pub fn get(&self, field: FieldName) -> &str {
        match field {
            FieldName::SellerName => &self.seller_name,
            FieldName::SellerTaxId => &self.seller_tax_id,
            FieldName::BuyerName => &self.buyer_name,
            FieldName::BuyerTaxId => &self.buyer_tax_id,
            FieldName::Amount => &self.amount,
            FieldName::Date => &self.date,
            FieldName::InvoiceNumber => &self.invoice_number,
        }
    }

    /// True when the model resolved nothing at all.
    pub fn is_empty(&self) -> bool {
        FieldName::ALL.iter().all(|f| self.get(*f).is_empty())
    }
}

/// Processing state of an invoice record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

impl InvoiceStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    /// Transitions only move forward: pending -> processing -> completed | error.
    pub fn can_transition_to(self, next: InvoiceStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Error)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle to a source document on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFile {
    /// Location of the document.
    pub path: PathBuf,

    /// Original file name as submitted by the user.
    pub name: String,
}

impl SourceFile {
    /// Create a handle named after the path's final component.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { path, name }
    }

    /// Create a handle whose user-facing name differs from the path.
    pub fn with_name(path: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lowercased extension of the original name, if any.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
    }

    /// Read the whole file into memory.
    pub async fn read(&self) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(&self.path).await
    }
}

/// In-memory record of one uploaded document and its processing state.
#[derive(Debug, Clone, Serialize)]
pub struct Invoice {
    /// Unique, caller-generated identifier.
    pub id: String,

    /// Source document.
    pub source: SourceFile,

    /// Preview image as a data URI.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,

    status: InvoiceStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<InvoiceData>,

    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,

    /// Name computed by the naming engine.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_file_name: Option<String>,
}

impl Invoice {
    /// Create a pending record with a fresh random id.
    pub fn new(source: SourceFile) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), source)
    }

    /// Create a pending record with a caller-chosen id.
    pub fn with_id(id: impl Into<String>, source: SourceFile) -> Self {
        Self {
            id: id.into(),
            source,
            preview: None,
            status: InvoiceStatus::Pending,
            data: None,
            error: None,
            new_file_name: None,
        }
    }

    pub fn status(&self) -> InvoiceStatus {
        self.status
    }

    pub fn data(&self) -> Option<&InvoiceData> {
        self.data.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Original file name of the source document.
    pub fn original_name(&self) -> &str {
        &self.source.name
    }

    /// Computed name if set, otherwise the original name.
    pub fn output_name(&self) -> &str {
        self.new_file_name.as_deref().unwrap_or(&self.source.name)
    }

    /// Mark the record as submitted for recognition.
    pub fn start_processing(&mut self) -> Result<(), ModelError> {
        self.transition(InvoiceStatus::Processing)
    }

    /// Attach recognized data. Only valid while processing.
    pub fn complete(&mut self, data: InvoiceData) -> Result<(), ModelError> {
        self.transition(InvoiceStatus::Completed)?;
        self.data = Some(data);
        self.error = None;
        Ok(())
    }

    /// Record a failure. Data is never attached to a failed record.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), ModelError> {
        self.transition(InvoiceStatus::Error)?;
        self.data = None;
        self.error = Some(message.into());
        Ok(())
    }

    fn transition(&mut self, next: InvoiceStatus) -> Result<(), ModelError> {
        if !self.status.can_transition_to(next) {
            return Err(ModelError::InvalidTransition {
                id: self.id.clone(),
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }
}
