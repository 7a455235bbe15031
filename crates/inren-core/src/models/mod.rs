//! Data models: invoice records, recognized data, field selection and configuration.

pub mod config;
pub mod fields;
pub mod invoice;

pub use config::{AppConfig, InrenConfig};
pub use fields::{FieldConfig, FieldName};
pub use invoice::{Invoice, InvoiceData, InvoiceStatus, SourceFile};
