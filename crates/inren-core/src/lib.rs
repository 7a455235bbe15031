//! Core library for AI-assisted invoice recognition and renaming.
//!
//! This crate provides:
//! - First-page rasterization of PDF and image invoices
//! - Remote recognition through an OpenAI-compatible vision model, with
//!   bounded concurrency and retry
//! - File name generation from recognized fields
//! - Zip packaging with collision-free entry names

pub mod archive;
pub mod batch;
pub mod error;
pub mod models;
pub mod naming;
pub mod pdf;
pub mod recognition;

pub use archive::{NameRegistry, download_as_zip, export_file, format_file_size};
pub use batch::{BatchSummary, InvoiceBatch};
pub use error::{InrenError, Result};
pub use models::{AppConfig, FieldConfig, FieldName, InrenConfig, Invoice, InvoiceData, InvoiceStatus, SourceFile};
pub use naming::generate_file_name;
pub use pdf::{PageRasterizer, Rasterizer};
pub use recognition::{ConnectionReport, RecognitionClient, test_connection};
