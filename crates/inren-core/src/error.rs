//! Error types for the inren-core library.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Main error type for the inren library.
#[derive(Error, Debug)]
pub enum InrenError {
    /// The API configuration is missing or unusable.
    #[error("configuration error: {0}")]
    Config(String),

    /// A configuration value is out of bounds.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Remote recognition failed.
    #[error("recognition error: {0}")]
    Recognition(#[from] RecognitionError),

    /// Rendering the source document to an image failed.
    #[error("rasterization error: {0}")]
    Raster(#[from] RasterError),

    /// Export to disk failed.
    #[error("export error: {0}")]
    Archive(#[from] ArchiveError),

    /// Invoice record lifecycle violation.
    #[error("invoice error: {0}")]
    Model(#[from] ModelError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration validation failure, carrying every issue found.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid configuration: {}", issues.join("; "))]
pub struct ValidationError {
    pub issues: Vec<String>,
}

/// Errors raised while talking to the remote model.
#[derive(Error, Debug)]
pub enum RecognitionError {
    /// Network-level failure (connection refused, DNS, TLS, body decode).
    #[error("transport failure: {0}")]
    Transport(String),

    /// The request did not complete in time.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The API answered with a non-success status.
    #[error("API error ({status}): {body}")]
    Status { status: u16, body: String },

    /// The model answered without any text content.
    #[error("model returned empty content")]
    EmptyResponse,

    /// The model answered but the content could not be parsed.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Every attempt failed; `last` is the final attempt's error.
    #[error("recognition failed after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: Box<RecognitionError>,
    },
}

impl RecognitionError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Exhausted { .. })
    }

    /// The error of the final attempt, unwrapping retry context.
    pub fn last_attempt(&self) -> &RecognitionError {
        match self {
            Self::Exhausted { last, .. } => last.last_attempt(),
            other => other,
        }
    }
}

/// Errors related to parsing model output.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// No `{...}` region in the response text.
    #[error("failed to parse model response: no JSON object found")]
    NoJsonObject,

    /// The extracted region is not valid JSON.
    #[error("failed to parse model response: {0}")]
    Malformed(String),
}

/// Errors related to rendering a document to an image.
#[derive(Error, Debug)]
pub enum RasterError {
    /// The file type is not a supported invoice format.
    #[error("unsupported file type: {0}")]
    Unsupported(String),

    /// Failed to read the source file.
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse the PDF.
    #[error("failed to parse PDF: {0}")]
    Pdf(String),

    /// The PDF has no pages.
    #[error("PDF has no pages")]
    NoPages,

    /// No raster content could be found on the first page.
    #[error("no renderable image on first page")]
    NoImage,

    /// Image decoding or encoding failed.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// The blocking render task failed.
    #[error("render task failed: {0}")]
    Task(String),
}

/// Errors related to single-file and archive export.
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// Failed to read a source file.
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write the output.
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to assemble the zip archive.
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// Errors related to invoice record state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// Status transitions only move forward.
    #[error("invalid status transition for {id}: {from} -> {to}")]
    InvalidTransition { id: String, from: String, to: String },

    /// Unknown InvoiceData key.
    #[error("unknown field name: {0}")]
    UnknownField(String),
}

/// Result type for the inren library.
pub type Result<T> = std::result::Result<T, InrenError>;
