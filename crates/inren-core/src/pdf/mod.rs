//! Document rasterization: turning the first page of a source file into an image.

mod extractor;
mod rasterizer;

pub use extractor::PdfDocument;
pub use rasterizer::{PageRasterizer, encode_data_uri};

use async_trait::async_trait;

use crate::error::RasterError;
use crate::models::invoice::SourceFile;

/// Result type for rasterization.
pub type Result<T> = std::result::Result<T, RasterError>;

/// Kind of source document accepted for recognition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Pdf,
    Image,
}

impl SourceKind {
    /// Detect the kind from the original file name.
    pub fn detect(file: &SourceFile) -> Result<Self> {
        match file.extension().as_deref() {
            Some("pdf") => Ok(Self::Pdf),
            Some("jpg" | "jpeg" | "png") => Ok(Self::Image),
            Some(other) => Err(RasterError::Unsupported(other.to_string())),
            None => Err(RasterError::Unsupported(file.name.clone())),
        }
    }

    /// Whether the file is an accepted invoice format.
    pub fn is_supported(file: &SourceFile) -> bool {
        Self::detect(file).is_ok()
    }
}

/// Converts a document's first page to an encoded raster image.
#[async_trait]
pub trait Rasterizer: Send + Sync {
    /// Render page 1 as a data URI (`data:image/jpeg;base64,...`).
    async fn render(&self, file: &SourceFile, scale: f32) -> Result<String>;

    /// Number of pages, or 0 if the document cannot be read.
    async fn page_count(&self, file: &SourceFile) -> u32;
}
