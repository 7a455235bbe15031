//! Default rasterizer: lopdf for PDFs, the image crate for scans and photos.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use image::DynamicImage;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use tracing::{debug, warn};

use super::extractor::PdfDocument;
use super::{Rasterizer, Result, SourceKind};
use crate::error::RasterError;
use crate::models::config::RenderConfig;
use crate::models::invoice::SourceFile;

/// Renders the first page of PDFs and images to JPEG data URIs.
#[derive(Debug, Clone)]
pub struct PageRasterizer {
    max_image_size: u32,
    jpeg_quality: u8,
}

impl PageRasterizer {
    pub fn new(config: &RenderConfig) -> Self {
        Self {
            max_image_size: config.max_image_size.max(1),
            jpeg_quality: config.jpeg_quality.clamp(1, 100),
        }
    }

    /// Render already-loaded bytes. Blocking; runs on the blocking pool.
    pub fn render_bytes(&self, kind: SourceKind, data: &[u8], scale: f32) -> Result<String> {
        let image = match kind {
            SourceKind::Pdf => {
                let pdf = PdfDocument::load(data)?;
                let image = pdf.first_page_image()?;
                match pdf.page_width(1) {
                    Some(width) if scale > 0.0 => fit_width(image, (width * scale) as u32),
                    _ => image,
                }
            }
            SourceKind::Image => image::load_from_memory(data)?,
        };

        let image = fit_longest_side(image, self.max_image_size);
        debug!("Rendered page image {}x{}", image.width(), image.height());
        encode_data_uri(&image, self.jpeg_quality)
    }
}

impl Default for PageRasterizer {
    fn default() -> Self {
        Self::new(&RenderConfig::default())
    }
}

#[async_trait]
impl Rasterizer for PageRasterizer {
    async fn render(&self, file: &SourceFile, scale: f32) -> Result<String> {
        let kind = SourceKind::detect(file)?;
        let data = file.read().await.map_err(|source| RasterError::Read {
            path: file.path.clone(),
            source,
        })?;

        let this = self.clone();
        tokio::task::spawn_blocking(move || this.render_bytes(kind, &data, scale))
            .await
            .map_err(|e| RasterError::Task(e.to_string()))?
    }

    async fn page_count(&self, file: &SourceFile) -> u32 {
        let kind = match SourceKind::detect(file) {
            Ok(kind) => kind,
            Err(e) => {
                warn!("Cannot count pages of {}: {}", file.name, e);
                return 0;
            }
        };

        let data = match file.read().await {
            Ok(data) => data,
            Err(e) => {
                warn!("Cannot count pages of {}: {}", file.name, e);
                return 0;
            }
        };

        match kind {
            SourceKind::Image => 1,
            SourceKind::Pdf => match PdfDocument::load(&data) {
                Ok(pdf) => pdf.page_count(),
                Err(e) => {
                    warn!("Cannot count pages of {}: {}", file.name, e);
                    0
                }
            },
        }
    }
}

/// Encode an image as a base64 JPEG data URI.
pub fn encode_data_uri(image: &DynamicImage, quality: u8) -> Result<String> {
    let rgb = image.to_rgb8();
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality).encode_image(&rgb)?;
    Ok(format!(
        "data:image/jpeg;base64,{}",
        BASE64_STANDARD.encode(&buffer)
    ))
}

/// Downscale so the width does not exceed `target`. Never upscales.
fn fit_width(image: DynamicImage, target: u32) -> DynamicImage {
    if target == 0 || image.width() <= target {
        return image;
    }
    let height = (u64::from(image.height()) * u64::from(target) / u64::from(image.width())).max(1);
    image.resize_exact(target, height as u32, FilterType::Lanczos3)
}

/// Downscale so neither side exceeds `max`.
fn fit_longest_side(image: DynamicImage, max: u32) -> DynamicImage {
    if image.width() <= max && image.height() <= max {
        return image;
    }
    image.resize(max, max, FilterType::Lanczos3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::extractor::tests::sample_pdf;
    use image::{ImageFormat, RgbImage};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = DynamicImage::ImageRgb8(RgbImage::new(width, height));
        let mut buffer = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        buffer
    }

    fn decode(uri: &str) -> DynamicImage {
        let payload = uri.strip_prefix("data:image/jpeg;base64,").unwrap();
        let bytes = BASE64_STANDARD.decode(payload).unwrap();
        image::load_from_memory(&bytes).unwrap()
    }

    #[test]
    fn test_render_image_bytes() {
        let rasterizer = PageRasterizer::default();
        let uri = rasterizer
            .render_bytes(SourceKind::Image, &png_bytes(40, 20), 2.0)
            .unwrap();
        let image = decode(&uri);
        assert_eq!((image.width(), image.height()), (40, 20));
    }

    #[test]
    fn test_render_caps_longest_side() {
        let rasterizer = PageRasterizer::new(&RenderConfig {
            max_image_size: 50,
            ..Default::default()
        });
        let uri = rasterizer
            .render_bytes(SourceKind::Image, &png_bytes(200, 100), 1.0)
            .unwrap();
        let image = decode(&uri);
        assert_eq!((image.width(), image.height()), (50, 25));
    }

    #[test]
    fn test_render_pdf_scales_to_page_width() {
        let rasterizer = PageRasterizer::default();
        // Page is 595pt wide; at scale 0.1 the image is capped to 59px.
        let uri = rasterizer
            .render_bytes(SourceKind::Pdf, &sample_pdf(Some((100, 50))), 0.1)
            .unwrap();
        let image = decode(&uri);
        assert_eq!(image.width(), 59);
    }

    #[test]
    fn test_render_pdf_without_image_fails() {
        let rasterizer = PageRasterizer::default();
        let err = rasterizer
            .render_bytes(SourceKind::Pdf, &sample_pdf(None), 2.0)
            .unwrap_err();
        assert!(matches!(err, RasterError::NoImage));
    }

    #[tokio::test]
    async fn test_page_count_never_fails() {
        let dir = tempfile::tempdir().unwrap();
        let pdf_path = dir.path().join("one.pdf");
        std::fs::write(&pdf_path, sample_pdf(None)).unwrap();
        let broken = dir.path().join("broken.pdf");
        std::fs::write(&broken, b"%PDF garbage").unwrap();

        let rasterizer = PageRasterizer::default();
        assert_eq!(rasterizer.page_count(&SourceFile::new(&pdf_path)).await, 1);
        assert_eq!(rasterizer.page_count(&SourceFile::new(&broken)).await, 0);
        assert_eq!(
            rasterizer.page_count(&SourceFile::new(dir.path().join("missing.pdf"))).await,
            0
        );
    }

    #[tokio::test]
    async fn test_render_rejects_unsupported_type() {
        let rasterizer = PageRasterizer::default();
        let err = rasterizer
            .render(&SourceFile::new("notes.txt"), 2.0)
            .await
            .unwrap_err();
        assert!(matches!(err, RasterError::Unsupported(_)));
    }
}
