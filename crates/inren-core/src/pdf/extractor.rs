//! First-page image extraction from PDFs using lopdf.

use image::{DynamicImage, ImageBuffer, Rgb};
use lopdf::{Document, Object, ObjectId};
use tracing::{debug, trace};

use super::Result;
use crate::error::RasterError;

/// A loaded PDF document.
pub struct PdfDocument {
    document: Document,
}

impl PdfDocument {
    /// Parse a PDF from bytes, decrypting empty-password documents.
    pub fn load(data: &[u8]) -> Result<Self> {
        let mut document = Document::load_mem(data).map_err(|e| RasterError::Pdf(e.to_string()))?;

        if document.is_encrypted() {
            document
                .decrypt("")
                .map_err(|_| RasterError::Pdf("document is encrypted".to_string()))?;
            debug!("Decrypted PDF with empty password");
        }

        if document.get_pages().is_empty() {
            return Err(RasterError::NoPages);
        }

        Ok(Self { document })
    }

    pub fn page_count(&self) -> u32 {
        self.document.get_pages().len() as u32
    }

    /// Width of a page in points, from its (possibly inherited) MediaBox.
    pub fn page_width(&self, page: u32) -> Option<f32> {
        let page_id = *self.document.get_pages().get(&page)?;
        let media_box = inherited_attribute(&self.document, page_id, b"MediaBox")?;

        let Object::Array(values) = media_box else {
            return None;
        };
        if values.len() != 4 {
            return None;
        }
        let x1 = values[0].as_float().ok()?;
        let x2 = values[2].as_float().ok()?;
        Some((x2 - x1).abs())
    }

    /// The image standing in for page 1: the largest raster placed on it,
    /// or the largest raster anywhere in the document.
    pub fn first_page_image(&self) -> Result<DynamicImage> {
        let mut images = self.page_images(1)?;
        if images.is_empty() {
            debug!("No XObject images on first page, scanning all objects");
            images = self.all_images();
        }

        images
            .into_iter()
            .max_by_key(|img| u64::from(img.width()) * u64::from(img.height()))
            .ok_or(RasterError::NoImage)
    }

    /// Decodable images referenced from a page's XObject resources.
    pub fn page_images(&self, page: u32) -> Result<Vec<DynamicImage>> {
        let doc = &self.document;
        let page_id = *doc
            .get_pages()
            .get(&page)
            .ok_or_else(|| RasterError::Pdf(format!("invalid page number: {}", page)))?;

        let mut images = Vec::new();

        let Some(Object::Dictionary(resources)) = inherited_attribute(doc, page_id, b"Resources")
        else {
            return Ok(images);
        };

        if let Ok(xobjects) = resources.get(b"XObject") {
            if let Ok((_, Object::Dictionary(xobj_dict))) = doc.dereference(xobjects) {
                for (_name, obj_ref) in xobj_dict.iter() {
                    if let Ok((_, obj)) = doc.dereference(obj_ref) {
                        if let Some(img) = decode_image_object(doc, obj) {
                            images.push(img);
                        }
                    }
                }
            }
        }

        debug!("Extracted {} images from page {}", images.len(), page);
        Ok(images)
    }

    fn all_images(&self) -> Vec<DynamicImage> {
        self.document
            .objects
            .values()
            .filter_map(|object| decode_image_object(&self.document, object))
            .collect()
    }
}

/// Look up a page attribute, following the Parent chain for inheritable keys.
fn inherited_attribute(doc: &Document, node_id: ObjectId, key: &[u8]) -> Option<Object> {
    let Ok(Object::Dictionary(dict)) = doc.get_object(node_id) else {
        return None;
    };

    if let Ok(value) = dict.get(key) {
        if let Ok((_, resolved)) = doc.dereference(value) {
            return Some(resolved.clone());
        }
    }

    match dict.get(b"Parent") {
        Ok(Object::Reference(parent_id)) => inherited_attribute(doc, *parent_id, key),
        _ => None,
    }
}

fn decode_image_object(doc: &Document, obj: &Object) -> Option<DynamicImage> {
    let Object::Stream(stream) = obj else {
        return None;
    };
    let dict = &stream.dict;

    if dict.get(b"Subtype").ok()?.as_name().ok()? != b"Image" {
        return None;
    }

    let width = dict.get(b"Width").ok()?.as_i64().ok()? as u32;
    let height = dict.get(b"Height").ok()?.as_i64().ok()? as u32;
    trace!("Found image object: {}x{}", width, height);

    if let Ok(filter) = dict.get(b"Filter") {
        let filter_name = match filter {
            Object::Name(name) => Some(name.as_slice()),
            Object::Array(arr) => arr.first().and_then(|o| o.as_name().ok()),
            _ => None,
        };

        match filter_name {
            // Already a JPEG; the stream content is the file.
            Some(b"DCTDecode") => {
                return image::load_from_memory_with_format(
                    &stream.content,
                    image::ImageFormat::Jpeg,
                )
                .ok();
            }
            Some(b"JPXDecode" | b"CCITTFaxDecode" | b"JBIG2Decode") => {
                trace!("Skipping image with unsupported filter");
                return None;
            }
            _ => {}
        }
    }

    let data = stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone());

    let color_space = dict
        .get(b"ColorSpace")
        .ok()
        .and_then(|o| match o {
            Object::Name(name) => Some(name.as_slice()),
            Object::Array(arr) => arr.first().and_then(|o| o.as_name().ok()),
            Object::Reference(r) => doc.get_object(*r).ok().and_then(|o| o.as_name().ok()),
            _ => None,
        })
        .unwrap_or(b"DeviceRGB");

    let bits = dict
        .get(b"BitsPerComponent")
        .ok()
        .and_then(|o| o.as_i64().ok())
        .unwrap_or(8);

    if bits != 8 {
        trace!("Unsupported bits per component: {}", bits);
        return None;
    }

    image_from_raw(&data, width, height, color_space)
}

fn image_from_raw(data: &[u8], width: u32, height: u32, color_space: &[u8]) -> Option<DynamicImage> {
    let pixels = (width as usize) * (height as usize);

    let rgb: Vec<u8> = match color_space {
        b"DeviceRGB" | b"RGB" if data.len() >= pixels * 3 => data[..pixels * 3].to_vec(),
        b"DeviceGray" | b"G" if data.len() >= pixels => {
            data[..pixels].iter().flat_map(|&g| [g, g, g]).collect()
        }
        b"DeviceCMYK" | b"CMYK" if data.len() >= pixels * 4 => data[..pixels * 4]
            .chunks_exact(4)
            .flat_map(|px| {
                let k = 255 - u16::from(px[3]);
                let channel = |c: u8| ((255 - u16::from(c)) * k / 255) as u8;
                [channel(px[0]), channel(px[1]), channel(px[2])]
            })
            .collect(),
        _ => {
            trace!(
                "Could not decode image: data_len={}, colorspace={:?}",
                data.len(),
                String::from_utf8_lossy(color_space)
            );
            return None;
        }
    };

    ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, rgb).map(DynamicImage::ImageRgb8)
}
