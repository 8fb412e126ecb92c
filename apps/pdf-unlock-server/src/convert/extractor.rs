//! PDF content extraction using lopdf
//!
//! Text comes from lopdf's per-page text extraction, split into paragraphs
//! at blank lines. Images are read from each page's XObject resources: JPEG
//! streams are passed through and raw 8-bit RGB or gray bitmaps are
//! re-encoded as PNG. Other image encodings are skipped.

use std::io::Cursor;

use image::{DynamicImage, GrayImage, RgbImage};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use super::types::{ContentBlock, ExtractedDocument, ImageBlock, ImageFormat};

/// Guard against cyclic page trees when walking up `Parent` links
const MAX_TREE_DEPTH: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("Failed to parse PDF: {0}")]
    Parse(#[source] lopdf::Error),

    #[error("Failed to extract text from page {page}: {source}")]
    Text {
        page: u32,
        #[source]
        source: lopdf::Error,
    },
}

/// Turns document bytes into content blocks
///
/// Implementations are blocking and run on the blocking thread pool.
pub trait ContentExtractor: Send + Sync {
    fn extract(&self, pdf: &[u8], include_images: bool) -> Result<ExtractedDocument, ExtractError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl ContentExtractor for LopdfExtractor {
    fn extract(&self, pdf: &[u8], include_images: bool) -> Result<ExtractedDocument, ExtractError> {
        let document = Document::load_mem(pdf).map_err(ExtractError::Parse)?;
        let pages = document.get_pages();

        let mut blocks = Vec::new();
        for (&page, &page_id) in &pages {
            let text = document
                .extract_text(&[page])
                .map_err(|source| ExtractError::Text { page, source })?;
            blocks.extend(
                paragraphs(&text)
                    .into_iter()
                    .map(|text| ContentBlock::Paragraph { page, text }),
            );

            if include_images {
                blocks.extend(page_images(&document, page_id, page).into_iter().map(ContentBlock::Image));
            }
        }

        let extracted = ExtractedDocument {
            page_count: pages.len() as u32,
            blocks,
        };
        tracing::debug!(
            pages = extracted.page_count,
            text_blocks = extracted.text_block_count(),
            images = extracted.image_count(),
            "Extracted PDF content"
        );
        Ok(extracted)
    }
}

/// Group lines into paragraphs separated by blank lines
fn paragraphs(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines().map(str::trim) {
        if line.is_empty() {
            if !current.is_empty() {
                out.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        out.push(current.join("\n"));
    }
    out
}

// ============================================================================
// Images
// ============================================================================

#[derive(Debug, thiserror::Error)]
enum ImageDecodeError {
    #[error(transparent)]
    Pdf(#[from] lopdf::Error),
    #[error(transparent)]
    Encode(#[from] image::ImageError),
}

fn page_images(document: &Document, page_id: ObjectId, page: u32) -> Vec<ImageBlock> {
    let Some(xobjects) = page_resources(document, page_id)
        .and_then(|resources| resources.get(b"XObject").ok())
        .and_then(|xobjects| resolve(document, xobjects).as_dict().ok())
    else {
        return Vec::new();
    };

    let mut images = Vec::new();
    for (name, object) in xobjects.iter() {
        let Object::Stream(stream) = resolve(document, object) else {
            continue;
        };
        if name_of(document, &stream.dict, b"Subtype") != Some(b"Image".as_slice()) {
            continue;
        }

        match decode_image(document, stream, page) {
            Ok(Some(image)) => images.push(image),
            Ok(None) => {
                tracing::debug!(page, name = %String::from_utf8_lossy(name), "Skipping unsupported image encoding");
            }
            Err(e) => {
                tracing::warn!(page, name = %String::from_utf8_lossy(name), error = %e, "Failed to decode image");
            }
        }
    }
    images
}

/// Find a page's resource dictionary, following inheritance up the page tree
fn page_resources(document: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    let mut node = document.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(resources) = node.get(b"Resources") {
            return resolve(document, resources).as_dict().ok();
        }
        let parent = node.get(b"Parent").ok()?.as_reference().ok()?;
        node = document.get_dictionary(parent).ok()?;
    }
    None
}

fn decode_image(
    document: &Document,
    stream: &Stream,
    page: u32,
) -> Result<Option<ImageBlock>, ImageDecodeError> {
    let dict = &stream.dict;
    let filters = filter_names(document, dict);
    let width = integer_of(document, dict, b"Width");
    let height = integer_of(document, dict, b"Height");

    match filters.as_slice() {
        [dct] if dct.as_slice() == b"DCTDecode" => {
            let (width, height) = match (width, height) {
                (Some(w), Some(h)) => (w, h),
                _ => {
                    let decoded = image::load_from_memory(&stream.content)?;
                    (decoded.width(), decoded.height())
                }
            };
            Ok(Some(ImageBlock {
                page,
                data: stream.content.clone(),
                format: ImageFormat::Jpeg,
                width,
                height,
            }))
        }
        [] | [_] if filters.iter().all(|f| f.as_slice() == b"FlateDecode") => {
            let (Some(width), Some(height)) = (width, height) else {
                return Ok(None);
            };
            if integer_of(document, dict, b"BitsPerComponent") != Some(8) {
                return Ok(None);
            }

            let raw = if filters.is_empty() {
                stream.content.clone()
            } else {
                stream.decompressed_content()?
            };

            let bitmap = match name_of(document, dict, b"ColorSpace") {
                Some(b"DeviceRGB") => RgbImage::from_raw(width, height, raw).map(DynamicImage::ImageRgb8),
                Some(b"DeviceGray") => GrayImage::from_raw(width, height, raw).map(DynamicImage::ImageLuma8),
                _ => None,
            };
            let Some(bitmap) = bitmap else {
                return Ok(None);
            };

            let mut png = Vec::new();
            bitmap.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)?;
            Ok(Some(ImageBlock {
                page,
                data: png,
                format: ImageFormat::Png,
                width,
                height,
            }))
        }
        _ => Ok(None),
    }
}

fn resolve<'a>(document: &'a Document, object: &'a Object) -> &'a Object {
    match object {
        Object::Reference(id) => document.get_object(*id).unwrap_or(object),
        _ => object,
    }
}

fn name_of<'a>(document: &'a Document, dict: &'a Dictionary, key: &[u8]) -> Option<&'a [u8]> {
    let object = dict.get(key).ok()?;
    resolve(document, object).as_name().ok()
}

fn integer_of(document: &Document, dict: &Dictionary, key: &[u8]) -> Option<u32> {
    let object = dict.get(key).ok()?;
    resolve(document, object)
        .as_i64()
        .ok()
        .and_then(|v| u32::try_from(v).ok())
}

fn filter_names(document: &Document, dict: &Dictionary) -> Vec<Vec<u8>> {
    let Ok(filter) = dict.get(b"Filter") else {
        return Vec::new();
    };
    match resolve(document, filter) {
        Object::Name(name) => vec![name.clone()],
        Object::Array(items) => items
            .iter()
            .filter_map(|item| resolve(document, item).as_name().ok())
            .map(<[u8]>::to_vec)
            .collect(),
        _ => Vec::new(),
    }
}
