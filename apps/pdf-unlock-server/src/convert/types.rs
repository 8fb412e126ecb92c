//! Conversion types
//!
//! Content blocks flow from an extractor through the chunker into a slide
//! deck, which an assembler turns into presentation bytes.

use serde::{Deserialize, Serialize};

/// Encoding of an extracted image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Png => "png",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
        }
    }
}

/// An image lifted out of a source page
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBlock {
    /// Page number (1-indexed)
    pub page: u32,
    pub data: Vec<u8>,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContentBlock {
    Paragraph { page: u32, text: String },
    Image(ImageBlock),
}

impl ContentBlock {
    pub fn page(&self) -> u32 {
        match self {
            ContentBlock::Paragraph { page, .. } => *page,
            ContentBlock::Image(image) => image.page,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, ContentBlock::Paragraph { .. })
    }
}

/// Everything an extractor found in a source document
#[derive(Debug, Clone, Default)]
pub struct ExtractedDocument {
    pub page_count: u32,
    /// Blocks in reading order, grouped by page
    pub blocks: Vec<ContentBlock>,
}

impl ExtractedDocument {
    pub fn text_block_count(&self) -> usize {
        self.blocks.iter().filter(|b| b.is_text()).count()
    }

    pub fn image_count(&self) -> usize {
        self.blocks.len() - self.text_block_count()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Slide {
    pub title: String,
    pub blocks: Vec<ContentBlock>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlideDeck {
    pub title: String,
    pub slides: Vec<Slide>,
}

/// Readability limits applied when laying content out on slides
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChunkingOptions {
    pub max_blocks_per_slide: usize,
    pub max_chars_per_block: usize,
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            max_blocks_per_slide: 6,
            max_chars_per_block: 400,
        }
    }
}

/// A single conversion job
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    /// Local path, stored PDF id, or `http(s)://` URL
    pub source_path: String,
    /// Title for the output; the source's file stem when absent
    pub output_name: Option<String>,
    pub include_images: bool,
}
