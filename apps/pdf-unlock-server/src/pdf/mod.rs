//! PDF tools
//!
//! Unlocking, locking and compression are delegated to `qpdf`. Building a
//! PDF from JPEG images is done in-process with `lopdf`.

mod compress;
mod images;
mod security;

pub use compress::{CompressionLevel, PdfCompressor};
pub use images::{images_to_pdf, ImagesToPdfError, Margin, Orientation, PageLayout, PageSize, Placement};
pub use security::{
    classify_exit, unlock_automatically, validate_pdf_bytes, PdfSecurity, PdfSecurityError,
    QpdfSecurity, COMMON_PASSWORDS,
};

/// How far into a file the `%PDF-` marker may appear
pub const HEADER_SEARCH_WINDOW: usize = 1024;

const PDF_MAGIC: &[u8] = b"%PDF-";

/// Whether `bytes` carries a `%PDF-` marker within the first kilobyte
pub fn has_pdf_header(bytes: &[u8]) -> bool {
    let window = &bytes[..bytes.len().min(HEADER_SEARCH_WINDOW)];
    window.windows(PDF_MAGIC.len()).any(|w| w == PDF_MAGIC)
}
