//! One adapter per external capability. Every adapter verifies its declared
//! output before reporting success.

pub mod images_to_pdf;
pub mod merge;
pub mod office;
pub mod pdf_compress;
pub mod pdf_to_images;

pub use images_to_pdf::images_to_pdf;
pub use merge::merge_pdfs;
pub use office::{OfficeFormat, office_to_pdf, pdf_to_office};
pub use pdf_compress::compress_pdf;
pub use pdf_to_images::pdf_to_images;

use std::path::Path;

/// Content type of a produced file, sniffed from its leading bytes.
pub fn sniff_content_type(path: &Path) -> String {
    infer::get_from_path(path)
        .ok()
        .flatten()
        .map(|kind| kind.mime_type().to_string())
        .unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.to_string())
}

/// Page count of a PDF on disk, loaded with lopdf.
pub fn pdf_page_count(path: &Path) -> Result<usize, lopdf::Error> {
    Ok(lopdf::Document::load(path)?.get_pages().len())
}
