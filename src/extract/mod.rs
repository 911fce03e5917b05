//! `TextExtractor` — bytes-to-pages adapter contract (spec.md §4.1), plus
//! the Extraction Factory that maps a detected MIME type to one.
//!
//! Grounded on `other_examples/38e16a33_ansonTGN-NexusRAG__src-ingest.rs.rs`'s
//! extension/MIME dispatch (`pdf_extract::extract_text`), generalized to
//! magic-byte detection via `infer` instead of file-extension sniffing —
//! an upload's filename is untrusted, its bytes are not.

mod docx;
mod pdf;

pub use docx::DocxExtractor;
pub use pdf::PdfExtractor;

use async_trait::async_trait;

use crate::types::{AppError, Result};

/// Per-page text plus whatever document metadata the format exposes.
#[derive(Debug, Clone, Default)]
pub struct ExtractedDocument {
    pub pages: Vec<String>,
    pub author: Option<String>,
    pub creation_date: Option<String>,
}

impl ExtractedDocument {
    pub fn page_count(&self) -> i64 {
        self.pages.len() as i64
    }
}

#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, bytes: &[u8]) -> Result<ExtractedDocument>;
}

/// Supported MIME types, detected from magic bytes (spec.md §4.2 step 2).
pub const SUPPORTED_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
];

/// Detects the MIME type of `bytes` and returns `(mime_type, extractor)`,
/// or `AppError::UnsupportedMedia` if the type isn't one of
/// [`SUPPORTED_MIME_TYPES`].
pub fn detect(bytes: &[u8]) -> Result<(&'static str, Box<dyn TextExtractor>)> {
    let detected = infer::get(bytes).map(|k| k.mime_type());
    match detected {
        Some("application/pdf") => Ok(("application/pdf", Box::new(PdfExtractor))),
        Some("application/vnd.openxmlformats-officedocument.wordprocessingml.document") => Ok((
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            Box::new(DocxExtractor),
        )),
        Some("application/zip") if looks_like_docx(bytes) => Ok((
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            Box::new(DocxExtractor),
        )),
        other => Err(AppError::UnsupportedMedia(format!(
            "unsupported media type: {}",
            other.unwrap_or("unknown")
        ))),
    }
}

/// `infer` reports DOCX as generic `application/zip` unless it recognizes
/// the OOXML signature; disambiguate by checking for the `word/` entry
/// that every DOCX package contains, without pulling in a zip-listing
/// dependency just for this check.
fn looks_like_docx(bytes: &[u8]) -> bool {
    let needle = b"word/";
    bytes
        .windows(needle.len())
        .any(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unrecognized_bytes() {
        let err = detect(b"not a document");
        assert!(matches!(err, Err(AppError::UnsupportedMedia(_))));
    }
}
