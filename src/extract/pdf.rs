use async_trait::async_trait;
use tokio::task::spawn_blocking;

use crate::types::{AppError, Result};

use super::{ExtractedDocument, TextExtractor};

/// `pdf-extract`-backed extractor. `pdf-extract` has no public metadata
/// accessor, so `author`/`creation_date` are always `None` here; the
/// document record simply carries those fields as unset for PDFs.
pub struct PdfExtractor;

#[async_trait]
impl TextExtractor for PdfExtractor {
    async fn extract(&self, bytes: &[u8]) -> Result<ExtractedDocument> {
        let bytes = bytes.to_vec();
        let text = spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
            .await
            .map_err(|e| AppError::Internal(format!("PDF extraction task panicked: {e}")))?
            .map_err(|e| AppError::Permanent(format!("failed to extract PDF text: {e}")))?;

        // pdf-extract separates pages with form-feed characters.
        let pages: Vec<String> = text
            .split('\u{c}')
            .map(|page| page.trim().to_string())
            .filter(|page| !page.is_empty())
            .collect();

        if pages.is_empty() {
            return Err(AppError::Permanent(
                "PDF contains no extractable text".to_string(),
            ));
        }

        Ok(ExtractedDocument {
            pages,
            author: None,
            creation_date: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_garbage_bytes() {
        let extractor = PdfExtractor;
        let err = extractor.extract(b"not a pdf").await;
        assert!(matches!(err, Err(AppError::Permanent(_))));
    }
}
