use async_trait::async_trait;
use docx_rs::{read_docx, BreakType, DocumentChild, ParagraphChild, RunChild};
use tokio::task::spawn_blocking;

use crate::types::{AppError, Result};

use super::{ExtractedDocument, TextExtractor};

/// `docx-rs`-backed extractor. OOXML has no fixed pagination, so "pages"
/// here are delimited by explicit page-break runs; a document with none
/// comes back as a single page. Core-properties metadata (author,
/// creation date) isn't exposed by `docx-rs`'s reader, so both fields are
/// always `None`.
pub struct DocxExtractor;

#[async_trait]
impl TextExtractor for DocxExtractor {
    async fn extract(&self, bytes: &[u8]) -> Result<ExtractedDocument> {
        let bytes = bytes.to_vec();
        let pages = spawn_blocking(move || extract_pages(&bytes))
            .await
            .map_err(|e| AppError::Internal(format!("DOCX extraction task panicked: {e}")))??;

        if pages.is_empty() {
            return Err(AppError::Permanent(
                "DOCX contains no extractable text".to_string(),
            ));
        }

        Ok(ExtractedDocument {
            pages,
            author: None,
            creation_date: None,
        })
    }
}

fn extract_pages(bytes: &[u8]) -> Result<Vec<String>> {
    let docx = read_docx(bytes)
        .map_err(|e| AppError::Permanent(format!("failed to parse DOCX: {e:?}")))?;

    let mut pages = Vec::new();
    let mut current = String::new();

    for child in &docx.document.children {
        if let DocumentChild::Paragraph(paragraph) = child {
            for run_child in &paragraph.children {
                if let ParagraphChild::Run(run) = run_child {
                    for part in &run.children {
                        match part {
                            RunChild::Text(text) => current.push_str(&text.text),
                            RunChild::Break(br) if br.break_type == BreakType::Page => {
                                let page = current.trim().to_string();
                                if !page.is_empty() {
                                    pages.push(page);
                                }
                                current.clear();
                            }
                            _ => {}
                        }
                    }
                }
            }
            current.push('\n');
        }
    }

    let trailing = current.trim().to_string();
    if !trailing.is_empty() {
        pages.push(trailing);
    }

    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_garbage_bytes() {
        let extractor = DocxExtractor;
        let err = extractor.extract(b"not a docx").await;
        assert!(matches!(err, Err(AppError::Permanent(_))));
    }
}
