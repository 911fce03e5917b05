//! Chunker — splits per-page text into overlapping segments for embedding
//! (spec.md §4.1, §4.2 step 4).
//!
//! Grounded on `rag/chunker.rs`'s `text_splitter` usage (`TextSplitter`,
//! `splitter.chunks(text)`, offset-recovery-by-search), trimmed from three
//! interchangeable strategies down to the one the spec calls for: a
//! recursive character splitter with configurable overlap, tracking which
//! source page(s) each chunk came from.

use text_splitter::{ChunkConfig, TextSplitter};
use uuid::Uuid;

const SNIPPET_CHARS: usize = 200;

/// One chunk ready to be embedded and upserted.
#[derive(Debug, Clone)]
pub struct DocumentChunk {
    pub document_id: Uuid,
    pub workspace_id: Uuid,
    pub document_name: String,
    pub chunk_index: usize,
    pub content: String,
    pub page_start: i64,
    pub page_end: i64,
    pub snippet: String,
}

pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Chunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
        }
    }

    /// Splits `pages` (1-indexed by position) into overlapping chunks,
    /// each carrying the page range it was drawn from.
    pub fn chunk_pages(
        &self,
        workspace_id: Uuid,
        document_id: Uuid,
        document_name: &str,
        pages: &[String],
    ) -> Vec<DocumentChunk> {
        if pages.is_empty() {
            return Vec::new();
        }

        const SEPARATOR: &str = "\n\n";
        let mut concatenated = String::new();
        let mut page_ranges: Vec<(usize, usize)> = Vec::with_capacity(pages.len());
        for page in pages {
            let start = concatenated.len();
            concatenated.push_str(page);
            let end = concatenated.len();
            page_ranges.push((start, end));
            concatenated.push_str(SEPARATOR);
        }

        let config = match ChunkConfig::new(self.chunk_size).with_overlap(self.chunk_overlap) {
            Ok(config) => config,
            Err(_) => ChunkConfig::new(self.chunk_size),
        };
        let splitter = TextSplitter::new(config);

        let mut chunks = Vec::new();
        let mut cursor = 0usize;
        for (index, chunk_text) in splitter.chunks(&concatenated).enumerate() {
            let start = concatenated[cursor..]
                .find(chunk_text)
                .map(|pos| cursor + pos)
                .unwrap_or(cursor);
            let end = start + chunk_text.len();
            cursor = start;

            let page_start = page_for_offset(&page_ranges, start);
            let page_end = page_for_offset(&page_ranges, end.saturating_sub(1).max(start));
            let snippet: String = chunk_text.chars().take(SNIPPET_CHARS).collect();

            chunks.push(DocumentChunk {
                document_id,
                workspace_id,
                document_name: document_name.to_string(),
                chunk_index: index,
                content: chunk_text.to_string(),
                page_start: page_start as i64,
                page_end: page_end as i64,
                snippet,
            });
        }
        chunks
    }
}

/// Returns the 1-based page number containing `offset`, clamped to the
/// nearest page if the offset falls in a separator gap.
fn page_for_offset(page_ranges: &[(usize, usize)], offset: usize) -> usize {
    for (i, (start, end)) in page_ranges.iter().enumerate() {
        if offset >= *start && offset < *end {
            return i + 1;
        }
    }
    page_ranges
        .iter()
        .position(|(start, _)| offset < *start)
        .map(|i| i + 1)
        .unwrap_or(page_ranges.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_single_page_and_tracks_range() {
        let chunker = Chunker::new(50, 10);
        let pages = vec!["alpha ".repeat(30)];
        let chunks = chunker.chunk_pages(Uuid::new_v4(), Uuid::new_v4(), "doc.pdf", &pages);
        assert!(!chunks.is_empty());
        for c in &chunks {
            assert_eq!(c.page_start, 1);
            assert_eq!(c.page_end, 1);
        }
    }

    #[test]
    fn chunk_ids_are_sequential() {
        let chunker = Chunker::new(1000, 150);
        let pages = vec!["alpha\n".to_string(), "beta\n".to_string(), "gamma\n".to_string()];
        let chunks = chunker.chunk_pages(Uuid::new_v4(), Uuid::new_v4(), "doc.pdf", &pages);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i);
        }
    }

    #[test]
    fn empty_pages_yields_no_chunks() {
        let chunker = Chunker::new(1000, 150);
        let chunks = chunker.chunk_pages(Uuid::new_v4(), Uuid::new_v4(), "doc.pdf", &[]);
        assert!(chunks.is_empty());
    }

    #[test]
    fn snippet_is_truncated_to_cap() {
        let chunker = Chunker::new(5000, 0);
        let pages = vec!["word ".repeat(1000)];
        let chunks = chunker.chunk_pages(Uuid::new_v4(), Uuid::new_v4(), "doc.pdf", &pages);
        assert!(chunks[0].snippet.chars().count() <= SNIPPET_CHARS);
    }
}
