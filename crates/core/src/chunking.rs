use crate::error::ExtractError;
use crate::extractor::PdfDocument;
use crate::models::{Chunk, OutlineEntry};
use sha2::{Digest, Sha256};

/// Collapses every whitespace run (including non-breaking spaces) to a single
/// space and trims both ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split(|c: char| c.is_whitespace() || c == '\u{a0}')
        .filter(|token| !token.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedSection {
    pub title: String,
    pub page: u32,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct ChunkingReport {
    pub chunks: Vec<Chunk>,
    pub skipped: Vec<SkippedSection>,
}

/// Inclusive, 1-indexed page span of outline entry `index`.
pub fn section_span(outline: &[OutlineEntry], index: usize, total_pages: u32) -> (u32, u32) {
    let start = outline[index].page;
    let end = match outline.get(index + 1) {
        Some(next) => next.page.saturating_sub(1),
        None => total_pages,
    };
    (start, end)
}

/// Section Chunker: one chunk per outline entry, or one per page when the
/// outline is empty.
pub fn chunk_document(
    document: &dyn PdfDocument,
    outline: &[OutlineEntry],
    document_name: &str,
) -> ChunkingReport {
    if outline.is_empty() {
        return chunk_by_page(document, document_name);
    }

    let total_pages = document.page_count();
    let mut report = ChunkingReport::default();

    for (index, entry) in outline.iter().enumerate() {
        let (start, end) = section_span(outline, index, total_pages);
        let end = end.min(total_pages);

        match section_text(document, start, end, total_pages) {
            Ok(raw) => {
                let text = normalize_whitespace(&raw);
                if text.is_empty() {
                    continue;
                }

                report.chunks.push(Chunk {
                    chunk_id: make_chunk_id(document_name, start, index, &text),
                    title: entry.title.clone(),
                    text,
                    page: start,
                    page_end: end,
                    document: document_name.to_string(),
                    score: None,
                });
            }
            Err(error) => report.skipped.push(SkippedSection {
                title: entry.title.clone(),
                page: entry.page,
                reason: error.to_string(),
            }),
        }
    }

    report
}

/// Always yields exactly one chunk per page. A page whose text cannot be
/// extracted becomes an empty chunk and is also reported as skipped.
fn chunk_by_page(document: &dyn PdfDocument, document_name: &str) -> ChunkingReport {
    let mut report = ChunkingReport::default();

    for index in 0..document.page_count() {
        let page = index + 1;
        let title = format!("Page {page}");

        let text = match document.page_text(index) {
            Ok(raw) => normalize_whitespace(&raw),
            Err(error) => {
                report.skipped.push(SkippedSection {
                    title: title.clone(),
                    page,
                    reason: error.to_string(),
                });
                String::new()
            }
        };

        report.chunks.push(Chunk {
            chunk_id: make_chunk_id(document_name, page, index as usize, &text),
            title,
            text,
            page,
            page_end: page,
            document: document_name.to_string(),
            score: None,
        });
    }

    report
}

fn section_text(
    document: &dyn PdfDocument,
    start: u32,
    end: u32,
    total_pages: u32,
) -> Result<String, ExtractError> {
    if start == 0 || start > total_pages {
        return Err(ExtractError::PageOutOfRange {
            page: start,
            total: total_pages,
        });
    }

    let mut text = String::new();
    for page in start..=end {
        let page_text = document.page_text(page - 1)?;
        text.push_str(&page_text);
        text.push('\n');
    }

    Ok(text)
}

fn make_chunk_id(document: &str, page: u32, index: usize, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document.as_bytes());
    hasher.update(page.to_le_bytes());
    hasher.update((index as u64).to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
