use crate::error::ExtractError;
use crate::models::OutlineEntry;
use crate::outline::OutlineWalker;
use lopdf::{Document, Object, ObjectId};
use std::collections::HashMap;
use std::path::Path;

/// Read access to a parsed PDF. Page indices are 0-based.
pub trait PdfDocument {
    fn page_count(&self) -> u32;

    fn page_text(&self, index: u32) -> Result<String, ExtractError>;

    /// Table of contents in reading order, empty when the document has none.
    fn outline(&self) -> Vec<OutlineEntry>;

    /// The `Title` entry of the document information dictionary, if present.
    fn title(&self) -> Option<String>;
}

pub struct LopdfDocument {
    document: Document,
    page_numbers: Vec<u32>,
    page_ids: HashMap<ObjectId, u32>,
}

impl LopdfDocument {
    pub fn open(path: &Path) -> Result<Self, ExtractError> {
        if !path.is_file() {
            return Err(ExtractError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} not found", path.display()),
            )));
        }

        let document =
            Document::load(path).map_err(|error| ExtractError::PdfParse(error.to_string()))?;
        Ok(Self::from_document(document))
    }

    pub fn from_document(document: Document) -> Self {
        let pages = document.get_pages();
        let page_numbers = pages.keys().copied().collect();
        let page_ids = pages
            .values()
            .zip(1u32..)
            .map(|(id, position)| (*id, position))
            .collect();

        Self {
            document,
            page_numbers,
            page_ids,
        }
    }
}

impl PdfDocument for LopdfDocument {
    fn page_count(&self) -> u32 {
        self.page_numbers.len() as u32
    }

    fn page_text(&self, index: u32) -> Result<String, ExtractError> {
        let page_no = self
            .page_numbers
            .get(index as usize)
            .copied()
            .ok_or(ExtractError::PageOutOfRange {
                page: index + 1,
                total: self.page_count(),
            })?;

        self.document
            .extract_text(&[page_no])
            .map_err(|error| ExtractError::PdfParse(error.to_string()))
    }

    fn outline(&self) -> Vec<OutlineEntry> {
        OutlineWalker::new(&self.document, &self.page_ids).walk()
    }

    fn title(&self) -> Option<String> {
        let info = match self.document.trailer.get(b"Info").ok()? {
            Object::Reference(id) => self.document.get_dictionary(*id).ok()?,
            Object::Dictionary(dictionary) => dictionary,
            _ => return None,
        };

        let raw = match info.get(b"Title").ok()? {
            Object::Reference(id) => self.document.get_object(*id).ok()?.as_str().ok()?,
            other => other.as_str().ok()?,
        };

        let title = decode_text_string(raw);
        let title = title.trim();
        if title.is_empty() {
            None
        } else {
            Some(title.to_string())
        }
    }
}

/// Decodes a PDF text string: UTF-16BE when it carries a byte order mark,
/// otherwise treated as single-byte (PDFDocEncoding agrees with Latin-1 on
/// printable characters).
pub fn decode_text_string(raw: &[u8]) -> String {
    if raw.len() >= 2 && raw[0] == 0xFE && raw[1] == 0xFF {
        let units = raw[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect::<Vec<_>>();
        return String::from_utf16_lossy(&units);
    }

    if let Some(stripped) = raw.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8_lossy(stripped).into_owned();
    }

    raw.iter().map(|&byte| byte as char).collect()
}

pub fn open_document(path: &Path) -> Result<LopdfDocument, ExtractError> {
    LopdfDocument::open(path)
}

/// Outline Reader: a missing outline is an empty list, not an error.
pub fn read_outline(document: &dyn PdfDocument) -> Vec<OutlineEntry> {
    document.outline()
}

/// Title metadata with the file stem as fallback.
pub fn document_title(document: &dyn PdfDocument, path: &Path) -> Result<String, ExtractError> {
    if let Some(title) = document.title() {
        return Ok(title);
    }

    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
        .ok_or_else(|| ExtractError::MissingFileName(path.display().to_string()))
}
