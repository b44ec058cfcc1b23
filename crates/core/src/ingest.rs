use crate::chunking::{chunk_document, ChunkingReport};
use crate::error::{ExtractError, RunError};
use crate::extractor::{open_document, read_outline, PdfDocument};
use crate::models::{Chunk, RunInput};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// PDFs directly inside `folder` (extension matched case-insensitively), sorted.
pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

/// Reads and validates the run manifest.
pub fn load_run_input(path: &Path) -> Result<RunInput, RunError> {
    if !path.is_file() {
        return Err(RunError::MissingInput(path.to_path_buf()));
    }

    let raw = fs::read_to_string(path)?;
    let input: RunInput = serde_json::from_str(&raw)?;

    if input.task().trim().is_empty() {
        return Err(RunError::InvalidInput(
            "job_to_be_done.task is empty".to_string(),
        ));
    }

    Ok(input)
}

#[derive(Debug)]
pub enum DocumentOutcome {
    Chunked {
        filename: String,
        report: ChunkingReport,
    },
    Skipped {
        filename: String,
        reason: String,
    },
}

/// Opens one PDF and chunks it by its outline.
pub fn chunk_pdf(path: &Path, filename: &str) -> Result<ChunkingReport, ExtractError> {
    let document = open_document(path)?;
    if document.page_count() == 0 {
        return Err(ExtractError::PdfParse(format!(
            "pdf has no pages: {}",
            path.display()
        )));
    }

    let outline = read_outline(&document);
    Ok(chunk_document(&document, &outline, filename))
}

#[derive(Debug, Default)]
pub struct CorpusReport {
    pub outcomes: Vec<DocumentOutcome>,
}

impl CorpusReport {
    /// All chunks in manifest order, then outline order.
    pub fn into_chunks(self) -> Vec<Chunk> {
        self.outcomes
            .into_iter()
            .flat_map(|outcome| match outcome {
                DocumentOutcome::Chunked { report, .. } => report.chunks,
                DocumentOutcome::Skipped { .. } => Vec::new(),
            })
            .collect()
    }

    pub fn chunk_count(&self) -> usize {
        self.outcomes
            .iter()
            .map(|outcome| match outcome {
                DocumentOutcome::Chunked { report, .. } => report.chunks.len(),
                DocumentOutcome::Skipped { .. } => 0,
            })
            .sum()
    }

    pub fn skipped_documents(&self) -> impl Iterator<Item = (&str, &str)> {
        self.outcomes.iter().filter_map(|outcome| match outcome {
            DocumentOutcome::Skipped { filename, reason } => {
                Some((filename.as_str(), reason.as_str()))
            }
            DocumentOutcome::Chunked { .. } => None,
        })
    }
}

/// Chunks every manifest document found under `documents_dir`, in manifest
/// order. Missing or unreadable documents become `Skipped` outcomes.
pub fn collect_chunks(input: &RunInput, documents_dir: &Path) -> CorpusReport {
    let outcomes = input
        .documents
        .iter()
        .map(|document| {
            let filename = document.filename.clone();
            let path = documents_dir.join(&document.filename);

            match chunk_pdf(&path, &filename) {
                Ok(report) => DocumentOutcome::Chunked { filename, report },
                Err(error) => DocumentOutcome::Skipped {
                    filename,
                    reason: error.to_string(),
                },
            }
        })
        .collect();

    CorpusReport { outcomes }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocumentRef, JobToBeDone, Persona};
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn discover_pdf_files_is_flat_and_sorted() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let base = dir.path();
        let nested = base.join("nested");
        fs::create_dir(&nested)?;

        File::create(base.join("b.PDF")).and_then(|mut file| file.write_all(b"%PDF-1.4\n%fake"))?;
        File::create(base.join("a.pdf")).and_then(|mut file| file.write_all(b"%PDF-1.4\n%fake"))?;
        File::create(base.join("notes.txt"))?;
        File::create(nested.join("c.pdf"))?;

        let files = discover_pdf_files(base);
        let names = files
            .iter()
            .filter_map(|path| path.file_name().and_then(|name| name.to_str()))
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["a.pdf", "b.PDF"]);
        Ok(())
    }

    #[test]
    fn missing_manifest_is_fatal() {
        let result = load_run_input(Path::new("/nonexistent/challenge1b_input.json"));
        assert!(matches!(result, Err(RunError::MissingInput(_))));
    }

    #[test]
    fn blank_task_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("input.json");
        fs::write(
            &path,
            r#"{"persona":{"role":"Analyst"},"job_to_be_done":{"task":"  "},"documents":[]}"#,
        )?;

        assert!(matches!(
            load_run_input(&path),
            Err(RunError::InvalidInput(_))
        ));
        Ok(())
    }

    #[test]
    fn missing_and_unreadable_documents_are_skipped() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("broken.pdf"), b"this is not a pdf")?;

        let input = RunInput {
            challenge_info: None,
            persona: Persona {
                role: "Analyst".to_string(),
            },
            job_to_be_done: JobToBeDone {
                task: "find revenue figures".to_string(),
            },
            documents: vec![
                DocumentRef {
                    filename: "absent.pdf".to_string(),
                    title: None,
                },
                DocumentRef {
                    filename: "broken.pdf".to_string(),
                    title: None,
                },
            ],
        };

        let report = collect_chunks(&input, dir.path());

        assert_eq!(report.chunk_count(), 0);
        let skipped = report
            .skipped_documents()
            .map(|(filename, _)| filename)
            .collect::<Vec<_>>();
        assert_eq!(skipped, vec!["absent.pdf", "broken.pdf"]);
        assert!(report.into_chunks().is_empty());
        Ok(())
    }
}
