use crate::embeddings::{embed_corpus, Embedder};
use crate::error::{OutlineError, RankError, RunError};
use crate::extractor::{document_title, open_document, read_outline};
use crate::ingest::{collect_chunks, discover_pdf_files, load_run_input, DocumentOutcome};
use crate::models::{RankingOptions, RunOutput};
use crate::ranking::{rank_chunks, score_chunks};
use crate::report::{build_outline_document, build_run_output, write_json};
use chrono::Utc;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

pub const MANIFEST_FILE_NAME: &str = "challenge1b_input.json";
pub const DOCUMENTS_DIR_NAME: &str = "PDFs";
pub const RANK_OUTPUT_FILE_NAME: &str = "challenge1b_output.json";

const RANK_OUTPUT_INDENT: usize = 4;
const OUTLINE_OUTPUT_INDENT: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Per-PDF outline extraction.
    Outline,
    /// Task-driven section ranking over a manifest.
    Rank,
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "1a" | "outline" => Ok(Self::Outline),
            "1b" | "rank" => Ok(Self::Rank),
            other => Err(format!("invalid mode {other:?}: use 1a/outline or 1b/rank")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub manifest_path: PathBuf,
    pub documents_dir: PathBuf,
    pub ranking: RankingOptions,
}

impl RunConfig {
    /// Manifest and documents directory at their default locations under `input_dir`.
    pub fn new(input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        let input_dir = input_dir.into();
        Self {
            manifest_path: input_dir.join(MANIFEST_FILE_NAME),
            documents_dir: input_dir.join(DOCUMENTS_DIR_NAME),
            output_dir: output_dir.into(),
            input_dir,
            ranking: RankingOptions::default(),
        }
    }

    pub fn rank_output_path(&self) -> PathBuf {
        self.output_dir.join(RANK_OUTPUT_FILE_NAME)
    }
}

#[derive(Debug)]
pub struct FailedPdf {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct OutlineRunReport {
    pub written: Vec<PathBuf>,
    pub failed: Vec<FailedPdf>,
}

#[derive(Debug)]
pub struct RankRunReport {
    pub output_path: PathBuf,
    pub output: RunOutput,
    pub summary: RankSummary,
}

#[derive(Debug, Default)]
pub struct RankSummary {
    pub chunk_count: usize,
    pub skipped_documents: Vec<(String, String)>,
    pub skipped_sections: usize,
}

#[derive(Debug)]
pub enum RunReport {
    Outline(OutlineRunReport),
    Rank(RankRunReport),
}

/// A pipeline variant resolved once at startup.
pub enum Pipeline {
    Outline(OutlinePipeline),
    Rank(RankPipeline),
}

impl Pipeline {
    pub fn run(&self) -> Result<RunReport, RunError> {
        match self {
            Self::Outline(pipeline) => pipeline.run().map(RunReport::Outline),
            Self::Rank(pipeline) => pipeline.run().map(RunReport::Rank),
        }
    }

    pub fn mode(&self) -> Mode {
        match self {
            Self::Outline(_) => Mode::Outline,
            Self::Rank(_) => Mode::Rank,
        }
    }
}

pub struct OutlinePipeline {
    config: RunConfig,
}

impl OutlinePipeline {
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    pub fn run(&self) -> Result<OutlineRunReport, RunError> {
        let files = discover_pdf_files(&self.config.input_dir);
        if files.is_empty() {
            return Err(RunError::NoPdfFiles(self.config.input_dir.clone()));
        }

        fs::create_dir_all(&self.config.output_dir)?;

        let mut report = OutlineRunReport::default();
        let mut used_names = HashSet::new();

        for path in files {
            let target = self.config.output_dir.join(output_file_name(&path, &mut used_names));

            match extract_outline(&path, &target) {
                Ok(()) => {
                    info!(pdf = %path.display(), output = %target.display(), "outline written");
                    report.written.push(target);
                }
                Err(error) => {
                    warn!(pdf = %path.display(), %error, "outline extraction failed");
                    report.failed.push(FailedPdf {
                        path,
                        reason: error.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }
}

fn extract_outline(path: &Path, target: &Path) -> Result<(), OutlineError> {
    let document = open_document(path)?;
    let title = document_title(&document, path)?;
    let outline = read_outline(&document);
    let structured = build_outline_document(title, &outline);

    let mut writer = BufWriter::new(File::create(target)?);
    write_json(&mut writer, &structured, OUTLINE_OUTPUT_INDENT)?;
    writer.flush()?;
    Ok(())
}

/// `<stem>.json`, or `<file name>.json` when another input already claimed the stem.
fn output_file_name(path: &Path, used: &mut HashSet<String>) -> String {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();

    let name = if used.insert(stem.clone()) {
        stem
    } else {
        let full = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        used.insert(full.clone());
        full
    };

    format!("{name}.json")
}

pub struct RankPipeline {
    config: RunConfig,
    embedder: Box<dyn Embedder>,
}

impl RankPipeline {
    pub fn new(config: RunConfig, embedder: Box<dyn Embedder>) -> Self {
        Self { config, embedder }
    }

    /// Ranks and formats without touching the output directory.
    pub fn rank(&self) -> Result<(RunOutput, RankSummary), RunError> {
        let input = load_run_input(&self.config.manifest_path)?;
        let corpus = collect_chunks(&input, &self.config.documents_dir);

        let mut summary = RankSummary {
            chunk_count: corpus.chunk_count(),
            skipped_documents: corpus
                .skipped_documents()
                .map(|(filename, reason)| (filename.to_string(), reason.to_string()))
                .collect(),
            skipped_sections: 0,
        };

        for outcome in &corpus.outcomes {
            match outcome {
                DocumentOutcome::Chunked { filename, report } => {
                    info!(
                        document = %filename,
                        chunk_count = report.chunks.len(),
                        "document chunked"
                    );
                    for section in &report.skipped {
                        warn!(
                            document = %filename,
                            section = %section.title,
                            page = section.page,
                            reason = %section.reason,
                            "skipped section"
                        );
                    }
                    summary.skipped_sections += report.skipped.len();
                }
                DocumentOutcome::Skipped { filename, reason } => {
                    warn!(document = %filename, reason = %reason, "skipped document");
                }
            }
        }

        if summary.chunk_count == 0 {
            return Err(RunError::NoChunks);
        }
        let mut chunks = corpus.into_chunks();

        info!(chunk_count = summary.chunk_count, "embedding task and chunks");
        let task_vector = self.embedder.embed(input.task())?;
        if task_vector.len() != self.embedder.dimensions() {
            return Err(RankError::DimensionMismatch {
                expected: self.embedder.dimensions(),
                actual: task_vector.len(),
            }
            .into());
        }

        let texts = chunks
            .iter()
            .map(|chunk| chunk.text.as_str())
            .collect::<Vec<_>>();
        let vectors = embed_corpus(
            self.embedder.as_ref(),
            &texts,
            self.config.ranking.batch_size,
        )?;

        score_chunks(&task_vector, &mut chunks, &vectors)?;
        let ranked = rank_chunks(chunks, self.config.ranking.top_k);
        for entry in &ranked {
            debug!(
                rank = entry.rank,
                chunk_id = %entry.chunk.chunk_id,
                document = %entry.chunk.document,
                score = entry.chunk.score,
                "ranked section"
            );
        }

        Ok((build_run_output(&input, &ranked, Utc::now()), summary))
    }

    pub fn run(&self) -> Result<RankRunReport, RunError> {
        let (output, summary) = self.rank()?;

        fs::create_dir_all(&self.config.output_dir)?;
        let output_path = self.config.rank_output_path();
        let mut writer = BufWriter::new(File::create(&output_path)?);
        write_json(&mut writer, &output, RANK_OUTPUT_INDENT)?;
        writer.flush()?;

        Ok(RankRunReport {
            output_path,
            output,
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::error::EmbedError;
    use crate::extractor::testing::{attach_outline, node, pdf_with_pages, single_page_pdf};
    use crate::models::{OutlineDocument, OutlineItem, RunOutput};
    use tempfile::tempdir;

    const ANALYST_MANIFEST: &str = r#"{
        "persona": {"role": "Analyst"},
        "job_to_be_done": {"task": "revenue growth and net income"},
        "documents": [{"filename": "report.pdf"}]
    }"#;

    /// Reports a width that its vectors do not have.
    struct MisreportedWidth(CharacterNgramEmbedder);

    impl Embedder for MisreportedWidth {
        fn dimensions(&self) -> usize {
            self.0.dimensions + 1
        }

        fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
            self.0.embed(text)
        }
    }

    fn write_rank_input(
        root: &Path,
        mut pdf: lopdf::Document,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let documents_dir = root.join(DOCUMENTS_DIR_NAME);
        fs::create_dir_all(&documents_dir)?;
        pdf.save(documents_dir.join("report.pdf"))?;
        fs::write(root.join(MANIFEST_FILE_NAME), ANALYST_MANIFEST)?;
        Ok(())
    }

    #[test]
    fn modes_parse_from_challenge_names() {
        assert_eq!("1a".parse::<Mode>(), Ok(Mode::Outline));
        assert_eq!(" 1B ".parse::<Mode>(), Ok(Mode::Rank));
        assert_eq!("rank".parse::<Mode>(), Ok(Mode::Rank));
        assert!("2c".parse::<Mode>().is_err());
    }

    #[test]
    fn config_defaults_follow_input_layout() {
        let config = RunConfig::new("/app/input", "/app/output");

        assert_eq!(
            config.manifest_path,
            PathBuf::from("/app/input/challenge1b_input.json")
        );
        assert_eq!(config.documents_dir, PathBuf::from("/app/input/PDFs"));
        assert_eq!(
            config.rank_output_path(),
            PathBuf::from("/app/output/challenge1b_output.json")
        );
        assert_eq!(config.ranking.top_k, 5);
        assert_eq!(config.ranking.batch_size, 32);
    }

    #[test]
    fn colliding_stems_get_distinct_output_names() {
        let mut used = HashSet::new();

        assert_eq!(output_file_name(Path::new("/in/a.pdf"), &mut used), "a.json");
        assert_eq!(output_file_name(Path::new("/in/a.PDF"), &mut used), "a.PDF.json");
        assert_eq!(output_file_name(Path::new("/in/b.pdf"), &mut used), "b.json");
    }

    #[test]
    fn rank_run_without_manifest_is_fatal() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let pipeline = Pipeline::Rank(RankPipeline::new(
            RunConfig::new(dir.path(), dir.path().join("out")),
            Box::new(CharacterNgramEmbedder::default()),
        ));

        assert_eq!(pipeline.mode(), Mode::Rank);
        assert!(matches!(pipeline.run(), Err(RunError::MissingInput(_))));
        assert!(!dir.path().join("out").exists());
        Ok(())
    }

    #[test]
    fn rank_run_without_chunks_is_fatal() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(
            dir.path().join(MANIFEST_FILE_NAME),
            r#"{
                "persona": {"role": "Analyst"},
                "job_to_be_done": {"task": "find revenue figures"},
                "documents": [{"filename": "missing.pdf"}]
            }"#,
        )?;
        let pipeline = RankPipeline::new(
            RunConfig::new(dir.path(), dir.path().join("out")),
            Box::new(CharacterNgramEmbedder::default()),
        );

        assert!(matches!(pipeline.run(), Err(RunError::NoChunks)));
        Ok(())
    }

    #[test]
    fn outline_run_without_pdfs_is_fatal() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let pipeline = Pipeline::Outline(OutlinePipeline::new(RunConfig::new(
            dir.path(),
            dir.path().join("out"),
        )));

        assert!(matches!(pipeline.run(), Err(RunError::NoPdfFiles(_))));
        Ok(())
    }

    #[test]
    fn outline_run_records_unreadable_pdfs() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("broken.pdf"), b"this is not a pdf")?;
        let pipeline = OutlinePipeline::new(RunConfig::new(dir.path(), dir.path().join("out")));

        let report = pipeline.run()?;

        assert!(report.written.is_empty());
        assert_eq!(report.failed.len(), 1);
        assert!(dir.path().join("out").is_dir());
        Ok(())
    }

    #[test]
    fn outline_run_writes_one_file_per_pdf() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        single_page_pdf("Hello").save(dir.path().join("field-notes.pdf"))?;
        let output_dir = dir.path().join("out");

        let report = OutlinePipeline::new(RunConfig::new(dir.path(), &output_dir)).run()?;

        assert_eq!(report.written, vec![output_dir.join("field-notes.json")]);
        let written: OutlineDocument =
            serde_json::from_str(&fs::read_to_string(&report.written[0])?)?;
        assert_eq!(written.title, "field-notes");
        assert!(written.outline.is_empty());
        Ok(())
    }

    #[test]
    fn rank_run_writes_ranked_sections() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let documents_dir = dir.path().join(DOCUMENTS_DIR_NAME);
        fs::create_dir(&documents_dir)?;
        single_page_pdf("Revenue figures").save(documents_dir.join("report.pdf"))?;
        fs::write(
            dir.path().join(MANIFEST_FILE_NAME),
            r#"{
                "persona": {"role": "Analyst"},
                "job_to_be_done": {"task": "find revenue figures"},
                "documents": [{"filename": "report.pdf"}, {"filename": "missing.pdf"}]
            }"#,
        )?;
        let config = RunConfig::new(dir.path(), dir.path().join("out"));
        let pipeline = Pipeline::Rank(RankPipeline::new(
            config.clone(),
            Box::new(CharacterNgramEmbedder::default()),
        ));

        let report = match pipeline.run()? {
            RunReport::Rank(report) => report,
            RunReport::Outline(_) => panic!("rank pipeline produced an outline report"),
        };

        assert_eq!(report.output_path, config.rank_output_path());
        assert_eq!(report.summary.chunk_count, 1);
        assert_eq!(report.summary.skipped_documents.len(), 1);
        assert_eq!(report.summary.skipped_documents[0].0, "missing.pdf");

        let written: RunOutput = serde_json::from_str(&fs::read_to_string(&report.output_path)?)?;
        assert_eq!(written, report.output);
        assert_eq!(
            written.metadata.input_documents,
            vec!["report.pdf".to_string(), "missing.pdf".to_string()]
        );
        assert_eq!(written.extracted_sections.len(), 1);
        assert_eq!(written.subsection_analysis.len(), 1);
        assert_eq!(written.extracted_sections[0].section_title, "Page 1");
        assert_eq!(written.extracted_sections[0].importance_rank, 1);
        assert_eq!(written.extracted_sections[0].page_number, 1);
        Ok(())
    }

    #[test]
    fn rank_run_ranks_outline_sections() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let (mut pdf, pages) = pdf_with_pages(&[
            "Welcome to the annual report",
            "Scope and method of this review",
            "Revenue grew twelve percent",
            "Revenue by region",
            "Net income and revenue outlook",
        ]);
        attach_outline(&mut pdf, &pages, &[node("Intro", 1), node("Financials", 3)]);
        write_rank_input(dir.path(), pdf)?;
        let pipeline = RankPipeline::new(
            RunConfig::new(dir.path(), dir.path().join("out")),
            Box::new(CharacterNgramEmbedder::default()),
        );

        let report = pipeline.run()?;

        assert_eq!(report.summary.chunk_count, 2);
        assert_eq!(report.summary.skipped_sections, 0);
        let sections = report
            .output
            .extracted_sections
            .iter()
            .map(|section| {
                (
                    section.section_title.as_str(),
                    section.importance_rank,
                    section.page_number,
                )
            })
            .collect::<Vec<_>>();
        assert_eq!(sections, vec![("Financials", 1, 3), ("Intro", 2, 1)]);
        assert_eq!(
            report.output.subsection_analysis[0].refined_text,
            "Revenue grew twelve percent Revenue by region Net income and revenue outlook"
        );
        assert_eq!(
            report.output.subsection_analysis[1].refined_text,
            "Welcome to the annual report Scope and method of this review"
        );
        Ok(())
    }

    #[test]
    fn rank_run_rejects_vectors_of_the_wrong_width() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        write_rank_input(dir.path(), single_page_pdf("Revenue figures"))?;
        let pipeline = RankPipeline::new(
            RunConfig::new(dir.path(), dir.path().join("out")),
            Box::new(MisreportedWidth(CharacterNgramEmbedder::default())),
        );

        assert!(matches!(
            pipeline.run(),
            Err(RunError::Rank(RankError::DimensionMismatch {
                expected: 385,
                actual: 384,
            }))
        ));
        Ok(())
    }

    #[test]
    fn outline_run_writes_nested_headings() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let (mut pdf, pages) = pdf_with_pages(&["a", "b", "c"]);
        attach_outline(
            &mut pdf,
            &pages,
            &[
                node("Summary", 1).with_children(vec![node("Findings", 2)]),
                node("Summary", 3),
            ],
        );
        pdf.save(dir.path().join("brief.pdf"))?;
        let output_dir = dir.path().join("out");

        let report = OutlinePipeline::new(RunConfig::new(dir.path(), &output_dir)).run()?;

        let written: OutlineDocument =
            serde_json::from_str(&fs::read_to_string(output_dir.join("brief.json"))?)?;
        assert!(report.failed.is_empty());
        assert_eq!(
            written.outline,
            vec![
                OutlineItem {
                    level: "H1".to_string(),
                    text: "Summary".to_string(),
                    page: 1,
                },
                OutlineItem {
                    level: "H2".to_string(),
                    text: "Findings".to_string(),
                    page: 2,
                },
                OutlineItem {
                    level: "H1".to_string(),
                    text: "Summary".to_string(),
                    page: 3,
                },
            ]
        );
        Ok(())
    }
}
