pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod minilm;
pub mod models;
mod outline;
pub mod pipeline;
pub mod ranking;
pub mod report;

pub use chunking::{
    chunk_document, normalize_whitespace, section_span, ChunkingReport, SkippedSection,
};
pub use embeddings::{embed_corpus, CharacterNgramEmbedder, Embedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{EmbedError, ExtractError, OutlineError, RankError, RunError};
pub use extractor::{document_title, open_document, read_outline, LopdfDocument, PdfDocument};
pub use ingest::{
    chunk_pdf, collect_chunks, discover_pdf_files, load_run_input, CorpusReport, DocumentOutcome,
};
pub use minilm::MiniLmEmbedder;
pub use models::{
    Chunk, DocumentRef, ExtractedSection, JobToBeDone, OutlineDocument, OutlineEntry, OutlineItem,
    Persona, RankedChunk, RankingOptions, RunInput, RunMetadata, RunOutput, SubsectionAnalysis,
};
pub use pipeline::{
    Mode, OutlinePipeline, OutlineRunReport, Pipeline, RankPipeline, RankRunReport, RankSummary,
    RunConfig, RunReport,
};
pub use ranking::{cosine_similarity, rank_chunks, score_chunks};
pub use report::{build_outline_document, build_run_output, write_json};
