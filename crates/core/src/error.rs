use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("malformed outline: {0}")]
    MalformedOutline(String),

    #[error("page {page} is outside the document (1..={total})")]
    PageOutOfRange { page: u32, total: u32 },

    #[error("path has no file name: {0}")]
    MissingFileName(String),
}

/// Failure to produce one outline file; the outline run continues.
#[derive(Debug, Error)]
pub enum OutlineError {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("model error: {0}")]
    Model(#[from] candle_core::Error),

    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    #[error("invalid model config: {0}")]
    Config(#[from] serde_json::Error),

    #[error("model file not found: {0}")]
    MissingModelFile(PathBuf),

    #[error("embedder returned {actual} vectors for a batch of {expected}")]
    BatchSize { expected: usize, actual: usize },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum RankError {
    #[error("{vectors} vectors supplied for {chunks} chunks")]
    LengthMismatch { chunks: usize, vectors: usize },

    #[error("vector has {actual} dimensions, task vector has {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("run input not found: {0}")]
    MissingInput(PathBuf),

    #[error("invalid run input: {0}")]
    InvalidInput(String),

    #[error("no text chunks could be extracted from any document")]
    NoChunks,

    #[error("no pdf files found in {0}")]
    NoPdfFiles(PathBuf),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("embedding failed: {0}")]
    Embed(#[from] EmbedError),

    #[error("ranking failed: {0}")]
    Rank(#[from] RankError),
}
