use anyhow::Context;
use chrono::Utc;
use clap::{Parser, ValueEnum};
use section_rank_core::{
    CharacterNgramEmbedder, Embedder, MiniLmEmbedder, Mode, OutlinePipeline, Pipeline,
    RankPipeline, RankingOptions, RunConfig, RunReport,
};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "section-rank", version)]
struct Cli {
    /// Pipeline to run: 1a (outline extraction) or 1b (section ranking)
    #[arg(long, env = "CHALLENGE", default_value = "1a")]
    mode: Mode,

    /// Directory holding the input PDFs (1a) or the run manifest (1b)
    #[arg(long, env = "INPUT_DIR", default_value = "/app/input")]
    input_dir: PathBuf,

    /// Directory the JSON results are written to
    #[arg(long, env = "OUTPUT_DIR", default_value = "/app/output")]
    output_dir: PathBuf,

    /// Run manifest; defaults to <input-dir>/challenge1b_input.json
    #[arg(long)]
    manifest: Option<PathBuf>,

    /// Directory of the documents named in the manifest; defaults to <input-dir>/PDFs
    #[arg(long)]
    documents_dir: Option<PathBuf>,

    /// Sentence-transformers model directory
    #[arg(long, env = "MODEL_DIR", default_value = "/app/models/minilm")]
    model_dir: PathBuf,

    /// Embedding backend used in 1b
    #[arg(long, value_enum, default_value_t = EmbedderKind::Minilm)]
    embedder: EmbedderKind,

    /// Number of ranked sections to keep
    #[arg(long, default_value = "5")]
    top_k: usize,

    /// Chunks embedded per model call
    #[arg(long, default_value = "32")]
    batch_size: usize,
}

#[derive(Clone, Copy, ValueEnum)]
enum EmbedderKind {
    /// BERT sentence encoder loaded from --model-dir
    Minilm,
    /// Hashed character n-grams, no model files needed
    Ngram,
}

impl Cli {
    fn run_config(&self) -> RunConfig {
        let mut config = RunConfig::new(&self.input_dir, &self.output_dir);
        if let Some(manifest) = &self.manifest {
            config.manifest_path = manifest.clone();
        }
        if let Some(documents_dir) = &self.documents_dir {
            config.documents_dir = documents_dir.clone();
        }
        config.ranking = RankingOptions {
            top_k: self.top_k,
            batch_size: self.batch_size,
        };
        config
    }

    fn pipeline(&self) -> anyhow::Result<Pipeline> {
        let config = self.run_config();
        let pipeline = match self.mode {
            Mode::Outline => Pipeline::Outline(OutlinePipeline::new(config)),
            Mode::Rank => Pipeline::Rank(RankPipeline::new(config, self.load_embedder()?)),
        };
        Ok(pipeline)
    }

    fn load_embedder(&self) -> anyhow::Result<Box<dyn Embedder>> {
        match self.embedder {
            EmbedderKind::Minilm => {
                let embedder = MiniLmEmbedder::load(&self.model_dir).with_context(|| {
                    format!("loading embedding model from {}", self.model_dir.display())
                })?;
                Ok(Box::new(embedder))
            }
            EmbedderKind::Ngram => Ok(Box::new(CharacterNgramEmbedder::default())),
        }
    }
}

fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        mode = ?cli.mode,
        started_at = %Utc::now().to_rfc3339(),
        "section-rank boot"
    );

    let started = Instant::now();
    let pipeline = cli.pipeline()?;
    let report = pipeline.run().context("run aborted")?;

    match report {
        RunReport::Outline(report) => {
            println!(
                "{} outline(s) written to {} ({} failed)",
                report.written.len(),
                cli.output_dir.display(),
                report.failed.len()
            );
        }
        RunReport::Rank(report) => {
            if !report.summary.skipped_documents.is_empty() || report.summary.skipped_sections > 0 {
                warn!(
                    skipped_documents = report.summary.skipped_documents.len(),
                    skipped_sections = report.summary.skipped_sections,
                    "some inputs were skipped"
                );
            }
            println!(
                "{} section(s) ranked from {} chunk(s); output at {}",
                report.output.extracted_sections.len(),
                report.summary.chunk_count,
                report.output_path.display()
            );
        }
    }

    info!(
        mode = ?pipeline.mode(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "run finished"
    );

    Ok(())
}
