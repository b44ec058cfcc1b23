//! Sentence embeddings from a locally stored BERT encoder (all-MiniLM-L6-v2 or
//! any model saved in the sentence-transformers layout).
//!
//! The model directory must hold `config.json`, `tokenizer.json` and either
//! `model.safetensors` or `pytorch_model.bin`. Inputs are truncated to the
//! `max_seq_length` of `sentence_bert_config.json` when present. Vectors are
//! mean-pooled over the attention mask and L2-normalized.

use crate::embeddings::Embedder;
use crate::error::EmbedError;
use candle_core::{Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config, DTYPE};
use std::path::Path;
use std::time::Instant;
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};
use tracing::{debug, info};

const SENTENCE_CONFIG_FILE: &str = "sentence_bert_config.json";
const DEFAULT_MAX_SEQUENCE_LENGTH: usize = 256;

pub struct MiniLmEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    dimensions: usize,
}

impl MiniLmEmbedder {
    /// Loads the encoder on the CPU. Called once per run.
    pub fn load(model_dir: &Path) -> Result<Self, EmbedError> {
        let start = Instant::now();
        let device = Device::Cpu;

        let config_path = require(model_dir, "config.json")?;
        let tokenizer_path = require(model_dir, "tokenizer.json")?;

        let raw_config = std::fs::read_to_string(config_path)?;
        let config: Config = serde_json::from_str(&raw_config)?;
        let dimensions = hidden_size(&raw_config)?;
        let max_length = max_sequence_length(model_dir)?;

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|error| EmbedError::Tokenizer(error.to_string()))?;
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..Default::default()
        }));
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length,
                ..Default::default()
            }))
            .map_err(|error| EmbedError::Tokenizer(error.to_string()))?;

        let safetensors = model_dir.join("model.safetensors");
        let vb = if safetensors.is_file() {
            // SAFETY: the weights file is mapped read-only and not modified while loaded.
            unsafe { VarBuilder::from_mmaped_safetensors(&[safetensors], DTYPE, &device)? }
        } else {
            VarBuilder::from_pth(require(model_dir, "pytorch_model.bin")?, DTYPE, &device)?
        };
        let model = BertModel::load(vb, &config)?;

        info!(
            model_dir = %model_dir.display(),
            dimensions,
            max_length,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "embedding model loaded"
        );

        Ok(Self {
            model,
            tokenizer,
            device,
            dimensions,
        })
    }

    fn forward(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|error| EmbedError::Tokenizer(error.to_string()))?;

        let batch_size = encodings.len();
        let seq_len = encodings
            .first()
            .map(|encoding| encoding.get_ids().len())
            .unwrap_or_default();

        let mut ids = Vec::with_capacity(batch_size * seq_len);
        let mut mask = Vec::with_capacity(batch_size * seq_len);
        let mut type_ids = Vec::with_capacity(batch_size * seq_len);
        for encoding in &encodings {
            ids.extend(encoding.get_ids().iter().map(|&id| id as i64));
            mask.extend(encoding.get_attention_mask().iter().map(|&m| m as i64));
            type_ids.extend(encoding.get_type_ids().iter().map(|&t| t as i64));
        }

        let input_ids = Tensor::from_vec(ids, (batch_size, seq_len), &self.device)?;
        let attention_mask = Tensor::from_vec(mask, (batch_size, seq_len), &self.device)?;
        let token_type_ids = Tensor::from_vec(type_ids, (batch_size, seq_len), &self.device)?;

        let hidden = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))?;

        let mask = attention_mask
            .unsqueeze(2)?
            .to_dtype(DTYPE)?
            .broadcast_as(hidden.shape())?;
        let summed = hidden.mul(&mask)?.sum(1)?;
        let counts = mask.sum(1)?.clamp(1e-9, f64::MAX)?;
        let pooled = summed.div(&counts)?;

        let norm = pooled
            .sqr()?
            .sum_keepdim(1)?
            .sqrt()?
            .clamp(1e-12, f64::MAX)?;
        let normalized = pooled.broadcast_div(&norm)?;

        Ok(normalized.to_vec2::<f32>()?)
    }
}

impl Embedder for MiniLmEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        self.forward(&[text])?
            .into_iter()
            .next()
            .ok_or(EmbedError::BatchSize {
                expected: 1,
                actual: 0,
            })
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let start = Instant::now();
        let vectors = self.forward(texts)?;
        debug!(
            batch = texts.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "batch embedded"
        );
        Ok(vectors)
    }
}

fn require(model_dir: &Path, file: &str) -> Result<std::path::PathBuf, EmbedError> {
    let path = model_dir.join(file);
    if path.is_file() {
        Ok(path)
    } else {
        Err(EmbedError::MissingModelFile(path))
    }
}

/// `Config` keeps its fields private, so the output width is read separately.
fn hidden_size(raw_config: &str) -> Result<usize, EmbedError> {
    #[derive(serde::Deserialize)]
    struct HiddenSize {
        hidden_size: usize,
    }

    let parsed: HiddenSize = serde_json::from_str(raw_config)?;
    Ok(parsed.hidden_size)
}

/// Truncation length from `sentence_bert_config.json`, 256 when the file or
/// the key is absent.
fn max_sequence_length(model_dir: &Path) -> Result<usize, EmbedError> {
    #[derive(serde::Deserialize)]
    struct SentenceConfig {
        max_seq_length: Option<usize>,
    }

    let path = model_dir.join(SENTENCE_CONFIG_FILE);
    if !path.is_file() {
        return Ok(DEFAULT_MAX_SEQUENCE_LENGTH);
    }

    let parsed: SentenceConfig = serde_json::from_str(&std::fs::read_to_string(path)?)?;
    Ok(parsed.max_seq_length.unwrap_or(DEFAULT_MAX_SEQUENCE_LENGTH))
}
