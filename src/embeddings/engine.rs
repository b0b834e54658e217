// engine.rs - Candle BERT sentence encoder with attention-mask-aware mean pooling.
//
// Loads all-MiniLM-L12-v2 from safetensors onto the selected device and reproduces
// the model's own pipeline: Transformer -> mean Pooling -> L2 Normalize (384 dims).

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use serde::Deserialize;
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};

use crate::config;
use crate::embeddings::device::DeviceSelection;

/// sentence_bert_config.json; only the sequence limit matters here.
#[derive(Debug, Deserialize)]
struct SentenceBertConfig {
    #[serde(default)]
    max_seq_length: Option<usize>,
}

/// The embedding engine holds the loaded model and tokenizer.
pub struct EmbeddingEngine {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    selection: DeviceSelection,
    model_dir: PathBuf,
    dims: usize,
    max_seq_length: usize,
}

impl EmbeddingEngine {
    /// Load the model from a local directory containing model.safetensors,
    /// tokenizer.json, config.json and (optionally) sentence_bert_config.json.
    pub fn load(model_dir: &Path, selection: DeviceSelection, device: Device) -> anyhow::Result<Self> {
        let config_path = model_dir.join("config.json");
        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("read {}", config_path.display()))?;
        let bert_config: BertConfig = serde_json::from_str(&config_str)
            .with_context(|| format!("parse {}", config_path.display()))?;

        let max_seq_length = read_max_seq_length(model_dir)?.min(bert_config.max_position_embeddings);

        log::info!(
            "Loading embedding model: hidden_size={}, layers={}, heads={}, max_seq_length={}, device={}",
            bert_config.hidden_size,
            bert_config.num_hidden_layers,
            bert_config.num_attention_heads,
            max_seq_length,
            selection,
        );

        let weights_path = model_dir.join("model.safetensors");
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path.clone()], DType::F32, &device)
                .with_context(|| format!("load weights from {}", weights_path.display()))?
        };

        let model = BertModel::load(vb, &bert_config).context("load BERT model")?;

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("load tokenizer: {e}"))?;

        if bert_config.hidden_size != config::embedding::EMBEDDING_DIMS {
            log::warn!(
                "Model hidden size {} differs from expected {}",
                bert_config.hidden_size,
                config::embedding::EMBEDDING_DIMS
            );
        }

        let engine = Self::assemble(
            model,
            tokenizer,
            device,
            selection,
            model_dir.to_path_buf(),
            bert_config.hidden_size,
            max_seq_length,
        )?;
        log::info!("Embedding model loaded successfully (dims={})", engine.dims);
        Ok(engine)
    }

    /// Build an engine from an in-memory model and tokenizer.
    #[cfg(test)]
    pub(crate) fn from_parts(
        model: BertModel,
        tokenizer: Tokenizer,
        device: Device,
        selection: DeviceSelection,
        dims: usize,
        max_seq_length: usize,
    ) -> anyhow::Result<Self> {
        Self::assemble(model, tokenizer, device, selection, PathBuf::new(), dims, max_seq_length)
    }

    // Truncate to the model's limit, pad each chunk to its longest member.
    fn assemble(
        model: BertModel,
        mut tokenizer: Tokenizer,
        device: Device,
        selection: DeviceSelection,
        model_dir: PathBuf,
        dims: usize,
        max_seq_length: usize,
    ) -> anyhow::Result<Self> {
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: max_seq_length,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("configure tokenizer truncation: {e}"))?;
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..Default::default()
        }));

        Ok(Self {
            model,
            tokenizer,
            device,
            selection,
            model_dir,
            dims,
            max_seq_length,
        })
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn max_seq_length(&self) -> usize {
        self.max_seq_length
    }

    pub fn selection(&self) -> DeviceSelection {
        self.selection
    }

    /// Directory the weights were loaded from.
    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Encode texts into a `[texts.len(), dims]` tensor that stays on the model's device.
    ///
    /// Rows follow input order. An empty input gives a `[0, dims]` tensor without
    /// running the model.
    pub fn encode_tensor<S: AsRef<str>>(&self, texts: &[S]) -> anyhow::Result<Tensor> {
        if texts.is_empty() {
            return Ok(Tensor::zeros((0, self.dims), DType::F32, &self.device)?);
        }

        let chunks = texts
            .chunks(config::embedding::ENCODE_CHUNK_SIZE)
            .map(|chunk| self.encode_chunk(chunk))
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Tensor::cat(&chunks, 0)?)
    }

    /// Encode texts into one `Vec<f32>` per input, in input order.
    pub fn encode<S: AsRef<str>>(&self, texts: &[S]) -> anyhow::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let vectors: Vec<Vec<f32>> = self.encode_tensor(texts)?.to_vec2()?;

        if vectors.len() != texts.len() {
            bail!("encoder returned {} vectors for {} texts", vectors.len(), texts.len());
        }
        if let Some(v) = vectors.iter().find(|v| v.len() != self.dims) {
            bail!("unexpected embedding dims: got {}, expected {}", v.len(), self.dims);
        }
        Ok(vectors)
    }

    /// One forward pass over a padded chunk -> [chunk_len, hidden_size]
    fn encode_chunk<S: AsRef<str>>(&self, chunk: &[S]) -> anyhow::Result<Tensor> {
        let inputs: Vec<&str> = chunk.iter().map(AsRef::as_ref).collect();
        let encodings = self
            .tokenizer
            .encode_batch(inputs, true)
            .map_err(|e| anyhow::anyhow!("tokenize: {e}"))?;

        let token_ids = encodings
            .iter()
            .map(|e| Tensor::new(e.get_ids(), &self.device))
            .collect::<candle_core::Result<Vec<_>>>()?;
        let attention_mask = encodings
            .iter()
            .map(|e| Tensor::new(e.get_attention_mask(), &self.device))
            .collect::<candle_core::Result<Vec<_>>>()?;

        // [chunk_len, seq_len]; padding already made every row the same length
        let token_ids = Tensor::stack(&token_ids, 0)?;
        let attention_mask = Tensor::stack(&attention_mask, 0)?;
        let token_type_ids = token_ids.zeros_like()?;

        // Forward pass -> [chunk_len, seq_len, hidden_size]
        let output = self
            .model
            .forward(&token_ids, &token_type_ids, Some(&attention_mask))?;

        let pooled = mean_pooling(&output, &attention_mask)?;
        l2_normalize(&pooled)
    }
}

fn read_max_seq_length(model_dir: &Path) -> anyhow::Result<usize> {
    let path = model_dir.join("sentence_bert_config.json");
    if !path.exists() {
        return Ok(config::embedding::DEFAULT_MAX_SEQ_LENGTH);
    }
    let raw = std::fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    let st: SentenceBertConfig =
        serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))?;
    Ok(st.max_seq_length.unwrap_or(config::embedding::DEFAULT_MAX_SEQ_LENGTH))
}

/// Attention-mask-aware mean pooling.
///
/// For each position, multiply the hidden state by the attention mask (0 or 1),
/// then sum across positions and divide by the number of non-masked positions.
///
/// input_embeds: [batch, seq_len, hidden_size]
/// attention_mask: [batch, seq_len] (1 for real tokens, 0 for padding)
/// output: [batch, hidden_size]
fn mean_pooling(input_embeds: &Tensor, attention_mask: &Tensor) -> anyhow::Result<Tensor> {
    let mask_expanded = attention_mask
        .to_dtype(input_embeds.dtype())?
        .unsqueeze(2)?
        .broadcast_as(input_embeds.shape())?;

    let sum_embeddings = (input_embeds * &mask_expanded)?.sum(1)?;

    // clamp to avoid div by zero on an all-padding row
    let sum_mask = mask_expanded.sum(1)?.clamp(config::embedding::MEAN_POOLING_EPS, f64::MAX)?;

    Ok((sum_embeddings / sum_mask)?)
}

/// L2 normalize a tensor along the last dimension.
fn l2_normalize(tensor: &Tensor) -> anyhow::Result<Tensor> {
    let norm = tensor.sqr()?.sum_keepdim(1)?.sqrt()?;
    let norm = norm.clamp(config::embedding::L2_NORM_EPS, f64::MAX)?;
    Ok(tensor.broadcast_div(&norm)?)
}
