// testing.rs - A one-layer BERT with random weights and a word-level vocabulary.
//
// Enough to exercise tokenization, padding, chunking, pooling and the on-disk
// load path without the real model files.

use std::path::Path;

use candle_core::{DType, Device};
use candle_nn::{VarBuilder, VarMap};
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use serde_json::{json, Value};
use tokenizers::Tokenizer;

use crate::embeddings::device::DeviceSelection;
use crate::embeddings::engine::EmbeddingEngine;

pub(crate) const TINY_VOCAB: [&str; 22] = [
    "[PAD]", "[UNK]", "[CLS]", "[SEP]", "a", "b", "hello", "world", "the", "cat", "sits", "on",
    "mat", "stock", "markets", "fell", "kitten", "rests", "rug", "long", "words", "here",
];
pub(crate) const TINY_DIMS: usize = 8;

fn tiny_tokenizer_json() -> Value {
    let vocab: serde_json::Map<String, Value> = TINY_VOCAB
        .iter()
        .enumerate()
        .map(|(i, w)| (w.to_string(), json!(i)))
        .collect();
    json!({
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [],
        "normalizer": { "type": "Lowercase" },
        "pre_tokenizer": { "type": "Whitespace" },
        "post_processor": {
            "type": "TemplateProcessing",
            "single": [
                { "SpecialToken": { "id": "[CLS]", "type_id": 0 } },
                { "Sequence": { "id": "A", "type_id": 0 } },
                { "SpecialToken": { "id": "[SEP]", "type_id": 0 } }
            ],
            "pair": [
                { "SpecialToken": { "id": "[CLS]", "type_id": 0 } },
                { "Sequence": { "id": "A", "type_id": 0 } },
                { "SpecialToken": { "id": "[SEP]", "type_id": 0 } },
                { "Sequence": { "id": "B", "type_id": 1 } },
                { "SpecialToken": { "id": "[SEP]", "type_id": 1 } }
            ],
            "special_tokens": {
                "[CLS]": { "id": "[CLS]", "ids": [2], "tokens": ["[CLS]"] },
                "[SEP]": { "id": "[SEP]", "ids": [3], "tokens": ["[SEP]"] }
            }
        },
        "decoder": null,
        "model": { "type": "WordLevel", "vocab": vocab, "unk_token": "[UNK]" }
    })
}

fn tiny_bert_config_json() -> Value {
    json!({
        "vocab_size": TINY_VOCAB.len(),
        "hidden_size": TINY_DIMS,
        "num_hidden_layers": 1,
        "num_attention_heads": 2,
        "intermediate_size": 16,
        "hidden_act": "gelu",
        "hidden_dropout_prob": 0.0,
        "max_position_embeddings": 64,
        "type_vocab_size": 2,
        "initializer_range": 0.02,
        "layer_norm_eps": 1e-12,
        "pad_token_id": 0,
        "position_embedding_type": "absolute",
        "use_cache": true,
        "classifier_dropout": null,
        "model_type": "bert"
    })
}

fn tiny_model(device: &Device) -> (VarMap, BertModel) {
    let bert_config: BertConfig = serde_json::from_value(tiny_bert_config_json()).unwrap();
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
    let model = BertModel::load(vb, &bert_config).unwrap();
    (varmap, model)
}

pub(crate) fn tiny_tokenizer() -> Tokenizer {
    Tokenizer::from_bytes(tiny_tokenizer_json().to_string()).unwrap()
}

pub(crate) fn tiny_engine_on(selection: DeviceSelection, device: Device, max_seq_length: usize) -> EmbeddingEngine {
    let (_varmap, model) = tiny_model(&device);
    EmbeddingEngine::from_parts(model, tiny_tokenizer(), device, selection, TINY_DIMS, max_seq_length).unwrap()
}

pub(crate) fn tiny_engine() -> EmbeddingEngine {
    tiny_engine_on(DeviceSelection::Cpu, Device::Cpu, 32)
}

/// Write config.json, tokenizer.json, model.safetensors and sentence_bert_config.json into `dir`.
pub(crate) fn write_tiny_model(dir: &Path, max_seq_length: usize) {
    let (varmap, _model) = tiny_model(&Device::Cpu);
    varmap.save(dir.join("model.safetensors")).unwrap();
    std::fs::write(dir.join("config.json"), tiny_bert_config_json().to_string()).unwrap();
    std::fs::write(dir.join("tokenizer.json"), tiny_tokenizer_json().to_string()).unwrap();
    std::fs::write(
        dir.join("sentence_bert_config.json"),
        json!({ "max_seq_length": max_seq_length, "do_lower_case": false }).to_string(),
    )
    .unwrap();
}
