// Model-backed tests. They need the all-MiniLM-L12-v2 files locally, either in
// SENTENCE_EMBED_MODEL_DIR or in the download cache (`embed_host --download`).
// Without them each test prints a note and returns early.

use std::path::PathBuf;

use candle_core::Device;
use sentence_embed::embeddings::device::{DevicePreference, DeviceSelection};
use sentence_embed::embeddings::download;
use sentence_embed::embeddings::engine::EmbeddingEngine;
use sentence_embed::embeddings::provider::{self, ProviderOptions};
use sentence_embed::similarity::cosine_similarity;

fn local_model_dir() -> Option<PathBuf> {
    let dir = std::env::var("SENTENCE_EMBED_MODEL_DIR")
        .ok()
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .or_else(|| download::model_dir().ok())?;
    if download::model_files_exist(&dir) {
        Some(dir)
    } else {
        eprintln!("skipping: model files not found in {}", dir.display());
        None
    }
}

fn engine() -> Option<&'static EmbeddingEngine> {
    let dir = local_model_dir()?;
    let options = ProviderOptions { model_dir: Some(dir), device: DevicePreference::Auto };
    Some(provider::init(&options).expect("model files present but provider failed to load"))
}

#[test]
fn test_single_text_gives_one_vector() {
    let Some(engine) = engine() else { return };
    let out = engine.encode(&["hello world"]).unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].len(), engine.dims());
    assert_eq!(engine.dims(), 384);
}

#[test]
fn test_two_texts_give_two_distinct_vectors() {
    let Some(engine) = engine() else { return };
    let out = engine.encode(&["a", "b"]).unwrap();
    assert_eq!(out.len(), 2);
    assert_ne!(out[0], out[1]);
}

#[test]
fn test_repeated_calls_are_consistent_and_ordered() {
    let Some(engine) = engine() else { return };
    let texts = ["The cat sits on the mat", "Stock markets fell sharply today", "A kitten rests on a rug"];
    let first = engine.encode(&texts).unwrap();
    let second = engine.encode(&texts).unwrap();
    assert_eq!(first.len(), texts.len());
    assert_eq!(second.len(), texts.len());
    for (a, b) in first.iter().zip(&second) {
        assert_eq!(a.len(), b.len());
        assert!(cosine_similarity(a, b) > 0.9999);
    }

    // Order follows the input: each text's vector matches its own single-text encoding.
    let solo = engine.encode(&[texts[1]]).unwrap();
    assert!(cosine_similarity(&first[1], &solo[0]) > 0.999);

    // Paraphrases sit closer than unrelated text.
    assert!(cosine_similarity(&first[0], &first[2]) > cosine_similarity(&first[0], &first[1]));
}

#[test]
fn test_vectors_are_unit_length() {
    let Some(engine) = engine() else { return };
    for v in engine.encode(&["normalised output", ""]).unwrap() {
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4, "norm was {norm}");
    }
}

#[test]
fn test_empty_input_returns_empty_output() {
    let Some(engine) = engine() else { return };
    let empty: [&str; 0] = [];
    assert!(engine.encode(&empty).unwrap().is_empty());
    let t = engine.encode_tensor(&empty).unwrap();
    assert_eq!(t.dims(), &[0, engine.dims()]);
}

#[test]
fn test_more_texts_than_one_chunk() {
    let Some(engine) = engine() else { return };
    let texts: Vec<String> = (0..70).map(|i| format!("sentence number {i}")).collect();
    let out = engine.encode(&texts).unwrap();
    assert_eq!(out.len(), 70);
    let last = engine.encode(&[texts[69].as_str()]).unwrap();
    assert!(cosine_similarity(&out[69], &last[0]) > 0.999);
}

#[test]
fn test_tensor_output_lives_on_model_device() {
    let Some(engine) = engine() else { return };
    let t = engine.encode_tensor(&["on device"]).unwrap();
    assert_eq!(t.dims(), &[1, engine.dims()]);
    assert!(t.device().same_device(engine.device()));
}

#[test]
fn test_cpu_fallback_loads_and_embeds() {
    let Some(dir) = local_model_dir() else { return };
    let engine = EmbeddingEngine::load(&dir, DeviceSelection::Cpu, Device::Cpu).unwrap();
    assert_eq!(engine.selection(), DeviceSelection::Cpu);
    let out = engine.encode(&["runs on the general-purpose processor"]).unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].len(), 384);
}

#[test]
fn test_get_embeddings_uses_shared_provider() {
    let Some(engine) = engine() else { return };
    let out = sentence_embed::get_embeddings(&["hello world"]).unwrap();
    assert_eq!(out.len(), 1);
    assert!(std::ptr::eq(engine, provider::get().unwrap()));
}
