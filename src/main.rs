use std::io::{stdin, stdout};
use std::path::PathBuf;

use anyhow::Context;
use serde::Serialize;
use serde_json::Value;

use sentence_embed::config;
use sentence_embed::embeddings::device::DevicePreference;
use sentence_embed::embeddings::download;
use sentence_embed::embeddings::engine::EmbeddingEngine;
use sentence_embed::embeddings::provider::{self, ProviderOptions};
use sentence_embed::logging;
use sentence_embed::native_messaging;
use sentence_embed::protocol::{
    CompareParams, CompareResult, DuplicatesParams, DuplicatesResult, EmbedParams, EmbedResult, HelloResult,
    InitParams, InitResult, Request, ResponseErr, ResponseOk, SimilarityParams, SimilarityResult,
};
use sentence_embed::similarity;

const USAGE: &str = "\
Usage: embed_host [MODE]

Without a mode, serves native-messaging requests on stdin/stdout.

Modes:
  --demo [TEXT...]   Load the model, embed TEXT (or built-in samples) and print a summary
  --download         Fetch model files into the local cache and exit
  --version          Print version
  --help             Print this help

Environment:
  SENTENCE_EMBED_MODEL_DIR   Load from this directory instead of the download cache
  SENTENCE_EMBED_DEVICE      auto (default), cpu or accelerator
  SENTENCE_EMBED_LOG         Log level spec (default: debug)
  SENTENCE_EMBED_LOG_DIR     Log directory (default: ~/.sentence-embed/logs)";

fn main() {
    if let Err(e) = real_main() {
        eprintln!("[embed_host] fatal error: {e:?}");
        log::error!("Fatal error: {:?}", e);
        std::process::exit(1);
    }
}

fn real_main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();

    // Informational modes never touch the log directory.
    match args.get(1).map(String::as_str) {
        Some("--version") => {
            println!("embed_host {}", config::HOST_VERSION);
            return Ok(());
        }
        Some("--help") | Some("-h") => {
            println!("{USAGE}");
            return Ok(());
        }
        Some(other) if other.starts_with("--") && !matches!(other, "--demo" | "--download") => {
            anyhow::bail!("unknown option: {other}\n\n{USAGE}");
        }
        _ => {}
    }

    let _logger = logging::init_logging(&logging::LogSettings::from_env()?)?;

    match args.get(1).map(String::as_str) {
        Some("--demo") => run_demo(&args[2..]),
        Some("--download") => {
            let dir = download::ensure_model_files()?;
            println!("Model files ready at {}", dir.display());
            Ok(())
        }
        _ => serve(),
    }
}

/// Eager init, then embed a handful of texts. Init failure is fatal here.
fn run_demo(texts: &[String]) -> anyhow::Result<()> {
    let texts: Vec<String> = if texts.is_empty() {
        config::demo::SAMPLE_TEXTS.iter().map(|s| s.to_string()).collect()
    } else {
        texts.to_vec()
    };

    println!("Loading {}...", config::embedding::MODEL_NAME);
    let engine = provider::init(&ProviderOptions::from_env()?)?;
    println!("Device: {}", engine.selection());

    let embeddings = engine.encode(&texts)?;
    println!("Embeddings: {}", embeddings.len());

    let Some(first) = embeddings.first() else {
        return Ok(());
    };
    println!("Dimensions: {}", first.len());

    let preview: Vec<String> = first
        .iter()
        .take(config::demo::PREVIEW_VALUES)
        .map(|v| format!("{v:.6}"))
        .collect();
    println!("First values of embedding #1: {}", preview.join(" "));
    Ok(())
}

fn serve() -> anyhow::Result<()> {
    log::info!("=== Embedding host started ===");
    log::info!("Waiting for messages...");

    let mut in_stream = stdin();
    let mut out_stream = stdout();

    let mut message_count: u64 = 0;
    loop {
        let req = match native_messaging::read_message(&mut in_stream) {
            Ok(Some(r)) => r,
            Ok(None) => {
                log::info!("No more messages after {} messages, exiting", message_count);
                break;
            }
            Err(e) => {
                log::error!("Error reading message: {:?}", e);
                break;
            }
        };

        message_count += 1;
        log::info!("Processing message #{}: {} (id: {})", message_count, req.method, req.id);

        match handle_request(&req) {
            Ok(v) => {
                if let Err(e) = native_messaging::write_json(&mut out_stream, &v) {
                    log::error!("Error sending response: {:?}", e);
                    break;
                }
            }
            Err(e) => {
                log::error!("Handler error: {:?}", e);
                let err = ResponseErr { id: req.id.clone(), error: format!("{e:#}") };
                let _ = native_messaging::write_json(&mut out_stream, &err);
            }
        }
    }

    log::info!("=== Embedding host stopped ===");
    Ok(())
}

fn handle_request(req: &Request) -> anyhow::Result<Value> {
    match req.method.as_str() {
        "hello" => respond(&req.id, handle_hello()),
        "init" => respond(&req.id, handle_init(&req.params)?),
        "embed" => respond(&req.id, handle_embed(&req.params)?),
        "similarity" => respond(&req.id, handle_similarity(&req.params)?),
        "compare" => respond(&req.id, handle_compare(&req.params)?),
        "duplicates" => respond(&req.id, handle_duplicates(&req.params)?),
        other => Ok(serde_json::to_value(ResponseErr {
            id: req.id.clone(),
            error: format!("Unknown method: {other}"),
        })?),
    }
}

fn respond<T: Serialize>(id: &str, result: T) -> anyhow::Result<Value> {
    Ok(serde_json::to_value(ResponseOk { id: id.to_string(), result })?)
}

fn parse_params<T: serde::de::DeserializeOwned>(params: &Value) -> anyhow::Result<T> {
    serde_json::from_value(params.clone()).context("invalid params")
}

fn require_engine() -> anyhow::Result<&'static EmbeddingEngine> {
    provider::get().context("Embedding model not initialized. Call 'init' first.")
}

fn handle_hello() -> HelloResult {
    HelloResult {
        host_version: config::HOST_VERSION,
        model_name: config::embedding::MODEL_NAME,
        dims: config::embedding::EMBEDDING_DIMS,
        initialized: provider::get().is_some(),
    }
}

fn handle_init(params: &Value) -> anyhow::Result<InitResult> {
    let p: InitParams = if params.is_null() { InitParams::default() } else { parse_params(params)? };

    // Request params win; the environment is only consulted for what they leave out.
    let model_dir = match p.model_dir.filter(|s| !s.is_empty()) {
        Some(dir) => Some(PathBuf::from(dir)),
        None => provider::env_model_dir(),
    };
    let device = match p.device {
        Some(device) => device.parse::<DevicePreference>()?,
        None => provider::env_device()?,
    };

    let engine = provider::init(&ProviderOptions { model_dir, device })?;

    Ok(InitResult {
        ok: true,
        model_name: config::embedding::MODEL_NAME,
        model_dir: engine.model_dir().to_string_lossy().to_string(),
        device: engine.selection().to_string(),
        dims: engine.dims(),
        max_seq_length: engine.max_seq_length(),
    })
}

fn handle_embed(params: &Value) -> anyhow::Result<EmbedResult> {
    let p: EmbedParams = parse_params(params)?;
    let engine = require_engine()?;
    let embeddings = engine.encode(&p.texts)?;
    log::info!("Embedded {} texts", embeddings.len());

    Ok(EmbedResult {
        count: embeddings.len(),
        dims: engine.dims(),
        embeddings,
    })
}

fn handle_similarity(params: &Value) -> anyhow::Result<SimilarityResult> {
    let p: SimilarityParams = parse_params(params)?;
    let engine = require_engine()?;
    let v = engine.encode(&[p.a.as_str(), p.b.as_str()])?;
    Ok(SimilarityResult {
        similarity: similarity::cosine_similarity(&v[0], &v[1]),
    })
}

fn handle_compare(params: &Value) -> anyhow::Result<CompareResult> {
    let p: CompareParams = parse_params(params)?;
    let engine = require_engine()?;

    let threshold = resolve_threshold(p.threshold, p.slider_value);

    let v = engine.encode(&[
        p.first.question.as_str(),
        p.second.question.as_str(),
        p.first.answer.as_str(),
        p.second.answer.as_str(),
    ])?;
    let question_similarity = similarity::cosine_similarity(&v[0], &v[1]);
    let answer_similarity = similarity::cosine_similarity(&v[2], &v[3]);
    let score = similarity::combined_score(question_similarity, answer_similarity);

    Ok(CompareResult {
        question_similarity,
        answer_similarity,
        score,
        threshold,
        is_duplicate: score > threshold,
    })
}

/// Explicit threshold, else the slider value, else the settings file next to the host.
fn resolve_threshold(threshold: Option<f32>, slider_value: Option<f64>) -> f32 {
    match (threshold, slider_value) {
        (Some(t), _) => t,
        (None, Some(slider)) => similarity::threshold_from_slider(slider),
        (None, None) => similarity::load_threshold_or_default(&PathBuf::from(config::similarity::THRESHOLD_FILE_NAME)),
    }
}

// The model is only required once a check gets past exact matching.
fn embed_with_engine(texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
    require_engine()?.encode(texts)
}

fn handle_duplicates(params: &Value) -> anyhow::Result<DuplicatesResult> {
    let p: DuplicatesParams = parse_params(params)?;
    let threshold = resolve_threshold(p.threshold, p.slider_value);

    let answers = similarity::find_duplicate_answers(&p.answers, threshold, embed_with_engine)?;
    let choices = similarity::find_duplicates_within_question(&p.choices, threshold, embed_with_engine)?;
    let questions = similarity::find_duplicate_questions(&p.questions, threshold, embed_with_engine)?;
    log::info!(
        "Duplicate check: answers={}, choices={}, questions={}",
        answers.is_some(),
        choices.is_some(),
        questions.len()
    );

    Ok(DuplicatesResult { threshold, answers, choices, questions })
}
