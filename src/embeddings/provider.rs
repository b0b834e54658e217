// provider.rs - Process-wide embedding provider.
//
// The model is loaded at most once per process and is read-only afterwards.
// `init` is the explicit lifecycle entry point; `get_embeddings` initializes on
// first use with options taken from the environment.

use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use anyhow::Context;

use crate::config;
use crate::embeddings::device::{resolve_device, DevicePreference};
use crate::embeddings::download;
use crate::embeddings::engine::EmbeddingEngine;

static ENGINE: OnceLock<EmbeddingEngine> = OnceLock::new();
static INIT_LOCK: Mutex<()> = Mutex::new(());

/// How to initialize the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderOptions {
    /// Pre-populated model directory. `None` means the download cache.
    pub model_dir: Option<PathBuf>,
    pub device: DevicePreference,
}

impl ProviderOptions {
    /// Read `SENTENCE_EMBED_MODEL_DIR` and `SENTENCE_EMBED_DEVICE`.
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            model_dir: env_model_dir(),
            device: env_device()?,
        })
    }

    /// The directory the model will be loaded from.
    pub fn resolved_model_dir(&self) -> anyhow::Result<PathBuf> {
        match &self.model_dir {
            Some(dir) => Ok(dir.clone()),
            None => download::model_dir(),
        }
    }
}

/// `SENTENCE_EMBED_MODEL_DIR`, if set and non-empty.
pub fn env_model_dir() -> Option<PathBuf> {
    std::env::var(config::env::MODEL_DIR)
        .ok()
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
}

/// `SENTENCE_EMBED_DEVICE`, defaulting to `auto` when unset.
pub fn env_device() -> anyhow::Result<DevicePreference> {
    match std::env::var(config::env::DEVICE) {
        Ok(v) => v.parse().with_context(|| format!("invalid {}", config::env::DEVICE)),
        Err(_) => Ok(DevicePreference::Auto),
    }
}

/// Load the model once and return the shared handle.
///
/// Later calls return the already-loaded engine and ignore `options`.
/// Failure leaves the provider uninitialized; nothing is retried.
pub fn init(options: &ProviderOptions) -> anyhow::Result<&'static EmbeddingEngine> {
    if let Some(engine) = ENGINE.get() {
        return Ok(engine);
    }

    let _guard = INIT_LOCK
        .lock()
        .map_err(|_| anyhow::anyhow!("embedding provider init lock poisoned"))?;
    if let Some(engine) = ENGINE.get() {
        return Ok(engine);
    }

    let dir = options.resolved_model_dir()?;
    if options.model_dir.is_none() {
        download::ensure_model_files_in(&dir)?;
    }
    download::verify_model_files(&dir)?;

    let (selection, device) = resolve_device(options.device)?;
    let engine = EmbeddingEngine::load(&dir, selection, device)
        .with_context(|| format!("load {} from {}", config::embedding::MODEL_NAME, dir.display()))?;

    log::info!("Embedding provider ready on {}", engine.selection());
    Ok(ENGINE.get_or_init(|| engine))
}

/// The shared engine, if `init` has succeeded.
pub fn get() -> Option<&'static EmbeddingEngine> {
    ENGINE.get()
}

/// Map texts to embeddings with the process-wide model, one vector per text in input order.
///
/// Initializes the provider from the environment on first call.
pub fn get_embeddings<S: AsRef<str>>(texts: &[S]) -> anyhow::Result<Vec<Vec<f32>>> {
    let engine = match get() {
        Some(engine) => engine,
        None => init(&ProviderOptions::from_env()?)?,
    };
    engine.encode(texts)
}
