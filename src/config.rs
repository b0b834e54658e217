// IMPORTANT:
// Keep ALL numeric values centralized here (repo rule: no hardcoded numeric values scattered around).

// NOTE: HOST_VERSION must stay in sync with the `version` field in Cargo.toml.
pub const HOST_VERSION: &str = "0.1.0";

pub mod env {
    /// Use an already-populated model directory instead of the download cache.
    pub const MODEL_DIR: &str = "SENTENCE_EMBED_MODEL_DIR";
    /// `auto` (default), `cpu` or `accelerator`.
    pub const DEVICE: &str = "SENTENCE_EMBED_DEVICE";
    /// flexi_logger spec for the host log, e.g. `info` or `warn, sentence_embed=debug`.
    pub const LOG: &str = "SENTENCE_EMBED_LOG";
    /// Write host logs here instead of `~/.sentence-embed/logs`.
    pub const LOG_DIR: &str = "SENTENCE_EMBED_LOG_DIR";
}

pub mod logging {
    pub const LOG_DIR_REL: &str = ".sentence-embed/logs";
    pub const LOG_FILE_NAME: &str = "embed_host.log";
    pub const DEFAULT_SPEC: &str = "debug";

    pub const LOG_ROTATE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
    pub const LOG_ROTATE_KEEP_FILES: usize = 5;
}

pub mod native_messaging {
    pub const MAX_MESSAGE_SIZE_BYTES: u32 = 128 * 1024 * 1024;
}

pub mod download {
    // Model weights are ~130 MB; allow well beyond the usual request timeout.
    pub const DOWNLOAD_TIMEOUT_SECS: u64 = 300;

    pub const MANIFEST_FILE_NAME: &str = "manifest.json";
}

pub mod embedding {
    pub const MODEL_NAME: &str = "sentence-transformers/all-MiniLM-L12-v2";
    pub const EMBEDDING_DIMS: usize = 384;

    // Used when sentence_bert_config.json is absent or has no max_seq_length.
    pub const DEFAULT_MAX_SEQ_LENGTH: usize = 128;

    // Texts per forward pass inside encode (sentence-transformers default batch_size).
    pub const ENCODE_CHUNK_SIZE: usize = 32;

    pub const MODEL_BASE_URL: &str =
        "https://huggingface.co/sentence-transformers/all-MiniLM-L12-v2/resolve/main";

    pub const MODEL_FILES: [&str; 4] = [
        "config.json",
        "tokenizer.json",
        "model.safetensors",
        "sentence_bert_config.json",
    ];

    // Local model storage directory (relative to home)
    pub const MODEL_DIR_REL: &str = ".sentence-embed/models/all-MiniLM-L12-v2";

    pub const MEAN_POOLING_EPS: f64 = 1e-9;
    pub const L2_NORM_EPS: f64 = 1e-12;
}

pub mod similarity {
    pub const DEFAULT_THRESHOLD: f32 = 0.6;

    // Both sides must clear this for the pair score to be their mean.
    pub const PAIR_FLOOR: f32 = 0.5;

    // The settings slider stores `-(2/35) * percent`; dividing by this recovers the percent.
    pub const SLIDER_STEP: f64 = -(2.0 / 35.0);

    pub const THRESHOLD_FILE_NAME: &str = "configs.json";

    // Answers this short ("A", "Yes", "12") are left out of semantic duplicate checks.
    pub const MIN_ANSWER_CHARS: usize = 3;
}

pub mod demo {
    pub const SAMPLE_TEXTS: [&str; 3] = [
        "Hello world",
        "Today is a beautiful day",
        "I am learning to program in Rust",
    ];

    pub const PREVIEW_VALUES: usize = 5;
}
