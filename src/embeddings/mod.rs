// embeddings/ - Local sentence embedding provider using candle (pure Rust).
//
// Provides:
// - Device selection (accelerator detection with CPU fallback)
// - Model download + SHA256 bookkeeping
// - BERT inference with mean pooling and L2 normalization
// - The process-wide provider handle

pub mod device;
pub mod download;
pub mod engine;
pub mod provider;

#[cfg(test)]
pub(crate) mod testing;
