//! Local sentence embeddings with `sentence-transformers/all-MiniLM-L12-v2` on candle.
//!
//! The model is loaded once per process onto an accelerator when one is available
//! (CPU otherwise) and shared read-only. [`get_embeddings`] maps a batch of texts to
//! one L2-normalized vector per text, in input order.
//!
//! ```no_run
//! let vectors = sentence_embed::get_embeddings(&["hello world"])?;
//! assert_eq!(vectors.len(), 1);
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod config;
pub mod embeddings;
pub mod logging;
pub mod native_messaging;
pub mod protocol;
pub mod similarity;

pub use embeddings::provider::get_embeddings;
