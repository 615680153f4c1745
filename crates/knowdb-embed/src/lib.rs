//! Embedding backends behind `knowdb_core::traits::Embedder`.
//!
//! The backend is picked once from configuration: `openai` talks to an
//! OpenAI-compatible `/embeddings` endpoint, `hashing` is a deterministic
//! offline embedder used by tests and air-gapped installs.

pub mod hashing;
pub mod openai;
pub mod preprocess;

use std::sync::Arc;

use knowdb_core::config::{EmbeddingBackend, EmbeddingSettings};
use knowdb_core::traits::Embedder;
use knowdb_core::Result;

pub use hashing::HashingEmbedder;
pub use openai::OpenAiEmbedder;

pub fn get_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>> {
    match settings.backend {
        EmbeddingBackend::Hashing => {
            tracing::info!(dim = settings.dimensions, "using hashing embedder");
            Ok(Arc::new(HashingEmbedder::new(settings.dimensions, settings.max_input_chars)))
        }
        EmbeddingBackend::OpenAi => {
            tracing::info!(model = %settings.model, dim = settings.dimensions, "using OpenAI-compatible embedder");
            Ok(Arc::new(OpenAiEmbedder::from_settings(settings)?))
        }
    }
}
