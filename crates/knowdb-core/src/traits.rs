use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Chunk, ChunkMeta, Scope, SearchHit};

/// Turns text into fixed-length vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Stable identifier used to key the embedding cache (backend + model + dim).
    fn id(&self) -> String;
    fn dim(&self) -> usize;
    fn max_input_chars(&self) -> usize;
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

#[async_trait]
pub trait TextIndexer: Send + Sync {
    async fn upsert(&self, meta: &ChunkMeta, chunks: &[Chunk]) -> Result<()>;
    async fn query(&self, query: &str, k: usize, scope: &Scope) -> Result<Vec<SearchHit>>;
    async fn delete_document(&self, document_id: &str) -> Result<()>;
    /// Rewrites scope metadata for every chunk of a document.
    async fn reassign(&self, meta: &ChunkMeta, chunks: &[Chunk]) -> Result<()>;
    async fn clear(&self) -> Result<()>;
}

#[async_trait]
pub trait VectorIndexer: Send + Sync {
    async fn upsert(&self, meta: &ChunkMeta, chunks: &[Chunk]) -> Result<()>;
    async fn query(&self, vector: &[f32], k: usize, scope: &Scope) -> Result<Vec<SearchHit>>;
    async fn delete_document(&self, document_id: &str) -> Result<()>;
    async fn reassign(&self, meta: &ChunkMeta) -> Result<()>;
    async fn clear(&self) -> Result<()>;
    async fn count(&self) -> Result<usize>;
}
