use async_trait::async_trait;

use knowdb_core::traits::TextIndexer;
use knowdb_core::types::{Chunk, ChunkMeta, Scope, SearchHit};
use knowdb_core::Result;

/// Stand-in used when no full-text engine is compiled in.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledIndexer;

#[async_trait]
impl TextIndexer for DisabledIndexer {
	async fn upsert(&self, _meta: &ChunkMeta, _chunks: &[Chunk]) -> Result<()> {
		Ok(())
	}

	async fn query(&self, query: &str, _k: usize, _scope: &Scope) -> Result<Vec<SearchHit>> {
		tracing::warn!(query, "keyword search requested but the full-text engine is not available");
		Ok(Vec::new())
	}

	async fn delete_document(&self, _document_id: &str) -> Result<()> {
		Ok(())
	}

	async fn reassign(&self, _meta: &ChunkMeta, _chunks: &[Chunk]) -> Result<()> {
		Ok(())
	}

	async fn clear(&self) -> Result<()> {
		Ok(())
	}
}
