//! Keyword, semantic and hybrid retrieval over the two indexes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use knowdb_core::config::SearchSettings;
use knowdb_core::traits::{TextIndexer, VectorIndexer};
use knowdb_core::types::{Scope, SearchHit, SearchMode, SearchResponse, SearchResult};
use knowdb_core::{Error, Result};
use knowdb_vector::DocumentStore;

use crate::fusion::{self, Candidate};
use crate::ingest::EmbeddingPipeline;

pub struct RetrievalCoordinator {
    text: Arc<dyn TextIndexer>,
    vector: Arc<dyn VectorIndexer>,
    embeddings: Arc<EmbeddingPipeline>,
    documents: DocumentStore,
    settings: SearchSettings,
}

impl RetrievalCoordinator {
    pub fn new(
        text: Arc<dyn TextIndexer>,
        vector: Arc<dyn VectorIndexer>,
        embeddings: Arc<EmbeddingPipeline>,
        documents: DocumentStore,
        settings: SearchSettings,
    ) -> Self {
        Self { text, vector, embeddings, documents, settings }
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.settings.timeout_ms)
    }

    async fn keyword_branch(&self, query: &str, k: usize, scope: &Scope) -> Result<Vec<SearchHit>> {
        match tokio::time::timeout(self.timeout(), self.text.query(query, k, scope)).await {
            Ok(res) => res,
            Err(_) => Err(Error::IndexUnavailable(format!("keyword search timed out after {} ms", self.settings.timeout_ms))),
        }
    }

    async fn semantic_branch(&self, query: &str, k: usize, scope: &Scope) -> Result<Vec<SearchHit>> {
        let work = async {
            let vector = self.embeddings.embed_query(query).await?;
            self.vector.query(&vector, k, scope).await
        };
        match tokio::time::timeout(self.timeout(), work).await {
            Ok(res) => res,
            Err(_) => Err(Error::IndexUnavailable(format!("semantic search timed out after {} ms", self.settings.timeout_ms))),
        }
    }

    pub async fn search(&self, query: &str, mode: SearchMode, top_k: usize, scope: &Scope) -> Result<SearchResponse> {
        let query = query.trim();
        if query.is_empty() || top_k == 0 {
            return Ok(SearchResponse::default());
        }
        let started = Instant::now();
        let mut response = SearchResponse::default();

        let candidates = match mode {
            SearchMode::Keyword => fusion::single(&self.keyword_branch(query, top_k, scope).await?),
            SearchMode::Semantic => fusion::single(&self.semantic_branch(query, top_k, scope).await?),
            SearchMode::Hybrid => {
                let (keyword, semantic) =
                    tokio::join!(self.keyword_branch(query, top_k, scope), self.semantic_branch(query, top_k, scope));
                match (keyword, semantic) {
                    (Ok(kw), Ok(sem)) => fusion::fuse(&kw, &sem, &self.settings.fusion),
                    (Ok(kw), Err(e)) => {
                        tracing::warn!(error = %e, "semantic branch failed; returning keyword results only");
                        response.partial = true;
                        response.warnings.push(format!("semantic search unavailable: {}", e));
                        fusion::single(&kw)
                    }
                    (Err(e), Ok(sem)) => {
                        tracing::warn!(error = %e, "keyword branch failed; returning semantic results only");
                        response.partial = true;
                        response.warnings.push(format!("keyword search unavailable: {}", e));
                        fusion::single(&sem)
                    }
                    (Err(e), Err(other)) => {
                        tracing::error!(keyword = %e, semantic = %other, "both retrieval branches failed");
                        return Err(e);
                    }
                }
            }
        };

        let kept: Vec<Candidate> = candidates
            .into_iter()
            .filter(|c| c.relevance >= self.settings.min_relevance)
            .take(top_k)
            .collect();
        response.results = self.enrich(kept).await?;
        tracing::debug!(
            %mode,
            results = response.results.len(),
            partial = response.partial,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "search finished"
        );
        Ok(response)
    }

    async fn enrich(&self, candidates: Vec<Candidate>) -> Result<Vec<SearchResult>> {
        let mut ids: Vec<String> = candidates.iter().map(|c| c.document_id.clone()).collect();
        ids.sort();
        ids.dedup();
        let docs = self.documents.get_many(&ids).await?;
        let mut out = Vec::with_capacity(candidates.len());
        for c in candidates {
            let Some(doc) = docs.get(&c.document_id) else {
                tracing::debug!(chunk_id = %c.id, "dropping hit without a document row");
                continue;
            };
            out.push(SearchResult {
                chunk_id: c.id,
                document_id: c.document_id,
                filename: doc.filename.clone(),
                category_id: doc.category_id.clone(),
                topic_id: doc.topic_id.clone(),
                text: c.text,
                ingested_at: c.ingested_at,
                score: c.score,
                relevance: c.relevance,
                keyword_score: c.keyword_score,
                semantic_score: c.semantic_score,
            });
        }
        Ok(out)
    }
}
