//! Embedding of a document's chunks: cache lookup, batched provider calls with
//! bounded concurrency, dimension checks and cache write-through.

use std::sync::Arc;

use futures::{stream, StreamExt, TryStreamExt};

use knowdb_core::config::EmbeddingSettings;
use knowdb_core::traits::Embedder;
use knowdb_core::types::Chunk;
use knowdb_core::{Error, Result};
use knowdb_vector::{content_hash, CacheEntry, EmbeddingCache};

pub struct EmbeddingPipeline {
    embedder: Arc<dyn Embedder>,
    cache: Option<EmbeddingCache>,
    batch_size: usize,
    max_concurrency: usize,
}

impl EmbeddingPipeline {
    pub fn new(embedder: Arc<dyn Embedder>, cache: Option<EmbeddingCache>, settings: &EmbeddingSettings) -> Self {
        Self {
            embedder,
            cache,
            batch_size: settings.batch_size.max(1),
            max_concurrency: settings.max_concurrency.max(1),
        }
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Fills `embedding` on every chunk, in order.
    ///
    /// Fails with `Embedding { chunk, .. }` naming the first failing chunk
    /// ordinal, or `DimensionMismatch` naming the first chunk whose vector has the
    /// wrong length. On
    /// error no chunk is modified.
    pub async fn embed_chunks(&self, chunks: &mut [Chunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let dim = self.embedder.dim();
        let embedder_id = self.embedder.id();
        let hashes: Vec<String> = chunks.iter().map(|c| content_hash(&c.text)).collect();

        let cached = match &self.cache {
            Some(cache) => match cache.get_many(&embedder_id, &hashes).await {
                Ok(hit) => hit,
                Err(e) => {
                    tracing::warn!(error = %e, "embedding cache lookup failed; embedding everything");
                    Default::default()
                }
            },
            None => Default::default(),
        };

        let misses: Vec<usize> = (0..chunks.len()).filter(|&i| !cached.contains_key(&hashes[i])).collect();
        tracing::debug!(chunks = chunks.len(), cached = chunks.len() - misses.len(), "embedding chunks");

        let batches: Vec<Vec<usize>> = misses.chunks(self.batch_size).map(<[usize]>::to_vec).collect();
        let embedder = &self.embedder;
        let chunks_ref: &[Chunk] = chunks;
        let fresh: Vec<(Vec<usize>, Vec<Vec<f32>>)> = stream::iter(batches)
            .map(|batch| async move {
                let texts: Vec<String> = batch.iter().map(|&i| chunks_ref[i].text.clone()).collect();
                let first = chunks_ref[batch[0]].ordinal;
                let vectors = embedder
                    .embed_batch(&texts)
                    .await
                    .map_err(|e| Error::Embedding { chunk: first, reason: e.to_string() })?;
                if vectors.len() != texts.len() {
                    let failing = chunks_ref[batch[vectors.len().min(batch.len() - 1)]].ordinal;
                    return Err(Error::Embedding {
                        chunk: failing,
                        reason: format!("provider returned {} vectors for {} inputs", vectors.len(), texts.len()),
                    });
                }
                if let Some(p) = vectors.iter().position(|v| v.len() != dim) {
                    let ordinal = chunks_ref[batch[p]].ordinal;
                    let actual = vectors[p].len();
                    tracing::warn!(chunk = ordinal, expected = dim, actual, "embedding has the wrong dimension");
                    return Err(Error::DimensionMismatch { expected: dim, actual, chunk: Some(ordinal) });
                }
                Ok((batch, vectors))
            })
            .buffered(self.max_concurrency)
            .try_collect()
            .await?;

        let mut new_entries = Vec::new();
        for (i, c) in chunks.iter_mut().enumerate() {
            if let Some(v) = cached.get(&hashes[i]) {
                c.embedding = v.clone();
            }
        }
        for (batch, vectors) in fresh {
            for (i, v) in batch.into_iter().zip(vectors) {
                new_entries.push(CacheEntry { content_hash: hashes[i].clone(), embedder_id: embedder_id.clone(), vector: v.clone() });
                chunks[i].embedding = v;
            }
        }

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.put_many(&new_entries).await {
                tracing::warn!(error = %e, "embedding cache write failed");
            }
        }
        Ok(())
    }

    /// Embeds a search query.
    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embedder.embed_batch(&[query.to_string()]).await?;
        let v = vectors.pop().ok_or_else(|| Error::Operation("embedder returned no vector for the query".into()))?;
        if v.len() != self.embedder.dim() {
            return Err(Error::dimension(self.embedder.dim(), v.len()));
        }
        Ok(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Encodes the first character of each text; fails on texts starting with '!'.
    struct CountingEmbedder {
        calls: AtomicUsize,
        dim: usize,
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        fn id(&self) -> String {
            "counting".into()
        }
        fn dim(&self) -> usize {
            self.dim
        }
        fn max_input_chars(&self) -> usize {
            100
        }
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if texts.iter().any(|t| t.starts_with('!')) {
                return Err(Error::Operation("provider rejected input".into()));
            }
            Ok(texts.iter().map(|t| vec![t.chars().next().map_or(0.0, |c| c as u32 as f32); 2]).collect())
        }
    }

    fn chunks(texts: &[&str]) -> Vec<Chunk> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| Chunk {
                id: Chunk::make_id("d", i),
                document_id: "d".into(),
                ordinal: i,
                start: 0,
                end: t.len(),
                text: t.to_string(),
                embedding: Vec::new(),
            })
            .collect()
    }

    fn pipeline(batch_size: usize) -> (Arc<CountingEmbedder>, EmbeddingPipeline) {
        let embedder = Arc::new(CountingEmbedder { calls: AtomicUsize::new(0), dim: 2 });
        let settings = EmbeddingSettings { batch_size, max_concurrency: 2, ..Default::default() };
        let p = EmbeddingPipeline::new(embedder.clone(), None, &settings);
        (embedder, p)
    }

    #[tokio::test]
    async fn batches_keep_input_order() {
        let (embedder, p) = pipeline(2);
        let mut cs = chunks(&["a", "b", "c", "d", "e"]);
        p.embed_chunks(&mut cs).await.unwrap();
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
        let firsts: Vec<f32> = cs.iter().map(|c| c.embedding[0]).collect();
        assert_eq!(firsts, vec![97.0, 98.0, 99.0, 100.0, 101.0]);
    }

    #[tokio::test]
    async fn failing_batch_names_its_first_chunk_and_leaves_chunks_untouched() {
        let (_, p) = pipeline(2);
        let mut cs = chunks(&["a", "b", "c", "!d", "e"]);
        let err = p.embed_chunks(&mut cs).await.unwrap_err();
        assert!(matches!(err, Error::Embedding { chunk: 2, .. }));
        assert!(cs.iter().all(|c| c.embedding.is_empty()));
    }

    #[tokio::test]
    async fn query_vectors_are_dimension_checked() {
        let embedder = Arc::new(CountingEmbedder { calls: AtomicUsize::new(0), dim: 3 });
        let p = EmbeddingPipeline::new(embedder, None, &EmbeddingSettings::default());
        let err = p.embed_query("hello").await.unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 3, actual: 2, chunk: None }));
    }
}
