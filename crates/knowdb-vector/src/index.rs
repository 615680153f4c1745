use std::sync::Arc;

use arrow_array::cast::AsArray;
use arrow_array::types::Float32Type;
use arrow_array::{Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, StringArray};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::DistanceType;

use knowdb_core::traits::VectorIndexer;
use knowdb_core::types::{Chunk, ChunkMeta, Scope, SearchHit, SourceKind};
use knowdb_core::{Error, Result};

use crate::schema::{chunks_schema, CHUNKS};
use crate::storage::Storage;
use crate::table::{i64_col, quote, reader, scan, str_col};

/// Once `optimize` has built the IVF_PQ index, this many times `k` candidates
/// are re-scored with exact cosine distance. Exhaustive search ignores it.
pub const REFINE_FACTOR: u32 = 10;

/// Chunk vectors plus scope metadata in the `chunks` table; cosine ranking.
#[derive(Clone)]
pub struct LanceVectorIndex {
    storage: Storage,
}

pub fn scope_filter(scope: &Scope) -> Option<String> {
    match scope {
        Scope::All => None,
        Scope::Category(id) => Some(format!("category_id = {}", quote(id))),
        Scope::Topic(id) => Some(format!("topic_id = {}", quote(id))),
    }
}

impl LanceVectorIndex {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    fn to_record_batch(&self, meta: &ChunkMeta, chunks: &[Chunk]) -> Result<RecordBatch> {
        let dim = self.storage.dim();
        for c in chunks {
            if c.embedding.len() != dim {
                return Err(Error::DimensionMismatch { expected: dim, actual: c.embedding.len(), chunk: Some(c.ordinal) });
            }
        }
        let n = chunks.len();
        let vectors = FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(
            chunks.iter().map(|c| Some(c.embedding.iter().copied().map(Some).collect::<Vec<_>>())),
            dim as i32,
        );
        RecordBatch::try_new(
            chunks_schema(dim),
            vec![
                Arc::new(StringArray::from_iter_values(chunks.iter().map(|c| c.id.as_str()))),
                Arc::new(StringArray::from(vec![meta.document_id.as_str(); n])),
                Arc::new(Int64Array::from_iter_values(chunks.iter().map(|c| c.ordinal as i64))),
                Arc::new(Int64Array::from_iter_values(chunks.iter().map(|c| c.start as i64))),
                Arc::new(Int64Array::from_iter_values(chunks.iter().map(|c| c.end as i64))),
                Arc::new(StringArray::from_iter_values(chunks.iter().map(|c| c.text.as_str()))),
                Arc::new(StringArray::from(vec![meta.category_id.as_str(); n])),
                Arc::new(StringArray::from(vec![meta.topic_id.as_str(); n])),
                Arc::new(Int64Array::from(vec![meta.ingested_at; n])),
                Arc::new(vectors),
            ],
        )
        .map_err(Error::operation)
    }

    /// All chunks of a document, ordered by ordinal.
    pub async fn chunks_of(&self, document_id: &str) -> Result<Vec<Chunk>> {
        let table = self.storage.table(CHUNKS).await?;
        let batches = scan(&table, Some(&format!("document_id = {}", quote(document_id)))).await?;
        let mut out = Vec::new();
        for batch in &batches {
            out.extend(decode_chunks(batch)?);
        }
        out.sort_by_key(|c| c.ordinal);
        Ok(out)
    }

    pub async fn count_for(&self, scope: &Scope) -> Result<usize> {
        let table = self.storage.table(CHUNKS).await?;
        table.count_rows(scope_filter(scope)).await.map_err(Error::unavailable)
    }
}

fn decode_chunks(batch: &RecordBatch) -> Result<Vec<Chunk>> {
    let ids = str_col(batch, "id")?;
    let doc_ids = str_col(batch, "document_id")?;
    let ordinals = i64_col(batch, "ordinal")?;
    let starts = i64_col(batch, "start_offset")?;
    let ends = i64_col(batch, "end_offset")?;
    let texts = str_col(batch, "text")?;
    let vectors = batch
        .column_by_name("vector")
        .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
        .ok_or_else(|| Error::Operation("chunks.vector column missing".into()))?;
    Ok((0..batch.num_rows())
        .map(|i| Chunk {
            id: ids.value(i).to_string(),
            document_id: doc_ids.value(i).to_string(),
            ordinal: ordinals.value(i) as usize,
            start: starts.value(i) as usize,
            end: ends.value(i) as usize,
            text: texts.value(i).to_string(),
            embedding: if vectors.is_valid(i) {
                vectors.value(i).as_primitive::<Float32Type>().values().to_vec()
            } else {
                Vec::new()
            },
        })
        .collect())
}

#[async_trait]
impl VectorIndexer for LanceVectorIndex {
    async fn upsert(&self, meta: &ChunkMeta, chunks: &[Chunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let batch = self.to_record_batch(meta, chunks)?;
        let table = self.storage.table(CHUNKS).await?;
        let mut mi = table.merge_insert(&["id"]);
        mi.when_matched_update_all(None).when_not_matched_insert_all();
        mi.execute(reader(batch)).await.map_err(Error::operation)?;
        tracing::debug!(document_id = %meta.document_id, chunks = chunks.len(), "upserted chunk vectors");
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize, scope: &Scope) -> Result<Vec<SearchHit>> {
        let dim = self.storage.dim();
        if vector.len() != dim {
            return Err(Error::dimension(dim, vector.len()));
        }
        if k == 0 || self.count_for(scope).await? == 0 {
            return Ok(Vec::new());
        }
        let table = self.storage.table(CHUNKS).await?;
        let mut q = table
            .vector_search(vector.to_vec())
            .map_err(Error::operation)?
            .distance_type(DistanceType::Cosine)
            .limit(k)
            .refine_factor(REFINE_FACTOR);
        if let Some(f) = scope_filter(scope) {
            // prefilter: applied before the nearest-neighbour ranking
            q = q.only_if(f);
        }
        let batches: Vec<RecordBatch> = q
            .execute()
            .await
            .map_err(Error::unavailable)?
            .try_collect()
            .await
            .map_err(Error::operation)?;

        let mut hits = Vec::new();
        for batch in &batches {
            let ids = str_col(batch, "id")?;
            let doc_ids = str_col(batch, "document_id")?;
            let texts = str_col(batch, "text")?;
            let ingested = i64_col(batch, "ingested_at")?;
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>());
            for i in 0..batch.num_rows() {
                let distance = distances.map(|d| d.value(i)).unwrap_or(1.0);
                hits.push(SearchHit {
                    id: ids.value(i).to_string(),
                    document_id: doc_ids.value(i).to_string(),
                    text: texts.value(i).to_string(),
                    ingested_at: ingested.value(i),
                    score: 1.0 - distance,
                    source: SourceKind::Vector,
                });
            }
        }
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        Ok(hits)
    }

    async fn delete_document(&self, document_id: &str) -> Result<()> {
        let table = self.storage.table(CHUNKS).await?;
        table
            .delete(&format!("document_id = {}", quote(document_id)))
            .await
            .map_err(Error::operation)?;
        Ok(())
    }

    async fn reassign(&self, meta: &ChunkMeta) -> Result<()> {
        let table = self.storage.table(CHUNKS).await?;
        table
            .update()
            .only_if(format!("document_id = {}", quote(&meta.document_id)))
            .column("topic_id", quote(&meta.topic_id))
            .column("category_id", quote(&meta.category_id))
            .execute()
            .await
            .map_err(Error::operation)?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.storage.truncate(CHUNKS).await
    }

    async fn count(&self) -> Result<usize> {
        self.count_for(&Scope::All).await
    }
}
