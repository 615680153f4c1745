//! Lance-backed embedding cache keyed by `(content_hash, embedder_id)`.
//!
//! The cache is consulted prior to calling a provider and written through on
//! cache misses, so re-ingesting unchanged text costs no provider calls.
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use arrow_array::cast::AsArray;
use arrow_array::types::Float32Type;
use arrow_array::{Array, FixedSizeListArray, RecordBatch, StringArray, TimestampMillisecondArray};

use knowdb_core::{Error, Result};

use crate::schema::{cache_schema, EMBEDDING_CACHE};
use crate::storage::Storage;
use crate::table::{in_list, now_millis, quote, reader, scan, str_col};

pub fn content_hash(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub content_hash: String,
    pub embedder_id: String,
    pub vector: Vec<f32>,
}

#[derive(Clone)]
pub struct EmbeddingCache {
    storage: Storage,
}

impl EmbeddingCache {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Cached vectors for `hashes`, keyed by hash. Entries of the wrong length are ignored.
    pub async fn get_many(&self, embedder_id: &str, hashes: &[String]) -> Result<HashMap<String, Vec<f32>>> {
        if hashes.is_empty() {
            return Ok(HashMap::new());
        }
        let table = self.storage.table(EMBEDDING_CACHE).await?;
        let filter = format!("embedder_id = {} AND content_hash IN ({})", quote(embedder_id), in_list(hashes));
        let mut out = HashMap::new();
        for batch in scan(&table, Some(&filter)).await? {
            let hash_col = str_col(&batch, "content_hash")?;
            let vec_col = batch
                .column_by_name("vector")
                .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
                .ok_or_else(|| Error::Operation("embedding_cache.vector column missing".into()))?;
            for i in 0..batch.num_rows() {
                if !vec_col.is_valid(i) {
                    continue;
                }
                let vals = vec_col.value(i).as_primitive::<Float32Type>().values().to_vec();
                if vals.len() == self.storage.dim() {
                    out.insert(hash_col.value(i).to_string(), vals);
                }
            }
        }
        Ok(out)
    }

    pub async fn put_many(&self, entries: &[CacheEntry]) -> Result<()> {
        let dim = self.storage.dim();
        let mut seen = HashSet::new();
        // merge_insert rejects duplicate source keys
        let entries: Vec<&CacheEntry> = entries
            .iter()
            .filter(|e| e.vector.len() == dim)
            .filter(|e| seen.insert((e.content_hash.as_str(), e.embedder_id.as_str())))
            .collect();
        if entries.is_empty() {
            return Ok(());
        }
        let now = now_millis();
        let batch = RecordBatch::try_new(
            cache_schema(dim),
            vec![
                Arc::new(StringArray::from_iter_values(entries.iter().map(|e| e.content_hash.as_str()))),
                Arc::new(StringArray::from_iter_values(entries.iter().map(|e| e.embedder_id.as_str()))),
                Arc::new(TimestampMillisecondArray::from(vec![now; entries.len()])),
                Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(
                    entries.iter().map(|e| Some(e.vector.iter().copied().map(Some).collect::<Vec<_>>())),
                    dim as i32,
                )),
            ],
        )
        .map_err(Error::operation)?;
        let table = self.storage.table(EMBEDDING_CACHE).await?;
        let mut mi = table.merge_insert(&["content_hash", "embedder_id"]);
        mi.when_matched_update_all(None).when_not_matched_insert_all();
        mi.execute(reader(batch)).await.map_err(Error::operation)?;
        Ok(())
    }

    pub async fn clear(&self) -> Result<()> {
        self.storage.truncate(EMBEDDING_CACHE).await
    }
}
