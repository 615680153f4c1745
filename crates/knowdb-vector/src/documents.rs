//! Document rows (`documents` table): the converted text plus its placement.

use std::collections::HashMap;
use std::sync::Arc;

use arrow_array::{Int64Array, RecordBatch, StringArray};

use knowdb_core::types::{Document, Scope};
use knowdb_core::{Error, Result};

use crate::index::scope_filter;
use crate::schema::{documents_schema, DOCUMENTS};
use crate::storage::Storage;
use crate::table::{i64_col, in_list, quote, reader, scan, str_col};

#[derive(Clone)]
pub struct DocumentStore {
    storage: Storage,
}

impl DocumentStore {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    pub async fn save(&self, doc: &Document) -> Result<String> {
        let batch = RecordBatch::try_new(
            documents_schema(),
            vec![
                Arc::new(StringArray::from(vec![doc.id.as_str()])),
                Arc::new(StringArray::from(vec![doc.filename.as_str()])),
                Arc::new(StringArray::from(vec![doc.category_id.as_str()])),
                Arc::new(StringArray::from(vec![doc.topic_id.as_str()])),
                Arc::new(StringArray::from(vec![doc.text.as_str()])),
                Arc::new(Int64Array::from(vec![doc.ingested_at])),
                Arc::new(Int64Array::from(vec![doc.chunk_count as i64])),
            ],
        )
        .map_err(Error::operation)?;
        let table = self.storage.table(DOCUMENTS).await?;
        let mut mi = table.merge_insert(&["id"]);
        mi.when_matched_update_all(None).when_not_matched_insert_all();
        mi.execute(reader(batch)).await.map_err(Error::operation)?;
        tracing::debug!(document_id = %doc.id, filename = %doc.filename, "saved document row");
        Ok(doc.id.clone())
    }

    pub async fn get(&self, id: &str) -> Result<Document> {
        self.find(id).await?.ok_or_else(|| Error::NotFound(format!("document {}", id)))
    }

    pub async fn find(&self, id: &str) -> Result<Option<Document>> {
        Ok(self.select(Some(format!("id = {}", quote(id)))).await?.into_iter().next())
    }

    /// Documents keyed by id; unknown ids are skipped.
    pub async fn get_many(&self, ids: &[String]) -> Result<HashMap<String, Document>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let docs = self.select(Some(format!("id IN ({})", in_list(ids)))).await?;
        Ok(docs.into_iter().map(|d| (d.id.clone(), d)).collect())
    }

    /// Newest first.
    pub async fn list(&self, scope: &Scope) -> Result<Vec<Document>> {
        let mut docs = self.select(scope_filter(scope)).await?;
        docs.sort_by(|a, b| b.ingested_at.cmp(&a.ingested_at).then_with(|| a.filename.cmp(&b.filename)));
        Ok(docs)
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        let table = self.storage.table(DOCUMENTS).await?;
        table.delete(&format!("id = {}", quote(id))).await.map_err(Error::operation)?;
        Ok(())
    }

    pub async fn reassign(&self, id: &str, category_id: &str, topic_id: &str) -> Result<()> {
        let table = self.storage.table(DOCUMENTS).await?;
        table
            .update()
            .only_if(format!("id = {}", quote(id)))
            .column("category_id", quote(category_id))
            .column("topic_id", quote(topic_id))
            .execute()
            .await
            .map_err(Error::operation)?;
        Ok(())
    }

    pub async fn count(&self) -> Result<usize> {
        let table = self.storage.table(DOCUMENTS).await?;
        table.count_rows(None).await.map_err(Error::unavailable)
    }

    pub async fn clear(&self) -> Result<()> {
        self.storage.truncate(DOCUMENTS).await
    }

    async fn select(&self, filter: Option<String>) -> Result<Vec<Document>> {
        let table = self.storage.table(DOCUMENTS).await?;
        let mut out = Vec::new();
        for batch in scan(&table, filter.as_deref()).await? {
            let ids = str_col(&batch, "id")?;
            let filenames = str_col(&batch, "filename")?;
            let categories = str_col(&batch, "category_id")?;
            let topics = str_col(&batch, "topic_id")?;
            let texts = str_col(&batch, "text")?;
            let ingested = i64_col(&batch, "ingested_at")?;
            let counts = i64_col(&batch, "chunk_count")?;
            for i in 0..batch.num_rows() {
                out.push(Document {
                    id: ids.value(i).to_string(),
                    filename: filenames.value(i).to_string(),
                    category_id: categories.value(i).to_string(),
                    topic_id: topics.value(i).to_string(),
                    text: texts.value(i).to_string(),
                    ingested_at: ingested.value(i),
                    chunk_count: counts.value(i) as usize,
                });
            }
        }
        Ok(out)
    }
}
