use std::sync::Arc;

use arrow_array::{Int64Array, RecordBatch, StringArray};

use knowdb_core::types::{Note, NoteLink};
use knowdb_core::{Error, Result};

use crate::schema::{notes_schema, NOTES};
use crate::storage::Storage;
use crate::table::{i64_col, opt_str, quote, reader, scan, str_col};

#[derive(Clone)]
pub struct NoteStore {
    storage: Storage,
}

fn link_filter(link: &NoteLink) -> String {
    format!("link_kind = {} AND link_id = {}", quote(link.kind()), quote(link.target()))
}

impl NoteStore {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Inserts or replaces the row with `note.id`.
    pub async fn put(&self, note: &Note) -> Result<()> {
        let tags = serde_json::to_string(&note.tags).map_err(Error::operation)?;
        let batch = RecordBatch::try_new(
            notes_schema(),
            vec![
                Arc::new(StringArray::from(vec![note.id.as_str()])),
                Arc::new(StringArray::from(vec![note.title.as_str()])),
                Arc::new(StringArray::from(vec![note.content.as_str()])),
                Arc::new(StringArray::from(vec![tags.as_str()])),
                Arc::new(StringArray::from(vec![note.link.as_ref().map(NoteLink::kind)])),
                Arc::new(StringArray::from(vec![note.link.as_ref().map(NoteLink::target)])),
                Arc::new(Int64Array::from(vec![note.created_at])),
                Arc::new(Int64Array::from(vec![note.updated_at])),
            ],
        )
        .map_err(Error::operation)?;
        let table = self.storage.table(NOTES).await?;
        let mut mi = table.merge_insert(&["id"]);
        mi.when_matched_update_all(None).when_not_matched_insert_all();
        mi.execute(reader(batch)).await.map_err(Error::operation)?;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Note> {
        self.select(Some(format!("id = {}", quote(id))))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("note {}", id)))
    }

    /// Most recently updated first; optionally only notes linked to `link`.
    pub async fn list(&self, link: Option<&NoteLink>) -> Result<Vec<Note>> {
        let mut notes = self.select(link.map(link_filter)).await?;
        notes.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
        Ok(notes)
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        let table = self.storage.table(NOTES).await?;
        table.delete(&format!("id = {}", quote(id))).await.map_err(Error::operation)?;
        Ok(())
    }

    /// Detaches every note linked to `link`; the notes themselves stay.
    pub async fn clear_links(&self, link: &NoteLink) -> Result<usize> {
        let linked = self.select(Some(link_filter(link))).await?;
        for mut note in linked.iter().cloned() {
            note.link = None;
            self.put(&note).await?;
        }
        if !linked.is_empty() {
            tracing::debug!(kind = link.kind(), target = link.target(), notes = linked.len(), "cleared note links");
        }
        Ok(linked.len())
    }

    pub async fn count(&self) -> Result<usize> {
        let table = self.storage.table(NOTES).await?;
        table.count_rows(None).await.map_err(Error::unavailable)
    }

    pub async fn clear(&self) -> Result<()> {
        self.storage.truncate(NOTES).await
    }

    async fn select(&self, filter: Option<String>) -> Result<Vec<Note>> {
        let table = self.storage.table(NOTES).await?;
        let mut out = Vec::new();
        for batch in scan(&table, filter.as_deref()).await? {
            let ids = str_col(&batch, "id")?;
            let titles = str_col(&batch, "title")?;
            let contents = str_col(&batch, "content")?;
            let tags = str_col(&batch, "tags")?;
            let kinds = str_col(&batch, "link_kind")?;
            let targets = str_col(&batch, "link_id")?;
            let created = i64_col(&batch, "created_at")?;
            let updated = i64_col(&batch, "updated_at")?;
            for i in 0..batch.num_rows() {
                let link = match (opt_str(kinds, i), opt_str(targets, i)) {
                    (Some(kind), Some(target)) => NoteLink::from_parts(&kind, &target),
                    _ => None,
                };
                out.push(Note {
                    id: ids.value(i).to_string(),
                    title: titles.value(i).to_string(),
                    content: contents.value(i).to_string(),
                    tags: serde_json::from_str(tags.value(i)).unwrap_or_default(),
                    link,
                    created_at: created.value(i),
                    updated_at: updated.value(i),
                });
            }
        }
        Ok(out)
    }
}
