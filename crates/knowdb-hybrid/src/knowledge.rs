//! The knowledge service: one owned handle over the document store, both
//! indexes, the hierarchy and notes.
//!
//! Reads and searches hold the shared side of the gate; anything that changes
//! what a search can see (ingest commit, delete, move, hierarchy and note
//! mutations, reset) holds the exclusive side. The gate is not reentrant, so
//! cascades call the `*_locked` helpers.

use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use knowdb_core::chunker::Chunker;
use knowdb_core::config::Settings;
use knowdb_core::notes::{derive_tags, derive_title};
use knowdb_core::traits::{Embedder, TextIndexer, VectorIndexer};
use knowdb_core::types::{
    Category, CategoryNode, Chunk, ChunkMeta, Document, Note, NoteLink, Scope, SearchMode, SearchResponse, Stats,
    Topic, TopicNode,
};
use knowdb_core::{Error, Result};
use knowdb_vector::{
    optimize, DocumentStore, EmbeddingCache, HierarchyStore, LanceVectorIndex, NoteStore, OptimizeOutcome, Storage,
};

use crate::coordinator::RetrievalCoordinator;
use crate::ingest::EmbeddingPipeline;

pub const SAMPLE_CATEGORIES: [(&str, &str); 2] =
    [("Work", "Work-related documents"), ("Personal", "Personal documents")];

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub struct KnowledgeBase {
    settings: Settings,
    storage: Storage,
    chunker: Chunker,
    embeddings: Arc<EmbeddingPipeline>,
    text: Arc<dyn TextIndexer>,
    vector: LanceVectorIndex,
    documents: DocumentStore,
    hierarchy: HierarchyStore,
    notes: NoteStore,
    cache: EmbeddingCache,
    coordinator: RetrievalCoordinator,
    gate: RwLock<()>,
}

impl KnowledgeBase {
    /// Opens the store under `settings.storage.path` with the configured embedder.
    pub async fn open(settings: Settings) -> Result<Self> {
        let embedder = knowdb_embed::get_embedder(&settings.embedding)?;
        Self::open_with_embedder(settings, embedder).await
    }

    pub async fn open_with_embedder(settings: Settings, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let text = knowdb_text::open_keyword_index(&settings.tantivy_dir())?;
        Self::open_with_parts(settings, embedder, text).await
    }

    /// Opens the store with an explicit keyword index.
    pub async fn open_with_parts(
        settings: Settings,
        embedder: Arc<dyn Embedder>,
        text: Arc<dyn TextIndexer>,
    ) -> Result<Self> {
        settings.validate()?;
        let chunker = Chunker::from_settings(&settings.chunking)?;
        let storage = Storage::open(&settings.lancedb_dir(), embedder.dim()).await?;

        let cache = EmbeddingCache::new(storage.clone());
        let embeddings = Arc::new(EmbeddingPipeline::new(
            embedder,
            settings.embedding.cache.then(|| cache.clone()),
            &settings.embedding,
        ));
        let vector = LanceVectorIndex::new(storage.clone());
        let documents = DocumentStore::new(storage.clone());
        let coordinator = RetrievalCoordinator::new(
            text.clone(),
            Arc::new(vector.clone()),
            embeddings.clone(),
            documents.clone(),
            settings.search.clone(),
        );

        tracing::info!(path = %settings.storage.path.display(), embedder = %embeddings.embedder().id(), "knowledge base ready");
        Ok(Self {
            hierarchy: HierarchyStore::new(storage.clone()),
            notes: NoteStore::new(storage.clone()),
            settings,
            storage,
            chunker,
            embeddings,
            text,
            vector,
            documents,
            cache,
            coordinator,
            gate: RwLock::new(()),
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Seeds the sample categories into an empty store. Returns what was created.
    pub async fn init(&self, seed: bool) -> Result<Vec<Category>> {
        let _guard = self.gate.write().await;
        if !seed || self.hierarchy.count_categories().await? > 0 {
            return Ok(Vec::new());
        }
        let mut created = Vec::new();
        for (name, description) in SAMPLE_CATEGORIES {
            created.push(self.hierarchy.create_category(name, description).await?);
        }
        tracing::info!(categories = created.len(), "seeded sample categories");
        Ok(created)
    }

    // ---- documents ----

    /// Chunks, embeds and commits `text` as a new document in `topic_id`.
    ///
    /// Embedding runs before the gate is taken. On any failure nothing for the
    /// document stays persisted.
    pub async fn ingest(&self, filename: &str, text: &str, topic_id: &str) -> Result<Document> {
        let filename = filename.trim();
        if filename.is_empty() {
            return Err(Error::InvalidInput("filename must not be empty".into()));
        }
        self.hierarchy.get_topic(topic_id).await?;

        let id = Uuid::new_v4().to_string();
        let mut chunks = self.chunker.chunk(&id, text)?;
        self.embeddings.embed_chunks(&mut chunks).await?;

        let _guard = self.gate.write().await;
        // the topic may have been deleted while embedding
        let topic = self.hierarchy.get_topic(topic_id).await?;
        let doc = Document {
            id,
            filename: filename.to_string(),
            category_id: topic.category_id,
            topic_id: topic.id,
            text: text.to_string(),
            ingested_at: now_millis(),
            chunk_count: chunks.len(),
        };
        let meta = ChunkMeta::for_document(&doc);

        self.vector.upsert(&meta, &chunks).await?;
        if let Err(e) = self.documents.save(&doc).await {
            self.rollback(&doc.id, false).await;
            return Err(e);
        }
        if let Err(e) = self.text.upsert(&meta, &chunks).await {
            self.rollback(&doc.id, true).await;
            return Err(e);
        }
        tracing::info!(document_id = %doc.id, filename = %doc.filename, chunks = doc.chunk_count, "ingested document");
        Ok(doc)
    }

    async fn rollback(&self, document_id: &str, saved_row: bool) {
        tracing::warn!(document_id, "rolling back partial ingest");
        if let Err(e) = self.vector.delete_document(document_id).await {
            tracing::error!(document_id, error = %e, "failed to roll back chunk vectors");
        }
        if saved_row {
            if let Err(e) = self.documents.delete(document_id).await {
                tracing::error!(document_id, error = %e, "failed to roll back document row");
            }
        }
    }

    pub async fn get_document(&self, id: &str) -> Result<Document> {
        let _guard = self.gate.read().await;
        self.documents.get(id).await
    }

    /// Chunks of a document ordered by ordinal.
    pub async fn document_chunks(&self, id: &str) -> Result<Vec<Chunk>> {
        let _guard = self.gate.read().await;
        self.documents.get(id).await?;
        self.vector.chunks_of(id).await
    }

    pub async fn list_documents(&self, scope: &Scope) -> Result<Vec<Document>> {
        let _guard = self.gate.read().await;
        self.documents.list(scope).await
    }

    /// Removes a document and its chunks from both indexes.
    pub async fn delete_document(&self, id: &str) -> Result<()> {
        let _guard = self.gate.write().await;
        let doc = self.documents.get(id).await?;
        self.delete_document_locked(&doc).await
    }

    /// Vector rows and the document row go first and keyword entries last.
    /// If a later step fails the earlier ones are restored, so a failed delete
    /// leaves the document fully indexed.
    async fn delete_document_locked(&self, doc: &Document) -> Result<()> {
        let meta = ChunkMeta::for_document(doc);
        let chunks = self.vector.chunks_of(&doc.id).await?;

        self.vector.delete_document(&doc.id).await?;
        if let Err(e) = self.documents.delete(&doc.id).await {
            self.restore_document(doc, &meta, &chunks, false).await;
            return Err(e);
        }
        if let Err(e) = self.text.delete_document(&doc.id).await {
            self.restore_document(doc, &meta, &chunks, true).await;
            return Err(e);
        }
        self.notes.clear_links(&NoteLink::Document(doc.id.clone())).await?;
        tracing::info!(document_id = %doc.id, filename = %doc.filename, "deleted document");
        Ok(())
    }

    async fn restore_document(&self, doc: &Document, meta: &ChunkMeta, chunks: &[Chunk], row_deleted: bool) {
        tracing::warn!(document_id = %doc.id, "restoring partially deleted document");
        if let Err(e) = self.vector.upsert(meta, chunks).await {
            tracing::error!(document_id = %doc.id, error = %e, "failed to restore chunk vectors");
        }
        if row_deleted {
            if let Err(e) = self.documents.save(doc).await {
                tracing::error!(document_id = %doc.id, error = %e, "failed to restore document row");
            }
        }
    }

    /// Moves a document to another topic, rewriting chunk scope in both indexes.
    ///
    /// A failed step puts the earlier ones back on the old topic.
    pub async fn move_document(&self, id: &str, topic_id: &str) -> Result<Document> {
        let _guard = self.gate.write().await;
        let old = self.documents.get(id).await?;
        let topic = self.hierarchy.get_topic(topic_id).await?;
        if old.topic_id == topic.id {
            return Ok(old);
        }
        let doc = Document { topic_id: topic.id, category_id: topic.category_id, ..old.clone() };
        let meta = ChunkMeta::for_document(&doc);
        let old_meta = ChunkMeta::for_document(&old);

        self.documents.reassign(&doc.id, &doc.category_id, &doc.topic_id).await?;
        if let Err(e) = self.vector.reassign(&meta).await {
            self.undo_move(&old, &old_meta, false).await;
            return Err(e);
        }
        let result = match self.vector.chunks_of(&doc.id).await {
            Ok(chunks) => self.text.reassign(&meta, &chunks).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            self.undo_move(&old, &old_meta, true).await;
            return Err(e);
        }
        tracing::info!(document_id = %doc.id, topic_id = %doc.topic_id, "moved document");
        Ok(doc)
    }

    async fn undo_move(&self, old: &Document, old_meta: &ChunkMeta, vectors_moved: bool) {
        tracing::warn!(document_id = %old.id, topic_id = %old.topic_id, "rolling back partial move");
        if vectors_moved {
            if let Err(e) = self.vector.reassign(old_meta).await {
                tracing::error!(document_id = %old.id, error = %e, "failed to restore chunk scope");
            }
        }
        if let Err(e) = self.documents.reassign(&old.id, &old.category_id, &old.topic_id).await {
            tracing::error!(document_id = %old.id, error = %e, "failed to restore document topic");
        }
    }

    // ---- retrieval ----

    pub async fn search(&self, query: &str, mode: SearchMode, top_k: usize, scope: &Scope) -> Result<SearchResponse> {
        let _guard = self.gate.read().await;
        match scope {
            Scope::All => {}
            Scope::Category(id) => {
                self.hierarchy.get_category(id).await?;
            }
            Scope::Topic(id) => {
                self.hierarchy.get_topic(id).await?;
            }
        }
        self.coordinator.search(query, mode, top_k, scope).await
    }

    // ---- hierarchy ----

    pub async fn create_category(&self, name: &str, description: &str) -> Result<Category> {
        let _guard = self.gate.write().await;
        self.hierarchy.create_category(name, description).await
    }

    pub async fn rename_category(&self, id: &str, name: &str) -> Result<Category> {
        let _guard = self.gate.write().await;
        self.hierarchy.rename_category(id, name).await
    }

    /// Deletes a category with its topics and their documents.
    ///
    /// A category that still owns topics requires `confirm`.
    pub async fn delete_category(&self, id: &str, confirm: bool) -> Result<()> {
        let _guard = self.gate.write().await;
        let category = self.hierarchy.get_category(id).await?;
        let topics = self.hierarchy.list_topics(Some(id)).await?;
        if !topics.is_empty() && !confirm {
            return Err(Error::ConfirmationRequired(format!(
                "category '{}' has {} topic(s)",
                category.name,
                topics.len()
            )));
        }
        for topic in &topics {
            self.delete_topic_locked(topic).await?;
        }
        self.hierarchy.delete_category_row(id).await?;
        tracing::info!(category_id = id, name = %category.name, topics = topics.len(), "deleted category");
        Ok(())
    }

    pub async fn create_topic(&self, category_id: &str, name: &str, description: &str) -> Result<Topic> {
        let _guard = self.gate.write().await;
        self.hierarchy.create_topic(category_id, name, description).await
    }

    pub async fn rename_topic(&self, id: &str, name: &str) -> Result<Topic> {
        let _guard = self.gate.write().await;
        self.hierarchy.rename_topic(id, name).await
    }

    /// Deletes a topic with its documents. A topic holding documents requires `confirm`.
    pub async fn delete_topic(&self, id: &str, confirm: bool) -> Result<()> {
        let _guard = self.gate.write().await;
        let topic = self.hierarchy.get_topic(id).await?;
        let documents = self.documents.list(&Scope::Topic(id.to_string())).await?;
        if !documents.is_empty() && !confirm {
            return Err(Error::ConfirmationRequired(format!(
                "topic '{}' has {} document(s)",
                topic.name,
                documents.len()
            )));
        }
        self.delete_topic_locked(&topic).await
    }

    async fn delete_topic_locked(&self, topic: &Topic) -> Result<()> {
        let documents = self.documents.list(&Scope::Topic(topic.id.clone())).await?;
        for doc in &documents {
            self.delete_document_locked(doc).await?;
        }
        self.notes.clear_links(&NoteLink::Topic(topic.id.clone())).await?;
        self.hierarchy.delete_topic_row(&topic.id).await?;
        tracing::info!(topic_id = %topic.id, name = %topic.name, documents = documents.len(), "deleted topic");
        Ok(())
    }

    pub async fn list_categories(&self) -> Result<Vec<Category>> {
        let _guard = self.gate.read().await;
        self.hierarchy.list_categories().await
    }

    pub async fn list_topics(&self, category_id: Option<&str>) -> Result<Vec<Topic>> {
        let _guard = self.gate.read().await;
        if let Some(id) = category_id {
            self.hierarchy.get_category(id).await?;
        }
        self.hierarchy.list_topics(category_id).await
    }

    /// The full category → topic → document tree.
    pub async fn hierarchy(&self) -> Result<Vec<CategoryNode>> {
        let _guard = self.gate.read().await;
        let mut tree = Vec::new();
        for category in self.hierarchy.list_categories().await? {
            let mut topics = Vec::new();
            for topic in self.hierarchy.list_topics(Some(&category.id)).await? {
                let documents = self
                    .documents
                    .list(&Scope::Topic(topic.id.clone()))
                    .await?
                    .iter()
                    .map(Document::summary)
                    .collect();
                topics.push(TopicNode { topic, documents });
            }
            tree.push(CategoryNode { category, topics });
        }
        Ok(tree)
    }

    /// Looks a category up by id, then by name.
    pub async fn resolve_category(&self, id_or_name: &str) -> Result<Category> {
        let _guard = self.gate.read().await;
        match self.hierarchy.get_category(id_or_name).await {
            Err(e) if e.is_not_found() => self
                .hierarchy
                .find_category_by_name(id_or_name)
                .await?
                .ok_or_else(|| Error::NotFound(format!("category '{}'", id_or_name))),
            other => other,
        }
    }

    /// Looks a topic up by id, then by name within `category_id`.
    pub async fn resolve_topic(&self, category_id: &str, id_or_name: &str) -> Result<Topic> {
        let _guard = self.gate.read().await;
        match self.hierarchy.get_topic(id_or_name).await {
            Ok(topic) if topic.category_id == category_id => Ok(topic),
            Ok(_) => Err(Error::NotFound(format!("topic '{}' in category {}", id_or_name, category_id))),
            Err(e) if e.is_not_found() => self
                .hierarchy
                .find_topic_by_name(category_id, id_or_name)
                .await?
                .ok_or_else(|| Error::NotFound(format!("topic '{}'", id_or_name))),
            Err(e) => Err(e),
        }
    }

    // ---- notes ----

    async fn check_link(&self, link: Option<&NoteLink>) -> Result<()> {
        match link {
            None => Ok(()),
            Some(NoteLink::Document(id)) => self.documents.get(id).await.map(drop),
            Some(NoteLink::Topic(id)) => self.hierarchy.get_topic(id).await.map(drop),
        }
    }

    pub async fn create_note(&self, content: &str, link: Option<NoteLink>) -> Result<Note> {
        let content = content.trim();
        if content.is_empty() {
            return Err(Error::InvalidInput("note content must not be empty".into()));
        }
        let _guard = self.gate.write().await;
        self.check_link(link.as_ref()).await?;
        let now = now_millis();
        let note = Note {
            id: Uuid::new_v4().to_string(),
            title: derive_title(content),
            content: content.to_string(),
            tags: derive_tags(content),
            link,
            created_at: now,
            updated_at: now,
        };
        self.notes.put(&note).await?;
        tracing::info!(note_id = %note.id, title = %note.title, "created note");
        Ok(note)
    }

    pub async fn get_note(&self, id: &str) -> Result<Note> {
        let _guard = self.gate.read().await;
        self.notes.get(id).await
    }

    /// Replaces content and link; title and tags are derived again.
    pub async fn update_note(&self, id: &str, content: &str, link: Option<NoteLink>) -> Result<Note> {
        let content = content.trim();
        if content.is_empty() {
            return Err(Error::InvalidInput("note content must not be empty".into()));
        }
        let _guard = self.gate.write().await;
        let mut note = self.notes.get(id).await?;
        self.check_link(link.as_ref()).await?;
        note.title = derive_title(content);
        note.tags = derive_tags(content);
        note.content = content.to_string();
        note.link = link;
        note.updated_at = now_millis().max(note.created_at);
        self.notes.put(&note).await?;
        Ok(note)
    }

    pub async fn delete_note(&self, id: &str) -> Result<()> {
        let _guard = self.gate.write().await;
        self.notes.get(id).await?;
        self.notes.delete(id).await
    }

    pub async fn list_notes(&self, link: Option<&NoteLink>) -> Result<Vec<Note>> {
        let _guard = self.gate.read().await;
        self.notes.list(link).await
    }

    // ---- maintenance ----

    /// Destroys every document, chunk, note, category and topic, and empties
    /// the embedding cache.
    pub async fn reset(&self, confirm: bool) -> Result<()> {
        if !confirm {
            return Err(Error::ConfirmationRequired("reset destroys all stored data".into()));
        }
        let _guard = self.gate.write().await;
        self.text.clear().await?;
        self.vector.clear().await?;
        self.documents.clear().await?;
        self.notes.clear().await?;
        self.hierarchy.clear().await?;
        self.cache.clear().await?;
        tracing::warn!(path = %self.storage.path().display(), "knowledge base reset");
        Ok(())
    }

    pub async fn stats(&self) -> Result<Stats> {
        let _guard = self.gate.read().await;
        Ok(Stats {
            documents: self.documents.count().await?,
            chunks: self.vector.count().await?,
            categories: self.hierarchy.count_categories().await?,
            topics: self.hierarchy.count_topics().await?,
            notes: self.notes.count().await?,
            embedder_id: self.embeddings.embedder().id(),
            dimensions: self.storage.dim(),
        })
    }

    /// Builds the ANN index over chunk vectors once there are enough of them.
    pub async fn optimize(&self) -> Result<OptimizeOutcome> {
        let _guard = self.gate.write().await;
        optimize(&self.storage).await
    }
}
