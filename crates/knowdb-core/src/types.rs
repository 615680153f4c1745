//! Domain types shared by the document store, the indexes and the retrieval layer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type DocumentId = String;
pub type ChunkId = String;

/// A converted source document (markdown text) placed in exactly one topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub filename: String,
    pub category_id: String,
    pub topic_id: String,
    pub text: String,
    /// UTC milliseconds.
    pub ingested_at: i64,
    pub chunk_count: usize,
}

impl Document {
    pub fn summary(&self) -> DocumentSummary {
        DocumentSummary {
            id: self.id.clone(),
            filename: self.filename.clone(),
            ingested_at: self.ingested_at,
            chunk_count: self.chunk_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub id: DocumentId,
    pub filename: String,
    pub ingested_at: i64,
    pub chunk_count: usize,
}

/// A bounded span of a document's text and its embedding.
///
/// `start`/`end` are byte offsets into `Document::text`; `text` is that slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub document_id: DocumentId,
    pub ordinal: usize,
    pub start: usize,
    pub end: usize,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,
}

impl Chunk {
    pub fn make_id(document_id: &str, ordinal: usize) -> ChunkId {
        format!("{}:{}", document_id, ordinal)
    }
}

/// Scope metadata written next to every chunk in both indexes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkMeta {
    pub document_id: DocumentId,
    pub category_id: String,
    pub topic_id: String,
    pub ingested_at: i64,
}

impl ChunkMeta {
    pub fn for_document(doc: &Document) -> Self {
        Self {
            document_id: doc.id.clone(),
            category_id: doc.category_id.clone(),
            topic_id: doc.topic_id.clone(),
            ingested_at: doc.ingested_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub id: String,
    pub category_id: String,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicNode {
    pub topic: Topic,
    pub documents: Vec<DocumentSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryNode {
    pub category: Category,
    pub topics: Vec<TopicNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum NoteLink {
    Document(DocumentId),
    Topic(String),
}

impl NoteLink {
    pub fn kind(&self) -> &'static str {
        match self {
            NoteLink::Document(_) => "document",
            NoteLink::Topic(_) => "topic",
        }
    }

    pub fn target(&self) -> &str {
        match self {
            NoteLink::Document(id) | NoteLink::Topic(id) => id,
        }
    }

    pub fn from_parts(kind: &str, id: &str) -> Option<Self> {
        match kind {
            "document" => Some(NoteLink::Document(id.to_string())),
            "topic" => Some(NoteLink::Topic(id.to_string())),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub link: Option<NoteLink>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Retrieval filter applied before ranking.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scope {
    #[default]
    All,
    Category(String),
    Topic(String),
}

/// Indicates which engine produced a result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SourceKind {
    Vector,
    Text,
}

/// The minimal surface returned by both indexes.
///
/// `score` is engine-specific but higher is always better.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: ChunkId,
    pub document_id: DocumentId,
    pub text: String,
    pub ingested_at: i64,
    pub score: f32,
    pub source: SourceKind,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Keyword,
    Semantic,
    #[default]
    Hybrid,
}

impl FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "keyword" | "text" => Ok(SearchMode::Keyword),
            "semantic" | "vector" => Ok(SearchMode::Semantic),
            "hybrid" => Ok(SearchMode::Hybrid),
            other => Err(format!("unknown search mode '{}'", other)),
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SearchMode::Keyword => "keyword",
            SearchMode::Semantic => "semantic",
            SearchMode::Hybrid => "hybrid",
        };
        f.write_str(s)
    }
}

/// One ranked chunk returned by the retrieval coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub chunk_id: ChunkId,
    pub document_id: DocumentId,
    pub filename: String,
    pub category_id: String,
    pub topic_id: String,
    pub text: String,
    pub ingested_at: i64,
    /// Fused ranking score.
    pub score: f32,
    /// Normalised relevance in `[0, 1]` used for thresholding.
    pub relevance: f32,
    pub keyword_score: Option<f32>,
    pub semantic_score: Option<f32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    /// Set when one retrieval branch failed or timed out.
    pub partial: bool,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stats {
    pub documents: usize,
    pub chunks: usize,
    pub categories: usize,
    pub topics: usize,
    pub notes: usize,
    pub embedder_id: String,
    pub dimensions: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_mode_parses_aliases() {
        assert_eq!("Keyword".parse::<SearchMode>(), Ok(SearchMode::Keyword));
        assert_eq!("vector".parse::<SearchMode>(), Ok(SearchMode::Semantic));
        assert_eq!("hybrid".parse::<SearchMode>(), Ok(SearchMode::Hybrid));
        assert!("fuzzy".parse::<SearchMode>().is_err());
    }

    #[test]
    fn note_link_round_trips_through_parts() {
        let link = NoteLink::Topic("t-1".into());
        assert_eq!(NoteLink::from_parts(link.kind(), link.target()), Some(link));
        assert_eq!(NoteLink::from_parts("category", "x"), None);
    }
}
