//! knowdb-hybrid
//!
//! Ingestion, hybrid retrieval and the [`KnowledgeBase`] service that ties the
//! document store, both indexes, the hierarchy and notes together.

pub mod coordinator;
pub mod fusion;
pub mod ingest;
pub mod knowledge;

pub use coordinator::RetrievalCoordinator;
pub use ingest::EmbeddingPipeline;
pub use knowledge::KnowledgeBase;
