//! knowdb-vector
//!
//! LanceDB persistence for the knowledge base: chunk vectors (the vector
//! index), document rows, the category/topic hierarchy, notes, the embedding
//! cache and IVF_PQ index maintenance. All stores share one [`Storage`].

pub mod cache;
pub mod documents;
pub mod hierarchy;
pub mod index;
pub mod notes;
pub mod optimize;
pub mod schema;
pub mod storage;
pub mod table;

pub use cache::{content_hash, CacheEntry, EmbeddingCache};
pub use documents::DocumentStore;
pub use hierarchy::HierarchyStore;
pub use index::LanceVectorIndex;
pub use notes::NoteStore;
pub use optimize::{optimize, OptimizeOutcome};
pub use storage::Storage;
