//! knowdb-text
//!
//! Keyword (BM25) index over chunk text. Backed by tantivy when the
//! `fulltext` feature is enabled, otherwise by a no-op index.

pub mod disabled;
#[cfg(feature = "fulltext")]
pub mod index;
#[cfg(feature = "fulltext")]
pub mod tantivy_utils;

use std::path::Path;
use std::sync::Arc;

use knowdb_core::traits::TextIndexer;
use knowdb_core::Result;

pub use disabled::DisabledIndexer;
#[cfg(feature = "fulltext")]
pub use index::TantivyIndexer;

/// Opens the keyword index stored under `dir`.
#[cfg(feature = "fulltext")]
pub fn open_keyword_index(dir: &Path) -> Result<Arc<dyn TextIndexer>> {
	Ok(Arc::new(TantivyIndexer::open(dir)?))
}

#[cfg(not(feature = "fulltext"))]
pub fn open_keyword_index(dir: &Path) -> Result<Arc<dyn TextIndexer>> {
	tracing::warn!(dir = %dir.display(), "built without full-text support; keyword search disabled");
	Ok(Arc::new(DisabledIndexer))
}
