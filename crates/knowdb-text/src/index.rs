use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tantivy::collector::TopDocs;
use tantivy::directory::MmapDirectory;
use tantivy::query::{BooleanQuery, Occur, Query, QueryParser, TermQuery};
use tantivy::schema::{IndexRecordOption, Value};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};

use knowdb_core::traits::TextIndexer;
use knowdb_core::types::{Chunk, ChunkMeta, Scope, SearchHit, SourceKind};
use knowdb_core::{Error, Result};

use crate::tantivy_utils::{build_schema, register_tokenizer, Fields};

const WRITER_HEAP_BYTES: usize = 50_000_000;

struct Inner {
	index: Index,
	writer: Mutex<IndexWriter>,
	reader: IndexReader,
	fields: Fields,
}

/// Persistent tantivy index of chunk text plus scope metadata.
#[derive(Clone)]
pub struct TantivyIndexer {
	inner: Arc<Inner>,
}

impl TantivyIndexer {
	/// Opens the index in `index_dir`, creating it on first use.
	pub fn open(index_dir: &Path) -> Result<Self> {
		std::fs::create_dir_all(index_dir).map_err(Error::unavailable)?;
		let dir = MmapDirectory::open(index_dir).map_err(Error::unavailable)?;
		let index = Index::open_or_create(dir, build_schema()).map_err(Error::unavailable)?;
		register_tokenizer(&index);
		let fields = Fields::resolve(&index.schema())?;
		let writer = index.writer(WRITER_HEAP_BYTES).map_err(Error::unavailable)?;
		let reader: IndexReader = index
			.reader_builder()
			.reload_policy(ReloadPolicy::Manual)
			.try_into()
			.map_err(Error::unavailable)?;
		tracing::debug!(dir = %index_dir.display(), "opened keyword index");
		Ok(Self { inner: Arc::new(Inner { index, writer: Mutex::new(writer), reader, fields }) })
	}

	pub fn num_docs(&self) -> u64 {
		self.inner.reader.searcher().num_docs()
	}

	async fn blocking<T, F>(&self, f: F) -> Result<T>
	where
		T: Send + 'static,
		F: FnOnce(&Inner) -> Result<T> + Send + 'static,
	{
		let inner = Arc::clone(&self.inner);
		tokio::task::spawn_blocking(move || f(&inner))
			.await
			.map_err(Error::operation)?
	}
}

impl Inner {
	fn write<F>(&self, f: F) -> Result<()>
	where
		F: FnOnce(&mut IndexWriter, &Fields) -> Result<()>,
	{
		let mut writer = self.writer.lock().map_err(|_| Error::operation("keyword writer lock poisoned"))?;
		if let Err(e) = f(&mut writer, &self.fields) {
			// drop anything staged by the failed closure
			Self::rollback(&mut writer);
			return Err(e);
		}
		if let Err(e) = writer.commit() {
			Self::rollback(&mut writer);
			return Err(Error::unavailable(e));
		}
		self.reader.reload().map_err(Error::unavailable)?;
		Ok(())
	}

	fn rollback(writer: &mut IndexWriter) {
		if let Err(e) = writer.rollback() {
			tracing::warn!(error = %e, "keyword index rollback failed; staged changes may be committed by the next write");
		}
	}

	fn add_chunks(writer: &mut IndexWriter, f: &Fields, meta: &ChunkMeta, chunks: &[Chunk]) -> Result<()> {
		for c in chunks {
			writer.delete_term(Term::from_field_text(f.chunk_id, &c.id));
			writer
				.add_document(doc!(
					f.chunk_id => c.id.clone(),
					f.document_id => meta.document_id.clone(),
					f.topic_id => meta.topic_id.clone(),
					f.category_id => meta.category_id.clone(),
					f.ingested_at => meta.ingested_at,
					f.text => c.text.clone(),
				))
				.map_err(Error::operation)?;
		}
		Ok(())
	}

	fn search(&self, query: &str, k: usize, scope: &Scope) -> Result<Vec<SearchHit>> {
		let f = &self.fields;
		let qp = QueryParser::for_index(&self.index, vec![f.text]);
		let (parsed, errors) = qp.parse_query_lenient(query);
		if !errors.is_empty() {
			tracing::debug!(query, errors = errors.len(), "lenient query parse dropped some clauses");
		}
		let q: Box<dyn Query> = match scope {
			Scope::All => parsed,
			Scope::Category(id) => scoped(parsed, Term::from_field_text(f.category_id, id)),
			Scope::Topic(id) => scoped(parsed, Term::from_field_text(f.topic_id, id)),
		};

		let searcher = self.reader.searcher();
		let top_docs = searcher.search(&q, &TopDocs::with_limit(k)).map_err(Error::operation)?;
		let mut hits = Vec::with_capacity(top_docs.len());
		for (score, addr) in top_docs {
			let doc: TantivyDocument = searcher.doc(addr).map_err(Error::operation)?;
			let text_of = |field| doc.get_first(field).and_then(|v| v.as_str()).unwrap_or("").to_string();
			hits.push(SearchHit {
				id: text_of(f.chunk_id),
				document_id: text_of(f.document_id),
				text: text_of(f.text),
				ingested_at: doc.get_first(f.ingested_at).and_then(|v| v.as_i64()).unwrap_or(0),
				score,
				source: SourceKind::Text,
			});
		}
		Ok(hits)
	}
}

fn scoped(query: Box<dyn Query>, term: Term) -> Box<dyn Query> {
	let filter: Box<dyn Query> = Box::new(TermQuery::new(term, IndexRecordOption::Basic));
	Box::new(BooleanQuery::new(vec![(Occur::Must, query), (Occur::Must, filter)]))
}

#[async_trait]
impl TextIndexer for TantivyIndexer {
	async fn upsert(&self, meta: &ChunkMeta, chunks: &[Chunk]) -> Result<()> {
		let (meta, chunks) = (meta.clone(), chunks.to_vec());
		self.blocking(move |inner| inner.write(|w, f| Inner::add_chunks(w, f, &meta, &chunks))).await
	}

	async fn query(&self, query: &str, k: usize, scope: &Scope) -> Result<Vec<SearchHit>> {
		if query.trim().is_empty() || k == 0 {
			return Ok(Vec::new());
		}
		let (query, scope) = (query.to_string(), scope.clone());
		self.blocking(move |inner| inner.search(&query, k, &scope)).await
	}

	async fn delete_document(&self, document_id: &str) -> Result<()> {
		let document_id = document_id.to_string();
		self.blocking(move |inner| {
			inner.write(|w, f| {
				w.delete_term(Term::from_field_text(f.document_id, &document_id));
				Ok(())
			})
		})
		.await
	}

	async fn reassign(&self, meta: &ChunkMeta, chunks: &[Chunk]) -> Result<()> {
		let (meta, chunks) = (meta.clone(), chunks.to_vec());
		self.blocking(move |inner| {
			inner.write(|w, f| {
				w.delete_term(Term::from_field_text(f.document_id, &meta.document_id));
				Inner::add_chunks(w, f, &meta, &chunks)
			})
		})
		.await
	}

	async fn clear(&self) -> Result<()> {
		self.blocking(|inner| {
			inner.write(|w, _| {
				w.delete_all_documents().map_err(Error::operation)?;
				Ok(())
			})
		})
		.await
	}
}
