//! Schema and analyzer shared by every open of the keyword index.
use tantivy::schema::{Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, STORED, STRING};
use tantivy::tokenizer::{Language, LowerCaser, RemoveLongFilter, SimpleTokenizer, Stemmer, StopWordFilter, TextAnalyzer};
use tantivy::Index;

use knowdb_core::{Error, Result};

pub const ANALYZER: &str = "en_stem_stop";

/// Resolved field handles for the chunk schema.
#[derive(Debug, Clone, Copy)]
pub struct Fields {
	pub chunk_id: Field,
	pub document_id: Field,
	pub topic_id: Field,
	pub category_id: Field,
	pub ingested_at: Field,
	pub text: Field,
}

impl Fields {
	pub fn resolve(schema: &Schema) -> Result<Self> {
		let get = |name: &str| schema.get_field(name).map_err(Error::unavailable);
		Ok(Self {
			chunk_id: get("chunk_id")?,
			document_id: get("document_id")?,
			topic_id: get("topic_id")?,
			category_id: get("category_id")?,
			ingested_at: get("ingested_at")?,
			text: get("text")?,
		})
	}
}

pub fn build_schema() -> Schema {
	let mut schema_builder = Schema::builder();
	schema_builder.add_text_field("chunk_id", STRING | STORED);
	schema_builder.add_text_field("document_id", STRING | STORED);
	schema_builder.add_text_field("topic_id", STRING | STORED);
	schema_builder.add_text_field("category_id", STRING | STORED);
	schema_builder.add_i64_field("ingested_at", STORED);
	let text_field_indexing = TextFieldIndexing::default()
		.set_tokenizer(ANALYZER)
		.set_index_option(IndexRecordOption::WithFreqsAndPositions);
	let text_options = TextOptions::default().set_indexing_options(text_field_indexing).set_stored();
	schema_builder.add_text_field("text", text_options);
	schema_builder.build()
}

/// English analyzer: simple tokens, long-token removal, lowercase, stop words, Snowball stemming.
/// The same analyzer is used at index and query time.
pub fn register_tokenizer(index: &Index) {
	let stop_words = StopWordFilter::new(Language::English).unwrap_or_else(|| {
		let fallback = [
			"a","an","and","are","as","at","be","by","for","from","has","he","in","is","it","its","of","on","that","the","to","was","will","with","or","but","not","this","these","they","then","than","so","if",
		];
		StopWordFilter::remove(fallback.into_iter().map(|s| s.to_string()))
	});
	let tokenizer = TextAnalyzer::builder(SimpleTokenizer::default())
		.filter(RemoveLongFilter::limit(40))
		.filter(LowerCaser)
		.filter(stop_words)
		.filter(Stemmer::new(Language::English))
		.build();
	index.tokenizers().register(ANALYZER, tokenizer);
}
