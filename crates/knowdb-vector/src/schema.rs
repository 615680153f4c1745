//! Arrow schemas for every LanceDB table in the store.
use arrow_schema::{DataType, Field, Schema, TimeUnit};
use std::sync::Arc;

pub const DOCUMENTS: &str = "documents";
pub const CHUNKS: &str = "chunks";
pub const CATEGORIES: &str = "categories";
pub const TOPICS: &str = "topics";
pub const NOTES: &str = "notes";
pub const EMBEDDING_CACHE: &str = "embedding_cache";
pub const META: &str = "meta";

fn vector_field(dim: usize) -> Field {
	Field::new("vector", DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim as i32), true)
}

pub fn documents_schema() -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("id", DataType::Utf8, false),
		Field::new("filename", DataType::Utf8, false),
		Field::new("category_id", DataType::Utf8, false),
		Field::new("topic_id", DataType::Utf8, false),
		Field::new("text", DataType::Utf8, false),
		Field::new("ingested_at", DataType::Int64, false),
		Field::new("chunk_count", DataType::Int64, false),
	]))
}

pub fn chunks_schema(dim: usize) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("id", DataType::Utf8, false),
		Field::new("document_id", DataType::Utf8, false),
		Field::new("ordinal", DataType::Int64, false),
		Field::new("start_offset", DataType::Int64, false),
		Field::new("end_offset", DataType::Int64, false),
		Field::new("text", DataType::Utf8, false),
		Field::new("category_id", DataType::Utf8, false),
		Field::new("topic_id", DataType::Utf8, false),
		Field::new("ingested_at", DataType::Int64, false),
		vector_field(dim),
	]))
}

pub fn categories_schema() -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("id", DataType::Utf8, false),
		Field::new("name", DataType::Utf8, false),
		Field::new("description", DataType::Utf8, false),
		Field::new("created_at", DataType::Int64, false),
	]))
}

pub fn topics_schema() -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("id", DataType::Utf8, false),
		Field::new("category_id", DataType::Utf8, false),
		Field::new("name", DataType::Utf8, false),
		Field::new("description", DataType::Utf8, false),
		Field::new("created_at", DataType::Int64, false),
	]))
}

pub fn notes_schema() -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("id", DataType::Utf8, false),
		Field::new("title", DataType::Utf8, false),
		Field::new("content", DataType::Utf8, false),
		// JSON array of strings
		Field::new("tags", DataType::Utf8, false),
		Field::new("link_kind", DataType::Utf8, true),
		Field::new("link_id", DataType::Utf8, true),
		Field::new("created_at", DataType::Int64, false),
		Field::new("updated_at", DataType::Int64, false),
	]))
}

pub fn cache_schema(dim: usize) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("content_hash", DataType::Utf8, false),
		Field::new("embedder_id", DataType::Utf8, false),
		Field::new("created_at", DataType::Timestamp(TimeUnit::Millisecond, None), false),
		vector_field(dim),
	]))
}

pub fn meta_schema() -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("key", DataType::Utf8, false),
		Field::new("value", DataType::Utf8, false),
		Field::new("updated_at", DataType::Timestamp(TimeUnit::Millisecond, None), false),
	]))
}
