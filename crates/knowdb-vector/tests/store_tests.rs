use tempfile::TempDir;

use knowdb_core::traits::VectorIndexer;
use knowdb_core::types::{Chunk, ChunkMeta, Document, Note, NoteLink, Scope};
use knowdb_core::Error;
use knowdb_vector::{
    content_hash, optimize, CacheEntry, DocumentStore, EmbeddingCache, HierarchyStore, LanceVectorIndex, NoteStore,
    OptimizeOutcome, Storage,
};

const DIM: usize = 4;

async fn storage(tmp: &TempDir) -> Storage {
    Storage::open(&tmp.path().join("lancedb"), DIM).await.expect("open storage")
}

fn meta(doc: &str, category: &str, topic: &str, ingested_at: i64) -> ChunkMeta {
    ChunkMeta {
        document_id: doc.to_string(),
        category_id: category.to_string(),
        topic_id: topic.to_string(),
        ingested_at,
    }
}

fn chunk(doc: &str, ordinal: usize, text: &str, embedding: [f32; DIM]) -> Chunk {
    Chunk {
        id: Chunk::make_id(doc, ordinal),
        document_id: doc.to_string(),
        ordinal,
        start: ordinal * 10,
        end: ordinal * 10 + text.len(),
        text: text.to_string(),
        embedding: embedding.to_vec(),
    }
}

#[tokio::test]
async fn reopening_with_other_dimension_fails() {
    let tmp = TempDir::new().unwrap();
    drop(storage(&tmp).await);
    let err = Storage::open(&tmp.path().join("lancedb"), DIM + 1).await.err().expect("must fail");
    assert!(matches!(err, Error::DimensionMismatch { expected: 4, actual: 5, chunk: None }));
}

#[tokio::test]
async fn vector_query_ranks_by_cosine_and_respects_scope() {
    let tmp = TempDir::new().unwrap();
    let index = LanceVectorIndex::new(storage(&tmp).await);
    index
        .upsert(
            &meta("d1", "c1", "t1", 1),
            &[chunk("d1", 0, "north", [1.0, 0.0, 0.0, 0.0]), chunk("d1", 1, "east", [0.0, 1.0, 0.0, 0.0])],
        )
        .await
        .unwrap();
    index
        .upsert(&meta("d2", "c2", "t2", 2), &[chunk("d2", 0, "north-ish", [0.9, 0.1, 0.0, 0.0])])
        .await
        .unwrap();
    assert_eq!(index.count().await.unwrap(), 3);

    let hits = index.query(&[1.0, 0.0, 0.0, 0.0], 3, &Scope::All).await.unwrap();
    assert_eq!(hits[0].id, "d1:0");
    assert!((hits[0].score - 1.0).abs() < 1e-4);
    assert_eq!(hits[1].id, "d2:0");
    assert!(hits[1].score > hits[2].score);

    let scoped = index.query(&[1.0, 0.0, 0.0, 0.0], 3, &Scope::Category("c2".into())).await.unwrap();
    assert_eq!(scoped.len(), 1);
    assert_eq!(scoped[0].document_id, "d2");

    let err = index.query(&[1.0, 0.0], 3, &Scope::All).await.unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { expected: 4, actual: 2, chunk: None }));
}

#[tokio::test]
async fn delete_and_reassign_chunks() {
    let tmp = TempDir::new().unwrap();
    let index = LanceVectorIndex::new(storage(&tmp).await);
    index
        .upsert(
            &meta("d1", "c1", "t1", 1),
            &[chunk("d1", 1, "second", [0.0, 1.0, 0.0, 0.0]), chunk("d1", 0, "first", [1.0, 0.0, 0.0, 0.0])],
        )
        .await
        .unwrap();

    let chunks = index.chunks_of("d1").await.unwrap();
    assert_eq!(chunks.iter().map(|c| c.ordinal).collect::<Vec<_>>(), vec![0, 1]);
    assert_eq!(chunks[0].embedding.len(), DIM);

    index.reassign(&meta("d1", "c9", "t9", 1)).await.unwrap();
    assert_eq!(index.count_for(&Scope::Topic("t9".into())).await.unwrap(), 2);
    assert_eq!(index.count_for(&Scope::Topic("t1".into())).await.unwrap(), 0);

    index.delete_document("d1").await.unwrap();
    assert_eq!(index.count().await.unwrap(), 0);
    assert!(index.query(&[1.0, 0.0, 0.0, 0.0], 5, &Scope::All).await.unwrap().is_empty());
}

#[tokio::test]
async fn wrong_length_embedding_is_rejected_before_write() {
    let tmp = TempDir::new().unwrap();
    let index = LanceVectorIndex::new(storage(&tmp).await);
    let mut bad = chunk("d1", 0, "x", [1.0, 0.0, 0.0, 0.0]);
    bad.embedding.pop();
    let err = index.upsert(&meta("d1", "c1", "t1", 1), &[bad]).await.unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { expected: 4, actual: 3, chunk: Some(0) }));
    assert_eq!(index.count().await.unwrap(), 0);
}

#[tokio::test]
async fn documents_round_trip() {
    let tmp = TempDir::new().unwrap();
    let docs = DocumentStore::new(storage(&tmp).await);
    let doc = Document {
        id: "doc-1".into(),
        filename: "manual.md".into(),
        category_id: "c1".into(),
        topic_id: "t1".into(),
        text: "# Manual\nIt's text with a quote.".into(),
        ingested_at: 42,
        chunk_count: 1,
    };
    docs.save(&doc).await.unwrap();
    assert_eq!(docs.get("doc-1").await.unwrap(), doc);
    assert!(docs.get("missing").await.unwrap_err().is_not_found());

    docs.reassign("doc-1", "c2", "t2").await.unwrap();
    assert_eq!(docs.list(&Scope::Topic("t2".into())).await.unwrap().len(), 1);
    assert!(docs.list(&Scope::Category("c1".into())).await.unwrap().is_empty());

    docs.delete("doc-1").await.unwrap();
    assert_eq!(docs.count().await.unwrap(), 0);
}

#[tokio::test]
async fn hierarchy_names_are_unique_case_insensitively() {
    let tmp = TempDir::new().unwrap();
    let h = HierarchyStore::new(storage(&tmp).await);
    let work = h.create_category("Work", "").await.unwrap();
    let err = h.create_category("  work ", "").await.unwrap_err();
    assert!(matches!(err, Error::DuplicateName(_)));
    assert!(matches!(h.create_category(" ", "").await.unwrap_err(), Error::InvalidInput(_)));

    let personal = h.create_category("Personal", "").await.unwrap();
    h.create_topic(&work.id, "Projects", "").await.unwrap();
    // same topic name is fine under another category
    h.create_topic(&personal.id, "projects", "").await.unwrap();
    let err = h.create_topic(&work.id, "PROJECTS", "").await.unwrap_err();
    assert!(matches!(err, Error::DuplicateName(_)));

    let err = h.create_topic("no-such-category", "Anything", "").await.unwrap_err();
    assert!(err.is_not_found());

    let err = h.rename_category(&personal.id, "WORK").await.unwrap_err();
    assert!(matches!(err, Error::DuplicateName(_)));
    let renamed = h.rename_category(&personal.id, "Home").await.unwrap();
    assert_eq!(h.get_category(&renamed.id).await.unwrap().name, "Home");

    let names: Vec<String> = h.list_categories().await.unwrap().into_iter().map(|c| c.name).collect();
    assert_eq!(names, vec!["Home", "Work"]);
    assert_eq!(h.list_topics(Some(&work.id)).await.unwrap().len(), 1);
    assert_eq!(h.list_topics(None).await.unwrap().len(), 2);
}

#[tokio::test]
async fn note_links_can_be_cleared() {
    let tmp = TempDir::new().unwrap();
    let notes = NoteStore::new(storage(&tmp).await);
    let note = Note {
        id: "n1".into(),
        title: "Pump Maintenance".into(),
        content: "Pump maintenance schedule".into(),
        tags: vec!["#Pump".into()],
        link: Some(NoteLink::Document("doc-1".into())),
        created_at: 1,
        updated_at: 1,
    };
    notes.put(&note).await.unwrap();
    assert_eq!(notes.get("n1").await.unwrap(), note);
    assert_eq!(notes.list(Some(&NoteLink::Document("doc-1".into()))).await.unwrap().len(), 1);

    assert_eq!(notes.clear_links(&NoteLink::Document("doc-1".into())).await.unwrap(), 1);
    let cleared = notes.get("n1").await.unwrap();
    assert_eq!(cleared.link, None);
    assert_eq!(cleared.tags, note.tags);
}

#[tokio::test]
async fn cache_round_trip_is_keyed_by_embedder() {
    let tmp = TempDir::new().unwrap();
    let cache = EmbeddingCache::new(storage(&tmp).await);
    let h = content_hash("hello");
    cache
        .put_many(&[CacheEntry { content_hash: h.clone(), embedder_id: "e1".into(), vector: vec![0.5; DIM] }])
        .await
        .unwrap();
    let hit = cache.get_many("e1", &[h.clone()]).await.unwrap();
    assert_eq!(hit.get(&h), Some(&vec![0.5; DIM]));
    assert!(cache.get_many("e2", &[h]).await.unwrap().is_empty());
}

#[tokio::test]
async fn optimize_skips_small_tables() {
    let tmp = TempDir::new().unwrap();
    let s = storage(&tmp).await;
    let outcome = optimize(&s).await.unwrap();
    assert!(matches!(outcome, OptimizeOutcome::Skipped { rows: 0, .. }));
}

#[tokio::test]
#[ignore = "slow: trains an IVF_PQ index"]
async fn optimize_builds_index_on_large_tables() {
    let tmp = TempDir::new().unwrap();
    let s = storage(&tmp).await;
    let index = LanceVectorIndex::new(s.clone());
    let chunks: Vec<Chunk> = (0..300)
        .map(|i| {
            let x = i as f32;
            chunk("big", i, "row", [x.sin(), x.cos(), (x * 0.5).sin(), 1.0])
        })
        .collect();
    index.upsert(&meta("big", "c", "t", 0), &chunks).await.unwrap();
    let outcome = optimize(&s).await.unwrap();
    assert!(matches!(outcome, OptimizeOutcome::Built { rows: 300, .. }));
    // refined hits carry exact cosine scores, so a stored vector finds itself
    let target = chunks[7].embedding.clone();
    let hits = index.query(&target, 5, &Scope::All).await.unwrap();
    assert_eq!(hits.len(), 5);
    assert_eq!(hits[0].id, "big:7");
    assert!((hits[0].score - 1.0).abs() < 1e-4, "score {}", hits[0].score);
    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
}
