use std::fs;
use tempfile::TempDir;

use knowdb_core::chunker::Chunker;
use knowdb_core::config::{Config, EmbeddingBackend, FusionPolicy};
use knowdb_core::Error;

#[test]
fn config_file_overrides_defaults_and_resolves_storage() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("config.toml");
    fs::write(
        &path,
        r#"
seed_sample_data = false

[storage]
path = "kb"

[embedding]
backend = "hashing"
dimensions = 128

[search.fusion]
policy = "weighted"
keyword_weight = 0.3
semantic_weight = 0.7
"#,
    )
    .unwrap();

    let settings = Config::load_from(&path).unwrap().settings().unwrap();
    assert_eq!(settings.storage.path, tmp.path().join("kb"));
    assert_eq!(settings.embedding.backend, EmbeddingBackend::Hashing);
    assert_eq!(settings.embedding.dimensions, 128);
    assert_eq!(settings.search.fusion.policy, FusionPolicy::Weighted);
    assert!(!settings.seed_sample_data);
    // untouched keys keep their defaults
    assert_eq!(settings.chunking.chunk_size, 4000);
    assert_eq!(settings.search.default_top_k, 10);
}

#[test]
fn missing_config_file_yields_defaults() {
    let tmp = TempDir::new().unwrap();
    let cfg = Config::load_from(&tmp.path().join("absent.toml")).unwrap();
    let settings = cfg.settings().unwrap();
    assert_eq!(settings.embedding.model, "text-embedding-3-large");
    assert_eq!(cfg.get::<usize>("chunking.chunk_overlap").unwrap(), 200);
}

#[test]
fn invalid_values_are_reported_as_config_errors() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("config.toml");
    fs::write(&path, "[chunking]\nchunk_size = 100\nchunk_overlap = 150\n").unwrap();
    let err = Config::load_from(&path).unwrap().settings().unwrap_err();
    assert!(matches!(err, Error::InvalidConfig(_)));
}

#[test]
fn chunk_text_matches_span() {
    let text = "Alpha beta gamma. Delta epsilon zeta. Eta theta iota. Kappa lambda mu.";
    let chunks = Chunker::new(24, 4).unwrap().chunk("d1", text).unwrap();
    assert!(chunks.len() >= 3);
    for (i, c) in chunks.iter().enumerate() {
        assert_eq!(c.ordinal, i);
        assert_eq!(c.text, &text[c.start..c.end]);
        assert_eq!(c.id, format!("d1:{}", i));
    }
}

#[test]
fn dimension_mismatch_names_the_chunk_when_known() {
    let err = Error::DimensionMismatch { expected: 64, actual: 32, chunk: Some(3) };
    assert_eq!(err.to_string(), "Dimension mismatch: expected 64, got 32 at chunk 3");
    assert_eq!(Error::dimension(4, 2).to_string(), "Dimension mismatch: expected 4, got 2");
}
