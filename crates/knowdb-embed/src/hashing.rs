use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use twox_hash::XxHash64;

use knowdb_core::traits::Embedder;
use knowdb_core::{Error, Result};

use crate::preprocess::{blank_vector, prepare_for_embedding};

/// Feature-hashing embedder: every token lands in a bucket chosen by its
/// xxHash, the vector is then L2-normalised. Deterministic and offline.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dim: usize,
    max_input_chars: usize,
}

impl HashingEmbedder {
    pub fn new(dim: usize, max_input_chars: usize) -> Self {
        Self { dim, max_input_chars }
    }

    pub fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        if self.dim == 0 {
            return Err(Error::InvalidConfig("hashing embedder needs dim > 0".into()));
        }
        let text = prepare_for_embedding(text, self.max_input_chars).to_lowercase();
        let mut v = vec![0f32; self.dim];
        for token in text.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dim;
            let val = 0.5 + (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += val;
        }
        let norm = (v.iter().map(|x| x * x).sum::<f32>()).sqrt();
        if norm == 0.0 {
            return Ok(blank_vector(self.dim));
        }
        for x in &mut v {
            *x /= norm;
        }
        Ok(v)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn id(&self) -> String {
        format!("hashing:xxh64:d{}", self.dim)
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn max_input_chars(&self) -> usize {
        self.max_input_chars
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed_text(t)).collect()
    }
}
