//! Layered configuration and path helpers.
//!
//! Uses Figment to merge serialized defaults, `config.toml`, `config.<env>.toml`
//! and `KNOWDB_*` env vars (`__` separates nested keys). Provides helpers to
//! expand `~` and `${VAR}` and to resolve relative paths against a known base
//! directory.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub const ENV_PREFIX: &str = "KNOWDB_";

pub struct Config {
    figment: Figment,
    base_dir: PathBuf,
}

impl Config {
    /// Loads `config.toml` from the current directory.
    pub fn load() -> Result<Self> {
        let cwd = env::current_dir().map_err(|e| Error::InvalidConfig(e.to_string()))?;
        Self::load_from(&cwd.join("config.toml"))
    }

    /// Loads an explicit config file; the `config.<env>.toml` overlay is looked
    /// up next to it. A missing file is not an error, defaults apply.
    pub fn load_from(path: &Path) -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        let base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path));
        let overlay = match env_name.as_str() {
            "dev" | "development" => Some("config.dev.toml"),
            "prod" | "production" => Some("config.prod.toml"),
            "test" | "testing" => Some("config.test.toml"),
            _ => None,
        };
        if let Some(name) = overlay {
            figment = figment.merge(Toml::file(base_dir.join(name)));
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        Ok(Self { figment, base_dir })
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::InvalidConfig(format!("Failed to get '{}': {}", key, e)))
    }

    /// Extracts, resolves and validates the typed settings.
    pub fn settings(&self) -> Result<Settings> {
        let mut settings: Settings = self
            .figment
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.storage.path = resolve_with_base(&self.base_dir, settings.storage.path.to_string_lossy());
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub storage: StorageSettings,
    pub embedding: EmbeddingSettings,
    pub chunking: ChunkingSettings,
    pub search: SearchSettings,
    pub seed_sample_data: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            storage: StorageSettings::default(),
            embedding: EmbeddingSettings::default(),
            chunking: ChunkingSettings::default(),
            search: SearchSettings::default(),
            seed_sample_data: true,
        }
    }
}

impl Settings {
    /// Settings for a throwaway store: hashing embedder, small dimensions, no seeding.
    pub fn for_path(path: impl Into<PathBuf>) -> Self {
        let mut s = Self::default();
        s.storage.path = path.into();
        s.embedding.backend = EmbeddingBackend::Hashing;
        s.embedding.dimensions = 64;
        s.seed_sample_data = false;
        s
    }

    pub fn validate(&self) -> Result<()> {
        let c = &self.chunking;
        if c.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunking.chunk_size must be > 0".into()));
        }
        if c.chunk_overlap >= c.chunk_size {
            return Err(Error::InvalidConfig(format!(
                "chunking.chunk_overlap ({}) must be smaller than chunk_size ({})",
                c.chunk_overlap, c.chunk_size
            )));
        }
        let e = &self.embedding;
        if e.dimensions == 0 {
            return Err(Error::InvalidConfig("embedding.dimensions must be > 0".into()));
        }
        if e.batch_size == 0 || e.max_concurrency == 0 {
            return Err(Error::InvalidConfig(
                "embedding.batch_size and embedding.max_concurrency must be > 0".into(),
            ));
        }
        if e.max_input_chars == 0 {
            return Err(Error::InvalidConfig("embedding.max_input_chars must be > 0".into()));
        }
        let s = &self.search;
        if s.default_top_k == 0 {
            return Err(Error::InvalidConfig("search.default_top_k must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&s.min_relevance) {
            return Err(Error::InvalidConfig("search.min_relevance must be within [0, 1]".into()));
        }
        let f = &s.fusion;
        if f.keyword_weight < 0.0 || f.semantic_weight < 0.0 {
            return Err(Error::InvalidConfig("fusion weights must not be negative".into()));
        }
        if f.policy == FusionPolicy::Weighted && f.keyword_weight + f.semantic_weight == 0.0 {
            return Err(Error::InvalidConfig("fusion weights must not both be zero".into()));
        }
        if f.rrf_k == 0 {
            return Err(Error::InvalidConfig("search.fusion.rrf_k must be > 0".into()));
        }
        Ok(())
    }

    pub fn lancedb_dir(&self) -> PathBuf {
        self.storage.path.join("lancedb")
    }

    pub fn tantivy_dir(&self) -> PathBuf {
        self.storage.path.join("tantivy")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageSettings {
    pub path: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self { path: PathBuf::from("data") }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    OpenAi,
    Hashing,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub backend: EmbeddingBackend,
    pub model: String,
    pub dimensions: usize,
    pub endpoint: String,
    pub api_key_env: String,
    pub batch_size: usize,
    pub max_concurrency: usize,
    pub max_input_chars: usize,
    pub cache: bool,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::OpenAi,
            model: "text-embedding-3-large".to_string(),
            dimensions: 3072,
            endpoint: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            batch_size: 32,
            max_concurrency: 4,
            // ~4 chars per token against the 8191-token model limit
            max_input_chars: 8191 * 4,
            cache: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self { chunk_size: 4000, chunk_overlap: 200 }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FusionPolicy {
    Rrf,
    Weighted,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FusionSettings {
    pub policy: FusionPolicy,
    pub rrf_k: u32,
    pub keyword_weight: f32,
    pub semantic_weight: f32,
}

impl Default for FusionSettings {
    fn default() -> Self {
        Self { policy: FusionPolicy::Rrf, rrf_k: 60, keyword_weight: 0.5, semantic_weight: 0.5 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SearchSettings {
    pub default_top_k: usize,
    pub min_relevance: f32,
    pub timeout_ms: u64,
    pub fusion: FusionSettings,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self { default_top_k: 10, min_relevance: 0.0, timeout_ms: 5000, fusion: FusionSettings::default() }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
