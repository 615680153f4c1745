use std::path::{Path, PathBuf};

use lancedb::{Connection, Table};

use knowdb_core::{Error, Result};

use crate::schema::{
    cache_schema, categories_schema, chunks_schema, documents_schema, meta_schema, notes_schema, topics_schema,
    CATEGORIES, CHUNKS, DOCUMENTS, EMBEDDING_CACHE, META, NOTES, TOPICS,
};
use crate::table::{ensure_table, get_meta, open_db, open_table, set_meta};

const DIM_KEY: &str = "embedding_dim";

/// Owned handle on the LanceDB database backing a knowledge base.
///
/// Opened once at start-up and shared (cloned) by every store.
#[derive(Clone)]
pub struct Storage {
    conn: Connection,
    dim: usize,
    path: PathBuf,
}

impl Storage {
    /// Opens (or creates) the database in `dir` and verifies that the stored
    /// embedding dimensionality matches `dim`.
    pub async fn open(dir: &Path, dim: usize) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(Error::unavailable)?;
        let conn = open_db(&dir.to_string_lossy()).await?;

        ensure_table(&conn, META, meta_schema()).await?;
        match get_meta(&conn, META, DIM_KEY).await? {
            Some(stored) => {
                let stored: usize = stored
                    .parse()
                    .map_err(|_| Error::Operation(format!("corrupt {} value '{}'", DIM_KEY, stored)))?;
                if stored != dim {
                    return Err(Error::dimension(stored, dim));
                }
            }
            None => set_meta(&conn, META, DIM_KEY, &dim.to_string()).await?,
        }

        ensure_table(&conn, DOCUMENTS, documents_schema()).await?;
        ensure_table(&conn, CHUNKS, chunks_schema(dim)).await?;
        ensure_table(&conn, CATEGORIES, categories_schema()).await?;
        ensure_table(&conn, TOPICS, topics_schema()).await?;
        ensure_table(&conn, NOTES, notes_schema()).await?;
        ensure_table(&conn, EMBEDDING_CACHE, cache_schema(dim)).await?;

        tracing::info!(path = %dir.display(), dim, "opened vector store");
        Ok(Self { conn, dim, path: dir.to_path_buf() })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn table(&self, name: &str) -> Result<Table> {
        open_table(&self.conn, name).await
    }

    /// Deletes every row of `name`.
    pub async fn truncate(&self, name: &str) -> Result<()> {
        let t = self.table(name).await?;
        t.delete("true").await.map_err(Error::operation)?;
        Ok(())
    }
}
