//! LanceDB connection and housekeeping helpers.
//!
//! Provides the database open function, ensure-* helpers for tables, a simple
//! key/value metadata table and the column accessors shared by every store.
use std::sync::Arc;

use arrow_array::{
    Array, Int64Array, RecordBatch, RecordBatchIterator, RecordBatchReader, StringArray, TimestampMillisecondArray,
};
use chrono::Utc;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection, Table};

use knowdb_core::{Error, Result};

use crate::schema::meta_schema;

pub async fn open_db(uri: &str) -> Result<Connection> {
    connect(uri).execute().await.map_err(Error::unavailable)
}

pub async fn ensure_table(conn: &Connection, name: &str, schema: Arc<arrow_schema::Schema>) -> Result<()> {
    let names = conn.table_names().execute().await.map_err(Error::unavailable)?;
    if names.iter().any(|n| n == name) {
        return Ok(());
    }
    // create empty table with 0 rows
    let iter = RecordBatchIterator::new(vec![Ok(RecordBatch::new_empty(schema.clone()))].into_iter(), schema);
    conn.create_table(name, Box::new(iter)).execute().await.map_err(Error::unavailable)?;
    tracing::debug!(table = name, "created table");
    Ok(())
}

pub async fn open_table(conn: &Connection, name: &str) -> Result<Table> {
    conn.open_table(name).execute().await.map_err(Error::unavailable)
}

pub async fn set_meta(conn: &Connection, table: &str, key: &str, value: &str) -> Result<()> {
    ensure_table(conn, table, meta_schema()).await?;
    let t = open_table(conn, table).await?;
    let rb = RecordBatch::try_new(
        meta_schema(),
        vec![
            Arc::new(StringArray::from(vec![key.to_string()])),
            Arc::new(StringArray::from(vec![value.to_string()])),
            Arc::new(TimestampMillisecondArray::from(vec![Utc::now().timestamp_millis()])),
        ],
    )
    .map_err(Error::operation)?;
    // key is unique
    let mut mi = t.merge_insert(&["key"]);
    mi.when_matched_update_all(None).when_not_matched_insert_all();
    mi.execute(reader(rb)).await.map_err(Error::operation)?;
    Ok(())
}

pub async fn get_meta(conn: &Connection, table: &str, key: &str) -> Result<Option<String>> {
    let names = conn.table_names().execute().await.map_err(Error::unavailable)?;
    if !names.iter().any(|n| n == table) {
        return Ok(None);
    }
    let t = open_table(conn, table).await?;
    for batch in scan(&t, Some(&format!("key = {}", quote(key)))).await? {
        if batch.num_rows() == 0 {
            continue;
        }
        return Ok(Some(str_col(&batch, "value")?.value(0).to_string()));
    }
    Ok(None)
}

/// Reads every row matching `filter`.
///
/// Plain LanceDB queries carry a default row limit, so the limit is pinned to
/// the matching row count first.
pub async fn scan(table: &Table, filter: Option<&str>) -> Result<Vec<RecordBatch>> {
    let n = table.count_rows(filter.map(str::to_string)).await.map_err(Error::unavailable)?;
    if n == 0 {
        return Ok(Vec::new());
    }
    let mut q = table.query().limit(n);
    if let Some(f) = filter {
        q = q.only_if(f);
    }
    q.execute()
        .await
        .map_err(Error::unavailable)?
        .try_collect()
        .await
        .map_err(Error::operation)
}

pub fn reader(batch: RecordBatch) -> Box<dyn RecordBatchReader + Send> {
    let schema = batch.schema();
    Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema))
}

/// Single-quoted SQL string literal.
pub fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

pub fn in_list(values: &[String]) -> String {
    values.iter().map(|v| quote(v)).collect::<Vec<_>>().join(", ")
}

pub fn str_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| Error::Operation(format!("column '{}' missing or not utf8", name)))
}

pub fn i64_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Int64Array> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
        .ok_or_else(|| Error::Operation(format!("column '{}' missing or not int64", name)))
}

pub fn opt_str(col: &StringArray, i: usize) -> Option<String> {
    if col.is_null(i) {
        None
    } else {
        Some(col.value(i).to_string())
    }
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_escapes_single_quotes() {
        assert_eq!(quote("o'brien"), "'o''brien'");
        assert_eq!(in_list(&["a".into(), "b".into()]), "'a', 'b'");
    }

    #[tokio::test]
    async fn meta_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let conn = open_db(&tmp.path().to_string_lossy()).await.unwrap();
        assert_eq!(get_meta(&conn, "meta", "k").await.unwrap(), None);
        set_meta(&conn, "meta", "k", "v1").await.unwrap();
        set_meta(&conn, "meta", "k", "v2").await.unwrap();
        assert_eq!(get_meta(&conn, "meta", "k").await.unwrap().as_deref(), Some("v2"));
    }
}
