use crate::config::Collection;
use crate::filter::{Comparison, MetadataFilter};
use crate::traits::{
    GetRequest, IndexedVector, Metadata, MetadataValue, SearchHit, StoredRecord, VectorIndex,
};
use anyhow::anyhow;
use log::{debug, info, warn};
use rusqlite::Connection;
use rusqlite::types::Value as SqlValue;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Leaves headroom under SQLite's bound parameter limit.
const MAX_SQL_PARAMS: usize = 30_000;

/// SQLite-backed vector store holding every collection in one database file.
///
/// Embeddings are stored as little-endian `f32` blobs and ranked by exact
/// cosine distance at query time.
pub struct SqliteVectorStore {
    db_path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteVectorStore {
    /// Opens (or creates) the database and makes sure the schema exists.
    pub fn open(db_path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        info!("Opening SqliteVectorStore at: {}", db_path.display());
        let conn =
            Connection::open(&db_path).map_err(|e| anyhow!("Failed to open database: {}", e))?;
        let store = SqliteVectorStore {
            db_path,
            conn: Arc::new(Mutex::new(conn)),
        };
        store.create_table()?;
        info!("SqliteVectorStore initialization complete: {}", store.db_path.display());
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Creates the vectors table if it is missing.
    pub fn create_table(&self) -> anyhow::Result<()> {
        let conn = lock(&self.conn)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS vectors (
                    collection TEXT NOT NULL,
                    id TEXT NOT NULL,
                    document TEXT,
                    metadata TEXT NOT NULL,
                    embedding BLOB NOT NULL,
                    createdAt REAL NOT NULL,
                    updatedAt REAL NOT NULL,
                    PRIMARY KEY (collection, id)
                )",
            [],
        )?;
        debug!("Created vectors table if it did not exist.");

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_vectors_file_path
                ON vectors (collection, json_extract(metadata, '$.file_path'))",
            [],
        )?;
        debug!("Created file_path index if it did not exist.");
        Ok(())
    }

    /// Returns a handle to one collection; handles share the connection.
    pub fn collection(&self, collection: Collection) -> SqliteCollection {
        SqliteCollection {
            name: collection.as_str().to_string(),
            conn: Arc::clone(&self.conn),
        }
    }

    /// Row counts for every known collection.
    pub fn stats(&self) -> anyhow::Result<Vec<(Collection, usize)>> {
        Collection::ALL
            .iter()
            .map(|c| Ok((*c, self.collection(*c).count()?)))
            .collect()
    }
}

/// A single collection inside a [`SqliteVectorStore`].
#[derive(Clone)]
pub struct SqliteCollection {
    name: String,
    conn: Arc<Mutex<Connection>>,
}

struct Row {
    id: String,
    document: Option<String>,
    metadata: Metadata,
    embedding: Option<Vec<f32>>,
}

impl SqliteCollection {
    /// Loads rows ordered by id. `ids` and the equality or membership leaves of
    /// `filter` are evaluated by SQLite; callers still apply the full filter.
    fn load_rows(
        &self,
        with_embeddings: bool,
        ids: Option<&[String]>,
        filter: Option<&MetadataFilter>,
    ) -> anyhow::Result<Vec<Row>> {
        let (sql, params) = select_sql(&self.name, with_embeddings, ids, filter);
        let conn = lock(&self.conn)?;
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| anyhow!("Failed to prepare vector scan: {}", e))?;

        let row_iter = stmt
            .query_map(rusqlite::params_from_iter(params.iter()), |row| {
                let id: String = row.get(0)?;
                let document: Option<String> = row.get(1)?;
                let metadata_str: String = row.get(2)?;
                let embedding_bytes: Option<Vec<u8>> = row.get(3)?;
                Ok((id, document, metadata_str, embedding_bytes))
            })
            .map_err(|e| anyhow!("Failed to query vectors: {}", e))?;

        let mut rows = Vec::new();
        for result in row_iter {
            let (id, document, metadata_str, embedding_bytes) =
                result.map_err(|e| anyhow!("Failed to read vector row: {}", e))?;
            let metadata: Metadata = serde_json::from_str(&metadata_str)
                .map_err(|e| anyhow!("Corrupt metadata for {}: {}", id, e))?;
            rows.push(Row {
                id,
                document,
                metadata,
                embedding: embedding_bytes.map(|bytes| decode_embedding(&bytes)),
            });
        }
        rows.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(rows)
    }
}

fn select_sql(
    collection: &str,
    with_embeddings: bool,
    ids: Option<&[String]>,
    filter: Option<&MetadataFilter>,
) -> (String, Vec<SqlValue>) {
    let mut sql = format!(
        "SELECT id, document, metadata, {} FROM vectors WHERE collection = ?",
        if with_embeddings { "embedding" } else { "NULL" }
    );
    let mut params = vec![SqlValue::Text(collection.to_string())];

    if let Some(ids) = ids {
        let values = ids.iter().map(|id| SqlValue::Text(id.clone())).collect();
        push_in_clause(&mut sql, &mut params, "id", values);
    }
    for (key, op) in filter.map(sql_predicates).unwrap_or_default() {
        let column = format!("json_extract(metadata, '$.{}')", key);
        match op {
            Comparison::Eq(value) if params.len() < MAX_SQL_PARAMS => {
                sql.push_str(&format!(" AND {} = ?", column));
                params.push(to_sql_value(value));
            }
            Comparison::In(values) => {
                let values = values.iter().map(to_sql_value).collect();
                push_in_clause(&mut sql, &mut params, &column, values);
            }
            _ => {}
        }
    }
    (sql, params)
}

fn push_in_clause(sql: &mut String, params: &mut Vec<SqlValue>, column: &str, values: Vec<SqlValue>) {
    if values.is_empty() {
        sql.push_str(" AND 0");
        return;
    }
    if params.len() + values.len() > MAX_SQL_PARAMS {
        debug!("Skipping SQL pushdown for {} ({} values)", column, values.len());
        return;
    }
    let placeholders = vec!["?"; values.len()].join(", ");
    sql.push_str(&format!(" AND {} IN ({})", column, placeholders));
    params.extend(values);
}

/// Equality and membership leaves reachable through top-level `$and`.
fn sql_predicates(filter: &MetadataFilter) -> Vec<(&str, &Comparison)> {
    match filter {
        MetadataFilter::Field { key, op } if is_plain_key(key) => match op {
            Comparison::Eq(_) | Comparison::In(_) => vec![(key.as_str(), op)],
            _ => Vec::new(),
        },
        MetadataFilter::And(filters) => filters.iter().flat_map(sql_predicates).collect(),
        _ => Vec::new(),
    }
}

fn is_plain_key(key: &str) -> bool {
    !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn to_sql_value(value: &MetadataValue) -> SqlValue {
    match value {
        MetadataValue::Bool(b) => SqlValue::Integer(i64::from(*b)),
        MetadataValue::Int(i) => SqlValue::Integer(*i),
        MetadataValue::Float(f) => SqlValue::Real(*f),
        MetadataValue::Str(s) => SqlValue::Text(s.clone()),
    }
}

impl VectorIndex for SqliteCollection {
    fn name(&self) -> &str {
        &self.name
    }

    /// Inserts or replaces all records in one transaction.
    fn upsert(&self, records: &[IndexedVector]) -> anyhow::Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let now = now_secs();
        let mut conn = lock(&self.conn)?;
        let tx = conn
            .transaction()
            .map_err(|e| anyhow!("Failed to start transaction: {}", e))?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO vectors (collection, id, document, metadata, embedding, createdAt, updatedAt)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                 ON CONFLICT(collection, id) DO UPDATE SET
                    document = excluded.document,
                    metadata = excluded.metadata,
                    embedding = excluded.embedding,
                    updatedAt = excluded.updatedAt",
            )?;
            for record in records {
                let metadata_str = serde_json::to_string(&record.metadata)
                    .map_err(|e| anyhow!("Failed to serialize metadata: {}", e))?;
                stmt.execute(rusqlite::params![
                    self.name,
                    record.id,
                    record.document,
                    metadata_str,
                    encode_embedding(&record.embedding),
                    now
                ])
                .map_err(|e| anyhow!("Failed to upsert vector {}: {}", record.id, e))?;
            }
        }
        tx.commit()
            .map_err(|e| anyhow!("Failed to commit upsert: {}", e))?;
        debug!("Upserted {} vectors into '{}'", records.len(), self.name);
        Ok(())
    }

    fn query(
        &self,
        embedding: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> anyhow::Result<Vec<SearchHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut hits = Vec::new();
        for row in self.load_rows(true, None, filter)? {
            if filter.is_some_and(|f| !f.matches(&row.metadata)) {
                continue;
            }
            let Some(stored) = row.embedding.as_deref() else {
                continue;
            };
            let Some(distance) = cosine_distance(embedding, stored) else {
                warn!(
                    "Skipping {} in '{}': dimension {} does not match query dimension {}",
                    row.id,
                    self.name,
                    stored.len(),
                    embedding.len()
                );
                continue;
            };
            hits.push(SearchHit {
                id: row.id,
                distance,
                metadata: row.metadata,
                document: row.document,
            });
        }

        // Sort by distance ascending; rows arrive ordered by id so ties stay stable
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(k);

        debug!("Query on '{}' returned {} results.", self.name, hits.len());
        Ok(hits)
    }

    fn get(&self, request: &GetRequest) -> anyhow::Result<Vec<StoredRecord>> {
        let wanted: Option<HashSet<&str>> = request
            .ids
            .as_ref()
            .map(|ids| ids.iter().map(String::as_str).collect());

        let records = self
            .load_rows(
                request.include.embeddings,
                request.ids.as_deref(),
                request.filter.as_ref(),
            )?
            .into_iter()
            .filter(|row| wanted.as_ref().is_none_or(|ids| ids.contains(row.id.as_str())))
            .filter(|row| request.filter.as_ref().is_none_or(|f| f.matches(&row.metadata)))
            .map(|row| StoredRecord {
                id: row.id,
                metadata: request.include.metadatas.then_some(row.metadata),
                document: if request.include.documents { row.document } else { None },
                embedding: row.embedding,
            })
            .collect::<Vec<_>>();

        debug!("Get on '{}' matched {} records.", self.name, records.len());
        Ok(records)
    }

    fn count(&self) -> anyhow::Result<usize> {
        let conn = lock(&self.conn)?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM vectors WHERE collection = ?1",
                rusqlite::params![self.name],
                |row| row.get(0),
            )
            .map_err(|e| anyhow!("Failed to count vectors: {}", e))?;
        Ok(count as usize)
    }
}

fn lock(conn: &Mutex<Connection>) -> anyhow::Result<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|_| anyhow!("Database connection lock poisoned"))
}

fn now_secs() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// `1 - cos(a, b)`, in `[0, 2]`. `None` when the lengths differ.
/// A zero vector is treated as orthogonal to everything.
fn cosine_distance(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.len() != b.len() {
        return None;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return Some(1.0);
    }
    let similarity = (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0);
    Some(1.0 - similarity)
}
