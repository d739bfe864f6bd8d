/// Durable key-value mirror for vector documents, backed by SQLite.
///
/// The mirror is write-behind: the in-memory store pushes operations onto a
/// channel and a background task applies them. Query paths never touch this
/// module, so persistence latency or failure cannot affect search.
use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::VectorDocument;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS vector_documents (
    id TEXT PRIMARY KEY,
    path TEXT NOT NULL,
    payload TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_vector_documents_path ON vector_documents(path);
"#;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("document payload error: {0}")]
    Payload(#[from] serde_json::Error),
}

/// A write operation mirrored from the in-memory store.
#[derive(Debug, Clone)]
pub enum StorageOp {
    Put(Box<VectorDocument>),
    Delete(String),
    DeleteByPath(String),
    Clear,
}

/// A SQLite connection initialized with the vector-document schema.
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Open (or create) the database at `path` and initialize the schema.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref();
        info!("opening vector storage: {}", path.display());
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (useful for testing).
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self { conn })
    }

    /// Insert or replace one document.
    pub fn put(&self, document: &VectorDocument) -> Result<(), StorageError> {
        let payload = serde_json::to_string(document)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO vector_documents (id, path, payload) VALUES (?, ?, ?)",
            params![document.id, document.metadata.path, payload],
        )?;
        Ok(())
    }

    /// Delete one document by id. Returns whether a row was removed.
    pub fn delete(&self, id: &str) -> Result<bool, StorageError> {
        let rows = self
            .conn
            .execute("DELETE FROM vector_documents WHERE id = ?", params![id])?;
        Ok(rows > 0)
    }

    /// Delete all documents at `path` or nested under it as a true
    /// path-segment prefix. Returns the removed count.
    pub fn delete_by_path(&self, path: &str) -> Result<usize, StorageError> {
        let rows = self.conn.execute(
            "DELETE FROM vector_documents WHERE path = ? OR path LIKE ? || '/%'",
            params![path, path],
        )?;
        Ok(rows)
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        self.conn.execute("DELETE FROM vector_documents", [])?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<VectorDocument>, StorageError> {
        let payload: Option<String> = self
            .conn
            .query_row(
                "SELECT payload FROM vector_documents WHERE id = ?",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        match payload {
            Some(p) => Ok(Some(serde_json::from_str(&p)?)),
            None => Ok(None),
        }
    }

    /// Load every stored document. Corrupt rows are skipped with a warning
    /// so one bad payload cannot hold the whole index hostage.
    pub fn load_all(&self) -> Result<Vec<VectorDocument>, StorageError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, payload FROM vector_documents ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut documents = Vec::new();
        for row in rows {
            let (id, payload) = row?;
            match serde_json::from_str(&payload) {
                Ok(doc) => documents.push(doc),
                Err(e) => warn!("skipping corrupt stored document {id}: {e}"),
            }
        }
        Ok(documents)
    }

    fn apply(&self, op: StorageOp) -> Result<(), StorageError> {
        match op {
            StorageOp::Put(doc) => self.put(&doc),
            StorageOp::Delete(id) => self.delete(&id).map(|_| ()),
            StorageOp::DeleteByPath(path) => self.delete_by_path(&path).map(|_| ()),
            StorageOp::Clear => self.clear(),
        }
    }
}

/// Spawn the write-behind task draining mirror operations into storage.
/// Failures are logged and dropped; the in-memory store stays authoritative.
pub fn spawn_mirror(storage: SqliteStorage) -> mpsc::UnboundedSender<StorageOp> {
    let (tx, mut rx) = mpsc::unbounded_channel::<StorageOp>();

    tokio::spawn(async move {
        while let Some(op) = rx.recv().await {
            if let Err(e) = storage.apply(op) {
                warn!("vector storage write failed (kept in memory): {e}");
            }
        }
    });

    tx
}
