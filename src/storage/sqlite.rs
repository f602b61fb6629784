//! `SQLite` storage implementation.
//!
//! One database file serves both persistence concerns: workflow
//! checkpoints (single writer per thread) and the retriever's named
//! collections with their embeddings. Connections are opened per
//! [`Database`] handle; handles are cheap to clone and safe to share.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};

use super::schema::{
    CHECK_SCHEMA_SQL, CURRENT_SCHEMA_VERSION, GET_VERSION_SQL, SCHEMA_SQL, SET_VERSION_SQL,
    get_migrations_from,
};
use super::traits::{Checkpoint, CheckpointStore, InstallDocument, RunStatus};
use crate::error::{Error, Result, StorageError};
use crate::state::{KbStatus, WorkflowState};

/// Suffix appended to a collection name during staged installation.
const STAGING_SUFFIX: &str = "__staging";

/// A document row with its embedding, as read back for retrieval scoring.
#[derive(Debug, Clone)]
pub struct EmbeddedDocument {
    /// Stable source identifier.
    pub source_id: String,
    /// Display title, where one exists.
    pub title: Option<String>,
    /// Chunk text.
    pub content: String,
    /// Extensible metadata.
    pub metadata: BTreeMap<String, String>,
    /// Embedding vector.
    pub embedding: Vec<f32>,
}

/// Shared handle over the Test-Smith `SQLite` database.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens (and initializes) the database at `path`.
    ///
    /// Parent directories are created as needed. Initialization is
    /// idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the schema cannot
    /// be created.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::Io(crate::error::IoError::DirectoryFailed {
                    path: parent.display().to_string(),
                    reason: e.to_string(),
                })
            })?;
        }
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database. Used by tests.
    ///
    /// # Errors
    ///
    /// Returns an error if schema creation fails.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let initialized: i64 = conn.query_row(CHECK_SCHEMA_SQL, [], |row| row.get(0))?;
        if initialized == 0 {
            conn.execute_batch(SCHEMA_SQL)?;
            conn.execute(SET_VERSION_SQL, params![CURRENT_SCHEMA_VERSION.to_string()])?;
            return Ok(());
        }

        let version: u32 = conn
            .query_row(GET_VERSION_SQL, [], |row| {
                row.get::<_, String>(0).map(|v| v.parse().unwrap_or(0))
            })
            .optional()?
            .unwrap_or(0);
        for migration in get_migrations_from(version) {
            conn.execute_batch(migration.sql)
                .map_err(|e| StorageError::Migration(e.to_string()))?;
            conn.execute(SET_VERSION_SQL, params![migration.to_version.to_string()])?;
        }
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Database("connection lock poisoned".to_string()).into())
    }

    // ==================== Collection operations ====================

    /// Installs documents into `collection` through a staging collection,
    /// swapping names in one transaction so readers never observe a
    /// partial install.
    ///
    /// # Errors
    ///
    /// Returns an error if any write fails; the target collection is left
    /// untouched in that case.
    pub fn install(&self, collection: &str, documents: &[InstallDocument]) -> Result<()> {
        let staging = format!("{collection}{STAGING_SUFFIX}");
        let now = Utc::now().to_rfc3339();
        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| StorageError::Transaction(e.to_string()))?;

        // Replace any leftover staging collection from a failed install.
        tx.execute("DELETE FROM collections WHERE name = ?1", params![staging])?;
        tx.execute(
            "INSERT INTO collections (name, created_at) VALUES (?1, ?2)",
            params![staging, now],
        )?;
        let staging_id = tx.last_insert_rowid();

        for doc in documents {
            let metadata = serde_json::to_string(&doc.metadata)
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            tx.execute(
                "INSERT INTO documents
                 (collection_id, source_id, title, content, content_hash, metadata, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    staging_id,
                    doc.source_id,
                    doc.title,
                    doc.content,
                    doc.content_hash,
                    metadata,
                    now
                ],
            )?;
            let doc_id = tx.last_insert_rowid();
            tx.execute(
                "INSERT INTO document_embeddings
                 (document_id, embedding, dimensions, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    doc_id,
                    encode_embedding(&doc.embedding),
                    doc.embedding.len() as i64,
                    now
                ],
            )?;
        }

        // Atomic swap: drop the old collection, rename staging over it.
        tx.execute(
            "DELETE FROM collections WHERE name = ?1",
            params![collection],
        )?;
        tx.execute(
            "UPDATE collections SET name = ?1 WHERE id = ?2",
            params![collection, staging_id],
        )?;
        tx.commit()
            .map_err(|e| StorageError::Transaction(e.to_string()))?;
        Ok(())
    }

    /// Reports status of a named collection for the planner.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn kb_status(&self, collection: &str, sample_size: usize) -> Result<KbStatus> {
        let conn = self.conn()?;
        let collection_id: Option<i64> = conn
            .query_row(
                "SELECT id FROM collections WHERE name = ?1",
                params![collection],
                |row| row.get(0),
            )
            .optional()?;

        let Some(id) = collection_id else {
            return Ok(KbStatus {
                collection: collection.to_string(),
                exists: false,
                chunk_count: 0,
                sample_titles: Vec::new(),
            });
        };

        let chunk_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE collection_id = ?1",
            params![id],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(
            "SELECT DISTINCT COALESCE(title, source_id) FROM documents
             WHERE collection_id = ?1 ORDER BY 1 LIMIT ?2",
        )?;
        let sample_titles = stmt
            .query_map(params![id, sample_size as i64], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(KbStatus {
            collection: collection.to_string(),
            exists: true,
            chunk_count: chunk_count.max(0) as u64,
            sample_titles,
        })
    }

    /// Reads every document (with embedding) in a collection.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::CollectionNotFound`] for unknown
    /// collections.
    pub fn embedded_documents(&self, collection: &str) -> Result<Vec<EmbeddedDocument>> {
        let conn = self.conn()?;
        let collection_id: i64 = conn
            .query_row(
                "SELECT id FROM collections WHERE name = ?1",
                params![collection],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| StorageError::CollectionNotFound {
                name: collection.to_string(),
            })?;

        let mut stmt = conn.prepare(
            "SELECT d.source_id, d.title, d.content, d.metadata, e.embedding
             FROM documents d JOIN document_embeddings e ON e.document_id = d.id
             WHERE d.collection_id = ?1 ORDER BY d.id",
        )?;
        let rows = stmt.query_map(params![collection_id], |row| {
            let metadata_json: Option<String> = row.get(3)?;
            let blob: Vec<u8> = row.get(4)?;
            Ok(EmbeddedDocument {
                source_id: row.get(0)?,
                title: row.get(1)?,
                content: row.get(2)?,
                metadata: metadata_json
                    .and_then(|m| serde_json::from_str(&m).ok())
                    .unwrap_or_default(),
                embedding: decode_embedding(&blob),
            })
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    // ==================== Checkpoint operations ====================

    fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()> {
        let state = serde_json::to_string(&checkpoint.state)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let status = status_text(checkpoint.status);
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO checkpoints (thread_id, workflow, step, status, state, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                checkpoint.thread_id,
                checkpoint.workflow,
                checkpoint.step,
                status,
                state,
                checkpoint.timestamp.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    fn row_to_checkpoint(row: &rusqlite::Row<'_>) -> rusqlite::Result<Checkpoint> {
        let thread_id: String = row.get(0)?;
        let workflow: String = row.get(1)?;
        let step: String = row.get(2)?;
        let status: String = row.get(3)?;
        let state: String = row.get(4)?;
        let created_at: String = row.get(5)?;
        let parsed_state: WorkflowState = serde_json::from_str(&state).unwrap_or_default();
        let timestamp = chrono::DateTime::parse_from_rfc3339(&created_at)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        Ok(Checkpoint {
            thread_id,
            workflow,
            step,
            status: parse_status(&status),
            state: parsed_state,
            timestamp,
        })
    }
}

fn status_text(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Running => "running",
        RunStatus::Completed => "completed",
        RunStatus::Cancelled => "cancelled",
    }
}

fn parse_status(text: &str) -> RunStatus {
    match text {
        "completed" => RunStatus::Completed,
        "cancelled" => RunStatus::Cancelled,
        _ => RunStatus::Running,
    }
}

impl CheckpointStore for Database {
    fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        self.save_checkpoint(checkpoint)
    }

    fn latest(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT thread_id, workflow, step, status, state, created_at
                 FROM checkpoints WHERE thread_id = ?1 ORDER BY id DESC LIMIT 1",
                params![thread_id],
                Self::row_to_checkpoint,
            )
            .optional()?;
        Ok(row)
    }

    fn list(&self, thread_id: &str) -> Result<Vec<Checkpoint>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT thread_id, workflow, step, status, state, created_at
             FROM checkpoints WHERE thread_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![thread_id], Self::row_to_checkpoint)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    fn prune(&self, thread_id: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM checkpoints WHERE thread_id = ?1 AND id NOT IN
             (SELECT MAX(id) FROM checkpoints WHERE thread_id = ?1)",
            params![thread_id],
        )?;
        Ok(())
    }

    fn delete_thread(&self, thread_id: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM checkpoints WHERE thread_id = ?1",
            params![thread_id],
        )?;
        Ok(())
    }
}

/// Serializes an embedding as little-endian `f32` bytes.
#[must_use]
pub fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for value in embedding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Deserializes little-endian `f32` bytes back into an embedding.
#[must_use]
pub fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
