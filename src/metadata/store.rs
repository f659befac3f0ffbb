//! Metadata persistence behind a document-store interface.
//!
//! Two backends: SQLite for durable single-node deployments (one row per
//! user, the record serialized as a JSON document) and an in-memory map for
//! tests and ephemeral runs. rusqlite is synchronous, so the SQLite backend
//! wraps each operation in a tokio blocking task.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dashmap::DashMap;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::StoreError;
use crate::metadata::UserMetadata;

/// Document-store interface for user metadata. Upsert replaces any existing
/// record for the same `user_id`, preserving the row identity.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn find_by_user_id(&self, user_id: &str) -> Result<Option<UserMetadata>, StoreError>;

    async fn upsert(&self, metadata: &UserMetadata) -> Result<(), StoreError>;
}

/// SQLite-backed metadata store.
pub struct SqliteMetadataStore {
    db_path: PathBuf,
}

impl SqliteMetadataStore {
    /// Open (or create) the database at `db_path` and ensure the metadata
    /// table exists.
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            }
        }

        let conn = Connection::open(&db_path).map_err(unavailable)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS user_metadata (
                user_id TEXT PRIMARY KEY,
                doc TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )
        .map_err(unavailable)?;

        Ok(Self { db_path })
    }
}

fn unavailable(e: rusqlite::Error) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn find_by_user_id(&self, user_id: &str) -> Result<Option<UserMetadata>, StoreError> {
        let db_path = self.db_path.clone();
        let user_id = user_id.to_string();

        let doc: Option<String> = tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path).map_err(unavailable)?;
            conn.query_row(
                "SELECT doc FROM user_metadata WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(unavailable)
        })
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))??;

        match doc {
            Some(doc) => Ok(Some(serde_json::from_str(&doc)?)),
            None => Ok(None),
        }
    }

    async fn upsert(&self, metadata: &UserMetadata) -> Result<(), StoreError> {
        let db_path = self.db_path.clone();
        let user_id = metadata.user_id.clone();
        let doc = serde_json::to_string(metadata)?;
        let updated_at = metadata.last_interaction.to_rfc3339();

        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path).map_err(unavailable)?;
            conn.execute(
                "INSERT INTO user_metadata (user_id, doc, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_id) DO UPDATE SET
                     doc = excluded.doc,
                     updated_at = excluded.updated_at",
                params![user_id, doc, updated_at],
            )
            .map_err(unavailable)?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))?
    }
}

/// In-memory metadata store for tests and ephemeral runs.
#[derive(Default)]
pub struct InMemoryMetadataStore {
    records: DashMap<String, UserMetadata>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn find_by_user_id(&self, user_id: &str) -> Result<Option<UserMetadata>, StoreError> {
        Ok(self.records.get(user_id).map(|r| r.clone()))
    }

    async fn upsert(&self, metadata: &UserMetadata) -> Result<(), StoreError> {
        self.records
            .insert(metadata.user_id.clone(), metadata.clone());
        Ok(())
    }
}
