//! Credential directory: username/password registration and verification.
//!
//! Plain CRUD over the same SQLite file as the metadata store — outside the
//! core's concurrency model. Passwords are stored salted and hashed, never
//! in clear.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

/// Errors from the credential directory.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("username already exists")]
    UsernameTaken,

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("user directory error: {0}")]
    Storage(#[from] anyhow::Error),
}

/// The established session identity: what `/signin` returns and what the
/// core uses as `user_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    pub username: String,
    pub user_id: String,
}

/// SQLite-backed user directory.
#[derive(Clone)]
pub struct UserDirectory {
    db_path: PathBuf,
}

impl UserDirectory {
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self, DirectoryError> {
        let db_path = db_path.as_ref().to_path_buf();
        let conn = Connection::open(&db_path).map_err(storage)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                user_id TEXT PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                salt TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )
        .map_err(storage)?;
        Ok(Self { db_path })
    }

    /// Register a new user. Fails with `UsernameTaken` on a duplicate.
    pub async fn register(
        &self,
        username: &str,
        password: &str,
    ) -> Result<UserAccount, DirectoryError> {
        let db_path = self.db_path.clone();
        let username = username.to_string();
        let password = password.to_string();

        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path).map_err(storage)?;

            let exists: Option<String> = conn
                .query_row(
                    "SELECT user_id FROM users WHERE username = ?1",
                    params![username],
                    |row| row.get(0),
                )
                .optional()
                .map_err(storage)?;
            if exists.is_some() {
                return Err(DirectoryError::UsernameTaken);
            }

            let user_id = Uuid::new_v4().to_string();
            let salt = Uuid::new_v4().to_string();
            let password_hash = hash_password(&salt, &password);
            conn.execute(
                "INSERT INTO users (user_id, username, password_hash, salt, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    user_id,
                    username,
                    password_hash,
                    salt,
                    chrono::Utc::now().to_rfc3339()
                ],
            )
            .map_err(storage)?;

            Ok(UserAccount { username, user_id })
        })
        .await
        .map_err(|e| DirectoryError::Storage(anyhow::anyhow!(e)))?
    }

    /// Verify credentials. Fails with `InvalidCredentials` for an unknown
    /// username or a wrong password — indistinguishably, on purpose.
    pub async fn verify(
        &self,
        username: &str,
        password: &str,
    ) -> Result<UserAccount, DirectoryError> {
        let db_path = self.db_path.clone();
        let username = username.to_string();
        let password = password.to_string();

        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path).map_err(storage)?;

            let row: Option<(String, String, String)> = conn
                .query_row(
                    "SELECT user_id, password_hash, salt FROM users WHERE username = ?1",
                    params![username],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()
                .map_err(storage)?;

            let (user_id, password_hash, salt) =
                row.ok_or(DirectoryError::InvalidCredentials)?;
            if hash_password(&salt, &password) != password_hash {
                return Err(DirectoryError::InvalidCredentials);
            }

            Ok(UserAccount { username, user_id })
        })
        .await
        .map_err(|e| DirectoryError::Storage(anyhow::anyhow!(e)))?
    }
}

fn storage(e: rusqlite::Error) -> DirectoryError {
    DirectoryError::Storage(anyhow::anyhow!(e))
}

fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> (UserDirectory, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let directory = UserDirectory::new(dir.path().join("users.db")).unwrap();
        (directory, dir)
    }

    #[tokio::test]
    async fn test_register_then_verify() {
        let (directory, _guard) = directory();
        let account = directory.register("yash", "hunter2").await.unwrap();
        assert_eq!(account.username, "yash");
        assert!(!account.user_id.is_empty());

        let verified = directory.verify("yash", "hunter2").await.unwrap();
        assert_eq!(verified, account);
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() {
        let (directory, _guard) = directory();
        directory.register("yash", "hunter2").await.unwrap();
        let result = directory.register("yash", "other").await;
        assert!(matches!(result, Err(DirectoryError::UsernameTaken)));
    }

    #[tokio::test]
    async fn test_wrong_password_rejected() {
        let (directory, _guard) = directory();
        directory.register("yash", "hunter2").await.unwrap();
        let result = directory.verify("yash", "wrong").await;
        assert!(matches!(result, Err(DirectoryError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_unknown_user_rejected() {
        let (directory, _guard) = directory();
        let result = directory.verify("ghost", "whatever").await;
        assert!(matches!(result, Err(DirectoryError::InvalidCredentials)));
    }

    #[test]
    fn test_password_hash_depends_on_salt() {
        assert_ne!(
            hash_password("salt-a", "hunter2"),
            hash_password("salt-b", "hunter2")
        );
    }
}
