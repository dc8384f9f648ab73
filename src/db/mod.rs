//! Persistence layer for users, the library, listens and feedback.
//!
//! Uses SQLx with SQLite. All access goes through a [`Session`], which
//! bundles a transaction with a guard on a process-wide reader/writer lock:
//!
//! - [`Db::read`] opens a *shared* session. Any number may run at once.
//! - [`Db::write`] opens a *unique* session. It excludes every other session
//!   and must be [`Session::commit`]ted, dropping it rolls back.
//!
//! Mutating operations are only defined on `Session<Unique>`, so a write
//! under a shared session does not compile.
//!
//! Sessions do not nest: never open a second session while holding one.
//!
//! # Example
//!
//! ```ignore
//! use playsync::db::Db;
//!
//! let db = Db::open(&db_url(None)).await?;
//! let mut session = db.write().await?;
//! let user = session.create_user("alice").await?;
//! session.commit().await?;
//! ```

mod listens;
mod starred;
mod stats;
mod tracks;
mod users;

use std::marker::PhantomData;
use std::sync::Arc;

use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::{Sqlite, SqlitePool, SqlitePoolOptions};
use sqlx::Transaction;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

use crate::error::Result;

pub use tracks::NewTrack;

/// Default database filename.
pub const DEFAULT_DB_NAME: &str = "playsync.db";

/// Build a SQLite database URL from an optional path.
///
/// If no path is provided, uses [`DEFAULT_DB_NAME`] in the current directory.
pub fn db_url(path: Option<&std::path::Path>) -> String {
    match path {
        Some(p) => format!("sqlite:{}", p.display()),
        None => format!("sqlite:{}", DEFAULT_DB_NAME),
    }
}

/// Marker for read-only sessions.
#[derive(Debug)]
pub struct Shared;

/// Marker for read-write sessions.
#[derive(Debug)]
pub struct Unique;

#[derive(Debug)]
enum Guard {
    Read(#[allow(dead_code)] OwnedRwLockReadGuard<()>),
    Write(#[allow(dead_code)] OwnedRwLockWriteGuard<()>),
}

/// Handle on the database, cheap to clone.
#[derive(Debug, Clone)]
pub struct Db {
    pool: SqlitePool,
    lock: Arc<RwLock<()>>,
}

impl Db {
    /// Open (creating if needed) the database and run pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Database creation fails
    /// - Connection cannot be established
    /// - Migration fails
    pub async fn open(db_url: &str) -> Result<Self> {
        if !Sqlite::database_exists(db_url).await.unwrap_or(false) {
            Sqlite::create_database(db_url).await?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::debug!(target: "db", url = db_url, "Database ready");

        Ok(Self {
            pool,
            lock: Arc::new(RwLock::new(())),
        })
    }

    /// Begin a shared (read) session.
    pub async fn read(&self) -> Result<Session<Shared>> {
        let guard = self.lock.clone().read_owned().await;
        let tx = self.pool.begin().await?;
        Ok(Session {
            tx,
            _guard: Guard::Read(guard),
            _mode: PhantomData,
        })
    }

    /// Begin a unique (write) session.
    pub async fn write(&self) -> Result<Session<Unique>> {
        let guard = self.lock.clone().write_owned().await;
        let tx = self.pool.begin().await?;
        Ok(Session {
            tx,
            _guard: Guard::Write(guard),
            _mode: PhantomData,
        })
    }

    /// Close the underlying pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// A transaction scoped by the process-wide lock.
///
/// The transaction is declared before the guard so that it rolls back
/// before the lock is released.
#[derive(Debug)]
pub struct Session<M> {
    tx: Transaction<'static, Sqlite>,
    _guard: Guard,
    _mode: PhantomData<M>,
}

impl Session<Unique> {
    /// Commit every change made in this session.
    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

/// Bind helper: SQLite has no unsigned 64-bit type.
fn to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::temp_db;

    #[tokio::test]
    async fn test_open_creates_database() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let db = Db::open(&db_url(Some(&db_path))).await.expect("Failed to open db");
        assert!(db_path.exists());

        let mut session = db.read().await.unwrap();
        assert!(session.users().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dropped_write_session_rolls_back() {
        let (db, _dir) = temp_db().await;

        {
            let mut session = db.write().await.unwrap();
            session.create_user("ghost").await.unwrap();
            // no commit
        }

        let mut session = db.read().await.unwrap();
        assert!(session.find_user_by_login("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_shared_sessions_run_concurrently() {
        let (db, _dir) = temp_db().await;

        let first = db.read().await.unwrap();
        let second = tokio::time::timeout(std::time::Duration::from_secs(1), db.read()).await;
        assert!(second.is_ok(), "second reader should not wait for the first");
        drop(first);
    }

    #[tokio::test]
    async fn test_unique_session_excludes_readers() {
        let (db, _dir) = temp_db().await;

        let writer = db.write().await.unwrap();
        let reader = tokio::time::timeout(std::time::Duration::from_millis(100), db.read()).await;
        assert!(reader.is_err(), "reader must wait for the writer");
        writer.commit().await.unwrap();

        assert!(db.read().await.is_ok());
    }
}
