//! SQLite persistence for the trade journal

use parking_lot::Mutex;
use rusqlite::{Connection, Result as SqlResult};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::error::{BotError, BotResult};

pub mod journal;

pub use journal::{AttemptCounts, AttemptRecord, ResultRecord, TradeJournal};

/// Shared SQLite connection
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) a database file, creating its directory if needed
    pub fn new<P: AsRef<Path>>(path: P) -> SqlResult<Self> {
        if let Some(dir) = path.as_ref().parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|_| rusqlite::Error::InvalidPath(dir.to_path_buf()))?;
        }
        let conn = Connection::open(path)?;

        // Enable foreign keys
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        Ok(Database {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open a file database with its schema applied, ready for journaling
    pub fn open<P: AsRef<Path>>(path: P) -> BotResult<Self> {
        let path = path.as_ref();
        let db = Self::new(path)
            .and_then(|db| db.run_migrations().map(|_| db))
            .map_err(|e| BotError::DatabaseConnection(format!("{}: {}", path.display(), e)))?;
        Ok(db)
    }

    /// Create an in-memory database (for testing)
    pub fn new_in_memory() -> SqlResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        Ok(Database {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run migrations to set up or update the schema
    pub fn run_migrations(&self) -> SqlResult<()> {
        let conn = self.conn.lock();
        let migration_sql = include_str!("migrations/V1__journal.sql");
        conn.execute_batch(migration_sql)?;
        Ok(())
    }

    /// Get a reference to the connection (for custom queries)
    pub fn get_connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.conn)
    }

    /// Check database health
    pub fn health_check(&self) -> SqlResult<bool> {
        let conn = self.conn.lock();
        let result: i32 = conn.query_row("SELECT 1", [], |row| row.get(0))?;
        Ok(result == 1)
    }
}
