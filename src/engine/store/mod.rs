// Praxis Engine — Graph Store
// Persists the shared knowledge graph and per-account trajectory logs in
// SQLite via rusqlite. Uses its own connection behind a parking_lot mutex;
// every multi-row logical step runs inside one transaction on that handle.
//
// Module layout:
//   schema          — idempotent migrations, run once at open
//   entities        — entity CRUD + find-or-create with contributor tracking
//   graph           — directed edge and co-occurrence upserts and reads
//   trajectories    — trajectory rows and the append-only event log
//   conversations   — conversation + message containers

use log::info;
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::{Path, PathBuf};

use crate::atoms::error::EngineResult;

mod conversations;
mod entities;
mod graph;
mod schema;
mod trajectories;

pub use entities::FindOrCreateOutcome;

/// Get the default path for the engine's SQLite database.
pub fn default_db_path() -> PathBuf {
    let home = dirs::home_dir().unwrap_or_default();
    let dir = home.join(".praxis");
    std::fs::create_dir_all(&dir).ok();
    dir.join("engine.db")
}

/// Thread-safe database wrapper.
pub struct GraphStore {
    /// The SQLite connection, protected by a Mutex.
    /// `pub(crate)` so colocated tests can inspect rows directly.
    pub(crate) conn: Mutex<Connection>,
}

impl GraphStore {
    /// Open (or create) the database at `path` and initialize tables.
    pub fn open(path: &Path) -> EngineResult<Self> {
        info!("[store] Opening graph store at {:?}", path);

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .ok();

        schema::run_migrations(&conn)?;

        Ok(GraphStore { conn: Mutex::new(conn) })
    }

    /// Open at the default location (`~/.praxis/engine.db`).
    pub fn open_default() -> EngineResult<Self> {
        Self::open(&default_db_path())
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> EngineResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;").ok();
        schema::run_migrations(&conn)?;
        Ok(GraphStore { conn: Mutex::new(conn) })
    }
}

/// Current time as integer epoch milliseconds — the storage format for
/// every timestamp column.
pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
