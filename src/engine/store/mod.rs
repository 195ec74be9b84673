// omem Engine — Fact Store
// Durable storage for facts, entities, relations, episodes, and the rolling
// summary in a single SQLite file via rusqlite.
//
// Module layout:
//   schema    — idempotent migrations + summary-row bootstrap
//   vector    — f32 blob codecs + query-normalized similarity scoring
//   facts     — fact CRUD, access bumps, obsolescence, pruning
//   search    — semantic scan + FTS5/BM25 with simple lexical fallback
//   entities  — entity/relation rows for the graph layer
//   episodes  — episode rows
//   summary   — rolling-summary singleton row

use crate::atoms::config::EngineConfig;
use crate::atoms::error::MemoryResult;
use chrono::{DateTime, Utc};
use log::info;
use parking_lot::Mutex;
use rusqlite::Connection;

mod entities;
mod episodes;
mod facts;
mod schema;
mod search;
mod summary;
pub(crate) mod vector;

pub use search::SEMANTIC_CANDIDATE_WINDOW;

/// Timestamp format used across all tables.
pub(crate) const TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Current UTC instant in the store's timestamp format.
pub(crate) fn now_ts() -> String {
    Utc::now().format(TS_FORMAT).to_string()
}

/// Format an instant in the store's timestamp format.
pub(crate) fn format_ts(dt: DateTime<Utc>) -> String {
    dt.format(TS_FORMAT).to_string()
}

/// Lenient timestamp parse: store format first, RFC3339 fallback.
pub(crate) fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    chrono::NaiveDateTime::parse_from_str(s, TS_FORMAT)
        .map(|ndt| ndt.and_utc())
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
        })
}

/// Thread-safe database wrapper shared by the fact store and entity graph.
pub struct FactStore {
    /// The SQLite connection, protected by a Mutex. The embedded database
    /// handles its own internal serialization; this lock is the
    /// single-writer discipline for prepared operations.
    pub(crate) conn: Mutex<Connection>,
    pub(crate) fts_enabled: bool,
    max_facts: usize,
    prune_threshold: usize,
    prune_keep_recent: usize,
}

impl FactStore {
    /// Open (or create) the database at the configured path and run
    /// migrations.
    pub fn open(cfg: &EngineConfig) -> MemoryResult<Self> {
        info!("[store] Opening fact store at {}", cfg.db_path);
        let conn = Connection::open(&cfg.db_path)?;
        Self::from_connection(conn, cfg)
    }

    /// Create an in-memory store. Used by tests and short-lived sessions.
    pub fn open_in_memory(cfg: &EngineConfig) -> MemoryResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, cfg)
    }

    fn from_connection(conn: Connection, cfg: &EngineConfig) -> MemoryResult<Self> {
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();
        conn.execute_batch("PRAGMA foreign_keys=ON;").ok();

        schema::run_migrations(&conn, cfg.enable_fts)?;

        // FTS5 may be missing from the linked SQLite; fall back to the
        // simple lexical scorer when the virtual table did not materialize.
        let fts_enabled = cfg.enable_fts && schema::fts_table_exists(&conn);

        Ok(FactStore {
            conn: Mutex::new(conn),
            fts_enabled,
            max_facts: cfg.max_facts,
            prune_threshold: cfg.prune_threshold,
            prune_keep_recent: cfg.prune_keep_recent,
        })
    }

    pub(crate) fn limits(&self) -> (usize, usize, usize) {
        (self.max_facts, self.prune_threshold, self.prune_keep_recent)
    }

    /// Flush SQLite's internal state. Prepared statements and the WAL are
    /// released when the store is dropped.
    pub fn close(&self) {
        let conn = self.conn.lock();
        conn.execute_batch("PRAGMA optimize;").ok();
        info!("[store] Fact store closed");
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// In-memory store with default config. Shared by unit tests.
    pub(crate) fn store() -> FactStore {
        let mut cfg = EngineConfig::default();
        cfg.validate().unwrap();
        FactStore::open_in_memory(&cfg).unwrap()
    }

    /// In-memory store with the FTS index disabled (simple lexical scorer).
    pub(crate) fn store_no_fts() -> FactStore {
        let mut cfg = EngineConfig {
            enable_fts: false,
            ..EngineConfig::default()
        };
        cfg.validate().unwrap();
        FactStore::open_in_memory(&cfg).unwrap()
    }
}
