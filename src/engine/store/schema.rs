// Database schema and migrations for the omem store.
// Called once at open time after WAL is enabled.
// Adding a table or column: append an idempotent CREATE TABLE IF NOT EXISTS
// or ALTER TABLE … ADD COLUMN (errors silently swallowed) at the end of
// run_migrations() — never modify existing SQL.

use crate::atoms::error::MemoryResult;
use log::info;
use rusqlite::Connection;

use super::now_ts;

pub(crate) fn run_migrations(conn: &Connection, enable_fts: bool) -> MemoryResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS omem_facts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            text TEXT NOT NULL,
            atomic_text TEXT NOT NULL,
            category TEXT NOT NULL DEFAULT 'other',
            importance REAL NOT NULL DEFAULT 0.5,
            embedding BLOB,
            keywords TEXT NOT NULL DEFAULT '',
            timestamp_anchor TEXT,
            location TEXT,
            entities_json TEXT NOT NULL DEFAULT '[]',
            episode_id INTEGER,
            turn_id TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            last_accessed TEXT,
            access_count INTEGER NOT NULL DEFAULT 0,
            is_obsolete INTEGER NOT NULL DEFAULT 0,
            superseded_by INTEGER
        );

        CREATE INDEX IF NOT EXISTS idx_facts_created
            ON omem_facts(created_at DESC);
        CREATE INDEX IF NOT EXISTS idx_facts_category
            ON omem_facts(category, importance DESC);
        CREATE INDEX IF NOT EXISTS idx_facts_episode
            ON omem_facts(episode_id);
        CREATE INDEX IF NOT EXISTS idx_facts_obsolete
            ON omem_facts(is_obsolete);

        CREATE TABLE IF NOT EXISTS omem_entities (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            normalized_name TEXT NOT NULL UNIQUE,
            entity_type TEXT NOT NULL DEFAULT 'other',
            embedding BLOB,
            fact_ids TEXT NOT NULL DEFAULT '[]',
            mention_count INTEGER NOT NULL DEFAULT 1
        );

        CREATE INDEX IF NOT EXISTS idx_entities_normalized
            ON omem_entities(normalized_name);

        CREATE TABLE IF NOT EXISTS omem_relations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_entity_id INTEGER NOT NULL,
            target_entity_id INTEGER NOT NULL,
            relation_type TEXT NOT NULL DEFAULT 'related_to',
            fact_id INTEGER,
            confidence REAL NOT NULL DEFAULT 0.5,
            is_obsolete INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY (source_entity_id) REFERENCES omem_entities(id),
            FOREIGN KEY (target_entity_id) REFERENCES omem_entities(id)
        );

        CREATE INDEX IF NOT EXISTS idx_relations_source
            ON omem_relations(source_entity_id);
        CREATE INDEX IF NOT EXISTS idx_relations_target
            ON omem_relations(target_entity_id);

        CREATE TABLE IF NOT EXISTS omem_episodes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT NOT NULL,
            started_at TEXT NOT NULL,
            ended_at TEXT,
            summary TEXT NOT NULL DEFAULT '',
            fact_count INTEGER NOT NULL DEFAULT 0,
            entity_mentions TEXT NOT NULL DEFAULT '[]'
        );

        CREATE INDEX IF NOT EXISTS idx_episodes_session
            ON omem_episodes(session_id, started_at DESC);

        CREATE TABLE IF NOT EXISTS omem_rolling_summary (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            summary TEXT NOT NULL DEFAULT '',
            embedding BLOB,
            updated_at TEXT NOT NULL,
            source_fact_ids TEXT NOT NULL DEFAULT '[]',
            pending_fact_ids TEXT NOT NULL DEFAULT '[]',
            fact_count INTEGER NOT NULL DEFAULT 0
        );
    ",
    )?;

    // ── Bootstrap: the rolling summary row always exists ─────────────
    conn.execute(
        "INSERT OR IGNORE INTO omem_rolling_summary (id, summary, updated_at)
         VALUES (1, '', ?1)",
        rusqlite::params![now_ts()],
    )?;

    // ── Optional FTS5 index over (keywords, atomic_text) ─────────────
    // Kept in sync manually by the fact CRUD paths; obsolete facts are
    // removed from the index so BM25 never surfaces them.
    if enable_fts {
        let created = conn.execute_batch(
            "CREATE VIRTUAL TABLE IF NOT EXISTS omem_facts_fts USING fts5(
                fact_id UNINDEXED,
                keywords,
                atomic_text
            );",
        );
        if created.is_err() {
            info!("[store] FTS5 unavailable, lexical search falls back to the substring scorer");
        }
    }

    Ok(())
}

/// Whether the FTS virtual table exists in this database.
pub(crate) fn fts_table_exists(conn: &Connection) -> bool {
    conn.prepare("SELECT name FROM sqlite_master WHERE type='table' AND name='omem_facts_fts'")
        .and_then(|mut stmt| stmt.query_row([], |_| Ok(true)))
        .unwrap_or(false)
}
