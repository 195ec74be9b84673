// ── FactStore: Episode Rows ─────────────────────────────────────────────────

use super::{now_ts, FactStore};
use crate::atoms::error::MemoryResult;
use crate::atoms::types::Episode;
use rusqlite::{params, OptionalExtension, Row};

const EPISODE_COLUMNS: &str =
    "id, session_id, started_at, ended_at, summary, fact_count, entity_mentions";

impl FactStore {
    /// Open a new episode row for a session. Returns its id.
    pub fn insert_episode(&self, session_id: &str) -> MemoryResult<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO omem_episodes (session_id, started_at) VALUES (?1, ?2)",
            params![session_id, now_ts()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_episode(&self, id: i64) -> MemoryResult<Option<Episode>> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {EPISODE_COLUMNS} FROM omem_episodes WHERE id = ?1");
        let mut stmt = conn.prepare(&sql)?;
        Ok(stmt.query_row(params![id], episode_from_row).optional()?)
    }

    /// The open (un-ended) episode for a session, if any.
    pub fn get_open_episode(&self, session_id: &str) -> MemoryResult<Option<Episode>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {EPISODE_COLUMNS} FROM omem_episodes
             WHERE session_id = ?1 AND ended_at IS NULL
             ORDER BY started_at DESC LIMIT 1"
        );
        let mut stmt = conn.prepare(&sql)?;
        Ok(stmt
            .query_row(params![session_id], episode_from_row)
            .optional()?)
    }

    /// Persist the mutable fields of an episode row.
    pub fn update_episode(&self, episode: &Episode) -> MemoryResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE omem_episodes
             SET ended_at = ?2, summary = ?3, fact_count = ?4, entity_mentions = ?5
             WHERE id = ?1",
            params![
                episode.id,
                episode.ended_at,
                episode.summary,
                episode.fact_count,
                serde_json::to_string(&episode.entity_mentions)?,
            ],
        )?;
        Ok(())
    }

    pub fn count_episodes(&self) -> MemoryResult<usize> {
        let conn = self.conn.lock();
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM omem_episodes", [], |r| r.get(0))?;
        Ok(n as usize)
    }
}

fn episode_from_row(row: &Row<'_>) -> rusqlite::Result<Episode> {
    let mentions_json: String = row.get(6)?;
    Ok(Episode {
        id: row.get(0)?,
        session_id: row.get(1)?,
        started_at: row.get(2)?,
        ended_at: row.get(3)?,
        summary: row.get(4)?,
        fact_count: row.get(5)?,
        entity_mentions: serde_json::from_str(&mentions_json).unwrap_or_default(),
    })
}
