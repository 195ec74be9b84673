// ── FactStore: Fact CRUD ────────────────────────────────────────────────────
//
// Insert/update/mark-obsolete/access-bump plus the documented read queries.
// All default reads filter `is_obsolete = 0`. Keywords are stored
// whitespace-joined, entities as a JSON array of {name, type}, embeddings as
// little-endian f32 blobs.

use super::vector::{bytes_to_f32_vec, f32_vec_to_bytes};
use super::{now_ts, FactStore};
use crate::atoms::error::{MemoryError, MemoryResult};
use crate::atoms::types::{EntityRef, Fact, FactCategory};
use log::{info, warn};
use rusqlite::{params, OptionalExtension, Row};

/// Column list shared by every fact SELECT. Order must match
/// `fact_from_row`.
pub(crate) const FACT_COLUMNS: &str = "id, text, atomic_text, category, importance, embedding, \
     keywords, timestamp_anchor, location, entities_json, episode_id, turn_id, \
     created_at, last_accessed, access_count, is_obsolete, superseded_by";

impl FactStore {
    /// Insert a fact and return its store-assigned id.
    ///
    /// Trims the text and rejects empty input. Missing fields get their
    /// defaults: `category = other`, `importance = 0.5` (and clamped to
    /// [0,1] otherwise), `atomic_text = text`, `created_at = now`.
    pub fn insert_fact(&self, fact: &Fact) -> MemoryResult<i64> {
        let text = fact.text.trim();
        if text.is_empty() {
            return Err(MemoryError::invalid("fact text must not be empty"));
        }
        let atomic_text = if fact.atomic_text.trim().is_empty() {
            text.to_string()
        } else {
            fact.atomic_text.trim().to_string()
        };
        let importance = if fact.importance.is_finite() {
            fact.importance.clamp(0.0, 1.0)
        } else {
            0.5
        };
        let created_at = if fact.created_at.is_empty() {
            now_ts()
        } else {
            fact.created_at.clone()
        };
        let embedding_bytes = fact.embedding.as_ref().map(|v| f32_vec_to_bytes(v));
        let keywords = fact.keywords.join(" ");
        let entities_json = serde_json::to_string(&fact.entities)?;

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO omem_facts (
                text, atomic_text, category, importance, embedding, keywords,
                timestamp_anchor, location, entities_json, episode_id, turn_id,
                created_at, last_accessed, access_count, is_obsolete, superseded_by
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, NULL, 0, 0, NULL)",
            params![
                text,
                atomic_text,
                fact.category.as_str(),
                importance,
                embedding_bytes,
                keywords,
                fact.timestamp_anchor,
                fact.location,
                entities_json,
                fact.episode_id,
                fact.turn_id,
                created_at,
            ],
        )?;
        let id = conn.last_insert_rowid();

        if self.fts_enabled {
            if let Err(e) = conn.execute(
                "INSERT INTO omem_facts_fts (fact_id, keywords, atomic_text)
                 VALUES (?1, ?2, ?3)",
                params![id, keywords, atomic_text],
            ) {
                warn!("[store] FTS insert failed for fact {id}: {e}");
            }
        }

        Ok(id)
    }

    /// Rewrite every mutable column of an existing fact.
    pub fn update_fact(&self, fact: &Fact) -> MemoryResult<()> {
        let embedding_bytes = fact.embedding.as_ref().map(|v| f32_vec_to_bytes(v));
        let keywords = fact.keywords.join(" ");
        let entities_json = serde_json::to_string(&fact.entities)?;

        let conn = self.conn.lock();
        conn.execute(
            "UPDATE omem_facts SET
                text = ?2, atomic_text = ?3, category = ?4, importance = ?5,
                embedding = ?6, keywords = ?7, timestamp_anchor = ?8,
                location = ?9, entities_json = ?10, episode_id = ?11,
                is_obsolete = ?12, superseded_by = ?13
             WHERE id = ?1",
            params![
                fact.id,
                fact.text,
                fact.atomic_text,
                fact.category.as_str(),
                fact.importance.clamp(0.0, 1.0),
                embedding_bytes,
                keywords,
                fact.timestamp_anchor,
                fact.location,
                entities_json,
                fact.episode_id,
                fact.is_obsolete as i64,
                fact.superseded_by,
            ],
        )?;

        if self.fts_enabled {
            if fact.is_obsolete {
                conn.execute("DELETE FROM omem_facts_fts WHERE fact_id = ?1", params![fact.id])
                    .ok();
            } else {
                conn.execute(
                    "UPDATE omem_facts_fts SET keywords = ?2, atomic_text = ?3 WHERE fact_id = ?1",
                    params![fact.id, keywords, fact.atomic_text],
                )
                .ok();
            }
        }
        Ok(())
    }

    /// Mark a fact obsolete, optionally naming its successor. Obsolete facts
    /// are excluded from every default query and from the FTS index.
    pub fn mark_obsolete(&self, id: i64, superseded_by: Option<i64>) -> MemoryResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE omem_facts SET is_obsolete = 1, superseded_by = ?2 WHERE id = ?1",
            params![id, superseded_by],
        )?;
        if self.fts_enabled {
            conn.execute("DELETE FROM omem_facts_fts WHERE fact_id = ?1", params![id])
                .ok();
        }
        Ok(())
    }

    /// Record an access: bump `last_accessed` and `access_count`.
    pub fn update_access(&self, id: i64) -> MemoryResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE omem_facts
             SET last_accessed = ?2, access_count = access_count + 1
             WHERE id = ?1",
            params![id, now_ts()],
        )?;
        Ok(())
    }

    pub fn get_fact(&self, id: i64) -> MemoryResult<Option<Fact>> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {FACT_COLUMNS} FROM omem_facts WHERE id = ?1");
        let mut stmt = conn.prepare(&sql)?;
        let fact = stmt.query_row(params![id], fact_from_row).optional()?;
        Ok(fact)
    }

    /// Fetch a batch of facts by id. Missing and obsolete ids are skipped;
    /// order follows the input list.
    pub fn get_facts_by_ids(&self, ids: &[i64]) -> MemoryResult<Vec<Fact>> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {FACT_COLUMNS} FROM omem_facts WHERE id = ?1 AND is_obsolete = 0");
        let mut stmt = conn.prepare(&sql)?;
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(fact) = stmt.query_row(params![id], fact_from_row).optional()? {
                out.push(fact);
            }
        }
        Ok(out)
    }

    /// Most recently created non-obsolete facts.
    pub fn get_recent_facts(&self, limit: usize) -> MemoryResult<Vec<Fact>> {
        self.query_facts(
            "is_obsolete = 0",
            "created_at DESC, id DESC",
            limit,
            &[],
        )
    }

    /// Non-obsolete facts in a category, best first.
    pub fn get_facts_by_category(
        &self,
        category: FactCategory,
        limit: usize,
    ) -> MemoryResult<Vec<Fact>> {
        self.query_facts(
            "is_obsolete = 0 AND category = ?1",
            "importance DESC, created_at DESC",
            limit,
            &[&category.as_str()],
        )
    }

    /// Non-obsolete facts whose timestamp anchor falls in [start, end],
    /// newest anchor first.
    pub fn get_facts_by_time_range(
        &self,
        start: &str,
        end: &str,
        limit: usize,
    ) -> MemoryResult<Vec<Fact>> {
        self.query_facts(
            "is_obsolete = 0 AND timestamp_anchor IS NOT NULL \
             AND timestamp_anchor >= ?1 AND timestamp_anchor <= ?2",
            "timestamp_anchor DESC",
            limit,
            &[&start, &end],
        )
    }

    /// Non-obsolete facts recorded under an episode.
    pub fn get_facts_by_episode(&self, episode_id: i64, limit: usize) -> MemoryResult<Vec<Fact>> {
        self.query_facts(
            "is_obsolete = 0 AND episode_id = ?1",
            "created_at ASC, id ASC",
            limit,
            &[&episode_id],
        )
    }

    fn query_facts(
        &self,
        where_clause: &str,
        order_by: &str,
        limit: usize,
        params: &[&dyn rusqlite::ToSql],
    ) -> MemoryResult<Vec<Fact>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {FACT_COLUMNS} FROM omem_facts WHERE {where_clause} \
             ORDER BY {order_by} LIMIT {limit}"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params, fact_from_row)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    pub fn count_facts(&self) -> MemoryResult<usize> {
        let conn = self.conn.lock();
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM omem_facts WHERE is_obsolete = 0",
            [],
            |r| r.get(0),
        )?;
        Ok(n as usize)
    }

    pub fn count_obsolete_facts(&self) -> MemoryResult<usize> {
        let conn = self.conn.lock();
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM omem_facts WHERE is_obsolete = 1",
            [],
            |r| r.get(0),
        )?;
        Ok(n as usize)
    }

    fn count_all_facts(&self) -> MemoryResult<usize> {
        let conn = self.conn.lock();
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM omem_facts", [], |r| r.get(0))?;
        Ok(n as usize)
    }

    // ── Backfill ─────────────────────────────────────────────────────────

    /// Facts stored without a dense view (embedder absent or failed).
    pub fn list_facts_without_embeddings(&self, limit: usize) -> MemoryResult<Vec<Fact>> {
        self.query_facts(
            "is_obsolete = 0 AND embedding IS NULL",
            "created_at DESC",
            limit,
            &[],
        )
    }

    pub fn update_fact_embedding(&self, id: i64, embedding: &[f32]) -> MemoryResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE omem_facts SET embedding = ?2 WHERE id = ?1",
            params![id, f32_vec_to_bytes(embedding)],
        )?;
        Ok(())
    }

    // ── Pruning ──────────────────────────────────────────────────────────

    /// Prune the fact table down to the configured budget.
    ///
    /// No-op while the table holds at most `prune_threshold` rows. Otherwise
    /// deletes obsolete facts first (keeping the `prune_keep_recent / 4`
    /// most recent), then removes the oldest, lowest-importance,
    /// least-accessed live facts until at most `max_facts` remain.
    /// Returns the number of rows deleted.
    pub fn prune_old_facts(&self) -> MemoryResult<usize> {
        let (max_facts, prune_threshold, prune_keep_recent) = self.limits();

        let total = self.count_all_facts()?;
        if total <= prune_threshold {
            return Ok(0);
        }

        let keep_obsolete = prune_keep_recent / 4;
        let mut deleted;
        {
            let conn = self.conn.lock();
            deleted = conn.execute(
                "DELETE FROM omem_facts WHERE is_obsolete = 1 AND id NOT IN (
                    SELECT id FROM omem_facts WHERE is_obsolete = 1
                    ORDER BY created_at DESC LIMIT ?1
                )",
                params![keep_obsolete as i64],
            )?;
        }

        let remaining = self.count_all_facts()?;
        if remaining > max_facts {
            let excess = remaining - max_facts;
            let conn = self.conn.lock();
            deleted += conn.execute(
                "DELETE FROM omem_facts WHERE id IN (
                    SELECT id FROM omem_facts WHERE is_obsolete = 0
                    ORDER BY importance ASC, access_count ASC, created_at ASC
                    LIMIT ?1
                )",
                params![excess as i64],
            )?;
        }

        if deleted > 0 {
            if self.fts_enabled {
                let conn = self.conn.lock();
                conn.execute(
                    "DELETE FROM omem_facts_fts WHERE fact_id NOT IN (SELECT id FROM omem_facts)",
                    [],
                )
                .ok();
            }
            info!("[store] Pruned {deleted} facts (budget {max_facts})");
        }
        Ok(deleted)
    }
}

/// Map one SELECT row (in `FACT_COLUMNS` order) to a `Fact`.
pub(crate) fn fact_from_row(row: &Row<'_>) -> rusqlite::Result<Fact> {
    let category: String = row.get(3)?;
    let embedding: Option<Vec<u8>> = row.get(5)?;
    let keywords: String = row.get(6)?;
    let entities_json: String = row.get(9)?;
    let is_obsolete: i64 = row.get(15)?;

    let entities: Vec<EntityRef> = serde_json::from_str(&entities_json).unwrap_or_default();

    Ok(Fact {
        id: row.get(0)?,
        text: row.get(1)?,
        atomic_text: row.get(2)?,
        category: FactCategory::parse(&category),
        importance: row.get::<_, f64>(4)? as f32,
        embedding: embedding.map(|b| bytes_to_f32_vec(&b)),
        keywords: keywords.split_whitespace().map(str::to_string).collect(),
        timestamp_anchor: row.get(7)?,
        location: row.get(8)?,
        entities,
        episode_id: row.get(10)?,
        turn_id: row.get(11)?,
        created_at: row.get(12)?,
        last_accessed: row.get(13)?,
        access_count: row.get(14)?,
        is_obsolete: is_obsolete != 0,
        superseded_by: row.get(16)?,
    })
}
