// ── FactStore: Entity & Relation Rows ───────────────────────────────────────
//
// Row-level operations consumed by the graph layer. `upsert_entity` performs
// the whole find-or-insert under one connection lock so concurrent upserts
// of the same normalized name cannot race into a duplicate-key failure
// (and on a lost race it falls back to a second lookup).

use super::vector::bytes_to_f32_vec;
use super::FactStore;
use crate::atoms::error::{MemoryError, MemoryResult};
use crate::atoms::types::{Entity, EntityType, Relation};
use rusqlite::{params, Connection, OptionalExtension, Row};

const ENTITY_COLUMNS: &str = "id, name, normalized_name, entity_type, embedding, fact_ids, mention_count";

const RELATION_COLUMNS: &str =
    "id, source_entity_id, target_entity_id, relation_type, fact_id, confidence, is_obsolete";

/// Lowercase and collapse internal whitespace — the entity equality key.
pub(crate) fn normalize_entity_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

impl FactStore {
    /// Insert the entity or, if its normalized name exists, bump the
    /// mention count and append the fact id (deduped). Returns the row id.
    pub fn upsert_entity(
        &self,
        name: &str,
        kind: EntityType,
        fact_id: Option<i64>,
    ) -> MemoryResult<i64> {
        let name = name.trim();
        if name.is_empty() {
            return Err(MemoryError::invalid("entity name must not be empty"));
        }
        let normalized = normalize_entity_name(name);

        let conn = self.conn.lock();
        if let Some(existing) = find_by_normalized(&conn, &normalized)? {
            let mut fact_ids = existing.fact_ids.clone();
            if let Some(fid) = fact_id {
                if !fact_ids.contains(&fid) {
                    fact_ids.push(fid);
                }
            }
            conn.execute(
                "UPDATE omem_entities
                 SET mention_count = mention_count + 1, fact_ids = ?2
                 WHERE id = ?1",
                params![existing.id, serde_json::to_string(&fact_ids)?],
            )?;
            return Ok(existing.id);
        }

        let fact_ids: Vec<i64> = fact_id.into_iter().collect();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO omem_entities (name, normalized_name, entity_type, fact_ids)
             VALUES (?1, ?2, ?3, ?4)",
            params![name, normalized, kind.as_str(), serde_json::to_string(&fact_ids)?],
        )?;
        if inserted == 1 {
            return Ok(conn.last_insert_rowid());
        }

        // Lost a race with a concurrent upsert: the row exists now.
        let existing = find_by_normalized(&conn, &normalized)?
            .ok_or_else(|| MemoryError::invalid(format!("entity vanished: {normalized}")))?;
        Ok(existing.id)
    }

    pub fn get_entity(&self, id: i64) -> MemoryResult<Option<Entity>> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {ENTITY_COLUMNS} FROM omem_entities WHERE id = ?1");
        let mut stmt = conn.prepare(&sql)?;
        Ok(stmt.query_row(params![id], entity_from_row).optional()?)
    }

    pub fn find_entity_by_normalized_name(&self, normalized: &str) -> MemoryResult<Option<Entity>> {
        let conn = self.conn.lock();
        find_by_normalized(&conn, normalized)
    }

    /// Entities whose normalized name starts with `prefix` — the candidate
    /// pool for fuzzy resolution.
    pub fn find_entities_by_prefix(&self, prefix: &str, limit: usize) -> MemoryResult<Vec<Entity>> {
        let conn = self.conn.lock();
        let pattern = format!("{}%", prefix.replace('%', "").replace('_', ""));
        let sql = format!(
            "SELECT {ENTITY_COLUMNS} FROM omem_entities
             WHERE normalized_name LIKE ?1 LIMIT ?2"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![pattern, limit as i64], entity_from_row)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    pub fn count_entities(&self) -> MemoryResult<usize> {
        let conn = self.conn.lock();
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM omem_entities", [], |r| r.get(0))?;
        Ok(n as usize)
    }

    // ── Relations ────────────────────────────────────────────────────────

    /// Insert a relation, deduping on (source, target, type): an existing
    /// live row keeps its id and its confidence is raised to the max of the
    /// two submissions. Both endpoints must exist.
    pub fn upsert_relation(&self, rel: &Relation) -> MemoryResult<i64> {
        let conn = self.conn.lock();

        for endpoint in [rel.source_entity_id, rel.target_entity_id] {
            let exists: bool = conn
                .prepare("SELECT 1 FROM omem_entities WHERE id = ?1")?
                .query_row(params![endpoint], |_| Ok(true))
                .optional()?
                .unwrap_or(false);
            if !exists {
                return Err(MemoryError::invalid(format!(
                    "relation endpoint {endpoint} does not exist"
                )));
            }
        }

        let existing: Option<(i64, f64)> = conn
            .prepare(
                "SELECT id, confidence FROM omem_relations
                 WHERE source_entity_id = ?1 AND target_entity_id = ?2
                   AND relation_type = ?3 AND is_obsolete = 0",
            )?
            .query_row(
                params![rel.source_entity_id, rel.target_entity_id, rel.relation_type],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        if let Some((id, confidence)) = existing {
            if (rel.confidence as f64) > confidence {
                conn.execute(
                    "UPDATE omem_relations SET confidence = ?2 WHERE id = ?1",
                    params![id, rel.confidence as f64],
                )?;
            }
            return Ok(id);
        }

        conn.execute(
            "INSERT INTO omem_relations
                (source_entity_id, target_entity_id, relation_type, fact_id, confidence)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                rel.source_entity_id,
                rel.target_entity_id,
                rel.relation_type,
                rel.fact_id,
                rel.confidence as f64,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Live relations touching an entity, in both directions, highest
    /// confidence first.
    pub fn relations_for_entity(&self, entity_id: i64) -> MemoryResult<Vec<Relation>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {RELATION_COLUMNS} FROM omem_relations
             WHERE (source_entity_id = ?1 OR target_entity_id = ?1) AND is_obsolete = 0
             ORDER BY confidence DESC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![entity_id], relation_from_row)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    pub fn count_relations(&self) -> MemoryResult<usize> {
        let conn = self.conn.lock();
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM omem_relations WHERE is_obsolete = 0",
            [],
            |r| r.get(0),
        )?;
        Ok(n as usize)
    }
}

fn find_by_normalized(conn: &Connection, normalized: &str) -> MemoryResult<Option<Entity>> {
    let sql = format!("SELECT {ENTITY_COLUMNS} FROM omem_entities WHERE normalized_name = ?1");
    let mut stmt = conn.prepare(&sql)?;
    Ok(stmt.query_row(params![normalized], entity_from_row).optional()?)
}

fn entity_from_row(row: &Row<'_>) -> rusqlite::Result<Entity> {
    let kind: String = row.get(3)?;
    let embedding: Option<Vec<u8>> = row.get(4)?;
    let fact_ids_json: String = row.get(5)?;
    Ok(Entity {
        id: row.get(0)?,
        name: row.get(1)?,
        normalized_name: row.get(2)?,
        kind: EntityType::parse(&kind),
        embedding: embedding.map(|b| bytes_to_f32_vec(&b)),
        fact_ids: serde_json::from_str(&fact_ids_json).unwrap_or_default(),
        mention_count: row.get(6)?,
    })
}

fn relation_from_row(row: &Row<'_>) -> rusqlite::Result<Relation> {
    let is_obsolete: i64 = row.get(6)?;
    Ok(Relation {
        id: row.get(0)?,
        source_entity_id: row.get(1)?,
        target_entity_id: row.get(2)?,
        relation_type: row.get(3)?,
        fact_id: row.get(4)?,
        confidence: row.get::<_, f64>(5)? as f32,
        is_obsolete: is_obsolete != 0,
    })
}
