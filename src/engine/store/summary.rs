// ── FactStore: Rolling Summary Row ──────────────────────────────────────────
// Singleton row (id = 1), seeded by the migrations so it always exists.

use super::vector::{bytes_to_f32_vec, f32_vec_to_bytes};
use super::{now_ts, FactStore};
use crate::atoms::error::MemoryResult;
use crate::atoms::types::RollingSummary;
use rusqlite::params;

impl FactStore {
    pub fn get_rolling_summary(&self) -> MemoryResult<RollingSummary> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT summary, embedding, updated_at, source_fact_ids, pending_fact_ids, fact_count
             FROM omem_rolling_summary WHERE id = 1",
        )?;
        let summary = stmt.query_row([], |row| {
            let embedding: Option<Vec<u8>> = row.get(1)?;
            let source_json: String = row.get(3)?;
            let pending_json: String = row.get(4)?;
            Ok(RollingSummary {
                summary: row.get(0)?,
                embedding: embedding.map(|b| bytes_to_f32_vec(&b)),
                updated_at: row.get(2)?,
                source_fact_ids: serde_json::from_str(&source_json).unwrap_or_default(),
                pending_fact_ids: serde_json::from_str(&pending_json).unwrap_or_default(),
                fact_count: row.get(5)?,
            })
        })?;
        Ok(summary)
    }

    /// Persist the whole summary row. `updated_at` is stamped here.
    pub fn save_rolling_summary(&self, summary: &RollingSummary) -> MemoryResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE omem_rolling_summary
             SET summary = ?1, embedding = ?2, updated_at = ?3,
                 source_fact_ids = ?4, pending_fact_ids = ?5, fact_count = ?6
             WHERE id = 1",
            params![
                summary.summary,
                summary.embedding.as_ref().map(|v| f32_vec_to_bytes(v)),
                now_ts(),
                serde_json::to_string(&summary.source_fact_ids)?,
                serde_json::to_string(&summary.pending_fact_ids)?,
                summary.fact_count,
            ],
        )?;
        Ok(())
    }
}
