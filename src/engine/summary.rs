// ── omem Engine: Rolling Summary Manager ────────────────────────────────────
//
// Dirty-tracked incremental user-profile summary. Writes mark fact ids
// pending; a refresh folds them into the summary once enough accumulate.
// The background worker ticks at the configured interval, skips while a
// refresh is already in flight, and runs each refresh under a 30 s
// deadline. Refresh errors never reach the request path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::atoms::error::MemoryResult;
use crate::atoms::types::RollingSummary;
use crate::engine::prompts;
use crate::engine::store::FactStore;
use crate::providers::Generator;

/// Deadline for one background refresh, including the generator call.
const REFRESH_DEADLINE: Duration = Duration::from_secs(30);

#[derive(Debug, Default)]
struct SummaryState {
    summary: String,
    pending: Vec<i64>,
    source_fact_ids: Vec<i64>,
    fact_count: i64,
    dirty: bool,
}

pub struct RollingSummaryManager {
    store: Arc<FactStore>,
    generator: Option<Arc<dyn Generator>>,
    state: Mutex<SummaryState>,
    is_refreshing: AtomicBool,
    min_new_facts: usize,
    incremental: bool,
    max_facts: usize,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl RollingSummaryManager {
    /// Hydrate from the persisted singleton row.
    pub fn new(
        store: Arc<FactStore>,
        generator: Option<Arc<dyn Generator>>,
        min_new_facts: usize,
        incremental: bool,
        max_facts: usize,
    ) -> MemoryResult<Self> {
        let row = store.get_rolling_summary()?;
        let state = SummaryState {
            summary: row.summary,
            pending: row.pending_fact_ids.clone(),
            source_fact_ids: row.source_fact_ids,
            fact_count: row.fact_count,
            dirty: !row.pending_fact_ids.is_empty(),
        };

        Ok(RollingSummaryManager {
            store,
            generator,
            state: Mutex::new(state),
            is_refreshing: AtomicBool::new(false),
            min_new_facts,
            incremental,
            max_facts,
            worker: Mutex::new(None),
        })
    }

    /// Record newly stored facts as pending summary input.
    pub fn mark_dirty(&self, fact_ids: &[i64]) -> MemoryResult<()> {
        if fact_ids.is_empty() {
            return Ok(());
        }
        let pending_snapshot = {
            let mut state = self.state.lock();
            for id in fact_ids {
                if !state.pending.contains(id) {
                    state.pending.push(*id);
                }
            }
            state.dirty = true;
            state.pending.clone()
        };

        // Persist the pending list so a restart resumes where we left off.
        let mut row = self.store.get_rolling_summary()?;
        row.pending_fact_ids = pending_snapshot;
        self.store.save_rolling_summary(&row)?;
        Ok(())
    }

    /// Current summary text.
    pub fn current(&self) -> String {
        self.state.lock().summary.clone()
    }

    /// Pending fact ids (facts not yet folded into the summary).
    pub fn pending(&self) -> Vec<i64> {
        self.state.lock().pending.clone()
    }

    /// Refresh if the dirty gate passes: no-op unless dirty and at least
    /// `min_new_facts` facts are pending. Returns whether a refresh ran.
    pub async fn refresh(&self) -> MemoryResult<bool> {
        let (dirty, pending_len) = {
            let state = self.state.lock();
            (state.dirty, state.pending.len())
        };
        if !dirty || pending_len < self.min_new_facts {
            return Ok(false);
        }
        self.run_refresh(false).await
    }

    /// Full regeneration regardless of the dirty gate.
    pub async fn force_refresh(&self) -> MemoryResult<bool> {
        self.run_refresh(true).await
    }

    async fn run_refresh(&self, force_full: bool) -> MemoryResult<bool> {
        let Some(generator) = self.generator.clone() else {
            info!("[summary] No generator wired, refresh skipped");
            return Ok(false);
        };
        if self.is_refreshing.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }
        let result = self.run_refresh_inner(&generator, force_full).await;
        self.is_refreshing.store(false, Ordering::SeqCst);
        result
    }

    async fn run_refresh_inner(
        &self,
        generator: &Arc<dyn Generator>,
        force_full: bool,
    ) -> MemoryResult<bool> {
        let (current_summary, pending) = {
            let state = self.state.lock();
            (state.summary.clone(), state.pending.clone())
        };

        let prompt = if self.incremental && !current_summary.is_empty() && !force_full {
            let new_facts = self.facts_as_lines(&pending)?;
            prompts::summary_incremental(&current_summary, &new_facts)
        } else {
            let recent = self.store.get_recent_facts(self.max_facts)?;
            let lines: Vec<String> = recent
                .iter()
                .map(|f| format!("- {}", f.atomic_text))
                .collect();
            prompts::summary_full(&lines.join("\n"))
        };

        let reply = generator.generate(&prompt).await?;
        let new_summary = reply.trim().to_string();
        if new_summary.is_empty() {
            warn!("[summary] Generator returned an empty summary, keeping previous");
            return Ok(false);
        }

        // Success: swap state and persist atomically with the pending clear.
        let row = {
            let mut state = self.state.lock();
            state.summary = new_summary.clone();
            for id in &pending {
                if !state.source_fact_ids.contains(id) {
                    state.source_fact_ids.push(*id);
                }
            }
            state.fact_count += pending.len() as i64;
            state.pending.retain(|id| !pending.contains(id));
            state.dirty = !state.pending.is_empty();

            RollingSummary {
                summary: state.summary.clone(),
                embedding: None,
                updated_at: String::new(),
                source_fact_ids: state.source_fact_ids.clone(),
                pending_fact_ids: state.pending.clone(),
                fact_count: state.fact_count,
            }
        };
        self.store.save_rolling_summary(&row)?;

        info!(
            "[summary] Refreshed ({} facts folded in, {} total)",
            pending.len(),
            row.fact_count
        );
        Ok(true)
    }

    fn facts_as_lines(&self, ids: &[i64]) -> MemoryResult<String> {
        let facts = self.store.get_facts_by_ids(ids)?;
        Ok(facts
            .iter()
            .map(|f| format!("- {}", f.atomic_text))
            .collect::<Vec<_>>()
            .join("\n"))
    }

    /// Start the background refresh ticker. Idempotent.
    pub fn start_worker(self: &Arc<Self>, interval_secs: u64) {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return;
        }
        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await; // immediate first tick is not a refresh
            loop {
                ticker.tick().await;
                if manager.is_refreshing.load(Ordering::SeqCst) {
                    continue;
                }
                match tokio::time::timeout(REFRESH_DEADLINE, manager.refresh()).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => warn!("[summary] Background refresh failed: {e}"),
                    Err(_) => warn!(
                        "[summary] Background refresh exceeded {}s deadline",
                        REFRESH_DEADLINE.as_secs()
                    ),
                }
            }
        });
        *worker = Some(handle);
    }

    /// Stop the background ticker.
    pub fn stop_worker(&self) {
        if let Some(handle) = self.worker.lock().take() {
            handle.abort();
        }
    }

    /// Summary fact count for stats.
    pub fn fact_count(&self) -> i64 {
        self.state.lock().fact_count
    }
}

impl Drop for RollingSummaryManager {
    fn drop(&mut self) {
        self.stop_worker();
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════
