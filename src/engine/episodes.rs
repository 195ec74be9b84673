// ── omem Engine: Episode Manager ────────────────────────────────────────────
//
// Session lifecycle: one open episode at a time, rotated after inactivity,
// with per-episode fact counts and an entity-mention histogram. Closed
// episodes land in a small LRU cache; closing can ask the generator for a
// short session summary.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use log::{info, warn};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::atoms::error::MemoryResult;
use crate::atoms::types::Episode;
use crate::engine::prompts;
use crate::engine::store::{now_ts, parse_ts, FactStore};
use crate::providers::Generator;

struct EpisodeState {
    current: Option<Episode>,
    last_activity: String,
    mentions: HashMap<String, usize>,
    turn_count: usize,
    /// Most recently closed episodes, newest first.
    closed: VecDeque<Episode>,
}

pub struct EpisodeManager {
    store: Arc<FactStore>,
    generator: Option<Arc<dyn Generator>>,
    state: Mutex<EpisodeState>,
    session_timeout_secs: u64,
    cache_capacity: usize,
    track_mentions: bool,
    summary_on_close: bool,
}

impl EpisodeManager {
    pub fn new(
        store: Arc<FactStore>,
        generator: Option<Arc<dyn Generator>>,
        session_timeout_secs: u64,
        cache_capacity: usize,
        track_mentions: bool,
        summary_on_close: bool,
    ) -> Self {
        EpisodeManager {
            store,
            generator,
            state: Mutex::new(EpisodeState {
                current: None,
                last_activity: now_ts(),
                mentions: HashMap::new(),
                turn_count: 0,
                closed: VecDeque::new(),
            }),
            session_timeout_secs,
            cache_capacity,
            track_mentions,
            summary_on_close,
        }
    }

    /// Continue the current episode when the session matches and activity
    /// is recent; otherwise close it and open a fresh row.
    pub async fn start_session(&self, session_id: &str) -> MemoryResult<i64> {
        let reusable = {
            let state = self.state.lock();
            match &state.current {
                Some(ep)
                    if ep.session_id == session_id
                        && !self.inactivity_exceeded(&state.last_activity) =>
                {
                    Some(ep.id)
                }
                _ => None,
            }
        };
        if let Some(id) = reusable {
            return Ok(id);
        }

        self.close_current().await?;
        self.open_episode(session_id)
    }

    /// Episode id the next turn will land in, rotating first when none is
    /// open or inactivity exceeded the timeout. Counters are untouched —
    /// the write path calls this before inserting facts so rows can carry
    /// the episode id, then reports the turn via `on_turn_processed`.
    pub async fn ensure_current(&self) -> MemoryResult<i64> {
        let needs_rotation = {
            let state = self.state.lock();
            state.current.is_none() || self.inactivity_exceeded(&state.last_activity)
        };
        if needs_rotation {
            self.close_current().await?;
            self.open_episode(&format!("auto-{}", Uuid::new_v4()))?;
        }
        Ok(self
            .state
            .lock()
            .current
            .as_ref()
            .map(|e| e.id)
            .expect("episode opened above"))
    }

    /// Record a processed turn. Rotates episodes when none is open or
    /// inactivity exceeded the timeout (auto-generated session id).
    /// Returns the episode id the turn belongs to.
    pub async fn on_turn_processed(
        &self,
        fact_count: usize,
        entity_names: &[String],
    ) -> MemoryResult<i64> {
        let needs_rotation = {
            let state = self.state.lock();
            state.current.is_none() || self.inactivity_exceeded(&state.last_activity)
        };
        if needs_rotation {
            self.close_current().await?;
            self.open_episode(&format!("auto-{}", Uuid::new_v4()))?;
        }

        let episode_snapshot = {
            let mut state = self.state.lock();
            state.last_activity = now_ts();
            state.turn_count += 1;
            if self.track_mentions {
                for name in entity_names {
                    *state.mentions.entry(name.clone()).or_insert(0) += 1;
                }
            }
            let mentions = Self::mention_list(&state.mentions);
            let episode = state.current.as_mut().expect("episode opened above");
            episode.fact_count += fact_count as i64;
            episode.entity_mentions = mentions;
            episode.clone()
        };

        self.store.update_episode(&episode_snapshot)?;
        Ok(episode_snapshot.id)
    }

    /// Episode id the next turn would land in, without bumping counters.
    pub fn current_episode_id(&self) -> Option<i64> {
        self.state.lock().current.as_ref().map(|e| e.id)
    }

    /// Close the current episode: stamp `ended_at`, optionally summarize.
    pub async fn close_current(&self) -> MemoryResult<Option<i64>> {
        let Some(mut episode) = self.state.lock().current.take() else {
            return Ok(None);
        };
        episode.ended_at = Some(now_ts());

        if self.summary_on_close && episode.fact_count > 0 {
            if let Some(generator) = &self.generator {
                let facts = self.store.get_facts_by_episode(episode.id, 200)?;
                let lines: Vec<String> =
                    facts.iter().map(|f| format!("- {}", f.atomic_text)).collect();
                let prompt = prompts::episode_summary(&lines.join("\n"));
                match generator.generate(&prompt).await {
                    Ok(reply) if !reply.trim().is_empty() => {
                        episode.summary = reply.trim().to_string();
                    }
                    Ok(_) => {}
                    Err(e) => warn!("[episodes] Close summary failed: {e}"),
                }
            }
        }

        self.store.update_episode(&episode)?;
        info!(
            "[episodes] Closed episode {} ({} facts)",
            episode.id, episode.fact_count
        );

        let id = episode.id;
        let mut state = self.state.lock();
        state.mentions.clear();
        state.turn_count = 0;
        state.closed.push_front(episode);
        state.closed.truncate(self.cache_capacity);
        Ok(Some(id))
    }

    /// Recently closed episodes, newest first.
    pub fn recent_closed(&self) -> Vec<Episode> {
        self.state.lock().closed.iter().cloned().collect()
    }

    fn open_episode(&self, session_id: &str) -> MemoryResult<i64> {
        let id = self.store.insert_episode(session_id)?;
        let episode = self
            .store
            .get_episode(id)?
            .expect("episode row just inserted");

        let mut state = self.state.lock();
        state.current = Some(episode);
        state.last_activity = now_ts();
        state.mentions.clear();
        state.turn_count = 0;

        info!("[episodes] Opened episode {id} for session {session_id}");
        Ok(id)
    }

    fn inactivity_exceeded(&self, last_activity: &str) -> bool {
        let Some(last) = parse_ts(last_activity) else {
            return true;
        };
        (Utc::now() - last).num_seconds() as u64 > self.session_timeout_secs
    }

    /// Mention histogram flattened to names, most frequent first.
    fn mention_list(mentions: &HashMap<String, usize>) -> Vec<String> {
        let mut pairs: Vec<(&String, &usize)> = mentions.iter().collect();
        pairs.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
        pairs.into_iter().map(|(name, _)| name.clone()).collect()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════
