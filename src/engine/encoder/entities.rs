// ── Atomic Encoder: Entity Extraction & Salience Cache ──────────────────────
//
// Rule-based extraction of named entities from raw conversation text:
// titled persons, "my <relation> <Name>" patterns, company suffixes,
// preposition-prefixed places, and generic capitalized runs — filtered by a
// hard-coded stop-word list and deduplicated by normalized name.
//
// A process-local cache tracks the most salient recent entities for
// pronoun resolution. Salience climbs on re-mention and decays with age.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::atoms::types::EntityType;
use crate::engine::store::{format_ts, parse_ts};

/// Maximum cache entries; the least salient entry is evicted beyond this.
const MAX_CACHE_ENTRIES: usize = 50;

/// Salience bump on re-mention.
const SALIENCE_BUMP: f32 = 0.1;

/// Exponential decay factor applied to entries older than one minute.
const SALIENCE_DECAY: f32 = 0.95;

// ═══════════════════════════════════════════════════════════════════════════
// Extraction patterns
// ═══════════════════════════════════════════════════════════════════════════

static TITLED_PERSON_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(Mr|Mrs|Ms|Dr|Prof)\.?\s+([A-Z][a-z]+(?:\s+[A-Z][a-z]+)?)")
        .expect("titled person regex")
});

static MY_RELATION_RE: Lazy<Regex> = Lazy::new(|| {
    // (?i) would also relax the name classes, so the leading "my" is
    // matched case-sensitively per variant instead.
    Regex::new(
        r"\b[Mm]y\s+(wife|husband|brother|sister|mother|father|mom|dad|son|daughter|friend|colleague|boss|manager)\s+([A-Z][a-z]+(?:\s+[A-Z][a-z]+)?)",
    )
    .expect("my-relation regex")
});

static COMPANY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b([A-Z][A-Za-z]+(?:\s+[A-Z][A-Za-z]+)*)\s+(Inc|Corp|LLC|Ltd|Company|Co)\b")
        .expect("company regex")
});

static PLACE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:in|at|from|to)\s+([A-Z][a-z]+(?:\s+[A-Z][a-z]+)*)").expect("place regex")
});

static CAP_RUN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Z][a-z]+(?:\s+[A-Z][a-z]+)*\b").expect("cap run regex"));

/// Articles, pronouns, weekdays, months, common auxiliaries — never entities.
const ENTITY_STOP_WORDS: &[&str] = &[
    "the", "a", "an", "i", "me", "my", "mine", "we", "us", "our", "ours", "you",
    "your", "yours", "he", "him", "his", "she", "her", "hers", "it", "its",
    "they", "them", "their", "theirs", "this", "that", "these", "those", "is",
    "am", "are", "was", "were", "be", "been", "being", "have", "has", "had",
    "do", "does", "did", "will", "would", "can", "could", "should", "shall",
    "may", "might", "must", "what", "which", "who", "whom", "whose", "when",
    "where", "why", "how", "yes", "no", "not", "ok", "okay", "hello", "hi",
    "monday", "tuesday", "wednesday", "thursday", "friday", "saturday", "sunday",
    "january", "february", "march", "april", "may", "june", "july", "august",
    "september", "october", "november", "december", "today", "yesterday",
    "tomorrow", "tonight", "mr", "mrs", "ms", "dr", "prof",
];

// ═══════════════════════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════════════════════

/// Grammatical gender guess for pronoun resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gender {
    Male,
    Female,
    Neutral,
    Unknown,
}

/// One extracted mention before cache insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct Mention {
    pub name: String,
    pub kind: EntityType,
    pub gender: Gender,
}

/// One cache slot.
#[derive(Debug, Clone)]
pub struct CachedEntity {
    pub name: String,
    pub normalized: String,
    pub kind: EntityType,
    pub gender: Gender,
    pub last_seen: String,
    pub salience: f32,
    pub singular: bool,
}

/// Process-local salience cache used for coreference resolution.
#[derive(Debug, Default)]
pub struct EntityCache {
    entries: Vec<CachedEntity>,
}

impl EntityCache {
    /// Record a mention: bump an existing entry's salience or insert a new
    /// one (evicting the least salient at capacity). Every update also
    /// decays entries older than one minute.
    pub fn update(&mut self, mention: &Mention, now: DateTime<Utc>) {
        self.decay(now);

        let normalized = mention.name.to_lowercase();
        let now_str = format_ts(now);

        if let Some(entry) = self.entries.iter_mut().find(|e| e.normalized == normalized) {
            entry.salience += SALIENCE_BUMP;
            entry.last_seen = now_str;
            if mention.gender != Gender::Unknown {
                entry.gender = mention.gender;
            }
            return;
        }

        if self.entries.len() >= MAX_CACHE_ENTRIES {
            if let Some((idx, _)) = self
                .entries
                .iter()
                .enumerate()
                .min_by(|a, b| a.1.salience.partial_cmp(&b.1.salience).unwrap_or(std::cmp::Ordering::Equal))
            {
                self.entries.remove(idx);
            }
        }

        self.entries.push(CachedEntity {
            name: mention.name.clone(),
            normalized,
            kind: mention.kind,
            gender: mention.gender,
            last_seen: now_str,
            salience: 0.5,
            singular: !mention.name.contains(" and "),
        });
    }

    fn decay(&mut self, now: DateTime<Utc>) {
        for entry in &mut self.entries {
            let age_secs = parse_ts(&entry.last_seen)
                .map(|seen| (now - seen).num_seconds())
                .unwrap_or(0);
            if age_secs > 60 {
                entry.salience *= SALIENCE_DECAY;
            }
        }
    }

    /// Best candidate passing `filter`, by salience.
    pub fn best(&self, filter: impl Fn(&CachedEntity) -> bool) -> Option<&CachedEntity> {
        self.entries
            .iter()
            .filter(|e| filter(e))
            .max_by(|a, b| a.salience.partial_cmp(&b.salience).unwrap_or(std::cmp::Ordering::Equal))
    }

    /// All cached names, most salient first. Feeds the LLM coreference
    /// fallback prompt.
    pub fn known_names(&self) -> Vec<String> {
        let mut sorted: Vec<&CachedEntity> = self.entries.iter().collect();
        sorted.sort_by(|a, b| b.salience.partial_cmp(&a.salience).unwrap_or(std::cmp::Ordering::Equal));
        sorted.iter().map(|e| e.name.clone()).collect()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn get(&self, name: &str) -> Option<&CachedEntity> {
        let normalized = name.to_lowercase();
        self.entries.iter().find(|e| e.normalized == normalized)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Extraction
// ═══════════════════════════════════════════════════════════════════════════

/// Extract entity mentions from raw text, deduplicated by normalized name.
/// Pattern priority: titled person > my-relation > company > place > bare
/// capitalized run.
pub fn extract_mentions(text: &str) -> Vec<Mention> {
    let mut mentions: Vec<Mention> = Vec::new();

    for caps in TITLED_PERSON_RE.captures_iter(text) {
        let title = &caps[1];
        let gender = match title {
            "Mr" => Gender::Male,
            "Mrs" | "Ms" => Gender::Female,
            _ => Gender::Unknown,
        };
        push_mention(&mut mentions, &caps[2], EntityType::Person, gender);
    }

    for caps in MY_RELATION_RE.captures_iter(text) {
        let relation = caps[1].to_lowercase();
        let gender = match relation.as_str() {
            "wife" | "sister" | "mother" | "mom" | "daughter" => Gender::Female,
            "husband" | "brother" | "father" | "dad" | "son" => Gender::Male,
            _ => Gender::Unknown,
        };
        push_mention(&mut mentions, &caps[2], EntityType::Person, gender);
    }

    for caps in COMPANY_RE.captures_iter(text) {
        let full = format!("{} {}", &caps[1], &caps[2]);
        push_mention(&mut mentions, &full, EntityType::Organization, Gender::Neutral);
    }

    for caps in PLACE_RE.captures_iter(text) {
        push_mention(&mut mentions, &caps[1], EntityType::Place, Gender::Neutral);
    }

    for m in CAP_RUN_RE.find_iter(text) {
        if m.start() == 0 {
            continue; // sentence-lead capitalization proves nothing
        }
        push_mention(&mut mentions, m.as_str(), EntityType::Person, Gender::Unknown);
    }

    mentions
}

fn push_mention(mentions: &mut Vec<Mention>, name: &str, kind: EntityType, gender: Gender) {
    let name = name.trim();
    if name.is_empty() || ENTITY_STOP_WORDS.contains(&name.to_lowercase().as_str()) {
        return;
    }
    // Multi-word runs whose every word is a stop word are noise too.
    if name
        .split_whitespace()
        .all(|w| ENTITY_STOP_WORDS.contains(&w.to_lowercase().as_str()))
    {
        return;
    }
    let normalized = name.to_lowercase();
    if mentions.iter().any(|m| m.name.to_lowercase() == normalized) {
        return;
    }
    mentions.push(Mention {
        name: name.to_string(),
        kind,
        gender,
    });
}

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════
