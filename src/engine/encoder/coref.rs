// ── Atomic Encoder: Coreference Resolution ──────────────────────────────────
//
// Rule-based pronoun replacement against the salience cache. Each pronoun
// class picks the highest-salience cache entry that fits:
//   he/him/his/himself       → gender = male
//   she/her/hers/herself     → gender = female
//   it/its/itself            → kind = thing
//   they/them/their/…        → is-singular = false
// Possessive forms gain `'s`. When the rewritten text degenerates into
// pathological repetition, the caller falls back to the LLM prompt.

use crate::atoms::types::EntityType;

use super::entities::{EntityCache, Gender};

/// Window size for the repetition check.
const REPETITION_WINDOW: usize = 10;

/// A token repeated this often inside one window flags the rewrite as
/// pathological.
const REPETITION_LIMIT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
enum PronounClass {
    Male,
    Female,
    Thing,
    Plural,
}

/// Classify a lowercase token; the bool marks possessive forms.
fn classify_pronoun(token: &str) -> Option<(PronounClass, bool)> {
    match token {
        "he" | "him" | "himself" => Some((PronounClass::Male, false)),
        "his" => Some((PronounClass::Male, true)),
        "she" | "her" | "herself" => Some((PronounClass::Female, false)),
        "hers" => Some((PronounClass::Female, true)),
        "it" | "itself" => Some((PronounClass::Thing, false)),
        "its" => Some((PronounClass::Thing, true)),
        "they" | "them" | "themselves" => Some((PronounClass::Plural, false)),
        "their" | "theirs" => Some((PronounClass::Plural, true)),
        _ => None,
    }
}

/// Replace resolvable pronouns with concrete entity names. Unresolvable
/// pronouns are left in place.
pub fn resolve(text: &str, cache: &EntityCache) -> String {
    let mut out: Vec<String> = Vec::new();

    for raw in text.split_whitespace() {
        let (core, trailing) = split_trailing_punctuation(raw);
        let lower = core.to_lowercase();

        let replacement = classify_pronoun(&lower).and_then(|(class, possessive)| {
            let candidate = match class {
                PronounClass::Male => cache.best(|e| e.gender == Gender::Male),
                PronounClass::Female => cache.best(|e| e.gender == Gender::Female),
                PronounClass::Thing => cache.best(|e| e.kind == EntityType::Thing),
                PronounClass::Plural => cache.best(|e| !e.singular),
            };
            candidate.map(|e| {
                if possessive {
                    format!("{}'s", e.name)
                } else {
                    e.name.clone()
                }
            })
        });

        match replacement {
            Some(name) => out.push(format!("{name}{trailing}")),
            None => out.push(raw.to_string()),
        }
    }

    out.join(" ")
}

/// Detect pathological repetition: the same lowercased token appearing at
/// least `REPETITION_LIMIT` times within a `REPETITION_WINDOW`-word window.
pub fn is_pathological(text: &str) -> bool {
    let tokens: Vec<String> = text
        .split_whitespace()
        .map(|t| {
            t.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'')
                .to_lowercase()
        })
        .filter(|t| !t.is_empty())
        .collect();

    if tokens.len() < REPETITION_LIMIT {
        return false;
    }

    for start in 0..tokens.len() {
        let end = (start + REPETITION_WINDOW).min(tokens.len());
        let window = &tokens[start..end];
        for token in window {
            if window.iter().filter(|t| *t == token).count() >= REPETITION_LIMIT {
                return true;
            }
        }
    }
    false
}

fn split_trailing_punctuation(raw: &str) -> (&str, &str) {
    let core_end = raw
        .char_indices()
        .rev()
        .find(|(_, c)| c.is_alphanumeric() || *c == '\'')
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);
    raw.split_at(core_end)
}

#[cfg(test)]
mod tests {
    use super::super::entities::{EntityCache, Gender, Mention};
    use super::*;
    use crate::atoms::types::EntityType;
    use chrono::Utc;

    fn cache_with(entries: &[(&str, EntityType, Gender)]) -> EntityCache {
        let mut cache = EntityCache::default();
        for (name, kind, gender) in entries {
            cache.update(
                &Mention {
                    name: name.to_string(),
                    kind: *kind,
                    gender: *gender,
                },
                Utc::now(),
            );
        }
        cache
    }

    #[test]
    fn resolves_gendered_pronouns() {
        let cache = cache_with(&[("Sarah", EntityType::Person, Gender::Female)]);
        let out = resolve("She started a new job.", &cache);
        assert_eq!(out, "Sarah started a new job.");
    }

    #[test]
    fn possessive_gains_apostrophe_s() {
        let cache = cache_with(&[("Tom", EntityType::Person, Gender::Male)]);
        let out = resolve("I borrowed his ladder.", &cache);
        assert_eq!(out, "I borrowed Tom's ladder.");
    }

    #[test]
    fn picks_highest_salience_match() {
        let mut cache = cache_with(&[
            ("Sarah", EntityType::Person, Gender::Female),
            ("Emma", EntityType::Person, Gender::Female),
        ]);
        // Re-mention Emma to raise her salience.
        cache.update(
            &Mention {
                name: "Emma".into(),
                kind: EntityType::Person,
                gender: Gender::Female,
            },
            Utc::now(),
        );
        let out = resolve("She called back.", &cache);
        assert_eq!(out, "Emma called back.");
    }

    #[test]
    fn gender_mismatch_leaves_pronoun() {
        let cache = cache_with(&[("Sarah", EntityType::Person, Gender::Female)]);
        let out = resolve("He left early.", &cache);
        assert_eq!(out, "He left early.");
    }

    #[test]
    fn punctuation_preserved() {
        let cache = cache_with(&[("Sarah", EntityType::Person, Gender::Female)]);
        let out = resolve("Did you see her?", &cache);
        assert_eq!(out, "Did you see Sarah?");
    }

    #[test]
    fn repetition_detector_flags_tight_loops() {
        assert!(is_pathological("Sarah told Sarah that Sarah was late"));
        assert!(!is_pathological("Sarah told Emma that Nora was late"));
        assert!(!is_pathological(""));
    }

    #[test]
    fn repetition_outside_window_is_fine() {
        // Three mentions spread across more than ten words.
        let text = "Sarah met the team early and spoke briefly about goals \
                    then Sarah reviewed designs with everyone before lunch and \
                    later Sarah went home";
        assert!(!is_pathological(text));
    }
}
