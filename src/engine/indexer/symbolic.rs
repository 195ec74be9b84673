// ── Multi-View Indexer: Symbolic View ───────────────────────────────────────
//
// Structured metadata extracted from a fact's text: time expressions,
// locations, proper nouns, numeric/question/negation flags, and a
// specificity score. Heuristic NER only — no ML pipeline.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::atoms::types::SymbolicView;

// ═══════════════════════════════════════════════════════════════════════════
// Patterns
// ═══════════════════════════════════════════════════════════════════════════

static ISO_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").expect("iso date regex"));

static MDY_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{1,2}/\d{1,2}/\d{2,4}\b").expect("mdy date regex"));

static WRITTEN_DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(?:January|February|March|April|May|June|July|August|September|October|November|December)\s+\d{1,2}(?:st|nd|rd|th)?(?:,?\s*\d{4})?\b",
    )
    .expect("written date regex")
});

static BARE_YEAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:19|20)\d{2}\b").expect("bare year regex"));

static PREP_LOCATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:in|at|from|to)\s+([A-Z][a-z]+(?:\s+[A-Z][a-z]+)*)").expect("location regex")
});

static PROPER_NOUN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Z][a-z]+(?:\s+[A-Z][a-z]+)*\b").expect("proper noun regex"));

static NEGATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:not|never|no|don't|doesn't|didn't|won't|can't|isn't|aren't|wasn't|weren't)\b")
        .expect("negation regex")
});

/// Known countries and US states recognized as locations even without a
/// preposition. Deliberately small — the preposition pattern carries most
/// of the weight.
const KNOWN_PLACES: &[&str] = &[
    "usa", "united states", "canada", "mexico", "brazil", "england", "france",
    "germany", "spain", "italy", "portugal", "netherlands", "sweden", "norway",
    "poland", "ukraine", "russia", "china", "japan", "korea", "india", "australia",
    "california", "texas", "florida", "new york", "washington", "oregon",
    "colorado", "illinois", "massachusetts", "georgia", "virginia", "arizona",
];

/// Words that start sentences but never name anything.
const LEADING_STOP_WORDS: &[&str] = &[
    "the", "a", "an", "i", "he", "she", "it", "we", "they", "my", "his", "her",
    "our", "their", "this", "that", "what", "who", "when", "where", "why", "how",
    "yesterday", "today", "tomorrow", "monday", "tuesday", "wednesday", "thursday",
    "friday", "saturday", "sunday", "january", "february", "march", "april", "may",
    "june", "july", "august", "september", "october", "november", "december",
];

// ═══════════════════════════════════════════════════════════════════════════
// Extraction
// ═══════════════════════════════════════════════════════════════════════════

/// Build the symbolic view for one fact.
pub fn extract(text: &str) -> SymbolicView {
    let mut view = SymbolicView::default();

    // ── Time expressions ─────────────────────────────────────────────
    for re in [&*ISO_DATE_RE, &*MDY_DATE_RE, &*WRITTEN_DATE_RE] {
        for m in re.find_iter(text) {
            push_unique(&mut view.time_expressions, m.as_str());
        }
    }
    // Bare years only when no richer expression already covers them.
    if view.time_expressions.is_empty() {
        for m in BARE_YEAR_RE.find_iter(text) {
            push_unique(&mut view.time_expressions, m.as_str());
        }
    }

    // First ISO date becomes the timestamp anchor.
    if let Some(caps) = ISO_DATE_RE.captures(text) {
        view.timestamp_anchor = Some(format!(
            "{}-{}-{}T00:00:00Z",
            &caps[1], &caps[2], &caps[3]
        ));
    }

    // ── Locations ────────────────────────────────────────────────────
    for caps in PREP_LOCATION_RE.captures_iter(text) {
        let place = caps[1].trim();
        if !LEADING_STOP_WORDS.contains(&place.to_lowercase().as_str()) {
            push_unique(&mut view.locations, place);
        }
    }
    let lower = text.to_lowercase();
    for place in KNOWN_PLACES {
        if contains_word(&lower, place) {
            push_unique(&mut view.locations, &title_case(place));
        }
    }

    // ── Proper nouns ─────────────────────────────────────────────────
    // Single-word runs are person candidates, multi-word runs organization
    // candidates. Location matches are not double-counted.
    for m in PROPER_NOUN_RE.find_iter(text) {
        let run = m.as_str().trim();
        if m.start() == 0 || LEADING_STOP_WORDS.contains(&run.to_lowercase().as_str()) {
            continue;
        }
        if view.locations.iter().any(|l| l.eq_ignore_ascii_case(run)) {
            continue;
        }
        if run.contains(' ') {
            push_unique(&mut view.organizations, run);
        } else {
            push_unique(&mut view.persons, run);
        }
    }

    // ── Flags ────────────────────────────────────────────────────────
    view.has_numbers = text.chars().any(|c| c.is_ascii_digit());
    view.is_question = text.trim_end().ends_with('?');
    view.has_negation = NEGATION_RE.is_match(text);

    // ── Specificity ──────────────────────────────────────────────────
    let word_count = text.split_whitespace().count();
    let mut specificity = 0.5f32;
    if !view.time_expressions.is_empty() {
        specificity += 0.1;
    }
    if view.timestamp_anchor.is_some() {
        specificity += 0.1;
    }
    if !view.locations.is_empty() {
        specificity += 0.1;
    }
    if !view.persons.is_empty() || !view.organizations.is_empty() {
        specificity += 0.1;
    }
    if view.has_numbers {
        specificity += 0.05;
    }
    if word_count < 5 {
        specificity -= 0.1;
    }
    if word_count > 15 {
        specificity += 0.05;
    }
    view.specificity = specificity.clamp(0.0, 1.0);

    view
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v.eq_ignore_ascii_case(value)) {
        list.push(value.to_string());
    }
}

fn contains_word(haystack: &str, needle: &str) -> bool {
    let mut start = 0;
    while let Some(pos) = haystack[start..].find(needle) {
        let abs = start + pos;
        let before_ok = abs == 0 || !haystack.as_bytes()[abs - 1].is_ascii_alphanumeric();
        let end = abs + needle.len();
        let after_ok = end >= haystack.len() || !haystack.as_bytes()[end].is_ascii_alphanumeric();
        if before_ok && after_ok {
            return true;
        }
        start = abs + 1;
    }
    false
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iso_date_becomes_anchor() {
        let view = extract("I started the job on 2024-03-01 in Berlin");
        assert_eq!(view.time_expressions, vec!["2024-03-01"]);
        assert_eq!(view.timestamp_anchor.as_deref(), Some("2024-03-01T00:00:00Z"));
    }

    #[test]
    fn written_dates_and_bare_years() {
        let view = extract("We met on June 14, 2019");
        assert!(view.time_expressions.iter().any(|t| t.starts_with("June 14")));

        let bare = extract("That happened back in 2015");
        assert_eq!(bare.time_expressions, vec!["2015"]);
        assert!(bare.timestamp_anchor.is_none());
    }

    #[test]
    fn preposition_locations_found() {
        let view = extract("She moved to Lisbon last spring");
        assert!(view.locations.iter().any(|l| l == "Lisbon"));
    }

    #[test]
    fn known_places_found_without_preposition() {
        let view = extract("California weather beats everything");
        assert!(view.locations.iter().any(|l| l == "California"));
    }

    #[test]
    fn proper_noun_classification() {
        let view = extract("I talked with Alice about Acme Systems yesterday");
        assert!(view.persons.iter().any(|p| p == "Alice"));
        assert!(view.organizations.iter().any(|o| o == "Acme Systems"));
    }

    #[test]
    fn flags_detected() {
        let view = extract("Didn't I order 3 coffees?");
        assert!(view.has_numbers);
        assert!(view.is_question);
        assert!(view.has_negation);
    }

    #[test]
    fn specificity_rises_with_detail() {
        let vague = extract("I like tea");
        let detailed =
            extract("On 2024-03-01 Alice and I visited the Acme Systems office in Berlin with 4 colleagues");
        assert!(detailed.specificity > vague.specificity);
        assert!(vague.specificity <= 0.5);
        assert!((0.0..=1.0).contains(&detailed.specificity));
    }

    #[test]
    fn short_text_penalized() {
        let view = extract("Tea time");
        assert!(view.specificity < 0.5);
    }
}
