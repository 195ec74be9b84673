// ── Atomic Encoder: Temporal Anchoring ──────────────────────────────────────
//
// Convert relative time phrases into absolute dates computed against a
// reference instant, so stored facts stay meaningful after the conversation
// ends. "yesterday" → "2026-07-31", "last week" → "the week of 2026-07-20",
// "in 3 days" → "2026-08-04", "recently" → "around 2026-08-01".
//
// The first concrete date produced becomes the fact's timestamp anchor.

use chrono::{DateTime, Datelike, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static AGO_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(\d+)\s+(day|week|month)s?\s+ago\b").expect("ago regex"));

static IN_FUTURE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bin\s+(\d+)\s+(day|week)s?\b").expect("in-future regex"));

static DAY_WORD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(today|yesterday|tomorrow)\b").expect("day word regex"));

static WEEK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(last|this|next)\s+week\b").expect("week regex"));

static MONTH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(last|this|next)\s+month\b").expect("month regex"));

static YEAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(last|this|next)\s+year\b").expect("year regex"));

static PART_OF_DAY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(this\s+morning|tonight|last\s+night)\b").expect("part-of-day regex"));

static VAGUE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(recently|just\s+now|earlier)\b").expect("vague regex"));

const MONTH_NAMES: [&str; 12] = [
    "January", "February", "March", "April", "May", "June", "July", "August",
    "September", "October", "November", "December",
];

/// Result of anchoring one text.
pub struct AnchoredText {
    pub text: String,
    /// First concrete date produced, as a store timestamp (midnight UTC).
    pub anchor: Option<String>,
}

/// Rewrite relative time phrases against `now`.
pub fn anchor(text: &str, now: DateTime<Utc>) -> AnchoredText {
    let mut anchor: Option<String> = None;
    let mut out = text.to_string();

    // Arithmetic phrases first so "3 days ago" is not clobbered by the
    // bare day-word pass.
    out = AGO_RE
        .replace_all(&out, |caps: &regex::Captures| {
            let n: i64 = caps[1].parse().unwrap_or(0);
            let date = match caps[2].to_lowercase().as_str() {
                "week" => now - Duration::weeks(n),
                "month" => now - Duration::days(30 * n),
                _ => now - Duration::days(n),
            };
            record_anchor(&mut anchor, date);
            format_date(date)
        })
        .into_owned();

    out = IN_FUTURE_RE
        .replace_all(&out, |caps: &regex::Captures| {
            let n: i64 = caps[1].parse().unwrap_or(0);
            let date = match caps[2].to_lowercase().as_str() {
                "week" => now + Duration::weeks(n),
                _ => now + Duration::days(n),
            };
            record_anchor(&mut anchor, date);
            format_date(date)
        })
        .into_owned();

    // Part-of-day phrases before the bare day words ("last night" would
    // otherwise survive as "last night" with "tonight" untouched).
    out = PART_OF_DAY_RE
        .replace_all(&out, |caps: &regex::Captures| {
            let phrase = caps[1].to_lowercase();
            let (date, qualifier) = if phrase.starts_with("last") {
                (now - Duration::days(1), "night")
            } else if phrase == "tonight" {
                (now, "night")
            } else {
                (now, "morning")
            };
            record_anchor(&mut anchor, date);
            format!("{} {}", format_date(date), qualifier)
        })
        .into_owned();

    out = DAY_WORD_RE
        .replace_all(&out, |caps: &regex::Captures| {
            let date = match caps[1].to_lowercase().as_str() {
                "yesterday" => now - Duration::days(1),
                "tomorrow" => now + Duration::days(1),
                _ => now,
            };
            record_anchor(&mut anchor, date);
            format_date(date)
        })
        .into_owned();

    out = WEEK_RE
        .replace_all(&out, |caps: &regex::Captures| {
            let base = match caps[1].to_lowercase().as_str() {
                "last" => now - Duration::weeks(1),
                "next" => now + Duration::weeks(1),
                _ => now,
            };
            let monday = base - Duration::days(base.weekday().num_days_from_monday() as i64);
            record_anchor(&mut anchor, monday);
            format!("the week of {}", format_date(monday))
        })
        .into_owned();

    out = MONTH_RE
        .replace_all(&out, |caps: &regex::Captures| {
            let (year, month) = match caps[1].to_lowercase().as_str() {
                "last" => prev_month(now.year(), now.month()),
                "next" => next_month(now.year(), now.month()),
                _ => (now.year(), now.month()),
            };
            format!("{} {}", MONTH_NAMES[month as usize - 1], year)
        })
        .into_owned();

    out = YEAR_RE
        .replace_all(&out, |caps: &regex::Captures| {
            let year = match caps[1].to_lowercase().as_str() {
                "last" => now.year() - 1,
                "next" => now.year() + 1,
                _ => now.year(),
            };
            year.to_string()
        })
        .into_owned();

    out = VAGUE_RE
        .replace_all(&out, |_: &regex::Captures| {
            record_anchor(&mut anchor, now);
            format!("around {}", format_date(now))
        })
        .into_owned();

    AnchoredText { text: out, anchor }
}

fn format_date(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d").to_string()
}

fn record_anchor(anchor: &mut Option<String>, dt: DateTime<Utc>) {
    if anchor.is_none() {
        *anchor = Some(dt.format("%Y-%m-%dT00:00:00Z").to_string());
    }
}

fn prev_month(year: i32, month: u32) -> (i32, u32) {
    if month == 1 {
        (year - 1, 12)
    } else {
        (year, month - 1)
    }
}

fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn reference() -> DateTime<Utc> {
        // A Saturday.
        Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn day_words_become_dates() {
        let a = anchor("I went hiking yesterday and I fly out tomorrow", reference());
        assert_eq!(a.text, "I went hiking 2026-07-31 and I fly out 2026-08-02");
        assert_eq!(a.anchor.as_deref(), Some("2026-07-31T00:00:00Z"));
    }

    #[test]
    fn arithmetic_phrases() {
        let a = anchor("We moved 3 weeks ago", reference());
        assert_eq!(a.text, "We moved 2026-07-11");

        let b = anchor("The review is in 5 days", reference());
        assert_eq!(b.text, "The review is 2026-08-06");
    }

    #[test]
    fn week_phrases_use_monday() {
        let a = anchor("It happened last week", reference());
        // Monday of the week before 2026-08-01 (Sat) is 2026-07-20.
        assert_eq!(a.text, "It happened the week of 2026-07-20");
    }

    #[test]
    fn month_and_year_phrases() {
        let a = anchor("I joined last month and graduate next year", reference());
        assert_eq!(a.text, "I joined July 2026 and graduate 2027");
    }

    #[test]
    fn part_of_day_keeps_qualifier() {
        let a = anchor("The pipeline broke last night", reference());
        assert_eq!(a.text, "The pipeline broke 2026-07-31 night");

        let b = anchor("I'll finish it tonight", reference());
        assert_eq!(b.text, "I'll finish it 2026-08-01 night");

        let c = anchor("We spoke this morning", reference());
        assert_eq!(c.text, "We spoke 2026-08-01 morning");
    }

    #[test]
    fn vague_phrases_get_around() {
        let a = anchor("I switched jobs recently", reference());
        assert_eq!(a.text, "I switched jobs around 2026-08-01");
    }

    #[test]
    fn text_without_relative_phrases_unchanged() {
        let a = anchor("My name is Alice Johnson", reference());
        assert_eq!(a.text, "My name is Alice Johnson");
        assert!(a.anchor.is_none());
    }
}
