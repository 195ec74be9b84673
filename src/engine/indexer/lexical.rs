// ── Multi-View Indexer: Lexical View ────────────────────────────────────────
//
// Tokenize on Unicode letter/digit runs to lowercase, drop short tokens and
// stop words, strip suffixes with a fixed table (longest first, one rule
// per token), count frequencies, keep the top N.

/// English stop words excluded from the keyword bag.
const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "is", "am", "was", "are", "were", "be", "been", "being",
    "have", "has", "had", "do", "does", "did", "will", "would", "could", "should",
    "may", "might", "shall", "can", "it", "its", "this", "that", "these", "those",
    "i", "we", "you", "he", "she", "they", "me", "him", "her", "us", "them", "my",
    "our", "your", "his", "their", "mine", "ours", "yours", "theirs", "what",
    "which", "who", "whom", "whose", "how", "when", "where", "why", "if", "then",
    "else", "for", "but", "and", "or", "nor", "not", "no", "so", "than", "too",
    "very", "just", "about", "with", "from", "into", "onto", "to", "of", "in",
    "on", "at", "by", "up", "out", "off", "as", "also", "there", "here", "all",
    "any", "each", "some", "such", "own", "same", "now",
];

/// Suffix-stripping table, applied longest-first. Each rule carries the
/// minimum residual stem length required before it fires.
const SUFFIX_RULES: &[(&str, &str, usize)] = &[
    ("ization", "ize", 3),
    ("ational", "ate", 3),
    ("fulness", "ful", 3),
    ("ousness", "ous", 3),
    ("iveness", "ive", 3),
    ("tional", "tion", 3),
    ("biliti", "ble", 3),
    ("ement", "", 3),
    ("ness", "", 3),
    ("ment", "", 3),
    ("able", "", 3),
    ("ible", "", 3),
    ("ance", "", 3),
    ("ence", "", 3),
    ("ally", "al", 3),
    ("tion", "", 3),
    ("sion", "", 3),
    ("izer", "ize", 3),
    ("ator", "ate", 3),
    ("ling", "", 3),
    ("ing", "", 3),
    ("ies", "y", 2),
    ("ied", "y", 2),
    ("ion", "", 3),
    ("ity", "", 3),
    ("ful", "", 3),
    ("ous", "", 3),
    ("ive", "", 3),
    ("ess", "", 3),
    ("ist", "", 3),
    ("ism", "", 3),
    ("ial", "", 3),
    ("ual", "", 3),
    ("ly", "", 2),
    ("ed", "", 2),
    ("er", "", 2),
    ("es", "", 2),
    ("'s", "", 2),
    ("s", "", 2),
];

/// Strip at most one suffix from a lowercase token.
pub fn stem(token: &str) -> String {
    for (suffix, replacement, min_stem) in SUFFIX_RULES {
        if let Some(stem) = token.strip_suffix(suffix) {
            if stem.chars().count() >= *min_stem {
                return format!("{stem}{replacement}");
            }
        }
    }
    token.to_string()
}

/// Extract the top-`max_keywords` stemmed keywords by frequency.
/// Ties keep first-seen order.
pub fn extract_keywords(text: &str, max_keywords: usize) -> Vec<String> {
    let mut counts: Vec<(String, usize)> = Vec::new();

    for run in text.split(|c: char| !c.is_alphanumeric() && c != '\'') {
        let token = run.trim_matches('\'').to_lowercase();
        if token.chars().count() < 2 || STOP_WORDS.contains(&token.as_str()) {
            continue;
        }
        let stemmed = stem(&token);
        if stemmed.chars().count() < 2 {
            continue;
        }
        match counts.iter_mut().find(|(k, _)| *k == stemmed) {
            Some((_, n)) => *n += 1,
            None => counts.push((stemmed, 1)),
        }
    }

    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts.truncate(max_keywords);
    counts.into_iter().map(|(k, _)| k).collect()
}
