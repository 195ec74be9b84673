// ── omem Engine: Prompt Builders ────────────────────────────────────────────
//
// Line-oriented prompts for the optional generator. Output formats are
// pipe-delimited and parsed tolerantly (see encoder/extraction.rs); the
// engine never depends on a generator following instructions perfectly.

/// Fact-extraction prompt: atomic, self-contained facts out of one encoded
/// turn batch.
pub fn fact_extraction(atomic_text: &str, max_facts: usize) -> String {
    format!(
        "Extract at most {max_facts} atomic facts about the user from the conversation below.\n\
         Each fact must be self-contained: no pronouns, no relative dates.\n\
         Reply with one line per fact, nothing else, in this exact format:\n\
         FACT|<category>|<importance>|<text>\n\
         category: preference, belief, biographical, event, relationship, task, knowledge, other\n\
         importance: 0.0 to 1.0\n\
         \n\
         Conversation:\n{atomic_text}\n"
    )
}

/// Coreference fallback prompt, used when the rule-based rewrite degrades
/// into pathological repetition.
pub fn coreference(text: &str, known_entities: &[String]) -> String {
    let entities = if known_entities.is_empty() {
        "(none known)".to_string()
    } else {
        known_entities.join(", ")
    };
    format!(
        "Rewrite the text replacing every pronoun with the entity it refers to.\n\
         Known entities, most recently discussed first: {entities}\n\
         Reply with the rewritten text only.\n\
         \n\
         Text:\n{text}\n"
    )
}

/// Incremental rolling-summary prompt: fold new facts into the current
/// profile paragraph.
pub fn summary_incremental(current_summary: &str, new_facts: &str) -> String {
    format!(
        "Update the user profile summary below with the new facts.\n\
         Keep it one dense paragraph. Drop nothing that is still true;\n\
         prefer newer information when facts conflict.\n\
         Reply with the updated summary only.\n\
         \n\
         Current summary:\n{current_summary}\n\
         \n\
         New facts:\n{new_facts}\n"
    )
}

/// Full-regeneration summary prompt over the most recent facts.
pub fn summary_full(facts: &str) -> String {
    format!(
        "Write a one-paragraph profile of the user from the facts below.\n\
         Cover identity, preferences, relationships, and ongoing activities.\n\
         Reply with the summary only.\n\
         \n\
         Facts:\n{facts}\n"
    )
}

/// Episode-closing summary prompt over one session's facts.
pub fn episode_summary(facts: &str) -> String {
    format!(
        "Summarize this conversation session in two or three sentences.\n\
         Focus on what was discussed and decided.\n\
         Reply with the summary only.\n\
         \n\
         Session facts:\n{facts}\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fact_extraction_carries_cap_and_format() {
        let p = fact_extraction("user: I like tea", 7);
        assert!(p.contains("at most 7"));
        assert!(p.contains("FACT|<category>|<importance>|<text>"));
        assert!(p.contains("user: I like tea"));
    }

    #[test]
    fn coreference_lists_entities() {
        let p = coreference("She left", &["Sarah".into(), "Emma".into()]);
        assert!(p.contains("Sarah, Emma"));

        let empty = coreference("She left", &[]);
        assert!(empty.contains("(none known)"));
    }

    #[test]
    fn summary_prompts_embed_inputs() {
        let inc = summary_incremental("Knows Rust.", "- prefers tea");
        assert!(inc.contains("Knows Rust."));
        assert!(inc.contains("- prefers tea"));

        let full = summary_full("- lives in Lisbon");
        assert!(full.contains("- lives in Lisbon"));
    }
}
