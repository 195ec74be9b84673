// ── Atomic Encoder: Fact Extraction Parsing ─────────────────────────────────
//
// The generator replies with line-oriented, pipe-delimited output:
//   FACT|<category>|<importance>|<text>
// Parsers tolerate missing and malformed lines — a bad line is skipped,
// never an error.

use crate::atoms::types::{
    DiscoveredEntity, EntityType, ExtractedFact, ExtractedRelation, FactCategory,
};

/// Parse generator output into extracted facts.
///
/// Importance is clamped to [0,1]; facts below `min_importance` are
/// dropped; at most `max_facts` survive (in reply order).
pub fn parse_fact_lines(output: &str, max_facts: usize, min_importance: f32) -> Vec<ExtractedFact> {
    let mut facts = Vec::new();

    for line in output.lines() {
        let line = line.trim().trim_start_matches("- ").trim_start_matches('*').trim();
        if facts.len() >= max_facts {
            break;
        }

        let mut parts = line.splitn(4, '|');
        let tag = parts.next().unwrap_or("").trim();
        if !tag.eq_ignore_ascii_case("FACT") {
            continue;
        }
        let (category, importance, text) = match (parts.next(), parts.next(), parts.next()) {
            (Some(c), Some(i), Some(t)) => (c.trim(), i.trim(), t.trim()),
            _ => continue,
        };
        if text.is_empty() {
            continue;
        }
        let importance = match importance.parse::<f32>() {
            Ok(v) if v.is_finite() => v.clamp(0.0, 1.0),
            _ => continue,
        };
        if importance < min_importance {
            continue;
        }

        facts.push(ExtractedFact {
            text: text.to_string(),
            category: FactCategory::parse(category),
            importance,
        });
    }

    facts
}

/// Parse `ENTITY|<type>|<name>` lines. Malformed lines are skipped.
pub fn parse_entity_lines(output: &str) -> Vec<DiscoveredEntity> {
    let mut entities: Vec<DiscoveredEntity> = Vec::new();

    for line in output.lines() {
        let line = line.trim().trim_start_matches("- ").trim_start_matches('*').trim();
        let mut parts = line.splitn(3, '|');
        let tag = parts.next().unwrap_or("").trim();
        if !tag.eq_ignore_ascii_case("ENTITY") {
            continue;
        }
        let (kind, name) = match (parts.next(), parts.next()) {
            (Some(k), Some(n)) => (k.trim(), n.trim()),
            _ => continue,
        };
        if name.is_empty() {
            continue;
        }
        if entities.iter().any(|e| e.name.eq_ignore_ascii_case(name)) {
            continue;
        }
        entities.push(DiscoveredEntity {
            name: name.to_string(),
            kind: EntityType::parse(kind),
        });
    }

    entities
}

/// Parse `REL|<source>|<relation>|<target>|<confidence>` lines.
/// A missing or unparseable confidence falls back to 0.5.
pub fn parse_relation_lines(output: &str) -> Vec<ExtractedRelation> {
    let mut relations = Vec::new();

    for line in output.lines() {
        let line = line.trim().trim_start_matches("- ").trim_start_matches('*').trim();
        let mut parts = line.splitn(5, '|');
        let tag = parts.next().unwrap_or("").trim();
        if !tag.eq_ignore_ascii_case("REL") {
            continue;
        }
        let (source, relation_type, target) = match (parts.next(), parts.next(), parts.next()) {
            (Some(s), Some(r), Some(t)) => (s.trim(), r.trim(), t.trim()),
            _ => continue,
        };
        if source.is_empty() || target.is_empty() {
            continue;
        }
        let confidence = parts
            .next()
            .and_then(|c| c.trim().parse::<f32>().ok())
            .filter(|c| c.is_finite() && *c > 0.0)
            .map(|c| c.min(1.0))
            .unwrap_or(0.5);

        relations.push(ExtractedRelation {
            source: source.to_string(),
            relation_type: if relation_type.is_empty() {
                "related_to".into()
            } else {
                relation_type.to_lowercase()
            },
            target: target.to_string(),
            confidence,
        });
    }

    relations
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_lines() {
        let output = "FACT|preference|0.8|The user prefers tea over coffee\n\
                      FACT|biographical|0.9|The user lives in Lisbon";
        let facts = parse_fact_lines(output, 10, 0.3);
        assert_eq!(facts.len(), 2);
        assert_eq!(facts[0].category, FactCategory::Preference);
        assert!((facts[0].importance - 0.8).abs() < 1e-6);
        assert_eq!(facts[1].text, "The user lives in Lisbon");
    }

    #[test]
    fn skips_malformed_lines() {
        let output = "Here are the facts:\n\
                      FACT|preference\n\
                      FACT|event|not-a-number|broken importance\n\
                      FACT|event|0.7|The user ran a marathon\n\
                      random trailing chatter";
        let facts = parse_fact_lines(output, 10, 0.3);
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].text, "The user ran a marathon");
    }

    #[test]
    fn drops_below_importance_threshold() {
        let output = "FACT|other|0.1|barely matters\nFACT|other|0.6|matters";
        let facts = parse_fact_lines(output, 10, 0.3);
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].text, "matters");
    }

    #[test]
    fn clamps_importance() {
        let output = "FACT|other|3.5|overeager";
        let facts = parse_fact_lines(output, 10, 0.3);
        assert!((facts[0].importance - 1.0).abs() < 1e-6);
    }

    #[test]
    fn respects_max_facts() {
        let output = (0..6)
            .map(|i| format!("FACT|other|0.5|fact number {i}"))
            .collect::<Vec<_>>()
            .join("\n");
        let facts = parse_fact_lines(&output, 3, 0.0);
        assert_eq!(facts.len(), 3);
    }

    #[test]
    fn tolerates_bullets_and_unknown_categories() {
        let output = "- FACT|musings|0.5|Category falls back to other";
        let facts = parse_fact_lines(output, 10, 0.3);
        assert_eq!(facts[0].category, FactCategory::Other);
    }

    #[test]
    fn pipe_in_text_preserved() {
        let output = "FACT|knowledge|0.5|uses the a|b syntax";
        let facts = parse_fact_lines(output, 10, 0.3);
        assert_eq!(facts[0].text, "uses the a|b syntax");
    }

    #[test]
    fn entity_lines_parsed_and_deduped() {
        let output = "ENTITY|person|Alice Johnson\n\
                      ENTITY|organization|Google\n\
                      ENTITY|person|alice johnson\n\
                      ENTITY|broken";
        let entities = parse_entity_lines(output);
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].name, "Alice Johnson");
        assert_eq!(entities[0].kind, EntityType::Person);
        assert_eq!(entities[1].kind, EntityType::Organization);
    }

    #[test]
    fn relation_lines_parsed_with_confidence_fallback() {
        let output = "REL|Alice|works_at|Google|0.9\n\
                      REL|Alice|knows|Bob\n\
                      REL|missing|target";
        let relations = parse_relation_lines(output);
        assert_eq!(relations.len(), 2);
        assert!((relations[0].confidence - 0.9).abs() < 1e-6);
        assert!((relations[1].confidence - 0.5).abs() < 1e-6);
        assert_eq!(relations[1].relation_type, "knows");
    }

    #[test]
    fn mixed_protocol_reply_sorted_by_tag() {
        let output = "FACT|event|0.7|The user visited Berlin\n\
                      ENTITY|place|Berlin\n\
                      REL|User|visited|Berlin|0.6";
        assert_eq!(parse_fact_lines(output, 10, 0.0).len(), 1);
        assert_eq!(parse_entity_lines(output).len(), 1);
        assert_eq!(parse_relation_lines(output).len(), 1);
    }
}
