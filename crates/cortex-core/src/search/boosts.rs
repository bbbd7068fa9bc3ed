//! Score Boosting Stages
//!
//! Layered adjustments applied after reranking: type multipliers
//! (understanding over navigation), exponential recency decay for
//! notes/session summaries, and initiative filtering/boosting. Each stage
//! re-sorts by the adjusted score.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::documents::{METADATA_ONLY_TYPES, MetadataExt, RECENCY_BOOSTED_TYPES};

use super::hybrid::Candidate;

/// Score multiplier for documents tagged with the focused initiative
pub const INITIATIVE_BOOST_FACTOR: f64 = 1.3;

/// Floor for the recency decay so old notes never vanish entirely
pub const RECENCY_MIN_BOOST: f64 = 0.5;

fn resort(results: &mut [Candidate]) {
    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
}

/// Multiply scores by per-type multipliers (unknown types score 1.0).
pub fn apply_type_boost(mut results: Vec<Candidate>, multipliers: &HashMap<String, f64>) -> Vec<Candidate> {
    for candidate in &mut results {
        let doc_type = candidate.meta.str_of("type").unwrap_or("unknown");
        let multiplier = multipliers.get(doc_type).copied().unwrap_or(1.0);
        candidate.score *= multiplier;
        candidate.type_boost = Some(multiplier);
    }
    resort(&mut results);
    results
}

/// Exponential recency decay for notes and session summaries:
/// `boost = max(min_boost, e^(-age_days / half_life))`.
pub fn apply_recency_boost(mut results: Vec<Candidate>, half_life_days: f64) -> Vec<Candidate> {
    let now = Utc::now();

    for candidate in &mut results {
        let doc_type = candidate.meta.str_of("type").unwrap_or("");
        if !RECENCY_BOOSTED_TYPES.contains(&doc_type) {
            candidate.recency_boost = Some(1.0);
            continue;
        }

        let timestamp = candidate
            .meta
            .str_of("created_at")
            .or_else(|| candidate.meta.str_of("indexed_at"));
        let Some(parsed) = timestamp.and_then(|t| DateTime::parse_from_rfc3339(t).ok()) else {
            candidate.recency_boost = Some(1.0);
            continue;
        };

        let age_days = (now - parsed.with_timezone(&Utc)).num_seconds() as f64 / 86_400.0;
        let boost = (-age_days / half_life_days).exp().max(RECENCY_MIN_BOOST);

        candidate.score *= boost;
        candidate.recency_boost = Some((boost * 1000.0).round() / 1000.0);
    }

    resort(&mut results);
    results
}

/// Retain only documents tagged with the requested initiative, plus
/// untagged repository-wide metadata documents.
pub fn filter_by_initiative(results: Vec<Candidate>, initiative_id: &str) -> Vec<Candidate> {
    results
        .into_iter()
        .filter(|candidate| {
            let tagged = candidate.meta.str_of("initiative_id");
            match tagged {
                Some(id) => id == initiative_id,
                None => {
                    let doc_type = candidate.meta.str_of("type").unwrap_or("");
                    METADATA_ONLY_TYPES.contains(&doc_type)
                }
            }
        })
        .collect()
}

/// Boost documents tagged with the focused initiative.
pub fn apply_initiative_boost(mut results: Vec<Candidate>, focused_initiative_id: &str) -> Vec<Candidate> {
    for candidate in &mut results {
        if candidate.meta.str_of("initiative_id") == Some(focused_initiative_id) {
            candidate.score *= INITIATIVE_BOOST_FACTOR;
            candidate.initiative_boost = Some(INITIATIVE_BOOST_FACTOR);
        }
    }
    resort(&mut results);
    results
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::{Metadata, default_type_multipliers};

    fn candidate(id: &str, doc_type: &str, score: f64) -> Candidate {
        let mut meta = Metadata::new();
        meta.set_str("type", doc_type);
        let mut c = Candidate::new(id.to_string(), String::new(), meta);
        c.score = score;
        c
    }

    #[test]
    fn test_type_boost_reorders() {
        let results = vec![
            candidate("code", "code", 1.0),
            candidate("insight", "insight", 0.6),
        ];
        let boosted = apply_type_boost(results, &default_type_multipliers());
        // insight 0.6 * 2.0 = 1.2 beats code 1.0
        assert_eq!(boosted[0].id, "insight");
        assert_eq!(boosted[0].type_boost, Some(2.0));
        assert_eq!(boosted[1].type_boost, Some(1.0));
    }

    #[test]
    fn test_recency_boost_only_for_memory_types() {
        let old = (Utc::now() - chrono::Duration::days(90)).to_rfc3339();

        let mut old_note = candidate("note", "note", 1.0);
        old_note.meta.set_str("created_at", old.clone());
        let mut old_code = candidate("code", "code", 1.0);
        old_code.meta.set_str("created_at", old);

        let boosted = apply_recency_boost(vec![old_note, old_code], 30.0);
        let note = boosted.iter().find(|c| c.id == "note").unwrap();
        let code = boosted.iter().find(|c| c.id == "code").unwrap();

        // 90 days at 30-day half-life hits the 0.5 floor
        assert!((note.score - 0.5).abs() < 0.01);
        assert_eq!(code.score, 1.0);
        assert_eq!(code.recency_boost, Some(1.0));
    }

    #[test]
    fn test_recency_boost_fresh_is_near_one() {
        let mut fresh = candidate("note", "note", 1.0);
        fresh.meta.set_str("created_at", Utc::now().to_rfc3339());
        let boosted = apply_recency_boost(vec![fresh], 30.0);
        assert!(boosted[0].score > 0.99);
    }

    #[test]
    fn test_initiative_filter() {
        let mut tagged = candidate("tagged", "note", 1.0);
        tagged.meta.set_str("initiative_id", "initiative:abc");
        let mut other = candidate("other", "note", 1.0);
        other.meta.set_str("initiative_id", "initiative:xyz");
        let untagged_code = candidate("code", "code", 1.0);
        let untagged_note = candidate("note", "note", 1.0);

        let filtered = filter_by_initiative(
            vec![tagged, other, untagged_code, untagged_note],
            "initiative:abc",
        );
        let ids: Vec<&str> = filtered.iter().map(|c| c.id.as_str()).collect();

        assert!(ids.contains(&"tagged"));
        // Untagged metadata-type docs are repository-wide, kept
        assert!(ids.contains(&"code"));
        // Docs tagged with a different initiative and untagged memory docs drop
        assert!(!ids.contains(&"other"));
        assert!(!ids.contains(&"note"));
    }

    #[test]
    fn test_initiative_boost_ordering() {
        // A focused doc at base 0.77s must reach at least any other doc at s
        let mut focused = candidate("focused", "note", 0.78);
        focused.meta.set_str("initiative_id", "initiative:abc");
        let plain = candidate("plain", "note", 1.0);

        let boosted = apply_initiative_boost(vec![plain, focused], "initiative:abc");
        assert_eq!(boosted[0].id, "focused");
        assert_eq!(boosted[0].initiative_boost, Some(INITIATIVE_BOOST_FACTOR));
    }
}
