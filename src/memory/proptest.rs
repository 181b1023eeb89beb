//! Property-based tests for the graph store and scorer using proptest.
//!
//! These tests check the invariants the on-disk contract relies on:
//!
//! - Every stored edge has strength within [0, 1]; anything else is rejected
//! - Every node is found by searching for any of its substrings
//! - Scored strengths never leave [0, 1] for any tuning constants

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::error::Error;
    use crate::memory::{DomainId, NodeId, SqliteGraphStore, ROOT_PATH};
    use crate::scoring::{RelationshipScorer, ScoringCandidate, ScoringConfig};

    fn store_with_pair() -> (SqliteGraphStore, DomainId, NodeId, NodeId) {
        let store = SqliteGraphStore::in_memory().unwrap();
        let domain = DomainId::new("props");
        store.create_domain(&domain, "props", "").unwrap();
        let a = NodeId::new("a");
        let b = NodeId::new("b");
        store
            .upsert_node(&domain, &a, "first node", ROOT_PATH, None)
            .unwrap();
        store
            .upsert_node(&domain, &b, "second node", ROOT_PATH, None)
            .unwrap();
        (store, domain, a, b)
    }

    // Printable text with words, punctuation and the odd quote
    fn content() -> impl Strategy<Value = String> {
        "[A-Za-z0-9 ,.:;'\"%_-]{10,80}"
    }

    // =========================================================================
    // Edge strength bound
    // =========================================================================

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Strength inside [0, 1] is stored verbatim.
        #[test]
        fn in_range_strength_is_accepted(strength in 0.0f64..=1.0f64) {
            let (store, domain, a, b) = store_with_pair();
            let edge = store.create_edge(&a, &b, "relates_to", strength, &domain).unwrap();
            prop_assert_eq!(edge.strength, strength);

            let stored = store.edges_for_node(&a).unwrap();
            prop_assert_eq!(stored.len(), 1);
            prop_assert!((0.0..=1.0).contains(&stored[0].strength));
        }

        /// Strength outside [0, 1] is rejected without side effects.
        #[test]
        fn out_of_range_strength_is_rejected(
            strength in prop_oneof![
                -1.0e6f64..-1.0e-9f64,
                (1.0f64 + 1.0e-9)..1.0e6f64,
            ]
        ) {
            let (store, domain, a, b) = store_with_pair();
            let err = store.create_edge(&a, &b, "relates_to", strength, &domain).unwrap_err();
            let is_invalid_strength = matches!(err, Error::InvalidStrength { .. });
            prop_assert!(is_invalid_strength);
            prop_assert_eq!(store.stats(&domain).unwrap().edge_count, 0);
            prop_assert_eq!(store.stats(&domain).unwrap().node_count, 2);
        }
    }

    // =========================================================================
    // Substring search
    // =========================================================================

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        /// Any non-blank substring of a node's content finds the node.
        #[test]
        fn any_substring_finds_node(
            text in content(),
            start in 0usize..80,
            len in 1usize..40,
        ) {
            let store = SqliteGraphStore::in_memory().unwrap();
            let domain = DomainId::new("props");
            store.create_domain(&domain, "props", "").unwrap();
            let id = NodeId::new("n");
            store.upsert_node(&domain, &id, &text, ROOT_PATH, None).unwrap();

            let chars: Vec<char> = text.chars().collect();
            let start = start % chars.len();
            let end = (start + len).min(chars.len());
            let needle: String = chars[start..end].iter().collect();
            prop_assume!(!needle.trim().is_empty());

            let hits = store.search(&domain, &needle).unwrap();
            prop_assert!(
                hits.iter().any(|n| n.id == id),
                "substring {:?} of {:?} not found",
                needle,
                text
            );
        }
    }

    // =========================================================================
    // Scorer bound
    // =========================================================================

    proptest! {
        /// Scores stay within [0, 1] and respect the admission threshold.
        #[test]
        fn scored_strength_is_bounded(
            multiplier in 0.0f64..10.0,
            decay in 0.0f64..5.0,
            min_strength in 0.0f64..=1.0,
            age_minutes in 0i64..10_000,
        ) {
            let scorer = RelationshipScorer::new(
                ScoringConfig::default()
                    .with_semantic_multiplier(multiplier)
                    .with_decay_rate(decay)
                    .with_min_strength(min_strength),
            );
            let now = chrono::Utc::now();
            let source = ScoringCandidate::new("A graph is a structure that contains nodes", now);
            let target = ScoringCandidate::new(
                "Graphs overview",
                now - chrono::Duration::minutes(age_minutes),
            );

            if let Some(relation) = scorer.score(&source, &target).unwrap() {
                prop_assert!((0.0..=1.0).contains(&relation.strength));
                prop_assert!(relation.strength >= min_strength);
            }
        }
    }
}
