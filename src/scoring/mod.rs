//! Relationship scoring between candidate nodes.
//!
//! A newly ingested node is compared against recent nodes. Indicator phrases
//! in its text ("is a", "contains", "relates to", ...) propose a relationship
//! type with a base weight; the weight is scaled by a semantic multiplier,
//! decayed by the time between the two nodes, clamped to [0, 1] and finally
//! admitted only above `min_strength`.
//!
//! ## Example
//!
//! ```rust,ignore
//! use docgraph_core::scoring::{RelationshipScorer, ScoringCandidate, ScoringConfig};
//!
//! let scorer = RelationshipScorer::new(ScoringConfig::default());
//! let now = chrono::Utc::now();
//! let relation = scorer.score(
//!     &ScoringCandidate::new("Graphs contain nodes and edges", now),
//!     &ScoringCandidate::new("Chapter 1: Introduction to Graphs", now),
//! )?;
//! ```

mod indicators;
mod scorer;

pub use indicators::{builtin_indicators, relationship, Indicator, IndicatorMatch};
pub use scorer::{
    age_hours, RelationshipScorer, ScoreError, ScoredRelation, ScoringCandidate, ScoringConfig,
};
