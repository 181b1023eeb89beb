//! Relationship strength scoring.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::indicators::{builtin_indicators, Indicator, IndicatorMatch};
use crate::error::{Error, Result};

/// Tunable constants of the strength formula.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Candidates scoring below this are discarded.
    pub min_strength: f64,
    /// Exponential decay per hour between the two nodes' creation times.
    pub decay_rate: f64,
    /// Multiplier applied to every indicator weight.
    pub semantic_multiplier: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            min_strength: 0.5,
            decay_rate: 0.1,
            semantic_multiplier: 1.5,
        }
    }
}

impl ScoringConfig {
    pub fn with_min_strength(mut self, min_strength: f64) -> Self {
        self.min_strength = min_strength;
        self
    }

    pub fn with_decay_rate(mut self, decay_rate: f64) -> Self {
        self.decay_rate = decay_rate;
        self
    }

    pub fn with_semantic_multiplier(mut self, semantic_multiplier: f64) -> Self {
        self.semantic_multiplier = semantic_multiplier;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.min_strength) {
            return Err(Error::Config(format!(
                "min_strength must be within [0, 1], got {}",
                self.min_strength
            )));
        }
        if !self.decay_rate.is_finite() || self.decay_rate < 0.0 {
            return Err(Error::Config(format!(
                "decay_rate must be a non-negative number, got {}",
                self.decay_rate
            )));
        }
        if !self.semantic_multiplier.is_finite() || self.semantic_multiplier < 0.0 {
            return Err(Error::Config(format!(
                "semantic_multiplier must be a non-negative number, got {}",
                self.semantic_multiplier
            )));
        }
        Ok(())
    }
}

/// Text and creation time of one side of a candidate pair.
#[derive(Debug, Clone, Copy)]
pub struct ScoringCandidate<'a> {
    pub text: &'a str,
    pub created_at: DateTime<Utc>,
}

impl<'a> ScoringCandidate<'a> {
    pub fn new(text: &'a str, created_at: DateTime<Utc>) -> Self {
        Self { text, created_at }
    }
}

/// An accepted relationship for an ordered pair.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRelation {
    pub relationship_type: String,
    pub strength: f64,
    pub indicator: &'static str,
}

/// Why a pair could not be scored.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ScoreError {
    #[error("candidate text is empty")]
    EmptyText,
    #[error("strength computation produced {0}")]
    NonFinite(f64),
}

/// Computes bounded relationship strengths from indicator phrases.
///
/// `strength = clamp(base_weight * semantic_multiplier * exp(-decay_rate * age_hours), 0, 1)`
#[derive(Debug, Clone)]
pub struct RelationshipScorer {
    config: ScoringConfig,
    indicators: Vec<Indicator>,
}

impl RelationshipScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self::with_indicators(config, builtin_indicators())
    }

    pub fn with_indicators(config: ScoringConfig, indicators: Vec<Indicator>) -> Self {
        Self { config, indicators }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Every indicator that matches `text`.
    pub fn indicator_matches(&self, text: &str) -> Vec<IndicatorMatch> {
        self.indicators
            .iter()
            .filter(|i| i.is_match(text))
            .map(IndicatorMatch::from)
            .collect()
    }

    /// Raw strength of one indicator match at the given age, clamped to [0, 1].
    pub fn strength(&self, indicator: &IndicatorMatch, age_hours: f64) -> f64 {
        let raw = indicator.base_weight
            * self.config.semantic_multiplier
            * (-self.config.decay_rate * age_hours).exp();
        raw.clamp(0.0, 1.0)
    }

    /// Score one indicator match, applying the admission threshold.
    pub fn score_indicator(
        &self,
        indicator: &IndicatorMatch,
        age_hours: f64,
    ) -> std::result::Result<Option<ScoredRelation>, ScoreError> {
        let strength = self.strength(indicator, age_hours);
        if !strength.is_finite() {
            return Err(ScoreError::NonFinite(strength));
        }
        if strength < self.config.min_strength {
            return Ok(None);
        }
        Ok(Some(ScoredRelation {
            relationship_type: indicator.relationship_type.to_string(),
            strength,
            indicator: indicator.phrase,
        }))
    }

    /// Score the ordered pair `source -> target`.
    ///
    /// Indicators are looked up in the source text. When several match, the
    /// strongest wins, so at most one relation is returned per pair.
    pub fn score(
        &self,
        source: &ScoringCandidate<'_>,
        target: &ScoringCandidate<'_>,
    ) -> std::result::Result<Option<ScoredRelation>, ScoreError> {
        if source.text.trim().is_empty() || target.text.trim().is_empty() {
            return Err(ScoreError::EmptyText);
        }

        let age_hours = age_hours(source.created_at, target.created_at);
        let mut best: Option<ScoredRelation> = None;
        for indicator in self.indicator_matches(source.text) {
            let Some(candidate) = self.score_indicator(&indicator, age_hours)? else {
                continue;
            };
            if best
                .as_ref()
                .map_or(true, |b| candidate.strength > b.strength)
            {
                best = Some(candidate);
            }
        }

        if let Some(ref relation) = best {
            debug!(
                relationship = %relation.relationship_type,
                strength = relation.strength,
                indicator = relation.indicator,
                age_hours,
                "Accepted relationship candidate"
            );
        }
        Ok(best)
    }
}

impl Default for RelationshipScorer {
    fn default() -> Self {
        Self::new(ScoringConfig::default())
    }
}

/// Absolute time between two creation times, in hours.
pub fn age_hours(a: DateTime<Utc>, b: DateTime<Utc>) -> f64 {
    let millis = (a - b).num_milliseconds().unsigned_abs();
    millis as f64 / 3_600_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::indicators::relationship;
    use chrono::Duration;

    fn example_config() -> ScoringConfig {
        ScoringConfig::default()
            .with_decay_rate(0.1)
            .with_semantic_multiplier(1.5)
            .with_min_strength(0.5)
    }

    #[test]
    fn test_contains_example() {
        let scorer = RelationshipScorer::new(example_config());
        let now = Utc::now();
        let page1 = ScoringCandidate::new("Chapter 1: Introduction to Graphs", now);
        let page2 = ScoringCandidate::new("Graphs contain nodes and edges", now);

        let relation = scorer.score(&page2, &page1).unwrap().unwrap();
        assert_eq!(relation.relationship_type, relationship::CONTAINS);
        // 0.7 * 1.5 * exp(0) = 1.05, clamped
        assert_eq!(relation.strength, 1.0);

        // Page 1 carries no indicator
        assert!(scorer.score(&page1, &page2).unwrap().is_none());
    }

    #[test]
    fn test_decay_applies_admission_threshold() {
        let scorer = RelationshipScorer::new(example_config());
        let now = Utc::now();
        let old = ScoringCandidate::new("Graphs overview", now - Duration::hours(10));
        let new = ScoringCandidate::new("Graphs contain nodes", now);

        // 1.05 * exp(-1.0) ~= 0.386 < 0.5
        assert!(scorer.score(&new, &old).unwrap().is_none());

        let lenient = RelationshipScorer::new(example_config().with_min_strength(0.3));
        let relation = lenient.score(&new, &old).unwrap().unwrap();
        assert!((relation.strength - 1.05 * (-1.0f64).exp()).abs() < 1e-9);
    }

    #[test]
    fn test_strongest_indicator_wins() {
        let scorer = RelationshipScorer::new(
            example_config()
                .with_semantic_multiplier(1.0)
                .with_min_strength(0.0),
        );
        let now = Utc::now();
        let target = ScoringCandidate::new("A tree", now);
        let source = ScoringCandidate::new("A forest is a graph that relates to trees", now);

        let matches = scorer.indicator_matches(source.text);
        assert_eq!(matches.len(), 2);

        let relation = scorer.score(&source, &target).unwrap().unwrap();
        assert_eq!(relation.relationship_type, relationship::TYPE_OF);
        assert_eq!(relation.strength, 0.8);
    }

    #[test]
    fn test_empty_text_is_an_error() {
        let scorer = RelationshipScorer::default();
        let now = Utc::now();
        let empty = ScoringCandidate::new("   ", now);
        let full = ScoringCandidate::new("It contains things", now);

        assert_eq!(scorer.score(&full, &empty), Err(ScoreError::EmptyText));
        assert_eq!(scorer.score(&empty, &full), Err(ScoreError::EmptyText));
    }

    #[test]
    fn test_zero_multiplier_never_admits() {
        let scorer = RelationshipScorer::new(example_config().with_semantic_multiplier(0.0));
        let now = Utc::now();
        let a = ScoringCandidate::new("It contains things", now);
        let b = ScoringCandidate::new("things", now);
        assert!(scorer.score(&a, &b).unwrap().is_none());
    }

    #[test]
    fn test_config_validation() {
        assert!(ScoringConfig::default().validate().is_ok());
        assert!(ScoringConfig::default().with_min_strength(1.2).validate().is_err());
        assert!(ScoringConfig::default().with_decay_rate(-1.0).validate().is_err());
        assert!(ScoringConfig::default()
            .with_semantic_multiplier(f64::NAN)
            .validate()
            .is_err());
    }

    #[test]
    fn test_age_is_symmetric() {
        let now = Utc::now();
        let earlier = now - Duration::minutes(90);
        assert_eq!(age_hours(now, earlier), 1.5);
        assert_eq!(age_hours(earlier, now), 1.5);
    }
}
