//! Textual indicator phrases and the relationship types they imply.

use regex::Regex;

/// Relationship type names emitted by the built-in indicator table.
pub mod relationship {
    pub const TYPE_OF: &str = "type_of";
    pub const CONTAINS: &str = "contains";
    pub const PART_OF: &str = "part_of";
    pub const DEPENDS_ON: &str = "depends_on";
    pub const CAUSES: &str = "causes";
    pub const EXAMPLE_OF: &str = "example_of";
    pub const RELATES_TO: &str = "relates_to";
    pub const REFERENCES: &str = "references";
}

/// One indicator phrase with its relationship type and base match weight.
#[derive(Debug, Clone)]
pub struct Indicator {
    /// Canonical phrase, as reported in matches.
    pub phrase: &'static str,
    pub relationship_type: &'static str,
    /// How strongly the phrase signals the relationship, in (0, 1].
    pub base_weight: f64,
    pattern: Regex,
}

impl Indicator {
    /// Build an indicator from a case-insensitive regex body.
    pub fn new(
        phrase: &'static str,
        pattern: &str,
        relationship_type: &'static str,
        base_weight: f64,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            phrase,
            relationship_type,
            base_weight,
            pattern: Regex::new(&format!(r"(?i)\b(?:{})\b", pattern))?,
        })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }
}

/// A matched indicator found in a text.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorMatch {
    pub phrase: &'static str,
    pub relationship_type: &'static str,
    pub base_weight: f64,
}

impl From<&Indicator> for IndicatorMatch {
    fn from(indicator: &Indicator) -> Self {
        Self {
            phrase: indicator.phrase,
            relationship_type: indicator.relationship_type,
            base_weight: indicator.base_weight,
        }
    }
}

// (phrase, pattern, relationship type, base weight)
const BUILTIN: &[(&str, &str, &str, f64)] = &[
    ("is a", r"is an?", relationship::TYPE_OF, 0.8),
    ("type of", r"(?:type|kind|sort) of", relationship::TYPE_OF, 0.75),
    ("contains", r"contain(?:s|ed|ing)?", relationship::CONTAINS, 0.7),
    ("consists of", r"(?:consists|composed|made up) of", relationship::CONTAINS, 0.7),
    ("part of", r"(?:part|member|component) of", relationship::PART_OF, 0.7),
    ("depends on", r"depend(?:s|ing)? on|requires?", relationship::DEPENDS_ON, 0.65),
    ("causes", r"causes?|leads? to|results? in", relationship::CAUSES, 0.6),
    ("example of", r"example of|such as|for example", relationship::EXAMPLE_OF, 0.6),
    (
        "relates to",
        r"relat(?:es|ed) to|associated with|connected to",
        relationship::RELATES_TO,
        0.5,
    ),
    ("see also", r"see also|refers? to", relationship::REFERENCES, 0.45),
];

/// The built-in indicator table.
pub fn builtin_indicators() -> Vec<Indicator> {
    BUILTIN
        .iter()
        .filter_map(|(phrase, pattern, rel, weight)| {
            Indicator::new(phrase, pattern, rel, *weight).ok()
        })
        .collect()
}
