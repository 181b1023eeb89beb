//! Construction parameters for the graph builder.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::memory::DomainId;
use crate::scoring::ScoringConfig;

/// Configuration for building one document's graph.
///
/// Values normally come from the caller's own configuration layers; this
/// struct only validates and carries them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    /// Human-readable domain name; the domain id is derived from it.
    pub domain_name: String,
    pub domain_description: String,
    /// Prefix applied to every tag the builder attaches.
    pub tags_prefix: String,
    /// Pages whose trimmed content is shorter than this are skipped.
    pub min_content_length: usize,
    /// Number of recent nodes scored against each new node.
    pub window_size: usize,
    #[serde(flatten)]
    pub scoring: ScoringConfig,
    /// Attempts after the first when the store is unavailable.
    pub max_retries: u32,
    /// Base backoff between attempts; doubles each retry.
    pub retry_backoff_ms: u64,
    /// Deadline for committing one page.
    pub commit_timeout_ms: u64,
    /// Make the built domain the persisted current domain when done.
    pub set_current_domain: bool,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            domain_name: "default".to_string(),
            domain_description: String::new(),
            tags_prefix: String::new(),
            min_content_length: 10,
            window_size: 3,
            scoring: ScoringConfig::default(),
            max_retries: 3,
            retry_backoff_ms: 50,
            commit_timeout_ms: 5_000,
            set_current_domain: true,
        }
    }
}

impl BuilderConfig {
    pub fn new(domain_name: impl Into<String>) -> Self {
        Self {
            domain_name: domain_name.into(),
            ..Default::default()
        }
    }

    /// Parse from JSON; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.domain_description = description.into();
        self
    }

    pub fn with_tags_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.tags_prefix = prefix.into();
        self
    }

    pub fn with_min_content_length(mut self, min_content_length: usize) -> Self {
        self.min_content_length = min_content_length;
        self
    }

    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size;
        self
    }

    pub fn with_scoring(mut self, scoring: ScoringConfig) -> Self {
        self.scoring = scoring;
        self
    }

    pub fn with_retries(mut self, max_retries: u32, backoff_ms: u64) -> Self {
        self.max_retries = max_retries;
        self.retry_backoff_ms = backoff_ms;
        self
    }

    pub fn with_commit_timeout(mut self, timeout_ms: u64) -> Self {
        self.commit_timeout_ms = timeout_ms;
        self
    }

    pub fn with_set_current_domain(mut self, set_current: bool) -> Self {
        self.set_current_domain = set_current;
        self
    }

    pub fn domain_id(&self) -> DomainId {
        DomainId::from_name(&self.domain_name)
    }

    pub fn commit_timeout(&self) -> Duration {
        Duration::from_millis(self.commit_timeout_ms)
    }

    /// Backoff before retry number `attempt` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.min(10);
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(factor))
    }

    pub fn validate(&self) -> Result<()> {
        if self.domain_name.trim().is_empty() {
            return Err(Error::Config("domain_name must not be empty".to_string()));
        }
        if self.commit_timeout_ms == 0 {
            return Err(Error::Config(
                "commit_timeout_ms must be greater than zero".to_string(),
            ));
        }
        self.scoring.validate()
    }
}
