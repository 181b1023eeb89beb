//! Page processors: direct extraction, AI-enhanced and context-aware.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use tracing::{debug, warn};

use super::types::{PageRecord, RawPage};
use crate::error::Result;

/// Output of an upstream intelligence step for one page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Enrichment {
    /// Corrected transcription replacing the extracted text, if any.
    pub transcription: Option<String>,
    pub summary: Option<String>,
    /// Ontology categories or keywords.
    pub tags: BTreeSet<String>,
}

/// External collaborator that summarizes and categorizes page text.
///
/// Implemented by whatever backend the caller wires in; the graph engine
/// never talks to a language model itself.
pub trait Summarizer: Send + Sync {
    /// Enrich one page. `context` carries summaries of preceding pages when
    /// the processor runs in context-aware mode.
    fn enrich(&self, text: &str, context: Option<&str>) -> Result<Enrichment>;
}

/// Which processing path produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessingMode {
    DirectExtraction,
    AiEnhanced,
    ContextAware,
}

impl std::fmt::Display for ProcessingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DirectExtraction => write!(f, "direct_extraction"),
            Self::AiEnhanced => write!(f, "ai_enhanced"),
            Self::ContextAware => write!(f, "context_aware"),
        }
    }
}

/// Normalizes raw pages into [`PageRecord`]s.
pub enum PageProcessor {
    /// Extracted text is used as-is.
    DirectExtraction,
    /// Each page is enriched independently.
    AiEnhanced { summarizer: Arc<dyn Summarizer> },
    /// Each page is enriched with summaries of the preceding pages.
    ContextAware {
        summarizer: Arc<dyn Summarizer>,
        context_pages: usize,
        recent: VecDeque<String>,
    },
}

impl PageProcessor {
    pub fn direct() -> Self {
        Self::DirectExtraction
    }

    pub fn ai_enhanced(summarizer: Arc<dyn Summarizer>) -> Self {
        Self::AiEnhanced { summarizer }
    }

    pub fn context_aware(summarizer: Arc<dyn Summarizer>, context_pages: usize) -> Self {
        Self::ContextAware {
            summarizer,
            context_pages,
            recent: VecDeque::with_capacity(context_pages),
        }
    }

    pub fn mode(&self) -> ProcessingMode {
        match self {
            Self::DirectExtraction => ProcessingMode::DirectExtraction,
            Self::AiEnhanced { .. } => ProcessingMode::AiEnhanced,
            Self::ContextAware { .. } => ProcessingMode::ContextAware,
        }
    }

    /// Turn a raw page into a record.
    ///
    /// A failing summarizer degrades the page to direct extraction.
    pub fn process(&mut self, raw: RawPage) -> PageRecord {
        let text = raw.text.trim().to_string();
        let enrichment = match self {
            Self::DirectExtraction => None,
            Self::AiEnhanced { summarizer } => enrich_or_degrade(&**summarizer, &raw, &text, None),
            Self::ContextAware {
                summarizer,
                context_pages,
                recent,
            } => {
                let context = if recent.is_empty() {
                    None
                } else {
                    Some(recent.iter().cloned().collect::<Vec<_>>().join("\n"))
                };
                let enrichment =
                    enrich_or_degrade(&**summarizer, &raw, &text, context.as_deref());
                if *context_pages > 0 {
                    if let Some(summary) = enrichment.as_ref().and_then(|e| e.summary.clone()) {
                        if recent.len() == *context_pages {
                            recent.pop_front();
                        }
                        recent.push_back(summary);
                    }
                }
                enrichment
            }
        };

        let mut record = PageRecord::new(raw.page_number, text).with_timestamp(raw.timestamp);
        if let Some(enrichment) = enrichment {
            if let Some(transcription) = enrichment
                .transcription
                .filter(|t| !t.trim().is_empty())
            {
                record.content = transcription.trim().to_string();
            }
            record.summary = enrichment.summary.filter(|s| !s.trim().is_empty());
            record.tags = enrichment.tags;
        }
        debug!(page = raw.page_number, mode = %self.mode(), "Processed page");
        record
    }
}

fn enrich_or_degrade(
    summarizer: &dyn Summarizer,
    raw: &RawPage,
    text: &str,
    context: Option<&str>,
) -> Option<Enrichment> {
    match summarizer.enrich(text, context) {
        Ok(enrichment) => Some(enrichment),
        Err(e) => {
            warn!(page = raw.page_number, error = %e, "Summarizer failed; using extracted text");
            None
        }
    }
}
