//! Build state machine, per-page outcomes and the final report.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::memory::{DomainId, NodeId};

/// Phase of a document build.
///
/// ```text
/// Initializing -> IngestingPage(n) -> Scoring(n) -> Committing(n) -> IngestingPage(n+1) ...
///                                                                 -> Finalizing -> Done
/// any state -> Aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "page", rename_all = "snake_case")]
pub enum BuildState {
    Initializing,
    IngestingPage(u32),
    Scoring(u32),
    Committing(u32),
    Finalizing,
    Done,
    Aborted,
}

impl BuildState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Aborted)
    }

    /// Page the state refers to, if any.
    pub fn page(&self) -> Option<u32> {
        match self {
            Self::IngestingPage(n) | Self::Scoring(n) | Self::Committing(n) => Some(*n),
            _ => None,
        }
    }

    /// Whether `next` is a legal successor of this state.
    pub fn can_transition_to(&self, next: &BuildState) -> bool {
        use BuildState::*;
        match (self, next) {
            (Done | Aborted, _) => false,
            (_, Aborted) => true,
            (Initializing, IngestingPage(_) | Finalizing) => true,
            // A skipped page goes straight to the next page
            (IngestingPage(_), IngestingPage(_) | Finalizing) => true,
            (IngestingPage(n), Scoring(m)) => n == m,
            (Scoring(n), Committing(m)) => n == m,
            // A failed commit leaves the page and moves on
            (Committing(_), IngestingPage(_) | Finalizing) => true,
            (Finalizing, Done) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for BuildState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initializing => write!(f, "initializing"),
            Self::IngestingPage(n) => write!(f, "ingesting_page({})", n),
            Self::Scoring(n) => write!(f, "scoring({})", n),
            Self::Committing(n) => write!(f, "committing({})", n),
            Self::Finalizing => write!(f, "finalizing"),
            Self::Done => write!(f, "done"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// Why a build stopped early.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "message", rename_all = "snake_case")]
pub enum AbortReason {
    /// The store stayed unavailable after every retry.
    StoreUnavailable(String),
    /// The domain could not be prepared.
    Initialization(String),
    /// An error no later page could recover from.
    Internal(String),
    Cancelled,
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StoreUnavailable(msg) => write!(f, "store unavailable: {}", msg),
            Self::Initialization(msg) => write!(f, "initialization failed: {}", msg),
            Self::Internal(msg) => write!(f, "internal error: {}", msg),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Final status of a build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BuildStatus {
    Done {
        pages_committed: usize,
    },
    Aborted {
        reason: AbortReason,
        last_committed_page: Option<u32>,
    },
}

/// What happened to one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PageStatus {
    Committed {
        node_id: NodeId,
        edges_created: usize,
        /// Edges that already existed from an earlier run.
        edges_existing: usize,
        tags_added: usize,
    },
    Skipped {
        reason: String,
    },
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageOutcome {
    pub page_number: u32,
    #[serde(flatten)]
    pub status: PageStatus,
}

impl PageOutcome {
    pub fn skipped(page_number: u32, reason: impl Into<String>) -> Self {
        Self {
            page_number,
            status: PageStatus::Skipped {
                reason: reason.into(),
            },
        }
    }

    pub fn failed(page_number: u32, error: impl std::fmt::Display) -> Self {
        Self {
            page_number,
            status: PageStatus::Failed {
                error: error.to_string(),
            },
        }
    }

    pub fn is_committed(&self) -> bool {
        matches!(self.status, PageStatus::Committed { .. })
    }

    pub fn node_id(&self) -> Option<&NodeId> {
        match &self.status {
            PageStatus::Committed { node_id, .. } => Some(node_id),
            _ => None,
        }
    }
}

/// Summary of one document build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildReport {
    pub document: String,
    pub domain_id: DomainId,
    pub status: BuildStatus,
    pub pages: Vec<PageOutcome>,
}

impl BuildReport {
    pub fn committed(&self) -> usize {
        self.pages.iter().filter(|p| p.is_committed()).count()
    }

    pub fn failed(&self) -> usize {
        self.pages
            .iter()
            .filter(|p| matches!(p.status, PageStatus::Failed { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.pages
            .iter()
            .filter(|p| matches!(p.status, PageStatus::Skipped { .. }))
            .count()
    }

    pub fn edges_created(&self) -> usize {
        self.pages
            .iter()
            .map(|p| match p.status {
                PageStatus::Committed { edges_created, .. } => edges_created,
                _ => 0,
            })
            .sum()
    }

    pub fn last_committed_page(&self) -> Option<u32> {
        self.pages
            .iter()
            .rev()
            .find(|p| p.is_committed())
            .map(|p| p.page_number)
    }

    pub fn is_done(&self) -> bool {
        matches!(self.status, BuildStatus::Done { .. })
    }

    /// Done, and no page failed.
    pub fn is_complete(&self) -> bool {
        self.is_done() && self.failed() == 0
    }
}

/// Cooperative cancellation flag shared between a caller and a running build.
///
/// Checked between pages; a page already committing finishes or rolls back
/// as a unit.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
