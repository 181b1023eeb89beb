//! Graph construction from processed page records.
//!
//! A [`GraphBuilder`] owns one document build. It walks a state machine
//! (`Initializing -> IngestingPage -> Scoring -> Committing -> ... ->
//! Finalizing -> Done`, or `Aborted`), keeps a sliding window of recently
//! committed nodes as scoring candidates, and commits each page atomically.
//!
//! ## Example
//!
//! ```rust,ignore
//! use docgraph_core::builder::{BuilderConfig, GraphBuilder};
//! use docgraph_core::ingest::PageRecord;
//! use docgraph_core::memory::SqliteGraphStore;
//!
//! let store = SqliteGraphStore::open("graph.db")?;
//! let mut builder = GraphBuilder::new(store, BuilderConfig::new("Graph Theory"))?;
//! let report = builder.build_document("intro.pdf", vec![
//!     PageRecord::new(1, "Chapter 1: Introduction to Graphs"),
//!     PageRecord::new(2, "Graphs contain nodes and edges"),
//! ]);
//! assert!(report.is_complete());
//! ```

mod config;
mod graph_builder;
mod state;
mod window;

pub use config::BuilderConfig;
pub use graph_builder::{normalize_tag, page_path, GraphBuilder};
#[cfg(feature = "tokio-runtime")]
pub use graph_builder::spawn_build;
pub use state::{
    AbortReason, BuildReport, BuildState, BuildStatus, CancellationToken, PageOutcome, PageStatus,
};
pub use window::{CandidateWindow, WindowEntry};
