//! # docgraph-core
//!
//! Incremental knowledge-graph construction over extracted document content.
//!
//! Pages of text (with optional summaries and ontology tags) are turned into
//! nodes, connected by typed, strength-scored edges, indexed for full-text
//! search and grouped into isolated domains that may reference each other.
//!
//! ## Core Components
//!
//! - **Memory**: SQLite store with domains, nodes, edges, tags, domain
//!   references and a transactionally synchronized full-text index
//! - **Scoring**: bounded relationship strengths from indicator phrases
//! - **Ingest**: normalization of upstream page records
//! - **Builder**: per-document state machine committing one page at a time
//! - **Linker**: weak cross-domain references
//! - **Export / Query**: portable snapshots, search and traversal
//!
//! ## Example
//!
//! ```rust,ignore
//! use docgraph_core::{BuilderConfig, GraphBuilder, GraphQuery, PageRecord, SqliteGraphStore};
//!
//! let store = SqliteGraphStore::open("graph.db")?;
//! let mut builder = GraphBuilder::new(store.clone(), BuilderConfig::new("Graph Theory"))?;
//! let report = builder.build_document("intro.pdf", vec![
//!     PageRecord::new(1, "Chapter 1: Introduction to Graphs"),
//!     PageRecord::new(2, "Graphs contain nodes and edges"),
//! ]);
//! println!("{} pages committed", report.committed());
//!
//! let hits = GraphQuery::new(store).search(None, "edges")?;
//! ```

pub mod builder;
pub mod error;
pub mod export;
pub mod ingest;
pub mod linker;
pub mod memory;
pub mod query;
pub mod scoring;

// Re-exports for convenience
#[cfg(feature = "tokio-runtime")]
pub use builder::spawn_build;
pub use builder::{
    AbortReason, BuildReport, BuildState, BuildStatus, BuilderConfig, CancellationToken,
    GraphBuilder, PageOutcome, PageStatus,
};
pub use error::{Error, Result};
pub use export::{export_domain, import_domain, ExportFormat, GraphSnapshot, ImportReport};
pub use ingest::{Enrichment, PageProcessor, PageRecord, ProcessingMode, RawPage, Summarizer};
pub use linker::DomainLinker;
pub use memory::{
    Domain, DomainId, DomainReference, DomainStats, EdgeId, MemoryEdge, MemoryNode,
    Neighborhood, NodeId, SqliteGraphStore, StoreConfig,
};
pub use query::GraphQuery;
pub use scoring::{RelationshipScorer, ScoredRelation, ScoringConfig};
