//! Domain-partitioned knowledge graph storage.
//!
//! The memory module persists the graph in a single SQLite file:
//!
//! - **Domains**: isolated namespaces, plus a persisted "current domain" default
//! - **Nodes**: extracted content with optional summary and a hierarchical path
//! - **Edges**: directed, typed relationships with strength in [0, 1]
//! - **Tags**: labels attached to nodes
//! - **Domain references**: weak cross-domain pointers
//!
//! A full-text projection of node content, summary, path and tags is kept in
//! step with the primary rows inside every write transaction.
//!
//! ## Example
//!
//! ```rust,ignore
//! use docgraph_core::memory::{DomainId, NodeId, SqliteGraphStore};
//!
//! let store = SqliteGraphStore::in_memory()?;
//! let domain = DomainId::new("pdf_processing");
//! store.create_domain(&domain, "PDF processing", "Extracted pages")?;
//!
//! let page = NodeId::new("page-1");
//! store.upsert_node(&domain, &page, "Chapter 1: Introduction to Graphs", "/", None)?;
//! store.attach_tags(&page, ["intro"])?;
//!
//! let hits = store.search(&domain, "Introduction")?;
//! ```

#[cfg(test)]
mod proptest;
mod schema;
mod search;
mod store;
mod types;

pub use schema::{get_schema_version, initialize_schema, is_initialized, SCHEMA_VERSION};
pub use search::{FtsQuery, MIN_MATCH_CHARS};
pub use store::{GraphTx, SqliteGraphStore, StoreConfig};
pub use types::{
    Domain, DomainId, DomainReference, DomainStats, EdgeId, MemoryEdge, MemoryNode,
    Neighborhood, NodeId, NodeUpsert, DEFAULT_DOMAIN_ID, ROOT_PATH,
};
