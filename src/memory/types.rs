//! Core types for the domain-partitioned knowledge graph.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Identifier of the domain created at schema initialization.
pub const DEFAULT_DOMAIN_ID: &str = "default";

/// Default organizational path for nodes.
pub const ROOT_PATH: &str = "/";

/// Namespace for deterministic page node ids.
const PAGE_NODE_NAMESPACE: Uuid = Uuid::from_u128(0x6d2b_0c1e_8a4f_4f0e_9c3a_1b7d_5e2f_a901);

/// Stable identifier of a domain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DomainId(String);

impl DomainId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive a domain id from a human-readable name.
    ///
    /// Lower-cases and collapses anything outside `[a-z0-9_-]` into `_`.
    pub fn from_name(name: &str) -> Self {
        let mut slug = String::with_capacity(name.len());
        let mut last_was_sep = false;
        for c in name.trim().chars() {
            if c.is_ascii_alphanumeric() || c == '-' {
                slug.push(c.to_ascii_lowercase());
                last_was_sep = false;
            } else if !last_was_sep {
                slug.push('_');
                last_was_sep = true;
            }
        }
        let slug = slug.trim_matches('_');
        if slug.is_empty() {
            Self::default()
        } else {
            Self(slug.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for DomainId {
    fn default() -> Self {
        Self(DEFAULT_DOMAIN_ID.to_string())
    }
}

impl std::fmt::Display for DomainId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DomainId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Unique identifier for a memory node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a new random node ID.
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Deterministic id for a page of a document within a domain.
    ///
    /// Re-ingesting the same page always yields the same id.
    pub fn for_page(domain_id: &DomainId, document: &str, page_number: u32) -> Self {
        let key = format!("{}\u{1f}{}\u{1f}{}", domain_id, document, page_number);
        Self(Uuid::new_v5(&PAGE_NODE_NAMESPACE, key.as_bytes()).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Unique identifier for an edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(String);

impl EdgeId {
    /// Generate a new random edge ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn parse(s: &str) -> Self {
        Self(s.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EdgeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EdgeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An isolated namespace holding one graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Domain {
    pub id: DomainId,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub last_access: DateTime<Utc>,
}

/// One unit of extracted content (page, section or document).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryNode {
    pub id: NodeId,
    pub domain_id: DomainId,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub path: String,
    pub content_summary: Option<String>,
    pub summary_timestamp: Option<DateTime<Utc>>,
}

/// Input for creating or updating a node.
#[derive(Debug, Clone)]
pub struct NodeUpsert {
    pub id: NodeId,
    pub content: String,
    pub path: String,
    pub summary: Option<String>,
    /// Creation time for a new node; ignored when the node exists.
    pub created_at: DateTime<Utc>,
}

impl NodeUpsert {
    pub fn new(id: NodeId, content: impl Into<String>) -> Self {
        Self {
            id,
            content: content.into(),
            path: ROOT_PATH.to_string(),
            summary: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

/// A directed, typed, scored relationship between two nodes of one domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEdge {
    pub id: EdgeId,
    pub source_id: NodeId,
    pub target_id: NodeId,
    pub relationship_type: String,
    pub strength: f64,
    pub created_at: DateTime<Utc>,
    pub domain_id: DomainId,
}

/// Weak pointer from a node in one domain to a node in another.
///
/// The target node is not validated and may not exist yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainReference {
    pub source_node_id: NodeId,
    pub source_domain_id: DomainId,
    pub target_domain_id: DomainId,
    pub target_node_id: NodeId,
    pub description: String,
    pub bidirectional: bool,
}

impl DomainReference {
    /// Whether this reference is visible from the given endpoint.
    pub fn touches(&self, domain_id: &DomainId, node_id: &NodeId) -> bool {
        let from_source = &self.source_domain_id == domain_id && &self.source_node_id == node_id;
        let from_target = &self.target_domain_id == domain_id && &self.target_node_id == node_id;
        from_source || (self.bidirectional && from_target)
    }
}

/// Row counts for a domain, for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainStats {
    pub node_count: u64,
    pub edge_count: u64,
    pub tag_count: u64,
    pub reference_count: u64,
}

/// Subgraph reached from a starting node.
#[derive(Debug, Clone, Default)]
pub struct Neighborhood {
    pub origin: Option<NodeId>,
    pub nodes: Vec<MemoryNode>,
    pub edges: Vec<MemoryEdge>,
}

impl Neighborhood {
    pub fn node_ids(&self) -> BTreeSet<NodeId> {
        self.nodes.iter().map(|n| n.id.clone()).collect()
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.iter().any(|n| &n.id == id)
    }
}
