//! Portable, order-stable domain snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::memory::{DomainId, DomainStats, EdgeId, NodeId};

/// Version written into every snapshot.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Output encoding of an export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    /// Compact JSON, one line.
    #[default]
    Json,
    /// Indented JSON for humans and diffs.
    JsonPretty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotDomain {
    pub id: DomainId,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotNode {
    pub id: NodeId,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub path: String,
    pub content_summary: Option<String>,
    pub summary_timestamp: Option<DateTime<Utc>>,
    /// Sorted.
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEdge {
    pub id: EdgeId,
    pub source_id: NodeId,
    pub target_id: NodeId,
    pub relationship_type: String,
    pub strength: f64,
    pub created_at: DateTime<Utc>,
}

/// Outgoing cross-domain reference; the source domain is the snapshot's.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotReference {
    pub source_node_id: NodeId,
    pub target_domain_id: DomainId,
    pub target_node_id: NodeId,
    pub description: String,
    pub bidirectional: bool,
}

/// Everything needed to reconstruct one domain in a fresh store.
///
/// Nodes are ordered by id, edges by (source, target, type) and references
/// by (source node, target domain, target node), so equal graphs serialize
/// to identical bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub format_version: u32,
    pub domain: SnapshotDomain,
    pub nodes: Vec<SnapshotNode>,
    pub edges: Vec<SnapshotEdge>,
    pub references: Vec<SnapshotReference>,
}

impl GraphSnapshot {
    pub fn new(domain: SnapshotDomain) -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            domain,
            nodes: Vec::new(),
            edges: Vec::new(),
            references: Vec::new(),
        }
    }

    /// Put every collection in canonical order.
    pub fn normalize(&mut self) {
        for node in &mut self.nodes {
            node.tags.sort();
            node.tags.dedup();
        }
        self.nodes.sort_by(|a, b| a.id.cmp(&b.id));
        self.edges.sort_by(|a, b| {
            (&a.source_id, &a.target_id, &a.relationship_type, &a.id).cmp(&(
                &b.source_id,
                &b.target_id,
                &b.relationship_type,
                &b.id,
            ))
        });
        self.references.sort_by(|a, b| {
            (&a.source_node_id, &a.target_domain_id, &a.target_node_id).cmp(&(
                &b.source_node_id,
                &b.target_domain_id,
                &b.target_node_id,
            ))
        });
    }

    pub fn stats(&self) -> DomainStats {
        DomainStats {
            node_count: self.nodes.len() as u64,
            edge_count: self.edges.len() as u64,
            tag_count: self.nodes.iter().map(|n| n.tags.len() as u64).sum(),
            reference_count: self.references.len() as u64,
        }
    }

    pub fn to_json(&self, format: ExportFormat) -> Result<String> {
        let json = match format {
            ExportFormat::Json => serde_json::to_string(self)?,
            ExportFormat::JsonPretty => serde_json::to_string_pretty(self)?,
        };
        Ok(json)
    }

    /// Parse a snapshot, rejecting unknown format versions.
    pub fn from_json(json: &str) -> Result<Self> {
        let mut snapshot: Self = serde_json::from_str(json)?;
        if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(Error::Config(format!(
                "unsupported snapshot format version {} (expected {})",
                snapshot.format_version, SNAPSHOT_FORMAT_VERSION
            )));
        }
        snapshot.normalize();
        Ok(snapshot)
    }

    pub fn save(&self, path: &Path, format: ExportFormat) -> Result<()> {
        let json = self.to_json(format)?;
        fs::write(path, json)
            .map_err(|e| Error::Internal(format!("Failed to save snapshot: {}", e)))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .map_err(|e| Error::Internal(format!("Failed to load snapshot: {}", e)))?;
        Self::from_json(&json)
    }

    /// SHA-256 of the compact canonical encoding, as lowercase hex.
    pub fn digest(&self) -> Result<String> {
        let mut canonical = self.clone();
        canonical.normalize();
        let mut hasher = Sha256::new();
        hasher.update(canonical.to_json(ExportFormat::Json)?.as_bytes());
        Ok(format!("{:x}", hasher.finalize()))
    }
}
