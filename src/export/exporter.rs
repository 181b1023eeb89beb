//! Export a domain to a snapshot and rebuild it from one.

use std::time::Duration;

use tracing::{info, warn};

use super::snapshot::{
    ExportFormat, GraphSnapshot, SnapshotDomain, SnapshotEdge, SnapshotNode, SnapshotReference,
};
use crate::error::Result;
use crate::memory::{
    Domain, DomainId, DomainReference, DomainStats, MemoryEdge, MemoryNode, SqliteGraphStore,
};

/// Result of an import.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportReport {
    pub domain_id: DomainId,
    pub stats: DomainStats,
    /// References dropped because their target domain is not in this store.
    pub references_skipped: usize,
}

/// Read a consistent snapshot of one domain.
pub fn snapshot_domain(
    store: &SqliteGraphStore,
    domain_id: &DomainId,
    timeout: Duration,
) -> Result<GraphSnapshot> {
    let mut snapshot = store.transaction(timeout, |tx| {
        let domain = tx.require_domain(domain_id)?;
        let mut snapshot = GraphSnapshot::new(SnapshotDomain {
            id: domain.id,
            name: domain.name,
            description: domain.description,
            created_at: domain.created_at,
        });

        for node in tx.list_nodes(domain_id)? {
            let tags = tx.node_tags(&node.id)?;
            snapshot.nodes.push(SnapshotNode {
                id: node.id,
                content: node.content,
                created_at: node.created_at,
                path: node.path,
                content_summary: node.content_summary,
                summary_timestamp: node.summary_timestamp,
                tags,
            });
        }
        snapshot.edges = tx
            .list_edges(domain_id)?
            .into_iter()
            .map(|e| SnapshotEdge {
                id: e.id,
                source_id: e.source_id,
                target_id: e.target_id,
                relationship_type: e.relationship_type,
                strength: e.strength,
                created_at: e.created_at,
            })
            .collect();
        snapshot.references = tx
            .references_from_domain(domain_id)?
            .into_iter()
            .map(|r| SnapshotReference {
                source_node_id: r.source_node_id,
                target_domain_id: r.target_domain_id,
                target_node_id: r.target_node_id,
                description: r.description,
                bidirectional: r.bidirectional,
            })
            .collect();
        Ok(snapshot)
    })?;
    snapshot.normalize();
    Ok(snapshot)
}

/// Export a domain in the given format.
pub fn export_domain(
    store: &SqliteGraphStore,
    domain_id: &DomainId,
    format: ExportFormat,
) -> Result<String> {
    let snapshot = snapshot_domain(store, domain_id, store.default_timeout())?;
    info!(
        domain = %domain_id,
        nodes = snapshot.nodes.len(),
        edges = snapshot.edges.len(),
        "Exported domain"
    );
    snapshot.to_json(format)
}

/// Rebuild a domain from a snapshot in one transaction.
///
/// Ids and timestamps are preserved. The domain must be absent or empty;
/// any failure leaves the store untouched.
pub fn import_snapshot(
    store: &SqliteGraphStore,
    snapshot: &GraphSnapshot,
    timeout: Duration,
) -> Result<ImportReport> {
    let domain_id = snapshot.domain.id.clone();
    let report = store.transaction(timeout, |tx| {
        tx.restore_domain(&Domain {
            id: domain_id.clone(),
            name: snapshot.domain.name.clone(),
            description: snapshot.domain.description.clone(),
            created_at: snapshot.domain.created_at,
            last_access: tx.now(),
        })?;

        for node in &snapshot.nodes {
            tx.insert_node(&MemoryNode {
                id: node.id.clone(),
                domain_id: domain_id.clone(),
                content: node.content.clone(),
                created_at: node.created_at,
                path: node.path.clone(),
                content_summary: node.content_summary.clone(),
                summary_timestamp: node.summary_timestamp,
            })?;
            tx.attach_tags(&node.id, &node.tags)?;
        }

        for edge in &snapshot.edges {
            tx.insert_edge(&MemoryEdge {
                id: edge.id.clone(),
                source_id: edge.source_id.clone(),
                target_id: edge.target_id.clone(),
                relationship_type: edge.relationship_type.clone(),
                strength: edge.strength,
                created_at: edge.created_at,
                domain_id: domain_id.clone(),
            })?;
        }

        let mut references_skipped = 0;
        for reference in &snapshot.references {
            if tx.get_domain(&reference.target_domain_id)?.is_none() {
                warn!(
                    source = %reference.source_node_id,
                    target_domain = %reference.target_domain_id,
                    "Skipping reference to a domain missing from this store"
                );
                references_skipped += 1;
                continue;
            }
            tx.insert_reference(&DomainReference {
                source_node_id: reference.source_node_id.clone(),
                source_domain_id: domain_id.clone(),
                target_domain_id: reference.target_domain_id.clone(),
                target_node_id: reference.target_node_id.clone(),
                description: reference.description.clone(),
                bidirectional: reference.bidirectional,
            })?;
        }

        Ok(ImportReport {
            domain_id: domain_id.clone(),
            stats: tx.stats(&domain_id)?,
            references_skipped,
        })
    })?;

    info!(
        domain = %report.domain_id,
        nodes = report.stats.node_count,
        edges = report.stats.edge_count,
        references_skipped = report.references_skipped,
        "Imported domain"
    );
    Ok(report)
}

/// Parse and import a JSON snapshot.
pub fn import_domain(store: &SqliteGraphStore, json: &str) -> Result<ImportReport> {
    let snapshot = GraphSnapshot::from_json(json)?;
    import_snapshot(store, &snapshot, store.default_timeout())
}
