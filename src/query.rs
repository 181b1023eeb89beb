//! Read-side facade for downstream consumers.
//!
//! Every operation takes an optional domain; `None` means the persisted
//! current domain.

use std::time::Duration;

use crate::error::Result;
use crate::export::{export_domain, snapshot_domain, ExportFormat, GraphSnapshot};
use crate::memory::{
    Domain, DomainId, DomainStats, MemoryNode, Neighborhood, NodeId, SqliteGraphStore,
};

/// Search, traversal, export and statistics over a store.
#[derive(Clone)]
pub struct GraphQuery {
    store: SqliteGraphStore,
}

impl GraphQuery {
    pub fn new(store: SqliteGraphStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &SqliteGraphStore {
        &self.store
    }

    pub fn current_domain(&self) -> Result<DomainId> {
        self.store.current_domain()
    }

    fn resolve(&self, domain: Option<&DomainId>) -> Result<DomainId> {
        match domain {
            Some(id) => Ok(id.clone()),
            None => self.store.current_domain(),
        }
    }

    pub fn list_domains(&self) -> Result<Vec<Domain>> {
        self.store.list_domains()
    }

    /// Full-text search ranked by relevance.
    pub fn search(&self, domain: Option<&DomainId>, text: &str) -> Result<Vec<MemoryNode>> {
        let domain = self.resolve(domain)?;
        self.store.search(&domain, text)
    }

    /// Search with a result cap and deadline. A timeout is reported, not retried.
    pub fn search_with_timeout(
        &self,
        domain: Option<&DomainId>,
        text: &str,
        limit: Option<usize>,
        timeout: Duration,
    ) -> Result<Vec<MemoryNode>> {
        let domain = self.resolve(domain)?;
        self.store.search_with_timeout(&domain, text, limit, timeout)
    }

    pub fn node(&self, node_id: &NodeId) -> Result<Option<(MemoryNode, Vec<String>)>> {
        let Some(node) = self.store.get_node(node_id)? else {
            return Ok(None);
        };
        let tags = self.store.node_tags(node_id)?;
        Ok(Some((node, tags)))
    }

    pub fn neighborhood(
        &self,
        node_id: &NodeId,
        depth: usize,
        min_strength: Option<f64>,
    ) -> Result<Neighborhood> {
        self.store.neighborhood(node_id, depth, min_strength)
    }

    pub fn stats(&self, domain: Option<&DomainId>) -> Result<DomainStats> {
        let domain = self.resolve(domain)?;
        self.store.stats(&domain)
    }

    pub fn snapshot(&self, domain: Option<&DomainId>) -> Result<GraphSnapshot> {
        let domain = self.resolve(domain)?;
        snapshot_domain(&self.store, &domain, self.store.default_timeout())
    }

    pub fn export(&self, domain: Option<&DomainId>, format: ExportFormat) -> Result<String> {
        let domain = self.resolve(domain)?;
        export_domain(&self.store, &domain, format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{BuilderConfig, GraphBuilder};
    use crate::error::Error;
    use crate::ingest::PageRecord;
    use chrono::Utc;

    fn built() -> (GraphQuery, DomainId) {
        let store = SqliteGraphStore::in_memory().unwrap();
        let now = Utc::now();
        let report = GraphBuilder::new(store.clone(), BuilderConfig::new("Graph Theory"))
            .unwrap()
            .build_document(
                "intro.pdf",
                vec![
                    PageRecord::new(1, "Chapter 1: Introduction to Graphs").with_timestamp(now),
                    PageRecord::new(2, "Graphs contain nodes and edges").with_timestamp(now),
                    PageRecord::new(3, "A tree is a connected acyclic graph").with_timestamp(now),
                ],
            );
        assert!(report.is_complete());
        (GraphQuery::new(store), DomainId::new("graph_theory"))
    }

    #[test]
    fn test_defaults_to_current_domain() {
        let (query, domain) = built();
        assert_eq!(query.current_domain().unwrap(), domain);
        assert_eq!(
            query.stats(None).unwrap(),
            query.stats(Some(&domain)).unwrap()
        );
        assert_eq!(query.search(None, "Graphs").unwrap().len(), 2);
    }

    #[test]
    fn test_search_in_other_domain_is_isolated() {
        let (query, _domain) = built();
        let default = DomainId::default();
        assert!(query.search(Some(&default), "Graphs").unwrap().is_empty());
    }

    #[test]
    fn test_unknown_domain() {
        let (query, _domain) = built();
        let err = query
            .stats(Some(&DomainId::new("missing")))
            .unwrap_err();
        assert!(matches!(err, Error::UnknownDomain { .. }));
    }

    #[test]
    fn test_neighborhood_and_node() {
        let (query, domain) = built();
        let page1 = NodeId::for_page(&domain, "intro.pdf", 1);
        let page2 = NodeId::for_page(&domain, "intro.pdf", 2);

        let hood = query.neighborhood(&page1, 1, None).unwrap();
        assert!(hood.contains(&page1));
        assert!(hood.contains(&page2));

        let (node, tags) = query.node(&page2).unwrap().unwrap();
        assert_eq!(node.content, "Graphs contain nodes and edges");
        assert!(tags.contains(&"page-2".to_string()));
        assert!(query.node(&NodeId::new("nope")).unwrap().is_none());
    }

    #[test]
    fn test_export_via_facade() {
        let (query, _domain) = built();
        let snapshot = query.snapshot(None).unwrap();
        assert_eq!(snapshot.nodes.len(), 3);
        assert_eq!(snapshot.stats(), query.stats(None).unwrap());

        let json = query.export(None, ExportFormat::Json).unwrap();
        assert_eq!(GraphSnapshot::from_json(&json).unwrap(), snapshot);
    }
}
