//! Cross-domain weak references.
//!
//! A reference points from a node in one domain to a node in another. Only
//! the source side is validated; the target node may be created later, or
//! never. A bidirectional reference is stored once with a flag and is
//! returned from either endpoint.
//!
//! ## Example
//!
//! ```rust,ignore
//! use docgraph_core::linker::DomainLinker;
//!
//! let linker = DomainLinker::new(store.clone());
//! linker.link(&physics, &page_7, &math, &page_3, "uses the same derivation", true)?;
//! let from_math = linker.references_for(&math, &page_3)?;
//! ```

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::memory::{DomainId, DomainReference, NodeId, SqliteGraphStore};

/// Creates and resolves references between domains.
#[derive(Clone)]
pub struct DomainLinker {
    store: SqliteGraphStore,
}

impl DomainLinker {
    pub fn new(store: SqliteGraphStore) -> Self {
        Self { store }
    }

    /// Link `source_node` in `source_domain` to `target_node` in `target_domain`.
    ///
    /// Fails with `UnknownDomain` if either domain is missing and with
    /// `UnknownNode` if the source node is not in the source domain.
    /// Linking an existing (source node, target domain, target node) tuple
    /// returns the stored reference unchanged.
    pub fn link(
        &self,
        source_domain: &DomainId,
        source_node: &NodeId,
        target_domain: &DomainId,
        target_node: &NodeId,
        description: &str,
        bidirectional: bool,
    ) -> Result<DomainReference> {
        self.store.transaction(self.store.default_timeout(), |tx| {
            tx.require_domain(source_domain)?;
            tx.require_domain(target_domain)?;
            match tx.get_node(source_node)? {
                Some(node) if &node.domain_id == source_domain => {}
                _ => return Err(Error::unknown_node(source_node.as_str())),
            }

            if let Some(existing) = tx.find_reference(source_node, target_domain, target_node)? {
                debug!(
                    source = %source_node,
                    target_domain = %target_domain,
                    target = %target_node,
                    "Reference already exists"
                );
                return Ok(existing);
            }

            let reference = DomainReference {
                source_node_id: source_node.clone(),
                source_domain_id: source_domain.clone(),
                target_domain_id: target_domain.clone(),
                target_node_id: target_node.clone(),
                description: description.to_string(),
                bidirectional,
            };
            tx.insert_reference(&reference)?;
            info!(
                source_domain = %source_domain,
                source = %source_node,
                target_domain = %target_domain,
                target = %target_node,
                bidirectional,
                "Linked domains"
            );
            Ok(reference)
        })
    }

    /// Remove a reference. Returns false if there was none.
    pub fn unlink(
        &self,
        source_node: &NodeId,
        target_domain: &DomainId,
        target_node: &NodeId,
    ) -> Result<bool> {
        self.store.transaction(self.store.default_timeout(), |tx| {
            tx.delete_reference(source_node, target_domain, target_node)
        })
    }

    /// References visible from a node: its outgoing references plus
    /// bidirectional ones that target it.
    pub fn references_for(
        &self,
        domain_id: &DomainId,
        node_id: &NodeId,
    ) -> Result<Vec<DomainReference>> {
        self.store.transaction(self.store.default_timeout(), |tx| {
            tx.require_domain(domain_id)?;
            tx.references_for(domain_id, node_id)
        })
    }

    /// The far endpoint of every reference visible from a node.
    pub fn linked_nodes(
        &self,
        domain_id: &DomainId,
        node_id: &NodeId,
    ) -> Result<Vec<(DomainId, NodeId)>> {
        let refs = self.references_for(domain_id, node_id)?;
        Ok(refs
            .into_iter()
            .map(|r| {
                if &r.source_domain_id == domain_id && &r.source_node_id == node_id {
                    (r.target_domain_id, r.target_node_id)
                } else {
                    (r.source_domain_id, r.source_node_id)
                }
            })
            .collect())
    }

    /// All references whose source lives in the domain.
    pub fn references_from_domain(&self, domain_id: &DomainId) -> Result<Vec<DomainReference>> {
        self.store.transaction(self.store.default_timeout(), |tx| {
            tx.require_domain(domain_id)?;
            tx.references_from_domain(domain_id)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ROOT_PATH;

    fn setup() -> (SqliteGraphStore, DomainLinker, DomainId, DomainId) {
        let store = SqliteGraphStore::in_memory().unwrap();
        let physics = DomainId::new("physics");
        let math = DomainId::new("math");
        store.create_domain(&physics, "Physics", "").unwrap();
        store.create_domain(&math, "Math", "").unwrap();
        store
            .upsert_node(&physics, &NodeId::new("p7"), "Energy is a conserved quantity", ROOT_PATH, None)
            .unwrap();
        store
            .upsert_node(&math, &NodeId::new("m3"), "Noether's theorem statement", ROOT_PATH, None)
            .unwrap();
        let linker = DomainLinker::new(store.clone());
        (store, linker, physics, math)
    }

    #[test]
    fn test_bidirectional_is_symmetric() {
        let (_store, linker, physics, math) = setup();
        let p7 = NodeId::new("p7");
        let m3 = NodeId::new("m3");

        linker
            .link(&physics, &p7, &math, &m3, "same derivation", true)
            .unwrap();

        let from_source = linker.references_for(&physics, &p7).unwrap();
        let from_target = linker.references_for(&math, &m3).unwrap();
        assert_eq!(from_source.len(), 1);
        assert_eq!(from_source, from_target);

        assert_eq!(
            linker.linked_nodes(&physics, &p7).unwrap(),
            vec![(math.clone(), m3.clone())]
        );
        assert_eq!(
            linker.linked_nodes(&math, &m3).unwrap(),
            vec![(physics.clone(), p7.clone())]
        );
    }

    #[test]
    fn test_one_way_reference_not_visible_from_target() {
        let (_store, linker, physics, math) = setup();
        let p7 = NodeId::new("p7");
        let m3 = NodeId::new("m3");

        linker.link(&physics, &p7, &math, &m3, "see", false).unwrap();

        assert_eq!(linker.references_for(&physics, &p7).unwrap().len(), 1);
        assert!(linker.references_for(&math, &m3).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_domain_rejected() {
        let (_store, linker, physics, _math) = setup();
        let err = linker
            .link(
                &physics,
                &NodeId::new("p7"),
                &DomainId::new("chemistry"),
                &NodeId::new("c1"),
                "",
                false,
            )
            .unwrap_err();
        assert!(matches!(err, Error::UnknownDomain { .. }));

        let err = linker
            .link(
                &DomainId::new("chemistry"),
                &NodeId::new("c1"),
                &physics,
                &NodeId::new("p7"),
                "",
                false,
            )
            .unwrap_err();
        assert!(matches!(err, Error::UnknownDomain { .. }));
    }

    #[test]
    fn test_source_node_must_live_in_source_domain() {
        let (_store, linker, physics, math) = setup();
        let err = linker
            .link(&physics, &NodeId::new("m3"), &math, &NodeId::new("x"), "", false)
            .unwrap_err();
        assert!(matches!(err, Error::UnknownNode { .. }));
    }

    #[test]
    fn test_target_node_may_not_exist_yet() {
        let (store, linker, physics, math) = setup();
        let reference = linker
            .link(&physics, &NodeId::new("p7"), &math, &NodeId::new("future"), "later", false)
            .unwrap();
        assert_eq!(reference.target_node_id, NodeId::new("future"));
        assert_eq!(store.stats(&physics).unwrap().reference_count, 1);
    }

    #[test]
    fn test_link_is_idempotent() {
        let (store, linker, physics, math) = setup();
        let p7 = NodeId::new("p7");
        let m3 = NodeId::new("m3");

        let first = linker.link(&physics, &p7, &math, &m3, "original", true).unwrap();
        let second = linker.link(&physics, &p7, &math, &m3, "changed", false).unwrap();

        assert_eq!(first, second);
        assert_eq!(second.description, "original");
        assert_eq!(store.stats(&physics).unwrap().reference_count, 1);
    }

    #[test]
    fn test_unlink() {
        let (_store, linker, physics, math) = setup();
        let p7 = NodeId::new("p7");
        let m3 = NodeId::new("m3");

        linker.link(&physics, &p7, &math, &m3, "", true).unwrap();
        assert!(linker.unlink(&p7, &math, &m3).unwrap());
        assert!(!linker.unlink(&p7, &math, &m3).unwrap());
        assert!(linker.references_for(&math, &m3).unwrap().is_empty());
        assert!(linker.references_from_domain(&physics).unwrap().is_empty());
    }
}
