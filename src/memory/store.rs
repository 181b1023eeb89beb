//! SQLite-backed graph store implementation.
//!
//! Every public operation runs inside one `IMMEDIATE` transaction. The
//! full-text projection is rewritten by [`GraphTx::sync_fts`] within that
//! same transaction, so a committed node is always searchable and a rolled
//! back write never leaves an index row behind.

use crate::error::{Error, Result};
use crate::memory::schema::{initialize_schema, is_initialized};
use crate::memory::search::FtsQuery;
use crate::memory::types::*;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

const NODE_COLUMNS: &str =
    "id, domain_id, content, created_at, path, content_summary, summary_timestamp";
const NODE_COLUMNS_N: &str = "n.id, n.domain_id, n.content, n.created_at, n.path, \
     n.content_summary, n.summary_timestamp";
const EDGE_COLUMNS: &str =
    "id, source_id, target_id, relationship_type, strength, created_at, domain_id";
const REFERENCE_COLUMNS: &str = "source_node_id, source_domain_id, target_domain_id, \
     target_node_id, description, bidirectional";

/// SQLite VM instructions between deadline checks.
const PROGRESS_OPS: i32 = 1_000;

/// Poll interval while waiting for the connection lock.
const LOCK_POLL: Duration = Duration::from_millis(1);

/// Configuration for opening a store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// How long SQLite waits on a file lock held by another connection.
    pub busy_timeout_ms: u64,
    /// Deadline for operations that do not take an explicit timeout.
    pub default_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
            default_timeout_ms: 30_000,
        }
    }
}

impl StoreConfig {
    pub fn with_default_timeout(mut self, timeout_ms: u64) -> Self {
        self.default_timeout_ms = timeout_ms;
        self
    }

    pub fn with_busy_timeout(mut self, busy_timeout_ms: u64) -> Self {
        self.busy_timeout_ms = busy_timeout_ms;
        self
    }
}

/// Point in time after which an operation is abandoned.
#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Deadline {
    fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
            budget,
        }
    }

    fn expired(&self) -> bool {
        Instant::now() >= self.at
    }

    fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    fn error(&self) -> Error {
        Error::timeout(self.budget.as_millis() as u64)
    }
}

/// SQLite-backed knowledge graph store.
///
/// Cloning is cheap; clones share one connection, which serializes writes
/// from concurrent builders.
#[derive(Clone)]
pub struct SqliteGraphStore {
    conn: Arc<Mutex<Connection>>,
    config: StoreConfig,
}

impl SqliteGraphStore {
    /// Open or create a graph store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(path, StoreConfig::default())
    }

    /// Open or create a graph store with explicit configuration.
    pub fn open_with_config(path: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .map_err(|e| Error::store_unavailable(e.to_string()))?;
        Self::from_connection(conn, config)
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| Error::store_unavailable(e.to_string()))?;
        Self::from_connection(conn, StoreConfig::default())
    }

    fn from_connection(conn: Connection, config: StoreConfig) -> Result<Self> {
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        if is_initialized(&conn) {
            conn.pragma_update(None, "foreign_keys", "ON")?;
        } else {
            initialize_schema(&conn)?;
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            config,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.config.default_timeout_ms)
    }

    fn lock(&self, deadline: &Deadline) -> Result<MutexGuard<'_, Connection>> {
        loop {
            match self.conn.try_lock() {
                Ok(guard) => return Ok(guard),
                Err(TryLockError::WouldBlock) => {
                    if deadline.expired() {
                        return Err(deadline.error());
                    }
                    thread::sleep(LOCK_POLL);
                }
                Err(TryLockError::Poisoned(e)) => {
                    return Err(Error::store_unavailable(format!(
                        "connection lock poisoned: {}",
                        e
                    )))
                }
            }
        }
    }

    /// Run `f` inside one atomic transaction bounded by `timeout`.
    ///
    /// If `f` fails or the deadline passes before commit, nothing `f` wrote
    /// becomes visible.
    pub fn transaction<T, F>(&self, timeout: Duration, f: F) -> Result<T>
    where
        F: FnOnce(&GraphTx<'_>) -> Result<T>,
    {
        let deadline = Deadline::after(timeout);
        let mut conn = self.lock(&deadline)?;

        conn.busy_timeout(deadline.remaining())?;
        let expiry = deadline.at;
        conn.progress_handler(PROGRESS_OPS, Some(move || Instant::now() >= expiry));

        let result = Self::run_transaction(&mut conn, &deadline, f);

        conn.progress_handler(0, None::<fn() -> bool>);
        let _ = conn.busy_timeout(Duration::from_millis(self.config.busy_timeout_ms));

        // A busy wait that ran out the deadline is a timeout, not an outage
        result.map_err(|e| match e {
            Error::Timeout { .. } => deadline.error(),
            Error::StoreUnavailable { .. } if deadline.expired() => deadline.error(),
            other => other,
        })
    }

    fn run_transaction<T, F>(conn: &mut Connection, deadline: &Deadline, f: F) -> Result<T>
    where
        F: FnOnce(&GraphTx<'_>) -> Result<T>,
    {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&GraphTx::new(&tx))?;
        if deadline.expired() {
            // Dropping the transaction rolls it back
            return Err(deadline.error());
        }
        tx.commit()?;
        Ok(value)
    }

    fn with_tx<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&GraphTx<'_>) -> Result<T>,
    {
        self.transaction(self.default_timeout(), f)
    }

    /// Cap the database at its current size plus `headroom` pages, so later
    /// writes fail with a full disk.
    #[cfg(test)]
    pub(crate) fn limit_growth(&self, headroom: u32) -> Result<()> {
        let conn = self.lock(&Deadline::after(self.default_timeout()))?;
        let pages: i64 = conn.query_row("PRAGMA page_count", [], |row| row.get(0))?;
        conn.pragma_update_and_check(
            None,
            "max_page_count",
            pages + i64::from(headroom),
            |row| row.get::<_, i64>(0),
        )?;
        Ok(())
    }

    // ==================== Domain Operations ====================

    /// Create a domain. Fails with `DuplicateId` if the id is taken.
    pub fn create_domain(
        &self,
        id: &DomainId,
        name: &str,
        description: &str,
    ) -> Result<Domain> {
        self.with_tx(|tx| tx.create_domain(id, name, description))
    }

    /// Get a domain by id, updating its last-access time.
    pub fn get_domain(&self, id: &DomainId) -> Result<Option<Domain>> {
        self.with_tx(|tx| {
            if tx.get_domain(id)?.is_none() {
                return Ok(None);
            }
            tx.require_domain(id).map(Some)
        })
    }

    /// List all domains ordered by id.
    pub fn list_domains(&self) -> Result<Vec<Domain>> {
        self.with_tx(|tx| tx.list_domains())
    }

    /// Delete a domain and everything it owns.
    pub fn delete_domain(&self, id: &DomainId) -> Result<DomainStats> {
        self.with_tx(|tx| tx.delete_domain(id))
    }

    /// The persisted default domain for callers without an explicit one.
    pub fn current_domain(&self) -> Result<DomainId> {
        self.with_tx(|tx| tx.current_domain())
    }

    /// Change the persisted default domain.
    pub fn set_current_domain(&self, id: &DomainId) -> Result<()> {
        self.with_tx(|tx| tx.set_current_domain(id))
    }

    // ==================== Node Operations ====================

    /// Create a node, or update summary/path of an existing one.
    pub fn upsert_node(
        &self,
        domain_id: &DomainId,
        node_id: &NodeId,
        content: &str,
        path: &str,
        summary: Option<&str>,
    ) -> Result<MemoryNode> {
        let mut upsert = NodeUpsert::new(node_id.clone(), content).with_path(path);
        if let Some(summary) = summary {
            upsert = upsert.with_summary(summary);
        }
        self.with_tx(|tx| tx.upsert_node(domain_id, &upsert))
    }

    /// Replace a node's content (correction workflow).
    pub fn overwrite_node_content(&self, node_id: &NodeId, content: &str) -> Result<MemoryNode> {
        self.with_tx(|tx| tx.overwrite_node_content(node_id, content))
    }

    /// Get a node by id.
    pub fn get_node(&self, node_id: &NodeId) -> Result<Option<MemoryNode>> {
        self.with_tx(|tx| tx.get_node(node_id))
    }

    /// List the nodes of a domain ordered by id.
    pub fn list_nodes(&self, domain_id: &DomainId) -> Result<Vec<MemoryNode>> {
        self.with_tx(|tx| tx.list_nodes(domain_id))
    }

    /// Delete a node with its tags, edges, outgoing references and index row.
    pub fn delete_node(&self, node_id: &NodeId) -> Result<bool> {
        self.with_tx(|tx| tx.delete_node(node_id))
    }

    /// Attach tags; already-present tags are ignored.
    pub fn attach_tags<I, S>(&self, node_id: &NodeId, tags: I) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tags: Vec<String> = tags.into_iter().map(|t| t.as_ref().to_string()).collect();
        self.with_tx(|tx| tx.attach_tags(node_id, &tags))
    }

    /// Detach tags; absent tags are ignored.
    pub fn detach_tags<I, S>(&self, node_id: &NodeId, tags: I) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tags: Vec<String> = tags.into_iter().map(|t| t.as_ref().to_string()).collect();
        self.with_tx(|tx| tx.detach_tags(node_id, &tags))
    }

    /// Tags of a node, sorted.
    pub fn node_tags(&self, node_id: &NodeId) -> Result<Vec<String>> {
        self.with_tx(|tx| tx.node_tags(node_id))
    }

    // ==================== Edge Operations ====================

    /// Create an edge between two nodes of `domain_id`.
    pub fn create_edge(
        &self,
        source: &NodeId,
        target: &NodeId,
        relationship_type: &str,
        strength: f64,
        domain_id: &DomainId,
    ) -> Result<MemoryEdge> {
        self.with_tx(|tx| tx.create_edge(source, target, relationship_type, strength, domain_id))
    }

    /// Replace any edge with the same (source, target, type) by a new one.
    pub fn replace_edge(
        &self,
        source: &NodeId,
        target: &NodeId,
        relationship_type: &str,
        strength: f64,
        domain_id: &DomainId,
    ) -> Result<MemoryEdge> {
        self.with_tx(|tx| tx.replace_edge(source, target, relationship_type, strength, domain_id))
    }

    /// Delete an edge by id.
    pub fn delete_edge(&self, edge_id: &EdgeId) -> Result<bool> {
        self.with_tx(|tx| tx.delete_edge(edge_id))
    }

    /// Edges where the node is source or target.
    pub fn edges_for_node(&self, node_id: &NodeId) -> Result<Vec<MemoryEdge>> {
        self.with_tx(|tx| tx.edges_for_node(node_id))
    }

    // ==================== Queries ====================

    /// Full-text search within a domain using the default timeout.
    pub fn search(&self, domain_id: &DomainId, query: &str) -> Result<Vec<MemoryNode>> {
        self.search_with_timeout(domain_id, query, None, self.default_timeout())
    }

    /// Full-text search with an explicit result limit and deadline.
    pub fn search_with_timeout(
        &self,
        domain_id: &DomainId,
        query: &str,
        limit: Option<usize>,
        timeout: Duration,
    ) -> Result<Vec<MemoryNode>> {
        self.transaction(timeout, |tx| tx.search(domain_id, query, limit))
    }

    /// Breadth-first neighborhood of a node.
    pub fn neighborhood(
        &self,
        node_id: &NodeId,
        depth: usize,
        min_strength: Option<f64>,
    ) -> Result<Neighborhood> {
        self.with_tx(|tx| tx.neighborhood(node_id, depth, min_strength))
    }

    /// Row counts for a domain.
    pub fn stats(&self, domain_id: &DomainId) -> Result<DomainStats> {
        self.with_tx(|tx| tx.stats(domain_id))
    }
}

/// Graph operations on one open transaction.
pub struct GraphTx<'a> {
    conn: &'a Connection,
    now: DateTime<Utc>,
}

impl<'a> GraphTx<'a> {
    fn new(conn: &'a Connection) -> Self {
        Self {
            conn,
            now: Utc::now(),
        }
    }

    /// Timestamp applied to every row written by this transaction.
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    // ==================== Domains ====================

    pub fn create_domain(&self, id: &DomainId, name: &str, description: &str) -> Result<Domain> {
        if self.get_domain(id)?.is_some() {
            return Err(Error::duplicate_id(id.as_str()));
        }
        let domain = Domain {
            id: id.clone(),
            name: name.to_string(),
            description: description.to_string(),
            created_at: self.now,
            last_access: self.now,
        };
        self.insert_domain(&domain)?;
        info!(domain = %id, "Created domain");
        Ok(domain)
    }

    /// Insert a domain row verbatim (used by import).
    pub fn insert_domain(&self, domain: &Domain) -> Result<()> {
        if self.get_domain(&domain.id)?.is_some() {
            return Err(Error::duplicate_id(domain.id.as_str()));
        }
        self.conn.execute(
            "INSERT INTO domains (id, name, description, created_at, last_access)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                domain.id.as_str(),
                domain.name,
                domain.description,
                domain.created_at.to_rfc3339(),
                domain.last_access.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Insert a domain verbatim, or take over an existing domain that is
    /// still empty (the default domain of a fresh store).
    pub fn restore_domain(&self, domain: &Domain) -> Result<()> {
        if self.get_domain(&domain.id)?.is_none() {
            return self.insert_domain(domain);
        }
        if self.count_rows(&domain.id)? != DomainStats::default() {
            return Err(Error::duplicate_id(domain.id.as_str()));
        }
        self.conn.execute(
            "UPDATE domains SET name = ?2, description = ?3, created_at = ?4, last_access = ?5
             WHERE id = ?1",
            params![
                domain.id.as_str(),
                domain.name,
                domain.description,
                domain.created_at.to_rfc3339(),
                domain.last_access.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_domain(&self, id: &DomainId) -> Result<Option<Domain>> {
        let domain = self
            .conn
            .query_row(
                "SELECT id, name, description, created_at, last_access FROM domains WHERE id = ?1",
                params![id.as_str()],
                row_to_domain,
            )
            .optional()?;
        Ok(domain)
    }

    /// Record an access to a domain. Returns false if it does not exist.
    pub fn touch_domain(&self, id: &DomainId) -> Result<bool> {
        let touched = self.conn.execute(
            "UPDATE domains SET last_access = ?2 WHERE id = ?1",
            params![id.as_str(), self.now.to_rfc3339()],
        )?;
        Ok(touched > 0)
    }

    /// Validate that a domain exists and record the access.
    pub fn require_domain(&self, id: &DomainId) -> Result<Domain> {
        if !self.touch_domain(id)? {
            return Err(Error::unknown_domain(id.as_str()));
        }
        self.get_domain(id)?
            .ok_or_else(|| Error::unknown_domain(id.as_str()))
    }

    pub fn list_domains(&self) -> Result<Vec<Domain>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, description, created_at, last_access FROM domains ORDER BY id",
        )?;
        let domains = stmt
            .query_map([], row_to_domain)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(domains)
    }

    pub fn current_domain(&self) -> Result<DomainId> {
        let id: String = self.conn.query_row(
            "SELECT domain_id FROM current_domain WHERE id = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(DomainId::new(id))
    }

    pub fn set_current_domain(&self, id: &DomainId) -> Result<()> {
        self.require_domain(id)?;
        self.conn.execute(
            "INSERT INTO current_domain (id, domain_id) VALUES (1, ?1)
             ON CONFLICT(id) DO UPDATE SET domain_id = excluded.domain_id",
            params![id.as_str()],
        )?;
        debug!(domain = %id, "Switched current domain");
        Ok(())
    }

    fn ensure_default_domain(&self) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO domains (id, name, description, created_at, last_access)
             VALUES (?1, ?1, 'Default domain', ?2, ?2)",
            params![DEFAULT_DOMAIN_ID, self.now.to_rfc3339()],
        )?;
        Ok(())
    }

    /// Delete a domain with all nodes, edges, tags, references and index rows.
    ///
    /// Returns the counts that were removed. If the domain was the current
    /// one, the pointer falls back to the default domain.
    pub fn delete_domain(&self, id: &DomainId) -> Result<DomainStats> {
        if self.get_domain(id)?.is_none() {
            return Err(Error::unknown_domain(id.as_str()));
        }
        let removed = self.count_rows(id)?;
        let was_current = &self.current_domain()? == id;
        let keep_row = was_current && id.as_str() == DEFAULT_DOMAIN_ID;

        if was_current && !keep_row {
            self.ensure_default_domain()?;
            self.conn.execute(
                "UPDATE current_domain SET domain_id = ?1 WHERE id = 1",
                params![DEFAULT_DOMAIN_ID],
            )?;
        }

        let domain = id.as_str();
        self.conn
            .execute("DELETE FROM memory_fts WHERE domain_id = ?1", params![domain])?;
        self.conn.execute(
            "DELETE FROM domain_references
             WHERE source_domain_id = ?1
                OR target_domain_id = ?1
                OR source_node_id IN (SELECT id FROM memory_nodes WHERE domain_id = ?1)",
            params![domain],
        )?;
        self.conn.execute(
            "DELETE FROM memory_edges
             WHERE domain_id = ?1
                OR source_id IN (SELECT id FROM memory_nodes WHERE domain_id = ?1)
                OR target_id IN (SELECT id FROM memory_nodes WHERE domain_id = ?1)",
            params![domain],
        )?;
        self.conn.execute(
            "DELETE FROM memory_tags
             WHERE node_id IN (SELECT id FROM memory_nodes WHERE domain_id = ?1)",
            params![domain],
        )?;
        self.conn
            .execute("DELETE FROM memory_nodes WHERE domain_id = ?1", params![domain])?;

        if keep_row {
            // The default domain is emptied and restarted in place
            self.conn.execute(
                "UPDATE domains SET created_at = ?2, last_access = ?2 WHERE id = ?1",
                params![domain, self.now.to_rfc3339()],
            )?;
        } else {
            self.conn
                .execute("DELETE FROM domains WHERE id = ?1", params![domain])?;
        }

        info!(
            domain = %id,
            nodes = removed.node_count,
            edges = removed.edge_count,
            "Deleted domain"
        );
        Ok(removed)
    }

    // ==================== Nodes ====================

    /// Create a node if absent; otherwise update its summary and path.
    ///
    /// Content is immutable here: differing content on an existing node is
    /// ignored. Use [`GraphTx::overwrite_node_content`] for corrections.
    pub fn upsert_node(&self, domain_id: &DomainId, upsert: &NodeUpsert) -> Result<MemoryNode> {
        self.require_domain(domain_id)?;

        let Some(existing) = self.get_node(&upsert.id)? else {
            let node = MemoryNode {
                id: upsert.id.clone(),
                domain_id: domain_id.clone(),
                content: upsert.content.clone(),
                created_at: upsert.created_at,
                path: upsert.path.clone(),
                content_summary: upsert.summary.clone(),
                summary_timestamp: upsert.summary.as_ref().map(|_| self.now),
            };
            self.insert_node_row(&node)?;
            self.sync_fts(&node.id)?;
            debug!(node = %node.id, domain = %domain_id, "Created node");
            return Ok(node);
        };

        if &existing.domain_id != domain_id {
            return Err(Error::duplicate_id(upsert.id.as_str()));
        }
        if existing.content != upsert.content {
            debug!(node = %existing.id, "Keeping original content of existing node");
        }

        let summary_changed = upsert
            .summary
            .as_ref()
            .is_some_and(|s| existing.content_summary.as_ref() != Some(s));
        let path_changed = existing.path != upsert.path;
        if !summary_changed && !path_changed {
            return Ok(existing);
        }

        let mut node = existing;
        if summary_changed {
            node.content_summary = upsert.summary.clone();
            node.summary_timestamp = Some(self.now);
        }
        node.path = upsert.path.clone();
        self.conn.execute(
            "UPDATE memory_nodes SET path = ?2, content_summary = ?3, summary_timestamp = ?4
             WHERE id = ?1",
            params![
                node.id.as_str(),
                node.path,
                node.content_summary,
                node.summary_timestamp.map(|t| t.to_rfc3339()),
            ],
        )?;
        self.sync_fts(&node.id)?;
        debug!(node = %node.id, "Updated node");
        Ok(node)
    }

    /// Insert a node row verbatim (used by import).
    pub fn insert_node(&self, node: &MemoryNode) -> Result<()> {
        self.require_domain(&node.domain_id)?;
        if self.get_node(&node.id)?.is_some() {
            return Err(Error::duplicate_id(node.id.as_str()));
        }
        self.insert_node_row(node)?;
        self.sync_fts(&node.id)
    }

    fn insert_node_row(&self, node: &MemoryNode) -> Result<()> {
        self.conn.execute(
            "INSERT INTO memory_nodes
                 (id, domain_id, content, created_at, path, content_summary, summary_timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                node.id.as_str(),
                node.domain_id.as_str(),
                node.content,
                node.created_at.to_rfc3339(),
                node.path,
                node.content_summary,
                node.summary_timestamp.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    pub fn overwrite_node_content(&self, node_id: &NodeId, content: &str) -> Result<MemoryNode> {
        let mut node = self.require_node(node_id)?;
        self.require_domain(&node.domain_id)?;
        self.conn.execute(
            "UPDATE memory_nodes SET content = ?2 WHERE id = ?1",
            params![node_id.as_str(), content],
        )?;
        self.sync_fts(node_id)?;
        node.content = content.to_string();
        debug!(node = %node_id, "Overwrote node content");
        Ok(node)
    }

    pub fn get_node(&self, node_id: &NodeId) -> Result<Option<MemoryNode>> {
        let node = self
            .conn
            .query_row(
                &format!("SELECT {} FROM memory_nodes WHERE id = ?1", NODE_COLUMNS),
                params![node_id.as_str()],
                row_to_node,
            )
            .optional()?;
        Ok(node)
    }

    pub fn require_node(&self, node_id: &NodeId) -> Result<MemoryNode> {
        self.get_node(node_id)?
            .ok_or_else(|| Error::unknown_node(node_id.as_str()))
    }

    fn require_node_in(&self, node_id: &NodeId, domain_id: &DomainId) -> Result<MemoryNode> {
        let node = self.require_node(node_id)?;
        if &node.domain_id != domain_id {
            return Err(Error::unknown_node(node_id.as_str()));
        }
        Ok(node)
    }

    pub fn list_nodes(&self, domain_id: &DomainId) -> Result<Vec<MemoryNode>> {
        self.require_domain(domain_id)?;
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM memory_nodes WHERE domain_id = ?1 ORDER BY id",
            NODE_COLUMNS
        ))?;
        let nodes = stmt
            .query_map(params![domain_id.as_str()], row_to_node)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(nodes)
    }

    pub fn delete_node(&self, node_id: &NodeId) -> Result<bool> {
        let Some(node) = self.get_node(node_id)? else {
            return Ok(false);
        };
        self.require_domain(&node.domain_id)?;

        let id = node_id.as_str();
        self.conn
            .execute("DELETE FROM memory_fts WHERE node_id = ?1", params![id])?;
        self.conn.execute(
            "DELETE FROM memory_edges WHERE source_id = ?1 OR target_id = ?1",
            params![id],
        )?;
        self.conn
            .execute("DELETE FROM memory_tags WHERE node_id = ?1", params![id])?;
        self.conn.execute(
            "DELETE FROM domain_references WHERE source_node_id = ?1",
            params![id],
        )?;
        self.conn
            .execute("DELETE FROM memory_nodes WHERE id = ?1", params![id])?;
        debug!(node = %node_id, "Deleted node");
        Ok(true)
    }

    // ==================== Tags ====================

    /// Attach tags to a node, returning how many were new.
    pub fn attach_tags(&self, node_id: &NodeId, tags: &[String]) -> Result<usize> {
        let node = self.require_node(node_id)?;
        self.require_domain(&node.domain_id)?;

        let mut added = 0;
        for tag in tags.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
            added += self.conn.execute(
                "INSERT OR IGNORE INTO memory_tags (node_id, tag) VALUES (?1, ?2)",
                params![node_id.as_str(), tag],
            )?;
        }
        if added > 0 {
            self.sync_fts(node_id)?;
        }
        Ok(added)
    }

    /// Detach tags from a node, returning how many were removed.
    pub fn detach_tags(&self, node_id: &NodeId, tags: &[String]) -> Result<usize> {
        let node = self.require_node(node_id)?;
        self.require_domain(&node.domain_id)?;

        let mut removed = 0;
        for tag in tags.iter().map(|t| t.trim()) {
            removed += self.conn.execute(
                "DELETE FROM memory_tags WHERE node_id = ?1 AND tag = ?2",
                params![node_id.as_str(), tag],
            )?;
        }
        if removed > 0 {
            self.sync_fts(node_id)?;
        }
        Ok(removed)
    }

    pub fn node_tags(&self, node_id: &NodeId) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT tag FROM memory_tags WHERE node_id = ?1 ORDER BY tag")?;
        let tags = stmt
            .query_map(params![node_id.as_str()], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(tags)
    }

    /// Rewrite the full-text row of a node from its primary rows.
    pub fn sync_fts(&self, node_id: &NodeId) -> Result<()> {
        self.conn.execute(
            "DELETE FROM memory_fts WHERE node_id = ?1",
            params![node_id.as_str()],
        )?;
        let Some(node) = self.get_node(node_id)? else {
            return Ok(());
        };
        let tags = self.node_tags(node_id)?.join(" ");
        self.conn.execute(
            "INSERT INTO memory_fts (node_id, domain_id, content, summary, path, tags)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                node.id.as_str(),
                node.domain_id.as_str(),
                node.content,
                node.content_summary.unwrap_or_default(),
                node.path,
                tags,
            ],
        )?;
        Ok(())
    }

    // ==================== Edges ====================

    /// Create an edge. Both endpoints must exist in `domain_id`.
    pub fn create_edge(
        &self,
        source: &NodeId,
        target: &NodeId,
        relationship_type: &str,
        strength: f64,
        domain_id: &DomainId,
    ) -> Result<MemoryEdge> {
        let edge = MemoryEdge {
            id: EdgeId::new(),
            source_id: source.clone(),
            target_id: target.clone(),
            relationship_type: relationship_type.to_string(),
            strength,
            created_at: self.now,
            domain_id: domain_id.clone(),
        };
        self.insert_edge(&edge)?;
        Ok(edge)
    }

    /// Insert an edge row verbatim after validation (used by import).
    pub fn insert_edge(&self, edge: &MemoryEdge) -> Result<()> {
        if !(0.0..=1.0).contains(&edge.strength) {
            return Err(Error::InvalidStrength {
                strength: edge.strength,
            });
        }
        self.require_domain(&edge.domain_id)?;
        self.require_node_in(&edge.source_id, &edge.domain_id)?;
        self.require_node_in(&edge.target_id, &edge.domain_id)?;

        if self
            .find_edge(
                &edge.source_id,
                &edge.target_id,
                &edge.relationship_type,
                &edge.domain_id,
            )?
            .is_some()
        {
            return Err(Error::duplicate_edge(
                edge.source_id.as_str(),
                edge.target_id.as_str(),
                &edge.relationship_type,
            ));
        }
        if self.get_edge(&edge.id)?.is_some() {
            return Err(Error::duplicate_id(edge.id.as_str()));
        }

        self.conn.execute(
            "INSERT INTO memory_edges
                 (id, source_id, target_id, relationship_type, strength, created_at, domain_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                edge.id.as_str(),
                edge.source_id.as_str(),
                edge.target_id.as_str(),
                edge.relationship_type,
                edge.strength,
                edge.created_at.to_rfc3339(),
                edge.domain_id.as_str(),
            ],
        )?;
        debug!(
            source = %edge.source_id,
            target = %edge.target_id,
            relationship = %edge.relationship_type,
            strength = edge.strength,
            "Created edge"
        );
        Ok(())
    }

    /// Delete the (source, target, type) edge if present and create a new one.
    pub fn replace_edge(
        &self,
        source: &NodeId,
        target: &NodeId,
        relationship_type: &str,
        strength: f64,
        domain_id: &DomainId,
    ) -> Result<MemoryEdge> {
        if !(0.0..=1.0).contains(&strength) {
            return Err(Error::InvalidStrength { strength });
        }
        if let Some(existing) = self.find_edge(source, target, relationship_type, domain_id)? {
            self.delete_edge(&existing.id)?;
        }
        self.create_edge(source, target, relationship_type, strength, domain_id)
    }

    pub fn find_edge(
        &self,
        source: &NodeId,
        target: &NodeId,
        relationship_type: &str,
        domain_id: &DomainId,
    ) -> Result<Option<MemoryEdge>> {
        let edge = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM memory_edges
                     WHERE domain_id = ?1 AND source_id = ?2 AND target_id = ?3
                       AND relationship_type = ?4",
                    EDGE_COLUMNS
                ),
                params![
                    domain_id.as_str(),
                    source.as_str(),
                    target.as_str(),
                    relationship_type
                ],
                row_to_edge,
            )
            .optional()?;
        Ok(edge)
    }

    pub fn get_edge(&self, edge_id: &EdgeId) -> Result<Option<MemoryEdge>> {
        let edge = self
            .conn
            .query_row(
                &format!("SELECT {} FROM memory_edges WHERE id = ?1", EDGE_COLUMNS),
                params![edge_id.as_str()],
                row_to_edge,
            )
            .optional()?;
        Ok(edge)
    }

    pub fn delete_edge(&self, edge_id: &EdgeId) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM memory_edges WHERE id = ?1",
            params![edge_id.as_str()],
        )?;
        Ok(rows > 0)
    }

    pub fn edges_for_node(&self, node_id: &NodeId) -> Result<Vec<MemoryEdge>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM memory_edges
             WHERE source_id = ?1 OR target_id = ?1
             ORDER BY source_id, target_id, relationship_type",
            EDGE_COLUMNS
        ))?;
        let edges = stmt
            .query_map(params![node_id.as_str()], row_to_edge)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(edges)
    }

    pub fn list_edges(&self, domain_id: &DomainId) -> Result<Vec<MemoryEdge>> {
        self.require_domain(domain_id)?;
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM memory_edges WHERE domain_id = ?1
             ORDER BY source_id, target_id, relationship_type",
            EDGE_COLUMNS
        ))?;
        let edges = stmt
            .query_map(params![domain_id.as_str()], row_to_edge)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(edges)
    }

    // ==================== Domain References ====================

    pub fn find_reference(
        &self,
        source_node_id: &NodeId,
        target_domain_id: &DomainId,
        target_node_id: &NodeId,
    ) -> Result<Option<DomainReference>> {
        let reference = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM domain_references
                     WHERE source_node_id = ?1 AND target_domain_id = ?2 AND target_node_id = ?3",
                    REFERENCE_COLUMNS
                ),
                params![
                    source_node_id.as_str(),
                    target_domain_id.as_str(),
                    target_node_id.as_str()
                ],
                row_to_reference,
            )
            .optional()?;
        Ok(reference)
    }

    /// Insert a reference row. The caller validates domains and the source node.
    pub fn insert_reference(&self, reference: &DomainReference) -> Result<()> {
        self.conn.execute(
            "INSERT INTO domain_references
                 (source_node_id, source_domain_id, target_domain_id, target_node_id,
                  description, bidirectional, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                reference.source_node_id.as_str(),
                reference.source_domain_id.as_str(),
                reference.target_domain_id.as_str(),
                reference.target_node_id.as_str(),
                reference.description,
                reference.bidirectional,
                self.now.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn delete_reference(
        &self,
        source_node_id: &NodeId,
        target_domain_id: &DomainId,
        target_node_id: &NodeId,
    ) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM domain_references
             WHERE source_node_id = ?1 AND target_domain_id = ?2 AND target_node_id = ?3",
            params![
                source_node_id.as_str(),
                target_domain_id.as_str(),
                target_node_id.as_str()
            ],
        )?;
        Ok(rows > 0)
    }

    /// References visible from a node: outgoing ones plus bidirectional
    /// ones that name it as target.
    pub fn references_for(
        &self,
        domain_id: &DomainId,
        node_id: &NodeId,
    ) -> Result<Vec<DomainReference>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM domain_references
             WHERE (source_domain_id = ?1 AND source_node_id = ?2)
                OR (bidirectional = 1 AND target_domain_id = ?1 AND target_node_id = ?2)
             ORDER BY source_domain_id, source_node_id, target_domain_id, target_node_id",
            REFERENCE_COLUMNS
        ))?;
        let refs = stmt
            .query_map(params![domain_id.as_str(), node_id.as_str()], row_to_reference)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(refs)
    }

    /// References whose source lives in the domain.
    pub fn references_from_domain(&self, domain_id: &DomainId) -> Result<Vec<DomainReference>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM domain_references WHERE source_domain_id = ?1
             ORDER BY source_node_id, target_domain_id, target_node_id",
            REFERENCE_COLUMNS
        ))?;
        let refs = stmt
            .query_map(params![domain_id.as_str()], row_to_reference)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(refs)
    }

    // ==================== Queries ====================

    /// Full-text search over content, summary, path and tags within a domain.
    pub fn search(
        &self,
        domain_id: &DomainId,
        query: &str,
        limit: Option<usize>,
    ) -> Result<Vec<MemoryNode>> {
        self.require_domain(domain_id)?;
        let limit = limit.map(|l| l as i64).unwrap_or(-1);

        let sql = match FtsQuery::prepare(query) {
            FtsQuery::Empty => return Ok(Vec::new()),
            FtsQuery::Phrase(phrase) => (
                format!(
                    "SELECT {} FROM memory_fts
                     JOIN memory_nodes n ON n.id = memory_fts.node_id
                     WHERE memory_fts MATCH ?1 AND memory_fts.domain_id = ?2
                     ORDER BY rank, n.id
                     LIMIT ?3",
                    NODE_COLUMNS_N
                ),
                phrase,
            ),
            FtsQuery::Like(pattern) => (
                format!(
                    "SELECT {} FROM memory_fts
                     JOIN memory_nodes n ON n.id = memory_fts.node_id
                     WHERE memory_fts.domain_id = ?2
                       AND (memory_fts.content LIKE ?1 ESCAPE '\\'
                            OR memory_fts.summary LIKE ?1 ESCAPE '\\'
                            OR memory_fts.path LIKE ?1 ESCAPE '\\'
                            OR memory_fts.tags LIKE ?1 ESCAPE '\\')
                     ORDER BY n.created_at, n.id
                     LIMIT ?3",
                    NODE_COLUMNS_N
                ),
                pattern,
            ),
        };

        let mut stmt = self.conn.prepare(&sql.0)?;
        let nodes = stmt
            .query_map(params![sql.1, domain_id.as_str(), limit], row_to_node)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        debug!(domain = %domain_id, query, hits = nodes.len(), "Searched domain");
        Ok(nodes)
    }

    /// Nodes and edges reachable from `origin` within `depth` hops,
    /// following edges in either direction inside the origin's domain.
    pub fn neighborhood(
        &self,
        origin: &NodeId,
        depth: usize,
        min_strength: Option<f64>,
    ) -> Result<Neighborhood> {
        let start = self.require_node(origin)?;
        self.require_domain(&start.domain_id)?;
        let min_strength = min_strength.unwrap_or(0.0);

        let mut distance: BTreeMap<NodeId, usize> = BTreeMap::new();
        let mut edges: BTreeMap<EdgeId, MemoryEdge> = BTreeMap::new();
        let mut queue = VecDeque::from([(start.id.clone(), 0usize)]);
        distance.insert(start.id.clone(), 0);

        while let Some((current, hops)) = queue.pop_front() {
            if hops >= depth {
                continue;
            }
            for edge in self.edges_for_node(&current)? {
                if edge.domain_id != start.domain_id || edge.strength < min_strength {
                    continue;
                }
                let next = if edge.source_id == current {
                    edge.target_id.clone()
                } else {
                    edge.source_id.clone()
                };
                edges.insert(edge.id.clone(), edge);
                if !distance.contains_key(&next) {
                    distance.insert(next.clone(), hops + 1);
                    queue.push_back((next, hops + 1));
                }
            }
        }

        let mut ordered: Vec<(usize, NodeId)> =
            distance.into_iter().map(|(id, d)| (d, id)).collect();
        ordered.sort();
        let mut nodes = Vec::with_capacity(ordered.len());
        for (_, id) in &ordered {
            if let Some(node) = self.get_node(id)? {
                nodes.push(node);
            }
        }

        let reached: HashSet<&NodeId> = nodes.iter().map(|n| &n.id).collect();
        let mut edges: Vec<MemoryEdge> = edges
            .into_values()
            .filter(|e| reached.contains(&e.source_id) && reached.contains(&e.target_id))
            .collect();
        edges.sort_by(|a, b| {
            (&a.source_id, &a.target_id, &a.relationship_type).cmp(&(
                &b.source_id,
                &b.target_id,
                &b.relationship_type,
            ))
        });

        Ok(Neighborhood {
            origin: Some(start.id),
            nodes,
            edges,
        })
    }

    /// Row counts for a domain.
    pub fn stats(&self, domain_id: &DomainId) -> Result<DomainStats> {
        self.require_domain(domain_id)?;
        self.count_rows(domain_id)
    }

    fn count_rows(&self, domain_id: &DomainId) -> Result<DomainStats> {
        let count = |sql: &str| -> Result<u64> {
            let n: i64 = self
                .conn
                .query_row(sql, params![domain_id.as_str()], |row| row.get(0))?;
            Ok(n as u64)
        };

        Ok(DomainStats {
            node_count: count("SELECT COUNT(*) FROM memory_nodes WHERE domain_id = ?1")?,
            edge_count: count("SELECT COUNT(*) FROM memory_edges WHERE domain_id = ?1")?,
            tag_count: count(
                "SELECT COUNT(*) FROM memory_tags
                 WHERE node_id IN (SELECT id FROM memory_nodes WHERE domain_id = ?1)",
            )?,
            reference_count: count(
                "SELECT COUNT(*) FROM domain_references WHERE source_domain_id = ?1",
            )?,
        })
    }

    /// Distinct tags used in a domain.
    pub fn domain_tags(&self, domain_id: &DomainId) -> Result<BTreeSet<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT t.tag FROM memory_tags t
             JOIN memory_nodes n ON n.id = t.node_id
             WHERE n.domain_id = ?1",
        )?;
        let tags = stmt
            .query_map(params![domain_id.as_str()], |row| row.get(0))?
            .collect::<rusqlite::Result<BTreeSet<String>>>()?;
        Ok(tags)
    }
}

fn parse_datetime(idx: usize, s: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn parse_optional_datetime(idx: usize, s: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    s.map(|s| parse_datetime(idx, s)).transpose()
}

fn row_to_domain(row: &Row<'_>) -> rusqlite::Result<Domain> {
    Ok(Domain {
        id: DomainId::new(row.get::<_, String>(0)?),
        name: row.get(1)?,
        description: row.get(2)?,
        created_at: parse_datetime(3, row.get(3)?)?,
        last_access: parse_datetime(4, row.get(4)?)?,
    })
}

fn row_to_node(row: &Row<'_>) -> rusqlite::Result<MemoryNode> {
    Ok(MemoryNode {
        id: NodeId::new(row.get::<_, String>(0)?),
        domain_id: DomainId::new(row.get::<_, String>(1)?),
        content: row.get(2)?,
        created_at: parse_datetime(3, row.get(3)?)?,
        path: row.get(4)?,
        content_summary: row.get(5)?,
        summary_timestamp: parse_optional_datetime(6, row.get(6)?)?,
    })
}

fn row_to_edge(row: &Row<'_>) -> rusqlite::Result<MemoryEdge> {
    Ok(MemoryEdge {
        id: EdgeId::parse(&row.get::<_, String>(0)?),
        source_id: NodeId::new(row.get::<_, String>(1)?),
        target_id: NodeId::new(row.get::<_, String>(2)?),
        relationship_type: row.get(3)?,
        strength: row.get(4)?,
        created_at: parse_datetime(5, row.get(5)?)?,
        domain_id: DomainId::new(row.get::<_, String>(6)?),
    })
}

fn row_to_reference(row: &Row<'_>) -> rusqlite::Result<DomainReference> {
    Ok(DomainReference {
        source_node_id: NodeId::new(row.get::<_, String>(0)?),
        source_domain_id: DomainId::new(row.get::<_, String>(1)?),
        target_domain_id: DomainId::new(row.get::<_, String>(2)?),
        target_node_id: NodeId::new(row.get::<_, String>(3)?),
        description: row.get(4)?,
        bidirectional: row.get(5)?,
    })
}
