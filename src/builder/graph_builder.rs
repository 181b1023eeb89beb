//! Document-to-graph orchestration.

use std::collections::BTreeSet;
use std::thread;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, instrument, warn};

use super::config::BuilderConfig;
use super::state::{AbortReason, BuildReport, BuildState, BuildStatus, CancellationToken};
use super::state::{PageOutcome, PageStatus};
use super::window::{CandidateWindow, WindowEntry};
use crate::error::{Error, Result};
use crate::ingest::PageRecord;
use crate::memory::{DomainId, GraphTx, MemoryNode, NodeId, NodeUpsert, SqliteGraphStore};
use crate::scoring::{RelationshipScorer, ScoredRelation, ScoringCandidate};

/// Organizational path of a page node.
pub fn page_path(document: &str, page_number: u32) -> String {
    format!("/{}/page-{:04}", document.trim_matches('/'), page_number)
}

/// Trim and lower-case a tag and apply the prefix. Blank tags yield `None`.
///
/// The prefix is lower-cased as well, so `PDF:intro` under prefix `PDF:`
/// becomes `pdf:intro`.
pub fn normalize_tag(prefix: &str, tag: &str) -> Option<String> {
    let prefix = prefix.to_lowercase();
    let tag = tag.trim().to_lowercase();
    if tag.is_empty() {
        None
    } else if tag.starts_with(&prefix) {
        Some(tag)
    } else {
        Some(format!("{}{}", prefix, tag))
    }
}

/// What one page commit wrote.
struct PageCommit {
    node: MemoryNode,
    edges_created: usize,
    edges_existing: usize,
    tags_added: usize,
}

/// Builds one domain's graph from an ordered stream of page records.
///
/// Each page is committed in its own transaction: node, tags and every
/// admitted edge become visible together or not at all.
pub struct GraphBuilder {
    store: SqliteGraphStore,
    config: BuilderConfig,
    domain_id: DomainId,
    scorer: RelationshipScorer,
    window: CandidateWindow,
    state: BuildState,
    cancel: CancellationToken,
}

impl GraphBuilder {
    pub fn new(store: SqliteGraphStore, config: BuilderConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            domain_id: config.domain_id(),
            scorer: RelationshipScorer::new(config.scoring.clone()),
            window: CandidateWindow::new(config.window_size),
            state: BuildState::Initializing,
            cancel: CancellationToken::new(),
            store,
            config,
        })
    }

    /// Replace the scorer (custom indicator tables).
    pub fn with_scorer(mut self, scorer: RelationshipScorer) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn domain_id(&self) -> &DomainId {
        &self.domain_id
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    pub fn state(&self) -> BuildState {
        self.state
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Build the graph for one document.
    ///
    /// Pages are processed in order. A page that fails is reported and the
    /// build continues; a store that stays unavailable after the configured
    /// retries aborts the build with everything committed so far intact.
    #[instrument(skip(self, records), fields(domain = %self.domain_id))]
    pub fn build_document<I>(&mut self, document: &str, records: I) -> BuildReport
    where
        I: IntoIterator<Item = PageRecord>,
    {
        self.state = BuildState::Initializing;
        self.window.clear();
        let mut pages = Vec::new();
        info!(document, "Starting document build");

        if let Err(e) = self.ensure_domain() {
            let reason = if e.is_retryable() {
                AbortReason::StoreUnavailable(e.to_string())
            } else {
                AbortReason::Initialization(e.to_string())
            };
            return self.abort(document, pages, reason);
        }

        for record in records {
            if self.cancel.is_cancelled() {
                return self.abort(document, pages, AbortReason::Cancelled);
            }
            match self.process_page(document, record) {
                Ok(outcome) => pages.push(outcome),
                Err(reason) => return self.abort(document, pages, reason),
            }
        }

        self.transition(BuildState::Finalizing);
        if self.config.set_current_domain {
            let domain_id = &self.domain_id;
            if let Err(e) = self.with_retries("set_current_domain", || {
                self.store.set_current_domain(domain_id)
            }) {
                warn!(error = %e, "Could not make built domain current");
            }
        }
        self.transition(BuildState::Done);

        let report = BuildReport {
            document: document.to_string(),
            domain_id: self.domain_id.clone(),
            status: BuildStatus::Done {
                pages_committed: pages.iter().filter(|p| p.is_committed()).count(),
            },
            pages,
        };
        info!(
            document,
            committed = report.committed(),
            failed = report.failed(),
            skipped = report.skipped(),
            edges = report.edges_created(),
            "Document build finished"
        );
        report
    }

    fn ensure_domain(&self) -> Result<()> {
        let timeout = self.config.commit_timeout();
        let domain_id = &self.domain_id;
        let created = self.with_retries("ensure_domain", || {
            self.store.transaction(timeout, |tx| {
                if tx.get_domain(domain_id)?.is_some() {
                    return Ok(false);
                }
                tx.create_domain(
                    domain_id,
                    &self.config.domain_name,
                    &self.config.domain_description,
                )?;
                Ok(true)
            })
        })?;
        if created {
            info!(name = %self.config.domain_name, "Created domain");
        }
        Ok(())
    }

    fn process_page(
        &mut self,
        document: &str,
        record: PageRecord,
    ) -> std::result::Result<PageOutcome, AbortReason> {
        let page = record.page_number;
        self.transition(BuildState::IngestingPage(page));

        let content = record.content.trim();
        let length = content.chars().count();
        if length < self.config.min_content_length {
            debug!(page, length, "Skipping short page");
            return Ok(PageOutcome::skipped(
                page,
                format!(
                    "content shorter than {} characters",
                    self.config.min_content_length
                ),
            ));
        }

        let node_id = NodeId::for_page(&self.domain_id, document, page);
        let mut upsert = NodeUpsert::new(node_id.clone(), content)
            .with_path(page_path(document, page))
            .with_created_at(record.timestamp);
        if let Some(summary) = record.summary.as_deref().map(str::trim) {
            if !summary.is_empty() {
                upsert = upsert.with_summary(summary);
            }
        }
        let tags = self.page_tags(page, &record.tags);

        // Re-ingested pages keep their stored content and creation time
        let timeout = self.config.commit_timeout();
        let existing = match self.with_retries("lookup_node", || {
            self.store.transaction(timeout, |tx| tx.get_node(&node_id))
        }) {
            Ok(existing) => existing,
            Err(e) => return self.page_error(page, e),
        };
        let (text, created_at) = match existing {
            Some(node) => (node.content, node.created_at),
            None => (content.to_string(), record.timestamp),
        };

        self.transition(BuildState::Scoring(page));
        let relations = self.score_against_window(page, &node_id, &text, created_at);

        self.transition(BuildState::Committing(page));
        let domain_id = &self.domain_id;
        let result = self.with_retries("commit_page", || {
            self.store.transaction(timeout, |tx| {
                commit_page(tx, domain_id, &upsert, &tags, &relations)
            })
        });

        match result {
            Ok(commit) => {
                info!(
                    page,
                    node = %commit.node.id,
                    edges_created = commit.edges_created,
                    edges_existing = commit.edges_existing,
                    tags_added = commit.tags_added,
                    "Committed page"
                );
                self.window.push(WindowEntry::from(&commit.node));
                Ok(PageOutcome {
                    page_number: page,
                    status: PageStatus::Committed {
                        node_id: commit.node.id,
                        edges_created: commit.edges_created,
                        edges_existing: commit.edges_existing,
                        tags_added: commit.tags_added,
                    },
                })
            }
            Err(e) => self.page_error(page, e),
        }
    }

    /// Score the new node against every window entry, newest edge source first.
    fn score_against_window(
        &self,
        page: u32,
        node_id: &NodeId,
        text: &str,
        created_at: DateTime<Utc>,
    ) -> Vec<(NodeId, ScoredRelation)> {
        let source = ScoringCandidate::new(text, created_at);
        let mut relations = Vec::new();
        for entry in self.window.iter().filter(|e| &e.node_id != node_id) {
            match self.scorer.score(&source, &entry.candidate()) {
                Ok(Some(relation)) => relations.push((entry.node_id.clone(), relation)),
                Ok(None) => {}
                Err(e) => {
                    debug!(page, target = %entry.node_id, error = %e, "Unscorable pair; no edge");
                }
            }
        }
        relations
    }

    fn page_tags(&self, page: u32, tags: &BTreeSet<String>) -> Vec<String> {
        let prefix = &self.config.tags_prefix;
        let mut normalized: BTreeSet<String> = tags
            .iter()
            .filter_map(|t| normalize_tag(prefix, t))
            .collect();
        normalized.extend(normalize_tag(prefix, &format!("page-{}", page)));
        normalized.into_iter().collect()
    }

    fn page_error(&self, page: u32, e: Error) -> std::result::Result<PageOutcome, AbortReason> {
        if e.is_retryable() {
            error!(page, error = %e, "Store unavailable after retries; aborting");
            return Err(AbortReason::StoreUnavailable(e.to_string()));
        }
        if !e.is_recoverable() {
            error!(page, error = %e, "Unrecoverable error; aborting");
            return Err(AbortReason::Internal(e.to_string()));
        }
        warn!(page, error = %e, "Page failed; continuing with next page");
        Ok(PageOutcome::failed(page, e))
    }

    /// Retry `op` with exponential backoff while the store is unavailable.
    fn with_retries<T, F>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let mut attempt = 0;
        loop {
            match op() {
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let backoff = self.config.backoff(attempt);
                    attempt += 1;
                    warn!(
                        operation,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Store unavailable; retrying"
                    );
                    thread::sleep(backoff);
                }
                other => return other,
            }
        }
    }

    fn transition(&mut self, next: BuildState) {
        debug_assert!(
            self.state.can_transition_to(&next),
            "illegal build transition {} -> {}",
            self.state,
            next
        );
        debug!(from = %self.state, to = %next, "Build state");
        self.state = next;
    }

    fn abort(&mut self, document: &str, pages: Vec<PageOutcome>, reason: AbortReason) -> BuildReport {
        self.transition(BuildState::Aborted);
        let last_committed_page = pages
            .iter()
            .rev()
            .find(|p| p.is_committed())
            .map(|p| p.page_number);
        warn!(document, %reason, ?last_committed_page, "Document build aborted");
        BuildReport {
            document: document.to_string(),
            domain_id: self.domain_id.clone(),
            status: BuildStatus::Aborted {
                reason,
                last_committed_page,
            },
            pages,
        }
    }
}

/// Run a build on tokio's blocking pool.
///
/// Builders for different domains may run concurrently against clones of
/// one store; their page commits serialize on the store's connection.
#[cfg(feature = "tokio-runtime")]
pub fn spawn_build(
    mut builder: GraphBuilder,
    document: impl Into<String>,
    records: Vec<PageRecord>,
) -> tokio::task::JoinHandle<BuildReport> {
    let document = document.into();
    tokio::task::spawn_blocking(move || builder.build_document(&document, records))
}

fn commit_page(
    tx: &GraphTx<'_>,
    domain_id: &DomainId,
    upsert: &NodeUpsert,
    tags: &[String],
    relations: &[(NodeId, ScoredRelation)],
) -> Result<PageCommit> {
    let node = tx.upsert_node(domain_id, upsert)?;
    let tags_added = tx.attach_tags(&node.id, tags)?;

    let mut edges_created = 0;
    let mut edges_existing = 0;
    for (target, relation) in relations {
        match tx.create_edge(
            &node.id,
            target,
            &relation.relationship_type,
            relation.strength,
            domain_id,
        ) {
            Ok(_) => edges_created += 1,
            Err(e) if e.is_benign() => edges_existing += 1,
            // Target removed since it entered the window
            Err(Error::UnknownNode { node_id }) => {
                warn!(source = %node.id, target = %node_id, "Edge target vanished; skipping edge");
            }
            Err(e) => return Err(e),
        }
    }

    Ok(PageCommit {
        node,
        edges_created,
        edges_existing,
        tags_added,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ROOT_PATH;
    use crate::scoring::relationship;
    use std::sync::mpsc;
    use std::time::Duration;

    fn two_pages(now: DateTime<Utc>) -> Vec<PageRecord> {
        vec![
            PageRecord::new(1, "Chapter 1: Introduction to Graphs").with_timestamp(now),
            PageRecord::new(2, "Graphs contain nodes and edges").with_timestamp(now),
        ]
    }

    fn builder(store: &SqliteGraphStore, config: BuilderConfig) -> GraphBuilder {
        GraphBuilder::new(store.clone(), config).unwrap()
    }

    #[test]
    fn test_two_page_document() {
        let store = SqliteGraphStore::in_memory().unwrap();
        let mut builder = builder(&store, BuilderConfig::new("Graph Theory"));

        let report = builder.build_document("intro.pdf", two_pages(Utc::now()));

        assert!(report.is_complete());
        assert_eq!(report.committed(), 2);
        assert_eq!(builder.state(), BuildState::Done);

        let domain = DomainId::new("graph_theory");
        let stats = store.stats(&domain).unwrap();
        assert_eq!(stats.node_count, 2);
        assert_eq!(stats.edge_count, 1);

        let page1 = NodeId::for_page(&domain, "intro.pdf", 1);
        let page2 = NodeId::for_page(&domain, "intro.pdf", 2);
        let edges = store.edges_for_node(&page2).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].source_id, page2);
        assert_eq!(edges[0].target_id, page1);
        assert_eq!(edges[0].relationship_type, relationship::CONTAINS);
        assert_eq!(edges[0].strength, 1.0);

        let hits = store.search(&domain, "Graphs").unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(store.current_domain().unwrap(), domain);
    }

    #[test]
    fn test_page_paths_and_tags() {
        let store = SqliteGraphStore::in_memory().unwrap();
        let config = BuilderConfig::new("tagged").with_tags_prefix("pdf:");
        let mut builder = builder(&store, config);

        let record = PageRecord::new(1, "Chapter 1: Introduction to Graphs")
            .with_summary("Intro")
            .with_tags([" Graphs ", "pdf:intro", "  "]);
        builder.build_document("book", vec![record]);

        let id = NodeId::for_page(&DomainId::new("tagged"), "book", 1);
        let node = store.get_node(&id).unwrap().unwrap();
        assert_eq!(node.path, "/book/page-0001");
        assert_eq!(node.content_summary.as_deref(), Some("Intro"));
        assert_eq!(
            store.node_tags(&id).unwrap(),
            vec!["pdf:graphs", "pdf:intro", "pdf:page-1"]
        );
    }

    #[test]
    fn test_short_pages_are_skipped() {
        let store = SqliteGraphStore::in_memory().unwrap();
        let mut builder = builder(&store, BuilderConfig::new("short"));

        let report = builder.build_document(
            "doc",
            vec![
                PageRecord::new(1, "   tiny   "),
                PageRecord::new(2, "A sufficiently long page of text"),
            ],
        );

        assert_eq!(report.skipped(), 1);
        assert_eq!(report.committed(), 1);
        assert!(report.is_complete());
        assert_eq!(store.stats(&DomainId::new("short")).unwrap().node_count, 1);
    }

    #[test]
    fn test_reingestion_is_idempotent() {
        let store = SqliteGraphStore::in_memory().unwrap();
        let now = Utc::now();

        let first = builder(&store, BuilderConfig::new("again")).build_document("doc", two_pages(now));
        let before = store.stats(&DomainId::new("again")).unwrap();

        let second =
            builder(&store, BuilderConfig::new("again")).build_document("doc", two_pages(now));
        let after = store.stats(&DomainId::new("again")).unwrap();

        assert_eq!(first.edges_created(), 1);
        assert_eq!(second.edges_created(), 0);
        assert!(second.is_complete());
        assert_eq!(before, after);
        match &second.pages[1].status {
            PageStatus::Committed { edges_existing, .. } => assert_eq!(*edges_existing, 1),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_window_limits_candidates() {
        let store = SqliteGraphStore::in_memory().unwrap();
        let config = BuilderConfig::new("windowed").with_window_size(1);
        let now = Utc::now();

        let report = builder(&store, config).build_document(
            "doc",
            vec![
                PageRecord::new(1, "Overview of the topic").with_timestamp(now),
                PageRecord::new(2, "Background material here").with_timestamp(now),
                PageRecord::new(3, "Graphs contain nodes and edges").with_timestamp(now),
            ],
        );

        // Page 3 only sees page 2
        assert_eq!(report.edges_created(), 1);
        let page3 = NodeId::for_page(&DomainId::new("windowed"), "doc", 3);
        let page2 = NodeId::for_page(&DomainId::new("windowed"), "doc", 2);
        let edges = store.edges_for_node(&page3).unwrap();
        assert_eq!(edges[0].target_id, page2);
    }

    #[test]
    fn test_failing_page_does_not_stop_build() {
        let store = SqliteGraphStore::in_memory().unwrap();
        let domain = DomainId::new("failing");
        // Squat page 2's id in another domain
        store.create_domain(&DomainId::new("other"), "other", "").unwrap();
        store
            .upsert_node(
                &DomainId::new("other"),
                &NodeId::for_page(&domain, "doc", 2),
                "squatter content",
                ROOT_PATH,
                None,
            )
            .unwrap();

        let report = builder(&store, BuilderConfig::new("failing")).build_document(
            "doc",
            vec![
                PageRecord::new(1, "First page content"),
                PageRecord::new(2, "Second page content"),
                PageRecord::new(3, "Third page content"),
            ],
        );

        assert!(report.is_done());
        assert!(!report.is_complete());
        assert_eq!(report.failed(), 1);
        assert_eq!(report.committed(), 2);
        assert!(matches!(report.pages[1].status, PageStatus::Failed { .. }));
    }

    #[test]
    fn test_cancelled_before_start() {
        let store = SqliteGraphStore::in_memory().unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let mut builder =
            builder(&store, BuilderConfig::new("cancelled")).with_cancellation(token);

        let report = builder.build_document("doc", two_pages(Utc::now()));

        assert_eq!(
            report.status,
            BuildStatus::Aborted {
                reason: AbortReason::Cancelled,
                last_committed_page: None,
            }
        );
        assert_eq!(builder.state(), BuildState::Aborted);
        assert_eq!(
            store.stats(&DomainId::new("cancelled")).unwrap().node_count,
            0
        );
    }

    #[test]
    fn test_cancelled_mid_document_keeps_committed_pages() {
        let store = SqliteGraphStore::in_memory().unwrap();
        let mut builder = builder(&store, BuilderConfig::new("midway"));
        let token = builder.cancellation_token();

        let records = two_pages(Utc::now()).into_iter().inspect(move |r| {
            if r.page_number == 2 {
                token.cancel();
            }
        });
        let report = builder.build_document("doc", records);

        assert_eq!(
            report.status,
            BuildStatus::Aborted {
                reason: AbortReason::Cancelled,
                last_committed_page: Some(1),
            }
        );
        assert_eq!(store.stats(&DomainId::new("midway")).unwrap().node_count, 1);
    }

    #[test]
    fn test_store_lost_mid_document_aborts_build() {
        let store = SqliteGraphStore::in_memory().unwrap();
        let config = BuilderConfig::new("Full Disk").with_retries(2, 1);
        let mut builder = builder(&store, config);
        let domain = builder.domain_id().clone();
        let now = Utc::now();

        let records = vec![
            PageRecord::new(1, "Chapter 1: Introduction to Graphs").with_timestamp(now),
            PageRecord::new(2, "Graphs contain nodes and edges. ".repeat(1_000))
                .with_timestamp(now),
            PageRecord::new(3, "A tree is a connected acyclic graph").with_timestamp(now),
        ];
        // The disk fills up once page 1 is committed
        let disk = store.clone();
        let records = records.into_iter().inspect(move |r| {
            if r.page_number == 2 {
                disk.limit_growth(0).unwrap();
            }
        });
        let report = builder.build_document("full.pdf", records);

        match &report.status {
            BuildStatus::Aborted {
                reason: AbortReason::StoreUnavailable(_),
                last_committed_page,
            } => assert_eq!(*last_committed_page, Some(1)),
            other => panic!("expected store-unavailable abort, got {:?}", other),
        }
        assert_eq!(builder.state(), BuildState::Aborted);
        assert_eq!(report.committed(), 1);
        assert_eq!(report.pages.len(), 1);
        assert!(!report.is_done());

        let page1 = NodeId::for_page(&domain, "full.pdf", 1);
        let node = store.get_node(&page1).unwrap().unwrap();
        assert_eq!(node.content, "Chapter 1: Introduction to Graphs");
        assert_eq!(store.node_tags(&page1).unwrap(), vec!["page-1"]);
        assert!(store
            .get_node(&NodeId::for_page(&domain, "full.pdf", 2))
            .unwrap()
            .is_none());
        assert!(store
            .get_node(&NodeId::for_page(&domain, "full.pdf", 3))
            .unwrap()
            .is_none());
        assert_eq!(store.stats(&domain).unwrap().node_count, 1);
        assert_eq!(store.search(&domain, "Introduction").unwrap().len(), 1);
    }

    #[test]
    fn test_commit_timeout_fails_page_without_partial_writes() {
        let store = SqliteGraphStore::in_memory().unwrap();
        let config = BuilderConfig::new("slow").with_commit_timeout(50);
        let mut builder = builder(&store, config);
        builder.ensure_domain().unwrap();

        let (locked_tx, locked_rx) = mpsc::channel();
        let holder = store.clone();
        let handle = thread::spawn(move || {
            holder
                .transaction(Duration::from_secs(5), |_| {
                    locked_tx.send(()).unwrap();
                    thread::sleep(Duration::from_millis(300));
                    Ok(())
                })
                .unwrap();
        });
        locked_rx.recv().unwrap();

        builder.state = BuildState::Initializing;
        let outcome = builder
            .process_page("doc", PageRecord::new(1, "Graphs contain nodes and edges"))
            .unwrap();
        handle.join().unwrap();

        assert!(matches!(outcome.status, PageStatus::Failed { .. }));
        assert_eq!(store.stats(&DomainId::new("slow")).unwrap().node_count, 0);
    }

    #[test]
    fn test_retries_until_store_recovers() {
        let store = SqliteGraphStore::in_memory().unwrap();
        let builder = builder(&store, BuilderConfig::new("retry").with_retries(3, 1));

        let mut calls = 0;
        let value = builder
            .with_retries("flaky", || {
                calls += 1;
                if calls < 3 {
                    Err(Error::store_unavailable("disk busy"))
                } else {
                    Ok(calls)
                }
            })
            .unwrap();
        assert_eq!(value, 3);

        let mut calls = 0;
        let err = builder
            .with_retries("down", || -> Result<()> {
                calls += 1;
                Err(Error::store_unavailable("disk gone"))
            })
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(calls, 4);
    }

    #[test]
    fn test_timeouts_are_not_retried() {
        let store = SqliteGraphStore::in_memory().unwrap();
        let builder = builder(&store, BuilderConfig::new("noretry"));

        let mut calls = 0;
        let err = builder
            .with_retries("slow", || -> Result<()> {
                calls += 1;
                Err(Error::timeout(10))
            })
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_normalize_tag() {
        assert_eq!(normalize_tag("pdf:", " Graphs "), Some("pdf:graphs".into()));
        assert_eq!(normalize_tag("pdf:", "pdf:intro"), Some("pdf:intro".into()));
        assert_eq!(normalize_tag("", "Topic"), Some("topic".into()));
        assert_eq!(normalize_tag("pdf:", "   "), None);
    }

    #[test]
    fn test_normalize_tag_with_upper_case_prefix() {
        assert_eq!(normalize_tag("PDF:", "PDF:intro"), Some("pdf:intro".into()));
        assert_eq!(normalize_tag("PDF:", "Intro"), Some("pdf:intro".into()));

        let store = SqliteGraphStore::in_memory().unwrap();
        let config = BuilderConfig::new("Graph Theory").with_tags_prefix("PDF:");
        let mut builder = builder(&store, config);
        let record = PageRecord::new(1, "Chapter 1: Introduction to Graphs")
            .with_tags(["PDF:Intro", "graphs"]);
        assert!(builder.build_document("intro.pdf", vec![record]).is_complete());

        let node = NodeId::for_page(builder.domain_id(), "intro.pdf", 1);
        assert_eq!(
            store.node_tags(&node).unwrap(),
            vec!["pdf:graphs", "pdf:intro", "pdf:page-1"]
        );
    }

    #[cfg(feature = "tokio-runtime")]
    #[tokio::test]
    async fn test_concurrent_builds_share_store() {
        let store = SqliteGraphStore::in_memory().unwrap();
        let now = Utc::now();

        let a = spawn_build(
            builder(&store, BuilderConfig::new("alpha").with_set_current_domain(false)),
            "a.pdf",
            two_pages(now),
        );
        let b = spawn_build(
            builder(&store, BuilderConfig::new("beta").with_set_current_domain(false)),
            "b.pdf",
            two_pages(now),
        );

        let (a, b) = (a.await.unwrap(), b.await.unwrap());
        assert!(a.is_complete());
        assert!(b.is_complete());
        assert_eq!(store.stats(&DomainId::new("alpha")).unwrap().node_count, 2);
        assert_eq!(store.stats(&DomainId::new("beta")).unwrap().node_count, 2);
        assert_eq!(store.stats(&DomainId::new("alpha")).unwrap().edge_count, 1);
    }
}
