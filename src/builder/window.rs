//! Sliding window of recently committed nodes.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;

use crate::memory::{MemoryNode, NodeId};
use crate::scoring::ScoringCandidate;

/// A committed node kept around as a scoring candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowEntry {
    pub node_id: NodeId,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl WindowEntry {
    pub fn candidate(&self) -> ScoringCandidate<'_> {
        ScoringCandidate::new(&self.content, self.created_at)
    }
}

impl From<&MemoryNode> for WindowEntry {
    fn from(node: &MemoryNode) -> Self {
        Self {
            node_id: node.id.clone(),
            content: node.content.clone(),
            created_at: node.created_at,
        }
    }
}

/// Bounded FIFO of the last K committed nodes, oldest first.
#[derive(Debug, Clone)]
pub struct CandidateWindow {
    capacity: usize,
    entries: VecDeque<WindowEntry>,
}

impl CandidateWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Push a committed node, evicting the oldest entry when full.
    ///
    /// A node already in the window moves to the newest position.
    pub fn push(&mut self, entry: WindowEntry) {
        if self.capacity == 0 {
            return;
        }
        self.entries.retain(|e| e.node_id != entry.node_id);
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn iter(&self) -> impl Iterator<Item = &WindowEntry> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
