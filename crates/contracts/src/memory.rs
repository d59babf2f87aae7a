//! Episodic-memory contract types: concept nodes and the persisted form of
//! an agent's memory store.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::spatial::{IDLE_OBJECT, IDLE_PREDICATE};

/// The three kinds of concept node an agent records.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ConceptKind {
    Event,
    Thought,
    Chat,
}

impl ConceptKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Thought => "thought",
            Self::Chat => "chat",
        }
    }
}

impl fmt::Display for ConceptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One atomic memory: a subject-predicate-object triple plus metadata.
///
/// Core fields (triple, description, embedding key, creation time) are
/// immutable once the node is inserted; only `last_accessed` moves as
/// retrieval touches the node. Nodes are never deleted — `expires` is
/// advisory metadata kept for audit and replay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConceptNode {
    /// Globally unique, strictly increasing across all kinds.
    pub node_id: u64,
    pub kind: ConceptKind,
    /// Per-kind insertion sequence, starting at 0.
    pub kind_index: u64,
    /// Simulation time in seconds.
    pub created: u64,
    pub expires: Option<u64>,
    pub last_accessed: u64,
    pub subject: String,
    pub predicate: String,
    pub object: String,
    pub description: String,
    /// Importance on the 1 (trivial) to 10 (life-changing) scale.
    pub poignancy: i64,
    pub keywords: BTreeSet<String>,
    /// Key into the agent's embedding cache; usually the description text.
    pub embedding_key: String,
    /// Node ids this node is grounded on (populated for thoughts).
    pub evidence: Vec<u64>,
}

impl ConceptNode {
    pub fn triple_key(&self) -> String {
        format!("{}|{}|{}", self.subject, self.predicate, self.object)
    }

    /// Idle filler nodes are excluded from retrieval candidate sets.
    pub fn is_idle(&self) -> bool {
        self.predicate == IDLE_PREDICATE && self.object == IDLE_OBJECT
    }
}

/// Persisted form of a memory store: nodes in insertion order, the id and
/// per-kind counters needed to keep ids strictly increasing across a
/// save/load boundary, and the embedding cache the nodes key into.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MemorySnapshot {
    pub next_node_id: u64,
    pub event_count: u64,
    pub thought_count: u64,
    pub chat_count: u64,
    pub nodes: Vec<ConceptNode>,
    pub embeddings: BTreeMap<String, Vec<f32>>,
}
