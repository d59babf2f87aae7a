//! Associative episodic memory: an append-only store of typed concept
//! nodes with keyword indexing, plus the explicit embedding cache the
//! retrieval scorer reads from.
//!
//! Insertion is the only mutation that grows the store; node cores are
//! immutable afterward and ids are never reused, so a store can be
//! replayed or audited from its snapshot at any point.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use contracts::{ConceptKind, ConceptNode, MemorySnapshot};

// ---------------------------------------------------------------------------
// EmbeddingCache
// ---------------------------------------------------------------------------

/// Text → embedding vector, keyed by the node's embedding key. Owned per
/// agent and passed explicitly into every call that needs vectors; the
/// kernel never generates embeddings itself.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbeddingCache {
    entries: BTreeMap<String, Vec<f32>>,
}

impl EmbeddingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&[f32]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, vector: Vec<f32>) {
        self.entries.insert(key.into(), vector);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &BTreeMap<String, Vec<f32>> {
        &self.entries
    }

    pub fn from_entries(entries: BTreeMap<String, Vec<f32>>) -> Self {
        Self { entries }
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// Fields of a node-to-be; the store assigns ids, sequence indices, and
/// the initial `last_accessed`.
#[derive(Debug, Clone)]
pub struct NewConcept {
    pub kind: ConceptKind,
    pub created: u64,
    pub expires: Option<u64>,
    pub subject: String,
    pub predicate: String,
    pub object: String,
    pub description: String,
    pub poignancy: i64,
    pub keywords: BTreeSet<String>,
    pub embedding_key: String,
    pub evidence: Vec<u64>,
}

/// Problems in a persisted memory snapshot. Restoring a corrupt snapshot
/// aborts — a half-restored memory cannot be trusted for replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryRestoreError {
    DuplicateNode(u64),
    IdBeyondCounter { node_id: u64, next_node_id: u64 },
    CountMismatch {
        kind: ConceptKind,
        recorded: u64,
        found: u64,
    },
}

impl fmt::Display for MemoryRestoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateNode(id) => write!(f, "snapshot repeats node id {id}"),
            Self::IdBeyondCounter {
                node_id,
                next_node_id,
            } => write!(
                f,
                "snapshot node id {node_id} is not below the id counter {next_node_id}"
            ),
            Self::CountMismatch {
                kind,
                recorded,
                found,
            } => write!(
                f,
                "snapshot records {recorded} {kind} nodes but contains {found}"
            ),
        }
    }
}

impl std::error::Error for MemoryRestoreError {}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryStore {
    nodes: BTreeMap<u64, ConceptNode>,
    seq_event: Vec<u64>,
    seq_thought: Vec<u64>,
    seq_chat: Vec<u64>,
    keyword_index: BTreeMap<String, BTreeSet<u64>>,
    next_node_id: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            next_node_id: 1,
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: u64) -> Option<&ConceptNode> {
        self.nodes.get(&id)
    }

    /// Ids of one kind in insertion order.
    pub fn sequence(&self, kind: ConceptKind) -> &[u64] {
        match kind {
            ConceptKind::Event => &self.seq_event,
            ConceptKind::Thought => &self.seq_thought,
            ConceptKind::Chat => &self.seq_chat,
        }
    }

    /// All nodes in global insertion order. Ids are assigned monotonically,
    /// so map order is insertion order.
    pub fn nodes_in_order(&self) -> impl Iterator<Item = &ConceptNode> {
        self.nodes.values()
    }

    /// Append a node, assigning the next global id and per-kind index.
    pub fn insert(&mut self, new: NewConcept) -> u64 {
        let node_id = self.next_node_id;
        self.next_node_id += 1;
        let sequence = match new.kind {
            ConceptKind::Event => &mut self.seq_event,
            ConceptKind::Thought => &mut self.seq_thought,
            ConceptKind::Chat => &mut self.seq_chat,
        };
        let kind_index = sequence.len() as u64;
        sequence.push(node_id);

        for keyword in &new.keywords {
            self.keyword_index
                .entry(keyword.clone())
                .or_default()
                .insert(node_id);
        }

        self.nodes.insert(
            node_id,
            ConceptNode {
                node_id,
                kind: new.kind,
                kind_index,
                created: new.created,
                expires: new.expires,
                last_accessed: new.created,
                subject: new.subject,
                predicate: new.predicate,
                object: new.object,
                description: new.description,
                poignancy: new.poignancy,
                keywords: new.keywords,
                embedding_key: new.embedding_key,
                evidence: new.evidence,
            },
        );
        node_id
    }

    /// Union of candidates under any of the keywords, optionally filtered
    /// by kind, resolved in insertion order.
    pub fn by_keyword(&self, keywords: &[&str], kind: Option<ConceptKind>) -> Vec<&ConceptNode> {
        let mut ids = BTreeSet::new();
        for keyword in keywords {
            if let Some(matched) = self.keyword_index.get(*keyword) {
                ids.extend(matched.iter().copied());
            }
        }
        ids.into_iter()
            .filter_map(|id| self.nodes.get(&id))
            .filter(|node| kind.map(|k| node.kind == k).unwrap_or(true))
            .collect()
    }

    /// Triple keys of the most recent `retention` event nodes: the
    /// perception dedupe window.
    pub fn latest_triples(&self, retention: usize) -> BTreeSet<String> {
        self.seq_event
            .iter()
            .rev()
            .take(retention)
            .filter_map(|id| self.nodes.get(id))
            .map(ConceptNode::triple_key)
            .collect()
    }

    /// The most recent non-idle event and thought nodes, newest first:
    /// the reflection focal candidates.
    pub fn recent_non_idle(&self, n: usize) -> Vec<&ConceptNode> {
        self.nodes
            .values()
            .rev()
            .filter(|node| {
                matches!(node.kind, ConceptKind::Event | ConceptKind::Thought) && !node.is_idle()
            })
            .take(n)
            .collect()
    }

    /// Mark a node as touched by retrieval. Poignancy and the triple stay
    /// frozen; only the access time moves.
    pub fn touch(&mut self, id: u64, now: u64) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.last_accessed = now;
        }
    }

    pub fn to_snapshot(&self, cache: &EmbeddingCache) -> MemorySnapshot {
        MemorySnapshot {
            next_node_id: self.next_node_id,
            event_count: self.seq_event.len() as u64,
            thought_count: self.seq_thought.len() as u64,
            chat_count: self.seq_chat.len() as u64,
            nodes: self.nodes.values().cloned().collect(),
            embeddings: cache.entries().clone(),
        }
    }

    /// Rebuild a store (and its embedding cache) from a snapshot. The
    /// keyword index is derived from the nodes; counters and sequences
    /// are validated against what the snapshot records.
    pub fn from_snapshot(
        snapshot: &MemorySnapshot,
    ) -> Result<(Self, EmbeddingCache), MemoryRestoreError> {
        let mut store = Self::new();
        store.next_node_id = snapshot.next_node_id.max(1);

        for node in &snapshot.nodes {
            if node.node_id >= store.next_node_id {
                return Err(MemoryRestoreError::IdBeyondCounter {
                    node_id: node.node_id,
                    next_node_id: store.next_node_id,
                });
            }
            if store.nodes.insert(node.node_id, node.clone()).is_some() {
                return Err(MemoryRestoreError::DuplicateNode(node.node_id));
            }
            let sequence = match node.kind {
                ConceptKind::Event => &mut store.seq_event,
                ConceptKind::Thought => &mut store.seq_thought,
                ConceptKind::Chat => &mut store.seq_chat,
            };
            sequence.push(node.node_id);
            for keyword in &node.keywords {
                store
                    .keyword_index
                    .entry(keyword.clone())
                    .or_default()
                    .insert(node.node_id);
            }
        }

        // Sequences must reflect insertion order even if the snapshot's
        // node list was reordered in transit.
        for sequence in [
            &mut store.seq_event,
            &mut store.seq_thought,
            &mut store.seq_chat,
        ] {
            sequence.sort_unstable();
        }

        for (kind, recorded) in [
            (ConceptKind::Event, snapshot.event_count),
            (ConceptKind::Thought, snapshot.thought_count),
            (ConceptKind::Chat, snapshot.chat_count),
        ] {
            let found = store.sequence(kind).len() as u64;
            if found != recorded {
                return Err(MemoryRestoreError::CountMismatch {
                    kind,
                    recorded,
                    found,
                });
            }
        }

        let cache = EmbeddingCache::from_entries(snapshot.embeddings.clone());
        Ok((store, cache))
    }
}
