//! Hearthvale kernel: a deterministic simulation of autonomous personas in
//! a tile world, each driven by a private episodic memory and a
//! perceive → retrieve → plan → reflect → execute cycle.
//!
//! Everything nondeterministic (language, judgment, embeddings) lives
//! behind the [`oracle::CognitionOracle`] boundary; the kernel itself is
//! replayable from a seed.

pub mod agent;
pub mod memory;
pub mod oracle;
pub mod path;
pub mod perception;
pub mod retrieval;
pub mod sim;
pub mod spatial;
pub mod world;
