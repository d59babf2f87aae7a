//! The cognition boundary: every nondeterministic judgment the kernel
//! needs (embeddings, importance scoring, daily planning, task
//! decomposition, address choice, reflection synthesis, dialogue) sits
//! behind one capability trait.
//!
//! The kernel talks to it through [`OracleClient`], which retries with
//! backoff and surfaces errors for the caller's stage-local fallback; no
//! stage may stall a tick on the oracle. [`ScriptedOracle`] is the
//! deterministic in-tree implementation used by the CLI and tests.

use std::fmt;
use std::thread;
use std::time::Duration;

use contracts::{Address, ConceptKind, PersonaIdentity, ScheduleEntry, MINUTES_PER_DAY};

use crate::sim::{mix_seed, sample_range_i64, stable_text_hash};

// ---------------------------------------------------------------------------
// Errors and the capability trait
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    Timeout,
    RateLimited,
    /// The oracle answered, but not in a shape the kernel can use.
    Malformed(String),
    Unavailable(String),
}

impl fmt::Display for OracleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "oracle call timed out"),
            Self::RateLimited => write!(f, "oracle rate limited"),
            Self::Malformed(detail) => write!(f, "oracle response malformed: {detail}"),
            Self::Unavailable(detail) => write!(f, "oracle unavailable: {detail}"),
        }
    }
}

impl std::error::Error for OracleError {}

/// External cognition capability. Implementations must return within the
/// caller's call budget; the kernel bounds retries but cannot interrupt a
/// call that never returns.
pub trait CognitionOracle: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, OracleError>;

    /// Importance of a would-be memory on the 1–10 scale.
    fn score_poignancy(&self, kind: ConceptKind, description: &str) -> Result<i64, OracleError>;

    /// A full day of timed schedule entries covering the whole day.
    fn plan_day(
        &self,
        identity: &PersonaIdentity,
        prior_context: &[String],
        day: u64,
    ) -> Result<Vec<ScheduleEntry>, OracleError>;

    /// Break one schedule block into finer steps. Returned entries carry
    /// start minutes relative to the block; the caller rebases them.
    fn decompose_task(
        &self,
        task: &str,
        duration_minutes: u32,
    ) -> Result<Vec<ScheduleEntry>, OracleError>;

    /// Pick the address to act toward, from the agent's known options.
    fn resolve_address(
        &self,
        identity: &PersonaIdentity,
        task: &str,
        context: &[String],
        options: &[Address],
    ) -> Result<Address, OracleError>;

    /// Synthesize one insight from a focal question and its evidence.
    fn reflect(&self, question: &str, evidence: &[String]) -> Result<String, OracleError>;

    /// One line of dialogue given the conversation so far.
    fn utter(&self, identity: &PersonaIdentity, history: &[String]) -> Result<String, OracleError>;
}

// ---------------------------------------------------------------------------
// Retrying client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Sleep between attempts grows linearly: backoff, 2×backoff, …
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(50),
        }
    }
}

/// The kernel's handle on the oracle: bounded retry with backoff around
/// every call. Callers translate the final error into their stage
/// fallback; nothing here panics or blocks indefinitely.
pub struct OracleClient {
    oracle: Box<dyn CognitionOracle>,
    policy: RetryPolicy,
}

impl fmt::Debug for OracleClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OracleClient")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl OracleClient {
    pub fn new(oracle: Box<dyn CognitionOracle>, policy: RetryPolicy) -> Self {
        Self { oracle, policy }
    }

    pub fn scripted(seed: u64) -> Self {
        Self::new(Box::new(ScriptedOracle::new(seed)), RetryPolicy::default())
    }

    fn call<T>(
        &self,
        mut attempt_call: impl FnMut(&dyn CognitionOracle) -> Result<T, OracleError>,
    ) -> Result<T, OracleError> {
        let attempts = self.policy.max_attempts.max(1);
        let mut last_error = OracleError::Unavailable("no attempt made".to_string());
        for attempt in 1..=attempts {
            match attempt_call(self.oracle.as_ref()) {
                Ok(value) => return Ok(value),
                Err(error) => {
                    last_error = error;
                    if attempt < attempts {
                        thread::sleep(self.policy.backoff * attempt);
                    }
                }
            }
        }
        Err(last_error)
    }

    pub fn embed(&self, text: &str) -> Result<Vec<f32>, OracleError> {
        self.call(|oracle| oracle.embed(text))
    }

    pub fn score_poignancy(
        &self,
        kind: ConceptKind,
        description: &str,
    ) -> Result<i64, OracleError> {
        self.call(|oracle| oracle.score_poignancy(kind, description))
            .map(|score| score.clamp(1, 10))
    }

    pub fn plan_day(
        &self,
        identity: &PersonaIdentity,
        prior_context: &[String],
        day: u64,
    ) -> Result<Vec<ScheduleEntry>, OracleError> {
        let entries = self.call(|oracle| oracle.plan_day(identity, prior_context, day))?;
        if entries.is_empty() {
            return Err(OracleError::Malformed("empty schedule".to_string()));
        }
        Ok(entries)
    }

    pub fn decompose_task(
        &self,
        task: &str,
        duration_minutes: u32,
    ) -> Result<Vec<ScheduleEntry>, OracleError> {
        let steps = self.call(|oracle| oracle.decompose_task(task, duration_minutes))?;
        if steps.is_empty() {
            return Err(OracleError::Malformed("empty decomposition".to_string()));
        }
        Ok(steps)
    }

    pub fn resolve_address(
        &self,
        identity: &PersonaIdentity,
        task: &str,
        context: &[String],
        options: &[Address],
    ) -> Result<Address, OracleError> {
        self.call(|oracle| oracle.resolve_address(identity, task, context, options))
    }

    pub fn reflect(&self, question: &str, evidence: &[String]) -> Result<String, OracleError> {
        self.call(|oracle| oracle.reflect(question, evidence))
    }

    pub fn utter(
        &self,
        identity: &PersonaIdentity,
        history: &[String],
    ) -> Result<String, OracleError> {
        self.call(|oracle| oracle.utter(identity, history))
    }
}

// ---------------------------------------------------------------------------
// ScriptedOracle
// ---------------------------------------------------------------------------

/// Deterministic offline cognition: embeddings from seeded text hashing,
/// poignancy from a keyword table with a hashed remainder, a fixed daily
/// template, and canned dialogue. Good enough to drive full runs without
/// a model behind it, and exactly reproducible from the seed.
#[derive(Debug, Clone)]
pub struct ScriptedOracle {
    seed: u64,
    embedding_dim: usize,
}

impl ScriptedOracle {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            embedding_dim: 16,
        }
    }
}

impl CognitionOracle for ScriptedOracle {
    fn embed(&self, text: &str) -> Result<Vec<f32>, OracleError> {
        let base = mix_seed(self.seed, stable_text_hash(text));
        let vector = (0..self.embedding_dim)
            .map(|component| {
                let raw = mix_seed(base, component as u64) % 2_000;
                (raw as f32 / 1_000.0) - 1.0
            })
            .collect();
        Ok(vector)
    }

    fn score_poignancy(&self, kind: ConceptKind, description: &str) -> Result<i64, OracleError> {
        let lowered = description.to_lowercase();
        let base = if ["fire", "hurt", "stolen", "collapsed", "died"]
            .iter()
            .any(|marker| lowered.contains(marker))
        {
            8
        } else if ["argu", "broke", "lost", "closed"]
            .iter()
            .any(|marker| lowered.contains(marker))
        {
            6
        } else {
            match kind {
                ConceptKind::Event => 3,
                ConceptKind::Chat => 4,
                ConceptKind::Thought => 5,
            }
        };
        let jitter = sample_range_i64(mix_seed(self.seed, stable_text_hash(description)), 3, 0, 1);
        Ok((base + jitter).clamp(1, 10))
    }

    fn plan_day(
        &self,
        identity: &PersonaIdentity,
        _prior_context: &[String],
        _day: u64,
    ) -> Result<Vec<ScheduleEntry>, OracleError> {
        let work = identity.currently.trim().to_string();
        let blocks: [(String, u32); 7] = [
            ("sleeping".to_string(), 6 * 60),
            ("waking up and getting ready".to_string(), 60),
            (work.clone(), 5 * 60),
            ("taking lunch".to_string(), 60),
            (work, 5 * 60),
            ("winding down in the evening".to_string(), 3 * 60),
            ("sleeping".to_string(), 3 * 60),
        ];
        let mut start = 0u32;
        let mut entries = Vec::new();
        for (task, duration_minutes) in blocks {
            entries.push(ScheduleEntry {
                task,
                start_minute: start,
                duration_minutes,
                decomposed: false,
            });
            start += duration_minutes;
        }
        debug_assert_eq!(start, MINUTES_PER_DAY);
        Ok(entries)
    }

    fn decompose_task(
        &self,
        task: &str,
        duration_minutes: u32,
    ) -> Result<Vec<ScheduleEntry>, OracleError> {
        let step_length = 30u32;
        let mut steps = Vec::new();
        let mut offset = 0u32;
        let mut part = 1u32;
        while offset < duration_minutes {
            let duration = step_length.min(duration_minutes - offset);
            steps.push(ScheduleEntry {
                task: format!("{task} (part {part})"),
                start_minute: offset,
                duration_minutes: duration,
                decomposed: true,
            });
            offset += duration;
            part += 1;
        }
        Ok(steps)
    }

    fn resolve_address(
        &self,
        _identity: &PersonaIdentity,
        task: &str,
        _context: &[String],
        options: &[Address],
    ) -> Result<Address, OracleError> {
        if options.is_empty() {
            return Err(OracleError::Unavailable("no known addresses".to_string()));
        }
        let lowered = task.to_lowercase();
        // Prefer an option whose arena name appears in the task text.
        for option in options {
            if let Some(arena) = option.arena_name() {
                if lowered.contains(&arena.to_lowercase()) {
                    return Ok(option.clone());
                }
            }
        }
        let pick = mix_seed(self.seed, stable_text_hash(task)) as usize % options.len();
        Ok(options[pick].clone())
    }

    fn reflect(&self, question: &str, evidence: &[String]) -> Result<String, OracleError> {
        Ok(format!(
            "thinking it over, {} threads point the same way: {}",
            evidence.len().max(1),
            question
        ))
    }

    fn utter(&self, identity: &PersonaIdentity, history: &[String]) -> Result<String, OracleError> {
        let line = match history.last() {
            Some(previous) => format!("{} picks up on \"{}\"", identity.name, previous),
            None => format!("{} says hello", identity.name),
        };
        Ok(line)
    }
}

// ---------------------------------------------------------------------------
// UnavailableOracle
// ---------------------------------------------------------------------------

/// An oracle that refuses every call. A safe stand-in when no cognition
/// backend is configured, and the sparring partner for every degradation
/// path in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableOracle;

impl UnavailableOracle {
    fn refuse<T>() -> Result<T, OracleError> {
        Err(OracleError::Unavailable(
            "no cognition backend configured".to_string(),
        ))
    }
}

impl CognitionOracle for UnavailableOracle {
    fn embed(&self, _text: &str) -> Result<Vec<f32>, OracleError> {
        Self::refuse()
    }

    fn score_poignancy(&self, _kind: ConceptKind, _description: &str) -> Result<i64, OracleError> {
        Self::refuse()
    }

    fn plan_day(
        &self,
        _identity: &PersonaIdentity,
        _prior_context: &[String],
        _day: u64,
    ) -> Result<Vec<ScheduleEntry>, OracleError> {
        Self::refuse()
    }

    fn decompose_task(
        &self,
        _task: &str,
        _duration_minutes: u32,
    ) -> Result<Vec<ScheduleEntry>, OracleError> {
        Self::refuse()
    }

    fn resolve_address(
        &self,
        _identity: &PersonaIdentity,
        _task: &str,
        _context: &[String],
        _options: &[Address],
    ) -> Result<Address, OracleError> {
        Self::refuse()
    }

    fn reflect(&self, _question: &str, _evidence: &[String]) -> Result<String, OracleError> {
        Self::refuse()
    }

    fn utter(
        &self,
        _identity: &PersonaIdentity,
        _history: &[String],
    ) -> Result<String, OracleError> {
        Self::refuse()
    }
}
