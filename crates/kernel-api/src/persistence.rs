//! SQLite persistence for runs: config/status upserts, append-only event
//! rows, periodic snapshot blobs, and replay-slice reads. Everything
//! flushes inside one transaction so a crash never leaves a half-written
//! delta.

use std::fmt;
use std::path::Path;

use contracts::{Event, RunConfig, RunStatus, Snapshot};
use rusqlite::{params, Connection, OptionalExtension};

#[derive(Debug)]
pub enum PersistenceError {
    Sqlite(rusqlite::Error),
    Serde(serde_json::Error),
    RunNotFound(String),
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "sqlite error: {err}"),
            Self::Serde(err) => write!(f, "serde error: {err}"),
            Self::RunNotFound(run_id) => write!(f, "run {run_id:?} is not in the store"),
        }
    }
}

impl std::error::Error for PersistenceError {}

impl From<rusqlite::Error> for PersistenceError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serde(value)
    }
}

/// A restore point: the latest snapshot at or before a tick, plus every
/// event recorded after it.
#[derive(Debug, Clone)]
pub struct ReplaySlice {
    pub config: RunConfig,
    pub status: RunStatus,
    pub snapshot: Option<Snapshot>,
    pub events_after: Vec<Event>,
}

#[derive(Debug)]
pub struct SqliteRunStore {
    conn: Connection,
}

impl SqliteRunStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        Self::wrap(Connection::open(path)?)
    }

    /// In-memory store for tests; contents die with the connection.
    pub fn open_in_memory() -> Result<Self, PersistenceError> {
        Self::wrap(Connection::open_in_memory()?)
    }

    fn wrap(conn: Connection) -> Result<Self, PersistenceError> {
        let mut store = Self { conn };
        store.configure()?;
        store.migrate()?;
        Ok(store)
    }

    /// Flush one delta: upsert the run row, append new events, and store
    /// the snapshot when one is due. One transaction, idempotent on
    /// replayed event ids.
    pub fn persist_delta(
        &mut self,
        config: &RunConfig,
        status: &RunStatus,
        events: &[Event],
        snapshot: Option<&Snapshot>,
    ) -> Result<(), PersistenceError> {
        let config_json = serde_json::to_string(config)?;
        let status_json = serde_json::to_string(status)?;
        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT INTO runs (run_id, schema_version, seed, config_json, status_json, updated_at_tick)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(run_id) DO UPDATE SET
                 status_json = excluded.status_json,
                 updated_at_tick = excluded.updated_at_tick",
            params![
                config.run_id.as_str(),
                config.schema_version.as_str(),
                config.seed.to_string(),
                config_json,
                status_json,
                i64::try_from(status.current_tick).unwrap_or(i64::MAX),
            ],
        )?;

        for event in events {
            let payload_json = serde_json::to_string(event)?;
            tx.execute(
                "INSERT OR IGNORE INTO events (
                    run_id, event_id, tick, sequence_in_tick, event_type, payload_json, created_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    event.run_id.as_str(),
                    event.event_id.as_str(),
                    i64::try_from(event.tick).unwrap_or(i64::MAX),
                    i64::try_from(event.sequence_in_tick).unwrap_or(i64::MAX),
                    format!("{:?}", event.event_type),
                    payload_json,
                    event.created_at.as_str(),
                ],
            )?;
        }

        if let Some(snapshot) = snapshot {
            let payload_json = serde_json::to_string(snapshot)?;
            tx.execute(
                "INSERT OR IGNORE INTO snapshots (
                    run_id, snapshot_id, tick, state_hash, payload_json, created_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    snapshot.run_id.as_str(),
                    snapshot.snapshot_id.as_str(),
                    i64::try_from(snapshot.tick).unwrap_or(i64::MAX),
                    snapshot.state_hash.as_str(),
                    payload_json,
                    snapshot.created_at.as_str(),
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    pub fn load_config(&self, run_id: &str) -> Result<RunConfig, PersistenceError> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT config_json FROM runs WHERE run_id = ?1",
                params![run_id],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Err(PersistenceError::RunNotFound(run_id.to_string())),
        }
    }

    pub fn load_status(&self, run_id: &str) -> Result<RunStatus, PersistenceError> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT status_json FROM runs WHERE run_id = ?1",
                params![run_id],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Err(PersistenceError::RunNotFound(run_id.to_string())),
        }
    }

    pub fn load_events_range(
        &self,
        run_id: &str,
        from_tick: u64,
        to_tick: u64,
    ) -> Result<Vec<Event>, PersistenceError> {
        let mut stmt = self.conn.prepare(
            "SELECT payload_json
             FROM events
             WHERE run_id = ?1 AND tick >= ?2 AND tick <= ?3
             ORDER BY tick ASC, sequence_in_tick ASC",
        )?;
        let rows = stmt.query_map(
            params![
                run_id,
                i64::try_from(from_tick).unwrap_or(i64::MAX),
                i64::try_from(to_tick).unwrap_or(i64::MAX),
            ],
            |row| row.get::<_, String>(0),
        )?;
        let mut events = Vec::new();
        for row in rows {
            events.push(serde_json::from_str::<Event>(&row?)?);
        }
        Ok(events)
    }

    pub fn load_latest_snapshot_at_or_before(
        &self,
        run_id: &str,
        tick: u64,
    ) -> Result<Option<Snapshot>, PersistenceError> {
        let payload: Option<String> = self
            .conn
            .query_row(
                "SELECT payload_json
                 FROM snapshots
                 WHERE run_id = ?1 AND tick <= ?2
                 ORDER BY tick DESC
                 LIMIT 1",
                params![run_id, i64::try_from(tick).unwrap_or(i64::MAX)],
                |row| row.get(0),
            )
            .optional()?;
        match payload {
            Some(raw) => Ok(Some(serde_json::from_str::<Snapshot>(&raw)?)),
            None => Ok(None),
        }
    }

    /// Everything needed to resume a run at its recorded head.
    pub fn load_replay(&self, run_id: &str) -> Result<ReplaySlice, PersistenceError> {
        let config = self.load_config(run_id)?;
        let status = self.load_status(run_id)?;
        let snapshot = self.load_latest_snapshot_at_or_before(run_id, status.current_tick)?;
        let from_tick = snapshot.as_ref().map(|snap| snap.tick + 1).unwrap_or(1);
        let events_after = self.load_events_range(run_id, from_tick, status.current_tick)?;
        Ok(ReplaySlice {
            config,
            status,
            snapshot,
            events_after,
        })
    }

    pub fn event_count(&self, run_id: &str) -> Result<u64, PersistenceError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM events WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    pub fn snapshot_count(&self, run_id: &str) -> Result<u64, PersistenceError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM snapshots WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    fn configure(&mut self) -> Result<(), PersistenceError> {
        self.conn.pragma_update(None, "journal_mode", "WAL")?;
        self.conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(())
    }

    fn migrate(&mut self) -> Result<(), PersistenceError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS runs (
                run_id TEXT PRIMARY KEY,
                schema_version TEXT NOT NULL,
                seed TEXT NOT NULL,
                config_json TEXT NOT NULL,
                status_json TEXT NOT NULL,
                updated_at_tick INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS events (
                run_id TEXT NOT NULL,
                event_id TEXT NOT NULL,
                tick INTEGER NOT NULL,
                sequence_in_tick INTEGER NOT NULL,
                event_type TEXT NOT NULL,
                payload_json TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (run_id, event_id)
            );

            CREATE INDEX IF NOT EXISTS idx_events_run_tick
                ON events (run_id, tick, sequence_in_tick);

            CREATE TABLE IF NOT EXISTS snapshots (
                run_id TEXT NOT NULL,
                snapshot_id TEXT NOT NULL,
                tick INTEGER NOT NULL,
                state_hash TEXT NOT NULL,
                payload_json TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (run_id, tick)
            );
            ",
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{EventType, RunMode, SCHEMA_VERSION_V1};
    use serde_json::json;

    fn config() -> RunConfig {
        RunConfig::default()
    }

    fn status(tick: u64) -> RunStatus {
        RunStatus {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            run_id: config().run_id,
            current_tick: tick,
            max_ticks: 100,
            mode: RunMode::Paused,
        }
    }

    fn event(tick: u64, sequence: u64) -> Event {
        Event {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            run_id: config().run_id,
            tick,
            sequence_in_tick: sequence,
            event_id: format!("evt_{tick}_{sequence}"),
            created_at: format!("d000T00:{tick:02}:00"),
            event_type: EventType::AgentMoved,
            agent: Some("Ada Reyes".to_string()),
            address: None,
            details: Some(json!({ "from": "(0, 0)", "to": "(1, 0)" })),
        }
    }

    fn snapshot(tick: u64) -> Snapshot {
        Snapshot {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            run_id: config().run_id,
            tick,
            created_at: format!("d000T00:{tick:02}:00"),
            snapshot_id: format!("snap_{}_{tick:06}", config().run_id),
            state_hash: format!("{tick:016x}"),
            world_events: Vec::new(),
            agents: Vec::new(),
        }
    }

    #[test]
    fn delta_round_trips_events_and_snapshots() {
        let mut store = SqliteRunStore::open_in_memory().expect("open");
        store
            .persist_delta(
                &config(),
                &status(2),
                &[event(1, 0), event(2, 0)],
                Some(&snapshot(2)),
            )
            .expect("persist");

        let run_id = config().run_id;
        assert_eq!(store.event_count(&run_id).expect("count"), 2);
        assert_eq!(store.snapshot_count(&run_id).expect("count"), 1);
        let loaded = store.load_events_range(&run_id, 1, 2).expect("events");
        assert_eq!(loaded, vec![event(1, 0), event(2, 0)]);
        let loaded_snapshot = store
            .load_latest_snapshot_at_or_before(&run_id, 10)
            .expect("snapshot");
        assert_eq!(loaded_snapshot, Some(snapshot(2)));
    }

    #[test]
    fn replaying_the_same_events_is_idempotent() {
        let mut store = SqliteRunStore::open_in_memory().expect("open");
        let batch = [event(1, 0), event(1, 1)];
        store
            .persist_delta(&config(), &status(1), &batch, None)
            .expect("first");
        store
            .persist_delta(&config(), &status(1), &batch, None)
            .expect("second");
        assert_eq!(store.event_count(&config().run_id).expect("count"), 2);
    }

    #[test]
    fn replay_slice_splits_at_the_snapshot() {
        let mut store = SqliteRunStore::open_in_memory().expect("open");
        store
            .persist_delta(&config(), &status(1), &[event(1, 0)], None)
            .expect("persist");
        store
            .persist_delta(&config(), &status(2), &[event(2, 0)], Some(&snapshot(2)))
            .expect("persist");
        store
            .persist_delta(&config(), &status(3), &[event(3, 0)], None)
            .expect("persist");

        let slice = store.load_replay(&config().run_id).expect("replay");
        assert_eq!(slice.status.current_tick, 3);
        assert_eq!(slice.snapshot.as_ref().map(|s| s.tick), Some(2));
        assert_eq!(slice.events_after, vec![event(3, 0)]);
    }

    #[test]
    fn unknown_run_is_an_error() {
        let store = SqliteRunStore::open_in_memory().expect("open");
        assert!(matches!(
            store.load_config("run_missing"),
            Err(PersistenceError::RunNotFound(_))
        ));
    }
}
