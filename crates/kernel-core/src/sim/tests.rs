use super::*;
use contracts::EventType;

fn quick_config() -> RunConfig {
    RunConfig {
        duration_days: 1,
        ..RunConfig::default()
    }
}

fn bootstrapped(seed: u64) -> Simulation {
    let config = RunConfig {
        seed,
        ..quick_config()
    };
    Simulation::bootstrap(config, OracleClient::scripted(seed)).expect("bootstrap")
}

#[test]
fn step_advances_the_clock_and_processes_every_agent() {
    let mut sim = bootstrapped(1337);
    assert!(sim.step());
    assert_eq!(sim.status().current_tick, 1);
    assert_eq!(sim.last_step_metrics().processed_agents, 3);
    assert_eq!(sim.last_step_metrics().advanced_ticks, 1);
}

#[test]
fn identical_seeds_replay_identically() {
    let mut first = bootstrapped(99);
    // The worker pool must not change a single decision.
    let mut second = bootstrapped(99)
        .with_retrieval_engine(RetrievalEngine::with_worker_threads(
            RetrievalConfig::default(),
            4,
        ));
    first.step_n(40);
    second.step_n(40);
    assert_eq!(first.state_hash(), second.state_hash());
    assert_eq!(first.events().len(), second.events().len());
    for (name, persona) in first.agents() {
        let twin = second.agent(name).expect("same roster");
        assert_eq!(twin.scratch.tile, persona.scratch.tile, "{name} diverged");
        assert_eq!(twin.memory.len(), persona.memory.len());
    }
}

#[test]
fn agents_stay_in_bounds_and_off_walls() {
    let mut sim = bootstrapped(7);
    for _ in 0..60 {
        sim.step();
        for (name, persona) in sim.agents() {
            let tile = persona.scratch.tile;
            assert!(
                !sim.world().is_collision(tile),
                "{name} standing in a wall at {tile}"
            );
        }
    }
}

#[test]
fn memories_accumulate_and_events_are_logged() {
    let mut sim = bootstrapped(21);
    sim.step_n(30);
    let total_nodes: usize = sim.agents().values().map(|persona| persona.memory.len()).sum();
    assert!(total_nodes > 0, "nobody remembered anything in 30 ticks");
    assert!(sim
        .events()
        .iter()
        .any(|event| event.event_type == EventType::EventPerceived));
    assert!(sim
        .events()
        .iter()
        .any(|event| event.event_type == EventType::ScheduleAdopted));
    // Every event id is unique.
    let mut ids = sim.events().iter().map(|e| e.event_id.as_str()).collect::<Vec<_>>();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), sim.events().len());
}

#[test]
fn presence_events_follow_the_agents() {
    let mut sim = bootstrapped(5);
    sim.step_n(25);
    for (name, persona) in sim.agents() {
        let tile = sim.world().tile_at(persona.scratch.tile).expect("tile");
        assert!(
            tile.events().any(|event| event.subject == *name),
            "{name} left no presence event on its tile"
        );
    }
}

#[test]
fn run_completes_and_pauses_at_max_ticks() {
    let config = RunConfig {
        duration_days: 1,
        seconds_per_tick: 3_600,
        ..RunConfig::default()
    };
    let mut sim = Simulation::bootstrap(config, OracleClient::scripted(3)).expect("bootstrap");
    let committed = sim.run_to_tick(1_000);
    assert_eq!(committed, 24);
    assert!(sim.status().is_complete());
    assert_eq!(sim.status().mode, RunMode::Paused);
    assert!(!sim.step());
}

#[test]
fn snapshot_restore_resumes_identically() {
    let mut original = bootstrapped(42);
    original.step_n(30);
    let snapshot = original.snapshot_for_current_tick();

    let config = RunConfig {
        seed: 42,
        ..quick_config()
    };
    let mut restored = Simulation::restore(
        config,
        &demo_world_source(),
        OracleClient::scripted(42),
        &snapshot,
    )
    .expect("restore");

    assert_eq!(restored.status().current_tick, 30);
    assert_eq!(restored.agents(), original.agents());
    assert_eq!(restored.state_hash(), original.state_hash());

    original.step_n(15);
    restored.step_n(15);
    assert_eq!(restored.state_hash(), original.state_hash());
    assert_eq!(restored.agents(), original.agents());
}

#[test]
fn snapshot_json_round_trips() {
    let mut sim = bootstrapped(11);
    sim.step_n(10);
    let snapshot = sim.snapshot_for_current_tick();
    let json = serde_json::to_string(&snapshot).expect("serialize");
    let decoded: contracts::Snapshot = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(decoded, snapshot);
}

#[test]
fn restore_rejects_the_wrong_run() {
    let mut sim = bootstrapped(13);
    sim.step_n(5);
    let snapshot = sim.snapshot_for_current_tick();
    let other_config = RunConfig {
        run_id: "run_other_002".to_string(),
        ..quick_config()
    };
    let err = Simulation::restore(
        other_config,
        &demo_world_source(),
        OracleClient::scripted(13),
        &snapshot,
    )
    .unwrap_err();
    assert!(matches!(err, RestoreError::RunMismatch { .. }));
}

#[test]
fn clock_arithmetic() {
    let clock = GameClock {
        seconds_per_tick: 60,
    };
    assert_eq!(clock.now(10), 600);
    assert_eq!(clock.day(1_440), 1);
    assert_eq!(clock.minute_of_day(90), 90);
    assert_eq!(clock.timestamp(61), "d000T01:01:00");
}

#[test]
fn seeded_mixing_is_stable_and_spread() {
    assert_eq!(mix_seed(1, 2), mix_seed(1, 2));
    assert_ne!(mix_seed(1, 2), mix_seed(1, 3));
    assert_ne!(stable_text_hash("Ada"), stable_text_hash("Bo"));
    for stream in 0..50 {
        let sample = sample_range_i64(77, stream, -5, 5);
        assert!((-5..=5).contains(&sample));
    }
}
