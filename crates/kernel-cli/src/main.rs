use std::env;
use std::process::ExitCode;

use contracts::RunConfig;
use kernel_api::EngineApi;

fn print_usage() {
    println!("kernel-cli <command>");
    println!("commands:");
    println!("  status");
    println!("  step [n]");
    println!("  simulate <run_id> <seed> [ticks] [sqlite_path]");
    println!("    runs the built-in scenario deterministically and persists to sqlite");
    println!("  resume <run_id> <ticks> [sqlite_path]");
    println!("    restores a persisted run and advances it");
}

fn parse_u64(value: Option<&String>, label: &str) -> Result<u64, String> {
    let raw = value.ok_or_else(|| format!("missing {label}"))?;
    raw.parse::<u64>()
        .map_err(|_| format!("invalid {label}: {raw}"))
}

fn default_sqlite_path() -> String {
    env::var("HEARTHVALE_SQLITE_PATH")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| "hearthvale_runs.sqlite".to_string())
}

fn parse_sqlite_path(value: Option<&String>) -> String {
    value
        .map(String::to_string)
        .filter(|path| !path.trim().is_empty())
        .unwrap_or_else(default_sqlite_path)
}

fn config_for(run_id: &str, seed: u64, target_tick: u64) -> RunConfig {
    let mut config = RunConfig::default();
    config.run_id = run_id.to_string();
    config.seed = seed;
    let ticks_per_day = config.ticks_per_day();
    config.duration_days = (target_tick.div_ceil(ticks_per_day)).max(1) as u32;
    config
}

fn print_summary(api: &EngineApi) {
    println!("{}", api.status());
    let metrics = api.last_step_metrics();
    println!(
        "agents={} events_logged={} nodes_last_step={}",
        api.simulation().agents().len(),
        api.simulation().events().len(),
        metrics.nodes_recorded,
    );
    for (name, persona) in api.simulation().agents() {
        println!(
            "  {name}: tile={} memories={} doing={}",
            persona.scratch.tile,
            persona.memory.len(),
            persona.scratch.action_description,
        );
    }
    if let Some(error) = api.last_persistence_error() {
        println!("warning: persistence degraded: {error}");
    }
}

fn run_status() -> Result<(), String> {
    let api = EngineApi::bootstrap(RunConfig::default())
        .map_err(|err| format!("failed to bootstrap: {err}"))?;
    print_summary(&api);
    Ok(())
}

fn run_step(args: &[String]) -> Result<(), String> {
    let steps = match args.get(2) {
        Some(raw) => parse_u64(Some(raw), "step count")?,
        None => 1,
    };
    let mut api = EngineApi::bootstrap(RunConfig::default())
        .map_err(|err| format!("failed to bootstrap: {err}"))?;
    let committed = api.step(steps);
    println!("committed {committed} tick(s)");
    print_summary(&api);
    Ok(())
}

fn run_simulate(args: &[String]) -> Result<(), String> {
    let run_id = args
        .get(2)
        .cloned()
        .ok_or_else(|| "missing run_id".to_string())?;
    let seed = parse_u64(args.get(3), "seed")?;
    let target_tick = match args.get(4) {
        Some(raw) => parse_u64(Some(raw), "ticks")?,
        None => 720,
    };
    let sqlite_path = parse_sqlite_path(args.get(5));

    let mut api = EngineApi::bootstrap(config_for(&run_id, seed, target_tick))
        .map_err(|err| format!("failed to bootstrap: {err}"))?;
    api.attach_sqlite_store(&sqlite_path)
        .map_err(|err| format!("failed to attach sqlite store: {err}"))?;
    let committed = api.run_to_tick(target_tick);
    println!("committed {committed} tick(s), persisted to {sqlite_path}");
    print_summary(&api);
    Ok(())
}

fn run_resume(args: &[String]) -> Result<(), String> {
    let run_id = args
        .get(2)
        .cloned()
        .ok_or_else(|| "missing run_id".to_string())?;
    let steps = parse_u64(args.get(3), "ticks")?;
    let sqlite_path = parse_sqlite_path(args.get(4));

    let mut api = EngineApi::resume_demo_run(&sqlite_path, &run_id)
        .map_err(|err| format!("failed to resume: {err}"))?;
    let committed = api.step(steps);
    println!("resumed {run_id}, committed {committed} tick(s)");
    print_summary(&api);
    Ok(())
}

fn main() -> ExitCode {
    let args = env::args().collect::<Vec<_>>();
    let result = match args.get(1).map(String::as_str) {
        Some("status") => run_status(),
        Some("step") => run_step(&args),
        Some("simulate") => run_simulate(&args),
        Some("resume") => run_resume(&args),
        _ => {
            print_usage();
            return ExitCode::SUCCESS;
        }
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            print_usage();
            ExitCode::FAILURE
        }
    }
}
