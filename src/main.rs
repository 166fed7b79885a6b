//! random_walk - lock-step random walk against a table store
//!
//! ```text
//! ┌──────────┐    ┌──────────────┐    ┌──────────────┐    ┌─────────────┐
//! │  Config  │───▶│     Dice     │───▶│ Coordinator  │───▶│ TableStore  │
//! │  (YAML)  │    │ (seeded once)│    │ (N workers)  │    │ (mem / TD)  │
//! └──────────┘    └──────────────┘    └──────────────┘    └─────────────┘
//! ```
//!
//! Flags:
//! - `--env`, `-e <name>`: config file `config/<name>.yaml` (default `dev`)
//! - `--workers <n>`, `--steps <n>`, `--seed <n>`: override the harness shape
//! - `--overlapped`: fire-and-yield release instead of synchronous release
//! - `--tdengine <dsn>`: walk against TDengine instead of the in-memory store
//! - `--report <path>`: write the run report as JSON

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};

use random_walk::config::AppConfig;
use random_walk::harness::{ReleaseMode, RunReport, StepCoordinator};
use random_walk::persistence::TDengineTableStore;
use random_walk::random::{Dice, DrawSource};
use random_walk::work::{
    MemoryTableStore, RandomWorkSelector, TableStore, WalkState, standard_payloads,
};

// ============================================================
// ARGUMENTS
// ============================================================

fn get_flag_value(names: &[&str]) -> Option<String> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if names.contains(&args[i].as_str()) && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
    }
    None
}

fn has_flag(name: &str) -> bool {
    std::env::args().any(|a| a == name)
}

fn get_env() -> String {
    get_flag_value(&["--env", "-e"]).unwrap_or_else(|| "dev".to_string())
}

fn parse_flag<T: std::str::FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match get_flag_value(&[name]) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("Invalid value for {}: {} ({})", name, raw, e)),
        None => Ok(None),
    }
}

/// Apply command-line overrides on top of the YAML config.
fn apply_overrides(config: &mut AppConfig) -> Result<()> {
    if let Some(workers) = parse_flag::<usize>("--workers")? {
        config.harness.workers = workers;
    }
    if let Some(steps) = parse_flag::<usize>("--steps")? {
        config.harness.steps = steps;
    }
    if let Some(seed) = parse_flag::<u64>("--seed")? {
        config.harness.seed = seed;
    }
    if has_flag("--overlapped") {
        config.harness.release_mode = ReleaseMode::Overlapped;
    }
    if let Some(dsn) = get_flag_value(&["--tdengine"]) {
        config.persistence.enabled = true;
        config.persistence.tdengine_dsn = dsn;
    }
    Ok(())
}

// ============================================================
// RUN
// ============================================================

fn open_store(config: &AppConfig) -> Result<Arc<dyn TableStore>> {
    if config.persistence.enabled {
        let store = TDengineTableStore::connect(
            &config.persistence.tdengine_dsn,
            &config.persistence.database,
        )?;
        tracing::info!(database = store.database(), "[Persistence] Using TDengine table store");
        Ok(Arc::new(store))
    } else {
        tracing::info!("[Persistence] Disabled, using in-memory table store");
        Ok(Arc::new(MemoryTableStore::new()))
    }
}

fn run(config: &AppConfig) -> Result<RunReport> {
    let harness = &config.harness;

    // Seed exactly once, before anything can draw
    let dice: Arc<dyn DrawSource> =
        Arc::new(Dice::with_seed(harness.seed).context("Failed to seed dice")?);

    let store = open_store(config)?;
    store.prepare().context("Failed to prepare table store")?;

    let state = Arc::new(WalkState::new(store.clone()));
    let selector = Arc::new(RandomWorkSelector::new(
        dice.clone(),
        standard_payloads(&state),
    ));

    let report = StepCoordinator::new(harness.workers, harness.steps, dice, selector)?
        .with_release_mode(harness.release_mode)
        .with_barrier_timeout(harness.barrier_timeout())
        .run()?;

    tracing::info!(
        live_tables = state.live_count(),
        "Finished running thread pool"
    );
    store.close()?;
    Ok(report)
}

fn write_report(report: &RunReport, path: &str) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write report: {}", path))?;
    tracing::info!("Run report written to {}", path);
    Ok(())
}

fn main() -> ExitCode {
    let env = get_env();
    let mut app_config = match AppConfig::load(&env) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {:#}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = apply_overrides(&mut app_config) {
        eprintln!("❌ {:#}", e);
        return ExitCode::FAILURE;
    }
    let _log_guard = random_walk::logging::init_logging(&app_config);

    tracing::info!(
        env = %env,
        workers = app_config.harness.workers,
        steps = app_config.harness.steps,
        seed = app_config.harness.seed,
        mode = ?app_config.harness.release_mode,
        "Starting random walk"
    );

    let report = match run(&app_config) {
        Ok(report) => report,
        Err(e) => {
            tracing::error!("Random walk failed: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    for round in &report.rounds {
        println!("step {:>3}: wake order {:?}", round.step, round.wake_order);
    }
    println!(
        "✅ {} workers x {} steps, {} payloads in {:?}",
        report.workers,
        report.steps,
        report.total_executed(),
        report.elapsed
    );

    if let Some(path) = get_flag_value(&["--report"]) {
        if let Err(e) = write_report(&report, &path) {
            tracing::error!("{:#}", e);
            return ExitCode::FAILURE;
        }
    }
    ExitCode::SUCCESS
}
