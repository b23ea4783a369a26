//! Simulates a handful of players drifting between active and idle.
//!
//! ```text
//! idle-sim [config.json] [--store totals.json] [--seconds 60]
//! ```
//!
//! Without a config file the demo shortens every interval so away
//! transitions show up within seconds. Totals go to a JSON file when
//! `--store` is given, otherwise they live in memory for the run.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use playclock::prelude::*;
use rand::Rng;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "idle-sim", about = "Simulated players drifting between active and idle")]
struct Args {
    /// JSON engine config. Defaults to short demo intervals.
    config: Option<PathBuf>,

    /// Persist totals to this JSON file instead of memory
    #[arg(long)]
    store: Option<PathBuf>,

    /// How long to run before shutting down
    #[arg(long, default_value_t = 60)]
    seconds: u64,
}

fn demo_config() -> EngineConfig {
    EngineConfig {
        debug: true,
        away: AwayConfig {
            timeout: Duration::from_secs(6),
            cooldown: Duration::from_secs(1),
            sweep_interval: Duration::from_secs(2),
        },
        sync: SyncConfig {
            interval: Duration::from_secs(10),
            ..SyncConfig::default()
        },
        ..EngineConfig::default()
    }
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?),
        None => Ok(demo_config()),
    }
}

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

const PLAYERS: [(u64, &str); 4] = [(1, "alex"), (2, "steve"), (3, "kai"), (4, "noor")];

/// One simulated player: short bursts of activity, then the occasional
/// long pause that should trip the away timeout.
async fn play<G: PersistenceGateway>(engine: Arc<Engine<G>>, player_id: PlayerId, name: &str) {
    engine.on_session_begin(player_id, name).await;

    while engine.is_available() {
        let pause_ms = {
            let mut rng = rand::rng();
            if rng.random_bool(0.15) {
                rng.random_range(5_000..12_000)
            } else {
                rng.random_range(200..1_500)
            }
        };
        tokio::time::sleep(Duration::from_millis(pause_ms)).await;
        engine.on_qualifying_activity(player_id);
    }
}

fn log_totals<G: PersistenceGateway>(engine: &Engine<G>) {
    for view in engine.sessions() {
        tracing::info!(
            player_id = %view.player_id,
            name = %view.display_name,
            total_s = view.total_seconds,
            session_s = view.session_active_seconds,
            away = view.away,
            "engagement"
        );
    }
}

async fn simulate<G: PersistenceGateway>(
    config: EngineConfig,
    gateway: Arc<G>,
    run_for: Duration,
) -> ShutdownReport {
    let engine = Arc::new(EngineBuilder::new().config(config).build(gateway).await);

    let mut notices = engine.subscribe();
    tokio::spawn(async move {
        while let Some(notice) = notices.recv().await {
            let state = if notice.away { "away" } else { "back" };
            tracing::info!(player_id = %notice.player_id, "{state}");
        }
    });

    for (id, name) in PLAYERS {
        tokio::spawn(play(Arc::clone(&engine), PlayerId(id), name));
    }

    let deadline = tokio::time::sleep(run_for);
    tokio::pin!(deadline);
    let mut every = tokio::time::interval(Duration::from_secs(5));
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => break,
            _ = every.tick() => log_totals(&engine),
        }
    }

    log_totals(&engine);
    engine.shutdown().await
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;
    init_tracing(config.debug);

    let run_for = Duration::from_secs(args.seconds);
    let report = match args.store {
        Some(path) => {
            let gateway = Arc::new(JsonFileGateway::open(&path).await?);
            tracing::info!(path = %path.display(), "persisting totals to file");
            simulate(config, gateway, run_for).await
        }
        None => simulate(config, Arc::new(MemoryGateway::new()), run_for).await,
    };

    tracing::info!(
        saved = report.saved.len(),
        failed = report.failed.len(),
        lost = report.lost.len(),
        "simulation finished"
    );
    Ok(())
}
