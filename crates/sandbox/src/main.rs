//! Sandbox host for tick-tree.
//!
//! Plays the role of a game loop: builds a guard agent, registers it with a
//! scheduler and pumps `Scheduler::tick` at a fixed frame delta.
//!
//! ```bash
//! RUST_LOG=tick_tree=debug SANDBOX_FRAMES=1200 TICK_TREE_SEED=7 cargo run -p tick-tree-sandbox
//! ```
mod agent;
mod config;

use anyhow::Result;
use config::SandboxConfig;
use tick_tree::Scheduler;

/// Meters the intruder closes per sensor sweep.
const APPROACH_SPEED: f64 = 1.5;

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = SandboxConfig::from_env();
    tracing::info!(
        frames = config.frames,
        frame_delta = config.frame_delta,
        seed = ?config.scheduler.rng_seed,
        "starting sandbox"
    );

    let scheduler = Scheduler::with_config(config.scheduler.clone());
    let stats = agent::Stats::default();
    let guard = agent::build(&scheduler, &stats, APPROACH_SPEED)?;
    scheduler.register_tree(&guard)?;

    for _ in 0..config.frames {
        scheduler.tick(config.frame_delta);
    }

    tracing::info!(
        elapsed = scheduler.elapsed(),
        status = ?guard.borrow().status(),
        attacks = stats.attacks.get(),
        alerts = stats.alerts.get(),
        sweeps = stats.sensor_sweeps.get(),
        patrol_steps = stats.patrol_steps.get(),
        pooled_timers = scheduler.pooled_timers(),
        "sandbox finished"
    );

    scheduler.unregister_tree(guard.id())?;
    Ok(())
}
