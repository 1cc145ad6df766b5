//! A guard that patrols until an intruder comes close, then attacks on a
//! cooldown.
use std::cell::Cell;
use std::rc::Rc;

use anyhow::Result;
use tick_tree::builder::{action, cooldown, parallel, random_sequence, selector, sequence, service, task};
use tick_tree::{
    Blackboard, ChangeKind, CooldownConfig, Executor, Listener, Policy, Scheduler, ServiceConfig,
    Status, Tree, TreeHandle,
};

pub const DISTANCE_KEY: &str = "intruder_distance";
pub const ALERT_KEY: &str = "alert";

/// Engagement radius in meters.
const ATTACK_RANGE: f64 = 4.0;

/// Counters the host reads back after the run.
#[derive(Clone, Debug, Default)]
pub struct Stats {
    pub attacks: Rc<Cell<u32>>,
    pub patrol_steps: Rc<Cell<u32>>,
    pub sensor_sweeps: Rc<Cell<u32>>,
    pub alerts: Rc<Cell<u32>>,
}

/// Builds the guard tree and its blackboard.
///
/// The intruder walks toward the guard at `approach_speed` meters per sensor
/// sweep and retreats once it is hit.
pub fn build(scheduler: &Scheduler, stats: &Stats, approach_speed: f64) -> Result<TreeHandle> {
    let board = Blackboard::named("Guard", scheduler);
    board.set(DISTANCE_KEY, 20.0_f64);

    let alerts = Rc::clone(&stats.alerts);
    let alarm = Listener::new(move |kind, value| {
        let raised = value.and_then(|v| v.downcast_ref::<bool>()).copied();
        if kind != ChangeKind::Remove && raised == Some(true) {
            alerts.set(alerts.get() + 1);
            tracing::info!("alarm raised");
        }
    });
    board.register_listener(ALERT_KEY, &alarm);

    let sensor = {
        let board = board.clone();
        let sweeps = Rc::clone(&stats.sensor_sweeps);
        move || {
            sweeps.set(sweeps.get() + 1);
            let distance = board.get::<f64>(DISTANCE_KEY).unwrap_or(f64::INFINITY);
            let distance = (distance - approach_speed).max(0.0);
            board.set(DISTANCE_KEY, distance);
            board.set(ALERT_KEY, distance < ATTACK_RANGE);
        }
    };

    let in_range = {
        let board = board.clone();
        move || match board.get::<f64>(DISTANCE_KEY) {
            Some(distance) if distance < ATTACK_RANGE => Status::Success,
            _ => Status::Failure,
        }
    };

    let attack = {
        let board = board.clone();
        let attacks = Rc::clone(&stats.attacks);
        move || {
            attacks.set(attacks.get() + 1);
            tracing::info!(attacks = attacks.get(), "guard attacks");
            board.set(DISTANCE_KEY, 12.0_f64);
        }
    };

    let walk = {
        let steps = Rc::clone(&stats.patrol_steps);
        let mut remaining = 0_u32;
        move || {
            if remaining == 0 {
                remaining = 30;
            }
            remaining -= 1;
            steps.set(steps.get() + 1);
            if remaining == 0 {
                Status::Success
            } else {
                Status::Running
            }
        }
    };

    let root = service(
        "Sense",
        ServiceConfig::new(0.5).with_jitter(0.05),
        sensor,
        selector(
            "Root",
            [
                sequence(
                    "Engage",
                    [
                        task("InRange", in_range),
                        cooldown(
                            "AttackCooldown",
                            CooldownConfig::new(1.5).with_jitter(0.25),
                            action("Attack", attack),
                        )?,
                    ],
                ),
                parallel(
                    "Patrol",
                    Policy::SequenceContinue,
                    Executor::Remaining,
                    [
                        task("Walk", walk),
                        random_sequence(
                            "LookAround",
                            [
                                action("LookLeft", || tracing::debug!("looking left")),
                                action("LookRight", || tracing::debug!("looking right")),
                            ],
                        ),
                    ],
                ),
            ],
        ),
    )?;

    let tree = Tree::new("Guard", scheduler)
        .with_blackboard(board)
        .with_root(root)?
        .into_handle();
    Ok(tree)
}
