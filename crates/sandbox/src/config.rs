//! Sandbox configuration.
use std::env;

use tick_tree::SchedulerConfig;

/// Host loop settings for the sandbox run.
#[derive(Clone, Debug)]
pub struct SandboxConfig {
    /// Number of frames to simulate.
    pub frames: u32,
    /// Seconds advanced per frame.
    pub frame_delta: f64,
    pub scheduler: SchedulerConfig,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            frames: 600,
            frame_delta: 1.0 / 60.0,
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl SandboxConfig {
    /// Construct sandbox configuration from environment variables.
    ///
    /// Environment variables:
    /// - `SANDBOX_FRAMES` - Frames to simulate (default: 600)
    /// - `SANDBOX_FPS` - Simulated frame rate (default: 60)
    /// - `TICK_TREE_SEED` - Deterministic RNG seed (default: OS entropy)
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(frames) = read_env::<u32>("SANDBOX_FRAMES") {
            config.frames = frames;
        }
        if let Some(fps) = read_env::<f64>("SANDBOX_FPS")
            && fps.is_finite()
            && fps > 0.0
        {
            config.frame_delta = 1.0 / fps;
        }
        config.scheduler = SchedulerConfig::from_env();

        config
    }
}

fn read_env<T>(key: &str) -> Option<T>
where
    T: std::str::FromStr,
{
    env::var(key).ok()?.parse().ok()
}
