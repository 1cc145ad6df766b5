//! Scheduler configuration and loaders.
use std::env;

use rand::SeedableRng;
use rand::rngs::StdRng;

/// Tunables for a [`Scheduler`](crate::Scheduler).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SchedulerConfig {
    /// Seed for timer jitter and for the shuffles of every tree created
    /// against the scheduler. `None` seeds from OS entropy.
    pub rng_seed: Option<u64>,
}

impl SchedulerConfig {
    pub const SEED_ENV: &'static str = "TICK_TREE_SEED";

    pub const fn new() -> Self {
        Self { rng_seed: None }
    }

    pub const fn with_seed(seed: u64) -> Self {
        Self {
            rng_seed: Some(seed),
        }
    }

    /// Construct configuration from process environment variables.
    ///
    /// Environment variables:
    /// - `TICK_TREE_SEED` - Deterministic RNG seed (default: OS entropy)
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.rng_seed = read_env::<u64>(Self::SEED_ENV);
        config
    }

    pub(crate) fn rng(&self) -> StdRng {
        match self.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}

fn read_env<T>(key: &str) -> Option<T>
where
    T: std::str::FromStr,
{
    env::var(key).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use rand::Rng;

    use super::*;

    #[test]
    fn seeded_configs_produce_identical_streams() {
        let mut a = SchedulerConfig::with_seed(42).rng();
        let mut b = SchedulerConfig::with_seed(42).rng();
        let xs: Vec<u32> = (0..8).map(|_| a.r#gen()).collect();
        let ys: Vec<u32> = (0..8).map(|_| b.r#gen()).collect();
        assert_eq!(xs, ys);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn deserializes_with_defaults() {
        let config: SchedulerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, SchedulerConfig::new());

        let config: SchedulerConfig = serde_json::from_str(r#"{"rng_seed": 5}"#).unwrap();
        assert_eq!(config, SchedulerConfig::with_seed(5));
    }
}
