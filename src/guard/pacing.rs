use std::time::Duration;

use rand::Rng;

use crate::config::PacingConfig;

/// Randomized pauses the bot frontend sleeps between automation steps, so
/// the driven UI sees human-paced input instead of machine-speed bursts.
#[derive(Debug, Clone)]
pub struct HumanPacing {
    min_ms: u64,
    max_ms: u64,
}

impl HumanPacing {
    pub fn new(config: &PacingConfig) -> Self {
        HumanPacing {
            min_ms: config.min_delay_ms,
            // Config validation rejects an inverted range; the clamp keeps
            // sample total regardless.
            max_ms: config.max_delay_ms.max(config.min_delay_ms),
        }
    }

    pub fn sample(&self) -> Duration {
        let ms = rand::thread_rng().gen_range(self.min_ms..=self.max_ms);
        Duration::from_millis(ms)
    }
}
