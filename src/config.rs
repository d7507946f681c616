use std::time::Duration;

use crate::correlate::SuspicionPolicy;
use crate::remote::SessionOptions;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);
pub const MIN_INTERVAL: Duration = Duration::from_millis(100);

/// Everything the refresh loop needs to know up front.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub interval: Duration,
    pub policy: SuspicionPolicy,
    pub session: SessionOptions,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            policy: SuspicionPolicy::default(),
            session: SessionOptions::default(),
        }
    }
}

impl EngineConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = clamp_interval(interval);
        self
    }

    pub fn with_cpu_threshold(mut self, threshold: f32) -> Self {
        self.policy.cpu_threshold = threshold;
        self
    }
}

pub fn clamp_interval(interval: Duration) -> Duration {
    interval.max(MIN_INTERVAL)
}
