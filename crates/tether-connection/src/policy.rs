use std::time::Duration;

use rand::Rng;
use tether_core::config::ReconnectConfig;

/// Capped exponential backoff for reconnect attempts.
///
/// Attempt `n` (1-based) waits `base * 2^(n-1)`, capped at `max`. With the
/// default 3 s base the schedule is 3 s, 6 s, 12 s, ... up to 120 s.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub base: Duration,
    pub max: Duration,
    /// Fraction of the delay added as random jitter (0.0 disables it).
    pub jitter: f64,
    /// Give up after this many consecutive attempts. `None` retries forever.
    pub max_attempts: Option<u32>,
    /// A connect call still pending after this long counts as `NetworkLost`.
    pub connect_timeout: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_config(&ReconnectConfig::default())
    }
}

impl ReconnectPolicy {
    pub fn from_config(config: &ReconnectConfig) -> Self {
        Self {
            base: Duration::from_millis(config.base_ms),
            max: Duration::from_millis(config.max_ms),
            jitter: config.jitter.clamp(0.0, 1.0),
            max_attempts: config.max_attempts,
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
        }
    }

    /// Deterministic delay before attempt `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        let factor = 1u32 << exp;
        self.base.saturating_mul(factor).min(self.max)
    }

    /// [`delay_for`](Self::delay_for) plus up to `jitter * delay` of random slack.
    pub fn jittered_delay_for(&self, attempt: u32) -> Duration {
        let delay = self.delay_for(attempt);
        if self.jitter <= 0.0 || delay.is_zero() {
            return delay;
        }
        let slack = delay.mul_f64(self.jitter * rand::thread_rng().gen::<f64>());
        delay + slack
    }

    /// Whether attempt number `attempt` may still run.
    pub fn allows(&self, attempt: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempt <= max)
    }
}
