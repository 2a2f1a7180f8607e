//! Configuration for the sync engine.

use std::collections::HashMap;
use std::time::Duration;
use tether_protocol::{ResolutionStrategy, ResourceKind};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Additional attempts after the first failure.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound for the exponential delay (before jitter).
    pub max_delay: Duration,
    /// Jitter as a fraction of the computed delay, applied uniformly in
    /// `[-jitter_factor, +jitter_factor]`.
    pub jitter_factor: f64,
}

impl RetryConfig {
    /// Creates a retry configuration with the given attempt budget.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            jitter_factor: 0.25,
        }
    }

    /// A configuration that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter_factor: 0.0,
        }
    }

    /// Sets the base delay.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the jitter factor.
    pub fn with_jitter_factor(mut self, factor: f64) -> Self {
        self.jitter_factor = factor;
        self
    }

    /// Computes the backoff delay before retry number `attempt` (0-indexed:
    /// attempt 0 is the delay after the first failure).
    ///
    /// `delay = min(max_delay, base * 2^attempt)`, then jitter is added as
    /// `delay * jitter_factor * uniform(-1, 1)`, clamped at zero.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        use rand::Rng;

        let exponential = self.base_delay.as_secs_f64() * 2f64.powi(attempt.min(63) as i32);
        let capped = exponential.min(self.max_delay.as_secs_f64());

        let jittered = if self.jitter_factor > 0.0 {
            let unit: f64 = rand::thread_rng().gen_range(-1.0..=1.0);
            capped + capped * self.jitter_factor * unit
        } else {
            capped
        };

        Duration::from_secs_f64(jittered.max(0.0))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Configuration for the hub-spoke orchestrator.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// This device's id, sent with every backend call.
    pub device_id: String,
    /// Concurrency cap for in-flight table tasks.
    pub queue_concurrency: usize,
    /// Retry behavior for backend calls.
    pub retry: RetryConfig,
    /// Clock skew above this raises a warning event (never blocks syncing).
    pub skew_warn_threshold: Duration,
}

impl HubConfig {
    /// Creates a hub configuration for a device.
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            queue_concurrency: 3,
            retry: RetryConfig::default(),
            skew_warn_threshold: Duration::from_secs(5 * 60),
        }
    }

    /// Sets the concurrency cap.
    pub fn with_queue_concurrency(mut self, concurrency: usize) -> Self {
        self.queue_concurrency = concurrency;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the skew warning threshold.
    pub fn with_skew_warn_threshold(mut self, threshold: Duration) -> Self {
        self.skew_warn_threshold = threshold;
        self
    }
}

/// Configuration for the peer-to-peer engine.
#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// Interval between automatic full sync passes.
    pub sync_interval: Duration,
    /// Interval between offline-queue drains.
    pub queue_drain_interval: Duration,
    /// Attempts before a queue item becomes terminally failed.
    pub max_retry_count: u32,
    /// Strategy for kinds without an explicit entry.
    pub default_strategy: ResolutionStrategy,
    /// Per-kind strategy overrides.
    pub strategies: HashMap<ResourceKind, ResolutionStrategy>,
}

impl PeerConfig {
    /// Creates a peer configuration with the stock strategy table:
    /// knowledge, role, and settings resolve manually; member and project
    /// records resolve last-write-wins.
    pub fn new() -> Self {
        let mut strategies = HashMap::new();
        strategies.insert(ResourceKind::Knowledge, ResolutionStrategy::Manual);
        strategies.insert(ResourceKind::Member, ResolutionStrategy::Lww);
        strategies.insert(ResourceKind::Role, ResolutionStrategy::Manual);
        strategies.insert(ResourceKind::Settings, ResolutionStrategy::Manual);
        strategies.insert(ResourceKind::Project, ResolutionStrategy::Lww);

        Self {
            sync_interval: Duration::from_secs(30),
            queue_drain_interval: Duration::from_secs(10),
            max_retry_count: 5,
            default_strategy: ResolutionStrategy::Lww,
            strategies,
        }
    }

    /// Sets the automatic sync interval.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Sets the queue drain interval.
    pub fn with_queue_drain_interval(mut self, interval: Duration) -> Self {
        self.queue_drain_interval = interval;
        self
    }

    /// Sets the queue retry budget.
    pub fn with_max_retry_count(mut self, count: u32) -> Self {
        self.max_retry_count = count;
        self
    }

    /// Overrides the strategy for one resource kind.
    pub fn with_strategy(mut self, kind: ResourceKind, strategy: ResolutionStrategy) -> Self {
        self.strategies.insert(kind, strategy);
        self
    }

    /// Resolves the strategy for a resource kind.
    pub fn strategy_for(&self, kind: ResourceKind) -> ResolutionStrategy {
        self.strategies
            .get(&kind)
            .copied()
            .unwrap_or(self.default_strategy)
    }
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn delay_grows_exponentially_within_jitter_bounds() {
        let config = RetryConfig::new(5)
            .with_base_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(60))
            .with_jitter_factor(0.25);

        let d0 = config.delay_for_attempt(0);
        assert!(d0 >= Duration::from_millis(75));
        assert!(d0 <= Duration::from_millis(125));

        let d2 = config.delay_for_attempt(2);
        assert!(d2 >= Duration::from_millis(300));
        assert!(d2 <= Duration::from_millis(500));
    }

    #[test]
    fn delay_respects_max() {
        let config = RetryConfig::new(10)
            .with_base_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5))
            .with_jitter_factor(0.0);

        assert_eq!(config.delay_for_attempt(20), Duration::from_secs(5));
    }

    #[test]
    fn no_retry_config_has_zero_delay() {
        let config = RetryConfig::no_retry();
        assert_eq!(config.max_retries, 0);
        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);
    }

    #[test]
    fn strategy_table_defaults() {
        let config = PeerConfig::new();
        assert_eq!(
            config.strategy_for(ResourceKind::Knowledge),
            ResolutionStrategy::Manual
        );
        assert_eq!(
            config.strategy_for(ResourceKind::Member),
            ResolutionStrategy::Lww
        );
        assert_eq!(
            config.strategy_for(ResourceKind::Role),
            ResolutionStrategy::Manual
        );
        assert_eq!(
            config.strategy_for(ResourceKind::Settings),
            ResolutionStrategy::Manual
        );
        assert_eq!(
            config.strategy_for(ResourceKind::Project),
            ResolutionStrategy::Lww
        );
    }

    #[test]
    fn strategy_override() {
        let config =
            PeerConfig::new().with_strategy(ResourceKind::Knowledge, ResolutionStrategy::Lww);
        assert_eq!(
            config.strategy_for(ResourceKind::Knowledge),
            ResolutionStrategy::Lww
        );
    }

    proptest! {
        #[test]
        fn delay_is_always_within_bounds(
            attempt in 0u32..8,
            base_ms in 1u64..500,
            jitter in 0.0f64..1.0,
        ) {
            let config = RetryConfig::new(8)
                .with_base_delay(Duration::from_millis(base_ms))
                .with_max_delay(Duration::from_secs(3600))
                .with_jitter_factor(jitter);

            let expected = (base_ms as f64 / 1000.0) * 2f64.powi(attempt as i32);
            let delay = config.delay_for_attempt(attempt).as_secs_f64();

            prop_assert!(delay >= (expected * (1.0 - jitter)).max(0.0) - 1e-9);
            prop_assert!(delay <= expected * (1.0 + jitter) + 1e-9);
        }
    }
}
