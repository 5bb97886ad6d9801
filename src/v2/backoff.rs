use std::time::{Duration, Instant};

use rand::Rng;

/// Retry timing for transport round-trips.
///
/// Delays grow by `multiplier` from `initial_delay` up to `max_delay`,
/// each randomized by ±`jitter_factor`. Once `max_elapsed` has passed
/// since the first delay was handed out, the backoff is exhausted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub jitter_factor: f64,
    pub max_elapsed: Option<Duration>,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            multiplier: 1.5,
            jitter_factor: 0.5,
            max_elapsed: Some(Duration::from_secs(120)),
        }
    }
}

/// The running state of one retry sequence.
#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    config: BackoffConfig,
    current: Duration,
    started: Option<Instant>,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            current: config.initial_delay,
            started: None,
        }
    }

    /// Start a fresh retry sequence.
    pub fn reset(&mut self) {
        self.current = self.config.initial_delay;
        self.started = None;
    }

    /// The next delay to sleep before retrying, or `None` once
    /// `max_elapsed` is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        let started = *self.started.get_or_insert_with(Instant::now);

        if let Some(max_elapsed) = self.config.max_elapsed {
            if started.elapsed() > max_elapsed {
                return None;
            }
        }

        let jitter = self.config.jitter_factor.clamp(0.0, 1.0);
        let spread = 1.0 + jitter * (rand::thread_rng().gen::<f64>() * 2.0 - 1.0);
        let delay = self.current.mul_f64(spread);

        self.current = self
            .current
            .mul_f64(self.config.multiplier.max(1.0))
            .min(self.config.max_delay);

        Some(delay.min(self.config.max_delay))
    }
}
