//! Retry/backoff policy for the transport wrapper, grounded on
//! `ai-gateway::config::retry::RetryConfig` and its use in
//! `control_plane::websocket::connect_with_retry` — same two-variant shape,
//! same `backon` builders, adapted from websocket reconnect to bounded HTTP
//! request retry.

use std::time::Duration;

use backon::{BackoffBuilder, ConstantBuilder, ExponentialBuilder};

pub(crate) const DEFAULT_RETRY_FACTOR: f32 = 2.0;

#[derive(Debug, Clone, PartialEq)]
pub enum RetryConfig {
    Exponential {
        min_delay: Duration,
        max_delay: Duration,
        max_retries: u8,
        factor: f32,
    },
    Constant {
        delay: Duration,
        max_retries: u8,
    },
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::Exponential {
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: 3,
            factor: DEFAULT_RETRY_FACTOR,
        }
    }
}

impl RetryConfig {
    /// Returns a fresh backoff iterator yielding the delay before each
    /// successive retry attempt: monotonically non-decreasing, bounded by
    /// `max_retries`.
    #[must_use]
    pub(crate) fn as_iterator(&self) -> Box<dyn Iterator<Item = Duration> + Send + Sync> {
        match self {
            Self::Exponential { min_delay, max_delay, max_retries, factor } => {
                let backoff = ExponentialBuilder::default()
                    .with_min_delay(*min_delay)
                    .with_max_delay(*max_delay)
                    .with_max_times(usize::from(*max_retries))
                    .with_factor(*factor)
                    .with_jitter()
                    .build();
                Box::new(backoff)
            }
            Self::Constant { delay, max_retries } => {
                let backoff = ConstantBuilder::default()
                    .with_delay(*delay)
                    .with_max_times(usize::from(*max_retries))
                    .build();
                Box::new(backoff)
            }
        }
    }
}
