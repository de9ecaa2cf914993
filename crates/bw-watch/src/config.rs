use std::sync::Arc;
use std::time::Duration;

use bw_lister::{KeyFilter, Lister, ObjectSource, DEFAULT_MAX_PAGES};
use bw_notify::{Notifier, RetryPolicy, Sink, DEFAULT_CONCURRENCY};
use serde::{Deserialize, Serialize};

use crate::error::{WatchError, WatchResult};

/// Longest accepted poll interval: one week.
pub const MAX_POLL_INTERVAL_SECS: u64 = 7 * 24 * 60 * 60;
/// Longest accepted cycle timeout: one day.
pub const MAX_CYCLE_TIMEOUT_SECS: u64 = 24 * 60 * 60;

/// Tuning for one watch loop.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Time between cycle starts.
    pub poll_interval_secs: u64,
    /// Budget for listing plus delivery in one cycle.
    pub cycle_timeout_secs: u64,
    /// Retry policy for each delivered event.
    pub retry: RetryPolicy,
    /// Keys delivered concurrently.
    pub concurrency: usize,
    /// Page budget for one listing.
    pub max_pages: usize,
    /// Emit every object as `Added` when no snapshot is stored yet, instead
    /// of silently committing a baseline.
    pub emit_initial: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 300,
            cycle_timeout_secs: 120,
            retry: RetryPolicy::default(),
            concurrency: DEFAULT_CONCURRENCY,
            max_pages: DEFAULT_MAX_PAGES,
            emit_initial: false,
        }
    }
}

impl WatchConfig {
    /// The poll interval, clamped to `1..=MAX_POLL_INTERVAL_SECS` seconds.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.clamp(1, MAX_POLL_INTERVAL_SECS))
    }

    /// The cycle timeout, clamped to `1..=MAX_CYCLE_TIMEOUT_SECS` seconds.
    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_secs(self.cycle_timeout_secs.clamp(1, MAX_CYCLE_TIMEOUT_SECS))
    }

    pub fn validate(&self) -> WatchResult<()> {
        if self.poll_interval_secs == 0 {
            return Err(WatchError::Config("poll interval must be positive".into()));
        }
        if self.poll_interval_secs > MAX_POLL_INTERVAL_SECS {
            return Err(WatchError::Config(format!(
                "poll interval {}s exceeds the maximum of {MAX_POLL_INTERVAL_SECS}s",
                self.poll_interval_secs
            )));
        }
        if self.cycle_timeout_secs == 0 {
            return Err(WatchError::Config("cycle timeout must be positive".into()));
        }
        if self.cycle_timeout_secs > MAX_CYCLE_TIMEOUT_SECS {
            return Err(WatchError::Config(format!(
                "cycle timeout {}s exceeds the maximum of {MAX_CYCLE_TIMEOUT_SECS}s",
                self.cycle_timeout_secs
            )));
        }
        if self.concurrency == 0 {
            return Err(WatchError::Config("concurrency must be positive".into()));
        }
        if self.max_pages == 0 {
            return Err(WatchError::Config("max pages must be positive".into()));
        }
        self.retry.validate().map_err(WatchError::Config)
    }

    /// A lister over `source` honouring this config's page budget.
    pub fn lister(&self, source: Arc<dyn ObjectSource>, filter: KeyFilter) -> Lister {
        Lister::new(source)
            .with_filter(filter)
            .with_max_pages(self.max_pages)
    }

    /// A notifier for `sink` with this config's retry policy and fan-out.
    pub fn notifier(&self, sink: Arc<dyn Sink>) -> Notifier {
        Notifier::new(sink, self.retry.clone()).with_concurrency(self.concurrency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = WatchConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(300));
        assert_eq!(config.cycle_timeout(), Duration::from_secs(120));
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.max_pages, 100_000);
        assert!(!config.emit_initial);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: WatchConfig = toml::from_str(
            r#"
            poll_interval_secs = 30
            [retry]
            max_attempts = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.poll_interval_secs, 30);
        assert_eq!(config.cycle_timeout_secs, 120);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.initial_backoff_ms, 500);
    }

    #[test]
    fn zero_values_are_rejected() {
        let zero_poll = WatchConfig {
            poll_interval_secs: 0,
            ..Default::default()
        };
        assert!(zero_poll.validate().is_err());

        let zero_attempts = WatchConfig {
            retry: RetryPolicy::default().with_max_attempts(0),
            ..Default::default()
        };
        assert!(matches!(zero_attempts.validate(), Err(WatchError::Config(_))));
    }

    #[test]
    fn oversized_durations_are_rejected() {
        let config: WatchConfig = toml::from_str("cycle_timeout_secs = 9223372036854775807").unwrap();
        assert!(matches!(config.validate(), Err(WatchError::Config(_))));

        let config: WatchConfig = toml::from_str("poll_interval_secs = 9223372036854775807").unwrap();
        assert!(matches!(config.validate(), Err(WatchError::Config(_))));

        let unchecked = WatchConfig {
            poll_interval_secs: 0,
            cycle_timeout_secs: u64::MAX,
            ..Default::default()
        };
        assert_eq!(unchecked.poll_interval(), Duration::from_secs(1));
        assert_eq!(unchecked.cycle_timeout(), Duration::from_secs(MAX_CYCLE_TIMEOUT_SECS));

        let at_limit = WatchConfig {
            poll_interval_secs: MAX_POLL_INTERVAL_SECS,
            cycle_timeout_secs: MAX_CYCLE_TIMEOUT_SECS,
            ..Default::default()
        };
        assert!(at_limit.validate().is_ok());
    }
}
