use std::time::Duration;

use pkg_constants::scheduler::*;
use pkg_types::config::SchedulerConfigFile;

/// Resolved scheduler tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub heads_limit: usize,
    pub max_attempts: u32,
    pub attempt_timeout: Duration,
    pub retry_backoff: Duration,
    pub cycle_timeout: Duration,
    pub cycle_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            heads_limit: DEFAULT_HEADS_LIMIT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            attempt_timeout: Duration::from_millis(DEFAULT_ATTEMPT_TIMEOUT_MS),
            retry_backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
            cycle_timeout: Duration::from_millis(DEFAULT_CYCLE_TIMEOUT_MS),
            cycle_interval: Duration::from_secs(DEFAULT_CYCLE_INTERVAL_SECS),
        }
    }
}

impl SchedulerConfig {
    /// Values from the config file, defaults for anything unset.
    /// Zero limits are raised to one so a cycle can always make progress.
    pub fn from_file(file: &SchedulerConfigFile) -> Self {
        let d = Self::default();
        Self {
            heads_limit: file.heads_limit.unwrap_or(d.heads_limit).max(1),
            max_attempts: file.max_attempts.unwrap_or(d.max_attempts).max(1),
            attempt_timeout: file
                .attempt_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(d.attempt_timeout),
            retry_backoff: file
                .retry_backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(d.retry_backoff),
            cycle_timeout: file
                .cycle_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(d.cycle_timeout),
            cycle_interval: file
                .cycle_interval_secs
                .map(|s| Duration::from_secs(s.max(1)))
                .unwrap_or(d.cycle_interval),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_values_use_defaults() {
        let config = SchedulerConfig::from_file(&SchedulerConfigFile::default());
        assert_eq!(config, SchedulerConfig::default());
        assert_eq!(config.heads_limit, 16);
        assert_eq!(config.attempt_timeout, Duration::from_secs(2));
    }

    #[test]
    fn file_values_override() {
        let file = SchedulerConfigFile {
            heads_limit: Some(0),
            max_attempts: Some(5),
            retry_backoff_ms: Some(10),
            cycle_interval_secs: Some(30),
            ..Default::default()
        };
        let config = SchedulerConfig::from_file(&file);
        assert_eq!(config.heads_limit, 1);
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.retry_backoff, Duration::from_millis(10));
        assert_eq!(config.cycle_interval, Duration::from_secs(30));
        assert_eq!(config.cycle_timeout, Duration::from_secs(10));
    }
}
