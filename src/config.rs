//! Configuration for indexing jobs that drive the writer pool.
//!
//! A [`JobConfig`] is usually loaded from a JSON file and then overridden by
//! command-line flags. Missing fields fall back to their defaults:
//!
//! ```json
//! {
//!   "partitions": 4,
//!   "workers": 8,
//!   "key_field": "id",
//!   "batch_size": 500,
//!   "retry": { "max_attempts": 20, "initial_backoff_ms": 5 },
//!   "writer": { "auto_commit_threshold": 10000 }
//! }
//! ```

use std::path::Path;
use std::thread;
use std::time::Duration;

use log::debug;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{QuiverError, Result};
use crate::pool::PoolConfig;
use crate::writer::SegmentWriterConfig;

/// Caller-side retry policy for busy partitions.
///
/// The pool itself never waits; this is what a caller uses to poll
/// `check_out` with exponential backoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,

    /// Delay before the second attempt.
    pub initial_backoff_ms: u64,

    /// Upper bound for a single delay.
    pub max_backoff_ms: u64,

    /// Randomize each delay between half and the full value.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 50,
            initial_backoff_ms: 2,
            max_backoff_ms: 200,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Try once, no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to sleep after failed attempt number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(20);
        let base = self
            .initial_backoff_ms
            .saturating_mul(1u64 << exp)
            .min(self.max_backoff_ms);

        let millis = if self.jitter && base > 1 {
            rand::rng().random_range(base / 2..=base)
        } else {
            base
        };
        Duration::from_millis(millis)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempts run out. The last error is returned.
    pub fn run<T, F, R>(&self, mut op: F, retryable: R) -> Result<T>
    where
        F: FnMut() -> Result<T>,
        R: Fn(&QuiverError) -> bool,
    {
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_attempts && retryable(&e) => {
                    let delay = self.backoff(attempt);
                    debug!("attempt {attempt} failed ({e}); retrying in {delay:?}");
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(QuiverError::invalid_config(
                "retry.max_attempts must be at least 1",
            ));
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(QuiverError::invalid_config(
                "retry.initial_backoff_ms must not exceed retry.max_backoff_ms",
            ));
        }
        Ok(())
    }
}

/// Configuration of one indexing job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    /// Number of index partitions, i.e. writers.
    pub partitions: usize,

    /// Worker threads writing documents.
    pub workers: usize,

    /// Field whose value decides the partition; line order when unset.
    pub key_field: Option<String>,

    /// Documents a worker writes per check-out.
    pub batch_size: usize,

    /// Fsync segment files on every commit.
    pub sync_writes: bool,

    /// Retry policy for busy partitions.
    pub retry: RetryPolicy,

    /// Writer settings.
    pub writer: SegmentWriterConfig,

    /// Pool settings.
    pub pool: PoolConfig,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            partitions: 1,
            workers: num_cpus::get(),
            key_field: None,
            batch_size: 1000,
            sync_writes: false,
            retry: RetryPolicy::default(),
            writer: SegmentWriterConfig::default(),
            pool: PoolConfig::default(),
        }
    }
}

impl JobConfig {
    /// Load a configuration from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            QuiverError::invalid_config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: JobConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.partitions == 0 {
            return Err(QuiverError::invalid_config("partitions must be at least 1"));
        }
        if self.workers == 0 {
            return Err(QuiverError::invalid_config("workers must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(QuiverError::invalid_config("batch_size must be at least 1"));
        }
        if let Some(field) = &self.key_field
            && field.is_empty()
        {
            return Err(QuiverError::invalid_config("key_field must not be empty"));
        }
        self.retry.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config_is_valid() {
        let config = JobConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.partitions, 1);
        assert!(config.workers >= 1);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: JobConfig =
            serde_json::from_str(r#"{"partitions": 4, "retry": {"max_attempts": 3}}"#).unwrap();

        assert_eq!(config.partitions, 4);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.max_backoff_ms, 200);
        assert_eq!(config.batch_size, 1000);
        assert!(config.pool.close_on_drop);
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"partitions": 3, "key_field": "id"}}"#).unwrap();

        let config = JobConfig::from_file(file.path()).unwrap();
        assert_eq!(config.partitions, 3);
        assert_eq!(config.key_field.as_deref(), Some("id"));
    }

    #[test]
    fn test_validation_errors() {
        let config = JobConfig {
            partitions: 0,
            ..JobConfig::default()
        };
        assert!(matches!(config.validate(), Err(QuiverError::InvalidConfig(_))));

        let config = JobConfig {
            key_field: Some(String::new()),
            ..JobConfig::default()
        };
        assert!(config.validate().is_err());

        let retry = RetryPolicy {
            initial_backoff_ms: 500,
            max_backoff_ms: 10,
            ..RetryPolicy::default()
        };
        assert!(retry.validate().is_err());
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff_ms: 10,
            max_backoff_ms: 50,
            jitter: false,
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(10));
        assert_eq!(policy.backoff(2), Duration::from_millis(20));
        assert_eq!(policy.backoff(3), Duration::from_millis(40));
        assert_eq!(policy.backoff(4), Duration::from_millis(50));
        assert_eq!(policy.backoff(100), Duration::from_millis(50));

        let jittered = RetryPolicy {
            jitter: true,
            ..policy
        };
        let delay = jittered.backoff(3);
        assert!(delay >= Duration::from_millis(20) && delay <= Duration::from_millis(40));
    }

    #[test]
    fn test_run_retries_only_retryable_errors() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
            jitter: false,
        };

        let calls = Cell::new(0);
        let value = policy
            .run(
                || {
                    calls.set(calls.get() + 1);
                    if calls.get() < 3 {
                        Err(QuiverError::already_in_use("k"))
                    } else {
                        Ok(calls.get())
                    }
                },
                QuiverError::is_already_in_use,
            )
            .unwrap();
        assert_eq!(value, 3);

        calls.set(0);
        let result: Result<()> = policy.run(
            || {
                calls.set(calls.get() + 1);
                Err(QuiverError::not_found("k"))
            },
            QuiverError::is_already_in_use,
        );
        assert!(result.unwrap_err().is_not_found());
        assert_eq!(calls.get(), 1);

        calls.set(0);
        let result: Result<()> = policy.run(
            || {
                calls.set(calls.get() + 1);
                Err(QuiverError::already_in_use("k"))
            },
            QuiverError::is_already_in_use,
        );
        assert!(result.unwrap_err().is_already_in_use());
        assert_eq!(calls.get(), 5);
    }
}
