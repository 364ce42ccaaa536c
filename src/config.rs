//! Typed configuration for the queue and the image loader.
//!
//! Every setting has a default; environment variables override them. Values that
//! are present but unusable fail fast with a `ConfigError`.

use crate::error::ConfigError;

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use tracing::info;

pub const DEFAULT_QUEUE_NAME: &str = "thumbnail_queue";
pub const DEFAULT_CONCURRENCY_LIMIT: usize = 10;
pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
  pub name: String,
  pub concurrency_limit: usize,
}

impl Default for QueueConfig {
  fn default() -> Self {
    Self {
      name: DEFAULT_QUEUE_NAME.to_string(),
      concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
    }
  }
}

/// How the loader treats a failed fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Retries after the first attempt; `0` disables retrying.
  pub max_retries: u32,
  pub retry_delay: Duration,
  /// Bound on one attempt, measured from the moment it is dispatched.
  pub request_timeout: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_retries: 3,
      retry_delay: Duration::from_secs(1),
      request_timeout: Duration::from_secs(100),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderConfig {
  pub base_url: String,
  pub queue: QueueConfig,
  pub retry: RetryPolicy,
}

impl Default for LoaderConfig {
  fn default() -> Self {
    Self {
      base_url: DEFAULT_BASE_URL.to_string(),
      queue: QueueConfig::default(),
      retry: RetryPolicy::default(),
    }
  }
}

impl LoaderConfig {
  /// Loads configuration from the process environment.
  pub fn from_env() -> Result<Self, ConfigError> {
    Self::from_lookup(|key| std::env::var(key).ok())
  }

  /// Loads configuration through an arbitrary key lookup.
  pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
    let defaults = Self::default();

    let concurrency_limit: usize = parse_or(
      &lookup,
      "PHOTOFRAME_QUEUE_CONCURRENCY",
      defaults.queue.concurrency_limit,
    )?;
    if concurrency_limit == 0 {
      return Err(ConfigError::Invalid {
        key: "PHOTOFRAME_QUEUE_CONCURRENCY",
        value: "0".to_string(),
        reason: "must be at least 1".to_string(),
      });
    }

    let retry_delay_ms: u64 = parse_or(
      &lookup,
      "PHOTOFRAME_RETRY_DELAY_MS",
      duration_ms(defaults.retry.retry_delay),
    )?;
    let request_timeout_ms: u64 = parse_or(
      &lookup,
      "PHOTOFRAME_REQUEST_TIMEOUT_MS",
      duration_ms(defaults.retry.request_timeout),
    )?;

    Ok(Self {
      base_url: string_or(&lookup, "PHOTOFRAME_BASE_URL", defaults.base_url),
      queue: QueueConfig {
        name: string_or(&lookup, "PHOTOFRAME_QUEUE_NAME", defaults.queue.name),
        concurrency_limit,
      },
      retry: RetryPolicy {
        max_retries: parse_or(&lookup, "PHOTOFRAME_MAX_RETRIES", defaults.retry.max_retries)?,
        retry_delay: Duration::from_millis(retry_delay_ms),
        request_timeout: Duration::from_millis(request_timeout_ms),
      },
    })
  }
}

fn duration_ms(duration: Duration) -> u64 {
  u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn string_or(lookup: &impl Fn(&str) -> Option<String>, key: &'static str, default: String) -> String {
  lookup(key).unwrap_or_else(|| {
    info!("{key} not set, using default: {default}");
    default
  })
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &'static str, default: T) -> Result<T, ConfigError>
where
  T: FromStr + Display,
  T::Err: Display,
{
  match lookup(key) {
    Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
      key,
      value: raw.clone(),
      reason: e.to_string(),
    }),
    None => {
      info!("{key} not set, using default: {default}");
      Ok(default)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;

  fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
      .iter()
      .map(|(k, v)| (k.to_string(), v.to_string()))
      .collect();
    move |key| map.get(key).cloned()
  }

  #[test]
  fn test_defaults_when_nothing_is_set() {
    let config = LoaderConfig::from_lookup(|_| None).unwrap();
    assert_eq!(config, LoaderConfig::default());
    assert_eq!(config.queue.concurrency_limit, 10);
    assert_eq!(config.retry.max_retries, 3);
    assert_eq!(config.retry.request_timeout, Duration::from_secs(100));
  }

  #[test]
  fn test_overrides_are_applied() {
    let config = LoaderConfig::from_lookup(lookup_from(&[
      ("PHOTOFRAME_BASE_URL", "http://frame.local:8080"),
      ("PHOTOFRAME_QUEUE_NAME", "grid"),
      ("PHOTOFRAME_QUEUE_CONCURRENCY", " 3 "),
      ("PHOTOFRAME_MAX_RETRIES", "0"),
      ("PHOTOFRAME_RETRY_DELAY_MS", "250"),
      ("PHOTOFRAME_REQUEST_TIMEOUT_MS", "5000"),
    ]))
    .unwrap();

    assert_eq!(config.base_url, "http://frame.local:8080");
    assert_eq!(config.queue.name, "grid");
    assert_eq!(config.queue.concurrency_limit, 3);
    assert_eq!(config.retry.max_retries, 0);
    assert_eq!(config.retry.retry_delay, Duration::from_millis(250));
    assert_eq!(config.retry.request_timeout, Duration::from_secs(5));
  }

  #[test]
  fn test_unparsable_value_is_rejected() {
    let err = LoaderConfig::from_lookup(lookup_from(&[("PHOTOFRAME_MAX_RETRIES", "lots")])).unwrap_err();
    match err {
      ConfigError::Invalid { key, value, .. } => {
        assert_eq!(key, "PHOTOFRAME_MAX_RETRIES");
        assert_eq!(value, "lots");
      }
    }
  }

  #[test]
  fn test_zero_concurrency_is_rejected() {
    let err = LoaderConfig::from_lookup(lookup_from(&[("PHOTOFRAME_QUEUE_CONCURRENCY", "0")])).unwrap_err();
    assert!(matches!(
      err,
      ConfigError::Invalid {
        key: "PHOTOFRAME_QUEUE_CONCURRENCY",
        ..
      }
    ));
  }
}
