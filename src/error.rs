use std::time::Duration;

use thiserror::Error;

/// Errors produced by the `RequestQueue` itself.
///
/// A task's own failure is never one of these: it travels inside the task's
/// output type and reaches the caller untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
  #[error("Request cancelled by queue clear")]
  ClearedBeforeStart,

  #[error("Submitted task panicked")]
  TaskPanicked,

  #[error("Task result channel closed before an outcome was delivered: {0}")]
  ResultChannelError(String),
}

impl QueueError {
  /// `true` for the rejection `clear()` hands to entries that never started.
  pub fn is_cleared(&self) -> bool {
    matches!(self, QueueError::ClearedBeforeStart)
  }
}

/// Failure of a single fetch performed by an `ImageFetcher`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
  #[error("Request aborted by its cancellation token")]
  Aborted,

  #[error("Request timed out after {0:?}")]
  TimedOut(Duration),

  #[error("Failed to load image: {status} {reason}")]
  Status { status: u16, reason: String },

  #[error("Transport error: {0}")]
  Transport(String),

  #[error("Failed to decode response body: {0}")]
  Decode(String),
}

/// Outcome of an `ImageLoader` operation after retries were applied.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
  #[error("Load cancelled before it could complete")]
  Cancelled,

  #[error(transparent)]
  Fetch(#[from] FetchError),

  #[error(transparent)]
  Queue(#[from] QueueError),
}

impl LoadError {
  /// `true` when the load was dropped on purpose (queue clear, set switch, abort)
  /// rather than failing.
  pub fn is_cancelled(&self) -> bool {
    matches!(self, LoadError::Cancelled)
  }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
  #[error("Invalid value {value:?} for {key}: {reason}")]
  Invalid {
    key: &'static str,
    value: String,
    reason: String,
  },
}
