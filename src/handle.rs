use crate::error::QueueError;

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// A handle to a request submitted to the `RequestQueue`.
///
/// Awaiting the handle yields the task's output, or a `QueueError` if the entry
/// was cleared before it started or its task panicked.
#[derive(Debug)]
#[must_use = "a request handle does nothing unless awaited or dropped deliberately"]
pub struct RequestHandle<R: Send + 'static> {
  pub(crate) task_id: u64,
  pub(crate) cancellation_token: CancellationToken,
  pub(crate) result_receiver: oneshot::Receiver<Result<R, QueueError>>,
}

impl<R: Send + 'static> RequestHandle<R> {
  /// Returns the unique ID of this request.
  pub fn id(&self) -> u64 {
    self.task_id
  }

  /// Returns a clone of the cancellation token shared with the queue.
  pub fn cancellation_token(&self) -> CancellationToken {
    self.cancellation_token.clone()
  }

  pub fn is_cancellation_requested(&self) -> bool {
    self.cancellation_token.is_cancelled()
  }

  /// Triggers this request's cancellation token.
  ///
  /// The queue does not act on this: a waiting entry keeps its place and a running
  /// one keeps its slot. The task is expected to observe the token and fail fast.
  pub fn cancel(&self) {
    tracing::debug!(task_id = %self.task_id, "RequestHandle: Cancellation requested.");
    self.cancellation_token.cancel();
  }
}

impl<R: Send + 'static> Future for RequestHandle<R> {
  type Output = Result<R, QueueError>;

  fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    let task_id = self.task_id;
    match Pin::new(&mut self.result_receiver).poll(cx) {
      Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
      Poll::Ready(Err(recv_error)) => {
        // The entry was dropped without settling, e.g. its runtime shut down
        // while the task was running.
        tracing::warn!(%task_id, "Result channel receive error: {}", recv_error);
        Poll::Ready(Err(QueueError::ResultChannelError(format!(
          "Request (id: {}) result channel unexpectedly closed: {}",
          task_id, recv_error
        ))))
      }
      Poll::Pending => Poll::Pending,
    }
  }
}
