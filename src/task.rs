use crate::error::QueueError;

use std::future::Future;
use std::pin::Pin;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// The type of future a dispatched task runs.
/// It must be `Send` and `'static`, and produce a result of type `R`.
pub type TaskToExecute<R> = Pin<Box<dyn Future<Output = R> + Send + 'static>>;

/// A zero-argument task producer. The queue invokes it only when the entry is
/// dispatched, so nothing starts while the entry is still waiting.
pub type RequestTask<R> = Box<dyn FnOnce() -> TaskToExecute<R> + Send + 'static>;

/// Internal representation of an entry sitting in the waiting list.
pub(crate) struct QueueEntry<R: Send + 'static> {
  pub(crate) task_id: u64,
  pub(crate) task: RequestTask<R>,
  pub(crate) token: CancellationToken,
  pub(crate) result_sender: oneshot::Sender<Result<R, QueueError>>,
}

impl<R: Send + 'static> QueueEntry<R> {
  /// Settles a never-dispatched entry: fires its token, then rejects it.
  pub(crate) fn reject_cleared(self) {
    self.token.cancel();
    // The caller may have dropped its handle already.
    let _ = self.result_sender.send(Err(QueueError::ClearedBeforeStart));
  }
}
