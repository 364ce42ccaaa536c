use crate::error::QueueError;
use crate::handle::RequestHandle;
use crate::task::{QueueEntry, RequestTask, TaskToExecute};

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::runtime::Handle as TokioHandle;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, trace, warn, Instrument};

lazy_static::lazy_static! {
  static ref NEXT_REQUEST_ID_COUNTER: AtomicU64 = AtomicU64::new(0);
}

struct QueueState<R: Send + 'static> {
  running: usize,
  waiting: VecDeque<QueueEntry<R>>,
  // Set while some thread is running the admission loop.
  dispatching: bool,
}

struct QueueShared<R: Send + 'static> {
  queue_name: Arc<String>,
  concurrency_limit: usize,
  tokio_handle: TokioHandle,
  state: Mutex<QueueState<R>>,
}

/// A bounded request queue: runs at most `concurrency_limit` tasks at once and
/// keeps the rest waiting in submission order.
///
/// Waiting entries can be discarded in bulk with [`clear`](Self::clear), which is
/// what the viewer does when the user leaves a photo set and its pending thumbnail
/// requests become stale. Running tasks are never preempted.
///
/// Build one queue at start-up and hand the returned `Arc` to every consumer.
pub struct RequestQueue<R: Send + 'static> {
  shared: Arc<QueueShared<R>>,
}

impl<R: Send + 'static> RequestQueue<R> {
  pub fn new(concurrency_limit: usize, tokio_handle: TokioHandle, queue_name: &str) -> Arc<Self> {
    let concurrency_limit = concurrency_limit.max(1);
    info!(queue_name = %queue_name, concurrency_limit, "Request queue created.");
    Arc::new(Self {
      shared: Arc::new(QueueShared {
        queue_name: Arc::new(queue_name.to_string()),
        concurrency_limit,
        tokio_handle,
        state: Mutex::new(QueueState {
          running: 0,
          waiting: VecDeque::new(),
          dispatching: false,
        }),
      }),
    })
  }

  pub fn name(&self) -> &str {
    &self.shared.queue_name
  }

  pub fn concurrency_limit(&self) -> usize {
    self.shared.concurrency_limit
  }

  /// Number of dispatched tasks that have not settled yet.
  pub fn running_count(&self) -> usize {
    self.shared.state.lock().running
  }

  /// Number of entries waiting for a slot.
  pub fn waiting_count(&self) -> usize {
    self.shared.state.lock().waiting.len()
  }

  /// Appends a task to the tail of the waiting list and advances the queue.
  ///
  /// `task` is only invoked once the entry is dispatched. `cancellation_token` is
  /// shared between the caller and the queue; the queue triggers it only when the
  /// entry is removed by [`clear`](Self::clear) before it started.
  ///
  /// The returned handle resolves to the task's output, unchanged.
  pub fn enqueue<F, Fut>(&self, task: F, cancellation_token: CancellationToken) -> RequestHandle<R>
  where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = R> + Send + 'static,
  {
    let task_id = NEXT_REQUEST_ID_COUNTER.fetch_add(1, AtomicOrdering::Relaxed);
    let (result_tx, result_rx) = oneshot::channel::<Result<R, QueueError>>();
    let task: RequestTask<R> = Box::new(move || Box::pin(task()) as TaskToExecute<R>);

    let entry = QueueEntry {
      task_id,
      task,
      token: cancellation_token.clone(),
      result_sender: result_tx,
    };

    let waiting = {
      let mut state = self.shared.state.lock();
      state.waiting.push_back(entry);
      state.waiting.len()
    };
    debug!(queue_name = %self.shared.queue_name, %task_id, waiting, "Enqueued request.");

    self.shared.advance();

    RequestHandle {
      task_id,
      cancellation_token,
      result_receiver: result_rx,
    }
  }

  /// Rejects every waiting entry with [`QueueError::ClearedBeforeStart`] after
  /// triggering its cancellation token, and empties the waiting list.
  ///
  /// All waiting entries are settled before this returns. Running tasks keep their
  /// slots and deliver their results normally.
  pub fn clear(&self) {
    let cleared = std::mem::take(&mut self.shared.state.lock().waiting);
    if cleared.is_empty() {
      trace!(queue_name = %self.shared.queue_name, "Clear: No waiting requests.");
      return;
    }

    info!(
      queue_name = %self.shared.queue_name,
      cleared = cleared.len(),
      "Clearing waiting requests."
    );
    for entry in cleared {
      debug!(queue_name = %self.shared.queue_name, task_id = %entry.task_id, "Rejecting waiting request.");
      entry.reject_cleared();
    }
  }

  /// Invalidates pending requests when the logical context changes, e.g. the user
  /// switches photo sets. Same as [`clear`](Self::clear).
  #[doc(alias = "set_set_key")]
  pub fn reset_key(&self) {
    debug!(queue_name = %self.shared.queue_name, "Context key reset.");
    self.clear();
  }
}

impl<R: Send + 'static> QueueShared<R> {
  /// The admission loop. Starts waiting entries one at a time, in order, while a
  /// slot is free.
  ///
  /// Only one caller runs the loop at a time. A nested or concurrent call (from a
  /// producer that enqueues, or a task settling on another worker) returns at once
  /// and leaves the new work to the active loop, so producers are always invoked in
  /// submission order and dispatch never recurses.
  fn advance(self: &Arc<Self>) {
    {
      let mut state = self.state.lock();
      if state.dispatching {
        return;
      }
      state.dispatching = true;
    }

    loop {
      let entry = {
        let mut state = self.state.lock();
        let next = if state.running < self.concurrency_limit {
          state.waiting.pop_front()
        } else {
          None
        };
        match next {
          Some(entry) => {
            state.running += 1;
            entry
          }
          None => {
            state.dispatching = false;
            return;
          }
        }
      };
      self.dispatch(entry);
    }
  }

  fn dispatch(self: &Arc<Self>, entry: QueueEntry<R>) {
    let QueueEntry {
      task_id,
      task,
      result_sender,
      ..
    } = entry;
    let slot = RunningSlot {
      shared: Some(Arc::clone(self)),
    };

    debug!(queue_name = %self.queue_name, %task_id, "Dispatching request.");

    let task_future = match std::panic::catch_unwind(AssertUnwindSafe(task)) {
      Ok(future) => future,
      Err(_panic_payload) => {
        error!(queue_name = %self.queue_name, %task_id, "Task producer panicked before returning a future.");
        slot.settle(task_id, result_sender, Err(QueueError::TaskPanicked));
        return;
      }
    };

    let queue_name = self.queue_name.clone();
    let span_queue_name = self.queue_name.clone();
    self.tokio_handle.spawn(
      async move {
        let outcome = match AssertUnwindSafe(task_future).catch_unwind().await {
          Ok(output) => {
            trace!(queue_name = %*queue_name, %task_id, "Task settled.");
            Ok(output)
          }
          Err(_panic_payload) => {
            error!(queue_name = %*queue_name, %task_id, "Task panicked during execution.");
            Err(QueueError::TaskPanicked)
          }
        };
        slot.settle(task_id, result_sender, outcome);
      }
      .instrument(info_span!(
        "queued_request",
        queue_name = %*span_queue_name,
        %task_id
      )),
    );
  }

  fn release_slot(&self) {
    let mut state = self.state.lock();
    debug_assert!(state.running > 0, "released a slot that was never taken");
    state.running = state.running.saturating_sub(1);
  }
}

/// Bookkeeping for one running task. Settling it frees the slot, delivers the
/// outcome, then lets the next waiting entry in. Dropping it unsettled still frees
/// the slot but admits nothing.
struct RunningSlot<R: Send + 'static> {
  shared: Option<Arc<QueueShared<R>>>,
}

impl<R: Send + 'static> RunningSlot<R> {
  fn settle(
    mut self,
    task_id: u64,
    result_sender: oneshot::Sender<Result<R, QueueError>>,
    outcome: Result<R, QueueError>,
  ) {
    let Some(shared) = self.shared.take() else {
      return;
    };
    shared.release_slot();
    if result_sender.send(outcome).is_err() {
      warn!(
        queue_name = %*shared.queue_name,
        %task_id,
        "Request handle was dropped. Task outcome discarded."
      );
    }
    shared.advance();
  }
}

impl<R: Send + 'static> Drop for RunningSlot<R> {
  // Only reached when the spawned future is dropped before it completes, which the
  // runtime does while shutting down. Nothing else can start on it, so the waiting
  // entries are rejected instead of dispatched.
  fn drop(&mut self) {
    let Some(shared) = self.shared.take() else {
      return;
    };
    shared.release_slot();
    let stranded = std::mem::take(&mut shared.state.lock().waiting);
    debug!(
      queue_name = %*shared.queue_name,
      stranded = stranded.len(),
      "Running task dropped before settling. Runtime is shutting down."
    );
    for entry in stranded {
      entry.reject_cleared();
    }
  }
}

impl<R: Send + 'static> fmt::Debug for RequestQueue<R> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let state = self.shared.state.lock();
    f.debug_struct("RequestQueue")
      .field("queue_name", &self.shared.queue_name)
      .field("concurrency_limit", &self.shared.concurrency_limit)
      .field("running", &state.running)
      .field("waiting", &state.waiting.len())
      .finish()
  }
}

impl<R: Send + 'static> Drop for RequestQueue<R> {
  fn drop(&mut self) {
    info!(
      queue_name = %*self.shared.queue_name,
      "RequestQueue dropped. Clearing waiting requests; running tasks will finish."
    );
    self.clear();
  }
}
