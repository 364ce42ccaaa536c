//! Image loading on top of the shared `RequestQueue`.
//!
//! Every download becomes one queued task with its own cancellation token and its
//! own timeout. Failed loads are retried after a fixed delay, re-entering the queue
//! at the tail. Loads dropped on purpose (queue clear, set switch, abort) come back
//! as `LoadError::Cancelled` and are never retried.

use crate::config::{LoaderConfig, RetryPolicy};
use crate::endpoint::Endpoint;
use crate::error::{FetchError, LoadError, QueueError};
use crate::fetch::{HttpFetcher, ImageFetcher};
use crate::handle::RequestHandle;
use crate::model::{Image, ImageSet};
use crate::queue::RequestQueue;

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use tokio::runtime::Handle as TokioHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Queue type shared by every `ImageLoader`.
pub type LoadQueue = RequestQueue<Result<Vec<u8>, FetchError>>;

pub struct ImageLoader<F: ImageFetcher> {
  fetcher: Arc<F>,
  queue: Arc<LoadQueue>,
  policy: RetryPolicy,
  active_set: Mutex<Option<String>>,
  generation: AtomicU64,
}

impl ImageLoader<HttpFetcher> {
  /// Builds the application's queue and an HTTP loader from configuration.
  pub fn from_config(config: &LoaderConfig, tokio_handle: TokioHandle) -> Result<Self, FetchError> {
    let fetcher = HttpFetcher::new(&config.base_url)?;
    let queue = LoadQueue::new(config.queue.concurrency_limit, tokio_handle, &config.queue.name);
    Ok(Self::new(fetcher, queue, config.retry))
  }
}

impl<F: ImageFetcher> ImageLoader<F> {
  pub fn new(fetcher: F, queue: Arc<LoadQueue>, policy: RetryPolicy) -> Self {
    Self {
      fetcher: Arc::new(fetcher),
      queue,
      policy,
      active_set: Mutex::new(None),
      generation: AtomicU64::new(0),
    }
  }

  pub fn queue(&self) -> &Arc<LoadQueue> {
    &self.queue
  }

  pub fn policy(&self) -> RetryPolicy {
    self.policy
  }

  pub fn active_set(&self) -> Option<String> {
    self.active_set.lock().clone()
  }

  /// Makes `set_name` the active photo set. Pending loads of the previous set are
  /// rejected and their retries abandoned. Re-selecting the active set does nothing.
  pub fn switch_set(&self, set_name: &str) {
    // Held across the reset so no load can be queued between the bump and the clear.
    let mut active = self.active_set.lock();
    if active.as_deref() == Some(set_name) {
      trace!(set = %set_name, "Photo set already active.");
      return;
    }
    info!(from = ?*active, to = %set_name, "Switching photo set. Invalidating pending loads.");
    *active = Some(set_name.to_string());
    self.generation.fetch_add(1, AtomicOrdering::AcqRel);
    self.queue.reset_key();
  }

  /// Loads `url` through the queue, retrying failed attempts.
  pub async fn load(&self, url: &str) -> Result<Vec<u8>, LoadError> {
    let generation = self.generation.load(AtomicOrdering::Acquire);
    let mut retries: u32 = 0;

    loop {
      let error = match self.attempt(url, generation).await {
        Ok(bytes) => return Ok(bytes),
        Err(error) => error,
      };

      if error.is_cancelled() {
        debug!(%url, "Image load cancelled.");
        return Err(error);
      }
      if retries >= self.policy.max_retries {
        warn!(%url, attempts = retries + 1, "Giving up on image load: {}", error);
        return Err(error);
      }

      retries += 1;
      warn!(
        %url,
        attempt = retries,
        max_retries = self.policy.max_retries,
        "Retrying image load: {}",
        error
      );
      tokio::time::sleep(self.policy.retry_delay).await;
    }
  }

  /// Loads the image's thumbnail, or the full picture when it has none.
  pub async fn load_thumbnail(&self, image: &Image) -> Result<Vec<u8>, LoadError> {
    self.load(image.preferred_url()).await
  }

  pub async fn load_fast_thumbnail(&self, set: &str, filename: &str) -> Result<Vec<u8>, LoadError> {
    let endpoint = Endpoint::FastThumbnail {
      set: set.to_string(),
      filename: filename.to_string(),
    };
    self.load(&endpoint.path()).await
  }

  pub async fn load_fast_picture(&self, set: &str, filename: &str) -> Result<Vec<u8>, LoadError> {
    let endpoint = Endpoint::FastPicture {
      set: set.to_string(),
      filename: filename.to_string(),
    };
    self.load(&endpoint.path()).await
  }

  pub async fn photo_set_names(&self) -> Result<Vec<String>, LoadError> {
    self.fetch_json(Endpoint::PhotoSets).await
  }

  pub async fn images_for_set(&self, set: &str) -> Result<Vec<Image>, LoadError> {
    self
      .fetch_json(Endpoint::ImageSet { set: set.to_string() })
      .await
  }

  pub async fn image_sets(&self) -> Result<Vec<ImageSet>, LoadError> {
    self.fetch_json(Endpoint::ImageSets).await
  }

  async fn attempt(&self, url: &str, generation: u64) -> Result<Vec<u8>, LoadError> {
    let handle = self.submit(url, generation)?;
    match handle.await {
      Ok(Ok(bytes)) => Ok(bytes),
      Ok(Err(FetchError::Aborted)) | Err(QueueError::ClearedBeforeStart) => Err(LoadError::Cancelled),
      Ok(Err(fetch_error)) => Err(LoadError::Fetch(fetch_error)),
      Err(queue_error) => Err(LoadError::Queue(queue_error)),
    }
  }

  /// Queues one time-limited fetch of `url`, unless the photo set has changed since
  /// `generation` was read.
  fn submit(&self, url: &str, generation: u64) -> Result<RequestHandle<Result<Vec<u8>, FetchError>>, LoadError> {
    // `switch_set` bumps the generation and clears the queue under this lock.
    let _active = self.active_set.lock();
    if self.generation.load(AtomicOrdering::Acquire) != generation {
      debug!(%url, "Photo set changed before the load was queued. Dropping load.");
      return Err(LoadError::Cancelled);
    }

    let token = CancellationToken::new();
    let task_token = token.clone();
    let fetcher = Arc::clone(&self.fetcher);
    let timeout = self.policy.request_timeout;
    let target = url.to_string();

    Ok(self.queue.enqueue(
      move || async move {
        match tokio::time::timeout(timeout, fetcher.fetch(target, task_token.clone())).await {
          Ok(result) => result,
          Err(_elapsed) => {
            task_token.cancel();
            Err(FetchError::TimedOut(timeout))
          }
        }
      },
      token,
    ))
  }

  // Listings are small and not worth queueing behind thumbnails.
  async fn fetch_json<T: DeserializeOwned>(&self, endpoint: Endpoint) -> Result<T, LoadError> {
    let body = match self.fetcher.fetch(endpoint.path(), CancellationToken::new()).await {
      Ok(body) => body,
      Err(FetchError::Aborted) => return Err(LoadError::Cancelled),
      Err(fetch_error) => return Err(LoadError::Fetch(fetch_error)),
    };
    serde_json::from_slice(&body).map_err(|e| LoadError::Fetch(FetchError::Decode(e.to_string())))
  }
}
