use photoframe_queue::{FetchError, ImageFetcher, ImageLoader, LoadQueue, RetryPolicy};
use std::future::Future;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Pretends every download takes 300ms and honours its cancellation token.
struct SlowFetcher;

impl ImageFetcher for SlowFetcher {
  fn fetch(
    &self,
    url: String,
    token: CancellationToken,
  ) -> impl Future<Output = Result<Vec<u8>, FetchError>> + Send {
    async move {
      tokio::select! {
        _ = token.cancelled() => Err(FetchError::Aborted),
        _ = tokio::time::sleep(Duration::from_millis(300)) => Ok(url.into_bytes()),
      }
    }
  }
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,photoframe_queue=debug")),
    )
    .with_target(false)
    .init();

  info!("--- Set Switch Demo ---");

  let queue = LoadQueue::new(2, Handle::current(), "thumbnail_queue");
  let loader = ImageLoader::new(SlowFetcher, queue, RetryPolicy::default());
  loader.switch_set("kyoto");

  let kyoto_loads = (0..6).map(|i| {
    let loader = &loader;
    async move {
      let url = format!("/thumbnails/kyoto/{}.jpg", i);
      (url.clone(), loader.load(&url).await)
    }
  });

  let switch = async {
    tokio::time::sleep(Duration::from_millis(100)).await;
    info!("User opened another set.");
    loader.switch_set("osaka");
  };

  let (results, ()) = tokio::join!(futures::future::join_all(kyoto_loads), switch);
  for (url, result) in results {
    match result {
      Ok(bytes) => info!("{}: loaded {} bytes", url, bytes.len()),
      Err(e) if e.is_cancelled() => info!("{}: dropped with the old set", url),
      Err(e) => info!("{}: failed: {}", url, e),
    }
  }

  info!("--- Set Switch Demo End ---");
}
