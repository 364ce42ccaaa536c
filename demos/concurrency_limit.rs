use photoframe_queue::{RequestHandle, RequestQueue};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::info;

async fn fake_thumbnail_fetch(id: usize) -> String {
  info!("Thumbnail {} downloading (should take 1s)", id);
  tokio::time::sleep(Duration::from_secs(1)).await;
  let result = format!("thumbnail {} ready", id);
  info!("{}", result);
  result
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();

  info!("--- Concurrency Limit Demo (Limit: 3) ---");

  let concurrency_limit = 3;
  let queue = RequestQueue::<String>::new(concurrency_limit, Handle::current(), "thumbnail_queue");

  let num_requests = 7;
  info!(
    "Enqueuing {} fetches, each takes 1 sec. With concurrency {}, this should take ~{} secs.",
    num_requests,
    concurrency_limit,
    (num_requests as f32 / concurrency_limit as f32).ceil()
  );

  let started = Instant::now();
  let handles: Vec<RequestHandle<String>> = (0..num_requests)
    .map(|i| queue.enqueue(move || fake_thumbnail_fetch(i), CancellationToken::new()))
    .collect();
  info!(
    "Running: {}, waiting: {}",
    queue.running_count(),
    queue.waiting_count()
  );

  for handle in handles {
    let request_id = handle.id();
    match handle.await {
      Ok(result) => info!("Request {}: {}", request_id, result),
      Err(e) => info!("Request {}: error {:?}", request_id, e),
    }
  }

  info!("All requests settled after {:?}.", started.elapsed());
  info!("--- Concurrency Limit Demo End ---");
}
