//! A Tokio-based bounded request queue for a photo-frame viewer, with FIFO
//! admission, bulk clearing of pending requests, and an image loader that throttles
//! thumbnail fetches through it.

mod config;
mod endpoint;
mod error;
mod fetch;
mod handle;
mod loader;
mod model;
mod queue;
mod task;

pub use config::{LoaderConfig, QueueConfig, RetryPolicy};
pub use endpoint::Endpoint;
pub use error::{ConfigError, FetchError, LoadError, QueueError};
pub use fetch::{HttpFetcher, ImageFetcher};
pub use handle::RequestHandle;
pub use loader::{ImageLoader, LoadQueue};
pub use model::{Image, ImageSet};
pub use queue::RequestQueue;
pub use task::{RequestTask, TaskToExecute};
