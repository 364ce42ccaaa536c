use crate::error::FetchError;

use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Produces the bytes behind a URL. This is the work each queued task performs.
///
/// Implementations should stop as soon as `token` is cancelled and report
/// [`FetchError::Aborted`]; nothing forces them to.
pub trait ImageFetcher: Send + Sync + 'static {
  fn fetch(
    &self,
    url: String,
    token: CancellationToken,
  ) -> impl Future<Output = Result<Vec<u8>, FetchError>> + Send;
}

/// `ImageFetcher` over HTTP. Relative URLs (`/api/...`, `/thumbnails/...`) are
/// resolved against the backend's base URL.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
  client: reqwest::Client,
  base_url: String,
}

impl HttpFetcher {
  pub fn new(base_url: &str) -> Result<Self, FetchError> {
    let client = reqwest::Client::builder()
      .build()
      .map_err(|e| FetchError::Transport(e.to_string()))?;
    Ok(Self::with_client(client, base_url))
  }

  pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
    Self {
      client,
      base_url: base_url.trim_end_matches('/').to_string(),
    }
  }

  pub fn base_url(&self) -> &str {
    &self.base_url
  }

  pub fn resolve(&self, url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
      url.to_string()
    } else if url.starts_with('/') {
      format!("{}{}", self.base_url, url)
    } else {
      format!("{}/{}", self.base_url, url)
    }
  }

  async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
    let response = self
      .client
      .get(url)
      .send()
      .await
      .map_err(|e| FetchError::Transport(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
      debug!(%url, status = status.as_u16(), "Fetch returned a non-success status.");
      return Err(FetchError::Status {
        status: status.as_u16(),
        reason: status.canonical_reason().unwrap_or_default().to_string(),
      });
    }

    let body = response
      .bytes()
      .await
      .map_err(|e| FetchError::Transport(e.to_string()))?;
    trace!(%url, bytes = body.len(), "Fetch completed.");
    Ok(body.to_vec())
  }
}

impl ImageFetcher for HttpFetcher {
  fn fetch(
    &self,
    url: String,
    token: CancellationToken,
  ) -> impl Future<Output = Result<Vec<u8>, FetchError>> + Send {
    async move {
      let url = self.resolve(&url);
      tokio::select! {
        biased;
        _ = token.cancelled() => {
          debug!(%url, "Fetch aborted by its cancellation token.");
          Err(FetchError::Aborted)
        }
        result = self.get(&url) => result,
      }
    }
  }
}
