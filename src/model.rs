use serde::{Deserialize, Serialize};

/// One picture as listed by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
  pub src: String,
  pub alt: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub thumbnail: Option<String>,
}

impl Image {
  /// The thumbnail URL when the backend generated one, the full picture otherwise.
  pub fn preferred_url(&self) -> &str {
    self.thumbnail.as_deref().unwrap_or(&self.src)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSet {
  pub name: String,
  pub images: Vec<Image>,
}
