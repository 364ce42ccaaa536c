//! Paths of the photo-frame backend's HTTP contract.

use std::fmt;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Characters `encodeURIComponent` leaves alone, everything else is escaped.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
  .remove(b'-')
  .remove(b'_')
  .remove(b'.')
  .remove(b'!')
  .remove(b'~')
  .remove(b'*')
  .remove(b'\'')
  .remove(b'(')
  .remove(b')');

const API_PREFIX: &str = "/api";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
  /// Every set with its full image list.
  ImageSets,
  /// Names of the photo set directories.
  PhotoSets,
  /// Images of one set.
  ImageSet { set: String },
  FastPicture { set: String, filename: String },
  FastThumbnail { set: String, filename: String },
}

impl Endpoint {
  pub fn path(&self) -> String {
    match self {
      Endpoint::ImageSets => format!("{API_PREFIX}/image-sets"),
      Endpoint::PhotoSets => format!("{API_PREFIX}/photo-sets"),
      Endpoint::ImageSet { set } => format!("{API_PREFIX}/image-sets/{}", encode_segment(set)),
      Endpoint::FastPicture { set, filename } => format!(
        "{API_PREFIX}/fast-pictures/{}/{}",
        encode_segment(set),
        encode_segment(filename)
      ),
      Endpoint::FastThumbnail { set, filename } => format!(
        "{API_PREFIX}/fast-thumbnails/{}/{}",
        encode_segment(set),
        encode_segment(filename)
      ),
    }
  }

  /// Joins the path onto `base_url`, tolerating a trailing slash on the base.
  pub fn url(&self, base_url: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), self.path())
  }
}

impl fmt::Display for Endpoint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.path())
  }
}

fn encode_segment(segment: &str) -> String {
  utf8_percent_encode(segment, PATH_SEGMENT).to_string()
}
