//! Error type for `sickbay-platform`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlatformError {
  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  /// The platform answered with a non-success status.
  #[error("{method} {path} → {status}")]
  Status {
    method: &'static str,
    path:   String,
    status: reqwest::StatusCode,
  },

  #[error("login failed: {0}")]
  Login(String),

  #[error("unexpected response: {0}")]
  Unexpected(String),
}

pub type Result<T, E = PlatformError> = std::result::Result<T, E>;
