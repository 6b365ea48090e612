//! Error types for `sickbay-core`.

use thiserror::Error;

/// A boxed error raised by an external collaborator (platform or inventory
/// client).
pub type ClientError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
  /// A triggering payload or raw action record is missing required fields.
  #[error("malformed input: {0}")]
  MalformedInput(String),

  #[error("event {event} has an unparsable timestamp: {value:?}")]
  UnparsableTimestamp { event: String, value: Option<String> },

  #[error("store {store} operation failed: {source}")]
  StoreOperation {
    store:  String,
    #[source]
    source: ClientError,
  },

  #[error("platform client error: {0}")]
  Client(#[source] ClientError),

  #[error("invalid configuration: {0}")]
  InvalidConfig(String),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),
}

impl Error {
  pub(crate) fn store(store: impl ToString, source: impl Into<ClientError>) -> Self {
    Self::StoreOperation { store: store.to_string(), source: source.into() }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
