//! Deferred platform sessions.
//!
//! Configuration is built eagerly at startup, but logging in to the platform
//! is only worth doing when a rule actually needs it. A [`Connection`] holds a
//! [`Connect`] implementation and opens at most one session per run.

use std::{cell::OnceCell, fmt, rc::Rc};

use tracing::debug;

use crate::{Error, Result, client::PlatformClient, error::ClientError};

/// Opens a session against the management platform.
pub trait Connect {
  fn connect(&self) -> std::result::Result<Rc<dyn PlatformClient>, ClientError>;
}

/// A lazily established, cached platform session.
pub struct Connection {
  connector: Box<dyn Connect>,
  session:   OnceCell<Rc<dyn PlatformClient>>,
}

impl Connection {
  pub fn new(connector: impl Connect + 'static) -> Self {
    Self { connector: Box::new(connector), session: OnceCell::new() }
  }

  /// A connection whose session is already open.
  pub fn established(client: Rc<dyn PlatformClient>) -> Self {
    let session = OnceCell::new();
    let _ = session.set(client);
    Self { connector: Box::new(Unavailable), session }
  }

  pub fn is_connected(&self) -> bool { self.session.get().is_some() }

  /// Return the session, connecting first if this is the first call.
  ///
  /// A failed attempt is not cached; the next call tries again.
  pub fn session(&self) -> Result<Rc<dyn PlatformClient>> {
    if let Some(session) = self.session.get() {
      return Ok(Rc::clone(session));
    }
    debug!("opening platform session");
    let session = self.connector.connect().map_err(Error::Client)?;
    Ok(Rc::clone(self.session.get_or_init(|| session)))
  }
}

impl fmt::Debug for Connection {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Connection")
      .field("connected", &self.is_connected())
      .finish()
  }
}

struct Unavailable;

impl Connect for Unavailable {
  fn connect(&self) -> std::result::Result<Rc<dyn PlatformClient>, ClientError> {
    Err("connection has no connector".into())
  }
}
