use tracing::{Span, debug};

use super::{QuarantineStore, StoreKey};
use crate::{Result, subject::Subject};

/// A store that does nothing. Stands in for store kinds that are not
/// recognised, so a configuration mistake results in inaction rather than a
/// failed run.
#[derive(Debug)]
pub struct NullStore {
  key:  StoreKey,
  span: Span,
}

impl NullStore {
  pub fn new(key: StoreKey, span: Span) -> Self { Self { key, span } }
}

impl QuarantineStore for NullStore {
  fn key(&self) -> &StoreKey { &self.key }

  fn admit(&self, subject: &Subject) -> Result<()> {
    debug!(parent: &self.span, subject = %subject.id, "null store: admit ignored");
    Ok(())
  }

  fn discharge(&self, subject: &Subject) -> Result<()> {
    debug!(parent: &self.span, subject = %subject.id, "null store: discharge ignored");
    Ok(())
  }

  fn discharge_eligible(&self) -> Result<Vec<Subject>> { Ok(Vec::new()) }
}
