//! Quarantine stores: the backing sets subjects are admitted to and
//! discharged from.
//!
//! Every variant implements [`QuarantineStore`]. Instances are created through
//! the [`StoreRegistry`], which guarantees one instance per [`StoreKey`] so
//! rules sharing a store also share its cached handle.

mod group;
mod null;
mod registry;
mod tag;

use std::fmt;

pub use group::GroupStore;
pub use null::NullStore;
pub use registry::StoreRegistry;
pub use tag::TagStore;

use crate::{
  Error, Result,
  config::{StoreConfig, StoreKind},
  subject::Subject,
};

// ─── Identity ────────────────────────────────────────────────────────────────

/// Identity of a store within a run: its kind plus, for group stores, the
/// group name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreKey {
  pub kind:          String,
  pub discriminator: Option<String>,
}

impl StoreKey {
  pub fn for_config(config: &StoreConfig) -> Result<Self> {
    match config.store_kind() {
      StoreKind::Group => {
        let name = config.group_name.clone().ok_or_else(|| {
          Error::InvalidConfig(format!("{} store requires `group_name`", config.kind))
        })?;
        Ok(Self { kind: StoreKind::GROUP.into(), discriminator: Some(name) })
      }
      StoreKind::Tag => Ok(Self { kind: StoreKind::TAG.into(), discriminator: None }),
      StoreKind::Unknown => Ok(Self { kind: config.kind.clone(), discriminator: None }),
    }
  }
}

impl fmt::Display for StoreKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.discriminator {
      Some(d) => write!(f, "{}:{d}", self.kind),
      None => f.write_str(&self.kind),
    }
  }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// A set that can hold quarantined subjects.
pub trait QuarantineStore {
  fn key(&self) -> &StoreKey;

  /// Add `subject` to quarantine. Admitting a subject twice is harmless.
  fn admit(&self, subject: &Subject) -> Result<()>;

  /// Remove `subject` from quarantine.
  fn discharge(&self, subject: &Subject) -> Result<()>;

  /// Remove every subject eligible for release and return them.
  fn discharge_eligible(&self) -> Result<Vec<Subject>>;
}

impl fmt::Debug for dyn QuarantineStore {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("QuarantineStore").field(self.key()).finish()
  }
}
