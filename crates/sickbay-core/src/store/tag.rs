//! [`TagStore`]: quarantine by inventory tag.
//!
//! Only the admission lookup is implemented: the subject's VM is resolved in
//! the inventory and its tags in the quarantine category are reported.
//! Writing the tag, `discharge` and `discharge_eligible` are not implemented
//! and do nothing.

use std::rc::Rc;

use tracing::{Span, debug, info, warn};

use super::{QuarantineStore, StoreKey};
use crate::{
  Error, Result,
  client::InventoryClient,
  config::StoreKind,
  subject::Subject,
};

pub struct TagStore {
  key:       StoreKey,
  category:  Option<String>,
  inventory: Rc<dyn InventoryClient>,
  span:      Span,
}

impl TagStore {
  pub fn new(category: Option<String>, inventory: Rc<dyn InventoryClient>, span: Span) -> Self {
    Self {
      key: StoreKey { kind: StoreKind::TAG.into(), discriminator: None },
      category,
      inventory,
      span,
    }
  }
}

impl QuarantineStore for TagStore {
  fn key(&self) -> &StoreKey { &self.key }

  fn admit(&self, subject: &Subject) -> Result<()> {
    let host = self.inventory.host();
    let vendor_id = subject.vendor_ids.get(host).ok_or_else(|| {
      Error::store(&self.key, format!("subject {} has no vendor id for {host}", subject.id))
    })?;

    let vm = self
      .inventory
      .find_vm(vendor_id)
      .map_err(|e| Error::store(&self.key, e))?
      .ok_or_else(|| Error::store(&self.key, format!("no VM with id {vendor_id} on {host}")))?;

    let tags = self.inventory.tags(&vm).map_err(|e| Error::store(&self.key, e))?;
    for tag in tags
      .iter()
      .filter(|t| self.category.as_deref().is_none_or(|c| c == t.category))
    {
      info!(
        parent: &self.span,
        subject = %subject.id,
        vm = %vm.id,
        category = %tag.category,
        tag = %tag.name,
        "vm tag"
      );
    }
    warn!(parent: &self.span, subject = %subject.id, "tag store cannot write quarantine tags yet");
    Ok(())
  }

  fn discharge(&self, subject: &Subject) -> Result<()> {
    debug!(parent: &self.span, subject = %subject.id, "tag store: discharge not implemented");
    Ok(())
  }

  fn discharge_eligible(&self) -> Result<Vec<Subject>> { Ok(Vec::new()) }
}
