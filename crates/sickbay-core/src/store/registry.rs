//! [`StoreRegistry`]: one store instance per [`StoreKey`].

use std::{collections::HashMap, rc::Rc};

use tracing::{Span, info_span, warn};

use super::{GroupStore, NullStore, QuarantineStore, StoreKey, TagStore};
use crate::{
  Error, Result,
  client::InventoryClient,
  config::{StoreConfig, StoreKind},
  connection::Connection,
};

/// Builds quarantine stores from configuration and memoizes them by identity.
pub struct StoreRegistry {
  connection: Rc<Connection>,
  inventory:  Option<Rc<dyn InventoryClient>>,
  index:      HashMap<StoreKey, usize>,
  stores:     Vec<Rc<dyn QuarantineStore>>,
  span:       Span,
}

impl StoreRegistry {
  pub fn new(
    connection: Rc<Connection>,
    inventory: Option<Rc<dyn InventoryClient>>,
    span: Span,
  ) -> Self {
    Self { connection, inventory, index: HashMap::new(), stores: Vec::new(), span }
  }

  /// Return the store for `config`, constructing it on first request.
  pub fn get_or_create(&mut self, config: &StoreConfig) -> Result<Rc<dyn QuarantineStore>> {
    let key = StoreKey::for_config(config)?;
    if let Some(&i) = self.index.get(&key) {
      return Ok(Rc::clone(&self.stores[i]));
    }

    let span = info_span!(parent: &self.span, "store", key = %key);
    let store: Rc<dyn QuarantineStore> = match config.store_kind() {
      StoreKind::Group => {
        let name = key.discriminator.clone().unwrap_or_default();
        let entity_kind = config.group_type.clone().ok_or_else(|| {
          Error::InvalidConfig(format!("group store {name:?} requires `group_type`"))
        })?;
        Rc::new(GroupStore::new(name, entity_kind, Rc::clone(&self.connection), span))
      }
      StoreKind::Tag => match &self.inventory {
        Some(inventory) => {
          Rc::new(TagStore::new(config.tag_category.clone(), Rc::clone(inventory), span))
        }
        None => {
          warn!(parent: &self.span, "no inventory client available, tag store disabled");
          Rc::new(NullStore::new(key.clone(), span))
        }
      },
      StoreKind::Unknown => {
        warn!(parent: &self.span, kind = %config.kind, "unrecognized store kind, using a null store");
        Rc::new(NullStore::new(key.clone(), span))
      }
    };

    self.index.insert(key, self.stores.len());
    self.stores.push(Rc::clone(&store));
    Ok(store)
  }

  /// Every store constructed so far, in creation order.
  pub fn all_stores(&self) -> &[Rc<dyn QuarantineStore>] { &self.stores }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::tests::{MockPlatform, connection};

  fn registry() -> StoreRegistry {
    StoreRegistry::new(connection(&Rc::new(MockPlatform::default())), None, Span::none())
  }

  #[test]
  fn same_config_returns_same_instance() {
    let mut registry = registry();
    let config = StoreConfig::group("Quarantine", "VirtualMachine");

    let a = registry.get_or_create(&config).unwrap();
    let b = registry.get_or_create(&config.clone()).unwrap();
    assert!(Rc::ptr_eq(&a, &b));
    assert_eq!(registry.all_stores().len(), 1);
  }

  #[test]
  fn legacy_group_spelling_shares_the_instance() {
    let mut registry = registry();
    let a = registry
      .get_or_create(&StoreConfig::group("Quarantine", "VirtualMachine"))
      .unwrap();
    let mut legacy = StoreConfig::group("Quarantine", "VirtualMachine");
    legacy.kind = "vmt".into();
    let b = registry.get_or_create(&legacy).unwrap();
    assert!(Rc::ptr_eq(&a, &b));
  }

  #[test]
  fn different_group_names_are_distinct() {
    let mut registry = registry();
    let a = registry
      .get_or_create(&StoreConfig::group("Quarantine", "VirtualMachine"))
      .unwrap();
    let b = registry
      .get_or_create(&StoreConfig::group("Quarantine-Hosts", "PhysicalMachine"))
      .unwrap();
    assert!(!Rc::ptr_eq(&a, &b));

    let keys: Vec<_> = registry.all_stores().iter().map(|s| s.key().to_string()).collect();
    assert_eq!(keys, vec!["group:Quarantine", "group:Quarantine-Hosts"]);
  }

  #[test]
  fn keys_do_not_collide_across_kinds() {
    let mut registry = registry();
    let group = registry
      .get_or_create(&StoreConfig::group("tag", "VirtualMachine"))
      .unwrap();
    let tag = registry.get_or_create(&StoreConfig::of_kind("tag")).unwrap();
    assert!(!Rc::ptr_eq(&group, &tag));
  }

  #[test]
  fn unknown_kinds_become_null_stores_keyed_by_kind() {
    let mut registry = registry();
    let a = registry.get_or_create(&StoreConfig::of_kind("email")).unwrap();
    let b = registry.get_or_create(&StoreConfig::of_kind("email")).unwrap();
    let c = registry.get_or_create(&StoreConfig::of_kind("ticket")).unwrap();
    assert!(Rc::ptr_eq(&a, &b));
    assert!(!Rc::ptr_eq(&a, &c));

    let subject = crate::subject::Subject::from_id("vm-1");
    assert!(a.admit(&subject).is_ok());
    assert!(a.discharge(&subject).is_ok());
    assert!(a.discharge_eligible().unwrap().is_empty());
  }

  #[test]
  fn group_store_requires_name_and_type() {
    let mut registry = registry();
    let mut config = StoreConfig::group("Quarantine", "VirtualMachine");
    config.group_type = None;
    assert!(matches!(registry.get_or_create(&config), Err(Error::InvalidConfig(_))));

    let config = StoreConfig::of_kind("group");
    assert!(matches!(registry.get_or_create(&config), Err(Error::InvalidConfig(_))));
    assert!(registry.all_stores().is_empty());
  }
}
