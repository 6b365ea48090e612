//! Traits for the external collaborators the core calls into.
//!
//! [`PlatformClient`] is implemented over HTTP by `sickbay-platform`.
//! [`InventoryClient`] backs the tag store only; no implementation ships with
//! this workspace.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ClientError;

pub type ClientResult<T> = std::result::Result<T, ClientError>;

// ─── Platform types ──────────────────────────────────────────────────────────

/// A handle to a static collection (group) on the management platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
  pub uuid:         String,
  #[serde(default)]
  pub display_name: Option<String>,
}

/// One member of a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
  pub uuid:         String,
  #[serde(default)]
  pub display_name: Option<String>,
  #[serde(default)]
  pub class_name:   Option<String>,
}

/// The extended entity record returned by [`PlatformClient::entity_detail`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityDetail {
  #[serde(default)]
  pub tags:       Vec<String>,
  #[serde(default)]
  pub vendor_ids: BTreeMap<String, String>,
}

/// Parameters for [`PlatformClient::action_history`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryQuery {
  pub action_kind: String,
  pub start:       DateTime<Utc>,
  pub end:         DateTime<Utc>,
  /// Only actions that finished with one of these outcomes.
  pub outcomes:    Vec<String>,
}

// ─── Traits ──────────────────────────────────────────────────────────────────

/// Abstraction over the management platform's API.
///
/// Implementations do their own retrying, if any. Every call is blocking.
pub trait PlatformClient {
  /// Find collections of `kind` whose name matches `name`.
  fn search_collections(&self, kind: &str, name: &str) -> ClientResult<Vec<Collection>>;

  /// Create an empty static collection of entities of `entity_kind`.
  fn create_collection(&self, name: &str, entity_kind: &str) -> ClientResult<Collection>;

  fn collection_members(&self, collection: &Collection) -> ClientResult<Vec<Member>>;

  /// Overwrite the member list of `collection` with `member_ids`.
  fn set_collection_members(
    &self,
    collection: &Collection,
    member_ids: &[String],
  ) -> ClientResult<()>;

  /// Raw action records matching `query`, in no particular order.
  fn action_history(&self, query: &HistoryQuery) -> ClientResult<Vec<serde_json::Value>>;

  fn entity_detail(&self, id: &str) -> ClientResult<EntityDetail>;
}

// ─── Inventory ───────────────────────────────────────────────────────────────

/// A virtual machine as known to the virtualization inventory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vm {
  /// The inventory's managed object id.
  pub id:   String,
  pub name: Option<String>,
}

/// A tag attached to a VM in the inventory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
  pub category: String,
  pub name:     String,
}

/// Abstraction over the virtualization inventory (VM and tag lookup).
pub trait InventoryClient {
  /// The inventory's host name; subjects' `vendor_ids` are keyed by it.
  fn host(&self) -> &str;

  fn find_vm(&self, vendor_id: &str) -> ClientResult<Option<Vm>>;

  fn tags(&self, vm: &Vm) -> ClientResult<Vec<Tag>>;
}
