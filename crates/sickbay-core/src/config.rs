//! Rule and store configuration, deserialised from the `rules` section of the
//! configuration file.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub const DEFAULT_LOOKBACK_HOURS: u32 = 720;
pub const DEFAULT_FAILURE_COUNT: u32 = 1;

fn default_lookback_hours() -> u32 { DEFAULT_LOOKBACK_HOURS }
fn default_failure_count() -> u32 { DEFAULT_FAILURE_COUNT }

/// One quarantine rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfig {
  /// Action type to match, e.g. `MOVE`.
  pub action_type:    String,
  /// Entity type to match; any entity type when absent.
  #[serde(default)]
  pub entity_type:    Option<String>,
  #[serde(default = "default_lookback_hours")]
  pub lookback_hours: u32,
  /// Failures required for quarantine. Without `attempt_count` these must be
  /// consecutive.
  #[serde(default = "default_failure_count")]
  pub failure_count:  u32,
  /// Only consider this many of the most recent attempts.
  #[serde(default)]
  pub attempt_count:  Option<u32>,
  /// Stores the subject is admitted to, in order.
  #[serde(default)]
  pub stores:         Vec<StoreConfig>,
}

impl RuleConfig {
  pub fn new(action_type: impl Into<String>) -> Self {
    Self {
      action_type:    action_type.into(),
      entity_type:    None,
      lookback_hours: DEFAULT_LOOKBACK_HOURS,
      failure_count:  DEFAULT_FAILURE_COUNT,
      attempt_count:  None,
      stores:         Vec::new(),
    }
  }

  pub fn validate(&self) -> Result<()> {
    if self.action_type.is_empty() {
      return Err(Error::InvalidConfig("rule has an empty `action_type`".into()));
    }
    if self.failure_count == 0 {
      return Err(Error::InvalidConfig(format!(
        "{} rule: `failure_count` must be at least 1",
        self.action_type
      )));
    }
    if self.attempt_count == Some(0) {
      return Err(Error::InvalidConfig(format!(
        "{} rule: `attempt_count` must be at least 1",
        self.action_type
      )));
    }
    Ok(())
  }
}

/// Configuration for a single quarantine store.
///
/// `kind` selects the variant; unrecognized kinds are accepted here and
/// resolve to a store that does nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
  #[serde(rename = "type")]
  pub kind:       String,
  /// Group store: name of the static group.
  #[serde(default)]
  pub group_name: Option<String>,
  /// Group store: entity type used when the group has to be created.
  #[serde(default)]
  pub group_type: Option<String>,
  /// Tag store: tag category holding the quarantine tag.
  #[serde(default)]
  pub tag_category: Option<String>,
}

impl StoreConfig {
  pub fn group(name: impl Into<String>, entity_kind: impl Into<String>) -> Self {
    Self {
      kind:         StoreKind::GROUP.into(),
      group_name:   Some(name.into()),
      group_type:   Some(entity_kind.into()),
      tag_category: None,
    }
  }

  pub fn of_kind(kind: impl Into<String>) -> Self {
    Self { kind: kind.into(), group_name: None, group_type: None, tag_category: None }
  }

  pub fn store_kind(&self) -> StoreKind { StoreKind::parse(&self.kind) }
}

/// The recognised store variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
  Group,
  Tag,
  Unknown,
}

impl StoreKind {
  pub const GROUP: &'static str = "group";
  pub const TAG: &'static str = "tag";

  /// `vmt` and `vcenter` are accepted as older spellings.
  pub fn parse(kind: &str) -> Self {
    match kind.to_ascii_lowercase().as_str() {
      Self::GROUP | "vmt" => Self::Group,
      Self::TAG | "vcenter" => Self::Tag,
      _ => Self::Unknown,
    }
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn defaults_apply() {
    let rule: RuleConfig = serde_json::from_value(json!({
      "action_type": "MOVE",
      "stores": [{ "type": "group", "group_name": "Quarantine", "group_type": "VirtualMachine" }],
    }))
    .unwrap();

    assert_eq!(rule.lookback_hours, 720);
    assert_eq!(rule.failure_count, 1);
    assert_eq!(rule.attempt_count, None);
    assert_eq!(rule.entity_type, None);
    assert_eq!(rule.stores, vec![StoreConfig::group("Quarantine", "VirtualMachine")]);
    assert!(rule.validate().is_ok());
  }

  #[test]
  fn zero_thresholds_are_rejected() {
    let mut rule = RuleConfig::new("MOVE");
    rule.failure_count = 0;
    assert!(matches!(rule.validate(), Err(Error::InvalidConfig(_))));

    let mut rule = RuleConfig::new("MOVE");
    rule.attempt_count = Some(0);
    assert!(matches!(rule.validate(), Err(Error::InvalidConfig(_))));
  }

  #[test]
  fn store_kind_spellings() {
    assert_eq!(StoreKind::parse("group"), StoreKind::Group);
    assert_eq!(StoreKind::parse("vmt"), StoreKind::Group);
    assert_eq!(StoreKind::parse("Tag"), StoreKind::Tag);
    assert_eq!(StoreKind::parse("vcenter"), StoreKind::Tag);
    assert_eq!(StoreKind::parse("pagerduty"), StoreKind::Unknown);
  }
}
