//! One automated action and its outcome, as reported by the platform.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Outcome reported for an action that completed successfully.
pub const SUCCEEDED: &str = "SUCCEEDED";
/// Outcome reported for an action that failed.
pub const FAILED: &str = "FAILED";
/// Outcome reported for an action that is in the process of failing.
pub const FAILING: &str = "FAILING";

// ─── Wire shape ──────────────────────────────────────────────────────────────

/// The entity an action targets, as embedded in an action record.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TargetRecord {
  pub entity_type:            Option<String>,
  pub turbonomic_internal_id: Option<String>,
}

/// A raw action record, either from the action history API or from the
/// `actionItem` list of a triggering payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ActionRecord {
  pub action_type:  String,
  pub uuid:         String,
  #[serde(rename = "targetSE", default)]
  pub target:       Option<TargetRecord>,
  pub action_state: Option<String>,
  pub create_time:  Option<String>,
}

// ─── Event ───────────────────────────────────────────────────────────────────

/// A normalized, immutable view of one action occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
  /// Category of automated action, e.g. `MOVE` or `RESIZE`.
  pub action_kind:  String,
  /// Category of the entity acted upon, e.g. `VirtualMachine`.
  pub subject_kind: Option<String>,
  pub id:           String,
  /// `SUCCEEDED`, `FAILED`, `FAILING`, ... or absent for in-flight actions.
  pub outcome:      Option<String>,
  /// ISO-8601 creation time, kept verbatim.
  pub created_at:   Option<String>,
}

impl Event {
  /// Build an event from a raw action record.
  ///
  /// `actionType` and `uuid` are required; every other key is optional.
  pub fn from_record(record: &serde_json::Value) -> Result<Self> {
    let record = ActionRecord::deserialize(record)
      .map_err(|e| Error::MalformedInput(format!("action record: {e}")))?;
    Ok(Self::from(record))
  }

  /// Whether the outcome is `failed`, compared case-insensitively.
  pub fn is_failure(&self) -> bool {
    self
      .outcome
      .as_deref()
      .is_some_and(|o| o.eq_ignore_ascii_case(FAILED))
  }

  /// Parse `created_at`.
  ///
  /// A missing or unparsable value is an error; it is never coerced to a
  /// default.
  pub fn created_at_utc(&self) -> Result<DateTime<Utc>> {
    self
      .created_at
      .as_deref()
      .and_then(parse_timestamp)
      .ok_or_else(|| Error::UnparsableTimestamp {
        event: self.id.clone(),
        value: self.created_at.clone(),
      })
  }
}

impl From<ActionRecord> for Event {
  fn from(record: ActionRecord) -> Self {
    Self {
      action_kind:  record.action_type,
      subject_kind: record.target.and_then(|t| t.entity_type),
      id:           record.uuid,
      outcome:      record.action_state,
      created_at:   record.create_time,
    }
  }
}

/// Parse an ISO-8601 timestamp: RFC 3339, a compact `±hhmm` offset, or no
/// offset at all (taken as UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
  let raw = raw.trim();
  if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
    return Some(dt.with_timezone(&Utc));
  }
  if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z") {
    return Some(dt.with_timezone(&Utc));
  }
  NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
    .ok()
    .map(|naive| naive.and_utc())
}
