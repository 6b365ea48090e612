//! The entity under evaluation for quarantine.
//!
//! A subject is built once per run from the triggering payload. Extended
//! details (tags, vendor ids) are only fetched on demand through
//! [`Subject::fetch_detail`].

use std::collections::BTreeMap;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
  Error, Result,
  client::{HistoryQuery, PlatformClient},
  event::{ActionRecord, Event, FAILED, SUCCEEDED},
};

/// Shape of the JSON document the platform pipes into the action script.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TriggerPayload {
  action_state: String,
  action_item:  Vec<ActionRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
  /// The event that caused this evaluation. Absent for subjects rebuilt from
  /// quarantine membership.
  pub trigger_event:   Option<Event>,
  /// The live outcome carried in the triggering payload.
  pub current_outcome: Option<String>,
  /// Stable identifier of the underlying entity.
  pub id:              String,
  /// Populated by [`Subject::fetch_detail`].
  pub tags:            Vec<String>,
  /// Source-system name to external identifier. Populated by
  /// [`Subject::fetch_detail`].
  pub vendor_ids:      BTreeMap<String, String>,
}

impl Subject {
  /// A subject known only by its entity id.
  pub fn from_id(id: impl Into<String>) -> Self {
    Self {
      trigger_event:   None,
      current_outcome: None,
      id:              id.into(),
      tags:            Vec::new(),
      vendor_ids:      BTreeMap::new(),
    }
  }

  /// Build a subject from a triggering payload.
  ///
  /// The payload must carry a top-level `actionState` and at least one
  /// `actionItem` whose `targetSE.turbonomicInternalId` names the entity.
  pub fn from_payload(payload: &serde_json::Value) -> Result<Self> {
    let payload = TriggerPayload::deserialize(payload)
      .map_err(|e| Error::MalformedInput(format!("trigger payload: {e}")))?;

    let item = payload
      .action_item
      .into_iter()
      .next()
      .ok_or_else(|| Error::MalformedInput("trigger payload: empty `actionItem`".into()))?;

    let id = item
      .target
      .as_ref()
      .and_then(|t| t.turbonomic_internal_id.clone())
      .ok_or_else(|| {
        Error::MalformedInput(
          "trigger payload: missing `actionItem[0].targetSE.turbonomicInternalId`".into(),
        )
      })?;

    Ok(Self {
      trigger_event: Some(Event::from(item)),
      current_outcome: Some(payload.action_state),
      ..Self::from_id(id)
    })
  }

  /// Parse a triggering payload from its JSON text.
  pub fn from_json(raw: &str) -> Result<Self> {
    let value: serde_json::Value = serde_json::from_str(raw)
      .map_err(|e| Error::MalformedInput(format!("trigger payload is not JSON: {e}")))?;
    Self::from_payload(&value)
  }

  /// Fetch tags and vendor ids for this subject, replacing any previously
  /// fetched values.
  pub fn fetch_detail(&mut self, client: &dyn PlatformClient) -> Result<()> {
    let detail = client.entity_detail(&self.id).map_err(Error::Client)?;
    self.tags = detail.tags;
    self.vendor_ids = detail.vendor_ids;
    debug!(subject = %self.id, tags = self.tags.len(), "fetched entity detail");
    Ok(())
  }

  /// Fetch completed actions of the triggering action kind from the last
  /// `lookback`, in whatever order the platform returns them.
  pub fn fetch_history(
    &self,
    client: &dyn PlatformClient,
    lookback: Duration,
  ) -> Result<Vec<Event>> {
    let Some(trigger) = &self.trigger_event else {
      return Ok(Vec::new());
    };

    let end = Utc::now();
    let query = HistoryQuery {
      action_kind: trigger.action_kind.clone(),
      start:       end - lookback,
      end,
      outcomes:    vec![SUCCEEDED.to_string(), FAILED.to_string()],
    };

    client
      .action_history(&query)
      .map_err(Error::Client)?
      .iter()
      .map(Event::from_record)
      .collect()
  }
}
