//! Quarantine rules: match predicate, failure threshold and target stores.
//!
//! Evaluation happens in two steps. [`Rule::triage`] is a cheap local check
//! against the triggering event. Only subjects that pass triage are passed to
//! [`Rule::diagnose`], which may need to fetch action history.

use std::{fmt, rc::Rc};

use chrono::Duration;
use tracing::{Span, debug, info, info_span};

use crate::{
  Result,
  client::PlatformClient,
  config::RuleConfig,
  event::{Event, FAILED, FAILING},
  store::{QuarantineStore, StoreRegistry},
  subject::Subject,
};

#[derive(Debug)]
pub struct Rule {
  action_kind:       String,
  subject_kind:      Option<String>,
  lookback:          Duration,
  failure_threshold: u32,
  attempt_window:    Option<u32>,
  stores:            Vec<Rc<dyn QuarantineStore>>,
  span:              Span,
}

impl Rule {
  /// Build a rule, resolving its stores through `registry`.
  pub fn from_config(
    config: &RuleConfig,
    registry: &mut StoreRegistry,
    parent: &Span,
  ) -> Result<Self> {
    config.validate()?;
    let stores = config
      .stores
      .iter()
      .map(|s| registry.get_or_create(s))
      .collect::<Result<Vec<_>>>()?;

    let mut rule = Self {
      action_kind: config.action_type.clone(),
      subject_kind: config.entity_type.clone(),
      lookback: Duration::hours(i64::from(config.lookback_hours)),
      failure_threshold: config.failure_count,
      attempt_window: config.attempt_count,
      stores,
      span: Span::none(),
    };
    rule.span = info_span!(parent: parent, "rule", criteria = %rule.criteria());
    Ok(rule)
  }

  pub fn action_kind(&self) -> &str { &self.action_kind }

  /// Matches any entity kind when `None`.
  pub fn subject_kind(&self) -> Option<&str> { self.subject_kind.as_deref() }

  pub fn lookback(&self) -> Duration { self.lookback }

  pub fn failure_threshold(&self) -> u32 { self.failure_threshold }

  /// When set, only this many of the most recent events are considered.
  pub fn attempt_window(&self) -> Option<u32> { self.attempt_window }

  pub fn stores(&self) -> &[Rc<dyn QuarantineStore>] { &self.stores }

  /// Whether the subject's triggering event is one this rule cares about.
  pub fn triage(&self, subject: &Subject) -> bool {
    let Some(trigger) = &subject.trigger_event else {
      return false;
    };
    let matched = self.action_kind == trigger.action_kind
      && self
        .subject_kind
        .as_ref()
        .is_none_or(|kind| trigger.subject_kind.as_ref() == Some(kind));

    debug!(
      parent: &self.span,
      subject = %subject.id,
      action_kind = %trigger.action_kind,
      subject_kind = ?trigger.subject_kind,
      matched,
      "triage"
    );
    matched
  }

  /// Decide whether `subject` should be quarantined under this rule.
  ///
  /// A threshold of one is met by a failing trigger alone, without looking
  /// at history. An empty history is a negative diagnosis.
  pub fn diagnose(&self, subject: &Subject, client: &dyn PlatformClient) -> Result<bool> {
    if self.failure_threshold == 1
      && matches!(subject.current_outcome.as_deref(), Some(FAILING | FAILED))
    {
      info!(parent: &self.span, subject = %subject.id, "failing trigger meets threshold");
      return Ok(true);
    }

    let events = subject.fetch_history(client, self.lookback)?;
    if events.is_empty() {
      info!(
        parent: &self.span,
        subject = %subject.id,
        required = self.failure_threshold,
        "no action history returned, not admitting"
      );
      return Ok(false);
    }

    let considered = events.len().min(self.attempt_window.map_or(usize::MAX, |w| w as usize));
    let failures = count_failures(events, self.attempt_window)?;
    let diagnosed = failures >= self.failure_threshold as usize;
    info!(
      parent: &self.span,
      subject = %subject.id,
      failures,
      considered,
      required = self.failure_threshold,
      diagnosed,
      "diagnosis"
    );
    Ok(diagnosed)
  }

  /// Admit `subject` to every store of this rule, in order.
  ///
  /// Stops at the first failing store. Stores already written are left as
  /// they are.
  pub fn admit(&self, subject: &Subject) -> Result<()> {
    for store in &self.stores {
      store.admit(subject)?;
    }
    Ok(())
  }

  /// Discharge `subject` from every store of this rule, in order.
  pub fn discharge(&self, subject: &Subject) -> Result<()> {
    for store in &self.stores {
      store.discharge(subject)?;
    }
    Ok(())
  }

  /// Human-readable description of the quarantine criteria.
  pub fn criteria(&self) -> String {
    let kind = self.subject_kind.as_deref().unwrap_or("any");
    let head = format!("Fail {kind} {} actions {}", self.action_kind, self.failure_threshold);
    match self.attempt_window {
      Some(window) => format!("{head} out of {window} attempts."),
      None => format!("{head} in a row."),
    }
  }
}

impl fmt::Display for Rule {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.criteria()) }
}

/// Count failed events among the most recent `window` events, ordering by
/// creation time.
///
/// Every event must carry a parsable timestamp.
pub fn count_failures(events: Vec<Event>, window: Option<u32>) -> Result<usize> {
  let mut timed = events
    .into_iter()
    .map(|e| -> Result<_> { Ok((e.created_at_utc()?, e)) })
    .collect::<Result<Vec<_>>>()?;
  timed.sort_by_key(|(at, _)| *at);

  let skip = window.map_or(0, |w| timed.len().saturating_sub(w as usize));
  Ok(timed.iter().skip(skip).filter(|(_, e)| e.is_failure()).count())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    Error,
    config::StoreConfig,
    tests::{MockPlatform, action, connection, registry, trigger},
  };

  fn rule(action: &str, kind: Option<&str>) -> Rule {
    let mut config = RuleConfig::new(action);
    config.entity_type = kind.map(str::to_string);
    Rule::from_config(&config, &mut registry(&Rc::new(MockPlatform::default())), &Span::none())
      .unwrap()
  }

  #[test]
  fn triage_truth_table() {
    let subject = trigger("MOVE", Some("VirtualMachine"), "SUCCEEDED");

    // action equal
    assert!(rule("MOVE", None).triage(&subject));
    assert!(rule("MOVE", Some("VirtualMachine")).triage(&subject));
    assert!(!rule("MOVE", Some("PhysicalMachine")).triage(&subject));
    // action differs
    assert!(!rule("RESIZE", None).triage(&subject));
    assert!(!rule("RESIZE", Some("VirtualMachine")).triage(&subject));
    assert!(!rule("RESIZE", Some("PhysicalMachine")).triage(&subject));
  }

  #[test]
  fn triage_with_untyped_trigger() {
    let subject = trigger("MOVE", None, "SUCCEEDED");
    assert!(rule("MOVE", None).triage(&subject));
    assert!(!rule("MOVE", Some("VirtualMachine")).triage(&subject));
    assert!(!rule("RESIZE", None).triage(&subject));
  }

  #[test]
  fn triage_rejects_subject_without_trigger() {
    assert!(!rule("MOVE", None).triage(&Subject::from_id("vm-1")));
  }

  #[test]
  fn criteria_rendering() {
    let mut config = RuleConfig::new("MOVE");
    config.entity_type = Some("VirtualMachine".into());
    config.failure_count = 2;
    let platform = Rc::new(MockPlatform::default());

    let in_a_row = Rule::from_config(&config, &mut registry(&platform), &Span::none()).unwrap();
    assert_eq!(in_a_row.criteria(), "Fail VirtualMachine MOVE actions 2 in a row.");

    config.attempt_count = Some(5);
    config.entity_type = None;
    let windowed = Rule::from_config(&config, &mut registry(&platform), &Span::none()).unwrap();
    assert_eq!(windowed.to_string(), "Fail any MOVE actions 2 out of 5 attempts.");
  }

  #[test]
  fn from_config_shares_registry_stores() {
    let platform = Rc::new(MockPlatform::default());
    let mut registry = registry(&platform);
    let mut config = RuleConfig::new("MOVE");
    config.stores = vec![
      StoreConfig::group("Quarantine", "VirtualMachine"),
      StoreConfig::of_kind("unknown"),
    ];

    let a = Rule::from_config(&config, &mut registry, &Span::none()).unwrap();
    config.action_type = "RESIZE".into();
    let b = Rule::from_config(&config, &mut registry, &Span::none()).unwrap();

    assert_eq!(a.stores().len(), 2);
    assert!(Rc::ptr_eq(&a.stores()[0], &b.stores()[0]));
    assert_eq!(registry.all_stores().len(), 2);
  }

  #[test]
  fn from_config_carries_thresholds() {
    let mut config = RuleConfig::new("RESIZE");
    config.entity_type = Some("VirtualMachine".into());
    config.lookback_hours = 168;
    config.failure_count = 2;
    config.attempt_count = Some(5);

    let resize =
      Rule::from_config(&config, &mut registry(&Rc::new(MockPlatform::default())), &Span::none())
        .unwrap();
    assert_eq!(resize.action_kind(), "RESIZE");
    assert_eq!(resize.subject_kind(), Some("VirtualMachine"));
    assert_eq!(resize.lookback(), Duration::hours(168));
    assert_eq!(resize.failure_threshold(), 2);
    assert_eq!(resize.attempt_window(), Some(5));

    let defaults = rule("MOVE", None);
    assert_eq!(defaults.subject_kind(), None);
    assert_eq!(defaults.lookback(), Duration::hours(720));
    assert_eq!(defaults.failure_threshold(), 1);
    assert_eq!(defaults.attempt_window(), None);
  }

  #[test]
  fn from_config_rejects_invalid_rules() {
    let platform = Rc::new(MockPlatform::default());
    let mut config = RuleConfig::new("MOVE");
    config.failure_count = 0;
    assert!(matches!(
      Rule::from_config(&config, &mut registry(&platform), &Span::none()),
      Err(Error::InvalidConfig(_))
    ));
  }

  #[test]
  fn count_failures_orders_by_timestamp() {
    // Returned newest first; the window must apply to the chronological tail.
    let events = vec![
      action("FAILED", "2024-03-01T05:00:00Z"),
      action("FAILED", "2024-03-01T04:00:00Z"),
      action("SUCCEEDED", "2024-03-01T03:00:00Z"),
      action("FAILED", "2024-03-01T02:00:00Z"),
    ];
    assert_eq!(count_failures(events.clone(), None).unwrap(), 3);
    assert_eq!(count_failures(events.clone(), Some(2)).unwrap(), 2);
    assert_eq!(count_failures(events.clone(), Some(3)).unwrap(), 2);
    assert_eq!(count_failures(events, Some(10)).unwrap(), 3);
  }

  #[test]
  fn count_failures_compares_across_offsets() {
    let events = vec![
      // 09:00 UTC
      action("FAILED", "2024-03-01T10:00:00+01:00"),
      // 10:00 UTC
      action("SUCCEEDED", "2024-03-01T05:00:00-05:00"),
    ];
    assert_eq!(count_failures(events, Some(1)).unwrap(), 0);
  }

  #[test]
  fn count_failures_rejects_bad_timestamps() {
    let events = vec![
      action("FAILED", "2024-03-01T05:00:00Z"),
      action("FAILED", "last tuesday"),
    ];
    assert!(matches!(
      count_failures(events, None),
      Err(Error::UnparsableTimestamp { .. })
    ));
  }

  #[test]
  fn admit_stops_at_first_failing_store() {
    let platform = Rc::new(MockPlatform::default());
    platform.add_group("First", &[]);
    platform.fail_group_writes("Second");
    platform.add_group("Third", &[]);

    let mut registry = registry(&platform);
    let mut config = RuleConfig::new("MOVE");
    config.stores = vec![
      StoreConfig::group("First", "VirtualMachine"),
      StoreConfig::group("Second", "VirtualMachine"),
      StoreConfig::group("Third", "VirtualMachine"),
    ];
    let rule = Rule::from_config(&config, &mut registry, &Span::none()).unwrap();

    let subject = Subject::from_id("vm-1");
    assert!(matches!(rule.admit(&subject), Err(Error::StoreOperation { .. })));
    assert_eq!(platform.members_of("First"), vec!["vm-1"]);
    assert!(platform.members_of("Third").is_empty());
  }

  #[test]
  fn discharge_touches_every_store() {
    let platform = Rc::new(MockPlatform::default());
    platform.add_group("First", &["vm-1", "vm-2"]);
    platform.add_group("Second", &["vm-1"]);

    let mut registry = registry(&platform);
    let mut config = RuleConfig::new("MOVE");
    config.stores = vec![
      StoreConfig::group("First", "VirtualMachine"),
      StoreConfig::group("Second", "VirtualMachine"),
    ];
    let rule = Rule::from_config(&config, &mut registry, &Span::none()).unwrap();

    rule.discharge(&Subject::from_id("vm-1")).unwrap();
    assert_eq!(platform.members_of("First"), vec!["vm-2"]);
    assert!(platform.members_of("Second").is_empty());
  }

  #[test]
  fn connection_is_not_opened_by_construction() {
    let platform = Rc::new(MockPlatform::default());
    let conn = connection(&platform);
    let mut registry = StoreRegistry::new(Rc::clone(&conn), None, Span::none());
    let mut config = RuleConfig::new("MOVE");
    config.stores = vec![StoreConfig::group("Quarantine", "VirtualMachine")];
    Rule::from_config(&config, &mut registry, &Span::none()).unwrap();
    assert_eq!(platform.search_calls(), 0);
  }
}
