//! The per-invocation run: admit evaluation, manual release, and the
//! discharge sweep.
//!
//! Rules are independent. A failure while evaluating one rule is logged with
//! the rule's criteria and the subject id, recorded as [`Verdict::Failed`],
//! and does not stop the remaining rules. Only a payload that cannot be turned
//! into a [`Subject`] aborts a run.

use std::rc::Rc;

use tracing::{Span, error, info, info_span};

use crate::{
  Result,
  client::InventoryClient,
  config::RuleConfig,
  connection::Connection,
  rule::Rule,
  store::StoreRegistry,
  subject::Subject,
};

/// What happened to a subject under one rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
  /// The triggering event did not match the rule.
  Skipped,
  /// Matched, but the failure threshold was not met.
  Healthy,
  Admitted,
  Discharged,
  Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleVerdict {
  pub criteria: String,
  pub verdict:  Verdict,
}

/// Outcome of a discharge sweep.
#[derive(Debug, Default)]
pub struct SweepReport {
  pub released: Vec<Subject>,
  /// Stores whose sweep failed.
  pub failures: usize,
}

pub struct Engine {
  connection: Rc<Connection>,
  registry:   StoreRegistry,
  rules:      Vec<Rule>,
  span:       Span,
}

impl Engine {
  /// Build every rule and store from configuration. No platform session is
  /// opened here.
  pub fn from_config(
    rules: &[RuleConfig],
    connection: Rc<Connection>,
    inventory: Option<Rc<dyn InventoryClient>>,
    span: Span,
  ) -> Result<Self> {
    let mut registry = StoreRegistry::new(
      Rc::clone(&connection),
      inventory,
      info_span!(parent: &span, "registry"),
    );
    let rules = rules
      .iter()
      .map(|r| Rule::from_config(r, &mut registry, &span))
      .collect::<Result<Vec<_>>>()?;

    info!(
      parent: &span,
      rules = rules.len(),
      stores = registry.all_stores().len(),
      "loaded quarantine rules"
    );
    Ok(Self { connection, registry, rules, span })
  }

  pub fn rules(&self) -> &[Rule] { &self.rules }

  pub fn registry(&self) -> &StoreRegistry { &self.registry }

  /// Parse a triggering payload and evaluate it against every rule.
  pub fn evaluate_payload(&self, raw: &str) -> Result<Vec<RuleVerdict>> {
    let mut subject = Subject::from_json(raw)?;
    Ok(self.evaluate(&mut subject))
  }

  /// Evaluate `subject` against every rule: triage, diagnose, and admit to
  /// the rule's stores on a positive diagnosis. A subject may be admitted
  /// under several rules in one run.
  pub fn evaluate(&self, subject: &mut Subject) -> Vec<RuleVerdict> {
    info!(parent: &self.span, subject = %subject.id, "evaluating subject");
    let mut verdicts = Vec::with_capacity(self.rules.len());
    for rule in &self.rules {
      let verdict = match self.evaluate_rule(rule, subject) {
        Ok(verdict) => verdict,
        Err(e) => self.failed(rule, subject, e),
      };
      verdicts.push(RuleVerdict { criteria: rule.criteria(), verdict });
    }
    verdicts
  }

  fn evaluate_rule(&self, rule: &Rule, subject: &mut Subject) -> Result<Verdict> {
    if !rule.triage(subject) {
      return Ok(Verdict::Skipped);
    }

    let client = self.connection.session()?;
    if !rule.diagnose(subject, client.as_ref())? {
      return Ok(Verdict::Healthy);
    }

    subject.fetch_detail(client.as_ref())?;
    rule.admit(subject)?;
    info!(
      parent: &self.span,
      subject = %subject.id,
      criteria = %rule.criteria(),
      "quarantined subject"
    );
    Ok(Verdict::Admitted)
  }

  /// Release `subject` from the stores of every rule.
  pub fn release(&self, subject: &Subject) -> Vec<RuleVerdict> {
    self
      .rules
      .iter()
      .map(|rule| {
        let verdict = match rule.discharge(subject) {
          Ok(()) => Verdict::Discharged,
          Err(e) => self.failed(rule, subject, e),
        };
        RuleVerdict { criteria: rule.criteria(), verdict }
      })
      .collect()
  }

  /// Ask every known store to release its eligible subjects.
  pub fn discharge_sweep(&self) -> SweepReport {
    let mut report = SweepReport::default();
    for store in self.registry.all_stores() {
      match store.discharge_eligible() {
        Ok(released) => {
          info!(parent: &self.span, store = %store.key(), released = released.len(), "swept store");
          report.released.extend(released);
        }
        Err(e) => {
          error!(parent: &self.span, store = %store.key(), error = %e, "discharge sweep failed");
          report.failures += 1;
        }
      }
    }
    report
  }

  fn failed(&self, rule: &Rule, subject: &Subject, e: crate::Error) -> Verdict {
    error!(
      parent: &self.span,
      subject = %subject.id,
      criteria = %rule.criteria(),
      error = %e,
      "rule evaluation failed"
    );
    Verdict::Failed(e.to_string())
  }
}
