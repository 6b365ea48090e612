//! [`GroupStore`]: quarantine by membership of a static platform group.

use std::{cell::OnceCell, rc::Rc};

use tracing::{Span, debug, info};

use super::{QuarantineStore, StoreKey};
use crate::{
  Error, Result,
  client::{Collection, PlatformClient},
  config::StoreKind,
  connection::Connection,
  error::ClientError,
  subject::Subject,
};

/// Collection kind passed to [`PlatformClient::search_collections`].
pub const GROUP_COLLECTION_KIND: &str = "Group";

/// Quarantine backed by a named static group on the management platform.
///
/// The group is looked up by name on first use and created if no group of
/// that name exists. The resolved handle is cached for the rest of the run.
pub struct GroupStore {
  key:         StoreKey,
  name:        String,
  entity_kind: String,
  connection:  Rc<Connection>,
  group:       OnceCell<Collection>,
  span:        Span,
}

impl GroupStore {
  pub fn new(
    name: impl Into<String>,
    entity_kind: impl Into<String>,
    connection: Rc<Connection>,
    span: Span,
  ) -> Self {
    let name = name.into();
    Self {
      key: StoreKey { kind: StoreKind::GROUP.into(), discriminator: Some(name.clone()) },
      name,
      entity_kind: entity_kind.into(),
      connection,
      group: OnceCell::new(),
      span,
    }
  }

  pub fn name(&self) -> &str { &self.name }

  /// The platform session, with a failure to open it attributed to this store.
  fn client(&self) -> Result<Rc<dyn PlatformClient>> {
    self.connection.session().map_err(|e| match e {
      Error::Client(source) => self.fail(source),
      other => other,
    })
  }

  fn fail(&self, source: ClientError) -> Error { Error::store(&self.key, source) }

  /// Resolve (and cache) the backing group, creating it if necessary.
  fn group(&self, client: &dyn PlatformClient) -> Result<Collection> {
    if let Some(group) = self.group.get() {
      return Ok(group.clone());
    }

    let existing = client
      .search_collections(GROUP_COLLECTION_KIND, &self.name)
      .map_err(|e| self.fail(e))?
      .into_iter()
      .find(|c| c.display_name.as_deref() == Some(self.name.as_str()));

    let group = match existing {
      Some(group) => {
        debug!(parent: &self.span, group = %group.uuid, "found quarantine group");
        group
      }
      None => {
        let group = client
          .create_collection(&self.name, &self.entity_kind)
          .map_err(|e| self.fail(e))?;
        info!(
          parent: &self.span,
          group = %group.uuid,
          entity_kind = %self.entity_kind,
          "created quarantine group"
        );
        group
      }
    };

    Ok(self.group.get_or_init(|| group).clone())
  }

  fn member_ids(&self, client: &dyn PlatformClient, group: &Collection) -> Result<Vec<String>> {
    Ok(
      client
        .collection_members(group)
        .map_err(|e| self.fail(e))?
        .into_iter()
        .map(|m| m.uuid)
        .collect(),
    )
  }
}

impl QuarantineStore for GroupStore {
  fn key(&self) -> &StoreKey { &self.key }

  fn admit(&self, subject: &Subject) -> Result<()> {
    let client = self.client()?;
    let group = self.group(client.as_ref())?;

    let mut members = self.member_ids(client.as_ref(), &group)?;
    if members.iter().any(|m| *m == subject.id) {
      debug!(parent: &self.span, subject = %subject.id, "already quarantined");
      return Ok(());
    }
    members.push(subject.id.clone());

    client
      .set_collection_members(&group, &members)
      .map_err(|e| self.fail(e))?;
    info!(parent: &self.span, subject = %subject.id, "admitted to quarantine group");
    Ok(())
  }

  fn discharge(&self, subject: &Subject) -> Result<()> {
    let client = self.client()?;
    let group = self.group(client.as_ref())?;

    let members: Vec<String> = self
      .member_ids(client.as_ref(), &group)?
      .into_iter()
      .filter(|m| *m != subject.id)
      .collect();

    client
      .set_collection_members(&group, &members)
      .map_err(|e| self.fail(e))?;
    info!(parent: &self.span, subject = %subject.id, "discharged from quarantine group");
    Ok(())
  }

  fn discharge_eligible(&self) -> Result<Vec<Subject>> {
    let client = self.client()?;
    let group = self.group(client.as_ref())?;

    let members = client
      .collection_members(&group)
      .map_err(|e| self.fail(e))?;
    client
      .set_collection_members(&group, &[])
      .map_err(|e| self.fail(e))?;

    info!(parent: &self.span, released = members.len(), "cleared quarantine group");
    Ok(members.into_iter().map(|m| Subject::from_id(m.uuid)).collect())
  }
}
