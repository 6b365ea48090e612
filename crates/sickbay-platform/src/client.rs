//! [`HttpPlatform`], the reqwest implementation of [`PlatformClient`].

use std::{collections::BTreeMap, rc::Rc, time::Duration};

use reqwest::{
  Method,
  blocking::{Client, RequestBuilder, Response},
  header::{AUTHORIZATION, HeaderMap, HeaderValue},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use sickbay_core::{
  client::{ClientResult, Collection, EntityDetail, HistoryQuery, Member, PlatformClient},
  connection::Connect,
  error::ClientError,
};
use tracing::{debug, info};

use crate::{PlatformError, Result};

// ─── Settings ────────────────────────────────────────────────────────────────

fn default_host() -> String { "api.turbonomic.svc.cluster.local:8080".into() }
fn default_timeout_secs() -> u64 { 30 }

/// Connection settings, deserialised from the `platform` section of the
/// configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct PlatformSettings {
  /// `host[:port]` of the platform API.
  #[serde(default = "default_host")]
  pub host:         String,
  #[serde(default)]
  pub username:     String,
  #[serde(default)]
  pub password:     String,
  /// Pre-encoded basic-auth credential (`base64(user:password)`), sent on
  /// every request. Used when no username is configured.
  #[serde(default)]
  pub auth:         Option<String>,
  /// Use HTTPS instead of HTTP.
  #[serde(default)]
  pub ssl:          bool,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

impl Default for PlatformSettings {
  fn default() -> Self {
    Self {
      host:         default_host(),
      username:     String::new(),
      password:     String::new(),
      auth:         None,
      ssl:          false,
      timeout_secs: default_timeout_secs(),
    }
  }
}

impl PlatformSettings {
  pub fn base_url(&self) -> String {
    let scheme = if self.ssl { "https" } else { "http" };
    format!("{scheme}://{}/api/v3", self.host.trim_end_matches('/'))
  }
}

// ─── Client ──────────────────────────────────────────────────────────────────

/// Blocking client for the platform's v3 REST API.
///
/// Authentication is a session cookie obtained by [`HttpPlatform::login`].
pub struct HttpPlatform {
  client:   Client,
  base_url: String,
}

impl HttpPlatform {
  pub fn new(settings: &PlatformSettings) -> Result<Self> {
    let mut builder = Client::builder()
      .timeout(Duration::from_secs(settings.timeout_secs))
      .cookie_store(true);
    if let Some(auth) = &settings.auth {
      builder = builder.default_headers(basic_auth_headers(auth)?);
    }
    Ok(Self { client: builder.build()?, base_url: settings.base_url() })
  }

  /// Build a client and open an authenticated session.
  ///
  /// Without a username, a configured `auth` credential authenticates each
  /// request instead and no login request is made.
  pub fn login(settings: &PlatformSettings) -> Result<Self> {
    if settings.username.is_empty() {
      if settings.auth.is_none() {
        return Err(PlatformError::Login("no username or auth credential configured".into()));
      }
      let platform = Self::new(settings)?;
      info!(host = %settings.host, "using stored platform credential");
      return Ok(platform);
    }
    let platform = Self::new(settings)?;
    let resp = platform
      .client
      .post(platform.url("/login"))
      .form(&[
        ("username", settings.username.as_str()),
        ("password", settings.password.as_str()),
      ])
      .send()?;
    if !resp.status().is_success() {
      return Err(PlatformError::Login(format!("{} as {}", resp.status(), settings.username)));
    }
    info!(host = %settings.host, user = %settings.username, "logged in to platform");
    Ok(platform)
  }

  fn url(&self, path: &str) -> String { format!("{}{path}", self.base_url) }

  fn request(&self, method: Method, path: &str) -> RequestBuilder {
    debug!(%method, path, "platform request");
    self.client.request(method, self.url(path))
  }

  fn send(method: &'static str, path: &str, req: RequestBuilder) -> Result<Response> {
    let resp = req.send()?;
    if !resp.status().is_success() {
      return Err(PlatformError::Status { method, path: path.to_string(), status: resp.status() });
    }
    Ok(resp)
  }

  fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
    let req = self.request(Method::GET, path).query(query);
    Ok(Self::send("GET", path, req)?.json()?)
  }

  fn post<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
    let req = self.request(Method::POST, path).json(body);
    Ok(Self::send("POST", path, req)?.json()?)
  }

  fn put<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<()> {
    let req = self.request(Method::PUT, path).json(body);
    Self::send("PUT", path, req)?;
    Ok(())
  }

  fn update_members(&self, collection: &Collection, member_ids: &[String]) -> Result<()> {
    let path = format!("/groups/{}", collection.uuid);
    let mut group: Value = self.get(&path, &[])?;
    let fields = group
      .as_object_mut()
      .ok_or_else(|| PlatformError::Unexpected(format!("group {} is not an object", collection.uuid)))?;
    fields.insert("isStatic".into(), json!(true));
    fields.insert("memberUuidList".into(), json!(member_ids));
    self.put(&path, &group)
  }
}

impl PlatformClient for HttpPlatform {
  fn search_collections(&self, kind: &str, name: &str) -> ClientResult<Vec<Collection>> {
    Ok(self.get("/search", &[("types", kind), ("q", name)])?)
  }

  fn create_collection(&self, name: &str, entity_kind: &str) -> ClientResult<Collection> {
    let body = json!({
      "displayName":    name,
      "groupType":      entity_kind,
      "isStatic":       true,
      "memberUuidList": [],
    });
    Ok(self.post("/groups", &body)?)
  }

  fn collection_members(&self, collection: &Collection) -> ClientResult<Vec<Member>> {
    Ok(self.get(&format!("/groups/{}/members", collection.uuid), &[])?)
  }

  fn set_collection_members(
    &self,
    collection: &Collection,
    member_ids: &[String],
  ) -> ClientResult<()> {
    Ok(self.update_members(collection, member_ids)?)
  }

  fn action_history(&self, query: &HistoryQuery) -> ClientResult<Vec<Value>> {
    Ok(self.post("/actions", &history_body(query))?)
  }

  fn entity_detail(&self, id: &str) -> ClientResult<EntityDetail> {
    let raw: RawEntity = self.get(&format!("/entities/{id}"), &[])?;
    Ok(raw.into())
  }
}

fn basic_auth_headers(auth: &str) -> Result<HeaderMap> {
  let mut value = HeaderValue::from_str(&format!("Basic {}", auth.trim()))
    .map_err(|_| PlatformError::Login("auth credential is not a valid header value".into()))?;
  value.set_sensitive(true);
  let mut headers = HeaderMap::new();
  headers.insert(AUTHORIZATION, value);
  Ok(headers)
}

fn history_body(query: &HistoryQuery) -> Value {
  json!({
    "actionInput": {
      "startTime":       query.start.to_rfc3339(),
      "endTime":         query.end.to_rfc3339(),
      "actionTypeList":  [query.action_kind],
      "actionStateList": query.outcomes,
    }
  })
}

/// Entity record as returned by `GET /entities/{uuid}`. Tags arrive either as
/// a list or as a `key → [values]` map; both flatten to strings.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEntity {
  #[serde(default)]
  tags:       Value,
  #[serde(default)]
  vendor_ids: BTreeMap<String, String>,
}

impl From<RawEntity> for EntityDetail {
  fn from(raw: RawEntity) -> Self {
    let tags = match raw.tags {
      Value::Array(items) => items.into_iter().map(value_text).collect(),
      Value::Object(map) => map
        .into_iter()
        .flat_map(|(key, values)| match values {
          Value::Array(vs) => vs.into_iter().map(|v| format!("{key}={}", value_text(v))).collect(),
          other => vec![format!("{key}={}", value_text(other))],
        })
        .collect(),
      _ => Vec::new(),
    };
    Self { tags, vendor_ids: raw.vendor_ids }
  }
}

fn value_text(value: Value) -> String {
  match value {
    Value::String(s) => s,
    other => other.to_string(),
  }
}

// ─── Connector ───────────────────────────────────────────────────────────────

/// Opens an [`HttpPlatform`] session on demand.
pub struct HttpConnector {
  settings: PlatformSettings,
}

impl HttpConnector {
  pub fn new(settings: PlatformSettings) -> Self { Self { settings } }
}

impl Connect for HttpConnector {
  fn connect(&self) -> std::result::Result<Rc<dyn PlatformClient>, ClientError> {
    Ok(Rc::new(HttpPlatform::login(&self.settings)?))
  }
}

#[cfg(test)]
mod tests {
  use chrono::{TimeZone, Utc};

  use super::*;

  #[test]
  fn base_url_follows_ssl_flag() {
    let mut settings = PlatformSettings { host: "ops.example.com/".into(), ..Default::default() };
    assert_eq!(settings.base_url(), "http://ops.example.com/api/v3");
    settings.ssl = true;
    assert_eq!(settings.base_url(), "https://ops.example.com/api/v3");
  }

  #[test]
  fn settings_defaults() {
    let settings: PlatformSettings = serde_json::from_value(json!({})).unwrap();
    assert_eq!(settings.host, "api.turbonomic.svc.cluster.local:8080");
    assert!(!settings.ssl);
    assert_eq!(settings.timeout_secs, 30);
  }

  #[test]
  fn history_body_shape() {
    let query = HistoryQuery {
      action_kind: "MOVE".into(),
      start:       Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
      end:         Utc.with_ymd_and_hms(2024, 3, 31, 0, 0, 0).unwrap(),
      outcomes:    vec!["SUCCEEDED".into(), "FAILED".into()],
    };
    let body = history_body(&query);
    assert_eq!(body["actionInput"]["actionTypeList"], json!(["MOVE"]));
    assert_eq!(body["actionInput"]["actionStateList"], json!(["SUCCEEDED", "FAILED"]));
    assert_eq!(body["actionInput"]["startTime"], json!("2024-03-01T00:00:00+00:00"));
  }

  #[test]
  fn entity_tags_as_list() {
    let raw: RawEntity = serde_json::from_value(json!({
      "uuid":      "e-1",
      "tags":      ["prod", "web"],
      "vendorIds": { "vc.example.com": "vm-101" },
    }))
    .unwrap();
    let detail = EntityDetail::from(raw);
    assert_eq!(detail.tags, vec!["prod", "web"]);
    assert_eq!(detail.vendor_ids["vc.example.com"], "vm-101");
  }

  #[test]
  fn entity_tags_as_map() {
    let raw: RawEntity = serde_json::from_value(json!({
      "tags": { "env": ["prod"], "owner": ["ops", "web"] },
    }))
    .unwrap();
    let detail = EntityDetail::from(raw);
    assert_eq!(detail.tags, vec!["env=prod", "owner=ops", "owner=web"]);
    assert!(detail.vendor_ids.is_empty());
  }

  #[test]
  fn entity_without_details() {
    let raw: RawEntity = serde_json::from_value(json!({ "uuid": "e-1" })).unwrap();
    assert_eq!(EntityDetail::from(raw), EntityDetail::default());
  }

  #[test]
  fn login_requires_username_or_auth() {
    assert!(matches!(
      HttpPlatform::login(&PlatformSettings::default()),
      Err(PlatformError::Login(_))
    ));
  }

  #[test]
  fn stored_credential_skips_login() {
    let settings = PlatformSettings {
      host: "127.0.0.1:9".into(),
      auth: Some("b3BzOnNlY3JldA==".into()),
      ..Default::default()
    };
    assert!(HttpPlatform::login(&settings).is_ok());
  }

  #[test]
  fn auth_header_is_basic_and_sensitive() {
    let headers = basic_auth_headers("b3BzOnNlY3JldA==\n").unwrap();
    let value = &headers[AUTHORIZATION];
    assert_eq!(value.to_str().unwrap(), "Basic b3BzOnNlY3JldA==");
    assert!(value.is_sensitive());

    assert!(matches!(basic_auth_headers("bad\rvalue"), Err(PlatformError::Login(_))));
  }
}
