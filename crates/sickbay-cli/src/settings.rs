//! Configuration file loading.

use std::path::Path;

use anyhow::Context as _;
use serde::Deserialize;
use sickbay_core::config::RuleConfig;
use sickbay_platform::PlatformSettings;

/// Shape of the configuration file.
///
/// `rules` is required: a file without it is rejected rather than silently
/// loading no rules.
#[derive(Debug, Deserialize, Default)]
pub struct Settings {
  #[serde(default)]
  pub platform: PlatformSettings,
  pub rules:    Vec<RuleConfig>,
}

/// `SICKBAY_*` variables, with `__` separating nested keys:
/// `SICKBAY_PLATFORM__PASSWORD` sets `platform.password`.
fn environment() -> config::Environment {
  config::Environment::with_prefix("SICKBAY")
    .prefix_separator("_")
    .separator("__")
}

impl Settings {
  /// Read `path`, then layer `SICKBAY_*` environment variables on top.
  pub fn load(path: &Path) -> anyhow::Result<Self> { Self::load_with(path, environment()) }

  fn load_with(path: &Path, env: config::Environment) -> anyhow::Result<Self> {
    let raw = config::Config::builder()
      .add_source(config::File::from(path).required(true))
      .add_source(env)
      .build()
      .with_context(|| format!("failed to read config file {}", path.display()))?;

    raw
      .try_deserialize()
      .context("failed to deserialise configuration")
  }

  /// CLI flags take precedence over the file.
  pub fn with_overrides(
    mut self,
    host: Option<String>,
    user: Option<String>,
    password: Option<String>,
    ssl: bool,
  ) -> Self {
    if let Some(host) = host {
      self.platform.host = host;
    }
    if let Some(user) = user {
      self.platform.username = user;
    }
    if let Some(password) = password {
      self.platform.password = password;
    }
    self.platform.ssl |= ssl;
    self
  }
}
