//! `sickbay`: quarantine entities whose automated actions keep failing.
//!
//! Runs once per invocation, in one of three modes:
//!
//! ```text
//! sickbay --config config.yaml < payload.json   # evaluate a triggering action
//! sickbay --config config.yaml --discharge      # release everything quarantined
//! sickbay --config config.yaml --release 7412   # release one entity
//! ```

mod settings;

use std::{
  fs::OpenOptions,
  io::{self, Read},
  path::{Path, PathBuf},
  rc::Rc,
  sync::Mutex,
};

use anyhow::{Context, Result};
use clap::Parser;
use sickbay_core::{
  connection::Connection,
  engine::{Engine, RuleVerdict, Verdict},
  subject::Subject,
};
use sickbay_platform::HttpConnector;
use tracing::{info, info_span, level_filters::LevelFilter, warn};
use tracing_subscriber::EnvFilter;

use settings::Settings;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "sickbay", version, about = "Quarantine entities whose automated actions keep failing")]
struct Args {
  /// Path to the configuration file (YAML, TOML or JSON).
  #[arg(short, long, env = "SICKBAY_CONFIG", default_value = "/etc/sickbay/config.yaml")]
  config: PathBuf,

  /// Platform API `host[:port]`; overrides `platform.host`.
  #[arg(long, env = "SICKBAY_HOST")]
  host: Option<String>,

  /// Platform username; overrides `platform.username`.
  #[arg(short, long, env = "SICKBAY_USER")]
  user: Option<String>,

  /// Platform password; overrides `platform.password`.
  #[arg(short, long, env = "SICKBAY_PASSWORD", hide_env_values = true)]
  password: Option<String>,

  /// Connect to the platform over HTTPS.
  #[arg(long, env = "SICKBAY_SSL")]
  ssl: bool,

  /// Log at debug level unless `RUST_LOG` says otherwise.
  #[arg(long, env = "SICKBAY_DEBUG")]
  debug: bool,

  /// Append logs to this file instead of stderr.
  #[arg(long, env = "SICKBAY_LOG_FILE", value_name = "FILE")]
  log_file: Option<PathBuf>,

  /// Release every quarantined entity instead of evaluating a payload.
  #[arg(long, env = "SICKBAY_DISCHARGE", conflicts_with = "release")]
  discharge: bool,

  /// Release a single entity from every rule's stores.
  #[arg(long, value_name = "ENTITY_ID")]
  release: Option<String>,

  /// Display name of the triggering entity, used in log lines only.
  #[arg(long, env = "VMT_TARGET_NAME", hide = true)]
  target_name: Option<String>,
}

// ─── Entry point ──────────────────────────────────────────────────────────────

fn main() -> Result<()> {
  let args = Args::parse();
  init_tracing(args.debug, args.log_file.as_deref())?;

  let settings = Settings::load(&args.config)?.with_overrides(
    args.host.clone(),
    args.user.clone(),
    args.password.clone(),
    args.ssl,
  );
  if settings.rules.is_empty() {
    warn!(config = %args.config.display(), "no quarantine rules configured");
  }

  // Rules and stores are built eagerly; the platform session is not opened
  // until a rule needs it.
  let connection = Rc::new(Connection::new(HttpConnector::new(settings.platform.clone())));
  let engine = Engine::from_config(&settings.rules, connection, None, info_span!("sickbay"))
    .context("building quarantine rules")?;

  if args.discharge {
    let report = engine.discharge_sweep();
    info!(released = report.released.len(), failures = report.failures, "discharge sweep finished");
  } else if let Some(id) = &args.release {
    let verdicts = engine.release(&Subject::from_id(id.as_str()));
    log_verdicts(id, &verdicts);
  } else {
    let entity = args.target_name.as_deref().unwrap_or("<unnamed>");
    info!(entity, "processing triggering action");

    let mut raw = String::new();
    io::stdin()
      .read_to_string(&mut raw)
      .context("reading triggering payload from stdin")?;
    let verdicts = engine
      .evaluate_payload(&raw)
      .context("evaluating triggering payload")?;
    log_verdicts(entity, &verdicts);
  }

  Ok(())
}

fn init_tracing(debug: bool, log_file: Option<&Path>) -> Result<()> {
  let default_level = if debug { LevelFilter::DEBUG } else { LevelFilter::INFO };
  let filter = EnvFilter::builder()
    .with_default_directive(default_level.into())
    .from_env_lossy();
  let builder = tracing_subscriber::fmt().with_env_filter(filter);

  match log_file {
    Some(path) => {
      let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening log file {}", path.display()))?;
      builder.with_ansi(false).with_writer(Mutex::new(file)).init();
    }
    None => builder.with_writer(io::stderr).init(),
  }
  Ok(())
}

fn log_verdicts(entity: &str, verdicts: &[RuleVerdict]) {
  for RuleVerdict { criteria, verdict } in verdicts {
    match verdict {
      Verdict::Admitted => info!(entity, %criteria, "quarantined"),
      Verdict::Discharged => info!(entity, %criteria, "released"),
      Verdict::Failed(e) => warn!(entity, %criteria, error = %e, "rule failed"),
      Verdict::Skipped | Verdict::Healthy => {}
    }
  }
}
