//! Blocking HTTP client for the management platform's REST API.
//!
//! Implements [`sickbay_core::client::PlatformClient`] over a cookie-backed
//! session, and [`sickbay_core::connection::Connect`] so the session is only
//! opened when a rule needs it.

mod client;

pub mod error;

pub use client::{HttpConnector, HttpPlatform, PlatformSettings};
pub use error::{PlatformError, Result};
