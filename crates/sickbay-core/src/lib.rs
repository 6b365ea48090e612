//! Core types and rule engine for the sickbay quarantine gatekeeper.
//!
//! Automated platform actions that keep failing against an entity get that
//! entity admitted to one or more quarantine stores, where further automation
//! leaves it alone until it is discharged.
//!
//! This crate is free of HTTP dependencies. The platform and inventory are
//! reached only through the traits in [`client`].

pub mod client;
pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod event;
pub mod rule;
pub mod store;
pub mod subject;

pub use error::{Error, Result};
