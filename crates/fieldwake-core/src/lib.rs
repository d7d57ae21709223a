//! Fieldwake Core Library
//!
//! Building blocks for the Fieldwake device command server:
//! - Validated device keys and report payloads
//! - Per-device command rendezvous with bounded wait
//! - Crash-safe append-only event log
//! - TTL status cache
//! - Configuration resolution and tracing setup

pub mod config;
pub mod device;
pub mod error;
pub mod event_log;
pub mod rendezvous;
pub mod report;
pub mod status_cache;
pub mod tracing_init;

pub use config::ServerConfig;
pub use device::DeviceKey;
pub use error::{Error, Result};
pub use event_log::{EventLog, JsonFileStore, LogStore};
pub use rendezvous::{Command, Rendezvous, RendezvousConfig, TriggerOutcome, WaitTicket};
pub use report::{DeviceReport, ReportBody, ReportRecord};
pub use status_cache::{StatusCache, StatusEntry};
