//! Device report payloads.
//!
//! [`ReportBody`] is what arrives on the wire, [`DeviceReport`] is the
//! validated form shared by the event log and the status cache, and
//! [`ReportRecord`] is a report stamped with the server's append time.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::device::DeviceKey;
use crate::error::ValidationError;

/// Raw report body as posted by a device. Every field is optional here so
/// that missing fields turn into a [`ValidationError`] instead of a parse
/// failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportBody {
    pub device_key: Option<String>,
    pub device: Option<String>,
    pub status: Option<String>,
    pub timestamp: Option<Value>,
    pub uptime: Option<Value>,
    #[serde(alias = "local_ip")]
    pub localip: Option<String>,
    pub resent: Option<bool>,
}

/// A validated device report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceReport {
    pub device_key: DeviceKey,
    pub device_label: String,
    pub status: String,
    /// Device-side clock reading, normalized to a string.
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_ip: Option<String>,
    #[serde(default)]
    pub resent: bool,
}

impl DeviceReport {
    /// Validate a raw body. `received_at` (Unix seconds) stands in for a
    /// missing device timestamp.
    pub fn from_body(body: ReportBody, received_at: i64) -> Result<Self, ValidationError> {
        let raw_key = required(body.device_key, "device_key")?;
        let device_key = DeviceKey::parse(&raw_key)?;
        let device_label = required(body.device, "device")?;
        let status = required(body.status, "status")?;

        let timestamp = match body.timestamp {
            Some(Value::String(s)) if !s.trim().is_empty() => s,
            Some(Value::Number(n)) => n.to_string(),
            _ => received_at.to_string(),
        };

        Ok(Self {
            device_key,
            device_label,
            status,
            timestamp,
            uptime: body.uptime.as_ref().and_then(lenient_u64),
            local_ip: body.localip.filter(|ip| !ip.trim().is_empty()),
            resent: body.resent.unwrap_or(false),
        })
    }
}

fn required(value: Option<String>, field: &'static str) -> Result<String, ValidationError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ValidationError::MissingField(field)),
    }
}

/// Devices send uptime either as a JSON number or a numeric string.
fn lenient_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// A report as stored in the event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRecord {
    #[serde(flatten)]
    pub report: DeviceReport,
    /// Server append time, Unix seconds.
    pub created_at: i64,
}

impl ReportRecord {
    pub const fn new(report: DeviceReport, created_at: i64) -> Self {
        Self { report, created_at }
    }
}

/// Returns the current time as a Unix timestamp (seconds since epoch).
#[allow(clippy::cast_possible_wrap)]
pub fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
