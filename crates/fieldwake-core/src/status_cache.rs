//! Short-lived cache of the latest report per device.
//!
//! Entries expire lazily: `get` treats anything past its deadline as absent.
//! `sweep` reclaims the memory and is safe to call from a periodic task.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

use crate::device::DeviceKey;
use crate::report::{DeviceReport, unix_timestamp};

/// Latest report from one device.
#[derive(Debug, Clone, Serialize)]
pub struct StatusEntry {
    #[serde(flatten)]
    pub report: DeviceReport,
    /// Unix seconds.
    pub received_at: i64,
    /// Unix seconds.
    pub expires_at: i64,
    /// `None` when the TTL reaches past what the clock can represent.
    #[serde(skip)]
    deadline: Option<Instant>,
}

impl StatusEntry {
    fn is_expired_at(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }
}

pub struct StatusCache {
    entries: RwLock<HashMap<DeviceKey, StatusEntry>>,
    ttl: Duration,
}

impl StatusCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Store `report` as the latest for its device, replacing any previous
    /// entry and restarting the TTL.
    pub fn put(&self, report: DeviceReport) -> StatusEntry {
        let received_at = unix_timestamp();
        let ttl_secs = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let entry = StatusEntry {
            report,
            received_at,
            expires_at: received_at.saturating_add(ttl_secs),
            deadline: Instant::now().checked_add(self.ttl),
        };
        let key = entry.report.device_key.clone();
        debug!(device_key = %key, ttl_secs = self.ttl.as_secs(), "Status cached");
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, entry.clone());
        entry
    }

    /// Latest unexpired entry for `key`.
    pub fn get(&self, key: &DeviceKey) -> Option<StatusEntry> {
        let now = Instant::now();
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .filter(|entry| !entry.is_expired_at(now))
            .cloned()
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired_at(now));
        before - entries.len()
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::report::ReportBody;

    fn report(key: &str, status: &str) -> DeviceReport {
        DeviceReport::from_body(
            ReportBody {
                device_key: Some(key.to_string()),
                device: Some("esp32".to_string()),
                status: Some(status.to_string()),
                ..Default::default()
            },
            0,
        )
        .unwrap()
    }

    fn key(s: &str) -> DeviceKey {
        DeviceKey::parse(s).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn get_within_ttl_returns_entry() {
        let cache = StatusCache::new(Duration::from_secs(30));
        let stored = cache.put(report("dev-1", "online"));
        assert_eq!(stored.expires_at - stored.received_at, 30);

        tokio::time::advance(Duration::from_secs(29)).await;
        let entry = cache.get(&key("dev-1")).unwrap();
        assert_eq!(entry.report.status, "online");
    }

    #[tokio::test(start_paused = true)]
    async fn get_after_ttl_is_absent() {
        let cache = StatusCache::new(Duration::from_secs(30));
        cache.put(report("dev-1", "online"));

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(cache.get(&key("dev-1")).is_none());
        // Lazy expiry: still stored until swept.
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn put_overwrites_and_restarts_ttl() {
        let cache = StatusCache::new(Duration::from_secs(30));
        cache.put(report("dev-1", "booting"));
        tokio::time::advance(Duration::from_secs(20)).await;
        cache.put(report("dev-1", "online"));
        tokio::time::advance(Duration::from_secs(20)).await;

        let entry = cache.get(&key("dev-1")).unwrap();
        assert_eq!(entry.report.status, "online");
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_removes_only_expired() {
        let cache = StatusCache::new(Duration::from_secs(30));
        cache.put(report("old", "online"));
        tokio::time::advance(Duration::from_secs(20)).await;
        cache.put(report("new", "online"));
        tokio::time::advance(Duration::from_secs(15)).await;

        assert_eq!(cache.sweep(), 1);
        assert!(cache.get(&key("old")).is_none());
        assert!(cache.get(&key("new")).is_some());
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn huge_ttl_never_expires_and_saturates_expiry() {
        let cache = StatusCache::new(Duration::from_secs(u64::MAX));
        let stored = cache.put(report("dev-1", "online"));
        assert_eq!(stored.expires_at, i64::MAX);

        tokio::time::advance(Duration::from_secs(365 * 24 * 3600)).await;
        assert!(cache.get(&key("dev-1")).is_some());
        assert_eq!(cache.sweep(), 0);
    }

    #[test]
    fn unknown_key_is_absent() {
        let cache = StatusCache::new(Duration::from_secs(30));
        assert!(cache.get(&key("nobody")).is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn entry_serializes_flat_without_deadline() {
        let cache = StatusCache::new(Duration::from_secs(30));
        let value = serde_json::to_value(cache.put(report("dev-1", "online"))).unwrap();
        assert_eq!(value["device_key"], "dev-1");
        assert_eq!(value["status"], "online");
        assert!(value.get("received_at").is_some());
        assert!(value.get("deadline").is_none());
    }
}
