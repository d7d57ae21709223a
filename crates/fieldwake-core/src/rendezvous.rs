//! Per-device command rendezvous.
//!
//! Each device key owns at most one pending waiter: a one-shot slot that a
//! long-polling device parks on until an operator triggers it, its deadline
//! passes, or the poller goes away. Every completion path removes the slot
//! only if it still holds the waiter id it registered, so a stale path can
//! never evict a newer waiter under the same key.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::device::DeviceKey;
use crate::error::RendezvousError;

/// What a polling device should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    /// An operator asked the device to act now.
    Send,
    /// Nothing to do.
    None,
}

/// Result of a trigger call. Neither variant is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Sent,
    NotFound,
}

/// Configuration for the rendezvous.
#[derive(Debug, Clone)]
pub struct RendezvousConfig {
    /// How long a waiter stays parked before resolving to [`Command::None`].
    pub wait_timeout: Duration,
    /// Maximum number of simultaneously pending waiters.
    pub max_waiters: usize,
}

impl Default for RendezvousConfig {
    fn default() -> Self {
        Self {
            wait_timeout: Duration::from_secs(60),
            max_waiters: 10_000,
        }
    }
}

struct PendingWaiter {
    id: u64,
    tx: oneshot::Sender<Command>,
}

#[derive(Default)]
struct WaiterTable {
    waiters: HashMap<DeviceKey, PendingWaiter>,
    closed: bool,
}

impl WaiterTable {
    /// Remove the slot for `key` only if it still belongs to waiter `id`.
    fn remove_if_current(&mut self, key: &DeviceKey, id: u64) -> bool {
        if self.waiters.get(key).is_some_and(|w| w.id == id) {
            self.waiters.remove(key);
            true
        } else {
            false
        }
    }
}

fn lock(table: &Mutex<WaiterTable>) -> MutexGuard<'_, WaiterTable> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Single-slot mailbox per device key.
pub struct Rendezvous {
    table: Arc<Mutex<WaiterTable>>,
    next_id: AtomicU64,
    config: RendezvousConfig,
}

impl Rendezvous {
    pub fn new(config: RendezvousConfig) -> Self {
        Self {
            table: Arc::new(Mutex::new(WaiterTable::default())),
            next_id: AtomicU64::new(1),
            config,
        }
    }

    /// Create with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(RendezvousConfig::default())
    }

    pub const fn config(&self) -> &RendezvousConfig {
        &self.config
    }

    /// Park until triggered or the configured timeout elapses.
    ///
    /// Dropping the returned future (e.g. because the HTTP connection closed)
    /// releases the slot without delivering anything.
    pub async fn wait(&self, key: DeviceKey) -> Result<Command, RendezvousError> {
        let ticket = self.register(key)?;
        Ok(ticket.wait(self.config.wait_timeout).await)
    }

    /// Register a waiter for `key` without suspending.
    ///
    /// Any waiter already registered under `key` is completed with
    /// [`Command::None`] and replaced.
    pub fn register(&self, key: DeviceKey) -> Result<WaitTicket, RendezvousError> {
        let (tx, rx) = oneshot::channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut table = lock(&self.table);
        if table.closed {
            // Shutting down: answer right away instead of parking.
            let _ = tx.send(Command::None);
        } else {
            if !table.waiters.contains_key(&key) && table.waiters.len() >= self.config.max_waiters
            {
                warn!(
                    device_key = %key,
                    capacity = self.config.max_waiters,
                    "Waiter table full, rejecting wait"
                );
                return Err(RendezvousError::CapacityExceeded {
                    capacity: self.config.max_waiters,
                });
            }
            if let Some(previous) = table.waiters.insert(key.clone(), PendingWaiter { id, tx }) {
                let _ = previous.tx.send(Command::None);
                debug!(device_key = %key, superseded = previous.id, "Superseded pending waiter");
            }
            debug!(device_key = %key, waiter_id = id, "Waiter registered");
        }
        drop(table);

        Ok(WaitTicket {
            key,
            id,
            rx,
            table: Arc::clone(&self.table),
        })
    }

    /// Deliver [`Command::Send`] to the waiter parked on `key`, if any.
    pub fn trigger(&self, key: &DeviceKey) -> TriggerOutcome {
        let mut table = lock(&self.table);
        let Some(waiter) = table.waiters.remove(key) else {
            debug!(device_key = %key, "Trigger found no waiter");
            return TriggerOutcome::NotFound;
        };
        // Delivered under the lock so a racing deadline sees the value.
        if waiter.tx.send(Command::Send).is_ok() {
            info!(device_key = %key, waiter_id = waiter.id, "Command delivered");
            TriggerOutcome::Sent
        } else {
            debug!(device_key = %key, waiter_id = waiter.id, "Waiter went away before delivery");
            TriggerOutcome::NotFound
        }
    }

    /// Resolve every pending waiter with [`Command::None`] and stop parking
    /// new ones. Returns the number of waiters released.
    pub fn shutdown(&self) -> usize {
        let mut table = lock(&self.table);
        table.closed = true;
        let released = table.waiters.len();
        for (_, waiter) in table.waiters.drain() {
            let _ = waiter.tx.send(Command::None);
        }
        drop(table);
        info!(released, "Rendezvous closed");
        released
    }

    /// Number of currently pending waiters.
    pub fn pending_count(&self) -> usize {
        lock(&self.table).waiters.len()
    }

    pub fn is_waiting(&self, key: &DeviceKey) -> bool {
        lock(&self.table).waiters.contains_key(key)
    }
}

/// A registered waiter. Consumed by [`WaitTicket::wait`]; dropping it
/// releases the slot.
pub struct WaitTicket {
    key: DeviceKey,
    id: u64,
    rx: oneshot::Receiver<Command>,
    table: Arc<Mutex<WaiterTable>>,
}

impl WaitTicket {
    /// Suspend until a command is delivered or `timeout` elapses.
    pub async fn wait(mut self, timeout: Duration) -> Command {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(command)) => command,
            Ok(Err(_)) => Command::None,
            Err(_) => self.expire(),
        }
    }

    fn expire(&mut self) -> Command {
        let mut table = lock(&self.table);
        if table.remove_if_current(&self.key, self.id) {
            debug!(device_key = %self.key, waiter_id = self.id, "Wait timed out");
            return Command::None;
        }
        drop(table);
        // Someone else removed the slot, and they always deliver while
        // holding the lock, so the value is already in the channel.
        self.rx.try_recv().unwrap_or(Command::None)
    }
}

impl Drop for WaitTicket {
    fn drop(&mut self) {
        let mut table = lock(&self.table);
        if table.remove_if_current(&self.key, self.id) {
            debug!(device_key = %self.key, waiter_id = self.id, "Waiter abandoned");
        }
    }
}
