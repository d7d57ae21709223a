use std::sync::Arc;

use fieldwake_core::{EventLog, Rendezvous, ServerConfig, StatusCache};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub rendezvous: Arc<Rendezvous>,
    pub event_log: Arc<EventLog>,
    pub status_cache: Arc<StatusCache>,
}

impl AppState {
    pub fn new(rendezvous: Rendezvous, event_log: EventLog, status_cache: StatusCache) -> Self {
        Self {
            rendezvous: Arc::new(rendezvous),
            event_log: Arc::new(event_log),
            status_cache: Arc::new(status_cache),
        }
    }

    /// Build every component from `config`, opening (and recovering) the
    /// event log at `config.data_file`.
    pub fn from_config(config: &ServerConfig) -> fieldwake_core::Result<Self> {
        Ok(Self::new(
            Rendezvous::new(config.rendezvous()),
            EventLog::open_file(&config.data_file)?,
            StatusCache::new(config.status_ttl()),
        ))
    }
}
