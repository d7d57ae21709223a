//! Fieldwake Server Library
//!
//! HTTP adapter over the core components:
//! - Long-poll `/wait` and operator `/trigger` over the rendezvous
//! - Report ingestion into the event log and status cache
//! - Background cache sweep and signal-driven shutdown

pub mod routes;
pub mod state;
pub mod tasks;

pub use routes::build_router;
pub use state::AppState;
