//! Offline cache manager for precache.
//!
//! This crate wires the cache storage and network transport from
//! `precache-core` into three lifecycle handlers, and provides the host that
//! drives a worker version through install, activate and fetch interception.

pub mod event;
pub mod host;
pub mod lifecycle;
pub mod manager;

#[cfg(test)]
pub(crate) mod testing;

pub use event::{Event, EventHandler, EventKind, ExtendableEvent, FetchEvent, FetchOutcome};
pub use host::{ClientControl, ClientInfo, HostControl, WorkerHost, WorkerState};
pub use manager::{ManagerSettings, OfflineCacheManager};
