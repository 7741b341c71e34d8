//! The offline cache manager.
//!
//! Three handlers over one cache generation:
//!
//! - **install** requests skip-waiting and precaches the asset manifest,
//! - **activate** deletes every other generation and claims open clients,
//! - **fetch** answers GET requests network-first with a cache fallback.
//!
//! The handlers hold no state of their own; the cache storage is the only
//! thing that persists between events.

use std::sync::Arc;

use precache_core::{AppConfig, CacheStorage, ConfigError, NetworkTransport, Request};

use crate::event::{Event, EventHandler, EventKind, ExtendableEvent, FetchEvent};
use crate::host::{ClientControl, WorkerHost};
use crate::lifecycle::{delete_stale_generations, network_first, precache};

/// What the manager caches, fixed for the lifetime of a worker version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerSettings {
    /// Name of the current cache generation.
    pub cache_name: String,
    /// Requests precached at install time.
    pub manifest: Vec<Request>,
    /// Entry served to navigations that miss both network and cache.
    pub offline_fallback: Option<Request>,
}

impl ManagerSettings {
    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            cache_name: config.cache_name.clone(),
            manifest: config.manifest_requests()?,
            offline_fallback: config.fallback_request()?,
        })
    }
}

pub struct OfflineCacheManager<S> {
    settings: Arc<ManagerSettings>,
    storage: Arc<S>,
    transport: Arc<dyn NetworkTransport>,
    control: Arc<dyn ClientControl>,
}

impl<S> OfflineCacheManager<S>
where
    S: CacheStorage + 'static,
{
    pub fn new(
        settings: ManagerSettings, storage: Arc<S>, transport: Arc<dyn NetworkTransport>,
        control: Arc<dyn ClientControl>,
    ) -> Self {
        Self { settings: Arc::new(settings), storage, transport, control }
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    /// Register for every event kind on `host`.
    pub fn register(self: Arc<Self>, host: &mut WorkerHost) {
        for kind in EventKind::ALL {
            host.register(kind, self.clone());
        }
    }

    pub fn on_install(&self, event: &mut ExtendableEvent) {
        self.control.skip_waiting();

        let storage = self.storage.clone();
        let transport = self.transport.clone();
        let settings = self.settings.clone();
        event.wait_until(async move {
            precache(storage.as_ref(), transport.as_ref(), &settings.cache_name, settings.manifest.clone()).await
        });
    }

    pub fn on_activate(&self, event: &mut ExtendableEvent) {
        let storage = self.storage.clone();
        let settings = self.settings.clone();
        event.wait_until(async move {
            delete_stale_generations(storage.as_ref(), &settings.cache_name)
                .await
                .map(|_| ())
        });

        let control = self.control.clone();
        event.wait_until(async move { control.claim().await.map(|_| ()) });
    }

    pub fn on_fetch(&self, event: &mut FetchEvent) {
        if !event.request().method.is_read_only() {
            return;
        }

        let request = event.request().clone();
        let storage = self.storage.clone();
        let transport = self.transport.clone();
        let settings = self.settings.clone();
        let substituted = event.respond_with(async move {
            network_first(storage.as_ref(), transport.as_ref(), &request, settings.offline_fallback.as_ref()).await
        });

        if let Err(err) = substituted {
            tracing::warn!(error = %err, "request already answered by another handler");
        }
    }
}

impl<S> EventHandler for OfflineCacheManager<S>
where
    S: CacheStorage + 'static,
{
    fn handle(&self, event: Event<'_>) {
        match event {
            Event::Install(ev) => self.on_install(ev),
            Event::Activate(ev) => self.on_activate(ev),
            Event::Fetch(ev) => self.on_fetch(ev),
        }
    }
}
