//! The host side of the lifecycle contract.
//!
//! `WorkerHost` plays the role the browser plays for a service worker: it
//! owns the worker version's lifecycle state, dispatches typed events to the
//! handlers registered for them, awaits their deferred work, and applies
//! default network handling to requests no handler claims.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use precache_core::{Error, NetworkTransport, Request, Response};
use url::Url;

use crate::event::{Event, EventHandler, EventKind, ExtendableEvent, FetchEvent, FetchOutcome};

/// Lifecycle state of a worker version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    /// Install failed; this version will never activate.
    Redundant,
}

/// Host capabilities a worker may invoke on itself.
#[async_trait]
pub trait ClientControl: Send + Sync {
    /// Make this version eligible to activate without waiting for the
    /// current one to release its clients.
    fn skip_waiting(&self);

    /// Take control of every open client. Returns how many changed
    /// controller.
    async fn claim(&self) -> Result<usize, Error>;
}

/// An open page served by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub id: u64,
    pub url: Url,
    /// Version currently controlling the client, if any.
    pub controller: Option<String>,
}

#[derive(Debug)]
struct HostInner {
    state: WorkerState,
    skip_waiting: bool,
    active_version: Option<String>,
    clients: Vec<ClientInfo>,
    next_client_id: u64,
}

/// Lifecycle state shared between the host and the worker's
/// [`ClientControl`] handle.
#[derive(Debug)]
pub struct HostControl {
    version: String,
    inner: Mutex<HostInner>,
}

impl HostControl {
    fn new(version: String, active_version: Option<String>) -> Self {
        Self {
            version,
            inner: Mutex::new(HostInner {
                state: WorkerState::Parsed,
                skip_waiting: false,
                active_version,
                clients: Vec::new(),
                next_client_id: 1,
            }),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn state(&self) -> WorkerState {
        self.inner.lock().state
    }

    pub fn skip_waiting_requested(&self) -> bool {
        self.inner.lock().skip_waiting
    }

    pub fn active_version(&self) -> Option<String> {
        self.inner.lock().active_version.clone()
    }

    pub fn clients(&self) -> Vec<ClientInfo> {
        self.inner.lock().clients.clone()
    }

    fn set_state(&self, state: WorkerState) {
        let mut inner = self.inner.lock();
        tracing::debug!(version = %self.version, from = ?inner.state, to = ?state, "worker state");
        inner.state = state;
    }
}

#[async_trait]
impl ClientControl for HostControl {
    fn skip_waiting(&self) {
        self.inner.lock().skip_waiting = true;
    }

    async fn claim(&self) -> Result<usize, Error> {
        let mut inner = self.inner.lock();
        if !matches!(inner.state, WorkerState::Activating | WorkerState::Activated) {
            return Err(Error::InvalidState(format!("{} cannot claim clients while {:?}", self.version, inner.state)));
        }

        let mut claimed = 0;
        for client in inner.clients.iter_mut() {
            if client.controller.as_deref() != Some(self.version.as_str()) {
                client.controller = Some(self.version.clone());
                claimed += 1;
            }
        }
        tracing::debug!(version = %self.version, claimed, "claimed clients");
        Ok(claimed)
    }
}

/// Runs one worker version through its lifecycle.
pub struct WorkerHost {
    control: Arc<HostControl>,
    handlers: HashMap<EventKind, Vec<Arc<dyn EventHandler>>>,
    network: Arc<dyn NetworkTransport>,
}

impl WorkerHost {
    /// Create a host for `version`. `network` performs default handling for
    /// requests no handler substitutes.
    pub fn new(version: impl Into<String>, network: Arc<dyn NetworkTransport>) -> Self {
        Self::with_active_version(version, None, network)
    }

    /// Create a host where `active` is the version currently in control.
    /// Without `skip_waiting`, the new version waits behind it.
    pub fn with_active_version(
        version: impl Into<String>, active: Option<String>, network: Arc<dyn NetworkTransport>,
    ) -> Self {
        Self { control: Arc::new(HostControl::new(version.into(), active)), handlers: HashMap::new(), network }
    }

    /// Resume a version whose earlier phases ran in another process.
    ///
    /// An `Activating` or `Activated` version is also the active one.
    pub fn restore(version: impl Into<String>, state: WorkerState, network: Arc<dyn NetworkTransport>) -> Self {
        let version = version.into();
        let active = matches!(state, WorkerState::Activating | WorkerState::Activated).then(|| version.clone());
        let host = Self::with_active_version(version, active, network);
        host.control.inner.lock().state = state;
        host
    }

    /// Handle the worker uses to call back into the host.
    pub fn control(&self) -> Arc<HostControl> {
        self.control.clone()
    }

    pub fn state(&self) -> WorkerState {
        self.control.state()
    }

    pub fn register(&mut self, kind: EventKind, handler: Arc<dyn EventHandler>) {
        self.handlers.entry(kind).or_default().push(handler);
    }

    pub fn registered(&self, kind: EventKind) -> usize {
        self.handlers(kind).len()
    }

    /// Open a client page, initially uncontrolled unless a version is active.
    pub fn open_client(&self, url: Url) -> u64 {
        let mut inner = self.control.inner.lock();
        let id = inner.next_client_id;
        inner.next_client_id += 1;
        let controller = inner.active_version.clone();
        inner.clients.push(ClientInfo { id, url, controller });
        id
    }

    pub fn clients(&self) -> Vec<ClientInfo> {
        self.control.clients()
    }

    fn handlers(&self, kind: EventKind) -> &[Arc<dyn EventHandler>] {
        self.handlers.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Dispatch install and await its deferred work.
    ///
    /// On failure the version becomes redundant and the error is reported as
    /// `Error::InstallFailed`.
    pub async fn install(&self) -> Result<(), Error> {
        let state = self.state();
        if state != WorkerState::Parsed {
            return Err(Error::InvalidState(format!("cannot install from {state:?}")));
        }

        self.control.set_state(WorkerState::Installing);
        let mut event = ExtendableEvent::new(EventKind::Install);
        for handler in self.handlers(EventKind::Install) {
            handler.handle(Event::Install(&mut event));
        }

        match event.settle().await {
            Ok(()) => {
                self.control.set_state(WorkerState::Installed);
                tracing::info!(version = %self.control.version, "installed");
                Ok(())
            }
            Err(err) => {
                self.control.set_state(WorkerState::Redundant);
                tracing::warn!(version = %self.control.version, error = %err, "install failed");
                Err(match err {
                    Error::InstallFailed(_) => err,
                    other => Error::InstallFailed(other.to_string()),
                })
            }
        }
    }

    /// Whether an installed version may activate now.
    pub fn can_activate(&self) -> bool {
        let inner = self.control.inner.lock();
        inner.state == WorkerState::Installed
            && (inner.skip_waiting || inner.active_version.is_none() || inner.clients.is_empty())
    }

    /// Dispatch activate and await its deferred work.
    ///
    /// The version becomes active before the work settles; a failure in that
    /// work is reported but does not undo the activation.
    pub async fn activate(&self) -> Result<(), Error> {
        if !self.can_activate() {
            let state = self.state();
            let reason = if state == WorkerState::Installed {
                "waiting for the active version to release its clients".to_string()
            } else {
                format!("cannot activate from {state:?}")
            };
            return Err(Error::InvalidState(reason));
        }

        {
            let mut inner = self.control.inner.lock();
            inner.active_version = Some(self.control.version.clone());
        }
        self.control.set_state(WorkerState::Activating);

        let mut event = ExtendableEvent::new(EventKind::Activate);
        for handler in self.handlers(EventKind::Activate) {
            handler.handle(Event::Activate(&mut event));
        }

        let result = event.settle().await;
        self.control.set_state(WorkerState::Activated);
        match &result {
            Ok(()) => tracing::info!(version = %self.control.version, "activated"),
            Err(err) => tracing::warn!(version = %self.control.version, error = %err, "activate work failed"),
        }
        result
    }

    /// Install, then activate if nothing forces the version to wait.
    pub async fn update(&self) -> Result<WorkerState, Error> {
        self.install().await?;
        if self.can_activate() {
            self.activate().await?;
        }
        Ok(self.state())
    }

    /// Dispatch a fetch event and return what the handlers decided.
    pub async fn dispatch_fetch(&self, request: Request) -> FetchOutcome {
        let mut event = FetchEvent::new(request);
        for handler in self.handlers(EventKind::FetchIntercept) {
            handler.handle(Event::Fetch(&mut event));
        }
        event.settle().await
    }

    /// Serve a request the way a controlled page would see it.
    ///
    /// Unclaimed requests go to the network unchanged; a substituted empty
    /// result is returned as `Ok(None)`.
    pub async fn fetch(&self, request: Request) -> Result<Option<Response>, Error> {
        match self.dispatch_fetch(request).await {
            FetchOutcome::Respond(response) => Ok(response),
            FetchOutcome::Default(request) => self.network.fetch(&request).await.map(Some),
        }
    }
}
