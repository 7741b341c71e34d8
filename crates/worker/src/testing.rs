//! In-process collaborators for tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use precache_core::{CacheDb, CacheStorage, Error, GenerationCache, NetworkTransport, Request, Response};
use url::Url;

pub const ORIGIN: &str = "http://127.0.0.1:8000";

pub fn get(path: &str) -> Request {
    Request::get(Url::parse(ORIGIN).unwrap().join(path).unwrap())
}

#[derive(Default)]
struct Inner {
    routes: Mutex<HashMap<String, u16>>,
    offline: AtomicBool,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    requests: Mutex<Vec<Request>>,
}

/// A network that serves `live <path>` for known paths and fails at the
/// transport level for everything else, or for everything when offline.
#[derive(Clone, Default)]
pub struct FakeNetwork {
    inner: Arc<Inner>,
}

impl FakeNetwork {
    pub fn serving(paths: &[&str]) -> Self {
        let network = Self::default();
        network.inner.routes.lock().extend(paths.iter().map(|p| (p.to_string(), 200)));
        network
    }

    pub fn offline() -> Self {
        let network = Self::default();
        network.set_online(false);
        network
    }

    pub fn with_status(self, path: &str, status: u16) -> Self {
        self.inner.routes.lock().insert(path.to_string(), status);
        self
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        *self.inner.delay.lock() = Some(delay);
        self
    }

    pub fn set_online(&self, online: bool) {
        self.inner.offline.store(!online, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.inner.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.inner.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<Request> {
        self.inner.requests.lock().clone()
    }
}

#[async_trait]
impl NetworkTransport for FakeNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        let inner = &self.inner;
        inner.calls.fetch_add(1, Ordering::SeqCst);
        inner.requests.lock().push(request.clone());

        let now = inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        inner.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let delay = *inner.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        inner.in_flight.fetch_sub(1, Ordering::SeqCst);

        if inner.offline.load(Ordering::SeqCst) {
            return Err(Error::Network(format!("offline: {}", request.url)));
        }

        let path = request.url.path();
        let status = inner.routes.lock().get(path).copied();
        match status {
            Some(status) => Ok(Response::new(status, format!("live {path}")).with_url(request.url.clone())),
            None => Err(Error::Network(format!("unreachable: {}", request.url))),
        }
    }
}

/// Cache storage whose deletion of one generation always fails.
pub struct FlakyStorage {
    db: CacheDb,
    broken: &'static str,
}

impl FlakyStorage {
    pub fn new(db: CacheDb, broken: &'static str) -> Self {
        Self { db, broken }
    }
}

#[async_trait]
impl CacheStorage for FlakyStorage {
    type Cache = GenerationCache;

    async fn open(&self, name: &str) -> Result<GenerationCache, Error> {
        self.db.open(name).await
    }

    async fn has(&self, name: &str) -> Result<bool, Error> {
        self.db.has(name).await
    }

    async fn delete(&self, name: &str) -> Result<bool, Error> {
        if name == self.broken {
            return Err(Error::InvalidState(format!("{name} is locked")));
        }
        self.db.delete(name).await
    }

    async fn keys(&self) -> Result<Vec<String>, Error> {
        self.db.keys().await
    }

    async fn match_request(&self, request: &Request) -> Result<Option<Response>, Error> {
        self.db.match_request(request).await
    }
}
