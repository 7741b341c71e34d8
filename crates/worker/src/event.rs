//! Lifecycle events dispatched by the host.
//!
//! Handlers react synchronously to an event and hand any asynchronous work
//! back to the host through the event itself: [`ExtendableEvent::wait_until`]
//! for install/activate, [`FetchEvent::respond_with`] for interception. The
//! host then awaits that work before it treats the phase as finished.

use std::fmt;
use std::future::Future;

use futures::future::{BoxFuture, FutureExt, join_all};
use precache_core::{Error, Request, Response};

/// The kinds of event a handler can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Install,
    Activate,
    FetchIntercept,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [EventKind::Install, EventKind::Activate, EventKind::FetchIntercept];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Install => "install",
            EventKind::Activate => "activate",
            EventKind::FetchIntercept => "fetch",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Work registered with a lifecycle event.
pub type PendingWork = BoxFuture<'static, Result<(), Error>>;

/// An install or activate event carrying a deferred-completion token.
pub struct ExtendableEvent {
    kind: EventKind,
    pending: Vec<PendingWork>,
}

impl ExtendableEvent {
    pub fn new(kind: EventKind) -> Self {
        Self { kind, pending: Vec::new() }
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Extend the event until `work` settles.
    pub fn wait_until<F>(&mut self, work: F)
    where
        F: Future<Output = Result<(), Error>> + Send + 'static,
    {
        self.pending.push(work.boxed());
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Await every registered piece of work.
    ///
    /// All work runs to completion even if some of it fails; the first
    /// failure in registration order is returned.
    pub async fn settle(self) -> Result<(), Error> {
        join_all(self.pending).await.into_iter().collect()
    }
}

/// Response substitution registered by an interceptor.
pub type PendingResponse = BoxFuture<'static, Option<Response>>;

/// An intercepted network request.
pub struct FetchEvent {
    request: Request,
    response: Option<PendingResponse>,
}

/// What the host should do with an intercepted request.
#[derive(Debug)]
pub enum FetchOutcome {
    /// No handler substituted a response; apply default network handling to
    /// the untouched request.
    Default(Request),
    /// A handler substituted a response. `None` means it resolved without a
    /// match.
    Respond(Option<Response>),
}

impl FetchEvent {
    pub fn new(request: Request) -> Self {
        Self { request, response: None }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Substitute the response for this request.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidState` if a response was already substituted.
    pub fn respond_with<F>(&mut self, response: F) -> Result<(), Error>
    where
        F: Future<Output = Option<Response>> + Send + 'static,
    {
        if self.response.is_some() {
            return Err(Error::InvalidState(format!("respond_with already called for {}", self.request.url)));
        }
        self.response = Some(response.boxed());
        Ok(())
    }

    pub fn is_handled(&self) -> bool {
        self.response.is_some()
    }

    pub async fn settle(self) -> FetchOutcome {
        match self.response {
            Some(response) => FetchOutcome::Respond(response.await),
            None => FetchOutcome::Default(self.request),
        }
    }
}

/// An event as seen by a registered handler.
pub enum Event<'a> {
    Install(&'a mut ExtendableEvent),
    Activate(&'a mut ExtendableEvent),
    Fetch(&'a mut FetchEvent),
}

impl Event<'_> {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Install(_) => EventKind::Install,
            Event::Activate(_) => EventKind::Activate,
            Event::Fetch(_) => EventKind::FetchIntercept,
        }
    }
}

/// Reacts to dispatched events.
///
/// Handlers must not block: anything asynchronous goes through
/// `wait_until` or `respond_with`.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: Event<'_>);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use url::Url;

    fn request() -> Request {
        Request::get(Url::parse("http://127.0.0.1:8000/").unwrap())
    }

    #[tokio::test]
    async fn test_settle_without_work_succeeds() {
        let event = ExtendableEvent::new(EventKind::Install);
        assert!(event.settle().await.is_ok());
    }

    #[tokio::test]
    async fn test_settle_runs_all_work_even_after_failure() {
        let ran = Arc::new(AtomicUsize::new(0));
        let mut event = ExtendableEvent::new(EventKind::Activate);

        event.wait_until(async { Err(Error::Network("first".into())) });
        let counter = ran.clone();
        event.wait_until(async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        assert_eq!(event.pending(), 2);

        let result = event.settle().await;
        assert!(matches!(result, Err(Error::Network(msg)) if msg == "first"));
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fetch_event_default_when_unhandled() {
        let event = FetchEvent::new(request());
        assert!(!event.is_handled());
        match event.settle().await {
            FetchOutcome::Default(req) => assert_eq!(req, request()),
            other => panic!("expected default handling, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_event_respond_with_once() {
        let mut event = FetchEvent::new(request());
        event.respond_with(async { Some(Response::new(200, "hi")) }).unwrap();
        assert!(matches!(event.respond_with(async { None }), Err(Error::InvalidState(_))));

        match event.settle().await {
            FetchOutcome::Respond(Some(resp)) => assert_eq!(resp.body, "hi"),
            other => panic!("expected substituted response, got {other:?}"),
        }
    }

    #[test]
    fn test_event_kind() {
        let mut install = ExtendableEvent::new(EventKind::Install);
        let mut fetch = FetchEvent::new(request());
        assert_eq!(Event::Install(&mut install).kind(), EventKind::Install);
        assert_eq!(Event::Fetch(&mut fetch).kind(), EventKind::FetchIntercept);
        assert_eq!(EventKind::FetchIntercept.to_string(), "fetch");
    }
}
