//! Generation-keyed cache storage.
//!
//! A cache *generation* is a named store of request/response snapshots. The
//! offline cache manager keeps exactly one current generation and deletes
//! every other one when a new version activates.
//!
//! This module defines the storage seam ([`CacheStorage`] and [`Cache`]) and
//! a persistent implementation using SQLite with async access via
//! tokio-rusqlite:
//!
//! - Request identity hashed with SHA-256 (method + canonical URL)
//! - Automatic schema migrations
//! - WAL mode for concurrent access
//! - Entries cascade-deleted with their generation

pub mod connection;
pub mod entries;
pub mod generations;
pub mod hash;
pub mod migrations;

use async_trait::async_trait;
use futures::future::try_join_all;

pub use crate::Error;
use crate::{NetworkTransport, Request, Response};

pub use connection::CacheDb;
pub use entries::GenerationCache;
pub use generations::GenerationInfo;

/// The set of all cache generations.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    type Cache: Cache;

    /// Open the named generation, creating it if absent.
    async fn open(&self, name: &str) -> Result<Self::Cache, Error>;

    async fn has(&self, name: &str) -> Result<bool, Error>;

    /// Delete the named generation and all its entries.
    ///
    /// Returns false if no such generation existed.
    async fn delete(&self, name: &str) -> Result<bool, Error>;

    /// Generation names in creation order.
    async fn keys(&self) -> Result<Vec<String>, Error>;

    /// Look the request up in every generation, oldest first, returning the
    /// first match.
    async fn match_request(&self, request: &Request) -> Result<Option<Response>, Error>;
}

/// A single cache generation.
#[async_trait]
pub trait Cache: Send + Sync {
    fn name(&self) -> &str;

    /// Store a response. Only GET requests are storable.
    async fn put(&self, request: &Request, response: &Response) -> Result<(), Error>;

    /// Store several responses.
    async fn put_all(&self, entries: Vec<(Request, Response)>) -> Result<(), Error> {
        for (request, response) in &entries {
            self.put(request, response).await?;
        }
        Ok(())
    }

    async fn match_request(&self, request: &Request) -> Result<Option<Response>, Error>;

    /// Remove the entry for a request. Returns false if nothing was stored.
    async fn delete(&self, request: &Request) -> Result<bool, Error>;

    /// Stored requests in insertion order.
    async fn keys(&self) -> Result<Vec<Request>, Error>;

    /// Fetch every request and store the responses.
    ///
    /// All fetches are issued concurrently. If any fetch fails or resolves to
    /// a non-OK status, nothing from this call is stored and the first error
    /// is returned.
    async fn add_all(&self, transport: &dyn NetworkTransport, requests: Vec<Request>) -> Result<(), Error> {
        let fetches = requests.into_iter().map(move |request| async move {
            let response = transport.fetch(&request).await?;
            if !response.is_ok() {
                return Err(Error::BadStatus { url: request.url.to_string(), status: response.status });
            }
            tracing::debug!(cache = self.name(), url = %request.url, status = response.status, "fetched for cache");
            Ok((request, response))
        });

        let entries = try_join_all(fetches).await?;
        self.put_all(entries).await
    }
}
