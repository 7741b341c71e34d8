//! Fetch interception: network first, cache as fallback.

use precache_core::{CacheStorage, NetworkTransport, Request, Response};

/// Serve `request` from the network, falling back to the cache storage when
/// the transport fails.
///
/// A network response is returned verbatim whatever its status. The cache is
/// consulted only after the transport has failed, and lookup errors count as
/// a miss. When both miss, navigation requests get the cached `fallback`
/// entry if one is configured; otherwise the result is `None`.
pub async fn network_first<S>(
    storage: &S, transport: &dyn NetworkTransport, request: &Request, fallback: Option<&Request>,
) -> Option<Response>
where
    S: CacheStorage,
{
    let network_err = match transport.fetch(request).await {
        Ok(response) => return Some(response),
        Err(err) => err,
    };
    tracing::debug!(url = %request.url, error = %network_err, "network failed, trying cache");

    if let Some(hit) = lookup(storage, request).await {
        tracing::debug!(url = %request.url, "served from cache");
        return Some(hit);
    }

    if let Some(fallback) = fallback
        && request.accepts_html()
        && let Some(page) = lookup(storage, fallback).await
    {
        tracing::debug!(url = %request.url, fallback = %fallback.url, "served offline fallback");
        return Some(page);
    }

    tracing::debug!(url = %request.url, "no network and no cached match");
    None
}

async fn lookup<S: CacheStorage>(storage: &S, request: &Request) -> Option<Response> {
    match storage.match_request(request).await {
        Ok(found) => found,
        Err(err) => {
            tracing::warn!(url = %request.url, error = %err, "cache lookup failed");
            None
        }
    }
}
