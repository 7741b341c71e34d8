//! Install: populate the current generation with the asset manifest.

use precache_core::{Cache, CacheStorage, Error, NetworkTransport, Request};

/// Open (creating if absent) the `cache_name` generation and fetch-and-store
/// every manifest request.
///
/// Any asset that fails to fetch, or resolves to a non-OK status, fails the
/// whole install. There is no retry.
pub async fn precache<S>(
    storage: &S, transport: &dyn NetworkTransport, cache_name: &str, manifest: Vec<Request>,
) -> Result<(), Error>
where
    S: CacheStorage,
{
    let count = manifest.len();
    let cache = storage.open(cache_name).await?;

    cache
        .add_all(transport, manifest)
        .await
        .map_err(|e| Error::InstallFailed(format!("{cache_name}: {e}")))?;

    tracing::info!(cache = cache_name, assets = count, "precached manifest");
    Ok(())
}
