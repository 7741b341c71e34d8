//! Activate: garbage-collect every generation except the current one.

use futures::future::join_all;
use precache_core::{CacheStorage, Error};

/// Delete every generation whose name differs from `current`.
///
/// Deletions run concurrently and independently. Returns the deleted names;
/// if any deletion fails the others still complete, nothing is rolled back,
/// and `Error::ActivateFailed` lists the names that could not be removed.
pub async fn delete_stale_generations<S>(storage: &S, current: &str) -> Result<Vec<String>, Error>
where
    S: CacheStorage,
{
    let stale: Vec<String> = storage.keys().await?.into_iter().filter(|name| name != current).collect();
    if stale.is_empty() {
        return Ok(Vec::new());
    }

    let results = join_all(stale.iter().map(move |name| async move { (name, storage.delete(name).await) })).await;

    let mut deleted = Vec::new();
    let mut failed = Vec::new();
    for (name, result) in results {
        match result {
            Ok(true) => deleted.push(name.clone()),
            // Already gone, e.g. removed by a concurrent activation.
            Ok(false) => {}
            Err(err) => {
                tracing::warn!(cache = %name, error = %err, "failed to delete stale cache");
                failed.push(name.clone());
            }
        }
    }

    if !failed.is_empty() {
        return Err(Error::ActivateFailed { failed });
    }

    tracing::info!(current, deleted = ?deleted, "deleted stale caches");
    Ok(deleted)
}
