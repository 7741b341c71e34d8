//! Network transport seam.

use async_trait::async_trait;

use crate::{Error, Request, Response};

/// Performs live network requests on behalf of the interceptor.
///
/// Implementations resolve with a [`Response`] for every HTTP exchange,
/// whatever its status, and fail with [`Error::Network`] only when the
/// transport itself fails (no connectivity, DNS failure, timeout).
#[async_trait]
pub trait NetworkTransport: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, Error>;
}
