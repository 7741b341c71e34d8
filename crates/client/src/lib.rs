//! Network side of precache.
//!
//! This crate provides the reqwest-backed [`HttpTransport`] the offline cache
//! manager uses for live fetches, plus URL canonicalization for targets given
//! on the command line.

pub mod fetch;

pub use fetch::{HttpTransport, TransportConfig, UrlError, canonicalize, resolve_target};
