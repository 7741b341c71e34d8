//! Core types and shared functionality for precache.
//!
//! This crate provides:
//! - Request/response snapshots exchanged with the cache and the network
//! - The collaborator traits the offline cache manager is written against
//! - Cache storage implementation with SQLite backend
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod transport;

pub use cache::{Cache, CacheDb, CacheStorage, GenerationCache};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
pub use http::{Method, Request, Response};
pub use transport::NetworkTransport;
