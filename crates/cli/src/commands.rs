//! Subcommand implementations.

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use precache_client::{HttpTransport, TransportConfig, resolve_target};
use precache_core::{AppConfig, Cache, CacheDb, CacheStorage, Method, NetworkTransport, Request, Response};
use precache_worker::{ManagerSettings, OfflineCacheManager, WorkerHost, WorkerState};

use crate::cli::Command;

pub async fn run(command: Command, config: &AppConfig) -> Result<()> {
    let db = CacheDb::open(&config.db_path)
        .await
        .with_context(|| format!("opening cache storage at {}", config.db_path.display()))?;

    match command {
        Command::Install => {
            let host = worker_host(config, &db, WorkerState::Parsed)?;
            host.install().await?;
            db.mark_installed(&config.cache_name).await?;
            println!("installed {} ({} assets)", config.cache_name, config.precache.len());
        }
        Command::Activate => {
            if !db.is_installed(&config.cache_name).await? {
                bail!("{} has not completed an install; run `precache install` first", config.cache_name);
            }
            let host = worker_host(config, &db, WorkerState::Installed)?;
            host.activate().await?;
            println!("activated {}", config.cache_name);
        }
        Command::Start => {
            let host = worker_host(config, &db, WorkerState::Parsed)?;
            host.install().await?;
            db.mark_installed(&config.cache_name).await?;
            if host.can_activate() {
                host.activate().await?;
            }
            println!("{} is {:?}", config.cache_name, host.state());
        }
        Command::Fetch { target, method, headers, body } => {
            let request = build_request(config, &target, &method, &headers)?;
            let host = worker_host(config, &db, WorkerState::Activated)?;
            match host.fetch(request.clone()).await? {
                Some(response) => {
                    println!("{}", describe(&request, &response));
                    if body {
                        std::io::stdout().write_all(&response.body)?;
                    }
                }
                None => println!("{} {}: no network and no cached match", request.method, request.url),
            }
        }
        Command::Caches { json } => {
            let info = db.generation_info().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                for generation in info {
                    let marker = if generation.name == config.cache_name { "*" } else { " " };
                    let installed = generation.installed_at.as_deref().unwrap_or("incomplete");
                    println!("{marker} {}\t{} entries\t{installed}", generation.name, generation.entries);
                }
            }
        }
        Command::Entries { name } => {
            let name = name.unwrap_or_else(|| config.cache_name.clone());
            if !db.has(&name).await? {
                bail!("no cache generation named {name}");
            }
            for request in db.open(&name).await?.keys().await? {
                println!("{} {}", request.method, request.url);
            }
        }
    }

    Ok(())
}

/// A host for the configured version with the offline cache manager
/// registered, resumed at `state`.
fn worker_host(config: &AppConfig, db: &CacheDb, state: WorkerState) -> Result<WorkerHost> {
    let transport: Arc<dyn NetworkTransport> = Arc::new(HttpTransport::new(&TransportConfig::from(config))?);
    let mut host = WorkerHost::restore(&config.cache_name, state, transport.clone());

    let settings = ManagerSettings::from_config(config)?;
    let manager = Arc::new(OfflineCacheManager::new(settings, Arc::new(db.clone()), transport, host.control()));
    manager.register(&mut host);

    Ok(host)
}

fn build_request(config: &AppConfig, target: &str, method: &str, headers: &[String]) -> Result<Request> {
    let url = resolve_target(&config.origin_url()?, target)?;
    let Ok(method) = method.parse::<Method>();

    let mut request = Request::new(method, url);
    for header in headers {
        let (name, value) = parse_header(header)?;
        request = request.with_header(name, value);
    }
    Ok(request)
}

fn parse_header(raw: &str) -> Result<(&str, &str)> {
    match raw.split_once(':') {
        Some((name, value)) if !name.trim().is_empty() => Ok((name.trim(), value.trim())),
        _ => bail!("invalid header {raw:?}, expected `Name: value`"),
    }
}

fn describe(request: &Request, response: &Response) -> String {
    let content_type = response.content_type().unwrap_or("-");
    format!(
        "{} {} -> {} {} ({} bytes)",
        request.method,
        request.url,
        response.status,
        content_type,
        response.body.len()
    )
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    /// Config whose origin is a port nothing listens on.
    fn unreachable_origin(dir: &Path) -> AppConfig {
        let port = std::net::TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
        AppConfig {
            origin: format!("http://127.0.0.1:{port}"),
            db_path: dir.join("cache.sqlite"),
            timeout_ms: 1000,
            ..AppConfig::default()
        }
    }

    #[tokio::test]
    async fn test_failed_install_keeps_previous_generation() {
        let dir = tempfile::tempdir().unwrap();
        let config = unreachable_origin(dir.path());
        let root = Request::get(config.resolve("/").unwrap());

        let db = CacheDb::open(&config.db_path).await.unwrap();
        let previous = db.open("ai-farm-cache-v3").await.unwrap();
        previous.put(&root, &Response::new(200, "v3 root")).await.unwrap();
        db.mark_installed("ai-farm-cache-v3").await.unwrap();

        assert!(run(Command::Install, &config).await.is_err());
        assert!(db.has(&config.cache_name).await.unwrap());
        assert!(!db.is_installed(&config.cache_name).await.unwrap());

        let err = run(Command::Activate, &config).await.unwrap_err();
        assert!(err.to_string().contains("has not completed an install"));

        assert!(db.has("ai-farm-cache-v3").await.unwrap());
        let hit = db.match_request(&root).await.unwrap().unwrap();
        assert_eq!(hit.body, "v3 root");
    }

    #[tokio::test]
    async fn test_failed_start_keeps_previous_generation() {
        let dir = tempfile::tempdir().unwrap();
        let config = unreachable_origin(dir.path());

        let db = CacheDb::open(&config.db_path).await.unwrap();
        db.open("ai-farm-cache-v3").await.unwrap();
        db.mark_installed("ai-farm-cache-v3").await.unwrap();

        assert!(run(Command::Start, &config).await.is_err());
        assert!(db.is_installed("ai-farm-cache-v3").await.unwrap());
        assert!(!db.is_installed(&config.cache_name).await.unwrap());
    }

    #[test]
    fn test_parse_header() {
        assert_eq!(parse_header("Accept: text/html").unwrap(), ("Accept", "text/html"));
        assert_eq!(parse_header("X-Trace:abc:def").unwrap(), ("X-Trace", "abc:def"));
        assert!(parse_header("no-colon").is_err());
        assert!(parse_header(": empty-name").is_err());
    }

    #[test]
    fn test_build_request_resolves_path() {
        let config = AppConfig::default();
        let request = build_request(&config, "/static/index.html", "get", &["Accept: text/html".into()]).unwrap();
        assert_eq!(request.method, Method::Get);
        assert_eq!(request.url.as_str(), "http://127.0.0.1:8000/static/index.html");
        assert!(request.accepts_html());
    }

    #[test]
    fn test_build_request_non_get() {
        let config = AppConfig::default();
        let request = build_request(&config, "/chat", "POST", &[]).unwrap();
        assert_eq!(request.method, Method::Post);
    }

    #[test]
    fn test_describe() {
        let request = Request::get(AppConfig::default().resolve("/").unwrap());
        let response = Response::new(404, "nope").with_header("Content-Type", "text/plain");
        assert_eq!(describe(&request, &response), "GET http://127.0.0.1:8000/ -> 404 text/plain (4 bytes)");
    }
}
