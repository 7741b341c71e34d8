//! Entry operations within a single cache generation.

use async_trait::async_trait;
use bytes::Bytes;
use tokio_rusqlite::{params, rusqlite};
use url::Url;

use super::connection::CacheDb;
use super::hash::request_key;
use super::{Cache, Error};
use crate::http::Headers;
use crate::{Request, Response};

/// Handle to one named generation in a [`CacheDb`].
#[derive(Clone, Debug)]
pub struct GenerationCache {
    db: CacheDb,
    name: String,
}

impl GenerationCache {
    pub(crate) fn new(db: CacheDb, name: &str) -> Self {
        Self { db, name: name.to_string() }
    }
}

/// A row ready to be written, with headers already serialized.
struct EntryRow {
    key: String,
    method: String,
    url: String,
    request_headers_json: String,
    response_url: Option<String>,
    status: u16,
    headers_json: String,
    body: Vec<u8>,
}

impl EntryRow {
    fn encode(request: &Request, response: &Response) -> Result<Self, Error> {
        if !request.method.is_read_only() {
            return Err(Error::InvalidInput(format!(
                "only GET requests can be cached, got {} {}",
                request.method, request.url
            )));
        }

        Ok(Self {
            key: request_key(request),
            method: request.method.to_string(),
            url: request.url.to_string(),
            request_headers_json: serde_json::to_string(&request.headers)?,
            response_url: response.url.as_ref().map(Url::to_string),
            status: response.status,
            headers_json: serde_json::to_string(&response.headers)?,
            body: response.body.to_vec(),
        })
    }
}

fn insert_rows(conn: &rusqlite::Connection, generation: &str, rows: &[EntryRow]) -> Result<(), Error> {
    let stored_at = chrono::Utc::now().to_rfc3339();
    let mut stmt = conn.prepare(
        "INSERT OR REPLACE INTO cache_entries (
            generation, request_key, method, url, request_headers_json,
            response_url, status_code, headers_json, body, stored_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
    )?;
    for row in rows {
        stmt.execute(params![
            generation,
            &row.key,
            &row.method,
            &row.url,
            &row.request_headers_json,
            &row.response_url,
            row.status,
            &row.headers_json,
            &row.body,
            &stored_at,
        ])?;
    }
    Ok(())
}

/// Decode `(response_url, status_code, headers_json, body)` columns.
pub(crate) fn read_response(row: &rusqlite::Row<'_>) -> Result<Response, Error> {
    let response_url: Option<String> = row.get(0)?;
    let status: u16 = row.get(1)?;
    let headers_json: String = row.get(2)?;
    let body: Vec<u8> = row.get(3)?;

    let url = response_url
        .map(|u| Url::parse(&u).map_err(|e| Error::CorruptEntry(format!("response url {u}: {e}"))))
        .transpose()?;
    let headers: Headers = serde_json::from_str(&headers_json)?;

    Ok(Response { url, status, headers, body: Bytes::from(body) })
}

fn read_request(row: &rusqlite::Row<'_>) -> Result<Request, Error> {
    let method: String = row.get(0)?;
    let url: String = row.get(1)?;
    let headers_json: String = row.get(2)?;

    let url = Url::parse(&url).map_err(|e| Error::CorruptEntry(format!("request url {url}: {e}")))?;
    let headers: Headers = serde_json::from_str(&headers_json)?;
    let Ok(method) = method.parse::<crate::Method>();

    Ok(Request { method, url, headers })
}

#[async_trait]
impl Cache for GenerationCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn put(&self, request: &Request, response: &Response) -> Result<(), Error> {
        self.put_all(vec![(request.clone(), response.clone())]).await
    }

    /// All rows are written in one transaction.
    async fn put_all(&self, entries: Vec<(Request, Response)>) -> Result<(), Error> {
        let rows = entries
            .iter()
            .map(|(request, response)| EntryRow::encode(request, response))
            .collect::<Result<Vec<_>, _>>()?;
        let count = rows.len();
        let generation = self.name.clone();

        self.db
            .conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                insert_rows(&tx, &generation, &rows)?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)?;

        tracing::debug!(cache = %self.name, count, "stored cache entries");
        Ok(())
    }

    async fn match_request(&self, request: &Request) -> Result<Option<Response>, Error> {
        if !request.method.is_read_only() {
            return Ok(None);
        }

        let key = request_key(request);
        let generation = self.name.clone();
        self.db
            .conn
            .call(move |conn| -> Result<Option<Response>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT response_url, status_code, headers_json, body
                     FROM cache_entries WHERE generation = ?1 AND request_key = ?2",
                )?;
                let mut rows = stmt.query(params![generation, key])?;
                match rows.next()? {
                    Some(row) => Ok(Some(read_response(row)?)),
                    None => Ok(None),
                }
            })
            .await
            .map_err(Error::from)
    }

    async fn delete(&self, request: &Request) -> Result<bool, Error> {
        let key = request_key(request);
        let generation = self.name.clone();
        self.db
            .conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute(
                    "DELETE FROM cache_entries WHERE generation = ?1 AND request_key = ?2",
                    params![generation, key],
                )?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    async fn keys(&self) -> Result<Vec<Request>, Error> {
        let generation = self.name.clone();
        self.db
            .conn
            .call(move |conn| -> Result<Vec<Request>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT method, url, request_headers_json
                     FROM cache_entries WHERE generation = ?1 ORDER BY rowid",
                )?;
                let mut rows = stmt.query(params![generation])?;
                let mut requests = Vec::new();
                while let Some(row) = rows.next()? {
                    requests.push(read_request(row)?);
                }
                Ok(requests)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CacheStorage, Method, NetworkTransport};
    use std::collections::HashMap;

    fn get(path: &str) -> Request {
        Request::get(Url::parse("http://localhost:8000").unwrap().join(path).unwrap())
    }

    /// Serves fixed responses; unknown paths fail at the transport level.
    struct FixedTransport(HashMap<String, Response>);

    #[async_trait]
    impl NetworkTransport for FixedTransport {
        async fn fetch(&self, request: &Request) -> Result<Response, Error> {
            self.0
                .get(request.url.path())
                .cloned()
                .ok_or_else(|| Error::Network(format!("unreachable: {}", request.url)))
        }
    }

    fn transport(entries: &[(&str, u16, &'static str)]) -> FixedTransport {
        FixedTransport(
            entries
                .iter()
                .map(|(path, status, body)| (path.to_string(), Response::new(*status, *body)))
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_put_and_match() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let cache = db.open("v4").await.unwrap();
        let response = Response::new(200, "<html></html>")
            .with_header("Content-Type", "text/html")
            .with_url(Url::parse("http://localhost:8000/static/index.html").unwrap());

        cache.put(&get("/static/index.html"), &response).await.unwrap();

        let hit = cache.match_request(&get("/static/index.html")).await.unwrap().unwrap();
        assert_eq!(hit, response);
    }

    #[tokio::test]
    async fn test_match_missing() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let cache = db.open("v4").await.unwrap();
        assert!(cache.match_request(&get("/nope")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_rejects_non_get() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let cache = db.open("v4").await.unwrap();
        let post = Request::new(Method::Post, Url::parse("http://localhost:8000/chat").unwrap());

        let result = cache.put(&post, &Response::new(200, "{}")).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_put_replaces_and_moves_to_end() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let cache = db.open("v4").await.unwrap();
        cache.put(&get("/a"), &Response::new(200, "a1")).await.unwrap();
        cache.put(&get("/b"), &Response::new(200, "b")).await.unwrap();
        cache.put(&get("/a"), &Response::new(200, "a2")).await.unwrap();

        let paths: Vec<String> = cache.keys().await.unwrap().iter().map(|r| r.url.path().to_string()).collect();
        assert_eq!(paths, vec!["/b", "/a"]);
        assert_eq!(cache.match_request(&get("/a")).await.unwrap().unwrap().body, "a2");
    }

    #[tokio::test]
    async fn test_keys_restore_stored_requests() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let cache = db.open("v4").await.unwrap();
        let request = get("/static/index.html").with_header("Accept", "text/html");
        cache.put(&request, &Response::new(200, "index")).await.unwrap();

        assert_eq!(cache.keys().await.unwrap(), vec![request]);
    }

    #[tokio::test]
    async fn test_delete_entry() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let cache = db.open("v4").await.unwrap();
        cache.put(&get("/"), &Response::new(200, "home")).await.unwrap();

        assert!(cache.delete(&get("/")).await.unwrap());
        assert!(!cache.delete(&get("/")).await.unwrap());
        assert!(cache.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_generations_are_isolated() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let v3 = db.open("v3").await.unwrap();
        let v4 = db.open("v4").await.unwrap();
        v3.put(&get("/"), &Response::new(200, "old")).await.unwrap();

        assert!(v4.match_request(&get("/")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_add_all_stores_every_asset() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let cache = db.open("ai-farm-cache-v4").await.unwrap();
        let net = transport(&[
            ("/", 200, "root"),
            ("/static/index.html", 200, "index"),
            ("/static/manifest.json", 200, "{}"),
        ]);

        cache
            .add_all(&net, vec![get("/"), get("/static/index.html"), get("/static/manifest.json")])
            .await
            .unwrap();

        assert_eq!(cache.keys().await.unwrap().len(), 3);
        let index = cache.match_request(&get("/static/index.html")).await.unwrap().unwrap();
        assert_eq!(index.body, "index");
    }

    #[tokio::test]
    async fn test_add_all_fails_on_network_error() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let cache = db.open("v4").await.unwrap();
        let net = transport(&[("/", 200, "root")]);

        let result = cache.add_all(&net, vec![get("/"), get("/static/index.html")]).await;
        assert!(matches!(result, Err(Error::Network(_))));
        assert!(cache.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_all_fails_on_bad_status() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let cache = db.open("v4").await.unwrap();
        let net = transport(&[("/", 200, "root"), ("/static/index.html", 404, "missing")]);

        let result = cache.add_all(&net, vec![get("/"), get("/static/index.html")]).await;
        assert!(matches!(result, Err(Error::BadStatus { status: 404, .. })));
    }
}
