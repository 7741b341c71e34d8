//! Generation-level operations: open, enumerate, delete, storage-wide match.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;

use super::connection::CacheDb;
use super::entries::{GenerationCache, read_response};
use super::hash::request_key;
use super::{CacheStorage, Error};
use crate::{Request, Response};

/// Summary of one stored generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationInfo {
    pub name: String,
    pub created_at: String,
    /// Set once the generation's install completed.
    pub installed_at: Option<String>,
    pub entries: u64,
}

impl CacheDb {
    /// List every generation with its entry count, in creation order.
    pub async fn generation_info(&self) -> Result<Vec<GenerationInfo>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<GenerationInfo>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT g.name, g.created_at, g.installed_at, COUNT(e.request_key)
                     FROM cache_generations g
                     LEFT JOIN cache_entries e ON e.generation = g.name
                     GROUP BY g.rowid
                     ORDER BY g.rowid",
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok(GenerationInfo {
                        name: row.get(0)?,
                        created_at: row.get(1)?,
                        installed_at: row.get(2)?,
                        entries: row.get::<_, i64>(3)? as u64,
                    })
                })?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await
            .map_err(Error::from)
    }

    /// Record that `name` finished installing.
    ///
    /// Opening a generation creates it before its assets are fetched, so only
    /// this record tells a complete generation from one left by a failed
    /// install.
    pub async fn mark_installed(&self, name: &str) -> Result<(), Error> {
        let owned = name.to_string();
        let updated = self
            .conn
            .call(move |conn| -> Result<usize, Error> {
                Ok(conn.execute(
                    "UPDATE cache_generations SET installed_at = ?2 WHERE name = ?1",
                    params![owned, chrono::Utc::now().to_rfc3339()],
                )?)
            })
            .await
            .map_err(Error::from)?;

        if updated == 0 {
            return Err(Error::InvalidInput(format!("no cache generation named {name}")));
        }
        tracing::debug!(cache = name, "marked cache generation installed");
        Ok(())
    }

    /// Whether `name` exists and completed an install.
    pub async fn is_installed(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let installed: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM cache_generations WHERE name = ?1 AND installed_at IS NOT NULL)",
                    params![name],
                    |row| row.get(0),
                )?;
                Ok(installed)
            })
            .await
            .map_err(Error::from)
    }
}

#[async_trait]
impl CacheStorage for CacheDb {
    type Cache = GenerationCache;

    async fn open(&self, name: &str) -> Result<GenerationCache, Error> {
        if name.is_empty() {
            return Err(Error::InvalidInput("cache name must not be empty".to_string()));
        }

        let owned = name.to_string();
        let created = self
            .conn
            .call(move |conn| -> Result<bool, Error> {
                let inserted = conn.execute(
                    "INSERT OR IGNORE INTO cache_generations (name, created_at) VALUES (?1, ?2)",
                    params![owned, chrono::Utc::now().to_rfc3339()],
                )?;
                Ok(inserted > 0)
            })
            .await
            .map_err(Error::from)?;

        if created {
            tracing::debug!(cache = name, "created cache generation");
        }

        Ok(GenerationCache::new(self.clone(), name))
    }

    async fn has(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let exists: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM cache_generations WHERE name = ?1)",
                    params![name],
                    |row| row.get(0),
                )?;
                Ok(exists)
            })
            .await
            .map_err(Error::from)
    }

    async fn delete(&self, name: &str) -> Result<bool, Error> {
        let owned = name.to_string();
        let deleted = self
            .conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute("DELETE FROM cache_generations WHERE name = ?1", params![owned])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)?;

        tracing::debug!(cache = name, deleted, "delete cache generation");
        Ok(deleted)
    }

    async fn keys(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM cache_generations ORDER BY rowid")?;
                let names = stmt.query_map([], |row| row.get(0))?;
                Ok(names.collect::<Result<Vec<String>, _>>()?)
            })
            .await
            .map_err(Error::from)
    }

    async fn match_request(&self, request: &Request) -> Result<Option<Response>, Error> {
        if !request.method.is_read_only() {
            return Ok(None);
        }

        let key = request_key(request);
        self.conn
            .call(move |conn| -> Result<Option<Response>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT e.response_url, e.status_code, e.headers_json, e.body
                     FROM cache_entries e
                     JOIN cache_generations g ON g.name = e.generation
                     WHERE e.request_key = ?1
                     ORDER BY g.rowid
                     LIMIT 1",
                )?;
                let mut rows = stmt.query(params![key])?;
                match rows.next()? {
                    Some(row) => Ok(Some(read_response(row)?)),
                    None => Ok(None),
                }
            })
            .await
            .map_err(Error::from)
    }
}
