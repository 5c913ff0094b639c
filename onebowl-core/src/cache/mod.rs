//! SQLite-backed store of analyzed recipes, keyed by normalized URL.

mod db;
mod models;
mod schema;

use std::path::Path;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use thiserror::Error;

use crate::types::AnalyzedRecipe;
use db::{DbConn, DbPool};
use models::{from_epoch_secs, to_epoch_secs, CacheRow, NewCacheRow};
use schema::cache;

pub use db::BUSY_TIMEOUT;
pub use models::CacheEntry;

/// Number of entries `recent` returns when the caller has no preference.
pub const DEFAULT_RECENT_LIMIT: usize = 10;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Could not (de)serialize cached recipe: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Cache key for a URL: the URL with its fragment removed, everything else verbatim.
///
/// The fragment always starts at the first `#`, so the cut is textual and
/// host case or a missing trailing slash survive untouched.
pub fn normalize(url: &str) -> String {
    match url.find('#') {
        Some(idx) => url[..idx].to_string(),
        None => url.to_string(),
    }
}

/// Durable mapping from normalized URL to analyzed recipe.
#[derive(Clone)]
pub struct CacheStore {
    pool: DbPool,
}

impl CacheStore {
    /// Open (creating if needed) the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), "cache: opening store");
        Ok(Self {
            pool: db::create_pool(path)?,
        })
    }

    fn conn(&self) -> Result<DbConn, CacheError> {
        self.pool.get().map_err(|e| CacheError::Pool(e.to_string()))
    }

    /// Look up a cached analysis. A missing key is `Ok(None)`.
    pub fn get(&self, key: &str) -> Result<Option<AnalyzedRecipe>, CacheError> {
        let mut conn = self.conn()?;

        let data = cache::table
            .find(key)
            .select(cache::data)
            .first::<String>(&mut conn)
            .optional()?;

        match data {
            Some(data) => {
                tracing::debug!(key, "cache: hit");
                Ok(Some(serde_json::from_str(&data)?))
            }
            None => {
                tracing::debug!(key, "cache: miss");
                Ok(None)
            }
        }
    }

    /// Store an analysis, replacing any existing entry for `key`.
    pub fn put(&self, key: &str, recipe: &AnalyzedRecipe) -> Result<(), CacheError> {
        self.put_at(key, recipe, Utc::now())
    }

    /// Store an analysis with an explicit timestamp.
    ///
    /// A replaced entry loses its flag along with its old data.
    pub fn put_at(
        &self,
        key: &str,
        recipe: &AnalyzedRecipe,
        at: DateTime<Utc>,
    ) -> Result<(), CacheError> {
        let data = serde_json::to_string(recipe)?;
        let mut conn = self.conn()?;

        diesel::replace_into(cache::table)
            .values(&NewCacheRow {
                url: key,
                data: &data,
                created_at: to_epoch_secs(at),
                flagged: false,
            })
            .execute(&mut conn)?;

        tracing::debug!(key, "cache: stored");
        Ok(())
    }

    /// The most recently stored analyses, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<AnalyzedRecipe>, CacheError> {
        let mut conn = self.conn()?;

        let rows = cache::table
            .select(cache::data)
            .order(cache::created_at.desc())
            .limit(i64::try_from(limit).unwrap_or(i64::MAX))
            .load::<String>(&mut conn)?;

        rows.iter()
            .map(|data| serde_json::from_str(data).map_err(CacheError::from))
            .collect()
    }

    /// Mark an entry as flagged. Returns false when `key` has no entry; never creates one.
    pub fn flag(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.conn()?;

        let updated = diesel::update(cache::table.find(key))
            .set(cache::flagged.eq(true))
            .execute(&mut conn)?;

        if updated == 0 {
            tracing::debug!(key, "cache: flag on missing entry");
        } else {
            tracing::info!(key, "cache: entry flagged");
        }
        Ok(updated > 0)
    }

    /// The full stored row for `key`.
    pub fn entry(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let mut conn = self.conn()?;

        let row = cache::table
            .find(key)
            .select(CacheRow::as_select())
            .first(&mut conn)
            .optional()?;

        row.map(|row| {
            Ok(CacheEntry {
                recipe: serde_json::from_str(&row.data)?,
                url: row.url,
                created_at: from_epoch_secs(row.created_at),
                flagged: row.flagged,
            })
        })
        .transpose()
    }
}
