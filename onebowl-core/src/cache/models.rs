use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sql_types::Text;
use serde::Serialize;

use crate::types::AnalyzedRecipe;

#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = super::schema::cache)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct CacheRow {
    pub url: String,
    pub data: String,
    pub created_at: f64,
    pub flagged: bool,
}

#[derive(Insertable)]
#[diesel(table_name = super::schema::cache)]
pub struct NewCacheRow<'a> {
    pub url: &'a str,
    pub data: &'a str,
    pub created_at: f64,
    pub flagged: bool,
}

/// Row of `pragma_table_info`, used to detect missing columns on open.
#[derive(QueryableByName, Debug)]
pub struct ColumnInfo {
    #[diesel(sql_type = Text)]
    pub name: String,
}

/// A cached analysis together with its bookkeeping columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEntry {
    pub url: String,
    pub recipe: AnalyzedRecipe,
    pub created_at: DateTime<Utc>,
    pub flagged: bool,
}

/// Seconds since the epoch, as stored in `created_at`.
pub fn to_epoch_secs(at: DateTime<Utc>) -> f64 {
    at.timestamp_micros() as f64 / 1_000_000.0
}

pub fn from_epoch_secs(secs: f64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros((secs * 1_000_000.0).round() as i64).unwrap_or_default()
}
