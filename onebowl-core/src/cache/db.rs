use std::path::Path;
use std::time::Duration;

use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager, CustomizeConnection};
use diesel::sqlite::SqliteConnection;

use super::models::ColumnInfo;
use super::CacheError;

pub type DbPool = r2d2::Pool<ConnectionManager<SqliteConnection>>;
pub type DbConn = r2d2::PooledConnection<ConnectionManager<SqliteConnection>>;

/// How long a connection waits on a locked database before giving up.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS cache (\
    url TEXT PRIMARY KEY, \
    data TEXT NOT NULL, \
    created_at REAL NOT NULL\
    )";

const ADD_FLAGGED_COLUMN: &str =
    "ALTER TABLE cache ADD COLUMN flagged INTEGER NOT NULL DEFAULT 0";

const TABLE_COLUMNS: &str = "SELECT name FROM pragma_table_info('cache')";

#[derive(Debug)]
struct BusyTimeout(Duration);

impl CustomizeConnection<SqliteConnection, r2d2::Error> for BusyTimeout {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), r2d2::Error> {
        diesel::sql_query(format!("PRAGMA busy_timeout = {}", self.0.as_millis()))
            .execute(conn)
            .map(|_| ())
            .map_err(r2d2::Error::QueryError)
    }
}

/// Open a pool on the SQLite file at `path` and bring the schema up to date.
pub fn create_pool(path: &Path) -> Result<DbPool, CacheError> {
    let manager = ConnectionManager::<SqliteConnection>::new(path.to_string_lossy());
    let pool = r2d2::Pool::builder()
        .connection_customizer(Box::new(BusyTimeout(BUSY_TIMEOUT)))
        .build(manager)
        .map_err(|e| CacheError::Pool(e.to_string()))?;

    let mut conn = pool.get().map_err(|e| CacheError::Pool(e.to_string()))?;
    bootstrap(&mut conn)?;

    Ok(pool)
}

/// Create the table if absent and add columns older stores lack.
pub fn bootstrap(conn: &mut SqliteConnection) -> Result<(), CacheError> {
    diesel::sql_query(CREATE_TABLE).execute(conn)?;

    let columns = diesel::sql_query(TABLE_COLUMNS).load::<ColumnInfo>(conn)?;
    if !columns.iter().any(|c| c.name == "flagged") {
        tracing::info!("cache: adding flagged column to existing store");
        diesel::sql_query(ADD_FLAGGED_COLUMN).execute(conn)?;
    }

    Ok(())
}
