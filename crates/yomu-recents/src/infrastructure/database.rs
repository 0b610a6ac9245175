use std::ops::{Deref, DerefMut};
use std::time::Duration;

use sqlx::{
    migrate::MigrateError,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions},
};

/// Connection pool shared by every repository.
#[derive(Clone)]
pub struct Pool(SqlitePool);

impl From<SqlitePool> for Pool {
    fn from(pool: SqlitePool) -> Self {
        Self(pool)
    }
}

impl Deref for Pool {
    type Target = SqlitePool;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Pool {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

/// Open the feed database and bring its schema up to date. `path` accepts
/// `:memory:` for throwaway databases.
pub async fn open_database(path: &str, create: bool) -> Result<Pool, anyhow::Error> {
    let in_memory = path == ":memory:";

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(create)
        .journal_mode(if in_memory {
            SqliteJournalMode::Memory
        } else {
            SqliteJournalMode::Wal
        });

    // An in-memory database lives and dies with its connection, so the pool
    // must pin exactly one and never recycle it.
    let pool_options = if in_memory {
        SqlitePoolOptions::new().min_connections(1).max_connections(1)
    } else {
        SqlitePoolOptions::new()
            .max_connections(5)
            .idle_timeout(Duration::from_secs(60))
            .max_lifetime(Duration::from_secs(3 * 60))
    };
    let pool = pool_options.connect_with(options).await?;

    match sqlx::migrate!("./migrations").run(&pool).await {
        Err(MigrateError::VersionMismatch(version)) => {
            warn!("migration {version} was previously applied but has been modified")
        }
        Err(e) => {
            return Err(e.into());
        }
        _ => {}
    }

    Ok(Pool(pool))
}
