// src/store/mod.rs
//! SQLite persistence for posts, channels, the blacklist and channel health.
//!
//! All uniqueness guarantees (post dedup, pattern dedup, one row per channel)
//! live in the schema, not in application locks, so concurrent crawl and
//! classification loops can share one pool without coordinating.

pub mod blacklist;
pub mod channels;
pub mod posts;

use std::str::FromStr;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

pub use posts::{NewPost, Post, Stats};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS posts (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    check_date    TEXT NOT NULL,
    post_date     TEXT,
    channel_link  TEXT NOT NULL,
    post_link     TEXT NOT NULL,
    post_text     TEXT,
    forwarded     INTEGER NOT NULL DEFAULT 0,
    is_processed  INTEGER NOT NULL DEFAULT 0,
    is_risky      INTEGER NOT NULL DEFAULT 0,
    UNIQUE (channel_link, post_link)
);

CREATE TABLE IF NOT EXISTS channels (
    channel_link  TEXT PRIMARY KEY,
    added_date    TEXT NOT NULL,
    is_active     INTEGER NOT NULL DEFAULT 1,
    source        TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS blacklist (
    pattern     TEXT PRIMARY KEY,
    reason      TEXT NOT NULL,
    added_date  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS channel_health (
    channel_link   TEXT PRIMARY KEY,
    status         TEXT NOT NULL,
    last_checked   TEXT NOT NULL,
    error_message  TEXT
);
"#;

/// Shared handle over the SQLite pool. Cloning is cheap.
#[derive(Clone, Debug)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if missing) the database at `url` and ensure the schema.
    ///
    /// This is the only store operation whose failure is fatal to the process;
    /// everything else is logged and skipped by the calling loop.
    pub async fn connect(url: &str) -> Result<Self> {
        let opts = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("invalid database url: {url}"))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await
            .context("opening sqlite database")?;
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    /// An isolated in-memory database, used by the tests and dev tooling.
    pub async fn in_memory() -> Result<Self> {
        // A single connection keeps the in-memory database alive and shared.
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await
            .context("opening in-memory sqlite database")?;
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .context("creating database schema")?;
        Ok(())
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
