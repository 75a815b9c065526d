// src/store/posts.rs
//! Post rows: deduplicating insert, classification bookkeeping, counters.

use anyhow::{ensure, Context, Result};
use chrono::{DateTime, Utc};
use futures::Stream;

use super::Store;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Post {
    pub id: i64,
    pub check_date: DateTime<Utc>,
    pub post_date: Option<DateTime<Utc>>,
    pub channel_link: String,
    pub post_link: String,
    pub post_text: Option<String>,
    pub forwarded: bool,
    pub is_processed: bool,
    pub is_risky: bool,
}

/// Input for [`Store::save_post`]. `(channel_link, post_link)` is the dedup key.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub channel_link: String,
    pub post_link: String,
    pub post_date: Option<DateTime<Utc>>,
    pub post_text: Option<String>,
    pub forwarded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub total: i64,
    pub risky: i64,
    pub unchecked: i64,
}

impl Store {
    /// Insert a harvested post. Returns `false` (with no side effects) when the
    /// `(channel_link, post_link)` pair is already present.
    pub async fn save_post(&self, post: &NewPost) -> Result<bool> {
        ensure!(!post.channel_link.is_empty(), "post without channel link");
        ensure!(!post.post_link.is_empty(), "post without post link");
        let res = sqlx::query(
            r#"
            INSERT INTO posts (check_date, post_date, channel_link, post_link, post_text, forwarded)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (channel_link, post_link) DO NOTHING
            "#,
        )
        .bind(Utc::now())
        .bind(post.post_date)
        .bind(&post.channel_link)
        .bind(&post.post_link)
        .bind(&post.post_text)
        .bind(post.forwarded)
        .execute(self.pool())
        .await
        .context("saving post")?;
        Ok(res.rows_affected() > 0)
    }

    /// Up to `limit` unchecked posts in insertion order (`None` = all). The
    /// stable order guarantees the classification loop makes forward progress.
    pub async fn unchecked_posts(&self, limit: Option<u32>) -> Result<Vec<Post>> {
        let limit = limit.map(i64::from).unwrap_or(-1);
        sqlx::query_as::<_, Post>(
            "SELECT * FROM posts WHERE is_processed = 0 ORDER BY id LIMIT $1",
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await
        .context("listing unchecked posts")
    }

    /// Record a verdict. Idempotent: re-marking overwrites `is_risky`.
    /// Returns `false` only if no such post exists.
    pub async fn mark_checked(&self, post_id: i64, risky: bool) -> Result<bool> {
        let res = sqlx::query("UPDATE posts SET is_processed = 1, is_risky = $1 WHERE id = $2")
            .bind(risky)
            .bind(post_id)
            .execute(self.pool())
            .await
            .context("marking post checked")?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn unchecked_count(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM posts WHERE is_processed = 0")
            .fetch_one(self.pool())
            .await
            .context("counting unchecked posts")
    }

    pub async fn stats(&self) -> Result<Stats> {
        let total = sqlx::query_scalar("SELECT COUNT(*) FROM posts")
            .fetch_one(self.pool())
            .await?;
        let risky = sqlx::query_scalar("SELECT COUNT(*) FROM posts WHERE is_risky = 1")
            .fetch_one(self.pool())
            .await?;
        let unchecked = self.unchecked_count().await?;
        Ok(Stats {
            total,
            risky,
            unchecked,
        })
    }

    /// Lazy stream over the non-empty texts of unchecked posts, for channel
    /// discovery. Finite; safe to re-invoke from scratch, not restartable
    /// mid-scan.
    pub fn unchecked_texts(&self) -> impl Stream<Item = sqlx::Result<String>> + '_ {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT post_text FROM posts
            WHERE is_processed = 0 AND post_text IS NOT NULL AND post_text != ''
            ORDER BY id
            "#,
        )
        .fetch(self.pool())
    }
}
