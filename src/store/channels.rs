// src/store/channels.rs
//! Channel rows and the per-channel health upsert.

use anyhow::{Context, Result};
use chrono::Utc;

use super::Store;

impl Store {
    /// Insert a channel, or reactivate it if the row already exists.
    /// Returns `true` only for a genuinely new row.
    pub async fn upsert_channel(&self, channel_link: &str, source: &str) -> Result<bool> {
        let res = sqlx::query(
            "INSERT OR IGNORE INTO channels (channel_link, added_date, source) VALUES ($1, $2, $3)",
        )
        .bind(channel_link)
        .bind(Utc::now())
        .bind(source)
        .execute(self.pool())
        .await
        .context("inserting channel")?;
        if res.rows_affected() > 0 {
            return Ok(true);
        }
        sqlx::query("UPDATE channels SET is_active = 1 WHERE channel_link = $1")
            .bind(channel_link)
            .execute(self.pool())
            .await
            .context("reactivating channel")?;
        Ok(false)
    }

    pub async fn active_channels(&self) -> Result<Vec<String>> {
        sqlx::query_scalar("SELECT channel_link FROM channels WHERE is_active = 1")
            .fetch_all(self.pool())
            .await
            .context("listing active channels")
    }

    /// Every known channel link, active or not. Discovery diffs against this.
    pub async fn all_channel_links(&self) -> Result<Vec<String>> {
        sqlx::query_scalar("SELECT channel_link FROM channels")
            .fetch_all(self.pool())
            .await
            .context("listing channels")
    }

    pub async fn set_channel_inactive(&self, channel_link: &str) -> Result<()> {
        sqlx::query("UPDATE channels SET is_active = 0 WHERE channel_link = $1")
            .bind(channel_link)
            .execute(self.pool())
            .await
            .context("deactivating channel")?;
        Ok(())
    }

    /// One health row per channel carries its current status. A `None` error
    /// leaves the stored text in place, so the diagnostic of the most recent
    /// inactive transition survives a recovery to `active`.
    pub async fn upsert_health(
        &self,
        channel_link: &str,
        status: &str,
        error_message: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO channel_health (channel_link, status, last_checked, error_message)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (channel_link) DO UPDATE
            SET status = excluded.status,
                last_checked = excluded.last_checked,
                error_message = COALESCE(excluded.error_message, channel_health.error_message)
            "#,
        )
        .bind(channel_link)
        .bind(status)
        .bind(Utc::now())
        .bind(error_message)
        .execute(self.pool())
        .await
        .context("recording channel health")?;
        Ok(())
    }

    pub async fn channel_health(&self, channel_link: &str) -> Result<Option<(String, Option<String>)>> {
        let row: Option<(String, Option<String>)> = sqlx::query_as(
            "SELECT status, error_message FROM channel_health WHERE channel_link = $1",
        )
        .bind(channel_link)
        .fetch_optional(self.pool())
        .await
        .context("reading channel health")?;
        Ok(row)
    }
}
