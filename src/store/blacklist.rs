// src/store/blacklist.rs
//! Raw blacklist rows. Matching semantics live in [`crate::blacklist`].

use anyhow::{Context, Result};
use chrono::Utc;

use super::Store;

impl Store {
    /// Insert a pattern; `false` means it was already present.
    pub async fn add_pattern(&self, pattern: &str, reason: &str) -> Result<bool> {
        let res = sqlx::query(
            "INSERT OR IGNORE INTO blacklist (pattern, reason, added_date) VALUES ($1, $2, $3)",
        )
        .bind(pattern)
        .bind(reason)
        .bind(Utc::now())
        .execute(self.pool())
        .await
        .context("adding blacklist pattern")?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn has_pattern(&self, pattern: &str) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM blacklist WHERE pattern = $1")
            .bind(pattern)
            .fetch_optional(self.pool())
            .await
            .context("looking up blacklist pattern")?;
        Ok(found.is_some())
    }

    pub async fn patterns(&self) -> Result<Vec<String>> {
        sqlx::query_scalar("SELECT pattern FROM blacklist")
            .fetch_all(self.pool())
            .await
            .context("listing blacklist patterns")
    }
}
