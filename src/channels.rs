// src/channels.rs
//! Channel lifecycle: canonical link form, add/reactivate, deactivation with
//! health history, and auto-blacklisting of permanently invalid names.

use anyhow::{anyhow, Result};
use tracing::{info, warn};

use crate::blacklist::Blacklist;
use crate::store::Store;

/// Error fragments the provider emits for names that can never resolve.
/// Seeing one of these while deactivating also blacklists the bare name so
/// discovery cannot re-add it.
const UNRESOLVABLE_MARKERS: &[&str] = &[
    "USERNAME_INVALID",
    "USERNAME_NOT_OCCUPIED",
    "username not occupied",
];

const AUTO_BLACKLIST_REASON: &str = "auto: channel name does not resolve";

/// Maximum error text retained on a health row.
const ERROR_TEXT_LIMIT: usize = 500;

/// Reduce any accepted spelling (`@name`, `t.me/name`, `https://t.me/name?foo`)
/// to the single canonical `@name` lowercase form. `None` for empty input.
pub fn normalize_channel(raw: &str) -> Option<String> {
    let mut s = raw.trim();
    s = s
        .strip_prefix("https://")
        .or_else(|| s.strip_prefix("http://"))
        .unwrap_or(s);
    s = s.strip_prefix("t.me/").unwrap_or(s);
    let s = s.rsplit('/').next().unwrap_or(s);
    let s = s.split('?').next().unwrap_or(s);
    let bare = s.trim_start_matches('@').trim().to_ascii_lowercase();
    if bare.is_empty() {
        return None;
    }
    Some(format!("@{bare}"))
}

/// The name part of a canonical `@name` identity.
pub fn bare_name(identity: &str) -> &str {
    identity.trim_start_matches('@')
}

#[derive(Clone, Debug)]
pub struct ChannelDirectory {
    store: Store,
    blacklist: Blacklist,
}

impl ChannelDirectory {
    pub fn new(store: Store, blacklist: Blacklist) -> Self {
        Self { store, blacklist }
    }

    /// Add a channel for monitoring. Idempotent: an existing inactive row is
    /// reactivated. Returns `true` only for a genuinely new channel.
    pub async fn add_channel(&self, raw: &str, origin: &str) -> Result<bool> {
        let identity =
            normalize_channel(raw).ok_or_else(|| anyhow!("malformed channel link: {raw:?}"))?;
        let created = self.store.upsert_channel(&identity, origin).await?;
        if created {
            info!(channel = %identity, origin, "channel added");
        }
        Ok(created)
    }

    pub async fn active_channels(&self) -> Result<Vec<String>> {
        self.store.active_channels().await
    }

    /// Mark a channel inactive and record the failure. Never hard-deletes.
    pub async fn deactivate(&self, identity: &str, error_text: &str) -> Result<()> {
        let truncated: String = error_text.chars().take(ERROR_TEXT_LIMIT).collect();
        self.store.set_channel_inactive(identity).await?;
        self.store
            .upsert_health(identity, "inactive", Some(&truncated))
            .await?;
        warn!(channel = %identity, error = %truncated, "channel deactivated");

        if UNRESOLVABLE_MARKERS
            .iter()
            .any(|m| error_text.to_ascii_lowercase().contains(&m.to_ascii_lowercase()))
        {
            let bare = bare_name(identity);
            if self.blacklist.add(bare, AUTO_BLACKLIST_REASON).await? {
                info!(channel = %identity, "unresolvable name auto-blacklisted");
            }
        }
        Ok(())
    }

    /// Upsert the health row to `active` with a fresh check time.
    pub async fn record_healthy(&self, identity: &str) -> Result<()> {
        self.store.upsert_health(identity, "active", None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_has_one_canonical_form() {
        for raw in [
            "@News_Feed",
            "news_feed",
            "t.me/news_feed",
            "https://t.me/news_feed",
            "https://t.me/news_feed?start=1",
            "  http://t.me/s/News_Feed  ",
        ] {
            assert_eq!(normalize_channel(raw).as_deref(), Some("@news_feed"), "{raw}");
        }
    }

    #[test]
    fn empty_identities_are_rejected() {
        assert_eq!(normalize_channel(""), None);
        assert_eq!(normalize_channel("   "), None);
        assert_eq!(normalize_channel("https://t.me/"), None);
        assert_eq!(normalize_channel("@"), None);
    }

    #[test]
    fn bare_name_strips_the_marker() {
        assert_eq!(bare_name("@news"), "news");
        assert_eq!(bare_name("news"), "news");
    }

    async fn directory() -> ChannelDirectory {
        let store = Store::in_memory().await.unwrap();
        ChannelDirectory::new(store.clone(), Blacklist::new(store))
    }

    #[tokio::test]
    async fn add_is_idempotent_across_spellings() {
        let dir = directory().await;
        assert!(dir.add_channel("@news_feed", "user").await.unwrap());
        assert!(!dir
            .add_channel("https://t.me/News_Feed", "user")
            .await
            .unwrap());
        assert_eq!(dir.active_channels().await.unwrap(), vec!["@news_feed"]);
    }

    #[tokio::test]
    async fn re_add_reactivates_inactive_channel() {
        let dir = directory().await;
        dir.add_channel("@news_feed", "user").await.unwrap();
        dir.deactivate("@news_feed", "connection reset").await.unwrap();
        assert!(dir.active_channels().await.unwrap().is_empty());

        assert!(!dir.add_channel("@news_feed", "user").await.unwrap());
        assert_eq!(dir.active_channels().await.unwrap(), vec!["@news_feed"]);
    }

    #[tokio::test]
    async fn malformed_link_is_surfaced() {
        let dir = directory().await;
        let err = dir.add_channel("https://t.me/", "user").await.unwrap_err();
        assert!(err.to_string().contains("malformed channel link"));
    }

    #[tokio::test]
    async fn unresolvable_error_auto_blacklists() {
        let dir = directory().await;
        dir.add_channel("@ghost_channel9", "user").await.unwrap();
        dir.deactivate("@ghost_channel9", "rpc error: USERNAME_NOT_OCCUPIED")
            .await
            .unwrap();
        assert!(dir
            .blacklist
            .is_blacklisted("ghost_channel9", true)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn ordinary_error_does_not_blacklist() {
        let dir = directory().await;
        dir.add_channel("@flaky_channel", "user").await.unwrap();
        dir.deactivate("@flaky_channel", "timeout talking to gateway")
            .await
            .unwrap();
        assert!(!dir
            .blacklist
            .is_blacklisted("flaky_channel", true)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn recovery_keeps_the_last_failure_diagnostic() {
        let dir = directory().await;
        dir.add_channel("@flaky_channel", "user").await.unwrap();
        dir.deactivate("@flaky_channel", "timeout talking to gateway")
            .await
            .unwrap();
        dir.record_healthy("@flaky_channel").await.unwrap();

        let (status, error) = dir
            .store
            .channel_health("@flaky_channel")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(status, "active");
        assert_eq!(error.as_deref(), Some("timeout talking to gateway"));
    }

    #[tokio::test]
    async fn deactivation_error_text_is_truncated() {
        let dir = directory().await;
        dir.add_channel("@verbose_err", "user").await.unwrap();
        let long = "x".repeat(2000);
        dir.deactivate("@verbose_err", &long).await.unwrap();
        let (status, error) = dir
            .store
            .channel_health("@verbose_err")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(status, "inactive");
        assert_eq!(error.unwrap().len(), 500);
    }
}
