// src/crawler.rs
//! Rate-limited channel crawler.
//!
//! Three scan modes bound how much history one pass covers; the provider is
//! assumed to yield posts newest first, which is what lets `SinceMonths` stop
//! at the first post older than its cutoff. A flood-wait from the provider is
//! answered with exactly one sleep-and-retry, never an unbounded backoff, so
//! the worst-case stall of a single fetch stays bounded.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::blacklist::Blacklist;
use crate::channels::{bare_name, normalize_channel, ChannelDirectory};
use crate::metrics::ensure_metrics_described;
use crate::provider::{ContentProvider, ProviderError, RawPost};
use crate::store::{NewPost, Store};

/// How much history one crawl pass covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// At most this many most-recent posts.
    Latest(u32),
    /// Posts younger than `n * 30` days.
    SinceMonths(u32),
    /// The entire available history.
    AllTime,
}

const PAGE_SIZE: u32 = 100;
/// Between provider pages in the unbounded modes.
const PAGE_DELAY: Duration = Duration::from_millis(300);
/// Between channels in a batch pass.
const CHANNEL_DELAY: Duration = Duration::from_secs(2);
const CHANNEL_DELAY_ALL_TIME: Duration = Duration::from_secs(5);
/// After a failed scheduled cycle; shorter than any sane crawl interval.
const RECOVERY_PAUSE: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct Crawler {
    store: Store,
    channels: ChannelDirectory,
    blacklist: Blacklist,
    provider: Arc<dyn ContentProvider>,
}

impl Crawler {
    pub fn new(
        store: Store,
        channels: ChannelDirectory,
        blacklist: Blacklist,
        provider: Arc<dyn ContentProvider>,
    ) -> Self {
        ensure_metrics_described();
        Self {
            store,
            channels,
            blacklist,
            provider,
        }
    }

    /// Fetch one channel under `mode`; returns how many new rows were saved.
    ///
    /// Blacklisted names are skipped before any network call. A name that
    /// fails to resolve deactivates the channel. One flood-wait is honored
    /// and retried; a second one ends the attempt with zero saved.
    pub async fn fetch_channel(&self, channel: &str, mode: ScanMode) -> Result<u32> {
        let Some(identity) = normalize_channel(channel) else {
            warn!(channel, "skipping malformed channel link");
            return Ok(0);
        };
        let bare = bare_name(&identity).to_string();

        if self.blacklist.is_blacklisted(&bare, false).await? {
            debug!(channel = %identity, "skipping blacklisted channel");
            return Ok(0);
        }

        let attempt = self.fetch_pages(&identity, &bare, mode).await;
        let attempt = match attempt {
            Err(ProviderError::FloodWait { retry_after }) => {
                counter!("crawl_flood_waits_total").increment(1);
                warn!(channel = %identity, wait = ?retry_after, "flood wait, sleeping before single retry");
                sleep(retry_after).await;
                self.fetch_pages(&identity, &bare, mode).await
            }
            other => other,
        };

        match attempt {
            Ok(saved) => {
                self.channels.record_healthy(&identity).await?;
                counter!("crawl_posts_saved_total").increment(u64::from(saved));
                info!(channel = %identity, saved, "channel fetched");
                Ok(saved)
            }
            Err(ProviderError::FloodWait { retry_after }) => {
                // Second signal in a row; give up on this channel for now.
                warn!(channel = %identity, wait = ?retry_after, "flood wait persisted after retry, giving up");
                Ok(0)
            }
            Err(ProviderError::NotFound(reason)) => {
                counter!("crawl_channel_errors_total").increment(1);
                self.channels.deactivate(&identity, &reason).await?;
                Ok(0)
            }
            Err(ProviderError::Transport(e)) => {
                counter!("crawl_channel_errors_total").increment(1);
                warn!(channel = %identity, error = %format!("{e:#}"), "fetch failed");
                Ok(0)
            }
        }
    }

    /// Page through the provider history honoring the scan-mode bounds.
    async fn fetch_pages(
        &self,
        identity: &str,
        bare: &str,
        mode: ScanMode,
    ) -> Result<u32, ProviderError> {
        let handle = self.provider.resolve(bare).await?;
        let cutoff = cutoff_for(mode, Utc::now());
        let mut remaining = match mode {
            ScanMode::Latest(n) => Some(n),
            _ => None,
        };

        let mut offset_id = 0i64;
        let mut saved = 0u32;
        'pages: loop {
            let want = remaining.map_or(PAGE_SIZE, |r| r.min(PAGE_SIZE));
            if want == 0 {
                break;
            }
            let page = self.provider.history(&handle, offset_id, want).await?;
            if page.is_empty() {
                break;
            }
            for post in &page {
                if let (Some(cut), Some(date)) = (cutoff, post.date) {
                    if date < cut {
                        break 'pages;
                    }
                }
                saved += self.persist(identity, bare, post).await;
                if let Some(r) = remaining.as_mut() {
                    *r -= 1;
                    if *r == 0 {
                        break 'pages;
                    }
                }
            }
            offset_id = page.last().map(|p| p.id).unwrap_or(offset_id);
            if !matches!(mode, ScanMode::Latest(_)) {
                sleep(PAGE_DELAY).await;
            }
        }
        Ok(saved)
    }

    /// Persist one fetched post (and, for forwards, the origin's posting).
    /// Returns the number of newly inserted rows; store errors are logged and
    /// cost only the affected row, never the batch.
    async fn persist(&self, identity: &str, bare: &str, post: &RawPost) -> u32 {
        let text_empty = post.text.as_deref().map_or(true, |t| t.trim().is_empty());
        if text_empty && !post.has_media {
            return 0;
        }

        let mut saved = 0u32;
        let row = NewPost {
            channel_link: identity.to_string(),
            post_link: format!("https://t.me/{bare}/{}", post.id),
            post_date: post.date,
            post_text: post.text.clone(),
            forwarded: false,
        };
        match self.store.save_post(&row).await {
            Ok(true) => saved += 1,
            Ok(false) => debug!(link = %row.post_link, "duplicate post skipped"),
            Err(e) => warn!(link = %row.post_link, error = %format!("{e:#}"), "saving post failed"),
        }

        // A forwarded post is stored twice: the re-share above, and the
        // origin's posting here so the original source is represented too.
        if let Some(fwd) = &post.forward {
            let Some(origin) = normalize_channel(&fwd.origin) else {
                return saved;
            };
            let origin_bare = bare_name(&origin).to_string();
            let row = NewPost {
                channel_link: origin,
                post_link: fwd
                    .post_link
                    .clone()
                    .unwrap_or_else(|| format!("https://t.me/{origin_bare}/forwarded-{}", post.id)),
                post_date: fwd.date.or(post.date),
                post_text: post.text.clone(),
                forwarded: true,
            };
            match self.store.save_post(&row).await {
                Ok(true) => saved += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(link = %row.post_link, error = %format!("{e:#}"), "saving forward origin failed")
                }
            }
        }
        saved
    }

    /// Fetch every active channel; one bad channel never aborts the batch.
    pub async fn fetch_all_active(&self, mode: ScanMode) -> Result<u32> {
        let channels = self.channels.active_channels().await?;
        info!(channels = channels.len(), ?mode, "starting crawl pass");
        let delay = match mode {
            ScanMode::AllTime => CHANNEL_DELAY_ALL_TIME,
            _ => CHANNEL_DELAY,
        };
        let mut total = 0u32;
        for (i, channel) in channels.iter().enumerate() {
            match self.fetch_channel(channel, mode).await {
                Ok(saved) => total += saved,
                Err(e) => {
                    counter!("crawl_channel_errors_total").increment(1);
                    warn!(channel = %channel, error = %format!("{e:#}"), "channel pass failed, continuing");
                }
            }
            if i + 1 < channels.len() {
                sleep(delay).await;
            }
        }
        Ok(total)
    }

    /// Unbounded scheduled loop: one crawl pass per interval, with a short
    /// recovery pause instead of termination when a cycle fails.
    pub async fn run_scheduled(&self, every: Duration, mode: ScanMode) {
        loop {
            match self.fetch_all_active(mode).await {
                Ok(saved) => {
                    gauge!("crawl_last_cycle_ts").set(Utc::now().timestamp() as f64);
                    info!(saved, "crawl cycle finished");
                    sleep(every).await;
                }
                Err(e) => {
                    warn!(error = %format!("{e:#}"), "crawl cycle failed, pausing before retry");
                    sleep(RECOVERY_PAUSE.min(every)).await;
                }
            }
        }
    }
}

fn cutoff_for(mode: ScanMode, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match mode {
        ScanMode::SinceMonths(n) => Some(now - chrono::Duration::days(i64::from(n) * 30)),
        _ => None,
    }
}
