// src/testing.rs
//! Scripted provider and classifier stubs for the integration suite.
//! Compiled only with the `test-support` feature.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::classifier::RiskClassifier;
use crate::provider::{ChannelHandle, ContentProvider, ProviderError, RawPost};
use crate::store::Store;

/// Run arbitrary SQL against the store, for fixtures the public API cannot
/// express (e.g. a trigger that rejects updates).
pub async fn run_sql(store: &Store, sql: &str) -> Result<()> {
    sqlx::raw_sql(sql).execute(store.pool()).await?;
    Ok(())
}

/// Build a plain text post `days_ago` days old.
pub fn raw_post(id: i64, text: &str, days_ago: i64) -> RawPost {
    RawPost {
        id,
        date: Some(Utc::now() - ChronoDuration::days(days_ago)),
        text: Some(text.to_string()),
        has_media: false,
        forward: None,
    }
}

/// In-memory provider scripted per bare channel name. History pages behave
/// like the real gateway: newest first, `offset_id` exclusive, empty page at
/// the end. `flood_next` arms a one-shot flood-wait on the next history call.
#[derive(Default)]
pub struct ScriptedProvider {
    /// bare name -> newest-first history
    channels: Vec<(String, Vec<RawPost>)>,
    /// (wait, how many upcoming history calls raise it)
    flood: Mutex<Option<(Duration, u32)>>,
    pub resolve_calls: AtomicU32,
    pub history_calls: AtomicU32,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel(mut self, bare: &str, mut posts: Vec<RawPost>) -> Self {
        posts.sort_by_key(|p| std::cmp::Reverse(p.id));
        self.channels.push((bare.to_string(), posts));
        self
    }

    pub fn flood_next(&self, wait: Duration) {
        self.flood_times(wait, 1);
    }

    pub fn flood_times(&self, wait: Duration, times: u32) {
        *self.flood.lock().unwrap() = Some((wait, times));
    }
}

#[async_trait]
impl ContentProvider for ScriptedProvider {
    async fn resolve(&self, channel: &str) -> Result<ChannelHandle, ProviderError> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        let bare = channel.trim_start_matches('@');
        match self.channels.iter().position(|(name, _)| name == bare) {
            Some(idx) => Ok(ChannelHandle {
                id: idx as i64,
                title: bare.to_string(),
            }),
            None => Err(ProviderError::NotFound(format!(
                "USERNAME_NOT_OCCUPIED: @{bare}"
            ))),
        }
    }

    async fn history(
        &self,
        handle: &ChannelHandle,
        offset_id: i64,
        page_size: u32,
    ) -> Result<Vec<RawPost>, ProviderError> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut flood = self.flood.lock().unwrap();
            if let Some((retry_after, times)) = *flood {
                *flood = (times > 1).then_some((retry_after, times - 1));
                return Err(ProviderError::FloodWait { retry_after });
            }
        }
        let (_, posts) = self
            .channels
            .get(handle.id as usize)
            .ok_or_else(|| ProviderError::NotFound(format!("unknown handle {}", handle.id)))?;
        Ok(posts
            .iter()
            .filter(|p| offset_id == 0 || p.id < offset_id)
            .take(page_size as usize)
            .cloned()
            .collect())
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Flags any text containing the trigger word; never fails.
pub struct KeywordClassifier {
    pub trigger: String,
    pub calls: AtomicU32,
}

impl KeywordClassifier {
    pub fn new(trigger: &str) -> Self {
        Self {
            trigger: trigger.to_string(),
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl RiskClassifier for KeywordClassifier {
    async fn classify(&self, text: &str) -> Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(text.contains(&self.trigger))
    }

    fn name(&self) -> &'static str {
        "keyword"
    }
}

/// Always errors, to exercise the fail-open policy.
pub struct FailingClassifier;

#[async_trait]
impl RiskClassifier for FailingClassifier {
    async fn classify(&self, _text: &str) -> Result<bool> {
        bail!("classifier backend unavailable")
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

/// Answers "risky" after a fixed delay, to exercise the loop timeout.
pub struct SlowClassifier {
    pub delay: Duration,
}

#[async_trait]
impl RiskClassifier for SlowClassifier {
    async fn classify(&self, _text: &str) -> Result<bool> {
        tokio::time::sleep(self.delay).await;
        Ok(true)
    }

    fn name(&self) -> &'static str {
        "slow"
    }
}

/// Convenience constructor for a post with forward provenance.
pub fn forwarded_post(
    id: i64,
    text: &str,
    origin: &str,
    origin_link: Option<&str>,
    origin_date: Option<DateTime<Utc>>,
) -> RawPost {
    let mut post = raw_post(id, text, 0);
    post.forward = Some(crate::provider::ForwardInfo {
        origin: origin.to_string(),
        post_link: origin_link.map(str::to_string),
        date: origin_date,
    });
    post
}
