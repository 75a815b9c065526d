// src/provider.rs
//! Content-provider seam. The crawler only sees this trait; the concrete
//! implementation talks to a tdlib-bridge-style HTTP gateway.
//!
//! Rate limiting is flow control here, not an exception: a provider that is
//! being throttled returns [`ProviderError::FloodWait`] with the wait the
//! backend demanded, and the crawler decides what to do with it.

use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::channels::bare_name;
use crate::config::Config;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The backend demands a pause of exactly `retry_after` before the next call.
    #[error("flood wait, retry after {retry_after:?}")]
    FloodWait { retry_after: Duration },
    /// The channel name does not resolve. Carries the backend's diagnostic.
    #[error("channel not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

/// Provider-side identity of a resolved channel.
#[derive(Debug, Clone)]
pub struct ChannelHandle {
    pub id: i64,
    pub title: String,
}

#[derive(Debug, Clone)]
pub struct RawPost {
    pub id: i64,
    pub date: Option<DateTime<Utc>>,
    pub text: Option<String>,
    pub has_media: bool,
    pub forward: Option<ForwardInfo>,
}

/// Provenance of a forwarded post.
#[derive(Debug, Clone)]
pub struct ForwardInfo {
    /// Origin channel, in any spelling the backend reports.
    pub origin: String,
    /// Link to the original posting, when the backend can resolve it.
    pub post_link: Option<String>,
    pub date: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait ContentProvider: Send + Sync {
    async fn resolve(&self, channel: &str) -> Result<ChannelHandle, ProviderError>;

    /// One page of history, newest first. `offset_id == 0` starts from the
    /// most recent post; otherwise only posts older than `offset_id` are
    /// returned. An empty page means the history is exhausted.
    async fn history(
        &self,
        handle: &ChannelHandle,
        offset_id: i64,
        page_size: u32,
    ) -> Result<Vec<RawPost>, ProviderError>;

    fn name(&self) -> &'static str;
}

// ------------------------------------------------------------
// HTTP gateway implementation
// ------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct WireChannel {
    id: i64,
    title: String,
}

#[derive(Debug, Deserialize)]
struct WirePost {
    id: i64,
    date: Option<DateTime<Utc>>,
    text: Option<String>,
    #[serde(default)]
    has_media: bool,
    forward_from: Option<String>,
    forward_link: Option<String>,
    forward_date: Option<DateTime<Utc>>,
}

impl From<WirePost> for RawPost {
    fn from(w: WirePost) -> Self {
        let forward = w.forward_from.map(|origin| ForwardInfo {
            origin,
            post_link: w.forward_link,
            date: w.forward_date,
        });
        RawPost {
            id: w.id,
            date: w.date,
            text: w.text,
            has_media: w.has_media,
            forward,
        }
    }
}

pub struct GatewayProvider {
    http: reqwest::Client,
    base_url: String,
}

impl GatewayProvider {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(token) = &config.gateway_token {
            let value = reqwest::header::HeaderValue::from_str(&format!("Bearer {token}"))
                .context("gateway token is not a valid header value")?;
            headers.insert(reqwest::header::AUTHORIZATION, value);
        }
        let http = reqwest::Client::builder()
            .user_agent("scamwatch/0.1")
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(20))
            .build()
            .context("building gateway http client")?;
        Ok(Self {
            http,
            base_url: config.gateway_url.trim_end_matches('/').to_string(),
        })
    }

    /// Map a throttling response to the typed flood-wait signal.
    fn flood_wait(resp: &reqwest::Response) -> ProviderError {
        let secs = resp
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(30);
        ProviderError::FloodWait {
            retry_after: Duration::from_secs(secs),
        }
    }
}

#[async_trait]
impl ContentProvider for GatewayProvider {
    async fn resolve(&self, channel: &str) -> Result<ChannelHandle, ProviderError> {
        let bare = bare_name(channel);
        let url = format!("{}/resolve", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(&[("channel", bare)])
            .send()
            .await
            .map_err(|e| anyhow!(e).context("gateway resolve request"))?;
        match resp.status() {
            reqwest::StatusCode::TOO_MANY_REQUESTS => Err(Self::flood_wait(&resp)),
            reqwest::StatusCode::NOT_FOUND => {
                let body = resp.text().await.unwrap_or_default();
                Err(ProviderError::NotFound(format!(
                    "USERNAME_NOT_OCCUPIED: @{bare} {body}"
                )))
            }
            status if status.is_success() => {
                let wire: WireChannel = resp
                    .json()
                    .await
                    .map_err(|e| anyhow!(e).context("decoding resolve response"))?;
                Ok(ChannelHandle {
                    id: wire.id,
                    title: wire.title,
                })
            }
            status => Err(anyhow!("gateway resolve returned {status}").into()),
        }
    }

    async fn history(
        &self,
        handle: &ChannelHandle,
        offset_id: i64,
        page_size: u32,
    ) -> Result<Vec<RawPost>, ProviderError> {
        let url = format!("{}/history", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(&[
                ("chat_id", handle.id.to_string()),
                ("offset_id", offset_id.to_string()),
                ("limit", page_size.to_string()),
            ])
            .send()
            .await
            .map_err(|e| anyhow!(e).context("gateway history request"))?;
        match resp.status() {
            reqwest::StatusCode::TOO_MANY_REQUESTS => Err(Self::flood_wait(&resp)),
            status if status.is_success() => {
                let wire: Vec<WirePost> = resp
                    .json()
                    .await
                    .map_err(|e| anyhow!(e).context("decoding history response"))?;
                Ok(wire.into_iter().map(Into::into).collect())
            }
            status => Err(anyhow!("gateway history returned {status}").into()),
        }
    }

    fn name(&self) -> &'static str {
        "gateway"
    }
}
