// src/classifier.rs
//! Risk-classifier seam and the chat-completions implementation.
//!
//! The oracle is stateless: one post text in, one yes/no scam verdict out.
//! Timeout enforcement lives in the checker (`tokio::time::timeout`), so an
//! implementation only has to be honest about failing.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ClassifierConfig;

/// Post text longer than this is truncated before it is sent out.
const MAX_PROMPT_CHARS: usize = 4000;

const SYSTEM_PROMPT: &str = "You are an expert at spotting fraudulent and manipulative content. \
Decide whether the following channel post promotes a scam: promised winnings or easy money, \
requests for personal data or transfers, fake urgency (\"free\", \"only today\", \"cashback\"), \
or a pyramid/bonus scheme. Answer with exactly one word: yes or no.";

#[async_trait]
pub trait RiskClassifier: Send + Sync {
    /// `true` means the text looks like a scam scheme.
    async fn classify(&self, text: &str) -> Result<bool>;
    fn name(&self) -> &'static str;
}

/// Chat-completions backend (OpenAI-compatible endpoint, bearer auth).
pub struct ChatClassifier {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl ChatClassifier {
    pub fn new(config: &ClassifierConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("scamwatch/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("building classifier http client")?;
        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMsg,
}

#[derive(Deserialize)]
struct ChoiceMsg {
    content: String,
}

/// Map the model's free-text answer onto a verdict. Accepts the English and
/// Russian spellings; anything else is a classifier failure.
fn parse_verdict(answer: &str) -> Result<bool> {
    let normalized = answer
        .trim()
        .trim_matches(|c: char| c.is_ascii_punctuation())
        .to_lowercase();
    match normalized.as_str() {
        "yes" | "да" => Ok(true),
        "no" | "нет" => Ok(false),
        other => bail!("unrecognized classifier verdict: {other:?}"),
    }
}

#[async_trait]
impl RiskClassifier for ChatClassifier {
    async fn classify(&self, text: &str) -> Result<bool> {
        if self.api_key.is_empty() {
            bail!("classifier api key is not configured");
        }
        let clipped: String = text.chars().take(MAX_PROMPT_CHARS).collect();
        let req = ChatRequest {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                Msg {
                    role: "user",
                    content: &clipped,
                },
            ],
            temperature: 0.1,
            max_tokens: 5,
        };
        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .context("classifier request")?;
        if !resp.status().is_success() {
            bail!("classifier returned {}", resp.status());
        }
        let body: ChatResponse = resp.json().await.context("decoding classifier response")?;
        let answer = body
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| anyhow!("classifier response had no choices"))?;
        parse_verdict(answer)
    }

    fn name(&self) -> &'static str {
        "chat-completions"
    }
}
