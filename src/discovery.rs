// src/discovery.rs
//! Channel discovery: mine unchecked post text for `@name` mentions and
//! `t.me/name` links, and feed genuinely new ones back into the directory.

use std::collections::HashSet;

use anyhow::Result;
use futures::TryStreamExt;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use crate::channels::ChannelDirectory;
use crate::store::Store;

/// Bare mention or t.me link; usernames are 5-32 word characters.
static CHANNEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:https?://)?(?:t\.me/|@)([a-zA-Z0-9_]{5,32})").unwrap());

/// Platform/service accounts that are never worth monitoring.
const SERVICE_PREFIXES: &[&str] = &["@durov", "@telegram"];

/// All channel mentions in `text`, normalized to `@name` lowercase form.
pub fn extract_mentions(text: &str) -> Vec<String> {
    CHANNEL_RE
        .captures_iter(text)
        .map(|cap| format!("@{}", cap[1].to_ascii_lowercase()))
        .collect()
}

/// Scan the unchecked corpus for channels we do not monitor yet. Known
/// channels (in any lifecycle state) and service accounts are excluded;
/// order of the result is unspecified.
pub async fn find_new_channels(store: &Store) -> Result<Vec<String>> {
    let known: HashSet<String> = store
        .all_channel_links()
        .await?
        .into_iter()
        .map(|c| c.to_ascii_lowercase())
        .collect();

    let mut found: HashSet<String> = HashSet::new();
    let texts = store.unchecked_texts();
    futures::pin_mut!(texts);
    while let Some(text) = texts.try_next().await? {
        for mention in extract_mentions(&text) {
            if known.contains(&mention) {
                continue;
            }
            if SERVICE_PREFIXES.iter().any(|p| mention.starts_with(p)) {
                continue;
            }
            found.insert(mention);
        }
    }
    Ok(found.into_iter().collect())
}

/// Register discovered channels under the `auto_find` origin. Only genuinely
/// new rows count; a failure to add one channel never aborts the rest.
pub async fn persist_discovered(
    directory: &ChannelDirectory,
    channels: &[String],
) -> Result<u32> {
    let mut saved = 0u32;
    for channel in channels {
        match directory.add_channel(channel, "auto_find").await {
            Ok(true) => saved += 1,
            Ok(false) => {}
            Err(e) => warn!(channel = %channel, error = %format!("{e:#}"), "persisting discovered channel failed"),
        }
    }
    Ok(saved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mentions_cover_both_spellings() {
        let text = "напишите в @botsupport или https://t.me/realdeal123";
        assert_eq!(
            extract_mentions(text),
            vec!["@botsupport".to_string(), "@realdeal123".to_string()]
        );
    }

    #[test]
    fn short_and_long_names_are_ignored() {
        assert!(extract_mentions("ping @abc").is_empty());
        // An overlong handle still yields its first 32 chars; the bound caps
        // the match, it does not reject it.
        let too_long = format!("@{}", "a".repeat(33));
        assert_eq!(extract_mentions(&too_long).len(), 1);
    }

    #[test]
    fn mixed_case_is_normalized() {
        assert_eq!(extract_mentions("see t.me/RealDeal123"), vec!["@realdeal123"]);
    }
}
