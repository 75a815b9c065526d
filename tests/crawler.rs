// tests/crawler.rs
// Crawler behavior against a scripted provider: dedup across reruns, scan
// mode bounds, the single flood-wait retry, lifecycle side effects.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use scamwatch::testing::{forwarded_post, raw_post, ScriptedProvider};
use scamwatch::{Blacklist, ChannelDirectory, Crawler, ScanMode, Store};

struct Rig {
    store: Store,
    channels: ChannelDirectory,
    blacklist: Blacklist,
    provider: Arc<ScriptedProvider>,
    crawler: Crawler,
}

async fn rig(provider: ScriptedProvider) -> Rig {
    let store = Store::in_memory().await.unwrap();
    let blacklist = Blacklist::new(store.clone());
    let channels = ChannelDirectory::new(store.clone(), blacklist.clone());
    let provider = Arc::new(provider);
    let crawler = Crawler::new(
        store.clone(),
        channels.clone(),
        blacklist.clone(),
        provider.clone(),
    );
    Rig {
        store,
        channels,
        blacklist,
        provider,
        crawler,
    }
}

#[tokio::test]
async fn latest_n_saves_then_dedups_on_rerun() {
    let posts = (1..=5).map(|i| raw_post(i, &format!("post {i}"), 0)).collect();
    let rig = rig(ScriptedProvider::new().with_channel("news_feed", posts)).await;
    rig.channels.add_channel("@news_feed", "user").await.unwrap();

    let saved = rig
        .crawler
        .fetch_channel("@news_feed", ScanMode::Latest(5))
        .await
        .unwrap();
    assert_eq!(saved, 5);
    assert_eq!(rig.store.stats().await.unwrap().total, 5);

    // The identical fetch again finds nothing new.
    let saved = rig
        .crawler
        .fetch_channel("@news_feed", ScanMode::Latest(5))
        .await
        .unwrap();
    assert_eq!(saved, 0);
    assert_eq!(rig.store.stats().await.unwrap().total, 5);
}

#[tokio::test]
async fn latest_n_respects_the_limit() {
    let posts = (1..=20).map(|i| raw_post(i, "t", 0)).collect();
    let rig = rig(ScriptedProvider::new().with_channel("news_feed", posts)).await;
    let saved = rig
        .crawler
        .fetch_channel("news_feed", ScanMode::Latest(7))
        .await
        .unwrap();
    assert_eq!(saved, 7);
}

#[tokio::test]
async fn since_months_stops_at_the_first_older_post() {
    // Newest-first history: two recent posts, then one from ~4 months back,
    // then one recent-looking id with an old date never reached.
    let posts = vec![
        raw_post(4, "fresh", 1),
        raw_post(3, "fresh", 10),
        raw_post(2, "stale", 120),
        raw_post(1, "stale", 200),
    ];
    let rig = rig(ScriptedProvider::new().with_channel("news_feed", posts)).await;
    let saved = rig
        .crawler
        .fetch_channel("@news_feed", ScanMode::SinceMonths(1))
        .await
        .unwrap();
    assert_eq!(saved, 2);
}

#[tokio::test]
async fn all_time_walks_every_page() {
    // 250 posts forces three provider pages.
    let posts = (1..=250).map(|i| raw_post(i, "t", 0)).collect();
    let rig = rig(ScriptedProvider::new().with_channel("news_feed", posts)).await;
    let saved = rig
        .crawler
        .fetch_channel("@news_feed", ScanMode::AllTime)
        .await
        .unwrap();
    assert_eq!(saved, 250);
    assert!(rig.provider.history_calls.load(Ordering::SeqCst) >= 3);
}

#[tokio::test]
async fn blacklisted_channel_is_skipped_before_any_network_call() {
    let rig = rig(ScriptedProvider::new().with_channel("news_feed", vec![raw_post(1, "t", 0)]))
        .await;
    rig.blacklist.add("news_feed", "manual").await.unwrap();

    let saved = rig
        .crawler
        .fetch_channel("@news_feed", ScanMode::Latest(5))
        .await
        .unwrap();
    assert_eq!(saved, 0);
    assert_eq!(rig.provider.resolve_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unresolvable_channel_is_deactivated_and_auto_blacklisted() {
    let rig = rig(ScriptedProvider::new()).await;
    rig.channels.add_channel("@ghost_name9", "user").await.unwrap();

    let saved = rig
        .crawler
        .fetch_channel("@ghost_name9", ScanMode::Latest(5))
        .await
        .unwrap();
    assert_eq!(saved, 0);
    assert!(rig.channels.active_channels().await.unwrap().is_empty());
    // The bare name lands in the blacklist so discovery cannot re-add it.
    assert!(rig
        .blacklist
        .is_blacklisted("ghost_name9", true)
        .await
        .unwrap());
}

#[tokio::test]
async fn flood_wait_is_retried_exactly_once() {
    let posts = (1..=3).map(|i| raw_post(i, "t", 0)).collect();
    let provider = ScriptedProvider::new().with_channel("news_feed", posts);
    provider.flood_next(Duration::from_millis(20));
    let rig = rig(provider).await;

    let saved = rig
        .crawler
        .fetch_channel("@news_feed", ScanMode::Latest(3))
        .await
        .unwrap();
    assert_eq!(saved, 3);
}

#[tokio::test]
async fn persistent_flood_wait_gives_up_after_one_retry() {
    let posts = (1..=3).map(|i| raw_post(i, "t", 0)).collect();
    let provider = ScriptedProvider::new().with_channel("news_feed", posts);
    provider.flood_times(Duration::from_millis(20), 2);
    let rig = rig(provider).await;

    let saved = rig
        .crawler
        .fetch_channel("@news_feed", ScanMode::Latest(3))
        .await
        .unwrap();
    assert_eq!(saved, 0);
    // First attempt + single retry, both flooded; no third attempt.
    assert_eq!(rig.provider.history_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn forwarded_post_is_stored_under_both_origins() {
    let posts = vec![forwarded_post(
        7,
        "look at this deal",
        "@original_channel",
        Some("https://t.me/original_channel/42"),
        None,
    )];
    let rig = rig(ScriptedProvider::new().with_channel("resharer", posts)).await;

    let saved = rig
        .crawler
        .fetch_channel("@resharer", ScanMode::Latest(5))
        .await
        .unwrap();
    assert_eq!(saved, 2);

    let all = rig.store.unchecked_posts(None).await.unwrap();
    let reshare = all.iter().find(|p| p.channel_link == "@resharer").unwrap();
    let origin = all
        .iter()
        .find(|p| p.channel_link == "@original_channel")
        .unwrap();
    assert!(!reshare.forwarded);
    assert!(origin.forwarded);
    assert_eq!(origin.post_link, "https://t.me/original_channel/42");
    assert_eq!(origin.post_text, reshare.post_text);
}

#[tokio::test]
async fn empty_posts_without_media_are_not_saved() {
    let mut empty = raw_post(1, "   ", 0);
    empty.text = Some("   ".to_string());
    let mut media_only = raw_post(2, "", 0);
    media_only.text = None;
    media_only.has_media = true;
    let rig = rig(ScriptedProvider::new().with_channel("news_feed", vec![media_only, empty]))
        .await;

    let saved = rig
        .crawler
        .fetch_channel("@news_feed", ScanMode::Latest(5))
        .await
        .unwrap();
    assert_eq!(saved, 1);
}

#[tokio::test]
async fn batch_pass_continues_past_a_bad_channel() {
    let rig = rig(ScriptedProvider::new().with_channel("good_channel", vec![raw_post(1, "t", 0)]))
        .await;
    rig.channels.add_channel("@dead_channel", "user").await.unwrap();
    rig.channels.add_channel("@good_channel", "user").await.unwrap();

    let total = rig.crawler.fetch_all_active(ScanMode::Latest(5)).await.unwrap();
    assert_eq!(total, 1);
    // The dead channel was deactivated, the good one survived.
    assert_eq!(
        rig.channels.active_channels().await.unwrap(),
        vec!["@good_channel"]
    );
}
