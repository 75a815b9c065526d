// tests/discovery.rs
// Discovery over the unchecked corpus: normalization, exclusion of known
// channels and service accounts, persistence of genuinely new finds.

use chrono::Utc;
use scamwatch::discovery::{find_new_channels, persist_discovered};
use scamwatch::store::{NewPost, Store};
use scamwatch::{Blacklist, ChannelDirectory};

async fn store_with_text(texts: &[&str]) -> Store {
    let store = Store::in_memory().await.unwrap();
    for (i, text) in texts.iter().enumerate() {
        store
            .save_post(&NewPost {
                channel_link: "@monitored".to_string(),
                post_link: format!("https://t.me/monitored/{}", i + 1),
                post_date: Some(Utc::now()),
                post_text: Some(text.to_string()),
                forwarded: false,
            })
            .await
            .unwrap();
    }
    store
}

#[tokio::test]
async fn finds_mentions_minus_known_and_service_accounts() {
    let store = store_with_text(&[
        "напишите в @botsupport или https://t.me/realdeal123",
        "наш основатель @durov_fanclub ведет канал",
    ])
    .await;
    // @realdeal123 is already monitored (inactive state still counts as known).
    store.upsert_channel("@realdeal123", "user").await.unwrap();
    store.set_channel_inactive("@realdeal123").await.unwrap();

    let mut found = find_new_channels(&store).await.unwrap();
    found.sort();
    assert_eq!(found, vec!["@botsupport"]);
}

#[tokio::test]
async fn checked_posts_are_not_scanned() {
    let store = store_with_text(&["smoke", "subscribe to @hidden_gem_channel"]).await;
    let id = store.unchecked_posts(None).await.unwrap()[1].id;
    store.mark_checked(id, false).await.unwrap();

    assert!(find_new_channels(&store).await.unwrap().is_empty());
}

#[tokio::test]
async fn repeated_mentions_are_deduplicated() {
    let store = store_with_text(&[
        "go to t.me/fresh_finds now",
        "again: @Fresh_Finds and https://t.me/fresh_finds?start=x",
    ])
    .await;
    let found = find_new_channels(&store).await.unwrap();
    assert_eq!(found, vec!["@fresh_finds"]);
}

#[tokio::test]
async fn persist_counts_only_new_channels() {
    let store = store_with_text(&[]).await;
    let blacklist = Blacklist::new(store.clone());
    let directory = ChannelDirectory::new(store.clone(), blacklist);
    directory.add_channel("@already_known", "user").await.unwrap();

    let discovered = vec![
        "@already_known".to_string(),
        "@brand_new_channel".to_string(),
    ];
    let saved = persist_discovered(&directory, &discovered).await.unwrap();
    assert_eq!(saved, 1);

    let mut active = directory.active_channels().await.unwrap();
    active.sort();
    assert_eq!(active, vec!["@already_known", "@brand_new_channel"]);
}
