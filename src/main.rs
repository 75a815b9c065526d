//! scamwatch daemon: wires the store, crawler and classification worker and
//! keeps both loops alive. The chat front end drives the same library API
//! out of process and is not part of this binary.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use scamwatch::checker::StartOutcome;
use scamwatch::classifier::ChatClassifier;
use scamwatch::{
    Blacklist, ChannelDirectory, Checker, Config, Crawler, GatewayProvider, ScanMode, Store,
};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).compact().init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = Config::from_env()?;
    let store = Store::connect(&config.database_url)
        .await
        .context("store initialization")?;

    let blacklist = Blacklist::new(store.clone());
    blacklist.seed_defaults().await?;

    let channels = ChannelDirectory::new(store.clone(), blacklist.clone());
    for channel in &config.seed_channels {
        if let Err(e) = channels.add_channel(channel, "seed").await {
            warn!(channel = %channel, error = %format!("{e:#}"), "seeding channel failed");
        }
    }

    let provider = Arc::new(GatewayProvider::new(&config)?);
    let crawler = Crawler::new(store.clone(), channels, blacklist, provider);
    let classifier = Arc::new(ChatClassifier::new(&config.classifier)?);
    let checker = Checker::new(store.clone(), classifier);

    info!(
        db = %config.database_url,
        crawl_interval = config.crawl_interval_secs,
        check_interval = config.check_interval_secs,
        "scamwatch starting"
    );

    let crawl_loop = {
        let crawler = crawler.clone();
        let every = Duration::from_secs(config.crawl_interval_secs);
        let mode = ScanMode::Latest(config.posts_per_channel);
        tokio::spawn(async move { crawler.run_scheduled(every, mode).await })
    };

    let check_loop = {
        let checker = checker.clone();
        let store = store.clone();
        let every = Duration::from_secs(config.check_interval_secs);
        let batch_size = config.check_batch_size;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                match store.unchecked_count().await {
                    Ok(0) => continue,
                    Ok(backlog) => debug!(backlog, "starting classification sweep"),
                    Err(e) => {
                        warn!(error = %format!("{e:#}"), "reading backlog failed");
                        continue;
                    }
                }
                match checker.start(batch_size) {
                    StartOutcome::Started(handle) => match handle.join().await {
                        Ok(summary) => info!(
                            processed = summary.processed,
                            stopped = summary.stopped,
                            "classification sweep done"
                        ),
                        Err(e) => error!(error = %format!("{e:#}"), "classification sweep crashed"),
                    },
                    StartOutcome::AlreadyRunning { processed_so_far } => {
                        debug!(processed_so_far, "classification already running");
                    }
                }
            }
        })
    };

    let _ = tokio::try_join!(crawl_loop, check_loop);
    Ok(())
}
