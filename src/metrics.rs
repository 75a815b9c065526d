// src/metrics.rs
//! One-time metric registration so the series carry descriptions whichever
//! recorder the embedding process installs.

use metrics::{describe_counter, describe_gauge};
use once_cell::sync::OnceCell;

pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("crawl_posts_saved_total", "Posts persisted by the crawler.");
        describe_counter!(
            "crawl_channel_errors_total",
            "Channels skipped due to fetch or resolution errors."
        );
        describe_counter!(
            "crawl_flood_waits_total",
            "Flood-wait signals received from the content provider."
        );
        describe_counter!(
            "check_classified_total",
            "Posts given a verdict by the classification worker."
        );
        describe_counter!(
            "check_classifier_errors_total",
            "Classifier failures resolved by the fail-open policy."
        );
        describe_gauge!(
            "crawl_last_cycle_ts",
            "Unix ts when the scheduled crawl last completed."
        );
    });
}
