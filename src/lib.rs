// src/lib.rs
// Public library surface for the daemon binary and integration tests.

pub mod blacklist;
pub mod channels;
pub mod checker;
pub mod classifier;
pub mod config;
pub mod crawler;
pub mod discovery;
pub mod metrics;
pub mod provider;
pub mod store;

#[cfg(feature = "test-support")]
pub mod testing;

// ---- Re-exports for stable public API ----
pub use crate::blacklist::Blacklist;
pub use crate::channels::ChannelDirectory;
pub use crate::checker::{Checker, StartOutcome, WorkerStatus};
pub use crate::classifier::{ChatClassifier, RiskClassifier};
pub use crate::config::Config;
pub use crate::crawler::{Crawler, ScanMode};
pub use crate::provider::{ContentProvider, GatewayProvider, ProviderError};
pub use crate::store::Store;
