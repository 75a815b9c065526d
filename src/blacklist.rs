// src/blacklist.rs
//! Pattern blacklist gating which channel names may be crawled or added.
//!
//! Patterns double as exact strings and regex fragments: membership of a
//! *pattern* is checked by identity, while a candidate *name* is tested
//! against every stored pattern as a regular expression. A stored pattern
//! that fails to compile is skipped, so one bad rule never disables the
//! whole matcher.

use anyhow::Result;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::store::Store;

/// Seeded on every start; `INSERT OR IGNORE` keeps this idempotent.
const DEFAULT_PATTERNS: &[(&str, &str)] = &[
    ("admin", "service alias"),
    ("support", "service alias"),
    ("bot", "service alias"),
    ("telegram", "official channel"),
    // Used as a regular expression.
    ("^[a-z]{1,3}$", "channel name too short"),
];

#[derive(Clone, Debug)]
pub struct Blacklist {
    store: Store,
}

impl Blacklist {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Insert the default pattern set. Safe to call on every process start.
    pub async fn seed_defaults(&self) -> Result<()> {
        for (pattern, reason) in DEFAULT_PATTERNS {
            match self.store.add_pattern(pattern, reason).await {
                Ok(true) => info!(pattern, reason, "seeded blacklist pattern"),
                Ok(false) => debug!(pattern, "blacklist pattern already present"),
                Err(e) => warn!(pattern, error = %format!("{e:#}"), "seeding pattern failed"),
            }
        }
        Ok(())
    }

    /// With `as_pattern == true`, check whether `candidate` is itself a stored
    /// pattern (used to avoid reseeding duplicates). Otherwise scan all stored
    /// patterns and test each as a regex against `candidate`.
    pub async fn is_blacklisted(&self, candidate: &str, as_pattern: bool) -> Result<bool> {
        if as_pattern {
            return self.store.has_pattern(candidate).await;
        }
        for pattern in self.store.patterns().await? {
            match Regex::new(&pattern) {
                Ok(re) => {
                    if re.is_match(candidate) {
                        return Ok(true);
                    }
                }
                // Malformed user-entered pattern; skip it, never abort the scan.
                Err(_) => continue,
            }
        }
        Ok(false)
    }

    /// Returns `false` if the pattern was already present.
    pub async fn add(&self, pattern: &str, reason: &str) -> Result<bool> {
        self.store.add_pattern(pattern, reason).await
    }
}
