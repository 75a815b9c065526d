// src/checker.rs
//! Cancellable classification worker.
//!
//! One worker per process: `start` refuses to spawn a second loop while one
//! is running and instead reports how far the running one has come. The stop
//! signal is observed at batch boundaries only; the classifier call is the
//! loop's sole suspension point within a batch.
//!
//! Policy note for operators: a classifier failure or timeout marks the post
//! NOT risky (fail-open). The queue never wedges on a broken classifier, at
//! the price of possible false negatives.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use metrics::counter;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{info, warn};

use crate::classifier::RiskClassifier;
use crate::metrics::ensure_metrics_described;
use crate::store::Store;

/// Between batches, to stay inside the classifier's rate limit.
const BATCH_PAUSE: Duration = Duration::from_secs(1);
const CLASSIFY_TIMEOUT: Duration = Duration::from_secs(35);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    Idle,
    Running,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub done: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub processed: u64,
    pub total: u64,
    /// Whether the run ended on a stop signal rather than an empty queue.
    pub stopped: bool,
}

pub enum StartOutcome {
    Started(RunHandle),
    /// A run is already active; no second worker is spawned.
    AlreadyRunning { processed_so_far: u64 },
}

pub struct RunHandle {
    join: JoinHandle<RunSummary>,
    pub progress: watch::Receiver<Progress>,
}

impl RunHandle {
    pub async fn join(self) -> Result<RunSummary> {
        self.join.await.context("classification worker panicked")
    }
}

struct Inner {
    running: AtomicBool,
    stop: AtomicBool,
    processed: AtomicU64,
    progress: watch::Sender<Progress>,
}

#[derive(Clone)]
pub struct Checker {
    store: Store,
    classifier: Arc<dyn RiskClassifier>,
    classify_timeout: Duration,
    inner: Arc<Inner>,
}

impl Checker {
    pub fn new(store: Store, classifier: Arc<dyn RiskClassifier>) -> Self {
        ensure_metrics_described();
        let (progress, _) = watch::channel(Progress::default());
        Self {
            store,
            classifier,
            classify_timeout: CLASSIFY_TIMEOUT,
            inner: Arc::new(Inner {
                running: AtomicBool::new(false),
                stop: AtomicBool::new(false),
                processed: AtomicU64::new(0),
                progress,
            }),
        }
    }

    /// Override the per-call classifier timeout (the chat backend already has
    /// its own request timeout; this is the loop's upper bound).
    pub fn with_classify_timeout(mut self, timeout: Duration) -> Self {
        self.classify_timeout = timeout;
        self
    }

    pub fn status(&self) -> WorkerStatus {
        if self.inner.running.load(Ordering::SeqCst) {
            WorkerStatus::Running
        } else {
            WorkerStatus::Idle
        }
    }

    /// Request the running loop to end at its next batch boundary. No-op when idle.
    pub fn stop(&self) {
        self.inner.stop.store(true, Ordering::SeqCst);
    }

    /// Start a classification run over the unchecked backlog. Starting while a
    /// run is active is a no-op that reports the active run's progress.
    pub fn start(&self, batch_size: u32) -> StartOutcome {
        if self
            .inner
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return StartOutcome::AlreadyRunning {
                processed_so_far: self.inner.processed.load(Ordering::SeqCst),
            };
        }
        self.inner.stop.store(false, Ordering::SeqCst);
        self.inner.processed.store(0, Ordering::SeqCst);

        let progress = self.inner.progress.subscribe();
        let worker = self.clone();
        let batch_size = batch_size.max(1);
        let join = tokio::spawn(async move {
            let summary = worker.run(batch_size).await;
            worker.inner.running.store(false, Ordering::SeqCst);
            info!(
                processed = summary.processed,
                total = summary.total,
                stopped = summary.stopped,
                "classification run finished"
            );
            summary
        });
        StartOutcome::Started(RunHandle { join, progress })
    }

    async fn run(&self, batch_size: u32) -> RunSummary {
        let total = match self.store.unchecked_count().await {
            Ok(n) => n.max(0) as u64,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "counting backlog failed, aborting run");
                return RunSummary {
                    processed: 0,
                    total: 0,
                    stopped: false,
                };
            }
        };
        let _ = self.inner.progress.send(Progress { done: 0, total });

        let mut processed = 0u64;
        let mut stopped = false;
        loop {
            // Stop is honored here, at the batch boundary, never mid-batch.
            if self.inner.stop.load(Ordering::SeqCst) {
                stopped = true;
                break;
            }
            let batch = match self.store.unchecked_posts(Some(batch_size)).await {
                Ok(batch) => batch,
                Err(e) => {
                    warn!(error = %format!("{e:#}"), "pulling batch failed, ending run");
                    break;
                }
            };
            if batch.is_empty() {
                break;
            }

            let mut marked_in_batch = 0u32;
            for post in batch {
                let text = post.post_text.as_deref().unwrap_or("");
                let risky = self.classify_fail_open(post.id, text).await;
                match self.store.mark_checked(post.id, risky).await {
                    Ok(true) => {
                        processed += 1;
                        marked_in_batch += 1;
                        self.inner.processed.store(processed, Ordering::SeqCst);
                        counter!("check_classified_total").increment(1);
                    }
                    Ok(false) => warn!(post = post.id, "post vanished before verdict"),
                    Err(e) => {
                        warn!(post = post.id, error = %format!("{e:#}"), "recording verdict failed")
                    }
                }
            }

            // A batch where no verdict could be recorded would be re-pulled
            // unchanged next iteration; end the run instead of spinning.
            if marked_in_batch == 0 {
                warn!("no verdict in the batch could be recorded, ending run");
                break;
            }

            let _ = self.inner.progress.send(Progress {
                done: processed,
                total,
            });
            sleep(BATCH_PAUSE).await;
        }

        let _ = self.inner.progress.send(Progress {
            done: processed,
            total,
        });
        RunSummary {
            processed,
            total,
            stopped,
        }
    }

    /// One verdict, with the documented fail-open fallback.
    async fn classify_fail_open(&self, post_id: i64, text: &str) -> bool {
        match timeout(self.classify_timeout, self.classifier.classify(text)).await {
            Ok(Ok(risky)) => risky,
            Ok(Err(e)) => {
                counter!("check_classifier_errors_total").increment(1);
                warn!(post = post_id, error = %format!("{e:#}"), "classifier failed, marking not risky");
                false
            }
            Err(_) => {
                counter!("check_classifier_errors_total").increment(1);
                warn!(post = post_id, "classifier timed out, marking not risky");
                false
            }
        }
    }
}
