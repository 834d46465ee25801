//! Concurrent batch runs over many targets.
//!
//! The rule tree is compiled once and shared by a fixed pool of workers. Each
//! worker pulls target indices from a shared queue, loads the document (fetching
//! URLs with retry), runs the compiled program against it, and sends the
//! outcome over a channel to a single writer. The writer re-orders outcomes by
//! target index before appending them to one [`Materializer`], so row ids follow
//! target order no matter which fetch finishes first.
//!
//! Cancellation is cooperative: workers stop taking targets and abandon in-flight
//! fetches, while a document that is already executing finishes.
//!
//! # Example
//!
//! ```rust,no_run
//! use gleaner_core::batch::{BatchConfig, Cancellation, run_batch};
//! use gleaner_core::fetch::Source;
//! use gleaner_core::{Rule, RuleTree};
//!
//! # async fn demo() -> gleaner_core::Result<()> {
//! let tree = RuleTree::with_rules("page", vec![Rule::text("title", "h1")]);
//! let sources = vec![Source::Url("https://example.com/a".into()), Source::Html("<h1>b</h1>".into())];
//! let cancellation = Cancellation::new();
//!
//! let report = run_batch(&tree, sources, &BatchConfig::default(), cancellation.token()).await?;
//! println!("{} ok, {} failed", report.succeeded, report.failures.len());
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio::sync::{Mutex, mpsc, watch};

use crate::config::FetchSettings;
use crate::engine::Program;
use crate::fetch::{FetchConfig, Source, build_client};
use crate::materialize::Materializer;
use crate::record::Record;
use crate::rule::RuleTree;
use crate::run::{DocumentFailure, RunReport};
use crate::{GleanerError, Result};

/// Worker pool settings.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Number of workers (default: 5).
    pub concurrency: usize,
    pub fetch: FetchConfig,
    /// Pause after each document, per worker.
    pub delay: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { concurrency: 5, fetch: FetchConfig::default(), delay: Duration::ZERO }
    }
}

impl BatchConfig {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_fetch(mut self, fetch: FetchConfig) -> Self {
        self.fetch = fetch;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl From<&FetchSettings> for BatchConfig {
    fn from(settings: &FetchSettings) -> Self {
        BatchConfig::default()
            .with_concurrency(settings.concurrency)
            .with_fetch(settings.to_fetch_config())
            .with_delay(Duration::from_millis(settings.delay_ms))
    }
}

/// Owner side of a cancellation flag.
#[derive(Debug)]
pub struct Cancellation {
    tx: watch::Sender<bool>,
}

impl Cancellation {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    pub fn token(&self) -> CancelToken {
        CancelToken { rx: self.tx.subscribe() }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer side of a cancellation flag, cloned into every worker.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// A token that is never cancelled.
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        drop(tx);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested; never resolves if it cannot be.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

struct Outcome {
    index: usize,
    source: String,
    result: Result<Record>,
}

struct Worker {
    id: usize,
    program: Arc<Program>,
    client: Client,
    fetch: FetchConfig,
    delay: Duration,
    queue: Arc<Mutex<mpsc::Receiver<(usize, Source)>>>,
    results: mpsc::Sender<Outcome>,
    cancel: CancelToken,
}

impl Worker {
    async fn run(mut self) {
        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            let next = self.queue.lock().await.recv().await;
            let Some((index, source)) = next else { break };

            let loaded = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::debug!(worker = self.id, source = %source.label(), "abandoning fetch");
                    break;
                }
                loaded = source.load(&self.client, &self.fetch) => loaded,
            };

            let result = loaded.and_then(|html| self.program.execute_html(&html));
            tracing::debug!(worker = self.id, index, ok = result.is_ok(), "document done");
            if self.results.send(Outcome { index, source: source.label(), result }).await.is_err() {
                break;
            }

            if !self.delay.is_zero() {
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.delay) => {}
                }
            }
        }
    }
}

/// Runs `tree` over every source with a bounded worker pool.
///
/// # Errors
///
/// Fails up front for an invalid selector, a schema conflict or an HTTP client
/// that cannot be built. Failures of individual documents (and targets skipped
/// because of cancellation) are listed in [`RunReport::failures`].
pub async fn run_batch(
    tree: &RuleTree, sources: Vec<Source>, config: &BatchConfig, cancel: CancelToken,
) -> Result<RunReport> {
    let program = Arc::new(Program::compile(tree)?);
    let mut materializer = Materializer::new(tree)?;
    let client = build_client(&config.fetch)?;

    let total = sources.len();
    let labels: Vec<String> = sources.iter().map(Source::label).collect();
    let workers = config.concurrency.max(1).min(total.max(1));
    tracing::info!(targets = total, workers, "starting batch");

    let (queue_tx, queue_rx) = mpsc::channel(total.max(1));
    for (index, source) in sources.into_iter().enumerate() {
        if queue_tx.send((index, source)).await.is_err() {
            break;
        }
    }
    drop(queue_tx);

    let queue = Arc::new(Mutex::new(queue_rx));
    let (results_tx, mut results_rx) = mpsc::channel(workers * 2);

    let handles: Vec<_> = (0..workers)
        .map(|id| {
            let worker = Worker {
                id,
                program: Arc::clone(&program),
                client: client.clone(),
                fetch: config.fetch.clone(),
                delay: config.delay,
                queue: Arc::clone(&queue),
                results: results_tx.clone(),
                cancel: cancel.clone(),
            };
            tokio::spawn(worker.run())
        })
        .collect();
    drop(results_tx);

    let mut pending: BTreeMap<usize, Outcome> = BTreeMap::new();
    let mut next = 0;
    let mut succeeded = 0;
    let mut failures = Vec::new();

    let mut settle = |outcome: Outcome, materializer: &mut Materializer| match outcome.result {
        Ok(record) => {
            materializer.append(&record);
            succeeded += 1;
        }
        Err(error) => {
            tracing::warn!(source = %outcome.source, error = %error, "document failed");
            failures.push(DocumentFailure { index: outcome.index, source: outcome.source, error });
        }
    };

    while let Some(outcome) = results_rx.recv().await {
        pending.insert(outcome.index, outcome);
        while let Some(ready) = pending.remove(&next) {
            settle(ready, &mut materializer);
            next += 1;
        }
    }

    for handle in handles {
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "worker stopped abnormally");
        }
    }

    // Targets after a gap were never executed (cancelled); keep the rest in order.
    for index in next..total {
        match pending.remove(&index) {
            Some(outcome) => settle(outcome, &mut materializer),
            None => settle(
                Outcome { index, source: labels[index].clone(), result: Err(GleanerError::Cancelled) },
                &mut materializer,
            ),
        }
    }

    let cancelled = cancel.is_cancelled();
    tracing::info!(succeeded, failed = failures.len(), cancelled, "batch finished");

    Ok(RunReport { tables: materializer.finish(), succeeded, failures, cancelled })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::Rule;

    fn tree() -> RuleTree {
        RuleTree::with_rules(
            "pages",
            vec![Rule::text("title", "h1"), Rule::list("items", "li", vec![Rule::text("label", "b")])],
        )
    }

    fn page(n: usize) -> Source {
        let items: String = (0..n).map(|i| format!("<li><b>{}-{}</b></li>", n, i)).collect();
        Source::Html(format!("<h1>page {}</h1><ul>{}</ul>", n, items))
    }

    #[tokio::test]
    async fn test_rows_follow_target_order() {
        let sources: Vec<Source> = (1..=8).map(page).collect();
        let config = BatchConfig::default().with_concurrency(4);

        let report = run_batch(&tree(), sources, &config, CancelToken::never()).await.unwrap();
        assert_eq!(report.succeeded, 8);
        assert!(report.failures.is_empty());

        let root = report.table("pages").unwrap();
        let titles: Vec<&str> = (0..8).filter_map(|i| root.cell(i, "title")).collect();
        assert_eq!(titles, (1..=8).map(|n| format!("page {}", n)).collect::<Vec<_>>());

        let items = report.table("items").unwrap();
        assert_eq!(items.rows.len(), 36);
        let ids: Vec<u64> = items.rows.iter().map(|r| r.row_id).collect();
        assert_eq!(ids, (1..=36).collect::<Vec<u64>>());
        assert_eq!(items.cell(0, "label"), Some("1-0"));
        assert_eq!(items.rows[35].parent_row_id, Some(8));
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let sources = vec![
            page(1),
            Source::Html("   ".into()),
            Source::File("/nonexistent/gleaner/page.html".into()),
            page(2),
        ];

        let report = run_batch(&tree(), sources, &BatchConfig::default(), CancelToken::never()).await.unwrap();
        assert_eq!(report.succeeded, 2);
        let failed: Vec<usize> = report.failures.iter().map(|f| f.index).collect();
        assert_eq!(failed, vec![1, 2]);
        assert!(matches!(report.failures[1].error, GleanerError::FileNotFound(_)));
        assert_eq!(report.table("pages").unwrap().cell(1, "title"), Some("page 2"));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let cancellation = Cancellation::new();
        cancellation.cancel();

        let sources: Vec<Source> = (1..=3).map(page).collect();
        let report = run_batch(&tree(), sources, &BatchConfig::default(), cancellation.token()).await.unwrap();

        assert!(report.cancelled);
        assert_eq!(report.succeeded, 0);
        assert_eq!(report.failures.len(), 3);
        assert!(report.failures.iter().all(|f| matches!(f.error, GleanerError::Cancelled)));
        assert!(report.tables.iter().all(|t| t.rows.is_empty()));
    }

    #[tokio::test]
    async fn test_schema_conflict_fails_up_front() {
        let tree = RuleTree::with_rules("p", vec![Rule::text("row_id", "h1")]);
        let result = run_batch(&tree, vec![page(1)], &BatchConfig::default(), CancelToken::never()).await;
        assert!(matches!(result, Err(GleanerError::SchemaConflict { .. })));
    }

    #[test]
    fn test_config_from_settings() {
        let settings = FetchSettings { concurrency: 0, delay_ms: 100, ..Default::default() };
        let config = BatchConfig::from(&settings);
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.delay, Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_cancel_token_resolves() {
        let cancellation = Cancellation::new();
        let mut token = cancellation.token();
        assert!(!token.is_cancelled());

        cancellation.cancel();
        token.cancelled().await;
        assert!(token.is_cancelled());
    }
}
