//! Crawl-run engine: builder, checkpoint/resume decision, dispatch loop.
//!
//! One `Crawler` is one logical dispatcher for one named job. The design
//! assumes exactly one active dispatcher per job name; concurrent
//! dispatchers sharing a namespace would corrupt the counters.

mod dispatch;
mod outcome;
mod summary;

pub use summary::RunSummary;
use summary::RunStats;

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tracing::{info, warn};

use crate::blacklist::{Blacklist, NoBlacklist};
use crate::config::{ConfigError, CrawlConfig};
use crate::queue::{JobKeys, QueueManager};
use crate::request::{RequestRecord, SeedItem};
use crate::store::{MemoryStore, StateStore, StoreError};
use crate::transport::{HttpTransport, Transport};

/// Structured result a success callback may return. `status <= 0` marks a
/// content validation failure: logged with the sorted reasons, resolved
/// without retry (the fetch itself succeeded).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    pub status: i32,
    pub error_reasons: Vec<String>,
}

/// Everything a success callback sees about one fetched page.
#[derive(Debug)]
pub struct SuccessEvent<'a> {
    pub body: &'a [u8],
    pub record: &'a RequestRecord,
    pub headers: &'a BTreeMap<String, String>,
}

/// Per-invocation context handed to the success callback.
///
/// Counter values are snapshots taken just before the callback runs.
/// `enqueue` buffers new seed items; the engine drains the buffer through
/// the queue manager after the callback returns, so callbacks stay
/// synchronous and all store I/O remains in the serialized engine section.
#[derive(Debug, Default)]
pub struct RunHandle {
    total: i64,
    remaining: i64,
    added: RefCell<Vec<SeedItem>>,
}

impl RunHandle {
    fn new(total: i64, remaining: i64) -> Self {
        Self {
            total,
            remaining,
            added: RefCell::new(Vec::new()),
        }
    }

    /// All records accepted into the run so far.
    pub fn total(&self) -> i64 {
        self.total
    }

    /// Unresolved remaining count.
    pub fn remaining(&self) -> i64 {
        self.remaining
    }

    /// Queue a new request for this run; validated and enqueued by the
    /// engine once the callback returns.
    pub fn enqueue(&self, item: impl Into<SeedItem>) {
        self.added.borrow_mut().push(item.into());
    }

    fn take_added(&self) -> Vec<SeedItem> {
        self.added.take()
    }
}

/// Success callback. Returning `Err` is treated as a callback failure:
/// caught, logged, counted as a save error, resolved without retry.
pub type OnSuccess =
    Box<dyn FnMut(&SuccessEvent<'_>, &RunHandle) -> Result<Option<Validation>> + Send>;

/// Error callback, invoked exactly once per record, at the transition to
/// permanent failure.
pub type OnError = Box<dyn FnMut(&RequestRecord, &str) + Send>;

/// Builder for a `Crawler`. Only the job name is mandatory; everything else
/// has the `CrawlConfig` defaults, a no-op blacklist, an in-memory store and
/// a reqwest transport.
pub struct CrawlerBuilder {
    name: String,
    base_uri: String,
    config: CrawlConfig,
    seeds: Option<Box<dyn Iterator<Item = SeedItem> + Send>>,
    on_success: Option<OnSuccess>,
    on_error: Option<OnError>,
    store: Option<Arc<dyn StateStore>>,
    transport: Option<Arc<dyn Transport>>,
    blacklist: Box<dyn Blacklist>,
}

impl CrawlerBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_uri: String::new(),
            config: CrawlConfig::default(),
            seeds: None,
            on_success: None,
            on_error: None,
            store: None,
            transport: None,
            blacklist: Box::new(NoBlacklist),
        }
    }

    /// Prefix prepended to every seed item's URI.
    pub fn base_uri(mut self, base_uri: impl Into<String>) -> Self {
        self.base_uri = base_uri.into();
        self
    }

    /// Replace the whole tuning config (e.g. from `config::load_or_init`).
    pub fn config(mut self, config: CrawlConfig) -> Self {
        self.config = config;
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.config.concurrency = concurrency;
        self
    }

    pub fn resume(mut self, resume: bool) -> Self {
        self.config.resume = resume;
        self
    }

    pub fn timeout_secs(mut self, timeout_secs: f64) -> Self {
        self.config.timeout_secs = timeout_secs;
        self
    }

    pub fn log_step(mut self, log_step: u64) -> Self {
        self.config.log_step = log_step;
        self
    }

    pub fn interval_secs(mut self, interval_secs: f64) -> Self {
        self.config.interval_secs = interval_secs;
        self
    }

    pub fn queue_len(mut self, queue_len: u64) -> Self {
        self.config.queue_len = Some(queue_len);
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.config.max_retries = max_retries;
        self
    }

    pub fn check_blacklist(mut self, check: bool) -> Self {
        self.config.check_blacklist = check;
        self
    }

    /// Lazy seed producer, consumed once when the run seeds fresh.
    pub fn seeds<I>(mut self, seeds: I) -> Self
    where
        I: IntoIterator + Send + 'static,
        I::IntoIter: Send + 'static,
        I::Item: Into<SeedItem>,
    {
        self.seeds = Some(Box::new(seeds.into_iter().map(Into::into)));
        self
    }

    pub fn on_success<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&SuccessEvent<'_>, &RunHandle) -> Result<Option<Validation>> + Send + 'static,
    {
        self.on_success = Some(Box::new(callback));
        self
    }

    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&RequestRecord, &str) + Send + 'static,
    {
        self.on_error = Some(Box::new(callback));
        self
    }

    pub fn store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn blacklist(mut self, blacklist: impl Blacklist + 'static) -> Self {
        self.blacklist = Box::new(blacklist);
        self
    }

    /// Fail-fast validation; a missing job name never starts a run.
    pub fn build(self) -> Result<Crawler, ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::MissingName);
        }
        let mut cfg = self.config;
        cfg.concurrency = cfg.concurrency.max(1);

        let store: Arc<dyn StateStore> = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(
                HttpTransport::new(cfg.timeout())
                    .map_err(|e| ConfigError::HttpClient(e.to_string()))?,
            ),
        };

        let keys = JobKeys::new(&self.name);
        Ok(Crawler {
            name: self.name,
            base_uri: self.base_uri,
            cfg,
            queue: QueueManager::new(store, keys),
            transport,
            blacklist: self.blacklist,
            seeds: self.seeds,
            on_success: self.on_success.unwrap_or_else(|| Box::new(|_, _| Ok(None))),
            on_error: self.on_error.unwrap_or_else(|| Box::new(|_, _| {})),
        })
    }
}

/// The crawl-run engine for one named job.
pub struct Crawler {
    name: String,
    base_uri: String,
    cfg: CrawlConfig,
    queue: QueueManager,
    transport: Arc<dyn Transport>,
    blacklist: Box<dyn Blacklist>,
    seeds: Option<Box<dyn Iterator<Item = SeedItem> + Send>>,
    on_success: OnSuccess,
    on_error: OnError,
}

impl Crawler {
    pub fn builder(name: impl Into<String>) -> CrawlerBuilder {
        CrawlerBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn blacklist_hook(&self) -> Option<&dyn Blacklist> {
        self.cfg.check_blacklist.then_some(self.blacklist.as_ref())
    }

    /// Inject one request into the run. Safe to call while dispatching;
    /// returns false when the item is rejected by validation or blacklist.
    pub async fn add_request(&self, item: impl Into<SeedItem>) -> Result<bool, StoreError> {
        self.queue
            .add_request(item.into(), &self.base_uri, self.blacklist_hook())
            .await
    }

    /// All records accepted into the current run.
    pub async fn total(&self) -> Result<i64, StoreError> {
        self.queue.total().await
    }

    /// Unresolved remaining count.
    pub async fn remaining(&self) -> Result<i64, StoreError> {
        self.queue.remaining().await
    }

    /// Run the crawl to completion: seed or resume, dispatch until the
    /// remaining counter reaches zero, then wipe the namespace and return
    /// the summary.
    pub async fn run(&mut self) -> Result<RunSummary> {
        let started = Instant::now();
        info!(job = %self.name, "crawl start");

        let resumable = self.cfg.resume && self.queue.remaining().await? > 0;
        if resumable {
            info!(job = %self.name, "resuming from persisted state");
            self.queue.recover_in_flight().await?;
        } else {
            info!(job = %self.name, "seeding queue");
            self.queue.clear().await?;
            let seeds = self
                .seeds
                .take()
                .unwrap_or_else(|| Box::new(std::iter::empty()));
            self.queue
                .seed(seeds, &self.base_uri, self.blacklist_hook(), self.cfg.queue_len)
                .await?;
            info!(job = %self.name, total = self.queue.total().await?, "seeding done");
        }

        let mut stats = RunStats::default();
        loop {
            let remaining = self.queue.remaining().await?;
            if remaining <= 0 {
                break;
            }
            let processed = self.run_tick(&mut stats).await?;
            if processed == 0 {
                // Counters that disagree with the queues would spin forever.
                // Abort without the namespace wipe so the persisted state
                // stays inspectable.
                warn!(
                    job = %self.name,
                    remaining,
                    "unresolved requests remain but nothing is dispatchable; aborting"
                );
                anyhow::bail!(
                    "job `{}` aborted with {remaining} unresolved requests and empty queues; \
                     persisted state kept",
                    self.name
                );
            }
        }

        let summary = RunSummary {
            elapsed: started.elapsed(),
            concurrency: self.cfg.concurrency,
            total_pages: self.queue.total().await?,
            request_error_pages: stats.request_error_pages,
            save_error_pages: stats.save_error_pages,
        };
        info!(job = %self.name, "{summary}");
        self.queue.clear().await?;
        Ok(summary)
    }
}
