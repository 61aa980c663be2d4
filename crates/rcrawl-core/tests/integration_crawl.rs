//! Integration tests for the crawl engine over a scripted transport.
//!
//! Each test builds a crawler against an in-memory store and a transport
//! whose per-URI behavior is scripted, then asserts the run summary and
//! the callback traffic.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rcrawl_core::engine::{Crawler, Validation};
use rcrawl_core::queue::JobKeys;
use rcrawl_core::request::RequestRecord;
use rcrawl_core::store::{MemoryStore, StateStore};
use rcrawl_core::transport::{Transport, TransportError, TransportResponse};

#[derive(Debug, Clone, Copy)]
enum Script {
    Ok,
    FailAlways,
    FailTimes(u32),
}

/// Transport whose responses follow a per-URI script. URIs without a
/// script succeed with a fixed body.
#[derive(Default)]
struct ScriptedTransport {
    scripts: Mutex<HashMap<String, Script>>,
    attempts: Mutex<HashMap<String, u32>>,
}

impl ScriptedTransport {
    fn script(self, uri: &str, script: Script) -> Self {
        self.scripts.lock().unwrap().insert(uri.to_string(), script);
        self
    }

    fn attempts(&self, uri: &str) -> u32 {
        self.attempts.lock().unwrap().get(uri).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&self, record: &RequestRecord) -> Result<TransportResponse, TransportError> {
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let counter = attempts.entry(record.uri.clone()).or_insert(0);
            *counter += 1;
            *counter
        };
        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(&record.uri)
            .copied()
            .unwrap_or(Script::Ok);
        match script {
            Script::Ok => Ok(ok_response()),
            Script::FailAlways => Err(TransportError::Status(500)),
            Script::FailTimes(n) if attempt <= n => Err(TransportError::Status(500)),
            Script::FailTimes(_) => Ok(ok_response()),
        }
    }
}

fn ok_response() -> TransportResponse {
    TransportResponse {
        status: 200,
        headers: BTreeMap::new(),
        body: b"page body".to_vec(),
    }
}

#[tokio::test]
async fn crawl_completes_all_seeds() {
    let transport = Arc::new(ScriptedTransport::default());
    let fetched = Arc::new(Mutex::new(Vec::new()));
    let seeds: Vec<String> = (0..10).map(|i| format!("http://test/p{i}")).collect();

    let fetched_cb = Arc::clone(&fetched);
    let mut crawler = Crawler::builder("all-seeds")
        .concurrency(2)
        .seeds(seeds.clone())
        .transport(transport)
        .on_success(move |event, _handle| {
            fetched_cb.lock().unwrap().push(event.record.uri.clone());
            Ok(None)
        })
        .build()
        .unwrap();

    let summary = crawler.run().await.unwrap();
    assert_eq!(summary.total_pages, 10);
    assert_eq!(summary.request_error_pages, 0);
    assert_eq!(summary.save_error_pages, 0);

    let fetched: HashSet<String> = fetched.lock().unwrap().iter().cloned().collect();
    let expected: HashSet<String> = seeds.into_iter().collect();
    assert_eq!(fetched, expected);
}

#[tokio::test]
async fn permanent_failure_fires_error_callback_once() {
    let transport =
        Arc::new(ScriptedTransport::default().script("http://test/bad", Script::FailAlways));
    let errors = Arc::new(Mutex::new(Vec::new()));
    let successes = Arc::new(Mutex::new(0u32));

    let errors_cb = Arc::clone(&errors);
    let successes_cb = Arc::clone(&successes);
    let mut crawler = Crawler::builder("always-fails")
        .max_retries(2)
        .seeds(vec!["http://test/bad"])
        .transport(transport.clone())
        .on_success(move |_event, _handle| {
            *successes_cb.lock().unwrap() += 1;
            Ok(None)
        })
        .on_error(move |record, reason| {
            errors_cb.lock().unwrap().push((record.uri.clone(), reason.to_string()));
        })
        .build()
        .unwrap();

    let summary = crawler.run().await.unwrap();
    // max_retries bounds the retries, so attempts = retries + 1.
    assert_eq!(transport.attempts("http://test/bad"), 3);
    assert_eq!(summary.request_error_pages, 3);
    assert_eq!(*successes.lock().unwrap(), 0);

    let errors = errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0, "http://test/bad");
    assert_eq!(errors[0].1, "HTTP status 500");
}

#[tokio::test]
async fn transient_failure_retries_then_succeeds() {
    let transport =
        Arc::new(ScriptedTransport::default().script("http://test/flaky", Script::FailTimes(2)));
    let errors = Arc::new(Mutex::new(0u32));
    let successes = Arc::new(Mutex::new(0u32));

    let errors_cb = Arc::clone(&errors);
    let successes_cb = Arc::clone(&successes);
    let mut crawler = Crawler::builder("flaky")
        .max_retries(5)
        .seeds(vec!["http://test/flaky"])
        .transport(transport.clone())
        .on_success(move |_event, _handle| {
            *successes_cb.lock().unwrap() += 1;
            Ok(None)
        })
        .on_error(move |_record, _reason| {
            *errors_cb.lock().unwrap() += 1;
        })
        .build()
        .unwrap();

    let summary = crawler.run().await.unwrap();
    assert_eq!(transport.attempts("http://test/flaky"), 3);
    assert_eq!(summary.request_error_pages, 2);
    assert_eq!(*successes.lock().unwrap(), 1);
    assert_eq!(*errors.lock().unwrap(), 0);
}

#[tokio::test]
async fn duplicate_seeds_collapse_during_seeding() {
    let transport = Arc::new(ScriptedTransport::default());
    let mut crawler = Crawler::builder("dedup")
        .seeds(vec!["http://test/a", "http://test/b", "http://test/a"])
        .transport(transport.clone())
        .build()
        .unwrap();

    let summary = crawler.run().await.unwrap();
    assert_eq!(summary.total_pages, 2);
    assert_eq!(transport.attempts("http://test/a"), 1);
}

#[tokio::test]
async fn resume_recovers_in_flight_and_skips_seeds() {
    let store = Arc::new(MemoryStore::new());
    let keys = JobKeys::new("resumable");

    // Persisted state of an interrupted run: 5 accepted, 2 resolved,
    // 3 captured in flight.
    for (slot, uri) in ["http://test/r0", "http://test/r1", "http://test/r2"]
        .iter()
        .enumerate()
    {
        let record = RequestRecord {
            method: "GET".to_string(),
            uri: uri.to_string(),
            headers: BTreeMap::new(),
            callback_data: serde_json::Value::Null,
            options: serde_json::Value::Null,
        };
        store
            .hash_set(&keys.requesting(), &slot.to_string(), &record.canonical())
            .await
            .unwrap();
    }
    store.counter_set(&keys.total(), 5).await.unwrap();
    store.counter_set(&keys.overplus(), 3).await.unwrap();

    let transport = Arc::new(ScriptedTransport::default());
    let fetched = Arc::new(Mutex::new(Vec::new()));
    let fetched_cb = Arc::clone(&fetched);
    let mut crawler = Crawler::builder("resumable")
        .resume(true)
        .seeds(vec!["http://test/seed-must-not-run"])
        .store(store)
        .transport(transport.clone())
        .on_success(move |event, _handle| {
            fetched_cb.lock().unwrap().push(event.record.uri.clone());
            Ok(None)
        })
        .build()
        .unwrap();

    let summary = crawler.run().await.unwrap();
    assert_eq!(summary.total_pages, 5);
    assert_eq!(fetched.lock().unwrap().len(), 3);
    assert_eq!(transport.attempts("http://test/seed-must-not-run"), 0);
}

#[tokio::test]
async fn callback_can_enqueue_followup_requests() {
    let transport = Arc::new(ScriptedTransport::default());
    let fetched = Arc::new(Mutex::new(Vec::new()));
    let fetched_cb = Arc::clone(&fetched);
    let mut crawler = Crawler::builder("followups")
        .seeds(vec!["http://test/index"])
        .transport(transport.clone())
        .on_success(move |event, handle| {
            if event.record.uri == "http://test/index" {
                handle.enqueue("http://test/child");
            }
            fetched_cb.lock().unwrap().push(event.record.uri.clone());
            Ok(None)
        })
        .build()
        .unwrap();

    let summary = crawler.run().await.unwrap();
    assert_eq!(summary.total_pages, 2);
    assert_eq!(
        *fetched.lock().unwrap(),
        vec!["http://test/index".to_string(), "http://test/child".to_string()]
    );
}

#[tokio::test]
async fn handle_snapshots_count_down_remaining() {
    let transport = Arc::new(ScriptedTransport::default());
    let snapshots = Arc::new(Mutex::new(Vec::new()));
    let snapshots_cb = Arc::clone(&snapshots);
    let mut crawler = Crawler::builder("snapshots")
        .concurrency(1)
        .seeds(vec!["http://test/1", "http://test/2", "http://test/3"])
        .transport(transport)
        .on_success(move |_event, handle| {
            snapshots_cb
                .lock()
                .unwrap()
                .push((handle.total(), handle.remaining()));
            Ok(None)
        })
        .build()
        .unwrap();

    crawler.run().await.unwrap();
    assert_eq!(*snapshots.lock().unwrap(), vec![(3, 3), (3, 2), (3, 1)]);
}

#[tokio::test]
async fn validation_failure_resolves_without_retry() {
    let transport = Arc::new(ScriptedTransport::default());
    let mut crawler = Crawler::builder("validation")
        .seeds(vec!["http://test/thin"])
        .transport(transport.clone())
        .on_success(|_event, _handle| {
            Ok(Some(Validation {
                status: 0,
                error_reasons: vec!["missing title".to_string(), "empty body".to_string()],
            }))
        })
        .build()
        .unwrap();

    let summary = crawler.run().await.unwrap();
    // The fetch itself succeeded, so nothing is retried or counted failed.
    assert_eq!(transport.attempts("http://test/thin"), 1);
    assert_eq!(summary.request_error_pages, 0);
    assert_eq!(summary.save_error_pages, 0);
}

#[tokio::test]
async fn callback_error_counts_as_save_error() {
    let transport = Arc::new(ScriptedTransport::default());
    let errors = Arc::new(Mutex::new(0u32));
    let errors_cb = Arc::clone(&errors);
    let mut crawler = Crawler::builder("save-error")
        .seeds(vec!["http://test/poison"])
        .transport(transport.clone())
        .on_success(|_event, _handle| anyhow::bail!("disk full"))
        .on_error(move |_record, _reason| {
            *errors_cb.lock().unwrap() += 1;
        })
        .build()
        .unwrap();

    let summary = crawler.run().await.unwrap();
    assert_eq!(transport.attempts("http://test/poison"), 1);
    assert_eq!(summary.save_error_pages, 1);
    assert_eq!(summary.request_error_pages, 0);
    assert_eq!(*errors.lock().unwrap(), 0);
}

#[tokio::test]
async fn retries_leave_remaining_untouched_until_resolution() {
    let transport =
        Arc::new(ScriptedTransport::default().script("http://test/flaky", Script::FailTimes(2)));
    let snapshots = Arc::new(Mutex::new(Vec::new()));
    let snapshots_cb = Arc::clone(&snapshots);
    let mut crawler = Crawler::builder("retry-counters")
        .max_retries(5)
        .seeds(vec!["http://test/flaky"])
        .transport(transport.clone())
        .on_success(move |_event, handle| {
            snapshots_cb
                .lock()
                .unwrap()
                .push((handle.total(), handle.remaining()));
            Ok(None)
        })
        .build()
        .unwrap();

    crawler.run().await.unwrap();
    // Two failed attempts preceded the success, but neither resolved the
    // record, so remaining is still at its seeded value.
    assert_eq!(transport.attempts("http://test/flaky"), 3);
    assert_eq!(*snapshots.lock().unwrap(), vec![(1, 1)]);
}

#[tokio::test]
async fn permanent_failure_decrements_remaining_exactly_once() {
    let transport =
        Arc::new(ScriptedTransport::default().script("http://test/doomed", Script::FailAlways));
    let snapshots = Arc::new(Mutex::new(Vec::new()));
    let errors = Arc::new(Mutex::new(0u32));
    let snapshots_cb = Arc::clone(&snapshots);
    let errors_cb = Arc::clone(&errors);
    let mut crawler = Crawler::builder("one-decrement")
        .concurrency(1)
        .max_retries(2)
        .seeds(vec!["http://test/doomed", "http://test/after"])
        .transport(transport.clone())
        .on_success(move |_event, handle| {
            snapshots_cb
                .lock()
                .unwrap()
                .push((handle.total(), handle.remaining()));
            Ok(None)
        })
        .on_error(move |_record, _reason| {
            *errors_cb.lock().unwrap() += 1;
        })
        .build()
        .unwrap();

    crawler.run().await.unwrap();
    // The doomed record burns its retry budget first (retry lane priority),
    // resolving once at the permanent failure; the second page then sees
    // remaining at exactly one.
    assert_eq!(transport.attempts("http://test/doomed"), 3);
    assert_eq!(*errors.lock().unwrap(), 1);
    assert_eq!(*snapshots.lock().unwrap(), vec![(2, 1)]);
}

/// Transport that mutates a counter in the shared store on every fetch,
/// simulating a namespace tampered with while the run is live.
struct CounterTamperer {
    store: Arc<MemoryStore>,
    key: String,
}

#[async_trait]
impl Transport for CounterTamperer {
    async fn execute(&self, _record: &RequestRecord) -> Result<TransportResponse, TransportError> {
        self.store
            .incr(&self.key)
            .await
            .map_err(|e| TransportError::Other(e.to_string()))?;
        Ok(ok_response())
    }
}

#[tokio::test]
async fn phantom_remaining_aborts_and_keeps_state() {
    let store = Arc::new(MemoryStore::new());
    let keys = JobKeys::new("tampered");
    let transport = Arc::new(CounterTamperer {
        store: Arc::clone(&store),
        key: keys.overplus(),
    });
    let mut crawler = Crawler::builder("tampered")
        .seeds(vec!["http://test/only"])
        .store(store.clone())
        .transport(transport)
        .build()
        .unwrap();

    let err = crawler.run().await.unwrap_err();
    assert!(err.to_string().contains("unresolved"), "got: {err}");
    // No namespace wipe on abort: the counters stay inspectable.
    assert_eq!(store.counter_get(&keys.overplus()).await.unwrap(), Some(1));
    assert_eq!(store.counter_get(&keys.total()).await.unwrap(), Some(1));
}

#[tokio::test]
async fn blacklist_applies_to_callback_enqueued_requests() {
    let transport = Arc::new(ScriptedTransport::default());
    let mut crawler = Crawler::builder("blacklist-followups")
        .seeds(vec!["http://test/root"])
        .transport(transport.clone())
        .blacklist(|record: &RequestRecord| record.uri.contains("banned"))
        .on_success(|event, handle| {
            if event.record.uri == "http://test/root" {
                handle.enqueue("http://test/banned");
            }
            Ok(None)
        })
        .build()
        .unwrap();

    let summary = crawler.run().await.unwrap();
    assert_eq!(summary.total_pages, 1);
    assert_eq!(transport.attempts("http://test/banned"), 0);
}

#[tokio::test]
async fn blacklisted_seeds_are_skipped() {
    let transport = Arc::new(ScriptedTransport::default());
    let mut crawler = Crawler::builder("blacklist")
        .seeds(vec!["http://test/ok1", "http://test/banned", "http://test/ok2"])
        .transport(transport.clone())
        .blacklist(|record: &RequestRecord| record.uri.contains("banned"))
        .build()
        .unwrap();

    let summary = crawler.run().await.unwrap();
    assert_eq!(summary.total_pages, 2);
    assert_eq!(transport.attempts("http://test/banned"), 0);
}
