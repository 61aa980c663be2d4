//! One dispatch tick: drain the queues through a bounded fetch window.

use std::sync::Arc;

use anyhow::Result;
use futures::stream::{self, StreamExt};

use super::summary::RunStats;
use super::Crawler;
use crate::queue::QueueManager;
use crate::request::RequestRecord;
use crate::store::StoreError;
use crate::transport::{TransportError, TransportResponse};

pub(super) struct SlotOutcome {
    pub slot: u64,
    pub raw: String,
    pub result: SlotResult,
}

pub(super) enum SlotResult {
    Fetched(RequestRecord, TransportResponse),
    Failed(Option<RequestRecord>, TransportError),
}

impl Crawler {
    /// Pop until the queues are empty, fetching at most `concurrency` pages
    /// at a time; every record is written to the requesting map before its
    /// fetch starts. Outcomes are consumed one at a time on this task, so
    /// callbacks and counter updates never interleave. Returns how many
    /// outcomes were processed.
    pub(super) async fn run_tick(&mut self, stats: &mut RunStats) -> Result<usize> {
        let concurrency = self.cfg.concurrency.max(1);
        let queue = self.queue.clone();
        let transport = Arc::clone(&self.transport);

        let slots = stream::unfold(
            (queue, 0u64, false),
            |(queue, slot, done)| async move {
                if done {
                    return None;
                }
                match pop_and_mark(&queue, slot).await {
                    Ok(Some(raw)) => Some((Ok((slot, raw)), (queue, slot + 1, false))),
                    Ok(None) => None,
                    Err(err) => Some((Err(err), (queue, slot, true))),
                }
            },
        );

        let outcomes = slots
            .map(move |popped| {
                let transport = Arc::clone(&transport);
                async move {
                    let (slot, raw) = popped?;
                    let result = match serde_json::from_str::<RequestRecord>(&raw) {
                        Ok(record) => match transport.execute(&record).await {
                            Ok(response) => SlotResult::Fetched(record, response),
                            Err(err) => SlotResult::Failed(Some(record), err),
                        },
                        Err(err) => SlotResult::Failed(
                            None,
                            TransportError::Other(format!("corrupt stored record: {err}")),
                        ),
                    };
                    Ok::<_, StoreError>(SlotOutcome { slot, raw, result })
                }
            })
            .buffer_unordered(concurrency);
        futures::pin_mut!(outcomes);

        let mut processed = 0usize;
        while let Some(item) = outcomes.next().await {
            let SlotOutcome { slot, raw, result } = item?;
            processed += 1;
            match result {
                SlotResult::Fetched(record, response) => {
                    self.handle_success(slot, raw, record, response, stats).await?
                }
                SlotResult::Failed(record, err) => {
                    self.handle_failure(slot, raw, record, err, stats).await?
                }
            }
        }
        Ok(processed)
    }
}

async fn pop_and_mark(queue: &QueueManager, slot: u64) -> Result<Option<String>, StoreError> {
    let Some(raw) = queue.pop_next().await? else {
        return Ok(None);
    };
    // Requesting-map write is the durability point: from here the record
    // survives a crash and is recovered on resume.
    queue.mark_requesting(slot, &raw).await?;
    Ok(Some(raw))
}
