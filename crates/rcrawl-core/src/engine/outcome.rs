//! Serialized outcome handling: callbacks, counters, retry bookkeeping.

use anyhow::Result;
use tracing::{error, info, warn};

use super::{Crawler, RunHandle, SuccessEvent};
use super::summary::RunStats;
use crate::request::RequestRecord;
use crate::transport::{TransportError, TransportResponse};

impl Crawler {
    /// A fetch came back 2xx. Callback first, then the atomic resolve; the
    /// record's requesting entry is consumed up front so a crash mid-callback
    /// re-fetches the page on resume rather than losing it.
    pub(super) async fn handle_success(
        &mut self,
        slot: u64,
        raw: String,
        record: RequestRecord,
        response: TransportResponse,
        stats: &mut RunStats,
    ) -> Result<()> {
        let raw = self.queue.take_requesting(slot).await?.unwrap_or(raw);
        stats.success_count += 1;

        let handle = RunHandle::new(self.queue.total().await?, self.queue.remaining().await?);
        let event = SuccessEvent {
            body: &response.body,
            record: &record,
            headers: &response.headers,
        };
        match (self.on_success)(&event, &handle) {
            Ok(Some(validation)) if validation.status <= 0 => {
                let mut reasons = validation.error_reasons;
                reasons.sort();
                error!(uri = %record.uri, ?reasons, "content validation failed");
            }
            Ok(_) => {}
            Err(err) => {
                stats.save_error_pages += 1;
                error!(uri = %record.uri, "success callback failed: {err:#}");
            }
        }

        for item in handle.take_added() {
            self.queue
                .add_request(item, &self.base_uri, self.blacklist_hook())
                .await?;
        }

        let remaining = self.queue.resolve_one().await?;
        self.queue.clear_retry(&raw).await?;

        if self.cfg.log_step > 0 && stats.success_count % self.cfg.log_step == 0 {
            let total = self.queue.total().await?;
            let done = total - remaining;
            let pct = if total > 0 { done * 100 / total } else { 100 };
            info!(done, total, "progress: {pct}%");
        }

        let interval = self.cfg.interval();
        if !interval.is_zero() {
            tokio::time::sleep(interval).await;
        }
        Ok(())
    }

    /// A fetch failed (transport error, non-2xx, or an undecodable stored
    /// record). Bounded retry: until the retry budget is spent the record
    /// goes back through the retry queue; the error callback fires exactly
    /// once, at the transition to permanent failure.
    pub(super) async fn handle_failure(
        &mut self,
        slot: u64,
        raw: String,
        record: Option<RequestRecord>,
        err: TransportError,
        stats: &mut RunStats,
    ) -> Result<()> {
        let raw = self.queue.take_requesting(slot).await?.unwrap_or(raw);
        stats.request_error_pages += 1;

        let Some(record) = record else {
            error!("dropping undecodable stored record: {err}");
            self.queue.resolve_one().await?;
            self.queue.clear_retry(&raw).await?;
            return Ok(());
        };

        let retries = self.queue.retry_count(&raw).await?;
        warn!(uri = %record.uri, retries, "request failed: {err}");

        if retries >= i64::from(self.cfg.max_retries) {
            (self.on_error)(&record, &err.to_string());
            error!(uri = %record.uri, attempts = retries + 1, "giving up");
            self.queue.resolve_one().await?;
            self.queue.clear_retry(&raw).await?;
        } else {
            let interval = self.cfg.interval();
            if !interval.is_zero() {
                tokio::time::sleep(interval).await;
            }
            self.queue.push_retry(&raw).await?;
            self.queue.bump_retry(&raw).await?;
        }
        Ok(())
    }
}
