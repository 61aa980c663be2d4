//! End-of-run accounting.

use std::fmt;
use std::time::Duration;

#[derive(Debug, Default)]
pub(super) struct RunStats {
    pub success_count: u64,
    pub request_error_pages: u64,
    pub save_error_pages: u64,
}

/// What a finished run looked like. `request_error_pages` counts failed
/// attempts, not records, so one record retried three times contributes
/// three.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub elapsed: Duration,
    pub concurrency: usize,
    pub total_pages: i64,
    pub request_error_pages: u64,
    pub save_error_pages: u64,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "crawl done")?;
        writeln!(f, "  elapsed:          {:.3}s", self.elapsed.as_secs_f64())?;
        writeln!(f, "  concurrency:      {}", self.concurrency)?;
        writeln!(f, "  pages this run:   {}", self.total_pages)?;
        writeln!(f, "  request failures: {}", self.request_error_pages)?;
        write!(f, "  save failures:    {}", self.save_error_pages)
    }
}
