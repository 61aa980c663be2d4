//! `rcrawl reset` – delete all persisted state for a job.

use std::sync::Arc;

use anyhow::Result;
use rcrawl_core::queue::{JobKeys, QueueManager};
use rcrawl_core::store::SqliteStore;

pub async fn run_reset(store: Arc<SqliteStore>, name: &str) -> Result<()> {
    let queue = QueueManager::new(store, JobKeys::new(name));
    queue.clear().await?;
    println!("Cleared persisted state for job `{name}`.");
    Ok(())
}
