//! `rcrawl status` – show persisted counters and queue lengths for a job.

use std::sync::Arc;

use anyhow::Result;
use rcrawl_core::queue::JobKeys;
use rcrawl_core::store::{SqliteStore, StateStore};

pub async fn run_status(store: Arc<SqliteStore>, name: &str) -> Result<()> {
    let keys = JobKeys::new(name);
    let total = store.counter_get(&keys.total()).await?;
    let Some(total) = total else {
        println!("No persisted state for job `{name}`.");
        return Ok(());
    };

    let remaining = store.counter_get(&keys.overplus()).await?.unwrap_or(0);
    let pending = store.list_len(&keys.pending()).await?;
    let retry = store.list_len(&keys.retry()).await?;
    let in_flight = store.hash_all(&keys.requesting()).await?.len();

    println!("job:       {name}");
    println!("total:     {total}");
    println!("remaining: {remaining}");
    println!("pending:   {pending}");
    println!("retrying:  {retry}");
    println!("in-flight: {in_flight}");
    Ok(())
}
