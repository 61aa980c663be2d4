//! `rcrawl run` – run a crawl job to completion.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use rcrawl_core::config::CrawlConfig;
use rcrawl_core::engine::Crawler;
use rcrawl_core::request::{RequestSpec, SeedItem};
use rcrawl_core::store::SqliteStore;

pub async fn run_crawl(
    store: Arc<SqliteStore>,
    cfg: &CrawlConfig,
    name: &str,
    seeds_path: &Path,
    base_uri: &str,
) -> Result<()> {
    let seeds = read_seeds(seeds_path)
        .with_context(|| format!("failed to read seeds from {}", seeds_path.display()))?;
    tracing::info!(job = name, seeds = seeds.len(), "starting crawl");

    let mut crawler = Crawler::builder(name)
        .base_uri(base_uri)
        .config(cfg.clone())
        .queue_len(seeds.len() as u64)
        .seeds(seeds)
        .store(store)
        .on_success(|event, _handle| {
            tracing::info!(uri = %event.record.uri, bytes = event.body.len(), "fetched");
            Ok(None)
        })
        .on_error(|record, reason| {
            tracing::warn!(uri = %record.uri, reason, "giving up on request");
        })
        .build()?;

    let summary = crawler.run().await?;
    println!("{summary}");
    Ok(())
}

/// One seed per line. Blank lines and `#` comments are skipped; a line
/// starting with `{` is a JSON request spec, anything else a bare URI.
fn read_seeds(path: &Path) -> Result<Vec<SeedItem>> {
    let text = std::fs::read_to_string(path)?;
    let mut seeds = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line.starts_with('{') {
            let spec: RequestSpec = serde_json::from_str(line)
                .with_context(|| format!("invalid request spec on line {}", lineno + 1))?;
            seeds.push(SeedItem::Full(spec));
        } else {
            seeds.push(SeedItem::Bare(line.to_string()));
        }
    }
    Ok(seeds)
}
