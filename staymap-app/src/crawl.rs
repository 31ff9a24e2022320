use anyhow::{Context, Result};
use staymap_config::StaymapConfig;
use staymap_http::HttpClient;
use staymap_web::{HotelSpider, write_feed};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct Summary {
    pub records: usize,
    pub searches: usize,
    pub cancelled: bool,
}

/// Wire the fetch engine and spider from `cfg`, crawl until done or Ctrl-C,
/// then export whatever was collected.
pub async fn run(cfg: &StaymapConfig) -> Result<Summary> {
    let client = Arc::new(HttpClient::from_config(cfg).context("building HTTP client")?);
    let spider = HotelSpider::from_config(cfg, client)?;

    let cancel = CancellationToken::new();
    let watcher = tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    tracing::info!(
        targets = spider.targets().len(),
        cache = cfg.http_cache.enabled,
        throttle = cfg.autothrottle.enabled,
        "crawl.start"
    );
    let outcome = spider.crawl(&cancel).await;
    watcher.abort();

    write_feed(&cfg.feed.path, cfg.feed.format, &outcome.records)
        .with_context(|| format!("writing feed {}", cfg.feed.path.display()))?;

    Ok(Summary {
        records: outcome.records.len(),
        searches: outcome.stats.searches_ok,
        cancelled: outcome.cancelled,
    })
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::warn!("crawl.interrupted");
            cancel.cancel();
        }
        Err(e) => tracing::error!(error = %e, "crawl.signal_handler_failed"),
    }
}
