//! The hotel crawl: search page → listing entries → detail pages → records.
//!
//! Targets are visited in configured order and entries in document order,
//! one detail fetch at a time, so the returned records follow encounter
//! order. Nothing here is fatal to the run: a failed search page is logged
//! and skipped, a failed detail page yields a record without coordinates.

use crate::coords::{Coordinates, extract_coordinates};
use crate::fetch::PageFetcher;
use crate::listing::{ListingSelectors, parse_listing};
use crate::record::{HotelRecord, ListingFields, build_record, city_from_query, city_from_search_url};
use staymap_common::{Result, StaymapError};
use staymap_config::{QUERY_PLACEHOLDER, StaymapConfig};
use staymap_http::HttpError;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

/// One search results page to crawl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTarget {
    /// Raw query string as configured, e.g. `St+Malo`.
    pub query: String,
    pub url: Url,
}

impl SearchTarget {
    /// Substitute `query` verbatim into `template`.
    ///
    /// ```
    /// use staymap_web::spider::SearchTarget;
    ///
    /// let t = SearchTarget::from_query(
    ///     "https://www.booking.com/searchresults.html?ss={query}",
    ///     "St+Malo",
    /// ).unwrap();
    /// assert_eq!(t.url.as_str(), "https://www.booking.com/searchresults.html?ss=St+Malo");
    /// assert_eq!(t.city("ss"), "St Malo");
    /// ```
    pub fn from_query(template: &str, query: &str) -> Result<Self> {
        let raw = template.replace(QUERY_PLACEHOLDER, query);
        let url = Url::parse(&raw)
            .map_err(|e| StaymapError::Config(format!("search URL `{raw}`: {e}")))?;
        Ok(Self {
            query: query.to_string(),
            url,
        })
    }

    /// City for every record of this target, read from `query_param` in the
    /// URL, or from the raw query when the URL lacks it.
    pub fn city(&self, query_param: &str) -> String {
        city_from_search_url(&self.url, query_param)
            .unwrap_or_else(|| city_from_query(&self.query))
    }
}

/// Counters reported at the end of a crawl.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlStats {
    pub searches_ok: usize,
    pub searches_failed: usize,
    pub searches_skipped: usize,
    /// Search pages whose entries were cut short by cancellation.
    pub searches_interrupted: usize,
    pub entries: usize,
    pub details_failed: usize,
    pub coordinates_found: usize,
}

#[derive(Debug, Clone, Default)]
pub struct CrawlOutcome {
    pub records: Vec<HotelRecord>,
    pub stats: CrawlStats,
    /// The crawl stopped early; `records` holds what was collected so far.
    pub cancelled: bool,
}

pub struct HotelSpider {
    fetcher: Arc<dyn PageFetcher>,
    selectors: ListingSelectors,
    targets: Vec<SearchTarget>,
    query_param: String,
    allowed_domains: Vec<String>,
}

impl HotelSpider {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        selectors: ListingSelectors,
        targets: Vec<SearchTarget>,
    ) -> Self {
        Self {
            fetcher,
            selectors,
            targets,
            query_param: "ss".to_string(),
            allowed_domains: Vec::new(),
        }
    }

    pub fn from_config(cfg: &StaymapConfig, fetcher: Arc<dyn PageFetcher>) -> Result<Self> {
        let selectors = ListingSelectors::from_config(&cfg.selectors)?;
        let targets = cfg
            .search
            .queries
            .iter()
            .map(|q| SearchTarget::from_query(&cfg.search.url_template, q))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(fetcher, selectors, targets)
            .with_query_param(&cfg.search.query_param)
            .with_allowed_domains(cfg.allowed_domains.clone()))
    }

    pub fn with_query_param(mut self, param: &str) -> Self {
        self.query_param = param.to_string();
        self
    }

    /// Empty means every domain is allowed.
    pub fn with_allowed_domains(mut self, domains: Vec<String>) -> Self {
        self.allowed_domains = domains;
        self
    }

    pub fn targets(&self) -> &[SearchTarget] {
        &self.targets
    }

    fn is_allowed(&self, url: &Url) -> bool {
        if self.allowed_domains.is_empty() {
            return true;
        }
        let Some(host) = url.host_str() else {
            return false;
        };
        self.allowed_domains.iter().any(|d| {
            let d = d.trim_start_matches('.');
            host.eq_ignore_ascii_case(d)
                || host
                    .to_ascii_lowercase()
                    .ends_with(&format!(".{}", d.to_ascii_lowercase()))
        })
    }

    /// Run every target and collect the records.
    pub async fn crawl(&self, cancel: &CancellationToken) -> CrawlOutcome {
        let started = Instant::now();
        let mut outcome = CrawlOutcome::default();

        for target in &self.targets {
            if cancel.is_cancelled() {
                outcome.cancelled = true;
                break;
            }
            if !self.is_allowed(&target.url) {
                tracing::warn!(
                    target: "spider",
                    url = %target.url,
                    "spider.search.offsite"
                );
                outcome.stats.searches_skipped += 1;
                continue;
            }

            match self
                .crawl_target(target, cancel, &mut outcome.stats, &mut outcome.records)
                .await
            {
                Ok(true) => outcome.stats.searches_ok += 1,
                Ok(false) => outcome.stats.searches_interrupted += 1,
                Err(err) => {
                    tracing::warn!(
                        target: "spider",
                        query = %target.query,
                        url = %target.url,
                        status = ?err.status(),
                        error = %err,
                        "spider.search.failed"
                    );
                    outcome.stats.searches_failed += 1;
                }
            }
        }
        if cancel.is_cancelled() {
            outcome.cancelled = true;
        }

        tracing::info!(
            target: "spider",
            records = outcome.records.len(),
            searches_ok = outcome.stats.searches_ok,
            searches_failed = outcome.stats.searches_failed,
            searches_skipped = outcome.stats.searches_skipped,
            searches_interrupted = outcome.stats.searches_interrupted,
            details_failed = outcome.stats.details_failed,
            coordinates_found = outcome.stats.coordinates_found,
            cancelled = outcome.cancelled,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "spider.crawl.finished"
        );
        outcome
    }

    /// Crawl one search page, appending a record per entry to `records`.
    ///
    /// Returns `false` when cancellation stopped it before the last entry.
    /// Only the search page fetch itself can fail.
    pub async fn crawl_target(
        &self,
        target: &SearchTarget,
        cancel: &CancellationToken,
        stats: &mut CrawlStats,
        records: &mut Vec<HotelRecord>,
    ) -> std::result::Result<bool, HttpError> {
        let page = self.fetcher.fetch(&target.url).await?;
        let city = target.city(&self.query_param);
        let entries = parse_listing(&page.body, &self.selectors);

        tracing::info!(
            target: "spider",
            city = %city,
            entries = entries.len(),
            url = %page.url,
            "spider.search.parsed"
        );

        for entry in entries {
            if cancel.is_cancelled() {
                return Ok(false);
            }
            let detail_url = resolve_link(&page.url, entry.href.as_deref());
            let coordinates = self.coordinates_for(&detail_url, stats).await;
            records.push(self.record_for(&city, entry, detail_url, coordinates));
            stats.entries += 1;
        }
        Ok(true)
    }

    fn record_for(
        &self,
        city: &str,
        entry: ListingFields,
        detail_url: Url,
        coordinates: Option<Coordinates>,
    ) -> HotelRecord {
        let record = build_record(city, entry, detail_url, coordinates);
        tracing::debug!(
            target: "spider",
            city = record.city(),
            name = ?record.name(),
            url = record.detail_url(),
            has_coordinates = record.coordinates().is_some(),
            "spider.record"
        );
        record
    }

    /// Fetch a detail page and scrape its coordinates; any failure is `None`.
    async fn coordinates_for(&self, url: &Url, stats: &mut CrawlStats) -> Option<Coordinates> {
        let page = match self.fetcher.fetch(url).await {
            Ok(page) => page,
            Err(err) => {
                tracing::warn!(
                    target: "spider",
                    url = %url,
                    status = ?err.status(),
                    error = %err,
                    "spider.detail.failed"
                );
                stats.details_failed += 1;
                return None;
            }
        };
        let found = extract_coordinates(&page.body);
        match &found {
            Some(_) => stats.coordinates_found += 1,
            None => tracing::debug!(target: "spider", url = %url, "spider.coordinates.missing"),
        }
        found
    }
}

/// Resolve a listing link against the page it was found on.
///
/// An absent or empty link resolves to the page itself, as joining an empty
/// reference does; an unparsable one does too, with a warning.
pub fn resolve_link(base: &Url, href: Option<&str>) -> Url {
    let Some(href) = href.filter(|h| !h.trim().is_empty()) else {
        return base.clone();
    };
    base.join(href.trim()).unwrap_or_else(|e| {
        tracing::warn!(target: "spider", base = %base, href, error = %e, "spider.link.unresolvable");
        base.clone()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://www.booking.com/searchresults.html?ss=Dijon").unwrap()
    }

    #[test]
    fn relative_links_become_absolute() {
        let u = resolve_link(&base(), Some("/hotel/fr/le-chambellan.html?aid=304142"));
        assert_eq!(
            u.as_str(),
            "https://www.booking.com/hotel/fr/le-chambellan.html?aid=304142"
        );
    }

    #[test]
    fn absolute_links_are_kept() {
        let u = resolve_link(&base(), Some("https://secure.booking.com/hotel/fr/x.html"));
        assert_eq!(u.as_str(), "https://secure.booking.com/hotel/fr/x.html");
    }

    #[test]
    fn missing_link_resolves_to_the_page() {
        assert_eq!(resolve_link(&base(), None), base());
        assert_eq!(resolve_link(&base(), Some("  ")), base());
    }

    #[test]
    fn target_city_falls_back_to_raw_query() {
        let t = SearchTarget::from_query("https://example.com/find?q={query}", "Aix+en+Provence")
            .unwrap();
        assert_eq!(t.city("ss"), "Aix en Provence");
        assert_eq!(t.city("q"), "Aix en Provence");
    }

    #[test]
    fn invalid_templates_are_config_errors() {
        let err = SearchTarget::from_query("not a url {query}", "Paris").unwrap_err();
        assert!(matches!(err, StaymapError::Config(_)));
    }
}
