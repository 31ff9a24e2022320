//! Hotel search crawling on top of `staymap-http`.
//!
//! [`spider::HotelSpider`] walks the configured search pages, extracts one
//! [`record::HotelRecord`] per listing entry, enriches it with coordinates
//! scraped from the entry's detail page, and [`feed::write_feed`] exports
//! the collected records.

pub mod coords;
pub mod feed;
pub mod fetch;
pub mod listing;
pub mod record;
pub mod spider;

pub use coords::{Coordinates, extract_coordinates};
pub use feed::write_feed;
pub use fetch::{FetchedDocument, PageFetcher};
pub use listing::{ListingSelectors, parse_listing};
pub use record::{HotelRecord, ListingFields, build_record};
pub use spider::{CrawlOutcome, CrawlStats, HotelSpider, SearchTarget};
