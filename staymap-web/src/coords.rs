//! Geocoordinate scraping from a hotel detail page.
//!
//! Detail pages embed their geodata in an inline script as a JSON-ish
//! fragment, e.g. `..."latitude":48.6359,"longitude":-1.5115,...`. The
//! numbers are returned verbatim; parsing them to floats would lose the
//! source's precision.
//!
//! Callers only see [`extract_coordinates`]; the matching strategy behind
//! it lives in [`match_pair`] and can be replaced without touching them.

use regex::Regex;
use scraper::{Html, Selector};
use serde::Serialize;
use std::sync::OnceLock;

/// A latitude/longitude pair, kept as the decimal text found in the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Coordinates {
    pub latitude: String,
    pub longitude: String,
}

impl Coordinates {
    pub fn new(latitude: impl Into<String>, longitude: impl Into<String>) -> Self {
        Self {
            latitude: latitude.into(),
            longitude: longitude.into(),
        }
    }
}

fn script_selector() -> Option<&'static Selector> {
    static SCRIPT: OnceLock<Option<Selector>> = OnceLock::new();
    SCRIPT.get_or_init(|| Selector::parse("script").ok()).as_ref()
}

fn lat_lon_pattern() -> Option<&'static Regex> {
    static LAT_LON: OnceLock<Option<Regex>> = OnceLock::new();
    LAT_LON
        .get_or_init(|| {
            // optional sign, then digits with an optional point, or a point and digits
            Regex::new(concat!(
                r#""latitude":(-?(?:[0-9]+\.?[0-9]*|\.[0-9]+)),"#,
                r#""longitude":(-?(?:[0-9]+\.?[0-9]*|\.[0-9]+))"#,
            ))
            .ok()
        })
        .as_ref()
}

/// Find the coordinate pair embedded in a detail page.
///
/// Every inline `<script>` is inspected in document order. The first one
/// whose text mentions both `latitude` and `longitude` is the geodata
/// block; the answer is whatever [`match_pair`] finds in it. Blocks
/// mentioning only one of the two keys are skipped.
///
/// ```
/// use staymap_web::coords::extract_coordinates;
///
/// let page = r#"<html><head><script>
///   window.hotel = {"latitude":48.6359,"longitude":-1.5115};
/// </script></head></html>"#;
///
/// let found = extract_coordinates(page).expect("coordinates");
/// assert_eq!(found.latitude, "48.6359");
/// assert_eq!(found.longitude, "-1.5115");
///
/// assert!(extract_coordinates("<html><body>no scripts</body></html>").is_none());
/// ```
pub fn extract_coordinates(page_text: &str) -> Option<Coordinates> {
    let selector = script_selector()?;
    let document = Html::parse_document(page_text);

    let geodata = document
        .select(selector)
        .map(|script| script.text().collect::<String>())
        .find(|text| text.contains("latitude") && text.contains("longitude"))?;

    match_pair(&geodata)
}

/// Pull `"latitude":<n>,"longitude":<n>` out of one script body.
fn match_pair(script: &str) -> Option<Coordinates> {
    let caps = lat_lon_pattern()?.captures(script)?;
    Some(Coordinates::new(caps.get(1)?.as_str(), caps.get(2)?.as_str()))
}
