use crate::coords::Coordinates;
use serde::Serialize;
use url::Url;

/// Fields read off one listing entry, exactly as the selectors produced them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingFields {
    pub name: Option<String>,
    /// Link to the detail page, possibly relative.
    pub href: Option<String>,
    pub score: Option<String>,
    pub description: Option<String>,
}

/// One output row.
///
/// Built once by [`build_record`] and immutable afterwards. The detail URL
/// is always absolute and the coordinates are present or absent as a pair.
/// Serializes with the feed's field names, in feed order, with `null` for
/// absent values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HotelRecord {
    #[serde(rename = "City")]
    city: String,
    #[serde(rename = "Hotel Name")]
    name: Option<String>,
    #[serde(rename = "Hotel URL")]
    detail_url: String,
    #[serde(rename = "Score")]
    score: Option<String>,
    #[serde(rename = "Description")]
    description: Option<String>,
    #[serde(rename = "Latitude")]
    latitude: Option<String>,
    #[serde(rename = "Longitude")]
    longitude: Option<String>,
}

impl HotelRecord {
    pub fn city(&self) -> &str {
        &self.city
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn detail_url(&self) -> &str {
        &self.detail_url
    }

    pub fn score(&self) -> Option<&str> {
        self.score.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn latitude(&self) -> Option<&str> {
        self.latitude.as_deref()
    }

    pub fn longitude(&self) -> Option<&str> {
        self.longitude.as_deref()
    }

    pub fn coordinates(&self) -> Option<Coordinates> {
        match (&self.latitude, &self.longitude) {
            (Some(lat), Some(lon)) => Some(Coordinates::new(lat.as_str(), lon.as_str())),
            _ => None,
        }
    }
}

/// Assemble a record. Listing fields pass through untouched.
pub fn build_record(
    city: &str,
    listing: ListingFields,
    detail_url: Url,
    coordinates: Option<Coordinates>,
) -> HotelRecord {
    let (latitude, longitude) = match coordinates {
        Some(c) => (Some(c.latitude), Some(c.longitude)),
        None => (None, None),
    };
    HotelRecord {
        city: city.to_string(),
        name: listing.name,
        detail_url: detail_url.into(),
        score: listing.score,
        description: listing.description,
        latitude,
        longitude,
    }
}

/// City name for a search query: `+` (and `%20`) become spaces, nothing
/// else is decoded.
///
/// ```
/// use staymap_web::record::city_from_query;
///
/// assert_eq!(city_from_query("St+Malo"), "St Malo");
/// assert_eq!(city_from_query("Besan%C3%A7on"), "Besan%C3%A7on");
/// ```
pub fn city_from_query(query: &str) -> String {
    query.replace('+', " ").replace("%20", " ")
}

/// City name taken from the raw value of `param` in a search URL.
///
/// Uses the last `param=` occurrence and stops at the next `&` or `#`.
/// Returns `None` when the URL has no such parameter.
pub fn city_from_search_url(url: &Url, param: &str) -> Option<String> {
    let marker = format!("{param}=");
    let query = url.query()?;
    let value = query
        .split('&')
        .filter_map(|pair| pair.strip_prefix(marker.as_str()))
        .last()?;
    Some(city_from_query(value))
}
