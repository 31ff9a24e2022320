//! Listing-entry extraction from a search results page.
//!
//! Field semantics follow XPath `text()`/`@attr` with `.get()`: a field is
//! the first *direct* text node of any element matching its selector inside
//! the entry, taken as-is (no trimming). Nested markup does not contribute.

use crate::record::ListingFields;
use scraper::{ElementRef, Html, Selector};
use staymap_common::{Result, StaymapError};
use staymap_config::SelectorConfig;

/// Compiled form of [`SelectorConfig`].
#[derive(Debug, Clone)]
pub struct ListingSelectors {
    entry: Selector,
    name: Selector,
    link: Selector,
    link_attr: String,
    score: Selector,
    description: Selector,
}

fn compile(kind: &str, raw: &str) -> Result<Selector> {
    Selector::parse(raw).map_err(|e| StaymapError::Selector(format!("{kind} `{raw}`: {e}")))
}

impl ListingSelectors {
    pub fn from_config(cfg: &SelectorConfig) -> Result<Self> {
        if cfg.link_attr.trim().is_empty() {
            return Err(StaymapError::Config(
                "selectors.link_attr must not be empty".into(),
            ));
        }
        Ok(Self {
            entry: compile("entry", &cfg.entry)?,
            name: compile("name", &cfg.name)?,
            link: compile("link", &cfg.link)?,
            link_attr: cfg.link_attr.clone(),
            score: compile("score", &cfg.score)?,
            description: compile("description", &cfg.description)?,
        })
    }
}

/// Enumerate listing entries in document order.
pub fn parse_listing(html: &str, selectors: &ListingSelectors) -> Vec<ListingFields> {
    let document = Html::parse_document(html);
    document
        .select(&selectors.entry)
        .map(|entry| ListingFields {
            name: first_text(entry, &selectors.name),
            href: first_attr(entry, &selectors.link, &selectors.link_attr),
            score: first_text(entry, &selectors.score),
            description: first_text(entry, &selectors.description),
        })
        .collect()
}

fn first_text(scope: ElementRef<'_>, selector: &Selector) -> Option<String> {
    scope.select(selector).find_map(|el| {
        el.children()
            .find_map(|node| node.value().as_text().map(|t| String::from(&**t)))
    })
}

fn first_attr(scope: ElementRef<'_>, selector: &Selector, attr: &str) -> Option<String> {
    scope
        .select(selector)
        .find_map(|el| el.value().attr(attr).map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selectors() -> ListingSelectors {
        ListingSelectors::from_config(&SelectorConfig::default()).unwrap()
    }

    const CARD: &str = r#"
<div data-testid="property-card">
  <a data-testid="title-link" href="/hotel/fr/la-mere-poulard.html?aid=1">
    <div data-testid="title">La Mère Poulard</div>
  </a>
  <div data-testid="review-score">
    <div class="a3b8729ab1 d86cee9b25">8,1</div>
    <div class="a3b8729ab1">Très bien</div>
  </div>
  <div class="abf093bdfe">Au pied de l'abbaye</div>
</div>"#;

    #[test]
    fn default_selectors_compile() {
        let _ = selectors();
    }

    #[test]
    fn extracts_all_fields_from_a_card() {
        let html = format!("<html><body>{CARD}</body></html>");
        let entries = parse_listing(&html, &selectors());
        assert_eq!(entries.len(), 1);
        let e = &entries[0];
        assert_eq!(e.name.as_deref(), Some("La Mère Poulard"));
        assert_eq!(e.href.as_deref(), Some("/hotel/fr/la-mere-poulard.html?aid=1"));
        assert_eq!(e.score.as_deref(), Some("8,1"));
        assert_eq!(e.description.as_deref(), Some("Au pied de l'abbaye"));
    }

    #[test]
    fn missing_fields_are_none() {
        let html = r#"<div data-testid="property-card">
            <div data-testid="title">Chez Nous</div>
        </div>"#;
        let entries = parse_listing(html, &selectors());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name.as_deref(), Some("Chez Nous"));
        assert_eq!(entries[0].href, None);
        assert_eq!(entries[0].score, None);
        assert_eq!(entries[0].description, None);
    }

    #[test]
    fn class_match_is_exact() {
        let html = r#"<div data-testid="property-card">
            <div class="abf093bdfe extra">not this one</div>
        </div>"#;
        let entries = parse_listing(html, &selectors());
        assert_eq!(entries[0].description, None);
    }

    #[test]
    fn only_direct_text_counts() {
        let html = r#"<div data-testid="property-card">
            <div data-testid="title"><span>nested</span>direct</div>
        </div>"#;
        let entries = parse_listing(html, &selectors());
        assert_eq!(entries[0].name.as_deref(), Some("direct"));
    }

    #[test]
    fn text_is_not_trimmed() {
        let html = "<div data-testid=\"property-card\"><div class=\"abf093bdfe\">  spaced </div></div>";
        let entries = parse_listing(html, &selectors());
        assert_eq!(entries[0].description.as_deref(), Some("  spaced "));
    }

    #[test]
    fn entries_keep_document_order() {
        let html = r#"<body>
            <div data-testid="property-card"><div data-testid="title">First</div></div>
            <div data-testid="property-card"><div data-testid="title">Second</div></div>
            <div data-testid="property-card"><div data-testid="title">Third</div></div>
        </body>"#;
        let names: Vec<_> = parse_listing(html, &selectors())
            .into_iter()
            .filter_map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["First", "Second", "Third"]);
    }

    #[test]
    fn broken_selectors_are_reported() {
        let cfg = SelectorConfig {
            entry: "div[".into(),
            ..SelectorConfig::default()
        };
        let err = ListingSelectors::from_config(&cfg).unwrap_err();
        assert!(matches!(err, StaymapError::Selector(_)));
        assert!(err.to_string().contains("entry"));
    }
}
