//! Browser-driver boundary. The live headless driver is an external
//! collaborator; this module defines the interface the orchestrator talks
//! to, the search-URL template, the cookie-jar passthrough, and a
//! snapshot-backed implementation that replays saved marketplace pages for
//! offline runs and tests.

use crate::models::RawItem;
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

pub const SEARCH_MIN_PRICE: i64 = 1_000;
pub const SEARCH_MAX_PRICE: i64 = 60_000;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },
    #[error("item extraction failed: {0}")]
    Extraction(String),
}

// ── Driver interface ──────────────────────────────────────────────────────────

/// One browser context, owned exclusively by the orchestrator. Calls are
/// strictly sequential; every method is a suspension point.
#[async_trait]
pub trait BrowserDriver: Send {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError>;
    /// All `<a href*="/marketplace/item">` anchors currently in the viewport.
    async fn extract_items(&mut self) -> Result<Vec<RawItem>, BrowserError>;
    /// Mouse-wheel scroll downward by roughly `pixels`.
    async fn scroll_by(&mut self, pixels: u32) -> Result<(), BrowserError>;
}

// ── Search URL template ───────────────────────────────────────────────────────

/// `https://www.facebook.com/marketplace/<region>/search/?query=…&minPrice=…`
pub fn search_url(region: &str, model: &str, sort: crate::models::SortMode) -> String {
    let mut url = Url::parse(&format!("https://www.facebook.com/marketplace/{}/search/", region))
        .expect("static search URL base is valid");
    url.query_pairs_mut()
        .append_pair("query", model)
        .append_pair("minPrice", &SEARCH_MIN_PRICE.to_string())
        .append_pair("maxPrice", &SEARCH_MAX_PRICE.to_string())
        .append_pair("sortBy", sort.as_query_value());
    url.to_string()
}

// ── Cookie jar passthrough ────────────────────────────────────────────────────

/// Load `fb_cookies.json` verbatim; the contents are opaque to the core and
/// handed to the driver as-is. A missing file is not an error.
pub fn load_cookie_jar(path: &Path) -> anyhow::Result<Option<serde_json::Value>> {
    if !path.exists() {
        debug!("No cookie jar at {:?}", path);
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path)?;
    let value: serde_json::Value = serde_json::from_str(&raw)?;
    Ok(Some(value))
}

// ── HTML extraction ───────────────────────────────────────────────────────────

static ITEM_ANCHOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"a[href*="/marketplace/item"]"#).unwrap());

/// Pull every marketplace item anchor out of a results-page document.
/// The anchor's block texts are joined with newlines so downstream line
/// heuristics (mileage = 4th non-empty line) keep working.
pub fn extract_marketplace_items(html: &str) -> Vec<RawItem> {
    let doc = Html::parse_document(html);
    let mut items = Vec::new();

    for anchor in doc.select(&ITEM_ANCHOR) {
        let href = match anchor.value().attr("href") {
            Some(h) if !h.is_empty() => h.to_string(),
            _ => continue,
        };
        let text = anchor
            .text()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        items.push(RawItem { text, href });
    }

    items
}

// ── Snapshot driver ───────────────────────────────────────────────────────────

/// Replays saved result pages from a directory. Page files are keyed by the
/// search query and sort mode: `<query with spaces as _>_<sort>.html`.
/// Scrolling is a no-op; the whole page is visible at once.
pub struct SnapshotBrowser {
    dir: PathBuf,
    current: Option<String>,
    #[allow(dead_code)]
    cookie_jar: Option<serde_json::Value>,
}

impl SnapshotBrowser {
    pub fn new(dir: PathBuf, cookie_jar: Option<serde_json::Value>) -> Self {
        Self { dir, current: None, cookie_jar }
    }

    fn page_path(&self, url: &str) -> Result<PathBuf, BrowserError> {
        let parsed = Url::parse(url).map_err(|e| BrowserError::Navigation {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let mut query = None;
        let mut sort = None;
        for (k, v) in parsed.query_pairs() {
            match k.as_ref() {
                "query" => query = Some(v.replace(' ', "_")),
                "sortBy" => sort = Some(v.to_string()),
                _ => {}
            }
        }

        let (Some(query), Some(sort)) = (query, sort) else {
            return Err(BrowserError::Navigation {
                url: url.to_string(),
                reason: "missing query/sortBy parameters".to_string(),
            });
        };

        Ok(self.dir.join(format!("{}_{}.html", query, sort)))
    }
}

#[async_trait]
impl BrowserDriver for SnapshotBrowser {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        let path = self.page_path(url)?;
        match std::fs::read_to_string(&path) {
            Ok(html) => {
                debug!("Snapshot page {:?} loaded", path);
                self.current = Some(html);
                Ok(())
            }
            Err(e) => {
                warn!("No snapshot at {:?}: {}", path, e);
                self.current = None;
                Err(BrowserError::Navigation { url: url.to_string(), reason: e.to_string() })
            }
        }
    }

    async fn extract_items(&mut self) -> Result<Vec<RawItem>, BrowserError> {
        let html = self
            .current
            .as_deref()
            .ok_or_else(|| BrowserError::Extraction("no page loaded".to_string()))?;
        Ok(extract_marketplace_items(html))
    }

    async fn scroll_by(&mut self, _pixels: u32) -> Result<(), BrowserError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SortMode;

    #[test]
    fn search_url_template() {
        let url = search_url("guatemala", "kia picanto", SortMode::PriceAsc);
        assert_eq!(
            url,
            "https://www.facebook.com/marketplace/guatemala/search/?query=kia+picanto&minPrice=1000&maxPrice=60000&sortBy=price_asc"
        );
    }

    #[test]
    fn extracts_item_anchors_with_text_lines() {
        let html = r#"
            <html><body>
              <a href="/marketplace/item/12345?ref=feed">
                <span>Q45,000</span><span>Toyota Yaris 2015</span><span>Guatemala</span>
              </a>
              <a href="/marketplace/profile/999">not an item</a>
              <a href="https://www.facebook.com/marketplace/item/67890">
                <span>Q30,000</span><span>Honda Civic 2010</span>
              </a>
            </body></html>
        "#;
        let items = extract_marketplace_items(html);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].href, "/marketplace/item/12345?ref=feed");
        assert_eq!(items[0].text, "Q45,000\nToyota Yaris 2015\nGuatemala");
        assert_eq!(items[1].href, "https://www.facebook.com/marketplace/item/67890");
    }

    #[tokio::test]
    async fn snapshot_browser_misses_are_navigation_errors() {
        let mut b = SnapshotBrowser::new(std::env::temp_dir().join("no-such-snapshots"), None);
        let url = search_url("guatemala", "yaris", SortMode::Newest);
        assert!(b.navigate(&url).await.is_err());
        assert!(b.extract_items().await.is_err());
    }
}
