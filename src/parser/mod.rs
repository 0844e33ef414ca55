//! Text normalizer & parser: turns a noisy free-text listing blob into a
//! tagged [`ParseOutcome`]. Every step is a pure function over the raw text
//! so drops are traceable and testable in isolation.

pub mod corrections;

use crate::catalog::Catalog;
use crate::models::{DropReason, ParseOutcome, ParsedListing, PendingListing};
use regex::Regex;
use std::sync::LazyLock;

use self::corrections::CorrectionsAid;

/// Listings below this price are junk (accessories, scams, down payments).
pub const MIN_PRICE_VALID: i64 = 3_000;
pub const YEAR_MIN: i32 = 1990;
pub const YEAR_MAX: i32 = 2030;

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https://www\.facebook\.com/marketplace/item/\d+").unwrap());

static RELATIVE_ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/marketplace/item/\d+").unwrap());

static PRICE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[Q$]\s?[\d.,]+").unwrap());

static PRICE_DIGITS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d{3,7}").unwrap());

const YEAR_PAT: &str = r"19\d\d|20[0-2]\d|2030";

static YEAR_STANDALONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"(?:^|\s)({YEAR_PAT})(?:\s|$)")).unwrap());

static YEAR_FLANKED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"[-•]\s?({YEAR_PAT})|({YEAR_PAT})\s?[-•]")).unwrap());

static YEAR_TRAILED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"({YEAR_PAT})[,.]")).unwrap());

static YEAR_LINE_START_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"^({YEAR_PAT})\b")).unwrap());

// ── URL canonicalization ──────────────────────────────────────────────────────

/// Strip whitespace, non-printable and non-ASCII characters (this covers the
/// invisible separators U+2028/U+2029/U+00A0 seen in marketplace blobs), then
/// take the canonical item-URL prefix. Query strings and fragments are cut.
pub fn canonicalize_url(raw: &str) -> Option<String> {
    let cleaned: String = raw.chars().filter(|c| c.is_ascii_graphic()).collect();

    if let Some(m) = URL_RE.find(&cleaned) {
        return Some(m.as_str().to_string());
    }
    // Result-page anchors carry relative hrefs.
    if let Some(m) = RELATIVE_ITEM_RE.find(&cleaned) {
        return Some(format!("https://www.facebook.com{}", m.as_str()));
    }
    None
}

// ── Field extractors ──────────────────────────────────────────────────────────

/// First `Q`/`$`-prefixed amount; currency and thousands marks stripped,
/// first 3–7 digit integer taken.
pub fn extract_price(text: &str) -> Option<i64> {
    let m = PRICE_RE.find(text)?;
    let digits: String = m.as_str().chars().filter(|c| c.is_ascii_digit()).collect();
    let first = PRICE_DIGITS_RE.find(&digits)?;
    first.as_str().parse().ok()
}

/// Year extraction strategies (a)–(d), tried in order. Only [1990, 2030]
/// is accepted.
pub fn extract_year(text: &str) -> Option<i32> {
    let in_range = |y: &i32| (YEAR_MIN..=YEAR_MAX).contains(y);

    let standalone = YEAR_STANDALONE_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .filter(in_range);

    let flanked = || {
        YEAR_FLANKED_RE
            .captures(text)
            .and_then(|c| c.get(1).or_else(|| c.get(2)))
            .and_then(|m| m.as_str().parse().ok())
            .filter(in_range)
    };

    let trailed = || {
        YEAR_TRAILED_RE
            .captures(text)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok())
            .filter(in_range)
    };

    let line_start = || {
        let first_line = text.lines().find(|l| !l.trim().is_empty())?;
        YEAR_LINE_START_RE
            .captures(first_line.trim_start())
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok())
            .filter(in_range)
    };

    standalone.or_else(flanked).or_else(trailed).or_else(line_start)
}

/// 4th non-empty line of the blob, verbatim, or empty.
pub fn extract_mileage(text: &str) -> String {
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .nth(3)
        .unwrap_or("")
        .to_string()
}

// ── Parser ────────────────────────────────────────────────────────────────────

pub struct ListingParser<'a> {
    catalog: &'a Catalog,
    corrections: Option<&'a CorrectionsAid>,
    current_year: i32,
}

impl<'a> ListingParser<'a> {
    pub fn new(catalog: &'a Catalog, current_year: i32) -> Self {
        Self { catalog, corrections: None, current_year }
    }

    pub fn with_corrections(mut self, aid: &'a CorrectionsAid) -> Self {
        self.corrections = Some(aid);
        self
    }

    /// The full §-by-§ pipeline. `href` is the anchor's own href when the
    /// blob came from a result page; the URL is taken from it when the text
    /// carries none.
    pub fn parse(&self, raw_text: &str, href: Option<&str>) -> ParseOutcome {
        // 1. Negative / foreign filters fire before any other parsing.
        if self.catalog.contains_negative(raw_text) {
            let lower = raw_text.to_lowercase();
            let reason = if self.catalog.foreign_hit(&lower) {
                DropReason::ForeignLocation
            } else {
                DropReason::NegativePhrase
            };
            return ParseOutcome::Dropped(reason);
        }

        // 2. Canonical URL, from the text blob first, the href second.
        let url = match canonicalize_url(raw_text).or_else(|| href.and_then(canonicalize_url)) {
            Some(u) => u,
            None => {
                return ParseOutcome::Dropped(if href.is_some() {
                    DropReason::MalformedUrl
                } else {
                    DropReason::MissingUrl
                });
            }
        };

        // 3. Price is optional at this stage; a missing price may still
        //    surface as Pending below.
        let price = extract_price(raw_text);
        if let Some(p) = price {
            if p <= 0 || p < MIN_PRICE_VALID {
                return ParseOutcome::Dropped(DropReason::PriceTooLow);
            }
        }

        // 4. Year, with the corrections aid as a fallback when the regex
        //    strategies fail. The aid's answer is still gated to the
        //    parser's own range.
        let year = extract_year(raw_text).or_else(|| {
            self.corrections
                .and_then(|aid| aid.detect_year(raw_text, self.current_year))
                .filter(|y| (YEAR_MIN..=YEAR_MAX).contains(y))
        });
        let year = match year {
            Some(y) => y,
            None => return ParseOutcome::Dropped(DropReason::NoYear),
        };

        // 5. Model.
        let model = match self.catalog.match_model(raw_text) {
            Some(m) => m.name.to_string(),
            None => return ParseOutcome::Dropped(DropReason::NoModel),
        };

        match price {
            Some(price) => ParseOutcome::Accepted(ParsedListing {
                url,
                model,
                year,
                price,
                mileage_text: extract_mileage(raw_text),
            }),
            None => ParseOutcome::Pending(PendingListing { url, model, year }),
        }
    }
}
