use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

// ── Listing ───────────────────────────────────────────────────────────────────

/// A qualified marketplace listing as persisted in the `listings` table.
/// Unique by canonical `url`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Listing {
    pub url: String,
    pub model: String,
    pub year: i32,
    pub price: i64,
    pub mileage_text: String,
    pub scraped_at: NaiveDate,
    pub roi: f64,
    pub score: i32,
    pub relevant: bool,
}

// ── Progress cursor ───────────────────────────────────────────────────────────

/// Per-model incremental cursor: the most recent listing URL observed on the
/// previous pass. Rewritten once per model per pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressCursor {
    pub model: String,
    pub last_url: String,
    pub timestamp: NaiveDateTime,
}

// ── Raw extraction item ───────────────────────────────────────────────────────

/// One anchor pulled out of the marketplace results page: the element's
/// visible text blob and its href, both untrusted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawItem {
    pub text: String,
    pub href: String,
}

// ── Parse pipeline output ─────────────────────────────────────────────────────

/// Fields the parser extracts before pricing. `mileage_text` is opaque.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedListing {
    pub url: String,
    pub model: String,
    pub year: i32,
    pub price: i64,
    pub mileage_text: String,
}

/// A listing with valid URL, model and year but no price, surfaced for
/// manual review instead of being stored.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingListing {
    pub url: String,
    pub model: String,
    pub year: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    NegativePhrase,
    ForeignLocation,
    MissingUrl,
    MalformedUrl,
    PriceTooLow,
    NoYear,
    NoModel,
}

/// Tagged result of the parse pipeline, so drops stay traceable.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    Accepted(ParsedListing),
    Pending(PendingListing),
    Dropped(DropReason),
}

// ── Sort modes ────────────────────────────────────────────────────────────────

/// Marketplace result ordering, rotated per model to diversify coverage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortMode {
    BestMatch,
    Newest,
    PriceAsc,
}

impl SortMode {
    pub const ALL: [SortMode; 3] = [SortMode::BestMatch, SortMode::Newest, SortMode::PriceAsc];

    pub fn as_query_value(&self) -> &'static str {
        match self {
            SortMode::BestMatch => "best_match",
            SortMode::Newest => "newest",
            SortMode::PriceAsc => "price_asc",
        }
    }
}

// ── Run stats ─────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct HarvestStats {
    pub models_processed: usize,
    pub items_seen: usize,
    pub listings_saved: usize,
    pub relevant: usize,
    pub potential: usize,
    pub pending: usize,
    pub errors: usize,
}
