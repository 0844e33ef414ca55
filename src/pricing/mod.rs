//! Reference-price & ROI engine plus the 0–10 scorer.
//!
//! ROI is estimated against a per-(model, year) reference price: the minimum
//! historical price within ±2 model years when the store has any, otherwise
//! the catalog default. An age-based depreciation penalty discounts the
//! reference for cars older than `AGE_FREE_YEARS`.

use anyhow::Result;

use crate::catalog::Catalog;
use crate::storage::Repository;

pub const EXTRA_COST_DEFAULT: i64 = 1_500;
pub const AGE_FREE_YEARS: i32 = 10;
pub const DEFAULT_PENALTY_RATE: f64 = 0.02;
pub const REFERENCE_YEAR_TOLERANCE: i32 = 2;

pub const SCORE_MIN_DB: i32 = 4;
pub const SCORE_MIN_NOTIFY: i32 = 6;
pub const ROI_MIN_NOTIFY: f64 = 10.0;
pub const ROI_MIN_POTENTIAL: f64 = 7.0;

// ── Reference price ───────────────────────────────────────────────────────────

/// Minimum recorded price for `model` within ±tolerance years, falling back
/// to the catalog default when the store has nothing comparable.
pub fn reference_price(
    repo: &Repository,
    catalog: &Catalog,
    model: &str,
    year: i32,
) -> Result<i64> {
    let recorded = repo.reference_min_price(model, year, REFERENCE_YEAR_TOLERANCE)?;
    match recorded {
        Some(p) if p > 0 => Ok(p),
        _ => Ok(catalog.default_price(model).unwrap_or(0)),
    }
}

// ── ROI ───────────────────────────────────────────────────────────────────────

/// ROI percent, one decimal, unclamped. Deterministic given the reference
/// snapshot; returns 0.0 when the investment is non-positive.
pub fn roi(
    reference_price: i64,
    penalty_rate: f64,
    price: i64,
    year: i32,
    current_year: i32,
    extra_cost: i64,
) -> f64 {
    let investment = price + extra_cost;
    if investment <= 0 {
        return 0.0;
    }

    let age = (current_year - year).max(0);
    let penalty = ((age - AGE_FREE_YEARS).max(0) as f64 * penalty_rate).max(0.0);
    let adjusted_reference = reference_price as f64 * (1.0 - penalty);

    let pct = (adjusted_reference - investment as f64) / investment as f64 * 100.0;
    (pct * 10.0).round() / 10.0
}

/// Per-model depreciation rate, catalog override or the 2%/yr default.
pub fn penalty_rate_for(catalog: &Catalog, model: &str) -> f64 {
    catalog.penalty_rate(model).unwrap_or(DEFAULT_PENALTY_RATE)
}

// ── Scorer ────────────────────────────────────────────────────────────────────

/// Integer score 0–10 from ROI bucket, price bucket and text richness.
pub fn score(raw_text: &str, price: i64, roi: f64) -> i32 {
    let mut s = 3;

    if roi >= 10.0 {
        s += 4;
    } else if roi >= 7.0 {
        s += 2;
    } else {
        s -= 2;
    }

    if price <= 30_000 {
        s += 2;
    } else {
        s -= 1;
    }

    if raw_text.split_whitespace().count() >= 5 {
        s += 1;
    }

    s.clamp(0, 10)
}

// ── Relevance predicates ──────────────────────────────────────────────────────

pub fn relevant_for_db(score: i32) -> bool {
    score >= SCORE_MIN_DB
}

pub fn relevant_for_notify(score: i32, roi: f64) -> bool {
    score >= SCORE_MIN_NOTIFY && roi >= ROI_MIN_NOTIFY
}

pub fn potential(score: i32, roi: f64) -> bool {
    roi >= ROI_MIN_POTENTIAL && score >= SCORE_MIN_DB
}
