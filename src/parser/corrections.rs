//! Offline corrections/patterns aid: maps manually curated (text → year)
//! pairs into lookup rules the parser consults when its own year strategies
//! fail. Pure detector, no side effects; rebuilding the pattern index is a
//! full pass over the corrections map on every load.

use anyhow::{Context, Result};
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, warn};

use crate::catalog::Catalog;

/// Completed years outside this lower bound are discarded.
const PATTERN_YEAR_MIN: i32 = 1980;

/// Minimum token overlap (intersection over stored-set size) for a partial
/// match to fire.
const PARTIAL_THRESHOLD: f64 = 0.7;

static DEL_YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bdel\s+((?:19|20)\d{2})\b").unwrap());

static ANIO_YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\baño\s+((?:19|20)\d{2})\b").unwrap());

static TRAILING_TWO_DIGIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{2})$").unwrap());

/// Shapes a correction can teach us, keyed by the brand token they occurred
/// with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Template {
    /// `yaris 08`, `civic '15`
    ModelTwoDigit,
    /// `del 2009`
    DelFourDigit,
    /// `año 2012`
    AnioFourDigit,
    /// blob ending in a bare two-digit year
    TrailingTwoDigit,
}

#[derive(Debug, Clone)]
struct LearnedPattern {
    brand: String,
    template: Template,
}

pub struct CorrectionsAid {
    exact: HashMap<String, i32>,
    patterns: Vec<LearnedPattern>,
    brand_tokens: Vec<String>,
}

/// yy ≤ (current_year mod 100) reads as 20yy, otherwise 19yy.
pub fn complete_two_digit(yy: i32, current_year: i32) -> i32 {
    if yy <= current_year % 100 {
        2000 + yy
    } else {
        1900 + yy
    }
}

/// Lowercase, strip emoji, collapse whitespace, trim trailing punctuation.
/// The emoji table is explicit so it can be tested character-by-character.
pub fn normalize_correction_text(text: &str) -> String {
    const EMOJI_RANGES: &[(u32, u32)] = &[
        (0x1F300, 0x1FAFF), // pictographs, transport, supplemental
        (0x2600, 0x27BF),   // misc symbols + dingbats
        (0x1F1E6, 0x1F1FF), // regional indicators
        (0x2B00, 0x2BFF),   // arrows/stars
        (0xFE0E, 0xFE0F),   // variation selectors
        (0x200D, 0x200D),   // zero-width joiner
    ];

    let stripped: String = text
        .to_lowercase()
        .chars()
        .filter(|c| {
            let cp = *c as u32;
            !EMOJI_RANGES.iter().any(|&(lo, hi)| (lo..=hi).contains(&cp))
        })
        .collect();

    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_end_matches(['.', ',', ';', ':', '!', '¡', '?', '¿', '-', '•'])
        .trim_end()
        .to_string()
}

impl CorrectionsAid {
    pub fn from_map(corrections: HashMap<String, i32>, catalog: &Catalog) -> Self {
        let brand_tokens: Vec<String> =
            catalog.brand_tokens().iter().map(|t| t.to_string()).collect();

        let mut exact = HashMap::new();
        let mut patterns: Vec<LearnedPattern> = Vec::new();

        for (text, year) in corrections {
            let norm = normalize_correction_text(&text);
            if norm.is_empty() {
                continue;
            }
            for learned in learn_patterns(&norm, year, &brand_tokens) {
                let dup = patterns
                    .iter()
                    .any(|p| p.brand == learned.brand && p.template == learned.template);
                if !dup {
                    debug!("learned {:?} pattern for '{}'", learned.template, learned.brand);
                    patterns.push(learned);
                }
            }
            exact.insert(norm, year);
        }

        Self { exact, patterns, brand_tokens }
    }

    /// Two-column CSV (`text,year`), one correction per row.
    pub fn load_csv(path: &Path, catalog: &Catalog) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path)
            .with_context(|| format!("Failed to open corrections file {:?}", path))?;

        let mut map = HashMap::new();
        for (i, result) in reader.records().enumerate() {
            let record = match result {
                Ok(r) => r,
                Err(e) => {
                    warn!("Corrections row {}: {}", i + 1, e);
                    continue;
                }
            };
            let (Some(text), Some(year)) = (record.get(0), record.get(1)) else {
                continue;
            };
            match year.trim().parse::<i32>() {
                Ok(y) => {
                    map.insert(text.to_string(), y);
                }
                Err(_) => warn!("Corrections row {}: bad year '{}'", i + 1, year),
            }
        }

        debug!("{} corrections loaded from {:?}", map.len(), path);
        Ok(Self::from_map(map, catalog))
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty()
    }

    /// Lookup order: exact normalized match, partial token overlap, learned
    /// pattern. Returns `None` when nothing applies.
    pub fn detect_year(&self, text: &str, current_year: i32) -> Option<i32> {
        let norm = normalize_correction_text(text);

        if let Some(&year) = self.exact.get(&norm) {
            return Some(year);
        }

        if let Some(year) = self.partial_match(&norm) {
            return Some(year);
        }

        self.pattern_match(&norm, current_year)
    }

    /// Highest intersection-over-stored-size entry at or above the
    /// threshold; the stored entry must name a known brand/model token.
    fn partial_match(&self, norm: &str) -> Option<i32> {
        let query: Vec<&str> = norm.split_whitespace().collect();

        let mut best: Option<(f64, i32)> = None;
        for (stored, &year) in &self.exact {
            let stored_tokens: Vec<&str> = stored.split_whitespace().collect();
            if stored_tokens.is_empty() {
                continue;
            }
            if !stored_tokens.iter().any(|t| self.brand_tokens.iter().any(|b| b == t)) {
                continue;
            }
            let inter = stored_tokens.iter().filter(|t| query.contains(t)).count();
            let score = inter as f64 / stored_tokens.len() as f64;
            if score >= PARTIAL_THRESHOLD && best.map(|(s, _)| score > s).unwrap_or(true) {
                best = Some((score, year));
            }
        }
        best.map(|(_, year)| year)
    }

    fn pattern_match(&self, norm: &str, current_year: i32) -> Option<i32> {
        let in_bounds = |y: i32| (PATTERN_YEAR_MIN..=current_year + 1).contains(&y);

        for pattern in &self.patterns {
            if !norm.contains(pattern.brand.as_str()) {
                continue;
            }
            let candidate = match pattern.template {
                Template::ModelTwoDigit => model_two_digit_year(norm, &pattern.brand)
                    .map(|yy| complete_two_digit(yy, current_year)),
                Template::DelFourDigit => DEL_YEAR_RE
                    .captures(norm)
                    .and_then(|c| c.get(1))
                    .and_then(|m| m.as_str().parse().ok()),
                Template::AnioFourDigit => ANIO_YEAR_RE
                    .captures(norm)
                    .and_then(|c| c.get(1))
                    .and_then(|m| m.as_str().parse().ok()),
                Template::TrailingTwoDigit => TRAILING_TWO_DIGIT_RE
                    .captures(norm)
                    .and_then(|c| c.get(1))
                    .and_then(|m| m.as_str().parse::<i32>().ok())
                    .map(|yy| complete_two_digit(yy, current_year)),
            };
            if let Some(y) = candidate.filter(|&y| in_bounds(y)) {
                return Some(y);
            }
        }
        None
    }
}

/// Two-digit year immediately following the brand token: `yaris 08`.
fn model_two_digit_year(norm: &str, brand: &str) -> Option<i32> {
    let re = Regex::new(&format!(r"\b{}\s?'?(\d{{2}})\b", regex::escape(brand))).ok()?;
    re.captures(norm)?.get(1)?.as_str().parse().ok()
}

/// Work out which templates explain a stored correction. A template is
/// learned only when applying it to the stored text reproduces the curated
/// year.
fn learn_patterns(norm: &str, year: i32, brand_tokens: &[String]) -> Vec<LearnedPattern> {
    let mut learned = Vec::new();

    let Some(brand) = brand_tokens.iter().find(|b| norm.contains(b.as_str())) else {
        return learned;
    };

    if let Some(yy) = model_two_digit_year(norm, brand) {
        if 2000 + yy == year || 1900 + yy == year {
            learned.push(LearnedPattern { brand: brand.clone(), template: Template::ModelTwoDigit });
        }
    }

    if let Some(y) = DEL_YEAR_RE
        .captures(norm)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<i32>().ok())
    {
        if y == year {
            learned.push(LearnedPattern { brand: brand.clone(), template: Template::DelFourDigit });
        }
    }

    if let Some(y) = ANIO_YEAR_RE
        .captures(norm)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<i32>().ok())
    {
        if y == year {
            learned.push(LearnedPattern { brand: brand.clone(), template: Template::AnioFourDigit });
        }
    }

    if let Some(yy) = TRAILING_TWO_DIGIT_RE
        .captures(norm)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<i32>().ok())
    {
        if 2000 + yy == year || 1900 + yy == year {
            learned.push(LearnedPattern {
                brand: brand.clone(),
                template: Template::TrailingTwoDigit,
            });
        }
    }

    learned
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aid(entries: &[(&str, i32)]) -> CorrectionsAid {
        let catalog = Catalog::builtin();
        let map: HashMap<String, i32> =
            entries.iter().map(|&(t, y)| (t.to_string(), y)).collect();
        CorrectionsAid::from_map(map, &catalog)
    }

    #[test]
    fn two_digit_completion_pivot() {
        assert_eq!(complete_two_digit(25, 2025), 2025);
        assert_eq!(complete_two_digit(26, 2025), 1926);
        assert_eq!(complete_two_digit(0, 2025), 2000);
        assert_eq!(complete_two_digit(99, 2025), 1999);
    }

    #[test]
    fn normalization_table() {
        assert_eq!(normalize_correction_text("🚘 Toyota  Yaris 2015!!"), "toyota yaris 2015");
        assert_eq!(normalize_correction_text("CIVIC ✨ del 2009."), "civic del 2009");
        assert_eq!(normalize_correction_text("  kia\trio   08  "), "kia rio 08");
    }

    #[test]
    fn exact_match_wins() {
        let aid = aid(&[("Toyota Yaris full extras", 2014)]);
        assert_eq!(aid.detect_year("🚘 toyota yaris FULL extras", 2025), Some(2014));
    }

    #[test]
    fn partial_match_over_threshold() {
        let aid = aid(&[("toyota yaris full extras", 2014)]);
        // 3 of 4 stored tokens present → 0.75 ≥ 0.7
        assert_eq!(aid.detect_year("toyota yaris extras recién importado", 2025), Some(2014));
        // 2 of 4 → 0.5, below threshold, and no pattern applies
        assert_eq!(aid.detect_year("toyota yaris mecánico", 2025), None);
    }

    #[test]
    fn partial_requires_brand_token() {
        let aid = aid(&[("ganga vendo carro bonito", 2012)]);
        assert_eq!(aid.detect_year("ganga vendo carro lindo", 2025), None);
    }

    #[test]
    fn learned_model_two_digit_pattern() {
        // "yaris 08" → 2008 teaches the model+yy template for "yaris".
        let aid = aid(&[("vendo yaris 08 motor 1.3", 2008)]);
        assert_eq!(aid.detect_year("yaris 15 recién llegado papeles al día", 2025), Some(2015));
        // yy=26 completes to 1926, outside [1980, 2026] → rejected.
        assert_eq!(aid.detect_year("yaris 26 recién llegado papeles al día", 2025), None);
    }

    #[test]
    fn learned_del_pattern() {
        let aid = aid(&[("civic del 2009 estandar", 2009)]);
        assert_eq!(aid.detect_year("civic del 2016 motor vtec a toda prueba", 2025), Some(2016));
    }

    #[test]
    fn learned_trailing_two_digit_pattern() {
        let aid = aid(&[("vendo mi sentra modelo 98", 1998)]);
        assert_eq!(aid.detect_year("sentra std bonito modelo 04", 2025), Some(2004));
    }

    #[test]
    fn pattern_requires_matching_brand() {
        let aid = aid(&[("civic del 2009 estandar", 2009)]);
        // Learned for "civic"; a yaris blob must not trigger it.
        assert_eq!(aid.detect_year("yaris del 2016 bonito", 2025), None);
    }
}
