//! Static catalog: the fixed set of car models the harvester searches for,
//! their fallback reference prices, and the phrase lists the parser uses to
//! drop junk before price parsing.
//!
//! Match order matters: specific models first, brand-only entries last, so
//! "toyota yaris 2015" resolves to `yaris` and not the generic `toyota`.

/// One recognized car model.
#[derive(Debug, Clone)]
pub struct CatalogModel {
    pub name: &'static str,
    /// Fallback reference price when the store has no comparable history.
    pub default_reference_price: i64,
    /// Per-model yearly depreciation rate; `None` → the engine default.
    pub penalty_rate: Option<f64>,
}

/// Immutable catalog handed by reference to parser, pricing and orchestrator.
#[derive(Debug, Clone)]
pub struct Catalog {
    models: Vec<CatalogModel>,
    negative_phrases: Vec<&'static str>,
    foreign_locations: Vec<&'static str>,
}

const MODELS: &[(&str, i64, Option<f64>)] = &[
    ("yaris", 50_000, None),
    ("civic", 60_000, None),
    ("corolla", 55_000, None),
    ("sentra", 45_000, None),
    ("cr-v", 80_000, None),
    ("rav4", 85_000, None),
    ("tucson", 70_000, None),
    ("kia picanto", 35_000, Some(0.03)),
    ("chevrolet spark", 30_000, Some(0.03)),
    ("nissan march", 38_000, None),
    ("suzuki alto", 28_000, Some(0.03)),
    ("suzuki swift", 40_000, None),
    ("suzuki grand vitara", 55_000, None),
    ("hyundai accent", 42_000, None),
    ("hyundai i10", 35_000, None),
    ("kia rio", 42_000, None),
    ("mitsubishi mirage", 36_000, None),
    // Brand-only catch-alls, matched last.
    ("toyota", 45_000, None),
    ("honda", 45_000, None),
];

const NEGATIVE_PHRASES: &[&str] = &[
    "para repuesto",
    "para repuestos",
    "solo piezas",
    "por piezas",
    "chocado",
    "motor fundido",
    "sin papeles",
    "papeles atrasados",
    "se cambia por",
    "solo permuta",
];

const FOREIGN_LOCATIONS: &[&str] = &[
    "honduras",
    "el salvador",
    "san pedro sula",
    "tegucigalpa",
    "san salvador",
    "nicaragua",
    "managua",
    "belice",
    "tapachula",
    "mexico",
    "méxico",
];

impl Catalog {
    pub fn builtin() -> Self {
        Self {
            models: MODELS
                .iter()
                .map(|&(name, default_reference_price, penalty_rate)| CatalogModel {
                    name,
                    default_reference_price,
                    penalty_rate,
                })
                .collect(),
            negative_phrases: NEGATIVE_PHRASES.to_vec(),
            foreign_locations: FOREIGN_LOCATIONS.to_vec(),
        }
    }

    pub fn models(&self) -> &[CatalogModel] {
        &self.models
    }

    pub fn model_names(&self) -> Vec<String> {
        self.models.iter().map(|m| m.name.to_string()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.iter().any(|m| m.name == name)
    }

    pub fn default_price(&self, name: &str) -> Option<i64> {
        self.models
            .iter()
            .find(|m| m.name == name)
            .map(|m| m.default_reference_price)
    }

    pub fn penalty_rate(&self, name: &str) -> Option<f64> {
        self.models.iter().find(|m| m.name == name).and_then(|m| m.penalty_rate)
    }

    /// First catalog model whose tokens all appear in the alnum-lowercased
    /// text. Both sides are normalized with [`normalize_for_match`].
    pub fn match_model(&self, text: &str) -> Option<&CatalogModel> {
        let haystack = normalize_for_match(text);
        self.models.iter().find(|m| {
            m.name
                .split_whitespace()
                .all(|token| haystack.contains(&normalize_for_match(token)))
        })
    }

    /// True when the lowercased text contains any negative phrase or any
    /// foreign-location marker. Checked before URL parsing.
    pub fn contains_negative(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.negative_phrases.iter().any(|p| lower.contains(p))
            || self.foreign_locations.iter().any(|p| lower.contains(p))
    }

    /// True when the (already lowercased) text names a foreign location.
    /// Used to distinguish drop reasons after `contains_negative` fires.
    pub fn foreign_hit(&self, lower: &str) -> bool {
        self.foreign_locations.iter().any(|p| lower.contains(p))
    }

    /// Brand/model tokens known to the catalog; the corrections aid uses
    /// these to gate partial and pattern matches.
    pub fn brand_tokens(&self) -> Vec<&'static str> {
        let mut tokens: Vec<&'static str> = Vec::new();
        for m in &self.models {
            for t in m.name.split_whitespace() {
                if !tokens.contains(&t) {
                    tokens.push(t);
                }
            }
        }
        tokens
    }
}

/// Lowercase and strip every non-alphanumeric character. Shared by the
/// fuzzy model comparison on both the catalog and listing side.
pub fn normalize_for_match(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}
