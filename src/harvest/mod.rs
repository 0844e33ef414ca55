//! Scrape orchestrator: ties browser → parser → pricing → storage together.
//!
//! ## Per-model state machine
//!
//! For each target model (randomized order) the orchestrator walks the sort
//! modes [best_match, newest, price_asc], extracting result-page anchors in
//! bounded rounds. A pass ends on wall-clock timeout, on re-encountering the
//! previous pass's cursor URL, or after all sort modes are exhausted; every
//! exit path flushes the pending batch and rewrites the progress cursor.
//! Re-running with no external change terminates early via the cursor hit
//! and inserts nothing.

use crate::browser::{search_url, BrowserDriver};
use crate::catalog::Catalog;
use crate::config::HarvesterConfig;
use crate::models::{HarvestStats, Listing, ParseOutcome, SortMode};
use crate::notify::{chunk_digest, Notifier, DIGEST_CHUNK_CHARS};
use crate::parser::{canonicalize_url, corrections::CorrectionsAid, ListingParser};
use crate::pricing;
use crate::storage::Repository;
use crate::utils::fmt_number;
use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Local, Timelike};
use rand::RngExt;
use rand::seq::SliceRandom;
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tokio_retry::strategy::ExponentialBackoff;
use tracing::{debug, info, warn};

/// Local hour at which an empty run still produces a summary message.
const SUMMARY_HOUR: u32 = 18;

/// A notify-worthy listing, formatted and ready to send.
#[derive(Debug, Clone)]
pub struct Offer {
    pub text: String,
    pub url: String,
}

/// Everything one full run produced, before dispatch.
#[derive(Debug, Default)]
pub struct RunOutcome {
    pub stats: HarvestStats,
    pub offers: Vec<Offer>,
    pub potential_lines: Vec<String>,
    pub pending_lines: Vec<String>,
}

/// How a single model's pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PassEnd {
    Completed,
    CursorHit,
    TimedOut,
}

pub struct Harvester<'a, B: BrowserDriver> {
    config: &'a HarvesterConfig,
    catalog: &'a Catalog,
    repo: &'a Repository,
    browser: B,
    corrections: Option<&'a CorrectionsAid>,
    current_year: i32,
}

/// Mutable state of one model's pass.
struct ModelPass {
    model: String,
    cursor: Option<String>,
    seen: HashSet<String>,
    batch: Vec<Listing>,
    /// First new canonical URL observed this pass; becomes the next cursor.
    first_new_url: Option<String>,
    start: Instant,
}

impl<'a, B: BrowserDriver> Harvester<'a, B> {
    pub fn new(
        config: &'a HarvesterConfig,
        catalog: &'a Catalog,
        repo: &'a Repository,
        browser: B,
    ) -> Self {
        Self {
            config,
            catalog,
            repo,
            browser,
            corrections: None,
            current_year: Local::now().year(),
        }
    }

    pub fn with_corrections(mut self, aid: &'a CorrectionsAid) -> Self {
        self.corrections = Some(aid);
        self
    }

    /// Pin the calendar year used for ROI age math (tests).
    pub fn with_current_year(mut self, year: i32) -> Self {
        self.current_year = year;
        self
    }

    /// Run one full pass over the target models. Models are shuffled; one
    /// model's failure never aborts the rest.
    pub async fn run(&mut self, targets: &[String]) -> Result<RunOutcome> {
        let mut targets: Vec<String> = targets.to_vec();
        targets.shuffle(&mut rand::rng());
        info!("=== Starting run over {} models ===", targets.len());

        let mut outcome = RunOutcome::default();

        for model in &targets {
            match self.run_model(model, &mut outcome).await {
                Ok(end) => {
                    debug!("{}: pass ended via {:?}", model, end);
                    outcome.stats.models_processed += 1;
                }
                Err(e) => {
                    warn!("{}: {:#}", model, e);
                    outcome.stats.errors += 1;
                }
            }
        }

        info!(
            "=== Run done: {} models | {} items | {} saved | {} relevant | {} potential | {} pending | {} errors ===",
            outcome.stats.models_processed,
            outcome.stats.items_seen,
            outcome.stats.listings_saved,
            outcome.stats.relevant,
            outcome.stats.potential,
            outcome.stats.pending,
            outcome.stats.errors,
        );

        Ok(outcome)
    }

    async fn run_model(&mut self, model: &str, outcome: &mut RunOutcome) -> Result<PassEnd> {
        let cursor = self.repo.get_progress(model)?;
        info!("{}: starting pass (cursor: {:?})", model, cursor);

        let mut pass = ModelPass {
            model: model.to_string(),
            cursor,
            seen: HashSet::new(),
            batch: Vec::new(),
            first_new_url: None,
            start: Instant::now(),
        };
        let timeout = Duration::from_secs(self.config.model_timeout_secs);

        for sort in SortMode::ALL {
            let url = search_url(&self.config.region, model, sort);
            if let Err(e) = self.navigate_with_retry(&url).await {
                warn!("{}: navigation failed for {:?}, trying next sort: {}", model, sort, e);
                continue;
            }

            for attempt in 0..self.config.max_attempts {
                if pass.start.elapsed() > timeout {
                    info!("{}: timeout after {:?}", model, pass.start.elapsed());
                    self.finish_pass(&mut pass, outcome)?;
                    return Ok(PassEnd::TimedOut);
                }

                let items = match self.extract_with_retry().await {
                    Ok(items) => items,
                    Err(e) => {
                        warn!("{}: extraction failed on {:?}, abandoning sort: {}", model, sort, e);
                        break;
                    }
                };

                if items.is_empty() {
                    self.scroll_and_wait().await;
                    continue;
                }

                for item in &items {
                    outcome.stats.items_seen += 1;

                    let Some(url) =
                        canonicalize_url(&item.href).or_else(|| canonicalize_url(&item.text))
                    else {
                        continue;
                    };

                    // Caught up with the previous pass.
                    if pass.cursor.as_deref() == Some(url.as_str()) {
                        info!("{}: cursor hit at {}", model, url);
                        self.finish_pass(&mut pass, outcome)?;
                        return Ok(PassEnd::CursorHit);
                    }

                    if pass.seen.contains(&url) {
                        continue;
                    }
                    pass.seen.insert(url.clone());

                    if self.repo.exists(&url)? || self.catalog.contains_negative(&item.text) {
                        continue;
                    }

                    if pass.first_new_url.is_none() {
                        pass.first_new_url = Some(url.clone());
                    }

                    self.process_item(&item.text, &item.href, &mut pass, outcome)?;
                }

                debug!(
                    "{}: {:?} round {} done ({} seen so far)",
                    model,
                    sort,
                    attempt + 1,
                    pass.seen.len()
                );
                self.scroll_and_wait().await;
            }
        }

        self.finish_pass(&mut pass, outcome)?;
        Ok(PassEnd::Completed)
    }

    /// Parse, qualify and bucket one extracted item.
    fn process_item(
        &self,
        text: &str,
        href: &str,
        pass: &mut ModelPass,
        outcome: &mut RunOutcome,
    ) -> Result<()> {
        let parser = match self.corrections {
            Some(aid) => ListingParser::new(self.catalog, self.current_year).with_corrections(aid),
            None => ListingParser::new(self.catalog, self.current_year),
        };

        match parser.parse(text, Some(href)) {
            ParseOutcome::Dropped(reason) => {
                debug!("{}: dropped ({:?})", pass.model, reason);
            }
            ParseOutcome::Pending(p) => {
                outcome.stats.pending += 1;
                outcome.pending_lines.push(format!("⏳ {} {} — sin precio: {}", p.model, p.year, p.url));
            }
            ParseOutcome::Accepted(parsed) => {
                let reference =
                    pricing::reference_price(self.repo, self.catalog, &parsed.model, parsed.year)?;
                let rate = pricing::penalty_rate_for(self.catalog, &parsed.model);
                let roi = pricing::roi(
                    reference,
                    rate,
                    parsed.price,
                    parsed.year,
                    self.current_year,
                    pricing::EXTRA_COST_DEFAULT,
                );
                let score = pricing::score(text, parsed.price, roi);

                let listing = Listing {
                    url: parsed.url,
                    model: parsed.model,
                    year: parsed.year,
                    price: parsed.price,
                    mileage_text: parsed.mileage_text,
                    scraped_at: Local::now().date_naive(),
                    roi,
                    score,
                    relevant: pricing::relevant_for_db(score),
                };

                if pricing::relevant_for_notify(score, roi) {
                    outcome.stats.relevant += 1;
                    outcome.offers.push(Offer {
                        text: format_offer(&listing),
                        url: listing.url.clone(),
                    });
                } else if pricing::potential(score, roi) {
                    outcome.stats.potential += 1;
                    outcome.potential_lines.push(format_offer(&listing));
                }

                pass.batch.push(listing);
                if pass.batch.len() >= self.config.batch_insert_size {
                    self.flush(pass, outcome)?;
                }
            }
        }
        Ok(())
    }

    fn flush(&self, pass: &mut ModelPass, outcome: &mut RunOutcome) -> Result<usize> {
        let written = self.repo.insert_listings(&pass.batch)?;
        outcome.stats.listings_saved += written;
        pass.batch.clear();
        Ok(written)
    }

    /// Flush and rewrite the progress cursor, exactly once per exit path.
    fn finish_pass(&self, pass: &mut ModelPass, outcome: &mut RunOutcome) -> Result<()> {
        self.flush(pass, outcome)?;
        let next_cursor = pass.first_new_url.clone().or_else(|| pass.cursor.clone());
        if let Some(last_url) = next_cursor {
            self.repo
                .record_progress(&pass.model, &last_url, Local::now().naive_local())
                .with_context(|| format!("record progress for {}", pass.model))?;
        }
        Ok(())
    }

    async fn navigate_with_retry(&mut self, url: &str) -> Result<()> {
        let mut delays = backoff(self.config.nav_backoff_ms, self.config.nav_retries);
        loop {
            match self.browser.navigate(url).await {
                Ok(()) => return Ok(()),
                Err(e) => match delays.next() {
                    Some(d) => {
                        debug!("navigate retry in {:?}: {}", d, e);
                        sleep(d).await;
                    }
                    None => return Err(e).context("navigation retries exhausted"),
                },
            }
        }
    }

    async fn extract_with_retry(&mut self) -> Result<Vec<crate::models::RawItem>> {
        let mut delays = backoff(self.config.extract_backoff_ms, self.config.extract_retries);
        loop {
            match self.browser.extract_items().await {
                Ok(items) => return Ok(items),
                Err(e) => match delays.next() {
                    Some(d) => {
                        debug!("extract retry in {:?}: {}", d, e);
                        sleep(d).await;
                    }
                    None => return Err(e).context("extraction retries exhausted"),
                },
            }
        }
    }

    /// Scroll the viewport downward with a randomized delay so successive
    /// rounds cover different page regions.
    async fn scroll_and_wait(&mut self) {
        if let Err(e) = self.browser.scroll_by(self.config.scroll_pixels).await {
            debug!("scroll failed: {}", e);
        }
        let (lo, hi) = (self.config.scroll_delay_min_ms, self.config.scroll_delay_max_ms);
        let delay = if hi > lo { rand::rng().random_range(lo..=hi) } else { lo };
        if delay > 0 {
            sleep(Duration::from_millis(delay)).await;
        }
    }
}

/// Exponential backoff (base 2) scaled to `base_ms`, bounded by `attempts`.
fn backoff(base_ms: u64, attempts: u32) -> impl Iterator<Item = Duration> {
    ExponentialBackoff::from_millis(2)
        .factor(base_ms.max(2) / 2)
        .take(attempts as usize)
}

fn format_offer(l: &Listing) -> String {
    format!(
        "🚗 {} {} — Q{} | ROI {:.1}% | score {}/10",
        l.model,
        l.year,
        fmt_number(l.price),
        l.roi,
        l.score
    )
}

// ── Dispatch ──────────────────────────────────────────────────────────────────

/// Push a run's findings through the notifier: one message per relevant
/// listing, a chunked manual-review digest for potentials and pendings, a
/// counts line, and a single end-of-day summary when both buckets are
/// empty at local hour 18.
pub async fn dispatch(
    notifier: &dyn Notifier,
    repo: &Repository,
    outcome: &RunOutcome,
    now: DateTime<Local>,
) -> Result<()> {
    for offer in &outcome.offers {
        if let Err(e) = notifier.send_text_with_button(&offer.text, &offer.url).await {
            warn!("offer message dropped: {}", e);
        }
    }

    if !outcome.potential_lines.is_empty() {
        let mut lines = vec!["🔍 Revisión manual — potenciales:".to_string()];
        lines.extend(outcome.potential_lines.iter().cloned());
        for chunk in chunk_digest(&lines, DIGEST_CHUNK_CHARS) {
            if let Err(e) = notifier.send_text(&chunk).await {
                warn!("potential digest chunk dropped: {}", e);
            }
        }
    }

    if !outcome.pending_lines.is_empty() {
        let mut lines = vec!["⏳ Revisión manual — sin precio:".to_string()];
        lines.extend(outcome.pending_lines.iter().cloned());
        for chunk in chunk_digest(&lines, DIGEST_CHUNK_CHARS) {
            if let Err(e) = notifier.send_text(&chunk).await {
                warn!("pending digest chunk dropped: {}", e);
            }
        }
    }

    if outcome.offers.is_empty() && outcome.potential_lines.is_empty() && now.hour() == SUMMARY_HOUR
    {
        if let Err(e) = notifier.send_text("📭 Sin hallazgos relevantes hoy.").await {
            warn!("summary message dropped: {}", e);
        }
    }

    let total = repo.listing_count().unwrap_or(0);
    let counts = format!(
        "Procesados {} | relevantes {} | potenciales {} | total almacenado {}",
        outcome.stats.items_seen,
        outcome.stats.relevant,
        outcome.stats.potential,
        fmt_number(total)
    );
    if let Err(e) = notifier.send_text(&counts).await {
        warn!("counts line dropped: {}", e);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::BrowserError;
    use crate::models::RawItem;
    use crate::notify::NotifyError;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Replays canned items per navigated URL; empty elsewhere.
    struct ScriptedBrowser {
        pages: HashMap<String, Vec<RawItem>>,
        current: Vec<RawItem>,
    }

    impl ScriptedBrowser {
        fn new() -> Self {
            Self { pages: HashMap::new(), current: Vec::new() }
        }

        /// Serve `items` on the model's best_match page.
        fn with_page(mut self, region: &str, model: &str, items: Vec<RawItem>) -> Self {
            let url = search_url(region, model, SortMode::BestMatch);
            self.pages.insert(url, items);
            self
        }
    }

    #[async_trait]
    impl BrowserDriver for ScriptedBrowser {
        async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
            self.current = self.pages.get(url).cloned().unwrap_or_default();
            Ok(())
        }

        async fn extract_items(&mut self) -> Result<Vec<RawItem>, BrowserError> {
            Ok(self.current.clone())
        }

        async fn scroll_by(&mut self, _pixels: u32) -> Result<(), BrowserError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        texts: Mutex<Vec<String>>,
        buttons: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send_text(&self, text: &str) -> Result<(), NotifyError> {
            self.texts.lock().unwrap().push(text.to_string());
            Ok(())
        }

        async fn send_text_with_button(&self, text: &str, url: &str) -> Result<(), NotifyError> {
            self.buttons.lock().unwrap().push((text.to_string(), url.to_string()));
            Ok(())
        }
    }

    fn fast_config() -> HarvesterConfig {
        HarvesterConfig {
            max_attempts: 2,
            scroll_delay_min_ms: 0,
            scroll_delay_max_ms: 0,
            nav_backoff_ms: 0,
            extract_backoff_ms: 0,
            ..HarvesterConfig::default()
        }
    }

    fn item(text: &str, id: u64) -> RawItem {
        RawItem {
            text: text.to_string(),
            href: format!("https://www.facebook.com/marketplace/item/{}", id),
        }
    }

    fn repo() -> Repository {
        let r = Repository::open_in_memory().unwrap();
        r.run_migrations().unwrap();
        r
    }

    #[tokio::test]
    async fn good_yaris_saved_not_notified() {
        let config = fast_config();
        let catalog = Catalog::builtin();
        let repo = repo();
        let browser = ScriptedBrowser::new().with_page(
            &config.region,
            "yaris",
            vec![item(
                "🚘 Toyota Yaris 2015 Q45,000 https://www.facebook.com/marketplace/item/12345",
                12345,
            )],
        );

        let mut h = Harvester::new(&config, &catalog, &repo, browser).with_current_year(2025);
        let outcome = h.run(&[("yaris".to_string())]).await.unwrap();

        assert_eq!(outcome.stats.listings_saved, 1);
        assert_eq!(outcome.stats.relevant, 0);
        assert!(outcome.offers.is_empty());
        // roi 7.5, score 5 → stored and potential-bucketed
        assert_eq!(outcome.stats.potential, 1);
        assert!(repo.exists("https://www.facebook.com/marketplace/item/12345").unwrap());
        assert_eq!(
            repo.get_progress("yaris").unwrap().as_deref(),
            Some("https://www.facebook.com/marketplace/item/12345")
        );
    }

    #[tokio::test]
    async fn relevant_civic_notified_with_button() {
        let config = fast_config();
        let catalog = Catalog::builtin();
        let repo = repo();
        let browser = ScriptedBrowser::new().with_page(
            &config.region,
            "civic",
            vec![item(
                "Honda Civic 2010 Q30,000 https://www.facebook.com/marketplace/item/22222 buen estado 4 puertas",
                22222,
            )],
        );

        let mut h = Harvester::new(&config, &catalog, &repo, browser).with_current_year(2025);
        let outcome = h.run(&["civic".to_string()]).await.unwrap();

        assert_eq!(outcome.stats.relevant, 1);
        assert_eq!(outcome.offers.len(), 1);
        assert_eq!(outcome.offers[0].url, "https://www.facebook.com/marketplace/item/22222");
        assert!(outcome.offers[0].text.contains("71.4"));

        let notifier = RecordingNotifier::default();
        let now = Local.with_ymd_and_hms(2025, 8, 29, 10, 0, 0).unwrap();
        dispatch(&notifier, &repo, &outcome, now).await.unwrap();
        assert_eq!(notifier.buttons.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn foreign_listing_dropped() {
        let config = fast_config();
        let catalog = Catalog::builtin();
        let repo = repo();
        let browser = ScriptedBrowser::new().with_page(
            &config.region,
            "corolla",
            vec![item(
                "Toyota Corolla 2018 Q40,000 ubicado en Honduras https://www.facebook.com/marketplace/item/33333",
                33333,
            )],
        );

        let mut h = Harvester::new(&config, &catalog, &repo, browser).with_current_year(2025);
        let outcome = h.run(&["corolla".to_string()]).await.unwrap();

        assert_eq!(outcome.stats.listings_saved, 0);
        assert_eq!(repo.listing_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn missing_price_goes_to_pending_digest() {
        let config = fast_config();
        let catalog = Catalog::builtin();
        let repo = repo();
        let browser = ScriptedBrowser::new().with_page(
            &config.region,
            "sentra",
            vec![item(
                "Nissan Sentra 2012 ver precio https://www.facebook.com/marketplace/item/44444",
                44444,
            )],
        );

        let mut h = Harvester::new(&config, &catalog, &repo, browser).with_current_year(2025);
        let outcome = h.run(&["sentra".to_string()]).await.unwrap();

        assert_eq!(outcome.stats.pending, 1);
        assert_eq!(outcome.pending_lines.len(), 1);
        assert!(outcome.pending_lines[0].contains("44444"));
        assert_eq!(repo.listing_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn cursor_hit_exits_early_and_advances() {
        let config = fast_config();
        let catalog = Catalog::builtin();
        let repo = repo();
        repo.record_progress(
            "yaris",
            "https://www.facebook.com/marketplace/item/55555",
            Local::now().naive_local(),
        )
        .unwrap();

        let browser = ScriptedBrowser::new().with_page(
            &config.region,
            "yaris",
            vec![
                item("Toyota Yaris 2016 Q40,000 https://www.facebook.com/marketplace/item/66666", 66666),
                item("Toyota Yaris 2015 Q45,000 https://www.facebook.com/marketplace/item/55555", 55555),
                item("Toyota Yaris 2014 Q38,000 https://www.facebook.com/marketplace/item/77777", 77777),
            ],
        );

        let mut h = Harvester::new(&config, &catalog, &repo, browser).with_current_year(2025);
        let outcome = h.run(&["yaris".to_string()]).await.unwrap();

        // Only 66666 processed; 77777 sits past the cursor hit.
        assert!(repo.exists("https://www.facebook.com/marketplace/item/66666").unwrap());
        assert!(!repo.exists("https://www.facebook.com/marketplace/item/77777").unwrap());
        assert_eq!(outcome.stats.listings_saved, 1);
        assert_eq!(
            repo.get_progress("yaris").unwrap().as_deref(),
            Some("https://www.facebook.com/marketplace/item/66666")
        );
    }

    #[tokio::test]
    async fn second_run_is_idempotent_via_cursor() {
        let config = fast_config();
        let catalog = Catalog::builtin();
        let repo = repo();
        let items = vec![
            item("Toyota Yaris 2016 Q40,000 https://www.facebook.com/marketplace/item/1001", 1001),
            item("Toyota Yaris 2014 Q36,000 https://www.facebook.com/marketplace/item/1002", 1002),
        ];

        let browser =
            ScriptedBrowser::new().with_page(&config.region, "yaris", items.clone());
        let mut h = Harvester::new(&config, &catalog, &repo, browser).with_current_year(2025);
        let first = h.run(&["yaris".to_string()]).await.unwrap();
        assert_eq!(first.stats.listings_saved, 2);

        let browser = ScriptedBrowser::new().with_page(&config.region, "yaris", items);
        let mut h = Harvester::new(&config, &catalog, &repo, browser).with_current_year(2025);
        let second = h.run(&["yaris".to_string()]).await.unwrap();

        assert_eq!(second.stats.listings_saved, 0);
        assert_eq!(repo.listing_count().unwrap(), 2);
    }

    #[tokio::test]
    async fn timeout_flushes_and_keeps_cursor() {
        let config = HarvesterConfig { model_timeout_secs: 0, ..fast_config() };
        let catalog = Catalog::builtin();
        let repo = repo();
        repo.record_progress(
            "yaris",
            "https://www.facebook.com/marketplace/item/55555",
            Local::now().naive_local(),
        )
        .unwrap();

        let browser = ScriptedBrowser::new().with_page(
            &config.region,
            "yaris",
            vec![item("Toyota Yaris 2016 Q40,000 https://www.facebook.com/marketplace/item/9", 9)],
        );

        let mut h = Harvester::new(&config, &catalog, &repo, browser).with_current_year(2025);
        let outcome = h.run(&["yaris".to_string()]).await.unwrap();

        // The round loop never gets past the clock check.
        assert_eq!(outcome.stats.items_seen, 0);
        assert_eq!(
            repo.get_progress("yaris").unwrap().as_deref(),
            Some("https://www.facebook.com/marketplace/item/55555")
        );
    }

    #[tokio::test]
    async fn empty_run_summary_only_at_hour_18() {
        let repo = repo();
        let outcome = RunOutcome::default();

        let notifier = RecordingNotifier::default();
        let at_18 = Local.with_ymd_and_hms(2025, 8, 29, 18, 0, 0).unwrap();
        dispatch(&notifier, &repo, &outcome, at_18).await.unwrap();
        let texts = notifier.texts.lock().unwrap().clone();
        // Summary plus the counts line.
        assert_eq!(texts.len(), 2);
        assert!(texts[0].contains("Sin hallazgos"));

        let notifier = RecordingNotifier::default();
        let at_10 = Local.with_ymd_and_hms(2025, 8, 29, 10, 0, 0).unwrap();
        dispatch(&notifier, &repo, &outcome, at_10).await.unwrap();
        let texts = notifier.texts.lock().unwrap().clone();
        // Counts line only.
        assert_eq!(texts.len(), 1);
        assert!(texts[0].starts_with("Procesados"));
    }

    #[tokio::test]
    async fn batch_flushes_at_configured_size() {
        let config = HarvesterConfig { batch_insert_size: 3, ..fast_config() };
        let catalog = Catalog::builtin();
        let repo = repo();

        let items: Vec<RawItem> = (0..7)
            .map(|i| {
                item(
                    &format!(
                        "Toyota Yaris 2016 Q40,000 https://www.facebook.com/marketplace/item/{}",
                        2000 + i
                    ),
                    2000 + i,
                )
            })
            .collect();
        let browser = ScriptedBrowser::new().with_page(&config.region, "yaris", items);

        let mut h = Harvester::new(&config, &catalog, &repo, browser).with_current_year(2025);
        let outcome = h.run(&["yaris".to_string()]).await.unwrap();

        assert_eq!(outcome.stats.listings_saved, 7);
        assert_eq!(repo.listing_count().unwrap(), 7);
    }
}
