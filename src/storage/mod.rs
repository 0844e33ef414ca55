use crate::models::{Listing, ProgressCursor};
use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime};
use duckdb::{params, Connection};
use std::path::Path;
use tracing::info;

// ── Schema ────────────────────────────────────────────────────────────────────

const DDL: &str = r#"
CREATE SEQUENCE IF NOT EXISTS listings_id_seq;

CREATE TABLE IF NOT EXISTS listings (
    id            INTEGER PRIMARY KEY DEFAULT nextval('listings_id_seq'),
    url           VARCHAR UNIQUE NOT NULL,
    model         VARCHAR NOT NULL,
    year          INTEGER NOT NULL,
    price         BIGINT  NOT NULL,
    mileage_text  VARCHAR NOT NULL DEFAULT '',
    scraped_at    DATE    NOT NULL,
    roi           DOUBLE  NOT NULL,
    score         INTEGER NOT NULL,
    relevant      BOOLEAN NOT NULL
);

CREATE TABLE IF NOT EXISTS progress (
    model      VARCHAR PRIMARY KEY,
    last_url   VARCHAR NOT NULL,
    timestamp  TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER PRIMARY KEY,
    applied_at  TIMESTAMP NOT NULL
);
"#;

const INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_listings_model ON listings (model);
CREATE INDEX IF NOT EXISTS idx_listings_date  ON listings (scraped_at);
"#;

// ── Repository ────────────────────────────────────────────────────────────────

/// Single-writer store over one DuckDB file. All writes go through the
/// orchestrator's batched flushes; readers share the same connection.
pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Could not create dir {:?}", parent))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open store at {:?}", path))?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self { conn: Connection::open_in_memory()? })
    }

    pub fn run_migrations(&self) -> Result<()> {
        info!("Running migrations…");
        self.conn.execute_batch(DDL).context("DDL failed")?;
        self.conn.execute_batch(INDEXES).context("Index creation failed")?;
        self.conn.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, ?)",
            params![Local::now().naive_local()],
        )?;
        info!("Migrations done.");
        Ok(())
    }

    /// Explicit teardown; surfaces close errors instead of dropping them.
    pub fn close(self) -> Result<()> {
        self.conn
            .close()
            .map_err(|(_, e)| anyhow::anyhow!("Failed to close store: {}", e))
    }

    // ── Listings ──────────────────────────────────────────────────────────────

    pub fn exists(&self, url: &str) -> Result<bool> {
        let mut stmt = self.conn.prepare("SELECT COUNT(*) FROM listings WHERE url = ?")?;
        let n: i64 = stmt.query_row(params![url], |r| r.get(0))?;
        Ok(n > 0)
    }

    /// Batch insert, ignore-on-conflict by URL. Returns the number of rows
    /// actually written; re-inserting the same listing is a no-op.
    pub fn insert_listings(&self, batch: &[Listing]) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }

        let tx = self.conn.unchecked_transaction()?;
        let sql = r#"
            INSERT INTO listings
                (url, model, year, price, mileage_text, scraped_at, roi, score, relevant)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (url) DO NOTHING
        "#;

        let mut written = 0usize;
        for l in batch {
            written += tx
                .execute(sql, params![
                    l.url, l.model, l.year, l.price,
                    l.mileage_text, l.scraped_at,
                    l.roi, l.score, l.relevant,
                ])
                .with_context(|| format!("insert listing {}", l.url))?;
        }

        tx.commit()?;
        Ok(written)
    }

    /// Minimum recorded price for a model within ±tolerance years, or None.
    pub fn reference_min_price(&self, model: &str, year: i32, tolerance: i32) -> Result<Option<i64>> {
        let mut stmt = self.conn.prepare(
            "SELECT MIN(price) FROM listings WHERE model = ? AND abs(year - ?) <= ?",
        )?;
        let min: Option<i64> = stmt.query_row(params![model, year, tolerance], |r| r.get(0))?;
        Ok(min)
    }

    pub fn listing_count(&self) -> Result<i64> {
        let mut s = self.conn.prepare("SELECT COUNT(*) FROM listings")?;
        Ok(s.query_row([], |r| r.get(0))?)
    }

    pub fn relevant_count(&self) -> Result<i64> {
        let mut s = self.conn.prepare("SELECT COUNT(*) FROM listings WHERE relevant")?;
        Ok(s.query_row([], |r| r.get(0))?)
    }

    pub fn date_range(&self) -> Result<(Option<chrono::NaiveDate>, Option<chrono::NaiveDate>)> {
        let mut s = self.conn.prepare("SELECT MIN(scraped_at), MAX(scraped_at) FROM listings")?;
        Ok(s.query_row([], |r| Ok((r.get(0)?, r.get(1)?)))?)
    }

    // ── Progress cursors ──────────────────────────────────────────────────────

    /// Replace-style write; one cursor row per model.
    pub fn record_progress(&self, model: &str, last_url: &str, ts: NaiveDateTime) -> Result<()> {
        self.conn.execute(
            r#"INSERT INTO progress (model, last_url, timestamp)
               VALUES (?, ?, ?)
               ON CONFLICT (model) DO UPDATE SET
                   last_url = excluded.last_url,
                   timestamp = excluded.timestamp"#,
            params![model, last_url, ts],
        )?;
        Ok(())
    }

    pub fn get_progress(&self, model: &str) -> Result<Option<String>> {
        let mut stmt = self.conn.prepare("SELECT last_url FROM progress WHERE model = ?")?;
        let url = stmt.query_row(params![model], |r| r.get(0)).ok();
        Ok(url)
    }

    pub fn list_progress(&self) -> Result<Vec<ProgressCursor>> {
        let mut stmt = self
            .conn
            .prepare("SELECT model, last_url, timestamp FROM progress ORDER BY model")?;
        let cursors: Vec<ProgressCursor> = stmt
            .query_map([], |r| {
                Ok(ProgressCursor { model: r.get(0)?, last_url: r.get(1)?, timestamp: r.get(2)? })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(cursors)
    }

    // ── Yield queries ─────────────────────────────────────────────────────────

    /// `count(score ≥ 4) / count(*)` over the last N days; 0 with no rows.
    pub fn model_yield(&self, model: &str, days: i64) -> Result<f64> {
        let cutoff = Local::now().date_naive() - chrono::Duration::days(days);
        let mut stmt = self.conn.prepare(
            r#"SELECT COUNT(*) FILTER (WHERE score >= 4), COUNT(*)
               FROM listings WHERE model = ? AND scraped_at >= ?"#,
        )?;
        let (good, total): (i64, i64) =
            stmt.query_row(params![model, cutoff], |r| Ok((r.get(0)?, r.get(1)?)))?;
        if total == 0 {
            return Ok(0.0);
        }
        Ok(good as f64 / total as f64)
    }

    /// Models whose recent yield ratio sits below the threshold.
    pub fn low_yield_models(&self, threshold: f64, days: i64) -> Result<Vec<String>> {
        let cutoff = Local::now().date_naive() - chrono::Duration::days(days);
        let mut stmt = self.conn.prepare(
            r#"SELECT model FROM listings
               WHERE scraped_at >= ?
               GROUP BY model
               HAVING CAST(COUNT(*) FILTER (WHERE score >= 4) AS DOUBLE) / COUNT(*) < ?
               ORDER BY model"#,
        )?;
        let models: Vec<String> = stmt
            .query_map(params![cutoff, threshold], |r| r.get(0))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(models)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;

    fn listing(url: &str, model: &str, year: i32, price: i64, score: i32) -> Listing {
        Listing {
            url: url.to_string(),
            model: model.to_string(),
            year,
            price,
            mileage_text: String::new(),
            scraped_at: Local::now().date_naive(),
            roi: 0.0,
            score,
            relevant: score >= 4,
        }
    }

    fn repo() -> Repository {
        let r = Repository::open_in_memory().unwrap();
        r.run_migrations().unwrap();
        r
    }

    #[test]
    fn insert_is_idempotent_by_url() {
        let repo = repo();
        let l = listing("https://www.facebook.com/marketplace/item/1", "yaris", 2015, 45_000, 5);

        assert_eq!(repo.insert_listings(&[l.clone()]).unwrap(), 1);
        for _ in 0..3 {
            assert_eq!(repo.insert_listings(&[l.clone()]).unwrap(), 0);
        }
        assert_eq!(repo.listing_count().unwrap(), 1);
        assert!(repo.exists("https://www.facebook.com/marketplace/item/1").unwrap());
        assert!(!repo.exists("https://www.facebook.com/marketplace/item/2").unwrap());
    }

    #[test]
    fn reference_min_price_respects_tolerance() {
        let repo = repo();
        repo.insert_listings(&[
            listing("https://www.facebook.com/marketplace/item/1", "yaris", 2014, 40_000, 5),
            listing("https://www.facebook.com/marketplace/item/2", "yaris", 2015, 38_000, 5),
            listing("https://www.facebook.com/marketplace/item/3", "yaris", 2020, 60_000, 5),
            listing("https://www.facebook.com/marketplace/item/4", "civic", 2015, 10_000, 5),
        ])
        .unwrap();

        // 2015 ± 2 sees 2014 and 2015, not 2020; civic rows never bleed in.
        assert_eq!(repo.reference_min_price("yaris", 2015, 2).unwrap(), Some(38_000));
        assert_eq!(repo.reference_min_price("yaris", 2021, 2).unwrap(), Some(60_000));
        assert_eq!(repo.reference_min_price("yaris", 2005, 2).unwrap(), None);
        assert_eq!(repo.reference_min_price("sentra", 2015, 2).unwrap(), None);
    }

    #[test]
    fn progress_replace_semantics() {
        let repo = repo();
        let now = Local::now().naive_local();

        assert_eq!(repo.get_progress("yaris").unwrap(), None);

        repo.record_progress("yaris", "https://www.facebook.com/marketplace/item/55555", now)
            .unwrap();
        assert_eq!(
            repo.get_progress("yaris").unwrap().as_deref(),
            Some("https://www.facebook.com/marketplace/item/55555")
        );

        repo.record_progress("yaris", "https://www.facebook.com/marketplace/item/66666", now)
            .unwrap();
        assert_eq!(
            repo.get_progress("yaris").unwrap().as_deref(),
            Some("https://www.facebook.com/marketplace/item/66666")
        );
        assert_eq!(repo.list_progress().unwrap().len(), 1);
    }

    #[test]
    fn yield_ratio_and_low_yield() {
        let repo = repo();
        repo.insert_listings(&[
            listing("https://www.facebook.com/marketplace/item/1", "yaris", 2015, 45_000, 6),
            listing("https://www.facebook.com/marketplace/item/2", "yaris", 2014, 40_000, 2),
            listing("https://www.facebook.com/marketplace/item/3", "sentra", 2012, 30_000, 1),
            listing("https://www.facebook.com/marketplace/item/4", "sentra", 2013, 30_000, 2),
        ])
        .unwrap();

        assert_eq!(repo.model_yield("yaris", 30).unwrap(), 0.5);
        assert_eq!(repo.model_yield("sentra", 30).unwrap(), 0.0);
        assert_eq!(repo.model_yield("civic", 30).unwrap(), 0.0);

        let low = repo.low_yield_models(0.4, 30).unwrap();
        assert_eq!(low, vec!["sentra".to_string()]);
    }

    #[test]
    fn relevant_flag_matches_score_threshold() {
        let repo = repo();
        repo.insert_listings(&[
            listing("https://www.facebook.com/marketplace/item/1", "yaris", 2015, 45_000, 4),
            listing("https://www.facebook.com/marketplace/item/2", "yaris", 2015, 45_000, 3),
        ])
        .unwrap();
        assert_eq!(repo.relevant_count().unwrap(), 1);
        assert_eq!(repo.listing_count().unwrap(), 2);
    }
}
