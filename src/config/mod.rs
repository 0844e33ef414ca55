use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub harvester: HarvesterConfig,
    pub storage: StorageConfig,
}

/// Scrape-orchestrator configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HarvesterConfig {
    #[serde(default = "default_region")]
    pub region: String,

    #[serde(default = "default_model_timeout_secs")]
    pub model_timeout_secs: u64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_batch_insert_size")]
    pub batch_insert_size: usize,

    #[serde(default = "default_scroll_pixels")]
    pub scroll_pixels: u32,

    #[serde(default = "default_scroll_delay_min_ms")]
    pub scroll_delay_min_ms: u64,

    #[serde(default = "default_scroll_delay_max_ms")]
    pub scroll_delay_max_ms: u64,

    #[serde(default = "default_nav_retries")]
    pub nav_retries: u32,

    #[serde(default = "default_nav_backoff_ms")]
    pub nav_backoff_ms: u64,

    #[serde(default = "default_extract_retries")]
    pub extract_retries: u32,

    #[serde(default = "default_extract_backoff_ms")]
    pub extract_backoff_ms: u64,

    #[serde(default = "default_cookies_path")]
    pub cookies_path: PathBuf,

    #[serde(default)]
    pub corrections_path: Option<PathBuf>,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_region() -> String {
    "guatemala".to_string()
}
fn default_model_timeout_secs() -> u64 {
    120
}
fn default_max_attempts() -> u32 {
    8
}
fn default_batch_insert_size() -> usize {
    50
}
fn default_scroll_pixels() -> u32 {
    400
}
fn default_scroll_delay_min_ms() -> u64 {
    500
}
fn default_scroll_delay_max_ms() -> u64 {
    1500
}
fn default_nav_retries() -> u32 {
    2
}
fn default_nav_backoff_ms() -> u64 {
    1000
}
fn default_extract_retries() -> u32 {
    3
}
fn default_extract_backoff_ms() -> u64 {
    500
}
fn default_cookies_path() -> PathBuf {
    PathBuf::from("fb_cookies.json")
}
fn default_db_path() -> PathBuf {
    PathBuf::from("upload-artifact/anuncios.db")
}
fn default_true() -> bool {
    true
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("SCOUT").separator("__"))
            .build()?;

        let mut app_cfg: AppConfig = cfg.try_deserialize().unwrap_or_else(|_| AppConfig::default());

        // Bare env vars kept for cron compatibility.
        if let Ok(path) = std::env::var("DB_PATH") {
            if !path.is_empty() {
                app_cfg.storage.db_path = PathBuf::from(path);
            }
        }

        Ok(app_cfg)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            harvester: HarvesterConfig::default(),
            storage: StorageConfig { db_path: default_db_path(), run_migrations: true },
        }
    }
}

impl Default for HarvesterConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            model_timeout_secs: default_model_timeout_secs(),
            max_attempts: default_max_attempts(),
            batch_insert_size: default_batch_insert_size(),
            scroll_pixels: default_scroll_pixels(),
            scroll_delay_min_ms: default_scroll_delay_min_ms(),
            scroll_delay_max_ms: default_scroll_delay_max_ms(),
            nav_retries: default_nav_retries(),
            nav_backoff_ms: default_nav_backoff_ms(),
            extract_retries: default_extract_retries(),
            extract_backoff_ms: default_extract_backoff_ms(),
            cookies_path: default_cookies_path(),
            corrections_path: None,
        }
    }
}

/// Required messaging credentials; absence is a fatal startup error.
pub struct TelegramEnv {
    pub bot_token: String,
    pub chat_id: i64,
}

impl TelegramEnv {
    pub fn from_env() -> Result<Self> {
        let bot_token = std::env::var("BOT_TOKEN").context("BOT_TOKEN is not set")?;
        let chat_id = std::env::var("CHAT_ID")
            .context("CHAT_ID is not set")?
            .parse()
            .context("CHAT_ID is not an integer")?;
        Ok(Self { bot_token, chat_id })
    }
}

/// `DEBUG` truthy flags enable timing logs.
pub fn debug_timing_enabled() -> bool {
    matches!(
        std::env::var("DEBUG").as_deref(),
        Ok("1") | Ok("true") | Ok("TRUE") | Ok("yes") | Ok("on")
    )
}
