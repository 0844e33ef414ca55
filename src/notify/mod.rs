//! Outbound messaging boundary: a `Notifier` trait the orchestrator talks
//! to, a Telegram implementation, and a log-only implementation for dry
//! runs. Sends are serial, paced at ≥1 s and retried 3× on transport error.

use async_trait::async_trait;
use serde_json::json;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use url::Url;

pub const SEND_RETRIES: u32 = 3;
pub const SEND_RETRY_SLEEP: Duration = Duration::from_secs(1);
pub const SEND_PACING: Duration = Duration::from_secs(1);

/// Upper bound for one digest chunk.
pub const DIGEST_CHUNK_CHARS: usize = 3_000;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("telegram rejected the message: {0}")]
    Rejected(String),
}

// ── Trait ─────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_text(&self, text: &str) -> Result<(), NotifyError>;
    /// Message with an inline "View listing" action.
    async fn send_text_with_button(&self, text: &str, url: &str) -> Result<(), NotifyError>;
}

// ── Formatting helpers ────────────────────────────────────────────────────────

/// Escape for Telegram MarkdownV2.
pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(
            c,
            '_' | '*' | '[' | ']' | '(' | ')' | '~' | '`' | '>' | '#' | '+' | '-' | '=' | '|'
                | '{' | '}' | '.' | '!'
        ) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Inline buttons require an https URL with no whitespace.
pub fn valid_button_url(raw: &str) -> bool {
    if raw.chars().any(char::is_whitespace) {
        return false;
    }
    matches!(Url::parse(raw), Ok(u) if u.scheme() == "https")
}

/// Pack lines into chunks of at most `max_chars`, preserving order and
/// never splitting a line.
pub fn chunk_digest(lines: &[String], max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for line in lines {
        if !current.is_empty() && current.len() + 1 + line.len() > max_chars {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

// ── Telegram ──────────────────────────────────────────────────────────────────

pub struct TelegramNotifier {
    client: reqwest::Client,
    token: String,
    chat_id: i64,
    last_send: Mutex<Option<Instant>>,
}

impl TelegramNotifier {
    pub fn new(token: String, chat_id: i64) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
            chat_id,
            last_send: Mutex::new(None),
        }
    }

    fn endpoint(&self) -> String {
        format!("https://api.telegram.org/bot{}/sendMessage", self.token)
    }

    /// Keep ≥1 s between consecutive sends.
    async fn pace(&self) {
        let mut last = self.last_send.lock().await;
        if let Some(at) = *last {
            let since = at.elapsed();
            if since < SEND_PACING {
                sleep(SEND_PACING - since).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn post(&self, body: serde_json::Value) -> Result<(), NotifyError> {
        self.pace().await;

        let mut last_err = NotifyError::Transport("no attempts made".to_string());
        for attempt in 1..=SEND_RETRIES {
            debug!("sendMessage attempt {}", attempt);
            match self.client.post(self.endpoint()).json(&body).send().await {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                Ok(resp) => {
                    let status = resp.status();
                    let detail = resp.text().await.unwrap_or_default();
                    // 4xx means the payload is wrong; retrying won't help.
                    if status.is_client_error() {
                        return Err(NotifyError::Rejected(format!("{}: {}", status, detail)));
                    }
                    last_err = NotifyError::Transport(format!("{}: {}", status, detail));
                }
                Err(e) => {
                    warn!("sendMessage attempt {} failed: {}", attempt, e);
                    last_err = NotifyError::Transport(e.to_string());
                }
            }
            sleep(SEND_RETRY_SLEEP).await;
        }
        Err(last_err)
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send_text(&self, text: &str) -> Result<(), NotifyError> {
        self.post(json!({
            "chat_id": self.chat_id,
            "text": escape_markdown(text),
            "parse_mode": "MarkdownV2",
            "disable_web_page_preview": true,
        }))
        .await
    }

    async fn send_text_with_button(&self, text: &str, url: &str) -> Result<(), NotifyError> {
        // Fall back to embedding the URL when it can't back a button.
        if !valid_button_url(url) {
            return self.send_text(&format!("{}\n{}", text, url)).await;
        }
        self.post(json!({
            "chat_id": self.chat_id,
            "text": escape_markdown(text),
            "parse_mode": "MarkdownV2",
            "disable_web_page_preview": true,
            "reply_markup": {
                "inline_keyboard": [[{ "text": "View listing", "url": url }]]
            },
        }))
        .await
    }
}

// ── Dry-run notifier ──────────────────────────────────────────────────────────

/// Logs instead of sending; backs `--dry-run`.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_text(&self, text: &str) -> Result<(), NotifyError> {
        info!("[dry-run] {}", text);
        Ok(())
    }

    async fn send_text_with_button(&self, text: &str, url: &str) -> Result<(), NotifyError> {
        info!("[dry-run] {} [View listing → {}]", text, url);
        Ok(())
    }
}
