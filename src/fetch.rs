//! Narrow fetch interfaces over the external document and channel sources.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("could not extract a document id from url '{0}'")]
    UnsupportedUrl(String),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("source returned HTTP {status} for {url}")]
    Status { status: u16, url: String },
    #[error("{0}")]
    MissingCredentials(String),
    #[error("channel fetch failed: {0}")]
    Channel(String),
}

#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    async fn fetch_document(&self, url: &str) -> Result<String, FetchError>;
}

#[async_trait]
pub trait ChannelFetcher: Send + Sync {
    async fn fetch_channel_messages(
        &self,
        channel_id: &str,
        limit: usize,
    ) -> Result<String, FetchError>;
}

static DOC_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"docs\.google\.com/(document|spreadsheets)/d/([a-zA-Z0-9_-]+)")
        .expect("doc-id pattern")
});
static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("tag pattern"));
static BLANK_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{2,}").expect("blank-run pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoogleDocKind {
    Document,
    Spreadsheet,
}

/// Parse the document id out of the common docs.google.com URL shapes
/// (`/document/d/<id>/edit`, `/spreadsheets/d/<id>/edit?usp=sharing`, ...).
pub fn extract_document_id(url: &str) -> Option<(GoogleDocKind, String)> {
    let captures = DOC_ID.captures(url)?;
    let kind = match &captures[1] {
        "document" => GoogleDocKind::Document,
        _ => GoogleDocKind::Spreadsheet,
    };
    Some((kind, captures[2].to_string()))
}

/// Fetches Google Docs/Sheets through the anonymous export endpoints, which
/// work for documents shared as "Anyone with the link".
pub struct GoogleDocFetcher {
    http: reqwest::Client,
}

impl GoogleDocFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { http })
    }

    fn export_urls(kind: GoogleDocKind, document_id: &str) -> Vec<String> {
        match kind {
            GoogleDocKind::Document => vec![
                format!("https://docs.google.com/document/d/{document_id}/export?format=txt"),
                format!("https://docs.google.com/document/d/{document_id}/export?format=html"),
            ],
            GoogleDocKind::Spreadsheet => vec![format!(
                "https://docs.google.com/spreadsheets/d/{document_id}/export?format=csv"
            )],
        }
    }
}

#[async_trait]
impl DocumentFetcher for GoogleDocFetcher {
    async fn fetch_document(&self, url: &str) -> Result<String, FetchError> {
        let (kind, document_id) =
            extract_document_id(url).ok_or_else(|| FetchError::UnsupportedUrl(url.to_string()))?;

        let mut last_error = None;
        for export_url in Self::export_urls(kind, &document_id) {
            let response = match self.http.get(&export_url).send().await {
                Ok(response) => response,
                Err(err) => {
                    last_error = Some(FetchError::Http(err));
                    continue;
                }
            };

            if response.status().is_success() {
                let text = response.text().await?;
                return Ok(normalize_export_text(&text));
            }

            last_error = Some(FetchError::Status {
                status: response.status().as_u16(),
                url: export_url,
            });
        }

        Err(last_error.unwrap_or_else(|| FetchError::UnsupportedUrl(url.to_string())))
    }
}

/// The html export fallback needs a light tag strip; plain text passes
/// through untouched.
fn normalize_export_text(text: &str) -> String {
    if text.to_ascii_lowercase().contains("<html") {
        let stripped = HTML_TAG.replace_all(text, "\n");
        BLANK_RUNS.replace_all(&stripped, "\n\n").trim().to_string()
    } else {
        text.trim().to_string()
    }
}

#[derive(Debug, Deserialize)]
struct SlackHistoryResponse {
    ok: bool,
    error: Option<String>,
    #[serde(default)]
    messages: Vec<SlackMessage>,
}

#[derive(Debug, Deserialize)]
struct SlackMessage {
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    ts: Option<String>,
}

/// Reads channel history through the Slack Web API with a bot token from
/// `SLACK_BOT_TOKEN`.
pub struct SlackChannelFetcher {
    http: reqwest::Client,
    token: Option<String>,
}

impl SlackChannelFetcher {
    pub fn from_env() -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        let token = std::env::var("SLACK_BOT_TOKEN")
            .ok()
            .filter(|value| !value.trim().is_empty());
        Ok(Self { http, token })
    }
}

#[async_trait]
impl ChannelFetcher for SlackChannelFetcher {
    async fn fetch_channel_messages(
        &self,
        channel_id: &str,
        limit: usize,
    ) -> Result<String, FetchError> {
        let token = self.token.as_deref().ok_or_else(|| {
            FetchError::MissingCredentials("SLACK_BOT_TOKEN is not set".to_string())
        })?;

        let limit = limit.to_string();
        let response = self
            .http
            .get("https://slack.com/api/conversations.history")
            .bearer_auth(token)
            .query(&[("channel", channel_id), ("limit", limit.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                status: response.status().as_u16(),
                url: "https://slack.com/api/conversations.history".to_string(),
            });
        }

        let history: SlackHistoryResponse = response.json().await?;
        if !history.ok {
            return Err(FetchError::Channel(
                history.error.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }

        // Slack returns newest first; the digest reads oldest to newest.
        let mut lines = Vec::with_capacity(history.messages.len());
        for message in history.messages.iter().rev() {
            let text = message.text.as_deref().unwrap_or_default().trim();
            if text.is_empty() {
                continue;
            }
            lines.push(format!(
                "[{}] {}: {}",
                message.ts.as_deref().unwrap_or("-"),
                message.user.as_deref().unwrap_or("unknown"),
                text
            ));
        }

        Ok(lines.join("\n"))
    }
}
