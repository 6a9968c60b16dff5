// src/notify.rs

//! Error notification sinks.
//!
//! The pipeline and the display driver only know the [`Notifier`] trait.
//! [`RateLimitedNotifier`] keeps a flapping panel from flooding the channel.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::{Context, anyhow};
use serde_json::json;
use tracing::{error, info, warn};

use crate::config::{NotifySection, SlackSection};
use crate::errors::Result;
use crate::liveness;

/// Messages longer than this many lines are split across several posts.
pub const LINES_PER_MESSAGE: usize = 20;

const SLACK_POST_URL: &str = "https://slack.com/api/chat.postMessage";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub type NotifyFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Somewhere to report failures a human should look at.
pub trait Notifier: Send + Sync {
    fn notify_error<'a>(&'a self, message: &'a str) -> NotifyFuture<'a>;
}

/// Logs the message and nothing else.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify_error<'a>(&'a self, message: &'a str) -> NotifyFuture<'a> {
        Box::pin(async move {
            error!(message = %message, "error notification");
            Ok(())
        })
    }
}

/// Posts to a Slack channel through `chat.postMessage`.
#[derive(Debug, Clone)]
pub struct SlackNotifier {
    client: reqwest::Client,
    config: SlackSection,
    endpoint: String,
}

impl SlackNotifier {
    pub fn new(config: SlackSection) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("building HTTP client for Slack")?;
        Ok(Self {
            client,
            config,
            endpoint: SLACK_POST_URL.to_string(),
        })
    }

    /// Post to a different API endpoint (tests, proxies).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn post(&self, title: &str, text: &str) -> Result<()> {
        let payload = json!({
            "channel": self.config.channel,
            "text": text,
            "blocks": [
                {
                    "type": "header",
                    "text": { "type": "plain_text", "text": title, "emoji": true }
                },
                {
                    "type": "section",
                    "text": { "type": "mrkdwn", "text": text }
                }
            ]
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.config.bot_token)
            .json(&payload)
            .send()
            .await
            .context("posting to Slack")?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("Slack returned HTTP {}", status.as_u16()).into());
        }

        // Slack reports API-level failures with 200 and `ok: false`.
        let body: serde_json::Value = response.json().await.context("reading Slack reply")?;
        if body.get("ok").and_then(|v| v.as_bool()) != Some(true) {
            let reason = body
                .get("error")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown error");
            return Err(anyhow!("Slack API error: {reason}").into());
        }
        Ok(())
    }
}

impl Notifier for SlackNotifier {
    fn notify_error<'a>(&'a self, message: &'a str) -> NotifyFuture<'a> {
        Box::pin(async move {
            let title = format!("Error: {}", self.config.from);
            info!(channel = %self.config.channel, "posting error to Slack");
            for chunk in split_lines(message, LINES_PER_MESSAGE) {
                self.post(&title, &chunk).await?;
            }
            Ok(())
        })
    }
}

/// Group `message` into blocks of at most `per_chunk` lines.
pub fn split_lines(message: &str, per_chunk: usize) -> Vec<String> {
    let lines: Vec<&str> = message.lines().collect();
    lines
        .chunks(per_chunk.max(1))
        .map(|chunk| chunk.join("\n"))
        .collect()
}

/// Suppresses notifications sent less than `interval` after the previous one.
///
/// The time of the last notification is the mtime of a footprint file, so the
/// limit holds across the short-lived `render` processes.
pub struct RateLimitedNotifier {
    inner: Arc<dyn Notifier>,
    footprint: PathBuf,
    interval: Duration,
}

impl RateLimitedNotifier {
    pub fn new(inner: Arc<dyn Notifier>, footprint: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            inner,
            footprint: footprint.into(),
            interval,
        }
    }

    fn recently_notified(&self) -> bool {
        std::fs::metadata(&self.footprint)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|mtime| SystemTime::now().duration_since(mtime).ok())
            .is_some_and(|age| age < self.interval)
    }
}

impl Notifier for RateLimitedNotifier {
    fn notify_error<'a>(&'a self, message: &'a str) -> NotifyFuture<'a> {
        Box::pin(async move {
            if self.recently_notified() {
                warn!(footprint = ?self.footprint, "notification interval too short; skipping");
                return Ok(());
            }
            self.inner.notify_error(message).await?;
            liveness::touch(&self.footprint)
        })
    }
}

/// Notifier described by `[notify]`: Slack when configured, log otherwise,
/// always rate limited.
pub fn from_config(section: &NotifySection) -> Result<Arc<dyn Notifier>> {
    let inner: Arc<dyn Notifier> = match section.slack {
        Some(ref slack) => Arc::new(SlackNotifier::new(slack.clone())?),
        None => Arc::new(LogNotifier),
    };
    Ok(Arc::new(RateLimitedNotifier::new(
        inner,
        &section.footprint,
        Duration::from_secs(section.interval_min * 60),
    )))
}

/// Send and swallow failures; notification problems never change a result.
pub async fn notify_quietly(notifier: &dyn Notifier, message: &str) {
    if let Err(e) = notifier.notify_error(message).await {
        warn!(error = %e, "failed to send error notification");
    }
}
