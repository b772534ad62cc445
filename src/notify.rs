use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::NotifyConfig;

/// Outbound progress reporting. Implementations must never fail the caller;
/// delivery problems are logged and dropped.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str);
}

/// Chat-compatible webhook (`{"content": ...}` POST body).
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(client: Client, url: String) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, message: &str) {
        let body = serde_json::json!({ "content": message });
        match self.client.post(&self.url).json(&body).send().await {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                warn!(target: "rickhouse.notify", status = %response.status(), "webhook rejected message");
            }
            Err(err) => {
                warn!(target: "rickhouse.notify", error = %err, "webhook delivery failed");
            }
        }
    }
}

pub struct ConsoleNotifier;

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn notify(&self, message: &str) {
        info!(target: "rickhouse.notify", "{message}");
    }
}

pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn notify(&self, _message: &str) {}
}

#[derive(Debug, PartialEq, Eq)]
enum Mode {
    Off,
    Console,
    Webhook,
}

fn select_mode(cfg: &NotifyConfig) -> Mode {
    match cfg.mode.as_str() {
        "off" => Mode::Off,
        "console" => Mode::Console,
        "webhook" if cfg.webhook_url.is_some() => Mode::Webhook,
        "webhook" => {
            warn!(target: "rickhouse.notify", "NOTIFY_MODE=webhook but no NOTIFY_WEBHOOK_URL; using console");
            Mode::Console
        }
        _ if cfg.webhook_url.is_some() => Mode::Webhook,
        _ => Mode::Console,
    }
}

pub fn from_config(cfg: &NotifyConfig, client: Client) -> Arc<dyn Notifier> {
    match select_mode(cfg) {
        Mode::Off => Arc::new(NullNotifier),
        Mode::Console => Arc::new(ConsoleNotifier),
        Mode::Webhook => {
            let url = cfg.webhook_url.clone().unwrap_or_default();
            Arc::new(WebhookNotifier::new(client, url))
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(mode: &str, url: Option<&str>) -> NotifyConfig {
        NotifyConfig {
            webhook_url: url.map(String::from),
            mode: mode.into(),
        }
    }

    #[test]
    fn mode_selection_prefers_explicit_setting() {
        assert_eq!(select_mode(&cfg("off", Some("https://h/x"))), Mode::Off);
        assert_eq!(select_mode(&cfg("console", Some("https://h/x"))), Mode::Console);
        assert_eq!(select_mode(&cfg("webhook", Some("https://h/x"))), Mode::Webhook);
        assert_eq!(select_mode(&cfg("webhook", None)), Mode::Console);
    }

    #[test]
    fn default_mode_follows_url_presence() {
        assert_eq!(select_mode(&cfg("", Some("https://h/x"))), Mode::Webhook);
        assert_eq!(select_mode(&cfg("", None)), Mode::Console);
    }
}
