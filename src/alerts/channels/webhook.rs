//! Generic JSON webhook channel

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::alerts::notifier::{AlertMessage, ChannelError, NotificationChannel};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// POSTs the alert payload as JSON to a URL
pub struct WebhookChannel {
    url: String,
    headers: HashMap<String, String>,
    client: reqwest::Client,
}

impl WebhookChannel {
    pub fn new(url: impl Into<String>) -> Result<Self, ChannelError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ChannelError::Transport(e.to_string()))?;
        Ok(Self {
            url: url.into(),
            headers: HashMap::new(),
            client,
        })
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Configure from `ALERT_WEBHOOK_URL`
    pub fn from_env() -> Option<Self> {
        let url = std::env::var("ALERT_WEBHOOK_URL")
            .ok()
            .filter(|u| !u.trim().is_empty())?;
        match Self::new(url) {
            Ok(channel) => Some(channel),
            Err(e) => {
                tracing::error!(error = %e, "Failed to configure webhook alerts");
                None
            }
        }
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn deliver(&self, alert: &AlertMessage) -> Result<bool, ChannelError> {
        let mut request = self.client.post(&self.url).json(alert);
        for (key, value) in &self.headers {
            request = request.header(key, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ChannelError::Transport(format!("Failed to send webhook: {}", e)))?;

        if !response.status().is_success() {
            return Err(ChannelError::Rejected {
                status: response.status().as_u16(),
                description: format!("Webhook returned status {}", response.status()),
            });
        }

        tracing::debug!(url = %self.url, "Webhook notification sent");
        Ok(true)
    }

    async fn test_connection(&self) -> Result<bool, ChannelError> {
        let response = self
            .client
            .head(&self.url)
            .send()
            .await
            .map_err(|e| ChannelError::Transport(e.to_string()))?;
        // Any answer proves reachability; many hooks reject HEAD
        Ok(!response.status().is_server_error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::Severity;
    use axum::{http::HeaderMap, routing::post, Json, Router};
    use parking_lot::Mutex;
    use serde_json::Value;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_webhook_posts_alert() {
        let captured: Arc<Mutex<Vec<(Option<String>, Value)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = captured.clone();
        let app = Router::new().route(
            "/hook",
            post(move |headers: HeaderMap, Json(body): Json<Value>| {
                let sink = sink.clone();
                async move {
                    let token = headers
                        .get("x-token")
                        .and_then(|v| v.to_str().ok())
                        .map(String::from);
                    sink.lock().push((token, body));
                    "ok"
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let channel = WebhookChannel::new(format!("http://{}/hook", addr))
            .unwrap()
            .with_header("x-token", "secret");
        let alert = AlertMessage::new("Disk full", "95% used", Severity::Error, "storage");

        assert!(channel.deliver(&alert).await.unwrap());

        let sent = captured.lock();
        assert_eq!(sent[0].0.as_deref(), Some("secret"));
        assert_eq!(sent[0].1["title"], "Disk full");
        assert_eq!(sent[0].1["severity"], "error");
    }

    #[tokio::test]
    async fn test_webhook_error_status() {
        let app = Router::new().route(
            "/hook",
            post(|| async { (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let channel = WebhookChannel::new(format!("http://{}/hook", addr)).unwrap();
        let alert = AlertMessage::new("x", "y", Severity::Info, "svc");
        assert!(matches!(
            channel.deliver(&alert).await,
            Err(ChannelError::Rejected { status: 500, .. })
        ));
    }
}
