//! Telegram Bot API channel

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::format::{escape_html, format_value, MessageStyle};
use crate::alerts::notifier::{AlertMessage, ChannelError, NotificationChannel};
use crate::alerts::templates::StatusUpdate;

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Bot credentials and target chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
    pub api_base: String,
}

impl TelegramConfig {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Read `TELEGRAM_BOT_TOKEN`, `TELEGRAM_CHAT_ID` and `TELEGRAM_API_URL`
    pub fn from_env() -> Option<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// `None` when the token or chat id is missing
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let config = Self::new(get("TELEGRAM_BOT_TOKEN")?, get("TELEGRAM_CHAT_ID")?);
        Some(match get("TELEGRAM_API_URL") {
            Some(base) => config.with_api_base(base),
            None => config,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.api_base.trim_end_matches('/'),
            self.bot_token,
            method
        )
    }
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

#[derive(Debug, Serialize)]
struct BotCommand {
    command: &'static str,
    description: &'static str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Commands advertised in the bot menu
const BOT_COMMANDS: [(&str, &str); 4] = [
    ("status", "Get current system status"),
    ("health", "Check system health"),
    ("metrics", "View key metrics"),
    ("alerts", "List active alerts"),
];

/// Posts alerts to a chat through `sendMessage`
pub struct TelegramChannel {
    config: Option<TelegramConfig>,
    client: reqwest::Client,
    style: MessageStyle,
}

impl TelegramChannel {
    pub fn new(config: TelegramConfig, style: MessageStyle) -> Result<Self, ChannelError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ChannelError::Transport(e.to_string()))?;

        tracing::info!(api_base = %config.api_base, "Telegram alerts configured");

        Ok(Self {
            config: Some(config),
            client,
            style,
        })
    }

    pub fn disabled(style: MessageStyle) -> Self {
        Self {
            config: None,
            client: reqwest::Client::new(),
            style,
        }
    }

    /// Configure from the environment, falling back to a disabled channel
    pub fn from_env(style: MessageStyle) -> Self {
        match TelegramConfig::from_env() {
            Some(config) => match Self::new(config, style.clone()) {
                Ok(channel) => channel,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to configure Telegram alerts");
                    Self::disabled(style)
                }
            },
            None => Self::disabled(style),
        }
    }

    fn config(&self) -> Result<&TelegramConfig, ChannelError> {
        self.config
            .as_ref()
            .ok_or_else(|| ChannelError::NotConfigured("telegram".to_string()))
    }

    async fn call<T: Serialize + ?Sized>(&self, method: &str, body: &T) -> Result<bool, ChannelError> {
        let config = self.config()?;
        let response = self
            .client
            .post(config.method_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| ChannelError::Transport(e.to_string()))?;

        let status = response.status();
        let parsed: ApiResponse = response
            .json()
            .await
            .map_err(|e| ChannelError::Transport(format!("invalid response: {e}")))?;

        if parsed.ok {
            Ok(true)
        } else {
            Err(ChannelError::Rejected {
                status: status.as_u16(),
                description: parsed.description.unwrap_or_default(),
            })
        }
    }

    async fn send_text(&self, text: &str) -> Result<bool, ChannelError> {
        let config = self.config()?;
        self.call(
            "sendMessage",
            &SendMessage {
                chat_id: &config.chat_id,
                text,
                parse_mode: "HTML",
                disable_web_page_preview: true,
            },
        )
        .await
    }

    /// Publish the bot command menu
    pub async fn register_commands(&self) -> Result<(), ChannelError> {
        let commands: Vec<BotCommand> = BOT_COMMANDS
            .iter()
            .map(|&(command, description)| BotCommand {
                command,
                description,
            })
            .collect();

        self.call("setMyCommands", &serde_json::json!({ "commands": commands }))
            .await?;
        tracing::info!("Telegram bot commands configured");
        Ok(())
    }
}

#[async_trait]
impl NotificationChannel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    fn is_enabled(&self) -> bool {
        self.config.is_some()
    }

    async fn deliver(&self, alert: &AlertMessage) -> Result<bool, ChannelError> {
        self.send_text(&render_alert(&self.style, alert)).await
    }

    async fn test_connection(&self) -> Result<bool, ChannelError> {
        if self.config.is_none() {
            return Ok(false);
        }
        let text = format!(
            "🧪 <b>{} Health Dashboard Test</b>\n\nTelegram notifications are working correctly!\n\n✅ Connection test successful",
            escape_html(&self.style.product)
        );
        self.send_text(&text).await
    }

    async fn send_status_update(&self, update: &StatusUpdate) -> Result<bool, ChannelError> {
        self.send_text(&render_status_update(&self.style, update))
            .await
    }
}

/// Alert as Telegram HTML
pub fn render_alert(style: &MessageStyle, alert: &AlertMessage) -> String {
    let metric = alert.metric.as_deref();
    let mut text = format!(
        "{} <b>{} System Alert</b>\n\n🚨 <b>{}</b>\n\n📊 <b>Details:</b>\n",
        alert.severity.emoji(),
        escape_html(&style.product),
        escape_html(&alert.title)
    );

    text.push_str(&format!("• Service: <code>{}</code>\n", escape_html(&alert.service)));
    text.push_str(&format!(
        "• Severity: <code>{}</code>\n",
        alert.severity.as_str().to_uppercase()
    ));
    if let Some(metric) = metric {
        text.push_str(&format!("• Metric: <code>{}</code>\n", escape_html(metric)));
    }
    if let Some(value) = alert.current_value {
        text.push_str(&format!(
            "• Current Value: <code>{}</code>\n",
            format_value(value, metric)
        ));
    }
    if let Some(threshold) = alert.threshold {
        text.push_str(&format!(
            "• Threshold: <code>{}</code>\n",
            format_value(threshold, metric)
        ));
    }
    text.push_str(&format!(
        "• Time: <code>{}</code> ({})\n\n",
        style.zone.format(alert.timestamp),
        escape_html(&style.zone.label)
    ));

    text.push_str(&format!(
        "📝 <b>Description:</b>\n{}\n\n",
        escape_html(&alert.message)
    ));
    text.push_str(&format!(
        "🔗 <a href=\"{}\">View Dashboard</a>\n🔧 <a href=\"{}\">Check System Health</a>",
        escape_html(&style.dashboard_url),
        escape_html(&style.health_url())
    ));
    text
}

/// Status update as Telegram HTML
pub fn render_status_update(style: &MessageStyle, update: &StatusUpdate) -> String {
    let mut text = format!(
        "{} <b>{} Status Update</b>\n\nSystem Status: <code>{}</code>\n",
        update.status.emoji(),
        escape_html(&style.product),
        update.status.label()
    );
    if let Some(details) = &update.details {
        text.push_str(&format!("\n📝 Details: {}\n", escape_html(details)));
    }
    text.push_str(&format!(
        "\n🕐 {} ({})",
        style.zone.format(update.timestamp),
        escape_html(&style.zone.label)
    ));
    text
}
