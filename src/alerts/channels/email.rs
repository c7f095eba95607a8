//! SMTP email channel

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::format::{escape_html, format_value, MessageStyle};
use crate::alerts::notifier::{AlertMessage, ChannelError, NotificationChannel};

pub const DEFAULT_SMTP_PORT: u16 = 587;
const SMTP_TIMEOUT: Duration = Duration::from_secs(10);

/// SMTP settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
    pub to: Vec<String>,
}

impl EmailConfig {
    /// Read `SMTP_HOST`, `SMTP_PORT`, `SMTP_USER`, `SMTP_PASS`,
    /// `ALERT_EMAIL_FROM` and `ALERT_EMAIL_TO`
    pub fn from_env() -> Option<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build from a variable lookup. `None` when the host, credentials or
    /// recipients are missing.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let host = get("SMTP_HOST")?;
        let username = get("SMTP_USER")?;
        let password = get("SMTP_PASS")?;
        let to: Vec<String> = get("ALERT_EMAIL_TO")?
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if to.is_empty() {
            return None;
        }

        let port = get("SMTP_PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_SMTP_PORT);
        let from = get("ALERT_EMAIL_FROM").unwrap_or_else(|| username.clone());

        Some(Self {
            host,
            port,
            username,
            password,
            from,
            to,
        })
    }
}

struct Mailer {
    config: EmailConfig,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

/// Sends alerts as multipart (plain + HTML) email over STARTTLS
pub struct EmailChannel {
    mailer: Option<Mailer>,
    style: MessageStyle,
}

impl EmailChannel {
    pub fn new(config: EmailConfig, style: MessageStyle) -> Result<Self, ChannelError> {
        let creds = Credentials::new(config.username.clone(), config.password.clone());
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| ChannelError::Transport(format!("Failed to create SMTP transport: {e}")))?
            .credentials(creds)
            .port(config.port)
            .timeout(Some(SMTP_TIMEOUT))
            .build();

        tracing::info!(host = %config.host, port = config.port, "Email alerts configured");

        Ok(Self {
            mailer: Some(Mailer { config, transport }),
            style,
        })
    }

    /// A channel that reports itself as not configured
    pub fn disabled(style: MessageStyle) -> Self {
        Self {
            mailer: None,
            style,
        }
    }

    /// Configure from the environment, falling back to a disabled channel
    pub fn from_env(style: MessageStyle) -> Self {
        match EmailConfig::from_env() {
            Some(config) => match Self::new(config, style.clone()) {
                Ok(channel) => channel,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to configure email alerts");
                    Self::disabled(style)
                }
            },
            None => Self::disabled(style),
        }
    }

    fn build_message(&self, mailer: &Mailer, alert: &AlertMessage) -> Result<Message, ChannelError> {
        let from: Mailbox = mailer
            .config
            .from
            .parse()
            .map_err(|e| ChannelError::InvalidAddress(format!("from {}: {e}", mailer.config.from)))?;

        let mut builder = Message::builder()
            .from(from)
            .subject(render_subject(&self.style, alert));
        for to in &mailer.config.to {
            let mailbox: Mailbox = to
                .parse()
                .map_err(|e| ChannelError::InvalidAddress(format!("to {to}: {e}")))?;
            builder = builder.to(mailbox);
        }

        builder
            .multipart(MultiPart::alternative_plain_html(
                render_plain(&self.style, alert),
                render_html(&self.style, alert),
            ))
            .map_err(|e| ChannelError::Build(e.to_string()))
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn name(&self) -> &str {
        "email"
    }

    fn is_enabled(&self) -> bool {
        self.mailer.is_some()
    }

    async fn deliver(&self, alert: &AlertMessage) -> Result<bool, ChannelError> {
        let Some(mailer) = &self.mailer else {
            return Err(ChannelError::NotConfigured("email".to_string()));
        };

        let message = self.build_message(mailer, alert)?;
        let response = mailer
            .transport
            .send(message)
            .await
            .map_err(|e| ChannelError::Transport(e.to_string()))?;

        tracing::debug!(code = %response.code(), "Email alert accepted by SMTP server");
        Ok(response.is_positive())
    }

    async fn test_connection(&self) -> Result<bool, ChannelError> {
        let Some(mailer) = &self.mailer else {
            return Ok(false);
        };
        mailer
            .transport
            .test_connection()
            .await
            .map_err(|e| ChannelError::Transport(e.to_string()))
    }
}

pub fn render_subject(style: &MessageStyle, alert: &AlertMessage) -> String {
    format!(
        "[{} Alert] {} {}",
        style.product,
        alert.severity.emoji(),
        alert.title
    )
}

pub fn render_plain(style: &MessageStyle, alert: &AlertMessage) -> String {
    let metric = alert.metric.as_deref();
    let mut lines = vec![
        format!(
            "{} System Alert - {}",
            style.product,
            alert.severity.as_str().to_uppercase()
        ),
        String::new(),
        format!("Subject: {}", alert.title),
        format!("Service: {}", alert.service),
        format!("Severity: {}", alert.severity),
    ];
    if let Some(metric) = metric {
        lines.push(format!("Metric: {}", metric));
    }
    if let Some(value) = alert.current_value {
        lines.push(format!("Current Value: {}", format_value(value, metric)));
    }
    if let Some(threshold) = alert.threshold {
        lines.push(format!("Threshold: {}", format_value(threshold, metric)));
    }
    lines.extend([
        String::new(),
        "Description:".to_string(),
        alert.message.clone(),
        String::new(),
        format!(
            "Timestamp: {} ({})",
            style.zone.format(alert.timestamp),
            style.zone.label
        ),
        String::new(),
        format!("View Dashboard: {}", style.dashboard_url),
        String::new(),
        "---".to_string(),
        format!("{} Health Dashboard", style.product),
        "Automated monitoring system".to_string(),
    ]);
    lines.join("\n")
}

pub fn render_html(style: &MessageStyle, alert: &AlertMessage) -> String {
    let color = alert.severity.color();
    let metric = alert.metric.as_deref();

    let mut details = format!(
        "<p><strong>Service:</strong> {}</p>\n<p><strong>Severity:</strong> {}</p>\n",
        escape_html(&alert.service),
        alert.severity.as_str().to_uppercase()
    );
    if let Some(metric) = metric {
        details.push_str(&format!(
            "<p><strong>Metric:</strong> {}</p>\n",
            escape_html(metric)
        ));
    }
    if let Some(value) = alert.current_value {
        details.push_str(&format!(
            "<p><strong>Current Value:</strong> <span style=\"font-size:24px;font-weight:bold;color:{color}\">{}</span></p>\n",
            format_value(value, metric)
        ));
    }
    if let Some(threshold) = alert.threshold {
        details.push_str(&format!(
            "<p><strong>Threshold:</strong> {}</p>\n",
            format_value(threshold, metric)
        ));
    }

    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"></head>
<body style="font-family:-apple-system,BlinkMacSystemFont,'Segoe UI',Roboto,sans-serif;margin:0;padding:20px;background-color:#f8fafc">
<div style="max-width:600px;margin:0 auto;background:white;border-radius:8px;overflow:hidden">
<div style="background:{color};color:white;padding:20px;text-align:center">
<h1>{emoji} {product} System Alert</h1>
<p style="margin:0;opacity:0.9">{title}</p>
</div>
<div style="padding:30px">
<div style="background:#f1f5f9;border-left:4px solid {color};padding:15px;margin:20px 0">
<h3 style="margin-top:0;color:#1e293b">Alert Details</h3>
{details}</div>
<h3>Description</h3>
<p>{message}</p>
<div style="text-align:center;margin:30px 0">
<a href="{dashboard}" style="background:{color};color:white;padding:12px 24px;text-decoration:none;border-radius:6px">View Dashboard</a>
</div>
<p style="color:#64748b;font-size:14px"><strong>Timestamp:</strong> {timestamp} ({zone})</p>
</div>
<div style="background:#f8fafc;padding:20px;text-align:center;color:#64748b;font-size:14px">
<p>{product} Health Dashboard | Automated monitoring system</p>
<p>This is an automated message. Do not reply to this email.</p>
</div>
</div>
</body>
</html>
"#,
        color = color,
        emoji = alert.severity.emoji(),
        product = escape_html(&style.product),
        title = escape_html(&alert.title),
        details = details,
        message = escape_html(&alert.message),
        dashboard = escape_html(&style.dashboard_url),
        timestamp = style.zone.format(alert.timestamp),
        zone = escape_html(&style.zone.label),
    )
}
