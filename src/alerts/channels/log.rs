//! Channel that writes alerts to the tracing log

use async_trait::async_trait;

use crate::alerts::notifier::{AlertMessage, ChannelError, NotificationChannel};

/// Always-available channel, useful when no external transport is configured
#[derive(Debug, Default)]
pub struct LogChannel;

#[async_trait]
impl NotificationChannel for LogChannel {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, alert: &AlertMessage) -> Result<bool, ChannelError> {
        tracing::warn!(
            severity = %alert.severity,
            service = %alert.service,
            metric = ?alert.metric,
            current_value = ?alert.current_value,
            threshold = ?alert.threshold,
            "Alert triggered: {}: {}",
            alert.title,
            alert.message
        );
        Ok(true)
    }

    async fn test_connection(&self) -> Result<bool, ChannelError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::Severity;

    #[tokio::test]
    async fn test_log_always_delivers() {
        let alert = AlertMessage::new("t", "m", Severity::Info, "system");
        assert!(LogChannel.deliver(&alert).await.unwrap());
        assert!(LogChannel.test_connection().await.unwrap());
    }
}
