//! Notification channel implementations

pub mod email;
pub mod format;
pub mod log;
pub mod telegram;
pub mod webhook;

pub use email::{EmailChannel, EmailConfig};
pub use format::{metric_unit, DisplayZone, MessageStyle};
pub use log::LogChannel;
pub use telegram::{TelegramChannel, TelegramConfig};
pub use webhook::WebhookChannel;
