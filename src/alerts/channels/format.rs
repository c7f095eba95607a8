//! Rendering helpers shared by the channels

use chrono::{DateTime, FixedOffset, Offset, Utc};

/// Unit suffix inferred from a metric name.
///
/// Names containing `time` are milliseconds; `rate` or `percent` are
/// percentages; anything else has no unit.
pub fn metric_unit(metric: Option<&str>) -> &'static str {
    let Some(metric) = metric else {
        return "";
    };
    let lower = metric.to_lowercase();
    if lower.contains("time") {
        "ms"
    } else if lower.contains("rate") || lower.contains("percent") {
        "%"
    } else {
        ""
    }
}

/// `value` with the unit for `metric`, e.g. `85%`
pub fn format_value(value: f64, metric: Option<&str>) -> String {
    format!("{}{}", value, metric_unit(metric))
}

/// Escape text for Telegram HTML and email HTML bodies
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Zone alert timestamps are shown in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayZone {
    pub offset: FixedOffset,
    pub label: String,
}

impl DisplayZone {
    /// `offset_minutes` east of UTC; out-of-range offsets fall back to UTC
    pub fn new(offset_minutes: i32, label: impl Into<String>) -> Self {
        let offset = FixedOffset::east_opt(offset_minutes * 60).unwrap_or_else(utc_offset);
        Self {
            offset,
            label: label.into(),
        }
    }

    pub fn utc() -> Self {
        Self {
            offset: utc_offset(),
            label: "UTC".to_string(),
        }
    }

    /// `dd.mm.yyyy, HH:MM`
    pub fn format(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.offset)
            .format("%d.%m.%Y, %H:%M")
            .to_string()
    }
}

impl Default for DisplayZone {
    fn default() -> Self {
        Self::utc()
    }
}

fn utc_offset() -> FixedOffset {
    Utc.fix()
}

/// Branding and links embedded in outgoing messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageStyle {
    pub product: String,
    pub dashboard_url: String,
    pub zone: DisplayZone,
}

impl MessageStyle {
    pub fn new(product: impl Into<String>, dashboard_url: impl Into<String>) -> Self {
        Self {
            product: product.into(),
            dashboard_url: dashboard_url.into(),
            zone: DisplayZone::utc(),
        }
    }

    pub fn with_zone(mut self, zone: DisplayZone) -> Self {
        self.zone = zone;
        self
    }

    pub fn health_url(&self) -> String {
        format!("{}/health", self.dashboard_url.trim_end_matches('/'))
    }
}

impl Default for MessageStyle {
    fn default() -> Self {
        Self::new("Healthdash", "http://localhost:8080")
    }
}
