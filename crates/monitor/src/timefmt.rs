use chrono::{DateTime, Utc};

pub fn unix_now() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or_default()
}

/// UTC `YYYY-MM-DDTHH:MM:SS` rendering used in alert text.
pub fn format_ts(timestamp: u64) -> String {
    i64::try_from(timestamp)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|date| date.format("%Y-%m-%dT%H:%M:%S").to_string())
        .unwrap_or_else(|| "<unknown>".to_owned())
}
