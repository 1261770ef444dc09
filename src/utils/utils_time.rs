use chrono::{DateTime, NaiveDateTime, Utc};

/// Compact UTC timestamp used in snapshot file names: `yyyyMMddHHmmssSSS`.
const FRIENDLY_FORMAT: &str = "%Y%m%d%H%M%S";

pub fn current_time_ms() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn friendly_timestamp(ms: i64) -> String {
    match DateTime::<Utc>::from_timestamp_millis(ms) {
        Some(at) => format!("{}{:03}", at.format(FRIENDLY_FORMAT), at.timestamp_subsec_millis()),
        None => format!("{:017}", 0),
    }
}

pub fn parse_friendly_timestamp(raw: &str) -> Option<i64> {
    if raw.len() != 17 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let (seconds, millis) = raw.split_at(14);
    let at = NaiveDateTime::parse_from_str(seconds, FRIENDLY_FORMAT).ok()?;
    let millis: i64 = millis.parse().ok()?;
    Some(at.and_utc().timestamp_millis() + millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn friendly_timestamp_is_sortable_and_reversible() {
        let ms = 1_700_000_123_456;
        let raw = friendly_timestamp(ms);
        assert_eq!(raw, "20231114221523456");
        assert_eq!(parse_friendly_timestamp(&raw), Some(ms));
        assert!(friendly_timestamp(ms) < friendly_timestamp(ms + 1));
    }

    #[test]
    fn rejects_malformed_timestamps() {
        assert_eq!(parse_friendly_timestamp("latest"), None);
        assert_eq!(parse_friendly_timestamp("2023111422152345"), None);
        assert_eq!(parse_friendly_timestamp("20231399221523456"), None);
    }
}
