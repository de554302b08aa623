use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::fmt;

/// One line of the attempt's diagnostic trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.message
        )
    }
}

/// Append-only status log. Display only; nothing reads it to make decisions.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct StatusLog {
    entries: Vec<LogEntry>,
}

impl StatusLog {
    pub fn push(&mut self, message: impl Into<String>) {
        self.entries.push(LogEntry {
            timestamp: Utc::now(),
            message: message.into(),
        });
    }

    #[must_use]
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        self.entries.iter().any(|entry| entry.message.contains(needle))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn entry_displays_timestamp_and_message() {
        let entry = LogEntry {
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap(),
            message: "Status: pending".to_string(),
        };
        assert_eq!(entry.to_string(), "2024-05-01T12:30:00.000Z - Status: pending");
    }

    #[test]
    fn push_appends_in_order() {
        let mut log = StatusLog::default();
        assert!(log.is_empty());
        log.push("first");
        log.push(String::from("second"));
        assert_eq!(log.len(), 2);
        assert_eq!(log.entries()[0].message, "first");
        assert_eq!(log.entries()[1].message, "second");
        assert!(log.contains("sec"));
    }
}
