use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::severity::Severity;

/// Retained history length: seven days of hourly runs.
pub const HISTORY_LIMIT: usize = 168;

/// Window for the short uptime figure.
pub const RECENT_WINDOW: usize = 24;

/// Retained changelog length.
pub const CHANGELOG_LIMIT: usize = 6;

/// One run's outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(rename = "t", with = "chrono::serde::ts_seconds")]
    pub at: DateTime<Utc>,
    #[serde(with = "ok_flag")]
    pub ok: bool,
}

/// Persists `ok` as 1/0 to keep the history file compact.
mod ok_flag {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ok: &bool, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u8(u8::from(*ok))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        Ok(u8::deserialize(d)? != 0)
    }
}

/// A transition of the overall state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangelogEntry {
    /// Human-readable UTC time, minute precision.
    #[serde(rename = "t")]
    pub at: String,
    pub from: Severity,
    pub to: Severity,
}

/// Uptime percentages over the recent window and the whole retained history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Uptime {
    pub last_24: u8,
    pub last_7d: u8,
}

/// Append a run and keep only the most recent [`HISTORY_LIMIT`] entries.
pub fn push_history(history: &mut Vec<HistoryEntry>, entry: HistoryEntry) {
    history.push(entry);
    truncate_front(history, HISTORY_LIMIT);
}

/// Append a transition and keep only the most recent [`CHANGELOG_LIMIT`] entries.
pub fn push_changelog(changelog: &mut Vec<ChangelogEntry>, entry: ChangelogEntry) {
    changelog.push(entry);
    truncate_front(changelog, CHANGELOG_LIMIT);
}

fn truncate_front<T>(items: &mut Vec<T>, limit: usize) {
    if items.len() > limit {
        let excess = items.len() - limit;
        items.drain(..excess);
    }
}

/// Percentage of ok runs, rounded to the nearest integer. Empty input is 0.
fn percent_ok(entries: &[HistoryEntry]) -> u8 {
    if entries.is_empty() {
        return 0;
    }
    let ok = entries.iter().filter(|e| e.ok).count();
    ((ok as f64 / entries.len() as f64) * 100.0).round() as u8
}

/// Uptime over the last [`RECENT_WINDOW`] entries and over all entries.
pub fn uptimes(history: &[HistoryEntry]) -> Uptime {
    let recent_start = history.len().saturating_sub(RECENT_WINDOW);

    Uptime {
        last_24: percent_ok(&history[recent_start..]),
        last_7d: percent_ok(history),
    }
}

/// Format a changelog timestamp.
pub fn changelog_time(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M UTC").to_string()
}

/// Produce a changelog entry when the overall state moved.
pub fn transition(
    previous: Severity,
    current: Severity,
    at: DateTime<Utc>,
) -> Option<ChangelogEntry> {
    (previous != current).then(|| ChangelogEntry {
        at: changelog_time(at),
        from: previous,
        to: current,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn at(hour: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).single().expect("valid date")
            + Duration::hours(hour)
    }

    fn entries(oks: &[bool]) -> Vec<HistoryEntry> {
        oks.iter()
            .enumerate()
            .map(|(i, ok)| HistoryEntry {
                at: at(i as i64),
                ok: *ok,
            })
            .collect()
    }

    #[test]
    fn test_history_truncates_to_limit() {
        let mut history = Vec::new();
        for i in 0..200 {
            push_history(
                &mut history,
                HistoryEntry {
                    at: at(i),
                    ok: true,
                },
            );
        }
        assert_eq!(history.len(), HISTORY_LIMIT);
        assert_eq!(history.first().map(|e| e.at), Some(at(32)));
        assert_eq!(history.last().map(|e| e.at), Some(at(199)));
    }

    #[test]
    fn test_uptime_empty() {
        assert_eq!(uptimes(&[]), Uptime::default());
    }

    #[test]
    fn test_uptime_24_entries() {
        let mut oks = vec![true; 18];
        oks.extend(vec![false; 6]);
        let u = uptimes(&entries(&oks));
        assert_eq!(u.last_24, 75);
        assert_eq!(u.last_7d, 75);
    }

    #[test]
    fn test_uptime_windows_differ() {
        // 6 stale failures followed by 24 recent runs with 20 ok.
        let mut oks = vec![false; 6];
        oks.extend(vec![true; 20]);
        oks.extend(vec![false; 4]);
        let u = uptimes(&entries(&oks));
        assert_eq!(u.last_24, 83);
        assert_eq!(u.last_7d, 67);
    }

    #[test]
    fn test_uptime_short_history() {
        let u = uptimes(&entries(&[true, false, true]));
        assert_eq!(u.last_24, 67);
        assert_eq!(u.last_7d, 67);
    }

    #[test]
    fn test_changelog_sequence() {
        let sequence = [
            Severity::Ok,
            Severity::Ok,
            Severity::Warn,
            Severity::Warn,
            Severity::Info,
        ];
        let mut previous = Severity::Ok;
        let mut changelog = Vec::new();
        for (i, state) in sequence.into_iter().enumerate() {
            if let Some(entry) = transition(previous, state, at(i as i64)) {
                push_changelog(&mut changelog, entry);
            }
            previous = state;
        }

        let moves: Vec<(Severity, Severity)> = changelog.iter().map(|e| (e.from, e.to)).collect();
        assert_eq!(
            moves,
            vec![
                (Severity::Ok, Severity::Warn),
                (Severity::Warn, Severity::Info)
            ]
        );
        assert_eq!(changelog[0].at, "2026-01-01 02:00 UTC");
    }

    #[test]
    fn test_changelog_truncates() {
        let mut changelog = Vec::new();
        for i in 0..10 {
            let (from, to) = if i % 2 == 0 {
                (Severity::Ok, Severity::Warn)
            } else {
                (Severity::Warn, Severity::Ok)
            };
            push_changelog(
                &mut changelog,
                ChangelogEntry {
                    at: changelog_time(at(i)),
                    from,
                    to,
                },
            );
        }
        assert_eq!(changelog.len(), CHANGELOG_LIMIT);
        assert_eq!(changelog[0].at, changelog_time(at(4)));
    }

    #[test]
    fn test_history_entry_json_shape() {
        let entry = HistoryEntry { at: at(0), ok: true };
        let json = serde_json::to_string(&entry).expect("serialize");
        assert_eq!(json, r#"{"t":1767225600,"ok":1}"#);
        let back: HistoryEntry = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, entry);
    }
}
