use crate::config::KeywordConfig;
use crate::severity::Severity;

/// Turns the text of a status page into a heuristic severity hint.
pub trait SoftSignalSource: Send + Sync {
    fn assess(&self, text: &str) -> Severity;
}

/// Case-insensitive keyword matcher.
///
/// Bad keywords map to `Warn`, warning keywords to `Info`, ok keywords to
/// `Ok`, checked in that order. No match is `Unknown`.
#[derive(Debug, Clone, Default)]
pub struct KeywordSignal {
    bad: Vec<String>,
    warn: Vec<String>,
    ok: Vec<String>,
}

impl KeywordSignal {
    pub fn new(keywords: &KeywordConfig) -> Self {
        let lower = |list: &[String]| -> Vec<String> {
            list.iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect()
        };

        Self {
            bad: lower(&keywords.bad),
            warn: lower(&keywords.warn),
            ok: lower(&keywords.ok),
        }
    }
}

impl SoftSignalSource for KeywordSignal {
    fn assess(&self, text: &str) -> Severity {
        let text = text.to_lowercase();
        let hit = |list: &[String]| list.iter().any(|k| text.contains(k.as_str()));

        if hit(&self.bad) {
            Severity::Warn
        } else if hit(&self.warn) {
            Severity::Info
        } else if hit(&self.ok) {
            Severity::Ok
        } else {
            Severity::Unknown
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal() -> KeywordSignal {
        KeywordSignal::new(&KeywordConfig {
            bad: vec!["Major Outage".into(), "outage".into()],
            warn: vec!["degraded".into(), "  ".into()],
            ok: vec!["all services are up".into()],
        })
    }

    #[test]
    fn test_priority_order() {
        let s = signal();
        assert_eq!(
            s.assess("All services are up, except a MAJOR OUTAGE in PSN"),
            Severity::Warn
        );
        assert_eq!(
            s.assess("Performance degraded; all services are up"),
            Severity::Info
        );
        assert_eq!(s.assess("All Services Are Up"), Severity::Ok);
    }

    #[test]
    fn test_no_match_is_unknown() {
        assert_eq!(signal().assess("<html>loading...</html>"), Severity::Unknown);
        assert_eq!(signal().assess(""), Severity::Unknown);
    }

    #[test]
    fn test_blank_keywords_are_ignored() {
        // A blank keyword would otherwise match every page.
        assert_eq!(signal().assess("nothing relevant"), Severity::Unknown);
    }
}
