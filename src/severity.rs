use std::fmt;

use serde::{Deserialize, Serialize};

/// Discrete health level reported for a region, platform or the whole service.
///
/// Variants are declared in worst-case order so the derived `Ord` is the
/// reduction order: `Ok < Info < Warn < Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Ok,
    Info,
    Warn,
    Unknown,
}

impl Severity {
    /// All severities in reduction order.
    pub const ALL: [Severity; 4] = [
        Severity::Ok,
        Severity::Info,
        Severity::Warn,
        Severity::Unknown,
    ];

    /// Returns the lowercase label used in persisted state and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Ok => "ok",
            Severity::Info => "info",
            Severity::Warn => "warn",
            Severity::Unknown => "unknown",
        }
    }

    /// Numeric rank (0..=3), used for metric gauges.
    pub fn rank(&self) -> u8 {
        *self as u8
    }

    /// Embed accent colour for this severity.
    pub fn color(&self) -> u32 {
        match self {
            Severity::Ok => 0x2ECC71,
            Severity::Info => 0x3498DB,
            Severity::Warn => 0xF1C40F,
            Severity::Unknown => 0x95A5A6,
        }
    }

    /// Traffic-light glyph shown in the platform table.
    pub fn icon(&self) -> &'static str {
        match self {
            Severity::Ok => "\u{1F7E2}",
            Severity::Info => "\u{1F7E1}",
            Severity::Warn => "\u{1F534}",
            Severity::Unknown => "\u{26AA}",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Latency thresholds in milliseconds. Validated by `Config::validate` so that
/// `warn_ms > info_ms >= 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub info_ms: f64,
    pub warn_ms: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            info_ms: 200.0,
            warn_ms: 400.0,
        }
    }
}

/// Maps an average latency to a severity. No measurement means `Unknown`.
pub fn classify(avg_ms: Option<f64>, thresholds: &Thresholds) -> Severity {
    match avg_ms {
        None => Severity::Unknown,
        Some(avg) if avg >= thresholds.warn_ms => Severity::Warn,
        Some(avg) if avg >= thresholds.info_ms => Severity::Info,
        Some(_) => Severity::Ok,
    }
}

/// Worst-case reduction. An empty input reduces to `Ok`, the identity of `max`.
pub fn worst<I>(states: I) -> Severity
where
    I: IntoIterator<Item = Severity>,
{
    states.into_iter().fold(Severity::Ok, Severity::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_is_ok_info_warn_unknown() {
        assert!(Severity::Ok < Severity::Info);
        assert!(Severity::Info < Severity::Warn);
        assert!(Severity::Warn < Severity::Unknown);
    }

    #[test]
    fn test_classify_boundaries() {
        let t = Thresholds::default();
        assert_eq!(classify(None, &t), Severity::Unknown);
        assert_eq!(classify(Some(0.0), &t), Severity::Ok);
        assert_eq!(classify(Some(199.9), &t), Severity::Ok);
        assert_eq!(classify(Some(200.0), &t), Severity::Info);
        assert_eq!(classify(Some(399.9), &t), Severity::Info);
        assert_eq!(classify(Some(400.0), &t), Severity::Warn);
        assert_eq!(classify(Some(10_000.0), &t), Severity::Warn);
    }

    #[test]
    fn test_classify_is_monotonic() {
        let t = Thresholds {
            info_ms: 50.0,
            warn_ms: 120.0,
        };
        let mut prev = Severity::Ok;
        for step in 0..2_000 {
            let avg = f64::from(step) * 0.25;
            let current = classify(Some(avg), &t);
            assert!(current >= prev, "avg={avg} went from {prev} to {current}");
            prev = current;
        }
    }

    #[test]
    fn test_worst_identities() {
        assert_eq!(worst([Severity::Unknown]), Severity::Unknown);
        assert_eq!(worst([Severity::Ok]), Severity::Ok);
        assert_eq!(worst(Vec::new()), Severity::Ok);
    }

    #[test]
    fn test_worst_algebra() {
        for a in Severity::ALL {
            assert_eq!(worst([a, a]), a, "idempotent");
            for b in Severity::ALL {
                assert_eq!(worst([a, b]), worst([b, a]), "commutative");
                for c in Severity::ALL {
                    assert_eq!(
                        worst([worst([a, b]), c]),
                        worst([a, worst([b, c])]),
                        "associative"
                    );
                }
            }
        }
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&Severity::Warn).expect("serialize");
        assert_eq!(json, "\"warn\"");
        let back: Severity = serde_json::from_str("\"unknown\"").expect("deserialize");
        assert_eq!(back, Severity::Unknown);
    }
}
