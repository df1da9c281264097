use std::fmt;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Network;

/// Min/avg/max of the reachable hosts in a region. All `None` when no host
/// answered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub min: Option<f64>,
    pub avg: Option<f64>,
    pub max: Option<f64>,
}

/// Connect latencies measured for one region.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionMeasurement {
    pub region: String,
    /// Successful samples in milliseconds, in host order.
    pub samples: Vec<f64>,
    pub stats: LatencyStats,
}

impl RegionMeasurement {
    /// Build a measurement from per-host results; `None` marks an unreachable host.
    pub fn from_samples(region: impl Into<String>, per_host: &[Option<f64>]) -> Self {
        let samples: Vec<f64> = per_host.iter().flatten().copied().collect();

        let stats = if samples.is_empty() {
            LatencyStats::default()
        } else {
            let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
            let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let avg = samples.iter().sum::<f64>() / samples.len() as f64;
            LatencyStats {
                min: Some(min),
                avg: Some(round1(avg)),
                max: Some(max),
            }
        };

        Self {
            region: region.into(),
            samples,
            stats,
        }
    }
}

/// Round to one decimal place.
fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// Measure the TCP connect latency to one host in milliseconds.
/// Every failure is folded into `None`.
pub async fn probe_host<N: Network>(
    net: &N,
    host: &str,
    port: u16,
    timeout: Duration,
) -> Option<f64> {
    match net.connect(host, port, timeout).await {
        Ok(elapsed) => Some(round1(elapsed.as_secs_f64() * 1000.0)),
        Err(e) => {
            debug!(error = %e, "latency probe failed");
            None
        }
    }
}

/// Probe every host of a region concurrently and aggregate the samples.
pub async fn probe_region<N: Network>(
    net: &N,
    region: &str,
    hosts: &[String],
    port: u16,
    timeout: Duration,
) -> RegionMeasurement {
    let per_host = join_all(
        hosts
            .iter()
            .map(|host| probe_host(net, host, port, timeout)),
    )
    .await;

    let measurement = RegionMeasurement::from_samples(region, &per_host);
    debug!(
        region,
        reachable = measurement.samples.len(),
        hosts = hosts.len(),
        avg = ?measurement.stats.avg,
        "region probed",
    );
    measurement
}

/// Direction of a region's average latency relative to the previous run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Rising,
    Falling,
    Steady,
    /// One of the two runs had no measurement.
    Unknown,
}

impl Trend {
    /// Compare two averages; moves within `threshold_ms` count as steady.
    pub fn between(previous: Option<f64>, current: Option<f64>, threshold_ms: f64) -> Self {
        match (previous, current) {
            (Some(prev), Some(cur)) if cur > prev + threshold_ms => Trend::Rising,
            (Some(prev), Some(cur)) if cur < prev - threshold_ms => Trend::Falling,
            (Some(_), Some(_)) => Trend::Steady,
            _ => Trend::Unknown,
        }
    }

    pub fn glyph(&self) -> &'static str {
        match self {
            Trend::Rising => "\u{25B2}",
            Trend::Falling => "\u{25BC}",
            Trend::Steady => "\u{2192}",
            Trend::Unknown => "\u{2022}",
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.glyph())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_samples_mixed() {
        let m = RegionMeasurement::from_samples("EU", &[Some(30.0), None, Some(45.5)]);
        assert_eq!(m.samples, vec![30.0, 45.5]);
        assert_eq!(m.stats.min, Some(30.0));
        assert_eq!(m.stats.max, Some(45.5));
        assert_eq!(m.stats.avg, Some(37.8));
    }

    #[test]
    fn test_from_samples_all_unreachable() {
        let m = RegionMeasurement::from_samples("NA", &[None, None]);
        assert!(m.samples.is_empty());
        assert_eq!(m.stats, LatencyStats::default());
        assert!(m.stats.avg.is_none());
    }

    #[test]
    fn test_from_samples_no_hosts() {
        let m = RegionMeasurement::from_samples("ASIA", &[]);
        assert!(m.stats.avg.is_none());
        assert!(m.stats.min.is_none());
        assert!(m.stats.max.is_none());
    }

    #[test]
    fn test_trend() {
        assert_eq!(Trend::between(Some(50.0), Some(71.0), 20.0), Trend::Rising);
        assert_eq!(Trend::between(Some(50.0), Some(70.0), 20.0), Trend::Steady);
        assert_eq!(Trend::between(Some(50.0), Some(29.0), 20.0), Trend::Falling);
        assert_eq!(Trend::between(None, Some(29.0), 20.0), Trend::Unknown);
        assert_eq!(Trend::between(Some(50.0), None, 20.0), Trend::Unknown);
        assert_eq!(Trend::Rising.to_string(), "\u{25B2}");
    }

    #[test]
    fn test_stats_json_uses_null_for_missing() {
        let json = serde_json::to_string(&LatencyStats::default()).expect("serialize");
        assert_eq!(json, r#"{"min":null,"avg":null,"max":null}"#);
    }
}
