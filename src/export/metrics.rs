use std::path::Path;

use anyhow::{Context, Result};
use prometheus::{Counter, CounterVec, Encoder, Gauge, GaugeVec, Opts, Registry, TextEncoder};

use crate::report::StatusReport;

const NAMESPACE: &str = "ow_status";

/// Prometheus metrics describing one status run.
///
/// Severities are exported as their rank: 0=ok, 1=info, 2=warn, 3=unknown.
pub struct RunMetrics {
    registry: Registry,

    /// Overall severity of the run.
    pub overall_state: Gauge,
    /// Average connect latency per region, in milliseconds.
    pub region_latency_ms: GaugeVec,
    /// Reachable hosts per region.
    pub region_reachable_hosts: GaugeVec,
    /// Reported state per platform.
    pub platform_state: GaugeVec,
    /// Platforms reported from the cache because live checks were inconclusive.
    pub platform_cache_fallbacks: Counter,
    /// Uptime percentage by window (24h, 7d).
    pub uptime_percent: GaugeVec,
    /// Known-issue topics active in the last 24 hours (-1 when unavailable).
    pub known_issues_24h: Gauge,
    /// Publish step outcomes (unchanged, edited, created, failed).
    pub publish_total: CounterVec,
    /// Wall-clock duration of the run in seconds.
    pub run_duration_seconds: Gauge,
}

impl RunMetrics {
    /// Creates a registry with all run metrics registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let overall_state = Gauge::with_opts(
            Opts::new("overall_state", "Overall severity rank of the last run.")
                .namespace(NAMESPACE),
        )?;
        let region_latency_ms = GaugeVec::new(
            Opts::new(
                "region_latency_avg_ms",
                "Average TCP connect latency per region in milliseconds.",
            )
            .namespace(NAMESPACE),
            &["region"],
        )?;
        let region_reachable_hosts = GaugeVec::new(
            Opts::new(
                "region_reachable_hosts",
                "Number of hosts that accepted a TCP connection per region.",
            )
            .namespace(NAMESPACE),
            &["region"],
        )?;
        let platform_state = GaugeVec::new(
            Opts::new("platform_state", "Reported severity rank per platform.")
                .namespace(NAMESPACE),
            &["platform"],
        )?;
        let platform_cache_fallbacks = Counter::with_opts(
            Opts::new(
                "platform_cache_fallbacks_total",
                "Platforms reported from cache because live checks were inconclusive.",
            )
            .namespace(NAMESPACE),
        )?;
        let uptime_percent = GaugeVec::new(
            Opts::new("uptime_percent", "Share of ok runs by window.").namespace(NAMESPACE),
            &["window"],
        )?;
        let known_issues_24h = Gauge::with_opts(
            Opts::new(
                "known_issues_24h",
                "Known-issue topics active in the last 24 hours (-1 when unavailable).",
            )
            .namespace(NAMESPACE),
        )?;
        let publish_total = CounterVec::new(
            Opts::new("publish_total", "Publish step outcomes.").namespace(NAMESPACE),
            &["outcome"],
        )?;
        let run_duration_seconds = Gauge::with_opts(
            Opts::new("run_duration_seconds", "Wall-clock duration of the run.")
                .namespace(NAMESPACE),
        )?;

        registry.register(Box::new(overall_state.clone()))?;
        registry.register(Box::new(region_latency_ms.clone()))?;
        registry.register(Box::new(region_reachable_hosts.clone()))?;
        registry.register(Box::new(platform_state.clone()))?;
        registry.register(Box::new(platform_cache_fallbacks.clone()))?;
        registry.register(Box::new(uptime_percent.clone()))?;
        registry.register(Box::new(known_issues_24h.clone()))?;
        registry.register(Box::new(publish_total.clone()))?;
        registry.register(Box::new(run_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            overall_state,
            region_latency_ms,
            region_reachable_hosts,
            platform_state,
            platform_cache_fallbacks,
            uptime_percent,
            known_issues_24h,
            publish_total,
            run_duration_seconds,
        })
    }

    /// Record the observations of a finished run.
    pub fn record_report(&self, report: &StatusReport) {
        self.overall_state.set(f64::from(report.overall.rank()));

        for row in &report.regions {
            let region = row.measurement.region.as_str();
            // NaN marks a region without any measurement.
            self.region_latency_ms
                .with_label_values(&[region])
                .set(row.measurement.stats.avg.unwrap_or(f64::NAN));
            self.region_reachable_hosts
                .with_label_values(&[region])
                .set(row.measurement.samples.len() as f64);
        }

        for platform in &report.platforms {
            self.platform_state
                .with_label_values(&[platform.name.as_str()])
                .set(f64::from(platform.state.rank()));
            if platform.cached_age_minutes.is_some() {
                self.platform_cache_fallbacks.inc();
            }
        }

        self.uptime_percent
            .with_label_values(&["24h"])
            .set(f64::from(report.uptime.last_24));
        self.uptime_percent
            .with_label_values(&["7d"])
            .set(f64::from(report.uptime.last_7d));

        self.known_issues_24h
            .set(report.known_issues.count_24h.map_or(-1.0, |n| n as f64));
    }

    pub fn record_publish(&self, outcome: &str) {
        self.publish_total.with_label_values(&[outcome]).inc();
    }

    /// Encode all metrics in Prometheus text exposition format.
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .context("encoding metrics")?;

        String::from_utf8(buffer).context("metrics are not valid UTF-8")
    }

    /// Write the metrics for the node-exporter textfile collector.
    ///
    /// The file is written next to its destination and renamed into place so
    /// the collector never reads a partial file.
    pub fn write_textfile(&self, path: &Path) -> Result<()> {
        let text = self.encode()?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }

        let tmp = path.with_extension("prom.tmp");
        std::fs::write(&tmp, text).with_context(|| format!("writing {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("renaming {} to {}", tmp.display(), path.display()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::advisory::{KnownIssues, MaintenanceNotice};
    use crate::platform::PlatformStatus;
    use crate::probe::latency::{RegionMeasurement, Trend};
    use crate::report::RegionRow;
    use crate::severity::Severity;
    use crate::state::history::Uptime;

    fn report() -> StatusReport {
        StatusReport {
            overall: Severity::Warn,
            regions: vec![RegionRow {
                measurement: RegionMeasurement::from_samples("EU", &[Some(42.0), None]),
                trend: Trend::Unknown,
            }],
            platforms: vec![PlatformStatus {
                name: "Switch".to_string(),
                link: String::new(),
                state: Severity::Info,
                cached_age_minutes: Some(30),
            }],
            maintenance: MaintenanceNotice::not_checkable(),
            known_issues: KnownIssues::unavailable("https://forum.test"),
            uptime: Uptime {
                last_24: 90,
                last_7d: 95,
            },
            recent_changes: Vec::new(),
            has_sparkline: false,
            checked_at: Utc
                .with_ymd_and_hms(2026, 10, 18, 0, 0, 0)
                .single()
                .expect("valid date"),
        }
    }

    #[test]
    fn test_encode_contains_run_metrics() {
        let metrics = RunMetrics::new().expect("metrics");
        metrics.record_report(&report());
        metrics.record_publish("edited");

        let text = metrics.encode().expect("encode");
        assert!(text.contains("ow_status_overall_state 2"));
        assert!(text.contains(r#"ow_status_region_latency_avg_ms{region="EU"} 42"#));
        assert!(text.contains(r#"ow_status_region_reachable_hosts{region="EU"} 1"#));
        assert!(text.contains(r#"ow_status_platform_state{platform="Switch"} 1"#));
        assert!(text.contains("ow_status_platform_cache_fallbacks_total 1"));
        assert!(text.contains(r#"ow_status_uptime_percent{window="7d"} 95"#));
        assert!(text.contains("ow_status_known_issues_24h -1"));
        assert!(text.contains(r#"ow_status_publish_total{outcome="edited"} 1"#));
    }

    #[test]
    fn test_write_textfile() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("textfile/ow_status.prom");

        let metrics = RunMetrics::new().expect("metrics");
        metrics.record_report(&report());
        metrics.write_textfile(&path).expect("write");

        let text = std::fs::read_to_string(&path).expect("read");
        assert!(text.contains("# TYPE ow_status_overall_state gauge"));
        assert!(!path.with_extension("prom.tmp").exists());
    }
}
