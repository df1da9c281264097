use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::{info, warn};

use crate::advisory::{check_known_issues, check_maintenance, KnownIssues, MaintenanceNotice};
use crate::aggregate::aggregate;
use crate::config::Config;
use crate::export::RunMetrics;
use crate::platform::{pc_status, PlatformEvaluator, PlatformSignal, PC_STATUS_URL};
use crate::probe::latency::{probe_region, RegionMeasurement, Trend};
use crate::probe::Network;
use crate::publish::webhook::MessageChannel;
use crate::publish::{PublishOutcome, Publisher};
use crate::report::{sparkline, RegionRow, ReportRenderer, StatusReport};
use crate::severity::Severity;
use crate::state::history::{push_changelog, push_history, transition, uptimes, HistoryEntry};
use crate::state::{LatencySnapshot, StateStore};

/// Everything gathered from the network in one run, before any state is read.
#[derive(Debug, Clone)]
pub struct Observation {
    pub regions: Vec<RegionMeasurement>,
    pub platforms: Vec<PlatformSignal>,
    pub maintenance: MaintenanceNotice,
    pub known_issues: KnownIssues,
}

/// Result of a completed run.
#[derive(Debug)]
pub struct RunOutcome {
    pub report: StatusReport,
    /// Rendered payload bytes.
    pub payload: Vec<u8>,
    /// Payload without per-run details, as compared against the last publish.
    pub snapshot: Vec<u8>,
    /// `None` on a dry run.
    pub publish: Option<PublishOutcome>,
}

/// Runs one probe, aggregate, record and publish cycle.
pub struct Monitor<N> {
    cfg: Config,
    net: N,
    evaluator: PlatformEvaluator,
    renderer: ReportRenderer,
    store: StateStore,
}

impl<N: Network> Monitor<N> {
    pub fn new(cfg: Config, net: N) -> Result<Self> {
        let store = StateStore::open(cfg.state_dir.clone())?;
        let evaluator = PlatformEvaluator::new(&cfg);
        let renderer = ReportRenderer::new(&cfg);

        Ok(Self {
            cfg,
            net,
            evaluator,
            renderer,
            store,
        })
    }

    /// Replace the platform evaluator (for custom soft signal sources).
    pub fn with_evaluator(mut self, evaluator: PlatformEvaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Issue every network check concurrently. Each check carries its own
    /// timeout and folds failures into a neutral value.
    pub async fn observe(&self, now: DateTime<Utc>) -> Observation {
        let port = self.cfg.regions.port;
        let timeouts = &self.cfg.timeouts;
        let active = self.cfg.active_regions();

        let regions = join_all(
            active
                .iter()
                .map(|(region, hosts)| {
                    probe_region(&self.net, region, hosts, port, timeouts.tcp)
                }),
        );

        let (regions, platforms, maintenance, known_issues) = tokio::join!(
            regions,
            self.evaluator.collect(&self.net),
            check_maintenance(
                &self.net,
                &self.cfg.advisories.maintenance_url,
                &self.cfg.advisories.product_keyword,
                timeouts.maintenance,
            ),
            check_known_issues(&self.net, &self.cfg.advisories, timeouts.known_issues, now),
        );

        Observation {
            regions,
            platforms,
            maintenance,
            known_issues,
        }
    }

    /// Fold an observation into persisted state and build the report.
    ///
    /// Updates the latency snapshot, history, sparkline, overall state,
    /// changelog and platform cache.
    pub fn record(&self, obs: Observation, now: DateTime<Utc>) -> Result<StatusReport> {
        let previous = self.store.latency_snapshot();
        let threshold = self.cfg.report.trend_threshold_ms;
        let regions: Vec<RegionRow> = obs
            .regions
            .into_iter()
            .map(|measurement| {
                let prev_avg = previous.get(&measurement.region).and_then(|s| s.avg);
                RegionRow {
                    trend: Trend::between(prev_avg, measurement.stats.avg, threshold),
                    measurement,
                }
            })
            .collect();

        let snapshot: LatencySnapshot = regions
            .iter()
            .map(|row| (row.measurement.region.clone(), row.measurement.stats))
            .collect();
        self.store.save_latency_snapshot(&snapshot)?;

        let measurements: Vec<RegionMeasurement> =
            regions.iter().map(|row| row.measurement.clone()).collect();
        let overall = aggregate(
            obs.maintenance.state,
            &measurements,
            &self.cfg.thresholds(),
            obs.known_issues.count_24h,
        );

        let mut history = self.store.history();
        push_history(
            &mut history,
            HistoryEntry {
                at: now,
                ok: overall == Severity::Ok,
            },
        );
        self.store.save_history(&history)?;
        let uptime = uptimes(&history);

        let sparkline_path = &self.cfg.report.sparkline_path;
        let has_sparkline = match sparkline::write_sparkline(sparkline_path, &history) {
            Ok(written) => written,
            Err(e) => {
                warn!(error = %e, "sparkline not rendered");
                false
            }
        };

        let previous_state = self.store.overall_state();
        let mut changelog = self.store.changelog();
        if let Some(entry) = transition(previous_state, overall, now) {
            info!(from = %previous_state, to = %overall, "overall state changed");
            push_changelog(&mut changelog, entry);
            self.store.save_changelog(&changelog)?;
            self.store.save_overall_state(overall)?;
        }

        let mut cache = self.store.platform_cache();
        let mut platforms = vec![pc_status(overall, PC_STATUS_URL, &mut cache, now)];
        platforms.extend(self.evaluator.resolve(&obs.platforms, &mut cache, now));
        self.store.save_platform_cache(&cache)?;

        let start = changelog.len().saturating_sub(crate::report::CHANGES_SHOWN);

        Ok(StatusReport {
            overall,
            regions,
            platforms,
            maintenance: obs.maintenance,
            known_issues: obs.known_issues,
            uptime,
            recent_changes: changelog[start..].to_vec(),
            has_sparkline,
            checked_at: now,
        })
    }

    /// Run a full cycle. Without a channel the payload is rendered but not
    /// published and the persisted snapshot is left untouched.
    pub async fn run<C: MessageChannel>(
        &self,
        channel: Option<C>,
        now: DateTime<Utc>,
    ) -> Result<RunOutcome> {
        let started = Instant::now();
        let metrics = RunMetrics::new().context("creating run metrics")?;

        let obs = self.observe(now).await;
        let report = self.record(obs, now)?;
        let rendered = self.renderer.render_bytes(&report)?;

        metrics.record_report(&report);
        info!(
            overall = %report.overall,
            uptime_24h = report.uptime.last_24,
            uptime_7d = report.uptime.last_7d,
            "run aggregated",
        );

        let publish = match channel {
            Some(channel) => Some(
                Publisher::new(channel, &self.store)
                    .publish(&rendered.body, &rendered.snapshot)
                    .await,
            ),
            None => None,
        };
        if let Some(result) = &publish {
            metrics.record_publish(match result {
                Ok(outcome) => outcome.as_str(),
                Err(_) => "failed",
            });
        }

        // Written even when publishing failed.
        metrics.run_duration_seconds.set(started.elapsed().as_secs_f64());
        self.write_metrics(&metrics);

        let publish = publish.transpose()?;

        Ok(RunOutcome {
            report,
            payload: rendered.body,
            snapshot: rendered.snapshot,
            publish,
        })
    }

    fn write_metrics(&self, metrics: &RunMetrics) {
        let Some(path) = &self.cfg.metrics.textfile else {
            return;
        };
        if let Err(e) = metrics.write_textfile(path) {
            warn!(path = %path.display(), error = %e, "failed to write metrics textfile");
        }
    }
}
