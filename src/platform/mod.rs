pub mod signal;

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::{debug, info};

use crate::config::{Config, PlatformConfig};
use crate::probe::Network;
use crate::severity::Severity;
use crate::state::{CachedPlatformState, PlatformCache};

use self::signal::{KeywordSignal, SoftSignalSource};

/// HTTP statuses that count as a passing HEAD probe.
pub const SUCCESS_LIKE_STATUSES: &[u16] = &[200, 301, 302, 303, 307, 308];

/// Cache key and display name of the synthetic PC row, which mirrors the
/// overall state.
pub const PC_PLATFORM: &str = "PC";

/// Link shown for the PC row.
pub const PC_STATUS_URL: &str = "https://overwatch.blizzard.com";

/// Outcome of the three independent connectivity checks for a platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HardChecks {
    pub dns: bool,
    pub tcp: bool,
    pub http: bool,
}

impl HardChecks {
    /// Number of passing checks (0..=3).
    pub fn passed(&self) -> usize {
        [self.dns, self.tcp, self.http]
            .into_iter()
            .filter(|ok| *ok)
            .count()
    }
}

/// Live evidence gathered for one platform in this run.
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformSignal {
    pub name: String,
    pub link: String,
    pub hard: HardChecks,
    pub soft: Severity,
}

/// Final per-platform state after the quorum rule and cache fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformStatus {
    pub name: String,
    pub link: String,
    pub state: Severity,
    /// Minutes since the cached state used as fallback was recorded.
    pub cached_age_minutes: Option<i64>,
}

/// Quorum rule. Hard evidence wins; the soft signal can only explain an
/// outage that the hard checks already fail to contradict.
pub fn derive_state(hard: HardChecks, soft: Severity, quorum: usize) -> Severity {
    let passed = hard.passed();

    if passed >= quorum {
        Severity::Ok
    } else if soft == Severity::Warn && passed <= 1 {
        Severity::Warn
    } else if soft == Severity::Info && passed == 0 {
        Severity::Info
    } else {
        Severity::Unknown
    }
}

/// Substitute an `unknown` state with the cached one, then record the result
/// in the cache with a fresh timestamp.
///
/// Returns the reported state and, when the cache was used, its age in whole
/// minutes.
pub fn apply_cache_fallback(
    name: &str,
    derived: Severity,
    cache: &mut PlatformCache,
    now: DateTime<Utc>,
) -> (Severity, Option<i64>) {
    let (state, age) = match (derived, cache.get(name)) {
        (Severity::Unknown, Some(cached)) => {
            let age = (now - cached.ts).num_minutes().max(0);
            (cached.state, Some(age))
        }
        (derived, _) => (derived, None),
    };

    cache.insert(name.to_string(), CachedPlatformState { state, ts: now });

    (state, age)
}

/// One monitored platform with its soft signal source.
struct PlatformProbe {
    cfg: PlatformConfig,
    signal: Box<dyn SoftSignalSource>,
}

/// Runs hard and soft checks for every configured platform.
pub struct PlatformEvaluator {
    platforms: Vec<PlatformProbe>,
    port: u16,
    quorum: usize,
    dns_timeout: Duration,
    tcp_timeout: Duration,
    http_timeout: Duration,
    status_page_timeout: Duration,
}

impl PlatformEvaluator {
    /// Build an evaluator using keyword matching for every platform.
    pub fn new(cfg: &Config) -> Self {
        let platforms = cfg
            .platforms
            .iter()
            .map(|p| PlatformProbe {
                cfg: p.clone(),
                signal: Box::new(KeywordSignal::new(&p.keywords)),
            })
            .collect();

        Self {
            platforms,
            port: cfg.regions.port,
            quorum: cfg.quorum,
            dns_timeout: cfg.timeouts.dns,
            tcp_timeout: cfg.timeouts.tcp,
            http_timeout: cfg.timeouts.http_probe,
            status_page_timeout: cfg.timeouts.status_page,
        }
    }

    /// Replace the soft signal source of a platform. Unknown names are ignored.
    pub fn with_signal(mut self, name: &str, signal: Box<dyn SoftSignalSource>) -> Self {
        if let Some(probe) = self.platforms.iter_mut().find(|p| p.cfg.name == name) {
            probe.signal = signal;
        }
        self
    }

    /// Gather live signals for all platforms concurrently.
    pub async fn collect<N: Network>(&self, net: &N) -> Vec<PlatformSignal> {
        join_all(self.platforms.iter().map(|p| self.collect_one(net, p))).await
    }

    async fn collect_one<N: Network>(&self, net: &N, probe: &PlatformProbe) -> PlatformSignal {
        let cfg = &probe.cfg;

        let (dns, tcp, http, soft) = tokio::join!(
            self.any_resolves(net, &cfg.hosts),
            self.any_connects(net, &cfg.hosts),
            self.any_http_ok(net, &cfg.urls),
            self.status_page_hint(net, &cfg.status_url, probe.signal.as_ref()),
        );

        let signal = PlatformSignal {
            name: cfg.name.clone(),
            link: cfg.status_url.clone(),
            hard: HardChecks { dns, tcp, http },
            soft,
        };

        debug!(
            platform = %signal.name,
            dns, tcp, http,
            soft = %soft,
            "platform checks complete",
        );

        signal
    }

    async fn any_resolves<N: Network>(&self, net: &N, hosts: &[String]) -> bool {
        let results = join_all(
            hosts
                .iter()
                .map(|h| net.resolve(h, self.port, self.dns_timeout)),
        )
        .await;

        results.into_iter().any(|r| match r {
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, "dns check failed");
                false
            }
        })
    }

    async fn any_connects<N: Network>(&self, net: &N, hosts: &[String]) -> bool {
        let results = join_all(
            hosts
                .iter()
                .map(|h| net.connect(h, self.port, self.tcp_timeout)),
        )
        .await;

        results.into_iter().any(|r| match r {
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, "tcp check failed");
                false
            }
        })
    }

    async fn any_http_ok<N: Network>(&self, net: &N, urls: &[String]) -> bool {
        let results = join_all(urls.iter().map(|u| net.head(u, self.http_timeout))).await;

        results.into_iter().any(|r| match r {
            Ok(status) => SUCCESS_LIKE_STATUSES.contains(&status),
            Err(e) => {
                debug!(error = %e, "http check failed");
                false
            }
        })
    }

    async fn status_page_hint<N: Network>(
        &self,
        net: &N,
        url: &str,
        signal: &dyn SoftSignalSource,
    ) -> Severity {
        match net.get(url, self.status_page_timeout).await {
            Ok(page) => signal.assess(&page.body),
            Err(e) => {
                debug!(error = %e, "status page fetch failed");
                Severity::Unknown
            }
        }
    }

    /// Apply the quorum rule and cache fallback to collected signals.
    ///
    /// The cache is updated in place for every platform.
    pub fn resolve(
        &self,
        signals: &[PlatformSignal],
        cache: &mut PlatformCache,
        now: DateTime<Utc>,
    ) -> Vec<PlatformStatus> {
        signals
            .iter()
            .map(|signal| {
                let derived = derive_state(signal.hard, signal.soft, self.quorum);
                let (state, cached_age_minutes) =
                    apply_cache_fallback(&signal.name, derived, cache, now);

                if cached_age_minutes.is_some() {
                    info!(
                        platform = %signal.name,
                        state = %state,
                        age_minutes = ?cached_age_minutes,
                        "live checks inconclusive, using cached state",
                    );
                }

                PlatformStatus {
                    name: signal.name.clone(),
                    link: signal.link.clone(),
                    state,
                    cached_age_minutes,
                }
            })
            .collect()
    }
}

/// Row for the PC platform, which reports the overall state and is cached
/// like the consoles.
pub fn pc_status(
    overall: Severity,
    link: &str,
    cache: &mut PlatformCache,
    now: DateTime<Utc>,
) -> PlatformStatus {
    cache.insert(
        PC_PLATFORM.to_string(),
        CachedPlatformState {
            state: overall,
            ts: now,
        },
    );

    PlatformStatus {
        name: PC_PLATFORM.to_string(),
        link: link.to_string(),
        state: overall,
        cached_age_minutes: None,
    }
}
