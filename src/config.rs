use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::publish::webhook::webhook_parts;
use crate::severity::Thresholds;

/// Regions monitored when the allow-list is empty or names no known region.
pub const DEFAULT_REGIONS: &[&str] = &["EU", "NA", "ASIA"];

/// Top-level configuration for a status run.
///
/// Loaded from an optional YAML file, then overridden from the environment
/// (see [`Config::apply_env`]), then validated. Immutable after loading.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Directory holding all persisted run state. Default: ".bot_state".
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Discord webhook target.
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Report presentation settings.
    #[serde(default)]
    pub report: ReportConfig,

    /// Latency thresholds for region classification.
    #[serde(default)]
    pub thresholds: ThresholdConfig,

    /// Region allow-list and per-region probe hosts.
    #[serde(default)]
    pub regions: RegionsConfig,

    /// Console platforms to evaluate.
    #[serde(default = "default_platforms")]
    pub platforms: Vec<PlatformConfig>,

    /// Minimum number of passing hard checks that confirms a platform is up.
    #[serde(default = "default_quorum")]
    pub quorum: usize,

    /// Maintenance page and known-issues feed.
    #[serde(default)]
    pub advisories: AdvisoryConfig,

    /// Per-call network timeouts.
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Prometheus textfile export.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Discord webhook target configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookConfig {
    /// Full webhook URL (`.../webhooks/<id>/<token>`). Secret, required.
    #[serde(default)]
    pub url: String,
}

/// Report presentation configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    /// Embed title.
    #[serde(default = "default_title")]
    pub title: String,

    /// Optional embed thumbnail URL.
    #[serde(default)]
    pub thumbnail_url: String,

    /// Public URL of the rendered sparkline. Empty disables the embed image.
    #[serde(default)]
    pub image_url: String,

    /// Local path the sparkline is rendered to. Default: "assets/sparkline.png".
    #[serde(default = "default_sparkline_path")]
    pub sparkline_path: PathBuf,

    /// Target of the "Support" link button.
    #[serde(default = "default_support_url")]
    pub support_url: String,

    /// Latency delta (ms) between runs that counts as a trend. Default: 20.
    #[serde(default = "default_trend_threshold_ms")]
    pub trend_threshold_ms: f64,
}

/// Latency thresholds in milliseconds.
#[derive(Debug, Clone, Deserialize)]
pub struct ThresholdConfig {
    /// Average latency at or above which a region is `info`. Default: 200.
    #[serde(default = "default_info_ms")]
    pub info_ms: f64,

    /// Average latency at or above which a region is `warn`. Default: 400.
    #[serde(default = "default_warn_ms")]
    pub warn_ms: f64,
}

/// Region allow-list and probe host table.
#[derive(Debug, Clone, Deserialize)]
pub struct RegionsConfig {
    /// Regions to probe, in report order. Default: EU, NA, ASIA.
    #[serde(default = "default_enabled_regions")]
    pub enabled: Vec<String>,

    /// Hosts probed per region.
    #[serde(default = "default_region_hosts")]
    pub hosts: BTreeMap<String, Vec<String>>,

    /// TCP port probed on every host. Default: 443.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Endpoint set and status page keywords for one console platform.
#[derive(Debug, Clone, Deserialize)]
pub struct PlatformConfig {
    /// Display name, also the platform cache key.
    pub name: String,

    /// Hosts used for the DNS and TCP checks.
    pub hosts: Vec<String>,

    /// URLs used for the HTTP HEAD check.
    #[serde(default)]
    pub urls: Vec<String>,

    /// Status page scraped for the soft signal.
    pub status_url: String,

    /// Keyword lists matched against the lowercased status page.
    #[serde(default)]
    pub keywords: KeywordConfig,
}

/// Keyword lists, matched in priority order bad > warn > ok.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KeywordConfig {
    #[serde(default)]
    pub bad: Vec<String>,
    #[serde(default)]
    pub warn: Vec<String>,
    #[serde(default)]
    pub ok: Vec<String>,
}

/// Advisory source configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AdvisoryConfig {
    /// Maintenance documentation page.
    #[serde(default = "default_maintenance_url")]
    pub maintenance_url: String,

    /// Product name that must appear on the maintenance page. Default: "overwatch".
    #[serde(default = "default_product_keyword")]
    pub product_keyword: String,

    /// Forum topic-list JSON feed for known issues.
    #[serde(default = "default_known_issues_feed")]
    pub known_issues_feed: String,

    /// Human-facing known-issues listing, used when no topic is available.
    #[serde(default = "default_known_issues_listing")]
    pub known_issues_listing: String,

    /// Forum base URL for topic permalinks (`<base>/t/<slug>/<id>`).
    #[serde(default = "default_forum_base_url")]
    pub forum_base_url: String,
}

/// Network timeouts, one per call kind.
#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutConfig {
    /// TCP connect (latency probe and hard check). Default: 3s.
    #[serde(default = "default_tcp_timeout", with = "humantime_serde")]
    pub tcp: Duration,

    /// DNS resolution. Default: 3s.
    #[serde(default = "default_dns_timeout", with = "humantime_serde")]
    pub dns: Duration,

    /// HTTP HEAD hard check. Default: 6s.
    #[serde(default = "default_http_probe_timeout", with = "humantime_serde")]
    pub http_probe: Duration,

    /// Status page fetch. Default: 8s.
    #[serde(default = "default_status_page_timeout", with = "humantime_serde")]
    pub status_page: Duration,

    /// Maintenance page fetch. Default: 20s.
    #[serde(default = "default_maintenance_timeout", with = "humantime_serde")]
    pub maintenance: Duration,

    /// Known-issues feed fetch. Default: 12s.
    #[serde(default = "default_known_issues_timeout", with = "humantime_serde")]
    pub known_issues: Duration,

    /// Webhook create/edit request. Default: 20s.
    #[serde(default = "default_webhook_timeout", with = "humantime_serde")]
    pub webhook: Duration,
}

/// Prometheus textfile export configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsConfig {
    /// Write run metrics to this path in text exposition format.
    #[serde(default)]
    pub textfile: Option<PathBuf>,
}

// --- Default value functions ---

fn default_state_dir() -> PathBuf {
    PathBuf::from(".bot_state")
}

fn default_title() -> String {
    "Overwatch 2 \u{2013} Status".to_string()
}

fn default_sparkline_path() -> PathBuf {
    PathBuf::from("assets/sparkline.png")
}

fn default_support_url() -> String {
    "https://support.blizzard.com".to_string()
}

fn default_trend_threshold_ms() -> f64 {
    20.0
}

fn default_info_ms() -> f64 {
    200.0
}

fn default_warn_ms() -> f64 {
    400.0
}

fn default_enabled_regions() -> Vec<String> {
    DEFAULT_REGIONS.iter().map(|s| (*s).to_string()).collect()
}

fn default_region_hosts() -> BTreeMap<String, Vec<String>> {
    let shared = "overwatch.blizzard.com";
    [
        ("EU", "eu.actual.battle.net"),
        ("NA", "us.actual.battle.net"),
        ("ASIA", "kr.actual.battle.net"),
    ]
    .into_iter()
    .map(|(region, host)| {
        (
            region.to_string(),
            vec![host.to_string(), shared.to_string()],
        )
    })
    .collect()
}

fn default_port() -> u16 {
    443
}

fn default_quorum() -> usize {
    2
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

fn default_platforms() -> Vec<PlatformConfig> {
    vec![
        PlatformConfig {
            name: "PlayStation".to_string(),
            hosts: strings(&[
                "store.playstation.com",
                "api.playstation.com",
                "playstation.com",
            ]),
            urls: strings(&[
                "https://store.playstation.com",
                "https://api.playstation.com",
                "https://playstation.com",
            ]),
            status_url: "https://status.playstation.com".to_string(),
            keywords: KeywordConfig {
                bad: strings(&[
                    "major outage",
                    "outage",
                    "service is down",
                    "all services are down",
                ]),
                warn: strings(&["limited", "degraded", "maintenance"]),
                ok: strings(&[
                    "all services are up",
                    "services are available",
                    "up and running",
                    "no issues",
                ]),
            },
        },
        PlatformConfig {
            name: "Xbox".to_string(),
            hosts: strings(&[
                "xsts.auth.xboxlive.com",
                "title.mgt.xboxlive.com",
                "support.xbox.com",
            ]),
            urls: strings(&[
                "https://xsts.auth.xboxlive.com",
                "https://title.mgt.xboxlive.com",
                "https://support.xbox.com/en-US/xbox-live-status",
            ]),
            status_url: "https://support.xbox.com/en-US/xbox-live-status".to_string(),
            keywords: KeywordConfig {
                bad: strings(&["major outage", "outage", "down"]),
                warn: strings(&["limited", "degraded", "maintenance"]),
                ok: strings(&[
                    "all services up",
                    "services are available",
                    "no problems",
                    "up and running",
                ]),
            },
        },
        PlatformConfig {
            name: "Switch".to_string(),
            hosts: strings(&[
                "accounts.nintendo.com",
                "ec.nintendo.com",
                "www.nintendo.co.jp",
            ]),
            urls: strings(&[
                "https://accounts.nintendo.com",
                "https://ec.nintendo.com",
                "https://www.nintendo.co.jp/netinfo/en_US/index.html",
            ]),
            status_url: "https://www.nintendo.co.jp/netinfo/en_US/index.html".to_string(),
            keywords: KeywordConfig {
                bad: strings(&[
                    "service outage",
                    "outage",
                    "down",
                    "experiencing issues",
                ]),
                warn: strings(&[
                    "under maintenance",
                    "maintenance",
                    "scheduled maintenance",
                ]),
                ok: strings(&[
                    "operating normally",
                    "all servers are operating normally",
                    "no issues",
                ]),
            },
        },
    ]
}

fn default_maintenance_url() -> String {
    "https://eu.support.blizzard.com/en/article/000358479".to_string()
}

fn default_product_keyword() -> String {
    "overwatch".to_string()
}

fn default_known_issues_feed() -> String {
    "https://us.forums.blizzard.com/en/overwatch/c/overwatch-2/known-issues/64.json".to_string()
}

fn default_known_issues_listing() -> String {
    "https://us.forums.blizzard.com/en/overwatch/c/overwatch-2/known-issues/64".to_string()
}

fn default_forum_base_url() -> String {
    "https://us.forums.blizzard.com/en/overwatch".to_string()
}

fn default_tcp_timeout() -> Duration {
    Duration::from_secs(3)
}

fn default_dns_timeout() -> Duration {
    Duration::from_secs(3)
}

fn default_http_probe_timeout() -> Duration {
    Duration::from_secs(6)
}

fn default_status_page_timeout() -> Duration {
    Duration::from_secs(8)
}

fn default_maintenance_timeout() -> Duration {
    Duration::from_secs(20)
}

fn default_known_issues_timeout() -> Duration {
    Duration::from_secs(12)
}

fn default_webhook_timeout() -> Duration {
    Duration::from_secs(20)
}

// --- Default trait impls ---

impl Default for Config {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            webhook: WebhookConfig::default(),
            report: ReportConfig::default(),
            thresholds: ThresholdConfig::default(),
            regions: RegionsConfig::default(),
            platforms: default_platforms(),
            quorum: default_quorum(),
            advisories: AdvisoryConfig::default(),
            timeouts: TimeoutConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            thumbnail_url: String::new(),
            image_url: String::new(),
            sparkline_path: default_sparkline_path(),
            support_url: default_support_url(),
            trend_threshold_ms: default_trend_threshold_ms(),
        }
    }
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            info_ms: default_info_ms(),
            warn_ms: default_warn_ms(),
        }
    }
}

impl Default for RegionsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled_regions(),
            hosts: default_region_hosts(),
            port: default_port(),
        }
    }
}

impl Default for AdvisoryConfig {
    fn default() -> Self {
        Self {
            maintenance_url: default_maintenance_url(),
            product_keyword: default_product_keyword(),
            known_issues_feed: default_known_issues_feed(),
            known_issues_listing: default_known_issues_listing(),
            forum_base_url: default_forum_base_url(),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            tcp: default_tcp_timeout(),
            dns: default_dns_timeout(),
            http_probe: default_http_probe_timeout(),
            status_page: default_status_page_timeout(),
            maintenance: default_maintenance_timeout(),
            known_issues: default_known_issues_timeout(),
            webhook: default_webhook_timeout(),
        }
    }
}

// --- Loading, environment overrides and validation ---

impl Config {
    /// Load configuration from an optional YAML file, apply environment
    /// overrides through `lookup`, and validate.
    pub fn load<F>(path: Option<&Path>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = match path {
            Some(path) => {
                let data = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config file {}", path.display()))?;

                serde_yaml::from_str::<Config>(&data)
                    .with_context(|| format!("parsing config file {}", path.display()))?
            }
            None => Config::default(),
        };

        cfg.apply_env(lookup)?;
        cfg.validate()?;

        Ok(cfg)
    }

    /// Apply environment-style overrides. Blank values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(url) = get("DISCORD_WEBHOOK_URL") {
            self.webhook.url = url;
        }

        if let Some(url) = get("THUMB_URL") {
            self.report.thumbnail_url = url;
        }

        if let Some(list) = get("REGIONS") {
            self.regions.enabled = list
                .split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Some(raw) = get("INFO_MS") {
            self.thresholds.info_ms = raw
                .parse()
                .with_context(|| format!("parsing INFO_MS value {raw:?}"))?;
        }

        if let Some(raw) = get("WARN_MS") {
            self.thresholds.warn_ms = raw
                .parse()
                .with_context(|| format!("parsing WARN_MS value {raw:?}"))?;
        }

        if let Some(repo) = get("GITHUB_REPOSITORY") {
            if self.report.image_url.is_empty() {
                self.report.image_url = format!(
                    "https://raw.githubusercontent.com/{repo}/main/{}",
                    self.report.sparkline_path.display()
                );
            }
        }

        if let Some(dir) = get("OW_STATE_DIR") {
            self.state_dir = PathBuf::from(dir);
        }

        Ok(())
    }

    /// Validate the configuration for required fields and consistency.
    pub fn validate(&self) -> Result<()> {
        if self.webhook.url.is_empty() {
            bail!("webhook.url (or DISCORD_WEBHOOK_URL) is required");
        }
        webhook_parts(&self.webhook.url).context("invalid webhook.url")?;

        let t = &self.thresholds;
        if !t.info_ms.is_finite() || !t.warn_ms.is_finite() {
            bail!("thresholds must be finite numbers");
        }
        if t.info_ms < 0.0 {
            bail!("thresholds.info_ms must not be negative");
        }
        if t.warn_ms <= t.info_ms {
            bail!(
                "thresholds.warn_ms ({}) must be greater than thresholds.info_ms ({})",
                t.warn_ms,
                t.info_ms
            );
        }

        if self.regions.hosts.is_empty() {
            bail!("regions.hosts must name at least one region");
        }
        for (region, hosts) in &self.regions.hosts {
            if hosts.is_empty() {
                bail!("region {region} has no hosts");
            }
        }

        if !(1..=3).contains(&self.quorum) {
            bail!("quorum must be between 1 and 3, got {}", self.quorum);
        }

        for platform in &self.platforms {
            if platform.name.is_empty() {
                bail!("platform name must not be empty");
            }
            if platform.hosts.is_empty() {
                bail!("platform {} has no hosts", platform.name);
            }
        }

        let timeouts = [
            ("tcp", self.timeouts.tcp),
            ("dns", self.timeouts.dns),
            ("http_probe", self.timeouts.http_probe),
            ("status_page", self.timeouts.status_page),
            ("maintenance", self.timeouts.maintenance),
            ("known_issues", self.timeouts.known_issues),
            ("webhook", self.timeouts.webhook),
        ];
        for (name, timeout) in timeouts {
            if timeout.is_zero() {
                bail!("timeouts.{name} must be positive");
            }
        }

        Ok(())
    }

    /// Latency thresholds as used by the classifier.
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            info_ms: self.thresholds.info_ms,
            warn_ms: self.thresholds.warn_ms,
        }
    }

    /// Regions to probe with their hosts, in allow-list order.
    ///
    /// Unknown names are dropped. When nothing remains, the default regions
    /// present in the host table are used.
    pub fn active_regions(&self) -> Vec<(String, Vec<String>)> {
        let selected = self.pick_regions(self.regions.enabled.iter().map(String::as_str));
        if !selected.is_empty() {
            return selected;
        }

        let defaults = self.pick_regions(DEFAULT_REGIONS.iter().copied());
        if !defaults.is_empty() {
            return defaults;
        }

        self.regions
            .hosts
            .iter()
            .map(|(r, h)| (r.clone(), h.clone()))
            .collect()
    }

    fn pick_regions<'a, I>(&self, names: I) -> Vec<(String, Vec<String>)>
    where
        I: Iterator<Item = &'a str>,
    {
        let mut out: Vec<(String, Vec<String>)> = Vec::new();
        for name in names {
            if out.iter().any(|(r, _)| r == name) {
                continue;
            }
            if let Some(hosts) = self.regions.hosts.get(name) {
                out.push((name.to_string(), hosts.clone()));
            }
        }
        out
    }
}
