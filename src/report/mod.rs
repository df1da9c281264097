pub mod sparkline;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::advisory::{KnownIssues, MaintenanceNotice};
use crate::config::Config;
use crate::platform::PlatformStatus;
use crate::probe::latency::{RegionMeasurement, Trend};
use crate::severity::Severity;
use crate::state::history::{changelog_time, ChangelogEntry, Uptime};

/// Changelog entries shown in the report.
pub const CHANGES_SHOWN: usize = 2;

/// Longest known-issue title quoted in the report, in characters.
const TITLE_LIMIT: usize = 200;

const BUTTON_LINK_STYLE: u8 = 5;
const COMPONENT_ACTION_ROW: u8 = 1;
const COMPONENT_BUTTON: u8 = 2;

// --- Wire payload ---

/// Webhook message body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Payload {
    pub embeds: Vec<Embed>,
    pub components: Vec<ActionRow>,
}

impl Payload {
    /// Compact JSON bytes, as sent.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).context("serializing report payload")
    }
}

/// A rendered payload plus the bytes used to detect changes between runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPayload {
    /// Full message body.
    pub body: Vec<u8>,
    /// Body without per-run details. Equal signals give equal snapshots.
    pub snapshot: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Embed {
    pub title: String,
    pub description: String,
    pub color: u32,
    pub fields: Vec<EmbedField>,
    pub footer: EmbedFooter,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<ImageRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageRef {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionRow {
    #[serde(rename = "type")]
    pub kind: u8,
    pub components: Vec<LinkButton>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkButton {
    #[serde(rename = "type")]
    pub kind: u8,
    pub style: u8,
    pub label: String,
    pub url: String,
}

impl LinkButton {
    fn new(label: &str, url: &str) -> Self {
        Self {
            kind: COMPONENT_BUTTON,
            style: BUTTON_LINK_STYLE,
            label: label.to_string(),
            url: url.to_string(),
        }
    }
}

// --- Run snapshot ---

/// A region's measurement with its movement since the previous run.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionRow {
    pub measurement: RegionMeasurement,
    pub trend: Trend,
}

/// Everything a report shows about one run.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub overall: Severity,
    pub regions: Vec<RegionRow>,
    /// PC row first, then the consoles in configuration order.
    pub platforms: Vec<PlatformStatus>,
    pub maintenance: MaintenanceNotice,
    pub known_issues: KnownIssues,
    pub uptime: Uptime,
    /// Most recent transitions, oldest first.
    pub recent_changes: Vec<ChangelogEntry>,
    /// Whether a sparkline image exists for this run.
    pub has_sparkline: bool,
    pub checked_at: DateTime<Utc>,
}

/// Turns a [`StatusReport`] into a webhook payload. Pure: equal reports
/// render to byte-identical payloads.
pub struct ReportRenderer {
    title: String,
    thumbnail_url: String,
    image_url: String,
    maintenance_url: String,
    support_url: String,
}

impl ReportRenderer {
    pub fn new(cfg: &Config) -> Self {
        Self {
            title: cfg.report.title.clone(),
            thumbnail_url: cfg.report.thumbnail_url.clone(),
            image_url: cfg.report.image_url.clone(),
            maintenance_url: cfg.advisories.maintenance_url.clone(),
            support_url: cfg.report.support_url.clone(),
        }
    }

    /// Render the message body and its change-detection snapshot.
    pub fn render_bytes(&self, report: &StatusReport) -> Result<RenderedPayload> {
        Ok(RenderedPayload {
            body: self.render(report).to_bytes()?,
            snapshot: self.snapshot(report).to_bytes()?,
        })
    }

    /// Render with the check time and the trend glyphs left out. Both
    /// change from run to run even when every signal is the same.
    pub fn snapshot(&self, report: &StatusReport) -> Payload {
        let mut stable = report.clone();
        stable.checked_at = DateTime::<Utc>::UNIX_EPOCH;
        for row in &mut stable.regions {
            row.trend = Trend::Unknown;
        }

        let mut payload = self.render(&stable);
        for embed in &mut payload.embeds {
            embed.footer.text.clear();
            embed.timestamp.clear();
        }
        payload
    }

    pub fn render(&self, report: &StatusReport) -> Payload {
        let mut fields = vec![EmbedField {
            name: "Platforms".to_string(),
            value: platform_block(&report.platforms),
            inline: false,
        }];

        fields.extend(report.regions.iter().map(|row| EmbedField {
            name: format!("{} \u{2013} Reachability", row.measurement.region),
            value: region_value(row),
            inline: true,
        }));

        fields.push(EmbedField {
            name: "Maintenance".to_string(),
            value: format!("[{}]({})", report.maintenance.message, self.maintenance_url),
            inline: false,
        });
        fields.push(EmbedField {
            name: "Known Issues".to_string(),
            value: known_issues_value(&report.known_issues),
            inline: false,
        });
        fields.push(EmbedField {
            name: "Recent Changes".to_string(),
            value: changes_value(&report.recent_changes),
            inline: false,
        });

        let thumbnail = (!self.thumbnail_url.is_empty()).then(|| ImageRef {
            url: self.thumbnail_url.clone(),
        });
        let image = (report.has_sparkline && !self.image_url.is_empty()).then(|| ImageRef {
            url: self.image_url.clone(),
        });

        let embed = Embed {
            title: self.title.clone(),
            description: headline(report),
            color: report.overall.color(),
            fields,
            footer: EmbedFooter {
                text: format!("Last check: {}", changelog_time(report.checked_at)),
            },
            timestamp: report
                .checked_at
                .to_rfc3339_opts(SecondsFormat::Secs, true),
            thumbnail,
            image,
        };

        let buttons = ActionRow {
            kind: COMPONENT_ACTION_ROW,
            components: vec![
                LinkButton::new("Maintenance", &self.maintenance_url),
                LinkButton::new("Known Issues", &report.known_issues.url),
                LinkButton::new("Support", &self.support_url),
            ],
        };

        Payload {
            embeds: vec![embed],
            components: vec![buttons],
        }
    }
}

/// One-line summary of region averages and uptimes, in a code block.
fn headline(report: &StatusReport) -> String {
    let regions: Vec<String> = report
        .regions
        .iter()
        .map(|row| match row.measurement.stats.avg {
            Some(avg) => format!("{} \u{D8}{avg:.0}ms", row.measurement.region),
            None => format!("{} n/a", row.measurement.region),
        })
        .collect();

    format!(
        "```\n{} | 24h {}% \u{2022} 7d {}%\n```",
        regions.join("   "),
        report.uptime.last_24,
        report.uptime.last_7d
    )
}

fn platform_block(platforms: &[PlatformStatus]) -> String {
    let lines: Vec<String> = platforms
        .iter()
        .map(|p| {
            let age = p
                .cached_age_minutes
                .map(|m| format!(" (cached {m}m)"))
                .unwrap_or_default();
            format!(
                "{:<11} {} {:<7}{age}",
                p.name,
                p.state.icon(),
                p.state.as_str().to_uppercase()
            )
        })
        .collect();

    format!("```\n{}\n```", lines.join("\n"))
}

fn region_value(row: &RegionRow) -> String {
    let stats = &row.measurement.stats;
    match (stats.avg, stats.min, stats.max) {
        (Some(avg), Some(min), Some(max)) => {
            format!("\u{D8} {avg:.1} ms ({min:.1}/{max:.1}) {}", row.trend)
        }
        _ => "no measurement".to_string(),
    }
}

fn known_issues_value(ki: &KnownIssues) -> String {
    let Some(count) = ki.count_24h else {
        return format!("[No data]({})", ki.url);
    };

    let label = if count > 0 {
        format!("{count} new/updated posts in 24h")
    } else {
        "No new posts in 24h".to_string()
    };

    match &ki.latest_title {
        Some(title) => format!(
            "[{label}]({})\nLatest: \u{201C}{}\u{201D}",
            ki.url,
            truncate_chars(title, TITLE_LIMIT)
        ),
        None => format!("[{label}]({})", ki.url),
    }
}

fn changes_value(changes: &[ChangelogEntry]) -> String {
    if changes.is_empty() {
        return "\u{2014}".to_string();
    }

    let start = changes.len().saturating_sub(CHANGES_SHOWN);
    changes[start..]
        .iter()
        .map(|c| format!("{} \u{2192} {}", c.at, c.to.as_str().to_uppercase()))
        .collect::<Vec<_>>()
        .join(" \u{2022} ")
}

fn truncate_chars(s: &str, limit: usize) -> String {
    match s.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}\u{2026}", &s[..idx]),
        None => s.to_string(),
    }
}
