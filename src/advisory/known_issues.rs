use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::config::AdvisoryConfig;
use crate::probe::Network;

/// Discourse `topic_list` response, reduced to the fields used here.
#[derive(Debug, Default, Deserialize)]
struct TopicListResponse {
    #[serde(default)]
    topic_list: TopicList,
}

#[derive(Debug, Default, Deserialize)]
struct TopicList {
    #[serde(default)]
    topics: Vec<Topic>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Topic {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub last_posted_at: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub bumped_at: Option<String>,
}

impl Topic {
    /// Most recent activity, falling back from last post to creation to bump.
    /// `None` when no timestamp is present; an unparsable one counts as the
    /// epoch.
    fn activity(&self) -> Option<DateTime<Utc>> {
        let raw = self
            .last_posted_at
            .as_deref()
            .or(self.created_at.as_deref())
            .or(self.bumped_at.as_deref())?;

        Some(
            DateTime::parse_from_rfc3339(raw)
                .map(|ts| ts.with_timezone(&Utc))
                .unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        )
    }
}

/// Summary of the known-issues feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownIssues {
    /// Topics active in the last 24 hours. `None` when the feed was unavailable.
    pub count_24h: Option<usize>,
    /// Title of the most recently active topic.
    pub latest_title: Option<String>,
    /// Permalink of that topic, or the listing page.
    pub url: String,
}

impl KnownIssues {
    pub fn unavailable(listing: &str) -> Self {
        Self {
            count_24h: None,
            latest_title: None,
            url: listing.to_string(),
        }
    }
}

/// Count recent topics and pick the most recently active one.
pub fn summarize(topics: &[Topic], now: DateTime<Utc>, cfg: &AdvisoryConfig) -> KnownIssues {
    let day_ago = now - chrono::Duration::hours(24);

    let mut count = 0;
    let mut latest: Option<(DateTime<Utc>, &Topic)> = None;

    for topic in topics {
        let Some(ts) = topic.activity() else {
            continue;
        };
        if ts >= day_ago {
            count += 1;
        }
        if ts > DateTime::<Utc>::UNIX_EPOCH && latest.map_or(true, |(best, _)| ts > best) {
            latest = Some((ts, topic));
        }
    }

    let latest = latest.map(|(_, topic)| topic);
    let url = latest
        .and_then(|t| match (t.slug.as_deref(), t.id) {
            (Some(slug), Some(id)) if !slug.is_empty() => Some(format!(
                "{}/t/{slug}/{id}",
                cfg.forum_base_url.trim_end_matches('/')
            )),
            _ => None,
        })
        .unwrap_or_else(|| cfg.known_issues_listing.clone());

    KnownIssues {
        count_24h: Some(count),
        latest_title: latest.and_then(|t| t.title.clone()),
        url,
    }
}

async fn fetch_topics<N: Network>(net: &N, url: &str, timeout: Duration) -> Result<Vec<Topic>> {
    let page = net.get(url, timeout).await?;
    if !page.is_success() {
        bail!("known-issues feed returned status {}", page.status);
    }

    let parsed: TopicListResponse =
        serde_json::from_str(&page.body).context("decoding known-issues feed")?;

    Ok(parsed.topic_list.topics)
}

/// Fetch and summarize the known-issues feed. Any failure yields
/// [`KnownIssues::unavailable`].
pub async fn check_known_issues<N: Network>(
    net: &N,
    cfg: &AdvisoryConfig,
    timeout: Duration,
    now: DateTime<Utc>,
) -> KnownIssues {
    match fetch_topics(net, &cfg.known_issues_feed, timeout).await {
        Ok(topics) => summarize(&topics, now, cfg),
        Err(e) => {
            debug!(error = %e, "known-issues feed unavailable");
            KnownIssues::unavailable(&cfg.known_issues_listing)
        }
    }
}
