use std::future::Future;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::header::{HeaderMap, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{StatusCode, Url};
use serde::Deserialize;

use super::{PublishError, MAX_BACKOFF};
use crate::probe::user_agent;

/// Backoff assumed when a rate-limit response carries no usable `Retry-After`.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Result of a single create or edit call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The message exists with this identifier.
    Delivered(String),
    /// The message to edit no longer exists.
    NotFound,
    /// Rate limited; retry after the given delay.
    RateLimited(Duration),
}

/// Remote channel holding the single status message.
pub trait MessageChannel: Send + Sync {
    /// Post a new message with the given JSON payload.
    fn create(
        &self,
        payload: &[u8],
    ) -> impl Future<Output = Result<SendOutcome, PublishError>> + Send;

    /// Replace the content of message `id` with the given JSON payload.
    fn edit(
        &self,
        id: &str,
        payload: &[u8],
    ) -> impl Future<Output = Result<SendOutcome, PublishError>> + Send;
}

impl<T: MessageChannel> MessageChannel for &T {
    fn create(
        &self,
        payload: &[u8],
    ) -> impl Future<Output = Result<SendOutcome, PublishError>> + Send {
        (**self).create(payload)
    }

    fn edit(
        &self,
        id: &str,
        payload: &[u8],
    ) -> impl Future<Output = Result<SendOutcome, PublishError>> + Send {
        (**self).edit(id, payload)
    }
}

/// Split a webhook URL into its `(id, token)` path segments.
pub fn webhook_parts(url: &str) -> Result<(String, String)> {
    let parsed = Url::parse(url).with_context(|| format!("parsing webhook URL {url:?}"))?;

    let segments: Vec<&str> = parsed
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    let Some(pos) = segments.iter().position(|seg| *seg == "webhooks") else {
        bail!("webhook URL has no /webhooks/ segment");
    };

    match (segments.get(pos + 1), segments.get(pos + 2)) {
        (Some(id), Some(token)) => Ok(((*id).to_string(), (*token).to_string())),
        _ => bail!("webhook URL must end in /webhooks/<id>/<token>"),
    }
}

/// `Retry-After` in seconds, possibly fractional. Values beyond
/// [`MAX_BACKOFF`] are capped before conversion.
fn retry_after(headers: &HeaderMap) -> Duration {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(|secs| Duration::from_secs_f64(secs.min(MAX_BACKOFF.as_secs_f64())))
        .unwrap_or(DEFAULT_RETRY_AFTER)
}

#[derive(Debug, Deserialize)]
struct CreatedMessage {
    id: String,
}

/// Discord webhook channel.
pub struct DiscordWebhook {
    http: reqwest::Client,
    base: Url,
    /// Forum or thread channel the message lives in.
    thread_id: Option<String>,
}

impl DiscordWebhook {
    /// Create a channel for `url`. Apart from `thread_id`, query string and
    /// fragment are dropped.
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        webhook_parts(url)?;

        let mut base = Url::parse(url).context("parsing webhook URL")?;
        let thread_id = base
            .query_pairs()
            .find(|(key, _)| key == "thread_id")
            .map(|(_, value)| value.trim().to_string())
            .filter(|id| !id.is_empty());
        base.set_query(None);
        base.set_fragment(None);

        let http = reqwest::Client::builder()
            .user_agent(user_agent())
            .timeout(timeout)
            .build()
            .context("building webhook HTTP client")?;

        Ok(Self {
            http,
            base,
            thread_id,
        })
    }

    fn with_thread(&self, mut url: Url) -> Url {
        if let Some(thread) = &self.thread_id {
            url.query_pairs_mut().append_pair("thread_id", thread);
        }
        url
    }

    fn create_url(&self) -> Url {
        let mut url = self.base.clone();
        url.query_pairs_mut().append_pair("wait", "true");
        self.with_thread(url)
    }

    fn message_url(&self, id: &str) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("messages").push(id);
        }
        self.with_thread(url)
    }

    async fn read_error(response: reqwest::Response) -> PublishError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        PublishError::Status { status, body }
    }
}

impl MessageChannel for DiscordWebhook {
    async fn create(&self, payload: &[u8]) -> Result<SendOutcome, PublishError> {
        let response = self
            .http
            .post(self.create_url())
            .header(CONTENT_TYPE, "application/json")
            .body(payload.to_vec())
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Ok(SendOutcome::RateLimited(retry_after(response.headers())));
        }
        if !status.is_success() {
            return Err(Self::read_error(response).await);
        }

        let created: CreatedMessage = response
            .json()
            .await
            .map_err(|_| PublishError::MissingId)?;
        Ok(SendOutcome::Delivered(created.id))
    }

    async fn edit(&self, id: &str, payload: &[u8]) -> Result<SendOutcome, PublishError> {
        let response = self
            .http
            .patch(self.message_url(id))
            .header(CONTENT_TYPE, "application/json")
            .body(payload.to_vec())
            .send()
            .await?;

        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => {
                Ok(SendOutcome::RateLimited(retry_after(response.headers())))
            }
            StatusCode::NOT_FOUND => Ok(SendOutcome::NotFound),
            status if status.is_success() => Ok(SendOutcome::Delivered(id.to_string())),
            _ => Err(Self::read_error(response).await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn test_webhook_parts() {
        let (id, token) =
            webhook_parts("https://discord.com/api/webhooks/123456/tok-EN_x?thread_id=9")
                .expect("valid");
        assert_eq!(id, "123456");
        assert_eq!(token, "tok-EN_x");

        assert!(webhook_parts("https://discord.com/api/webhooks/123456").is_err());
        assert!(webhook_parts("https://discord.com/api/channels/1/2").is_err());
        assert!(webhook_parts("not a url").is_err());
    }

    #[test]
    fn test_retry_after_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after(&headers), DEFAULT_RETRY_AFTER);

        headers.insert(RETRY_AFTER, "2".parse().expect("header"));
        assert_eq!(retry_after(&headers), Duration::from_secs(2));

        headers.insert(RETRY_AFTER, "0.5".parse().expect("header"));
        assert_eq!(retry_after(&headers), Duration::from_millis(500));

        headers.insert(RETRY_AFTER, "soon".parse().expect("header"));
        assert_eq!(retry_after(&headers), DEFAULT_RETRY_AFTER);

        headers.insert(RETRY_AFTER, "1e20".parse().expect("header"));
        assert_eq!(retry_after(&headers), MAX_BACKOFF);

        headers.insert(RETRY_AFTER, "3600".parse().expect("header"));
        assert_eq!(retry_after(&headers), MAX_BACKOFF);
    }

    #[tokio::test]
    async fn test_huge_retry_after_is_capped() {
        let mut server = mockito::Server::new_async().await;
        let _limited = server
            .mock("PATCH", "/api/webhooks/1/tok/messages/42")
            .with_status(429)
            .with_header("retry-after", "1e20")
            .create_async()
            .await;

        let hook = DiscordWebhook::new(&format!("{}/api/webhooks/1/tok", server.url()), TIMEOUT)
            .expect("hook");
        assert_eq!(
            hook.edit("42", b"{}").await.expect("edit"),
            SendOutcome::RateLimited(MAX_BACKOFF)
        );
    }

    #[tokio::test]
    async fn test_thread_id_is_kept() {
        let mut server = mockito::Server::new_async().await;
        let create = server
            .mock("POST", "/api/webhooks/1/tok")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("wait".into(), "true".into()),
                mockito::Matcher::UrlEncoded("thread_id".into(), "77".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"id":"5"}"#)
            .create_async()
            .await;
        let edit = server
            .mock("PATCH", "/api/webhooks/1/tok/messages/5")
            .match_query(mockito::Matcher::UrlEncoded("thread_id".into(), "77".into()))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let hook = DiscordWebhook::new(
            &format!("{}/api/webhooks/1/tok?thread_id=77&wait=false", server.url()),
            TIMEOUT,
        )
        .expect("hook");

        assert_eq!(
            hook.create(b"{}").await.expect("create"),
            SendOutcome::Delivered("5".to_string())
        );
        assert_eq!(
            hook.edit("5", b"{}").await.expect("edit"),
            SendOutcome::Delivered("5".to_string())
        );
        create.assert_async().await;
        edit.assert_async().await;
    }

    #[tokio::test]
    async fn test_create_posts_with_wait() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/webhooks/1/tok")
            .match_query(mockito::Matcher::UrlEncoded("wait".into(), "true".into()))
            .match_header("content-type", "application/json")
            .match_body(r#"{"embeds":[]}"#)
            .with_status(200)
            .with_body(r#"{"id":"998877","channel_id":"1"}"#)
            .create_async()
            .await;

        let hook = DiscordWebhook::new(&format!("{}/api/webhooks/1/tok", server.url()), TIMEOUT)
            .expect("hook");
        let outcome = hook.create(br#"{"embeds":[]}"#).await.expect("create");
        assert_eq!(outcome, SendOutcome::Delivered("998877".to_string()));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_edit_statuses() {
        let mut server = mockito::Server::new_async().await;
        let _ok = server
            .mock("PATCH", "/api/webhooks/1/tok/messages/42")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;
        let _gone = server
            .mock("PATCH", "/api/webhooks/1/tok/messages/43")
            .with_status(404)
            .with_body(r#"{"message":"Unknown Message","code":10008}"#)
            .create_async()
            .await;
        let _limited = server
            .mock("PATCH", "/api/webhooks/1/tok/messages/44")
            .with_status(429)
            .with_header("retry-after", "3")
            .create_async()
            .await;
        let _broken = server
            .mock("PATCH", "/api/webhooks/1/tok/messages/45")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let hook = DiscordWebhook::new(
            &format!("{}/api/webhooks/1/tok?wait=true", server.url()),
            TIMEOUT,
        )
        .expect("hook");

        assert_eq!(
            hook.edit("42", b"{}").await.expect("edit"),
            SendOutcome::Delivered("42".to_string())
        );
        assert_eq!(hook.edit("43", b"{}").await.expect("edit"), SendOutcome::NotFound);
        assert_eq!(
            hook.edit("44", b"{}").await.expect("edit"),
            SendOutcome::RateLimited(Duration::from_secs(3))
        );
        match hook.edit("45", b"{}").await {
            Err(PublishError::Status { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }
}
