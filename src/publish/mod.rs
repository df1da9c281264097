pub mod webhook;

use std::fmt;
use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::{info, warn};

use crate::state::StateStore;

use self::webhook::{MessageChannel, SendOutcome};

/// Calls per create or edit before a rate limit becomes fatal.
pub const MAX_ATTEMPTS: u32 = 4;

/// Bounds applied to the server-provided backoff.
pub const MIN_BACKOFF: Duration = Duration::from_secs(1);
pub const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Failures of the publish step.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("still rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },

    #[error("webhook returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("webhook request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("webhook response carried no message id")]
    MissingId,
}

/// Clamp a `Retry-After` delay into `[MIN_BACKOFF, MAX_BACKOFF]`.
pub fn clamp_backoff(delay: Duration) -> Duration {
    delay.clamp(MIN_BACKOFF, MAX_BACKOFF)
}

/// Run `op` until it is not rate limited, sleeping for the clamped
/// server-provided delay between attempts. Gives up after [`MAX_ATTEMPTS`].
pub async fn with_rate_limit_retry<F, Fut>(
    action: &str,
    mut op: F,
) -> Result<SendOutcome, PublishError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<SendOutcome, PublishError>>,
{
    for attempt in 1..=MAX_ATTEMPTS {
        match op().await? {
            SendOutcome::RateLimited(delay) if attempt < MAX_ATTEMPTS => {
                let backoff = clamp_backoff(delay);
                warn!(action, attempt, backoff = ?backoff, "rate limited, retrying");
                tokio::time::sleep(backoff).await;
            }
            SendOutcome::RateLimited(_) => break,
            outcome => return Ok(outcome),
        }
    }

    Err(PublishError::RateLimited {
        attempts: MAX_ATTEMPTS,
    })
}

/// What the publish step did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Payload identical to the last published one; no remote call made.
    Unchanged,
    /// Existing message edited in place.
    Edited(String),
    /// New message created (none existed, or the old one was deleted).
    Created(String),
}

impl PublishOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishOutcome::Unchanged => "unchanged",
            PublishOutcome::Edited(_) => "edited",
            PublishOutcome::Created(_) => "created",
        }
    }
}

impl fmt::Display for PublishOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keeps one remote message in sync with the rendered payload.
pub struct Publisher<'a, C> {
    channel: C,
    store: &'a StateStore,
}

impl<'a, C: MessageChannel> Publisher<'a, C> {
    pub fn new(channel: C, store: &'a StateStore) -> Self {
        Self { channel, store }
    }

    /// Publish `payload` unless `snapshot` matches the last published one.
    ///
    /// Edits the known message, or creates one when there is none or the
    /// remote reports it gone. The snapshot and message id are persisted
    /// only after the remote call succeeded.
    pub async fn publish(&self, payload: &[u8], snapshot: &[u8]) -> Result<PublishOutcome> {
        if self.store.last_payload().as_deref() == Some(snapshot) {
            info!("payload unchanged, skipping publish");
            return Ok(PublishOutcome::Unchanged);
        }

        let outcome = match self.store.message_id() {
            Some(id) => match self.edit(&id, payload).await? {
                Some(outcome) => outcome,
                None => {
                    info!(message_id = %id, "status message no longer exists, creating a new one");
                    self.store.clear_message_id()?;
                    self.create(payload).await?
                }
            },
            None => self.create(payload).await?,
        };

        self.store.save_last_payload(snapshot)?;
        info!(outcome = %outcome, "status message published");

        Ok(outcome)
    }

    /// `None` when the message is gone.
    async fn edit(&self, id: &str, payload: &[u8]) -> Result<Option<PublishOutcome>> {
        let outcome = with_rate_limit_retry("edit", || self.channel.edit(id, payload))
            .await
            .context("editing status message")?;

        Ok(match outcome {
            SendOutcome::Delivered(id) => Some(PublishOutcome::Edited(id)),
            _ => None,
        })
    }

    async fn create(&self, payload: &[u8]) -> Result<PublishOutcome> {
        let outcome = with_rate_limit_retry("create", || self.channel.create(payload))
            .await
            .context("creating status message")?;

        let SendOutcome::Delivered(id) = outcome else {
            return Err(PublishError::MissingId).context("creating status message");
        };

        self.store.save_message_id(&id)?;
        Ok(PublishOutcome::Created(id))
    }
}
