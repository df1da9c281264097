pub mod latency;

use std::future::Future;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use thiserror::Error;
use tokio::net::{lookup_host, TcpStream};

/// Why a single probe did not produce a value.
///
/// Probes never propagate this past their caller: every call site folds it
/// into `None`, `false` or `Severity::Unknown`.
#[derive(Debug, Error)]
pub enum Unreachable {
    #[error("{target}: timed out after {timeout:?}")]
    Timeout { target: String, timeout: Duration },

    #[error("{target}: {source}")]
    Io {
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{target}: no addresses resolved")]
    NoAddress { target: String },

    #[error("{target}: {source}")]
    Http {
        target: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Body and status of an HTTP GET.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub status: u16,
    pub body: String,
}

impl Fetched {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Network primitives used by every probe and fetcher.
pub trait Network: Send + Sync {
    /// Open (and immediately drop) a TCP connection, returning the elapsed time.
    fn connect(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> impl Future<Output = Result<Duration, Unreachable>> + Send;

    /// Resolve a host name, returning the number of addresses found.
    fn resolve(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> impl Future<Output = Result<usize, Unreachable>> + Send;

    /// Send a HEAD request following redirects, returning the final status.
    fn head(
        &self,
        url: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<u16, Unreachable>> + Send;

    /// Send a GET request, returning status and body regardless of status.
    fn get(
        &self,
        url: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<Fetched, Unreachable>> + Send;
}

/// User agent sent with every outbound HTTP request.
pub fn user_agent() -> String {
    format!("OW2-Status/{} (+github-actions)", env!("CARGO_PKG_VERSION"))
}

/// Real network access via tokio sockets and reqwest.
pub struct LiveNetwork {
    http: reqwest::Client,
}

impl LiveNetwork {
    /// Create a network client. Redirects are followed (up to 10 hops).
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(user_agent())
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("building HTTP client")?;

        Ok(Self { http })
    }
}

impl Network for LiveNetwork {
    async fn connect(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<Duration, Unreachable> {
        let target = format!("{host}:{port}");
        let start = Instant::now();

        match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(_stream)) => Ok(start.elapsed()),
            Ok(Err(source)) => Err(Unreachable::Io { target, source }),
            Err(_) => Err(Unreachable::Timeout { target, timeout }),
        }
    }

    async fn resolve(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<usize, Unreachable> {
        let target = host.to_string();

        match tokio::time::timeout(timeout, lookup_host((host, port))).await {
            Ok(Ok(addrs)) => match addrs.count() {
                0 => Err(Unreachable::NoAddress { target }),
                n => Ok(n),
            },
            Ok(Err(source)) => Err(Unreachable::Io { target, source }),
            Err(_) => Err(Unreachable::Timeout { target, timeout }),
        }
    }

    async fn head(&self, url: &str, timeout: Duration) -> Result<u16, Unreachable> {
        let response = self
            .http
            .head(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|source| Unreachable::Http {
                target: url.to_string(),
                source,
            })?;

        Ok(response.status().as_u16())
    }

    async fn get(&self, url: &str, timeout: Duration) -> Result<Fetched, Unreachable> {
        let http_err = |source| Unreachable::Http {
            target: url.to_string(),
            source,
        };

        let response = self
            .http
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(http_err)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(http_err)?;

        Ok(Fetched { status, body })
    }
}
