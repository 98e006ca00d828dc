//! InfluxDB 1.x HTTP write client.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;

use super::line_protocol::{self, Precision};
use super::{Point, PointWriter, StoreError};

/// Connection settings for [`InfluxClient`].
#[derive(Clone, PartialEq, Eq)]
pub struct InfluxConfig {
    pub url: Url,
    pub username: String,
    pub password: String,
    pub database: String,
    pub precision: Precision,
    pub timeout: Duration,
}

impl fmt::Debug for InfluxConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InfluxConfig")
            .field("url", &self.url.as_str())
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("precision", &self.precision)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Writes points one line at a time to `/write`.
///
/// Backed by a pooled `reqwest::Client`, so concurrent writes share
/// connections.
pub struct InfluxClient {
    http: reqwest::Client,
    config: InfluxConfig,
    write_url: Url,
    ping_url: Url,
    closed: AtomicBool,
}

impl InfluxClient {
    pub fn new(config: InfluxConfig) -> Result<Self, StoreError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        let mut write_url = endpoint(&config.url, "write")?;
        write_url
            .query_pairs_mut()
            .append_pair("db", &config.database)
            .append_pair("precision", config.precision.as_str());
        let ping_url = endpoint(&config.url, "ping")?;

        Ok(Self {
            http,
            config,
            write_url,
            ping_url,
            closed: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &InfluxConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.config.username.is_empty() {
            request
        } else {
            request.basic_auth(&self.config.username, Some(&self.config.password))
        }
    }

    fn transport_error(&self, e: reqwest::Error) -> StoreError {
        if e.is_timeout() {
            StoreError::Timeout(self.config.timeout)
        } else {
            StoreError::Transport(e.to_string())
        }
    }

    async fn check_status(response: reqwest::Response) -> Result<(), StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::Server {
            status: status.as_u16(),
            body: body.trim().to_string(),
        })
    }
}

#[async_trait]
impl PointWriter for InfluxClient {
    async fn write(&self, point: &Point) -> Result<(), StoreError> {
        if self.is_closed() {
            return Err(StoreError::Closed);
        }
        let line = line_protocol::encode(point, self.config.precision)?;

        let request = self.authorize(self.http.post(self.write_url.clone())).body(line);
        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        Self::check_status(response).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        if self.is_closed() {
            return Err(StoreError::Closed);
        }
        let request = self.authorize(self.http.get(self.ping_url.clone()));
        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        Self::check_status(response).await
    }

    async fn close(&self) -> Result<(), StoreError> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::info!(url = %self.config.url, "influx client closed");
        }
        Ok(())
    }
}

/// `base` with `segment` appended to its path.
fn endpoint(base: &Url, segment: &str) -> Result<Url, StoreError> {
    let mut url = base.clone();
    url.set_query(None);
    url.path_segments_mut()
        .map_err(|_| StoreError::InvalidUrl(base.to_string()))?
        .pop_if_empty()
        .push(segment);
    Ok(url)
}
