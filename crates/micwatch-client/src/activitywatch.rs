//! ActivityWatch server REST client.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::{Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{ClientError, Event, HeartbeatSink, Result};

/// Connection settings for an ActivityWatch server.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    /// Name of the reporting watcher
    pub client_name: String,
    /// Name of this machine, part of the bucket id
    pub hostname: String,
}

impl ClientConfig {
    /// Create a config for this machine's hostname.
    pub fn new(host: impl Into<String>, port: u16, client_name: impl Into<String>) -> Self {
        let hostname = hostname::get()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".to_owned());
        Self {
            host: host.into(),
            port,
            client_name: client_name.into(),
            hostname,
        }
    }

    /// Override the reported hostname.
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    /// Bucket id used by this watcher on this machine.
    pub fn bucket_id(&self) -> String {
        format!("{}_{}", self.client_name, self.hostname)
    }
}

/// Bucket metadata as listed by the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BucketInfo {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub event_type: String,
    #[serde(default)]
    pub client: String,
    #[serde(default)]
    pub hostname: String,
}

#[derive(Debug, Serialize)]
struct CreateBucket<'a> {
    client: &'a str,
    #[serde(rename = "type")]
    event_type: &'a str,
    hostname: &'a str,
}

/// ActivityWatch REST API client.
#[derive(Debug, Clone)]
pub struct ActivityWatchClient {
    client: reqwest::Client,
    base_url: Url,
    config: ClientConfig,
}

impl ActivityWatchClient {
    /// Create a client for the server described by `config`.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let base_url = Url::parse(&format!("http://{}:{}/api/0/", config.host, config.port))
            .map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
            config,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn bucket_id(&self) -> String {
        self.config.bucket_id()
    }

    /// Build an API URL below `/api/0/`, percent-encoding each segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// List all buckets on the server, keyed by id.
    pub async fn get_buckets(&self) -> Result<HashMap<String, BucketInfo>> {
        let url = self.endpoint(&["buckets", ""])?;
        let response = check(self.client.get(url).send().await?).await?;
        Ok(response.json().await?)
    }

    /// Create a bucket. An already existing bucket is not an error.
    pub async fn create_bucket(&self, bucket_id: &str, event_type: &str) -> Result<()> {
        let url = self.endpoint(&["buckets", bucket_id])?;
        let body = CreateBucket {
            client: &self.config.client_name,
            event_type,
            hostname: &self.config.hostname,
        };

        let response = self.client.post(url).json(&body).send().await?;
        if response.status() == StatusCode::NOT_MODIFIED {
            debug!(bucket_id, "Bucket already exists");
            return Ok(());
        }
        check(response).await?;
        info!(bucket_id, event_type, "Created bucket");
        Ok(())
    }

    /// Make sure this watcher's bucket exists and return its id.
    pub async fn ensure_bucket(&self, event_type: &str) -> Result<String> {
        let bucket_id = self.bucket_id();
        if !self.get_buckets().await?.contains_key(&bucket_id) {
            self.create_bucket(&bucket_id, event_type).await?;
        }
        Ok(bucket_id)
    }
}

#[async_trait]
impl HeartbeatSink for ActivityWatchClient {
    async fn heartbeat(&self, bucket_id: &str, event: &Event, pulsetime: f64) -> Result<()> {
        let url = self.endpoint(&["buckets", bucket_id, "heartbeat"])?;
        debug!(bucket_id, pulsetime, title = ?event.title(), "Sending heartbeat");

        let response = self
            .client
            .post(url)
            .query(&[("pulsetime", pulsetime)])
            .json(event)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "activitywatch"
    }
}

/// Turn a non-success response into an [`ClientError::ApiError`].
async fn check(response: Response) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::ApiError {
        status: status.as_u16(),
        body,
    })
}
