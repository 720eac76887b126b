//! Heartbeat reporting for micwatch.
//!
//! This crate provides a trait-based abstraction for sending status
//! heartbeats, with an implementation for the ActivityWatch REST API.

mod activitywatch;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub use activitywatch::{ActivityWatchClient, BucketInfo, ClientConfig};

/// Errors that can occur while talking to the server.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Server returned {status}: {body}")]
    ApiError { status: u16, body: String },

    #[error("Invalid server URL: {0}")]
    InvalidUrl(String),
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// An ActivityWatch event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    /// Length in seconds. Heartbeats are sent with zero duration and grown by
    /// the server when they merge.
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl Event {
    pub fn new(timestamp: DateTime<Utc>, data: Map<String, Value>) -> Self {
        Self {
            timestamp,
            duration: 0.0,
            data,
        }
    }

    /// An event carrying only a `title` entry.
    pub fn with_title(timestamp: DateTime<Utc>, title: impl Into<String>) -> Self {
        let mut data = Map::new();
        data.insert("title".to_owned(), Value::String(title.into()));
        Self::new(timestamp, data)
    }

    pub fn title(&self) -> Option<&str> {
        self.data.get("title").and_then(Value::as_str)
    }
}

/// Trait for heartbeat receivers.
///
/// A heartbeat is merged by the receiver into the previous event of the bucket
/// when its data is identical and it arrives within `pulsetime` seconds of
/// that event's end.
#[async_trait]
pub trait HeartbeatSink: Send + Sync {
    /// Send one heartbeat to a bucket.
    async fn heartbeat(&self, bucket_id: &str, event: &Event, pulsetime: f64) -> Result<()>;

    /// Returns the name of this sink for logging/debugging.
    fn name(&self) -> &str;
}

#[async_trait]
impl<T: HeartbeatSink + ?Sized> HeartbeatSink for Arc<T> {
    async fn heartbeat(&self, bucket_id: &str, event: &Event, pulsetime: f64) -> Result<()> {
        (**self).heartbeat(bucket_id, event, pulsetime).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
