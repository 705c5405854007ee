//! Broker-facing side of the bridge.
//!
//! The core never talks to a broker client directly. It hands a compact JSON
//! payload to a [`Publisher`] and reads connection state from a shared
//! [`LinkState`] that the transport owner updates. [`JsonLinePublisher`] is the
//! publisher shipped with the binary: one `{"sender":..,"message":..}` line per
//! SMS on stdout or appended to a file, ready for `mosquitto_pub -l -t <topic>`.

use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::debug;
use serde::Serialize;
use thiserror::Error;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Topic used when the configuration does not override it.
pub const DEFAULT_TOPIC: &str = "sim_bridge/sms";

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("transport not connected")]
    NotConnected,
    #[error("publish timed out after {0} ms")]
    Timeout(u64),
    #[error("broker rejected message: {0}")]
    Rejected(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// JSON body published for each SMS.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SmsPayload<'a> {
    pub sender: &'a str,
    pub message: &'a str,
}

impl<'a> SmsPayload<'a> {
    pub fn new(sender: &'a str, message: &'a str) -> Self { Self { sender, message } }

    /// Compact (unformatted) JSON.
    pub fn to_json(&self) -> Result<String, PublishError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Broker client seam. A returned error keeps the SMS in modem storage.
pub trait Publisher {
    fn publish(&mut self, topic: &str, payload: &str) -> impl Future<Output = Result<(), PublishError>> + Send;
}

/// Connection status of the publish transport, shared with whoever owns it.
#[derive(Debug, Clone, Default)]
pub struct LinkState {
    connected: Arc<AtomicBool>,
}

impl LinkState {
    pub fn new(connected: bool) -> Self {
        Self { connected: Arc::new(AtomicBool::new(connected)) }
    }

    pub fn is_connected(&self) -> bool { self.connected.load(Ordering::Acquire) }

    pub fn set_connected(&self, connected: bool) { self.connected.store(connected, Ordering::Release); }
}

/// Writes one JSON payload per line.
pub struct JsonLinePublisher<W> {
    out: W,
    with_topic: bool,
}

impl JsonLinePublisher<tokio::io::Stdout> {
    pub fn stdout() -> Self { Self { out: tokio::io::stdout(), with_topic: false } }
}

impl JsonLinePublisher<tokio::fs::File> {
    /// Append to `path`, creating it if needed.
    pub async fn append_to(path: impl Into<PathBuf>) -> Result<Self, PublishError> {
        let path = path.into();
        let file = OpenOptions::new().create(true).append(true).open(&path).await?;
        debug!("Publishing to {}", path.display());
        Ok(Self { out: file, with_topic: false })
    }
}

impl<W: AsyncWrite + Unpin + Send> JsonLinePublisher<W> {
    pub fn new(out: W) -> Self { Self { out, with_topic: false } }

    /// Prefix each line with `<topic> ` (for multi-topic consumers).
    pub fn with_topic_prefix(mut self, enabled: bool) -> Self {
        self.with_topic = enabled;
        self
    }

    pub fn into_inner(self) -> W { self.out }
}

impl<W: AsyncWrite + Unpin + Send> Publisher for JsonLinePublisher<W> {
    async fn publish(&mut self, topic: &str, payload: &str) -> Result<(), PublishError> {
        let line = if self.with_topic {
            format!("{} {}\n", topic, payload)
        } else {
            format!("{}\n", payload)
        };
        self.out.write_all(line.as_bytes()).await?;
        self.out.flush().await?;
        Ok(())
    }
}
