//! # Configuration
//!
//! TOML configuration for the bridge, loaded asynchronously with `tokio::fs`.
//! Every section has defaults, so a file only needs the keys it changes.
//!
//! ```toml
//! [modem]
//! port = "/dev/ttyUSB0"
//! baud_rate = 115200
//!
//! [bridge]
//! fragment_timeout_ms = 10000
//! delete_interval_ms = 500
//!
//! [publish]
//! topic = "sim_bridge/sms"
//! output = "/var/spool/simbridge/sms.jsonl"
//!
//! [logging]
//! level = "info"
//! ```
//!
//! Use [`Config::bridge_settings`] to turn the millisecond fields into the
//! [`BridgeSettings`] the driver consumes.

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::fs;

use crate::bridge::{assembly, deletion, fetch, BridgeSettings};
use crate::modem::framer::{DEFAULT_CAPACITY, DEFAULT_JUNK_LIMIT};
use crate::modem::READ_CHUNK;
use crate::publish::DEFAULT_TOPIC;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub modem: ModemConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub publish: PublishConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModemConfig {
    pub port: String,
    pub baud_rate: u32,
    pub init_step_delay_ms: u64,
    /// Number of bare `AT` probes sent first for auto-baud
    pub probe_attempts: usize,
    pub poll_interval_ms: u64,
    pub buffer_capacity: usize,
    pub junk_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub assembly_slots: usize,
    pub max_fragments: usize,
    pub fragment_timeout_ms: u64,
    pub processed_capacity: usize,
    pub delete_queue_capacity: usize,
    pub delete_interval_ms: u64,
    pub fetch_debounce_ms: u64,
    pub fetch_cooldown_ms: u64,
    /// Periodic re-list; 0 disables
    pub fetch_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    pub topic: String,
    /// File to append JSON lines to; stdout when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    pub topic_prefix: bool,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl Default for ModemConfig {
    fn default() -> Self {
        ModemConfig {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 115200,
            init_step_delay_ms: 1000,
            probe_attempts: 3,
            poll_interval_ms: 100,
            buffer_capacity: DEFAULT_CAPACITY,
            junk_limit: DEFAULT_JUNK_LIMIT,
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        let ms = |d: Duration| d.as_millis() as u64;
        BridgeConfig {
            assembly_slots: assembly::DEFAULT_SLOTS,
            max_fragments: assembly::DEFAULT_MAX_FRAGMENTS,
            fragment_timeout_ms: ms(assembly::DEFAULT_FRAGMENT_TIMEOUT),
            processed_capacity: deletion::DEFAULT_PROCESSED_CAPACITY,
            delete_queue_capacity: deletion::DEFAULT_QUEUE_CAPACITY,
            delete_interval_ms: ms(deletion::DEFAULT_DELETE_INTERVAL),
            fetch_debounce_ms: ms(fetch::DEFAULT_DEBOUNCE),
            fetch_cooldown_ms: ms(fetch::DEFAULT_COOLDOWN),
            fetch_interval_secs: fetch::DEFAULT_FETCH_INTERVAL.as_secs(),
        }
    }
}

impl Default for PublishConfig {
    fn default() -> Self {
        PublishConfig {
            topic: DEFAULT_TOPIC.to_string(),
            output: None,
            topic_prefix: false,
            timeout_ms: 5000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig { level: "info".to_string(), file: None }
    }
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path).await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let content = toml::to_string_pretty(&Config::default())
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content).await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.modem.port.trim().is_empty() {
            bail!("modem.port must not be empty");
        }
        if self.modem.baud_rate == 0 {
            bail!("modem.baud_rate must be positive");
        }
        if self.modem.poll_interval_ms == 0 {
            bail!("modem.poll_interval_ms must be positive");
        }
        if self.modem.buffer_capacity < READ_CHUNK {
            bail!(
                "modem.buffer_capacity ({}) must hold at least one {}-byte serial read",
                self.modem.buffer_capacity, READ_CHUNK
            );
        }
        if self.modem.junk_limit > self.modem.buffer_capacity {
            bail!(
                "modem.junk_limit ({}) exceeds modem.buffer_capacity ({})",
                self.modem.junk_limit, self.modem.buffer_capacity
            );
        }
        if self.bridge.assembly_slots == 0 {
            bail!("bridge.assembly_slots must be at least 1");
        }
        if !(1..=31).contains(&self.bridge.max_fragments) {
            bail!("bridge.max_fragments must be between 1 and 31, got {}", self.bridge.max_fragments);
        }
        if self.bridge.processed_capacity == 0 || self.bridge.delete_queue_capacity == 0 {
            bail!("bridge.processed_capacity and bridge.delete_queue_capacity must be at least 1");
        }
        if self.publish.topic.trim().is_empty() {
            bail!("publish.topic must not be empty");
        }
        if self.publish.timeout_ms == 0 {
            bail!("publish.timeout_ms must be positive");
        }
        Ok(())
    }

    pub fn bridge_settings(&self) -> BridgeSettings {
        let ms = Duration::from_millis;
        BridgeSettings {
            topic: self.publish.topic.clone(),
            init_step_delay: ms(self.modem.init_step_delay_ms),
            probe_attempts: self.modem.probe_attempts,
            poll_interval: ms(self.modem.poll_interval_ms),
            publish_timeout: ms(self.publish.timeout_ms),
            buffer_capacity: self.modem.buffer_capacity,
            junk_limit: self.modem.junk_limit,
            assembly_slots: self.bridge.assembly_slots,
            max_fragments: self.bridge.max_fragments,
            fragment_timeout: ms(self.bridge.fragment_timeout_ms),
            processed_capacity: self.bridge.processed_capacity,
            delete_queue_capacity: self.bridge.delete_queue_capacity,
            delete_interval: ms(self.bridge.delete_interval_ms),
            fetch_debounce: ms(self.bridge.fetch_debounce_ms),
            fetch_cooldown: ms(self.bridge.fetch_cooldown_ms),
            fetch_interval: Duration::from_secs(self.bridge.fetch_interval_secs),
        }
    }
}
