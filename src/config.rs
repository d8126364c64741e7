use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::core::ConfigError;

/// Recommended value for [`ReaderConfig::max_idle_reads`].
pub const DEFAULT_STALL_READ_LIMIT: u32 = 50;

const MAX_REDIRECT_LIMIT: u32 = 20;

// ---------- Reader ----------
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ReaderConfig {
    /// Capacity of the staging buffer; also the upper bound of every network read.
    pub transfer_buffer_size: usize,
    /// Bounded wait for writes into the consumer buffer.
    pub read_write_timeout_ms: u64,
    /// Connect / header timeout used while opening a network session.
    pub connect_timeout_ms: u64,
    /// Per-read timeout applied once headers arrived.
    pub stream_read_timeout_ms: u64,
    /// Socket read timeout of the HTTP connection. Bounds how long closing a
    /// session waits for the body pump, and is the first header wait.
    pub socket_poll_ms: u64,
    /// Sleep after a network step that delivered less than 3/4 of the staging size.
    pub pacing_delay_ms: u64,
    pub max_redirects: u32,
    pub keep_alive: bool,
    /// Chunk size of the HTTP body pump.
    pub http_buffer_size: usize,
    /// Consecutive empty network reads tolerated before the stream is failed.
    /// `None` never fails a stream for stalling.
    pub max_idle_reads: Option<u32>,
    /// Keep bytes the consumer did not accept and forward them on the next
    /// steps instead of dropping them.
    pub retain_unwritten: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            transfer_buffer_size: 8 * 1024,
            read_write_timeout_ms: 20,
            connect_timeout_ms: 5_000,
            stream_read_timeout_ms: 10,
            socket_poll_ms: 250,
            pacing_delay_ms: 20,
            max_redirects: 10,
            keep_alive: true,
            http_buffer_size: 4 * 1024,
            max_idle_reads: None,
            retain_unwritten: false,
        }
    }
}

impl ReaderConfig {
    pub fn with_transfer_buffer_size(mut self, size: usize) -> Self {
        self.transfer_buffer_size = size;
        self
    }

    pub fn read_write_timeout(&self) -> Duration {
        Duration::from_millis(self.read_write_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn stream_read_timeout(&self) -> Duration {
        Duration::from_millis(self.stream_read_timeout_ms)
    }

    pub fn socket_poll_interval(&self) -> Duration {
        Duration::from_millis(self.socket_poll_ms)
    }

    pub fn pacing_delay(&self) -> Duration {
        Duration::from_millis(self.pacing_delay_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.transfer_buffer_size == 0 {
            return Err(ConfigError::message("reader.transfer_buffer_size must be > 0"));
        }
        if self.http_buffer_size == 0 {
            return Err(ConfigError::message("reader.http_buffer_size must be > 0"));
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::message("reader.connect_timeout_ms must be > 0"));
        }
        if self.stream_read_timeout_ms == 0 {
            return Err(ConfigError::message("reader.stream_read_timeout_ms must be > 0"));
        }
        if self.socket_poll_ms == 0 {
            return Err(ConfigError::message("reader.socket_poll_ms must be > 0"));
        }
        if self.max_redirects > MAX_REDIRECT_LIMIT {
            return Err(ConfigError::message(format!(
                "reader.max_redirects must be <= {}",
                MAX_REDIRECT_LIMIT
            )));
        }
        if self.max_idle_reads == Some(0) {
            return Err(ConfigError::message(
                "reader.max_idle_reads must be > 0 (omit it to disable stall detection)",
            ));
        }
        Ok(())
    }
}

// ---------- Ring ----------
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct RingConfig {
    pub capacity: usize,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self { capacity: 64 * 1024 }
    }
}

// ---------- Root ----------
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub reader: ReaderConfig,
    #[serde(default)]
    pub ring: RingConfig,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::with_context(format!("reading {}", path.display()), e))?;
        Self::from_toml(&content)
            .map_err(|e| ConfigError::with_context(format!("loading {}", path.display()), e))
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ConfigError::with_context("parsing config", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::with_context("serializing config", e))?;
        fs::write(path, content)
            .map_err(|e| ConfigError::with_context(format!("writing {}", path.display()), e))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.reader.validate()?;
        if self.ring.capacity == 0 {
            return Err(ConfigError::message("ring.capacity must be > 0"));
        }
        Ok(())
    }
}
