// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::errors::ConfigError;
use crate::namer::DEFAULT_KEY_ROOT;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_BATCH_LINES: usize = 10;
pub const DEFAULT_QUEUE_DEPTH: usize = 10;
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Configuration for the batching pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Maximum number of lines per batch
    pub batch_lines: usize,
    /// Capacity of the handoff channel between producer and consumer, in batches
    pub queue_depth: usize,
    /// Prefix for every object key
    pub key_root: String,
    /// Optional ceiling on the serialized size of a batch, in bytes
    pub max_batch_bytes: Option<u64>,
    /// Ship a non-empty batch once it is this old, even if it is not full
    pub flush_interval: Option<Duration>,
    /// Keep uploading buffered batches after shutdown is requested
    pub drain_on_shutdown: bool,
    /// How long to wait for producer and consumer to finish after shutdown
    pub shutdown_timeout: Duration,
    /// Log level (e.g., trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_lines: DEFAULT_BATCH_LINES,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            key_root: DEFAULT_KEY_ROOT.to_string(),
            max_batch_bytes: None,
            flush_interval: None,
            drain_on_shutdown: true,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            log_level: "info".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Create configuration from `AUDIT_SHIPPER_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self::from_env_unvalidated();
        config.validate()?;
        Ok(config)
    }

    /// Read `AUDIT_SHIPPER_*` environment variables without validating, for
    /// callers that layer further overrides before calling [`Self::validate`].
    #[must_use]
    pub fn from_env_unvalidated() -> Self {
        let defaults = Self::default();

        let batch_lines = parse_env("AUDIT_SHIPPER_BATCH_LINES").unwrap_or(defaults.batch_lines);
        let queue_depth = parse_env("AUDIT_SHIPPER_QUEUE_DEPTH").unwrap_or(defaults.queue_depth);
        let key_root = env::var("AUDIT_SHIPPER_KEY_ROOT").unwrap_or(defaults.key_root);
        let max_batch_bytes = parse_env("AUDIT_SHIPPER_MAX_BATCH_BYTES");
        let flush_interval =
            parse_env::<u64>("AUDIT_SHIPPER_FLUSH_INTERVAL_SECS").map(Duration::from_secs);
        let drain_on_shutdown = env::var("AUDIT_SHIPPER_DRAIN_ON_SHUTDOWN")
            .map(|val| val.to_lowercase() != "false")
            .unwrap_or(defaults.drain_on_shutdown);
        let shutdown_timeout = parse_env::<u64>("AUDIT_SHIPPER_SHUTDOWN_TIMEOUT_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.shutdown_timeout);
        let log_level = env::var("AUDIT_SHIPPER_LOG_LEVEL")
            .map(|val| val.to_lowercase())
            .unwrap_or(defaults.log_level);

        Self {
            batch_lines,
            queue_depth,
            key_root,
            max_batch_bytes,
            flush_interval,
            drain_on_shutdown,
            shutdown_timeout,
            log_level,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_lines == 0 {
            return Err(ConfigError::InvalidConfig(
                "batch lines must be greater than 0".to_string(),
            ));
        }

        if self.queue_depth == 0 {
            return Err(ConfigError::InvalidConfig(
                "queue depth must be greater than 0".to_string(),
            ));
        }

        if self.max_batch_bytes == Some(0) {
            return Err(ConfigError::InvalidConfig(
                "max batch bytes must be greater than 0 when set".to_string(),
            ));
        }

        if self.flush_interval == Some(Duration::ZERO) {
            return Err(ConfigError::InvalidConfig(
                "flush interval must be greater than 0 when set".to_string(),
            ));
        }

        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::InvalidConfig(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        Ok(())
    }
}

fn parse_env<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|val| val.trim().parse::<T>().ok())
}

/// Where finished batches are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// `s3://bucket`
    S3 { bucket: String },
    /// `http://` or `https://` base URL; keys are appended as the path
    Http { base_url: String },
    /// `file:///some/dir` or a bare filesystem path
    Directory(PathBuf),
}

impl FromStr for Destination {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "destination cannot be empty".to_string(),
            ));
        }

        if let Some(rest) = s.strip_prefix("s3://") {
            let bucket = rest.trim_end_matches('/');
            if bucket.is_empty() || bucket.contains('/') {
                return Err(ConfigError::InvalidConfig(format!(
                    "invalid S3 destination '{s}': expected s3://<bucket>"
                )));
            }
            return Ok(Destination::S3 {
                bucket: bucket.to_string(),
            });
        }

        if s.starts_with("http://") || s.starts_with("https://") {
            return Ok(Destination::Http {
                base_url: s.trim_end_matches('/').to_string(),
            });
        }

        if let Some(path) = s.strip_prefix("file://") {
            if path.is_empty() {
                return Err(ConfigError::InvalidConfig(
                    "file destination needs a path".to_string(),
                ));
            }
            return Ok(Destination::Directory(PathBuf::from(path)));
        }

        if s.contains("://") {
            return Err(ConfigError::InvalidConfig(format!(
                "unsupported destination scheme in '{s}'"
            )));
        }

        Ok(Destination::Directory(PathBuf::from(s)))
    }
}
