//! Configuration management.
//!
//! All knobs are read once at startup from the environment (prefix
//! `DOCPRESS`, `__` separator) and an optional config file. Durations accept
//! humantime strings such as `"600s"` or `"10m"`.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Converter configuration
    #[serde(default)]
    pub converter: ConverterConfig,

    /// Cleanup configuration
    #[serde(default)]
    pub cleanup: CleanupConfig,

    /// Authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum accepted upload size in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Root directory for per-job working directories
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConverterConfig {
    /// Path to the converter binary
    #[serde(default = "default_binary")]
    pub binary: PathBuf,

    /// Wall-clock timeout for a single conversion attempt
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,

    /// Maximum concurrent conversions (0 = number of host CPUs)
    #[serde(default)]
    pub max_concurrency: usize,

    /// Additional attempts after the first failed/timed-out one
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Maximum number of queued jobs (0 = unlimited)
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            timeout: default_timeout(),
            max_concurrency: 0,
            max_retries: default_max_retries(),
            max_queue_size: default_max_queue_size(),
        }
    }
}

impl ConverterConfig {
    /// Resolve the effective concurrency, falling back to the host CPU count.
    pub fn effective_concurrency(&self) -> usize {
        if self.max_concurrency > 0 {
            self.max_concurrency
        } else {
            available_cpus()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CleanupConfig {
    /// How often the sweeper runs
    #[serde(with = "humantime_serde", default = "default_sweep_interval")]
    pub interval: Duration,

    /// Age after which a terminal job's artifacts are deleted (0 = never)
    #[serde(with = "humantime_serde", default = "default_artifact_ttl")]
    pub artifact_ttl: Duration,

    /// Age after which a terminal job's record is evicted (0 = never)
    #[serde(with = "humantime_serde", default = "default_record_ttl")]
    pub record_ttl: Duration,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval: default_sweep_interval(),
            artifact_ttl: default_artifact_ttl(),
            record_ttl: default_record_ttl(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// API key expected in the `X-API-Key` header (empty = auth disabled)
    #[serde(default)]
    pub api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
        }
    }
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_max_upload_bytes() -> usize { 100 * 1024 * 1024 }
fn default_data_dir() -> PathBuf { PathBuf::from("/tmp/docpress") }
fn default_binary() -> PathBuf { PathBuf::from("soffice") }
fn default_timeout() -> Duration { Duration::from_secs(600) }
fn default_max_retries() -> u32 { 2 }
fn default_max_queue_size() -> usize { 1000 }
fn default_sweep_interval() -> Duration { Duration::from_secs(60) }
fn default_artifact_ttl() -> Duration { Duration::from_secs(3600) }
fn default_record_ttl() -> Duration { Duration::from_secs(86400) }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }

/// Number of processing units on the host, with a conservative fallback.
pub fn available_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2)
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("DOCPRESS").separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        Ok(cfg)
    }

    /// Load from a specific file path, with the environment layered on top.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("DOCPRESS").separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.converter.timeout, Duration::from_secs(600));
        assert_eq!(cfg.converter.max_retries, 2);
        assert_eq!(cfg.converter.max_queue_size, 1000);
        assert_eq!(cfg.cleanup.artifact_ttl, Duration::from_secs(3600));
        assert_eq!(cfg.cleanup.record_ttl, Duration::from_secs(86400));
        assert!(cfg.auth.api_key.is_empty());
    }

    #[test]
    fn test_effective_concurrency_falls_back_to_cpus() {
        let cfg = ConverterConfig::default();
        assert!(cfg.effective_concurrency() >= 1);

        let fixed = ConverterConfig {
            max_concurrency: 3,
            ..Default::default()
        };
        assert_eq!(fixed.effective_concurrency(), 3);
    }
}
