// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Runtime configuration surface for mockmesh (spec §6).
//!
//! [`MockmeshConfig`] carries every option named in §6's configuration
//! surface table, with defaults pinned from `collector/config.py`. Loaded
//! from TOML via [`load_config`], with `MOCKMESH_<FIELD>` environment
//! overrides applied on top.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Errors raised while loading or validating a [`MockmeshConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested configuration file was not found.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// Path that was requested.
        path: String,
    },
    /// The file could not be parsed as valid TOML.
    #[error("failed to parse config: {reason}")]
    ParseError {
        /// Human-readable parse error detail.
        reason: String,
    },
    /// Semantic validation failed (one or more problems).
    #[error("config validation failed: {reasons:?}")]
    ValidationError {
        /// Individual validation failure messages.
        reasons: Vec<String>,
    },
}

/// One `sampling_rules` entry: `{path_regex, sample_rate, method?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SamplingRuleConfig {
    /// Regex matched against the request path.
    pub path_regex: String,
    /// Sample rate in `[0, 1]` for requests matching this rule.
    pub sample_rate: f64,
    /// Optional method restriction (matched case-insensitively).
    #[serde(default)]
    pub method: Option<String>,
}

/// Top-level runtime configuration, covering every field named in §6.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct MockmeshConfig {
    /// Control-surface bind host.
    pub host: String,
    /// Control-surface bind port (C10).
    pub port: u16,
    /// Ingest-server bind port (C4).
    pub ingest_port: u16,
    /// Log level: one of `DEBUG`, `INFO`, `WARNING`, `ERROR`, `CRITICAL`.
    pub log_level: String,
    /// Log format: `json` or `text`.
    pub log_format: String,

    /// Dedup backend address, `host:port` (an optional `redis://` scheme
    /// is stripped by [`MockmeshConfig::dedup_backend_addr`]).
    pub dedup_backend_url: String,
    /// Logical database index on the dedup backend.
    pub dedup_db: u32,
    /// Password for the dedup backend, if required.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dedup_password: Option<String>,
    /// TTL, in seconds, for dedup entries.
    pub dedup_ttl: u64,

    /// Base URL of the downstream mock server's admin API.
    pub mock_server_url: String,
    /// Per-request timeout, in seconds, for mock-server calls.
    pub mock_server_timeout: u64,
    /// Max retry attempts for a mock-server apply (§4.8).
    pub mock_server_retry_attempts: u32,
    /// Base retry delay, in seconds, for the mock-server backoff policy.
    pub mock_server_retry_delay: u64,

    /// Maximum request/response body size, in bytes, before truncation.
    pub body_size_limit: usize,
    /// Whether per-endpoint sampling is enabled.
    pub enable_sampling: bool,
    /// Default sample rate when no `sampling_rules` entry matches.
    pub default_sample_rate: f64,
    /// Per-endpoint sampling rules, first match wins.
    pub sampling_rules: Vec<SamplingRuleConfig>,

    /// Header names (case-insensitive) to redact entirely.
    pub sensitive_headers: Vec<String>,
    /// Body/form field names (case-insensitive) to redact.
    pub sensitive_fields: Vec<String>,
    /// Host globs to drop at ingest.
    pub ignored_hosts: Vec<String>,
    /// Path globs to drop at ingest.
    pub ignored_paths: Vec<String>,

    /// Semaphore size bounding concurrent mock-server requests.
    pub max_concurrent_requests: usize,
    /// Generic per-request timeout, in seconds.
    pub request_timeout: u64,
    /// Max events per processor batch.
    pub batch_size: usize,
    /// Max seconds to wait before flushing a partial batch.
    pub batch_timeout: u64,

    /// Stub queue stream name.
    pub queue_name: String,
    /// Stub queue consumer-group name.
    pub queue_group: String,
    /// Max redelivery attempts before an entry is dead-lettered.
    pub queue_max_retries: u32,

    /// Root directory for the backup store.
    pub backup_path: String,
    /// Days a backup file is retained before the retention sweep deletes it.
    pub backup_retention_days: u32,
    /// Whether backup files are gzip-compressed.
    pub compress_backups: bool,

    /// Whether `GET /metrics` is exposed.
    pub enable_metrics: bool,
    /// Port `GET /metrics` is served on (shares the control-surface host).
    pub metrics_port: u16,
}

const VALID_LOG_LEVELS: &[&str] = &["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"];

impl Default for MockmeshConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            ingest_port: 9090,
            log_level: "INFO".to_string(),
            log_format: "json".to_string(),

            dedup_backend_url: "redis://localhost:6379".to_string(),
            dedup_db: 0,
            dedup_password: None,
            dedup_ttl: 3600,

            mock_server_url: "http://localhost:8080".to_string(),
            mock_server_timeout: 30,
            mock_server_retry_attempts: 3,
            mock_server_retry_delay: 1,

            body_size_limit: 8192,
            enable_sampling: false,
            default_sample_rate: 1.0,
            sampling_rules: Vec::new(),

            sensitive_headers: [
                "authorization",
                "cookie",
                "x-api-key",
                "x-auth-token",
                "x-access-token",
                "x-refresh-token",
                "x-session-id",
                "x-user-token",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            sensitive_fields: [
                "password",
                "senha",
                "token",
                "api_key",
                "apiKey",
                "access_token",
                "refresh_token",
                "credit_card",
                "creditCard",
                "cartao",
                "cpf",
                "cnpj",
                "ssn",
                "social_security",
                "phone",
                "telefone",
                "email",
                "birth_date",
                "data_nascimento",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            ignored_hosts: [
                "kubernetes.default.svc.cluster.local",
                "*.istio-system.svc.cluster.local",
                "*.kube-system.svc.cluster.local",
                "prometheus.*",
                "grafana.*",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            ignored_paths: [
                "/health",
                "/healthz",
                "/ready",
                "/live",
                "/metrics",
                "/favicon.ico",
                "/.well-known/*",
            ]
            .into_iter()
            .map(String::from)
            .collect(),

            max_concurrent_requests: 100,
            request_timeout: 30,
            batch_size: 10,
            batch_timeout: 5,

            queue_name: "wiremock_mappings".to_string(),
            queue_group: "wiremock_loader".to_string(),
            queue_max_retries: 3,

            backup_path: "./backups".to_string(),
            backup_retention_days: 30,
            compress_backups: true,

            enable_metrics: true,
            metrics_port: 9091,
        }
    }
}

impl MockmeshConfig {
    /// Strips an optional `redis://` scheme (and any trailing path) from
    /// `dedup_backend_url`, returning the bare `host:port` the hand-rolled
    /// RESP client expects.
    pub fn dedup_backend_addr(&self) -> &str {
        self.dedup_backend_url
            .strip_prefix("redis://")
            .unwrap_or(&self.dedup_backend_url)
            .split('/')
            .next()
            .unwrap_or(&self.dedup_backend_url)
    }

    /// DLQ stream name: `<queue_name>:dlq`.
    pub fn dlq_name(&self) -> String {
        format!("{}:dlq", self.queue_name)
    }
}

/// Loads a [`MockmeshConfig`] from an optional TOML file path, applying
/// `MOCKMESH_<FIELD>` environment overrides on top, then validating.
///
/// `path = None` returns [`MockmeshConfig::default()`] with overrides applied.
pub fn load_config(path: Option<&Path>) -> Result<MockmeshConfig, ConfigError> {
    let mut config = match path {
        Some(p) => {
            let content = std::fs::read_to_string(p).map_err(|_| ConfigError::FileNotFound {
                path: p.display().to_string(),
            })?;
            parse_toml(&content)?
        }
        None => MockmeshConfig::default(),
    };
    apply_env_overrides(&mut config);
    validate_config(&config)?;
    Ok(config)
}

/// Parses a TOML string into a [`MockmeshConfig`], falling back to defaults
/// for any field the document omits.
pub fn parse_toml(content: &str) -> Result<MockmeshConfig, ConfigError> {
    toml::from_str(content).map_err(|e| ConfigError::ParseError { reason: e.to_string() })
}

macro_rules! env_override {
    ($config:expr, $field:ident, $env_key:literal, str) => {
        if let Ok(v) = std::env::var($env_key) {
            $config.$field = v;
        }
    };
    ($config:expr, $field:ident, $env_key:literal, opt_str) => {
        if let Ok(v) = std::env::var($env_key) {
            $config.$field = Some(v);
        }
    };
    ($config:expr, $field:ident, $env_key:literal, bool) => {
        if let Ok(v) = std::env::var($env_key) {
            $config.$field = matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
    };
    ($config:expr, $field:ident, $env_key:literal, num) => {
        if let Ok(v) = std::env::var($env_key) {
            if let Ok(parsed) = v.parse() {
                $config.$field = parsed;
            }
        }
    };
}

/// Applies `MOCKMESH_<FIELD>` environment overrides, mirroring
/// `collector/config.py`'s `COLLECTOR_` prefix convention.
pub fn apply_env_overrides(config: &mut MockmeshConfig) {
    env_override!(config, host, "MOCKMESH_HOST", str);
    env_override!(config, port, "MOCKMESH_PORT", num);
    env_override!(config, ingest_port, "MOCKMESH_INGEST_PORT", num);
    env_override!(config, log_level, "MOCKMESH_LOG_LEVEL", str);
    env_override!(config, log_format, "MOCKMESH_LOG_FORMAT", str);
    env_override!(config, dedup_backend_url, "MOCKMESH_DEDUP_BACKEND_URL", str);
    env_override!(config, dedup_db, "MOCKMESH_DEDUP_DB", num);
    env_override!(config, dedup_password, "MOCKMESH_DEDUP_PASSWORD", opt_str);
    env_override!(config, dedup_ttl, "MOCKMESH_DEDUP_TTL", num);
    env_override!(config, mock_server_url, "MOCKMESH_MOCK_SERVER_URL", str);
    env_override!(config, mock_server_timeout, "MOCKMESH_MOCK_SERVER_TIMEOUT", num);
    env_override!(config, mock_server_retry_attempts, "MOCKMESH_MOCK_SERVER_RETRY_ATTEMPTS", num);
    env_override!(config, mock_server_retry_delay, "MOCKMESH_MOCK_SERVER_RETRY_DELAY", num);
    env_override!(config, body_size_limit, "MOCKMESH_BODY_SIZE_LIMIT", num);
    env_override!(config, enable_sampling, "MOCKMESH_ENABLE_SAMPLING", bool);
    env_override!(config, default_sample_rate, "MOCKMESH_DEFAULT_SAMPLE_RATE", num);
    env_override!(config, max_concurrent_requests, "MOCKMESH_MAX_CONCURRENT_REQUESTS", num);
    env_override!(config, request_timeout, "MOCKMESH_REQUEST_TIMEOUT", num);
    env_override!(config, batch_size, "MOCKMESH_BATCH_SIZE", num);
    env_override!(config, batch_timeout, "MOCKMESH_BATCH_TIMEOUT", num);
    env_override!(config, queue_name, "MOCKMESH_QUEUE_NAME", str);
    env_override!(config, queue_group, "MOCKMESH_QUEUE_GROUP", str);
    env_override!(config, queue_max_retries, "MOCKMESH_QUEUE_MAX_RETRIES", num);
    env_override!(config, backup_path, "MOCKMESH_BACKUP_PATH", str);
    env_override!(config, backup_retention_days, "MOCKMESH_BACKUP_RETENTION_DAYS", num);
    env_override!(config, compress_backups, "MOCKMESH_COMPRESS_BACKUPS", bool);
    env_override!(config, enable_metrics, "MOCKMESH_ENABLE_METRICS", bool);
    env_override!(config, metrics_port, "MOCKMESH_METRICS_PORT", num);
}

/// Validates a config per §6's last paragraph: `log_level` enum membership,
/// `default_sample_rate ∈ [0,1]`, `body_size_limit ∈ [1024, 1048576]`,
/// `batch_size ∈ [1,100]`.
pub fn validate_config(config: &MockmeshConfig) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    if !VALID_LOG_LEVELS.contains(&config.log_level.to_ascii_uppercase().as_str()) {
        errors.push(format!("invalid log_level '{}'", config.log_level));
    }
    if !(0.0..=1.0).contains(&config.default_sample_rate) {
        errors.push(format!("default_sample_rate {} out of range [0,1]", config.default_sample_rate));
    }
    if !(1024..=1_048_576).contains(&config.body_size_limit) {
        errors.push(format!("body_size_limit {} out of range [1024,1048576]", config.body_size_limit));
    }
    if !(1..=100).contains(&config.batch_size) {
        errors.push(format!("batch_size {} out of range [1,100]", config.batch_size));
    }
    for rule in &config.sampling_rules {
        if !(0.0..=1.0).contains(&rule.sample_rate) {
            errors.push(format!("sampling_rules entry '{}' sample_rate out of range [0,1]", rule.path_regex));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError { reasons: errors })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        validate_config(&MockmeshConfig::default()).unwrap();
    }

    #[test]
    fn rejects_invalid_log_level() {
        let mut c = MockmeshConfig::default();
        c.log_level = "VERBOSE".to_string();
        assert!(validate_config(&c).is_err());
    }

    #[test]
    fn rejects_out_of_range_sample_rate() {
        let mut c = MockmeshConfig::default();
        c.default_sample_rate = 1.5;
        assert!(validate_config(&c).is_err());
    }

    #[test]
    fn rejects_body_size_limit_below_minimum() {
        let mut c = MockmeshConfig::default();
        c.body_size_limit = 100;
        assert!(validate_config(&c).is_err());
    }

    #[test]
    fn rejects_batch_size_above_maximum() {
        let mut c = MockmeshConfig::default();
        c.batch_size = 101;
        assert!(validate_config(&c).is_err());
    }

    #[test]
    fn parses_partial_toml_with_defaults_for_the_rest() {
        let parsed = parse_toml("host = \"127.0.0.1\"\nport = 9999\n").unwrap();
        assert_eq!(parsed.host, "127.0.0.1");
        assert_eq!(parsed.port, 9999);
        assert_eq!(parsed.batch_size, MockmeshConfig::default().batch_size);
    }

    #[test]
    fn dedup_backend_addr_strips_scheme() {
        let c = MockmeshConfig::default();
        assert_eq!(c.dedup_backend_addr(), "localhost:6379");
    }

    #[test]
    fn dlq_name_appends_suffix() {
        let c = MockmeshConfig::default();
        assert_eq!(c.dlq_name(), "wiremock_mappings:dlq");
    }

    #[test]
    fn missing_file_is_an_error() {
        let result = load_config(Some(Path::new("/nonexistent/mockmesh.toml")));
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn env_override_wins_over_file_default() {
        std::env::set_var("MOCKMESH_BATCH_SIZE", "42");
        let mut c = MockmeshConfig::default();
        apply_env_overrides(&mut c);
        assert_eq!(c.batch_size, 42);
        std::env::remove_var("MOCKMESH_BATCH_SIZE");
    }
}
