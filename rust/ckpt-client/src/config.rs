// rust/ckpt-client/src/config.rs

//! Configuration management for the checkpoint client.
//!
//! This module provides configuration parsing from TOML files, environment
//! variable overrides, and validation of configuration values.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{CkptError, Result};
use crate::protocol::RESPONSE_HEADER_SIZE;

// Top-level client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub service: ServiceConfig,
    pub transport: TransportConfig,
    pub dispatch: DispatchConfig,
    pub limits: LimitsConfig,
}

/// Where the checkpoint service listens.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Unix socket the service accepts connections on.
    pub socket_path: PathBuf,
    /// Well-known service identifier passed to the connector.
    pub service_name: String,
}

/// Bounded-retry behaviour of channel I/O.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Attempts allowed for a transient failure before it becomes fatal.
    pub max_retries: u32,
    /// Initial delay (milliseconds) between retries.
    pub retry_delay_ms: u64,
    /// Maximum delay (milliseconds) between retries.
    pub max_retry_delay_ms: u64,
}

// Notification dispatch options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    // Poll interval used while waiting for a single notification.
    pub poll_interval_ms: u64,
    // Largest notification frame accepted, header included.
    pub max_message_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Largest section id accepted from an iteration descriptor.
    pub max_section_id_len: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from("/var/run/ckpt/ckpt.socket"),
            service_name: "ckpt".to_string(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_retries: 16,
            retry_delay_ms: 1,
            max_retry_delay_ms: 100,
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1,
            max_message_size: 4096,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_section_id_len: 500,
        }
    }
}

impl FromStr for ClientConfig {
    type Err = CkptError;

    /// Parse configuration from a TOML string.
    fn from_str(s: &str) -> Result<Self> {
        toml::from_str(s)
            .map_err(|e| CkptError::config_with_source("failed to parse TOML config", e))
    }
}

impl ClientConfig {
    // Load configuration from a TOML file.
    //
    // # Errors
    //
    // Returns an error if the file cannot be read, parsed, or is invalid.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            CkptError::config_with_source(
                format!("failed to read config file {}", path.display()),
                e,
            )
        })?;
        let config: Self = content.parse()?;
        config.validate()?;
        Ok(config)
    }

    // Apply environment variable overrides.
    //
    // Environment variables are prefixed with `CKPT_` and use underscores
    // to separate nested fields, e.g. `CKPT_SERVICE_SOCKET_PATH` overrides
    // `service.socket_path`. Values that fail to parse are ignored.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        // Service overrides
        if let Ok(val) = std::env::var("CKPT_SERVICE_SOCKET_PATH") {
            self.service.socket_path = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("CKPT_SERVICE_NAME") {
            self.service.service_name = val;
        }

        // Transport overrides
        if let Ok(val) = std::env::var("CKPT_TRANSPORT_MAX_RETRIES") {
            if let Ok(v) = val.parse() {
                self.transport.max_retries = v;
            }
        }
        if let Ok(val) = std::env::var("CKPT_TRANSPORT_RETRY_DELAY_MS") {
            if let Ok(v) = val.parse() {
                self.transport.retry_delay_ms = v;
            }
        }
        if let Ok(val) = std::env::var("CKPT_TRANSPORT_MAX_RETRY_DELAY_MS") {
            if let Ok(v) = val.parse() {
                self.transport.max_retry_delay_ms = v;
            }
        }

        // Dispatch overrides
        if let Ok(val) = std::env::var("CKPT_DISPATCH_POLL_INTERVAL_MS") {
            if let Ok(v) = val.parse() {
                self.dispatch.poll_interval_ms = v;
            }
        }
        if let Ok(val) = std::env::var("CKPT_DISPATCH_MAX_MESSAGE_SIZE") {
            if let Ok(v) = val.parse() {
                self.dispatch.max_message_size = v;
            }
        }

        // Limits overrides
        if let Ok(val) = std::env::var("CKPT_LIMITS_MAX_SECTION_ID_LEN") {
            if let Ok(v) = val.parse() {
                self.limits.max_section_id_len = v;
            }
        }

        self
    }

    // Validate all configuration values.
    //
    // # Errors
    //
    // Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        // Service validation
        if self.service.socket_path.as_os_str().is_empty() {
            return Err(CkptError::config("service.socket_path must not be empty"));
        }
        if self.service.service_name.is_empty() {
            return Err(CkptError::config("service.service_name must not be empty"));
        }

        // Transport validation
        if self.transport.retry_delay_ms > self.transport.max_retry_delay_ms {
            return Err(CkptError::config(
                "transport.retry_delay_ms must not exceed transport.max_retry_delay_ms",
            ));
        }

        // Dispatch validation
        if self.dispatch.poll_interval_ms == 0 {
            return Err(CkptError::config(
                "dispatch.poll_interval_ms must be greater than 0",
            ));
        }
        if self.dispatch.max_message_size < RESPONSE_HEADER_SIZE {
            return Err(CkptError::config(format!(
                "dispatch.max_message_size must be at least {RESPONSE_HEADER_SIZE}"
            )));
        }

        // Limits validation
        if self.limits.max_section_id_len == 0 {
            return Err(CkptError::config(
                "limits.max_section_id_len must be greater than 0",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();

        assert_eq!(
            config.service.socket_path,
            PathBuf::from("/var/run/ckpt/ckpt.socket")
        );
        assert_eq!(config.service.service_name, "ckpt");

        assert_eq!(config.transport.max_retries, 16);
        assert_eq!(config.transport.retry_delay_ms, 1);
        assert_eq!(config.transport.max_retry_delay_ms, 100);

        assert_eq!(config.dispatch.poll_interval_ms, 1);
        assert_eq!(config.dispatch.max_message_size, 4096);

        assert_eq!(config.limits.max_section_id_len, 500);
    }

    #[test]
    fn test_default_validates() {
        assert!(ClientConfig::default().validate().is_ok());
    }

    #[test]
    fn test_from_str_empty() {
        let config: ClientConfig = "".parse().unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_str_partial() {
        let toml = r#"
            [service]
            socket_path = "/tmp/ckpt.sock"

            [limits]
            max_section_id_len = 64
        "#;
        let config: ClientConfig = toml.parse().unwrap();

        assert_eq!(config.service.socket_path, PathBuf::from("/tmp/ckpt.sock"));
        assert_eq!(config.limits.max_section_id_len, 64);
        // Other fields keep their defaults
        assert_eq!(config.service.service_name, "ckpt");
        assert_eq!(config.transport.max_retries, 16);
    }

    #[test]
    fn test_from_str_invalid_toml() {
        let result: std::result::Result<ClientConfig, _> = "invalid = [".parse();
        assert!(result.is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [transport]
            max_retries = 3
            retry_delay_ms = 2
            max_retry_delay_ms = 20
            "#
        )
        .unwrap();

        let config = ClientConfig::from_file(file.path()).unwrap();
        assert_eq!(config.transport.max_retries, 3);
        assert_eq!(config.transport.retry_delay_ms, 2);
        assert_eq!(config.transport.max_retry_delay_ms, 20);
    }

    #[test]
    fn test_from_file_not_found() {
        let result = ClientConfig::from_file("/nonexistent/ckpt.toml");
        assert!(matches!(result, Err(CkptError::Config { .. })));
    }

    #[test]
    fn test_from_file_rejects_invalid_values() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[dispatch]\npoll_interval_ms = 0").unwrap();

        let result = ClientConfig::from_file(file.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_retry_delays() {
        let mut config = ClientConfig::default();
        config.transport.retry_delay_ms = 500;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("retry_delay_ms"));
    }

    #[test]
    fn test_validate_message_size_floor() {
        let mut config = ClientConfig::default();
        config.dispatch.max_message_size = RESPONSE_HEADER_SIZE - 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_section_id_len() {
        let mut config = ClientConfig::default();
        config.limits.max_section_id_len = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_service_name() {
        let mut config = ClientConfig::default();
        config.service.service_name.clear();
        assert!(config.validate().is_err());
    }

    // Helper to clear all CKPT_ environment variables for test isolation
    fn clear_ckpt_env_vars() {
        for (key, _) in std::env::vars() {
            if key.starts_with("CKPT_") {
                std::env::remove_var(&key);
            }
        }
    }

    // Environment variable tests are combined into a single test to avoid
    // races between parallel tests, since env vars are process-global.
    #[test]
    fn test_env_overrides() {
        clear_ckpt_env_vars();

        std::env::set_var("CKPT_SERVICE_SOCKET_PATH", "/env/ckpt.sock");
        std::env::set_var("CKPT_TRANSPORT_MAX_RETRIES", "4");
        std::env::set_var("CKPT_DISPATCH_MAX_MESSAGE_SIZE", "8192");
        std::env::set_var("CKPT_LIMITS_MAX_SECTION_ID_LEN", "128");

        let config = ClientConfig::default().with_env_overrides();

        assert_eq!(config.service.socket_path, PathBuf::from("/env/ckpt.sock"));
        assert_eq!(config.transport.max_retries, 4);
        assert_eq!(config.dispatch.max_message_size, 8192);
        assert_eq!(config.limits.max_section_id_len, 128);

        clear_ckpt_env_vars();

        // Unparseable values keep the defaults
        std::env::set_var("CKPT_TRANSPORT_MAX_RETRIES", "many");
        let config = ClientConfig::default().with_env_overrides();
        assert_eq!(config.transport.max_retries, 16);

        clear_ckpt_env_vars();
    }

    #[test]
    fn test_serialize_roundtrip() {
        let original = ClientConfig::default();
        let toml_str = toml::to_string(&original).unwrap();
        let parsed: ClientConfig = toml_str.parse().unwrap();

        assert_eq!(original.service.socket_path, parsed.service.socket_path);
        assert_eq!(original.transport.max_retries, parsed.transport.max_retries);
        assert_eq!(
            original.dispatch.max_message_size,
            parsed.dispatch.max_message_size
        );
    }
}
