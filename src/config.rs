// ABOUTME: Gateway configuration: protocol identity, capacity limits, MT defaults and simulation knobs
// ABOUTME: Loaded from kebab-case YAML with serde, every field has a usable default

use crate::datatypes::ProtocolVersion;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Complete gateway configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    pub gateway: GatewayConfig,
    pub submit_defaults: SubmitDefaults,
    pub simulation: SimulationConfig,
}

impl Config {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
    }

    /// Reject values the gateway cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let gateway = &self.gateway;
        let simulation = &self.simulation;

        if gateway.source_addr.len() > 6 {
            return Err(ConfigError::Invalid(format!(
                "source-addr '{}' is longer than 6 bytes",
                gateway.source_addr
            )));
        }
        if gateway.max_connections == 0 {
            return Err(ConfigError::Invalid("max-connections must be positive".into()));
        }
        if gateway.receive_window_size == 0 {
            return Err(ConfigError::Invalid("receive-window-size must be positive".into()));
        }
        if gateway.worker_pool_size == 0 {
            return Err(ConfigError::Invalid("worker-pool-size must be positive".into()));
        }
        if gateway.heartbeat_interval_ms == 0 {
            return Err(ConfigError::Invalid("heartbeat-interval-ms must be positive".into()));
        }
        if gateway.max_frame_length < crate::codec::MIN_FRAME_LENGTH {
            return Err(ConfigError::Invalid(format!(
                "max-frame-length {} is below the header size",
                gateway.max_frame_length
            )));
        }
        if !(0.0..=1.0).contains(&simulation.success_rate) {
            return Err(ConfigError::Invalid(format!(
                "success-rate {} is not a probability",
                simulation.success_rate
            )));
        }
        if !(0.0..=1.0).contains(&simulation.report_skip_rate) {
            return Err(ConfigError::Invalid(format!(
                "report-skip-rate {} is not a probability",
                simulation.report_skip_rate
            )));
        }
        if simulation.min_submit_resp_ms > simulation.max_submit_resp_ms {
            return Err(ConfigError::Invalid(format!(
                "min-submit-resp-ms {} exceeds max-submit-resp-ms {}",
                simulation.min_submit_resp_ms, simulation.max_submit_resp_ms
            )));
        }
        Ok(())
    }
}

/// Protocol identity and capacity limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct GatewayConfig {
    /// Source address the `sp_client` binary logs in with
    pub source_addr: String,
    pub shared_secret: String,
    /// Verify the Connect digest
    pub auth_check: bool,
    pub version: ProtocolVersion,
    pub max_connections: usize,
    /// In-flight submissions admitted across the whole server
    pub receive_window_size: usize,
    pub worker_pool_size: usize,
    pub heartbeat_interval_ms: u64,
    /// Heartbeat ticks without any inbound frame before a session is dropped
    pub heartbeat_max_missed: u32,
    pub max_frame_length: u32,
    pub datacenter_id: u8,
    pub worker_id: u8,
    pub reassembly_ttl_ms: u64,
    /// Time to wait for TerminateResp when shutting down
    pub shutdown_grace_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            source_addr: "901234".to_string(),
            shared_secret: "123456".to_string(),
            auth_check: true,
            version: ProtocolVersion::V30,
            max_connections: 64,
            receive_window_size: 2048,
            worker_pool_size: 1024,
            heartbeat_interval_ms: 10_000,
            heartbeat_max_missed: 3,
            max_frame_length: crate::codec::DEFAULT_MAX_FRAME_LENGTH,
            datacenter_id: 1,
            worker_id: 1,
            reassembly_ttl_ms: 60_000,
            shutdown_grace_ms: 3_000,
        }
    }
}

impl GatewayConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn reassembly_ttl(&self) -> Duration {
        Duration::from_millis(self.reassembly_ttl_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// Service and billing metadata stamped on outbound (MT) messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SubmitDefaults {
    pub registered_delivery: u8,
    pub msg_level: u8,
    pub service_id: String,
    pub fee_user_type: u8,
    pub fee_terminal_id: String,
    pub fee_terminal_type: u8,
    pub fee_type: String,
    pub fee_code: String,
    /// Number shown to the handset as sender
    pub src_id: String,
    pub link_id: String,
    pub valid_duration_secs: u64,
}

impl Default for SubmitDefaults {
    fn default() -> Self {
        Self {
            registered_delivery: 1,
            msg_level: 1,
            service_id: "MI0000".to_string(),
            fee_user_type: 2,
            fee_terminal_id: String::new(),
            fee_terminal_type: 0,
            fee_type: "02".to_string(),
            fee_code: "10".to_string(),
            src_id: "1068888".to_string(),
            link_id: String::new(),
            valid_duration_secs: 2 * 24 * 3600,
        }
    }
}

impl SubmitDefaults {
    pub fn valid_duration(&self) -> Duration {
        Duration::from_secs(self.valid_duration_secs)
    }
}

/// Knobs for the simulated upstream network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SimulationConfig {
    /// Probability in [0, 1] that a submission succeeds
    pub success_rate: f64,
    pub min_submit_resp_ms: u64,
    pub max_submit_resp_ms: u64,
    /// Extra delay before a status report on top of the processing time
    pub fix_report_resp_ms: u64,
    /// Probability in [0, 1] that a status report is never sent
    pub report_skip_rate: f64,
    /// Seed for a reproducible simulation; entropy when absent
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            success_rate: 0.95,
            min_submit_resp_ms: 5,
            max_submit_resp_ms: 50,
            fix_report_resp_ms: 100,
            report_skip_rate: 0.05,
            seed: None,
        }
    }
}

impl SimulationConfig {
    pub fn fix_report_delay(&self) -> Duration {
        Duration::from_millis(self.fix_report_resp_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.gateway.version, ProtocolVersion::V30);
        assert_eq!(config.gateway.max_frame_length, 512);
    }

    #[test]
    fn parses_kebab_case_yaml_with_partial_sections() {
        let yaml = r#"
gateway:
  source-addr: "123456"
  shared-secret: "secret"
  version: 32
  receive-window-size: 16
  heartbeat-interval-ms: 500
submit-defaults:
  service-id: "TEST01"
  fee-code: "05"
simulation:
  success-rate: 1.0
  min-submit-resp-ms: 0
  max-submit-resp-ms: 10
  seed: 42
"#;
        let config = Config::from_yaml_str(yaml).unwrap();

        assert_eq!(config.gateway.source_addr, "123456");
        assert_eq!(config.gateway.version, ProtocolVersion::V20);
        assert_eq!(config.gateway.receive_window_size, 16);
        assert_eq!(config.gateway.heartbeat_interval(), Duration::from_millis(500));
        assert_eq!(config.gateway.max_connections, 64);
        assert_eq!(config.submit_defaults.service_id, "TEST01");
        assert_eq!(config.submit_defaults.fee_type, "02");
        assert_eq!(config.simulation.seed, Some(42));
        assert_eq!(config.simulation.report_skip_rate, 0.05);
    }

    #[test]
    fn rejects_bad_probability() {
        let yaml = "simulation:\n  success-rate: 1.5\n";
        assert!(matches!(
            Config::from_yaml_str(yaml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_inverted_delay_range() {
        let yaml = "simulation:\n  min-submit-resp-ms: 100\n  max-submit-resp-ms: 10\n";
        assert!(matches!(
            Config::from_yaml_str(yaml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_long_source_addr() {
        let mut config = Config::default();
        config.gateway.source_addr = "1234567".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn reports_yaml_errors() {
        assert!(matches!(
            Config::from_yaml_str("gateway: [1, 2"),
            Err(ConfigError::Yaml(_))
        ));
    }
}
