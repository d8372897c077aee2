//! Configuration types for hosted-e2e
//!
//! Settings come from the YAML file named by `CATTLE_TEST_CONFIG` plus a few
//! environment overrides. They can also be built programmatically.
//!
//! # Example
//!
//! ```
//! use hosted_e2e::config::{RancherConfig, Settings};
//!
//! let settings = Settings::new(
//!     RancherConfig::new("rancher.example.com", "token-abc:secret")
//!         .insecure(true)
//!         .cleanup(false),
//! )
//! .downstream_k8s_version("1.32.7-aliyun.1");
//!
//! assert_eq!(settings.rancher.host, "rancher.example.com");
//! ```
//!
//! # File layout
//!
//! ```yaml
//! rancher:
//!   host: rancher.example.com
//!   adminToken: token-abc:secret
//!   insecure: true
//!   cleanup: true
//! ackClusterConfig:
//!   regionId: cn-hangzhou
//!   nodePoolList:
//!     - name: np
//!       instancesNum: 1
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Env var naming the YAML config file
pub const CONFIG_ENV: &str = "CATTLE_TEST_CONFIG";

/// Env var pinning the downstream Kubernetes version
pub const DOWNSTREAM_K8S_MINOR_VERSION_ENV: &str = "DOWNSTREAM_K8S_MINOR_VERSION";

/// Env var that keeps clusters even after passing tests
pub const KEEP_ALL_ENV: &str = "HOSTED_E2E_KEEP_ALL";

const RANCHER_SECTION: &str = "rancher";

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("environment variable {0} is not set")]
    EnvNotSet(String),

    #[error("failed to read {path}: {message}")]
    Io { path: String, message: String },

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("config section '{0}' is missing")]
    MissingSection(String),

    #[error("config section '{section}' is invalid: {message}")]
    InvalidSection { section: String, message: String },
}

fn default_cleanup() -> bool {
    true
}

/// Connection settings for the management server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RancherConfig {
    /// Host name or URL of the server
    pub host: String,

    /// API bearer token
    pub admin_token: String,

    /// Skip TLS verification
    #[serde(default)]
    pub insecure: bool,

    /// Delete clusters after passing tests
    #[serde(default = "default_cleanup")]
    pub cleanup: bool,

    /// Prefix for generated cluster names
    #[serde(default)]
    pub cluster_name_prefix: Option<String>,

    /// Existing cloud credential to use instead of creating one
    #[serde(default)]
    pub cloud_credential_id: Option<String>,
}

impl RancherConfig {
    /// Create a config for a host and token
    pub fn new(host: impl Into<String>, admin_token: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            admin_token: admin_token.into(),
            insecure: false,
            cleanup: true,
            cluster_name_prefix: None,
            cloud_credential_id: None,
        }
    }

    /// Skip TLS verification
    pub fn insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    /// Delete clusters after passing tests
    pub fn cleanup(mut self, cleanup: bool) -> Self {
        self.cleanup = cleanup;
        self
    }

    /// Set the prefix for generated cluster names
    pub fn cluster_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.cluster_name_prefix = Some(prefix.into());
        self
    }

    /// Use an existing cloud credential
    pub fn cloud_credential(mut self, id: impl Into<String>) -> Self {
        self.cloud_credential_id = Some(id.into());
        self
    }
}

/// Full test settings: connection, version pin, provider templates
#[derive(Debug, Clone)]
pub struct Settings {
    /// Management server connection
    pub rancher: RancherConfig,

    /// Pinned downstream version; bypasses version selection
    pub downstream_k8s_version: Option<String>,

    /// Where the settings were loaded from, if a file
    pub source: Option<PathBuf>,

    document: serde_yaml::Mapping,
}

impl Settings {
    /// Create settings with no provider templates
    pub fn new(rancher: RancherConfig) -> Self {
        Self {
            rancher,
            downstream_k8s_version: None,
            source: None,
            document: serde_yaml::Mapping::new(),
        }
    }

    /// Load from `$CATTLE_TEST_CONFIG` and apply environment overrides
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_ENV)
            .map_err(|_| ConfigError::EnvNotSet(CONFIG_ENV.to_string()))?;
        let mut settings = Self::from_file(&path)?;

        if let Ok(version) = std::env::var(DOWNSTREAM_K8S_MINOR_VERSION_ENV) {
            if !version.trim().is_empty() {
                settings.downstream_k8s_version = Some(version.trim().to_string());
            }
        }

        Ok(settings)
    }

    /// Load from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        let mut settings = Self::from_yaml_str(&raw)?;
        settings.source = Some(path.to_path_buf());
        Ok(settings)
    }

    /// Parse from YAML text
    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        let document: serde_yaml::Mapping =
            serde_yaml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;

        let rancher = document
            .get(RANCHER_SECTION)
            .cloned()
            .ok_or_else(|| ConfigError::MissingSection(RANCHER_SECTION.to_string()))?;
        let rancher: RancherConfig =
            serde_yaml::from_value(rancher).map_err(|e| ConfigError::InvalidSection {
                section: RANCHER_SECTION.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            rancher,
            downstream_k8s_version: None,
            source: None,
            document,
        })
    }

    /// Pin the downstream Kubernetes version
    pub fn downstream_k8s_version(mut self, version: impl Into<String>) -> Self {
        self.downstream_k8s_version = Some(version.into());
        self
    }

    /// Add or replace a section
    pub fn section_value<T: Serialize>(mut self, key: &str, value: &T) -> Result<Self, ConfigError> {
        let value = serde_yaml::to_value(value).map_err(|e| ConfigError::InvalidSection {
            section: key.to_string(),
            message: e.to_string(),
        })?;
        self.document
            .insert(serde_yaml::Value::String(key.to_string()), value);
        Ok(self)
    }

    /// Deserialize a section, e.g. a provider's cluster template
    pub fn section<T: DeserializeOwned>(&self, key: &str) -> Result<T, ConfigError> {
        let value = self
            .document
            .get(key)
            .cloned()
            .ok_or_else(|| ConfigError::MissingSection(key.to_string()))?;

        serde_yaml::from_value(value).map_err(|e| ConfigError::InvalidSection {
            section: key.to_string(),
            message: e.to_string(),
        })
    }

    /// Whether clusters should be kept even on success
    ///
    /// `HOSTED_E2E_KEEP_ALL` set to `1`, `true`, `yes` or `on` keeps them;
    /// any other value, or leaving it unset, does not.
    pub fn keep_all() -> bool {
        is_truthy(std::env::var(KEEP_ALL_ENV).ok().as_deref())
    }
}

fn is_truthy(value: Option<&str>) -> bool {
    value.is_some_and(|v| {
        matches!(
            v.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AckClusterConfigSpec;

    const SAMPLE: &str = r#"
rancher:
  host: rancher.example.com
  adminToken: token-abc:secret
  insecure: true
  clusterNamePrefix: auto-ack-hp-ci
ackClusterConfig:
  regionId: cn-hangzhou
  clusterType: ManagedKubernetes
  nodePoolList:
    - name: np
      instancesNum: 1
      instanceTypes: [ecs.g6.large]
"#;

    #[test]
    fn test_rancher_config_builder() {
        let config = RancherConfig::new("host", "token")
            .insecure(true)
            .cleanup(false)
            .cluster_name_prefix("pfx")
            .cloud_credential("cattle-global-data:cc-abc");

        assert_eq!(config.host, "host");
        assert!(config.insecure);
        assert!(!config.cleanup);
        assert_eq!(config.cluster_name_prefix.as_deref(), Some("pfx"));
        assert_eq!(
            config.cloud_credential_id.as_deref(),
            Some("cattle-global-data:cc-abc")
        );
    }

    #[test]
    fn test_from_yaml_str() {
        let settings = Settings::from_yaml_str(SAMPLE).unwrap();

        assert_eq!(settings.rancher.host, "rancher.example.com");
        assert_eq!(settings.rancher.admin_token, "token-abc:secret");
        assert!(settings.rancher.insecure);
        assert!(settings.rancher.cleanup, "cleanup defaults to true");
        assert_eq!(
            settings.rancher.cluster_name_prefix.as_deref(),
            Some("auto-ack-hp-ci")
        );
    }

    #[test]
    fn test_section_deserializes_provider_template() {
        let settings = Settings::from_yaml_str(SAMPLE).unwrap();
        let ack: AckClusterConfigSpec = settings.section("ackClusterConfig").unwrap();

        assert_eq!(ack.region_id.as_deref(), Some("cn-hangzhou"));
        assert_eq!(ack.node_pool_list.len(), 1);
        assert_eq!(ack.node_pool_list[0].instances_num, 1);
    }

    #[test]
    fn test_missing_section() {
        let settings = Settings::from_yaml_str(SAMPLE).unwrap();
        let result: Result<AckClusterConfigSpec, _> = settings.section("tkeClusterConfig");
        assert!(matches!(result, Err(ConfigError::MissingSection(key)) if key == "tkeClusterConfig"));
    }

    #[test]
    fn test_missing_rancher_section() {
        let result = Settings::from_yaml_str("ackClusterConfig: {}\n");
        assert!(matches!(result, Err(ConfigError::MissingSection(_))));
    }

    #[test]
    fn test_section_value_roundtrip() {
        let template = AckClusterConfigSpec {
            region_id: Some("cn-beijing".to_string()),
            ..Default::default()
        };
        let settings = Settings::new(RancherConfig::new("h", "t"))
            .section_value("ackClusterConfig", &template)
            .unwrap();

        let loaded: AckClusterConfigSpec = settings.section("ackClusterConfig").unwrap();
        assert_eq!(loaded, template);
    }

    #[test]
    fn test_from_file() {
        let path = std::env::temp_dir().join(format!("hosted-e2e-config-{}.yaml", std::process::id()));
        std::fs::write(&path, SAMPLE).unwrap();

        let settings = Settings::from_file(&path).unwrap();
        assert_eq!(settings.source.as_deref(), Some(path.as_path()));

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_from_file_missing() {
        let result = Settings::from_file("/nonexistent/hosted-e2e.yaml");
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_keep_all_flag_values() {
        for value in ["1", "true", "TRUE", "yes", " on "] {
            assert!(is_truthy(Some(value)), "{value} should keep clusters");
        }
        for value in ["0", "false", "no", "off", ""] {
            assert!(!is_truthy(Some(value)), "{value} should not keep clusters");
        }
        assert!(!is_truthy(None));
    }
}
