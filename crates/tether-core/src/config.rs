//! Operator configuration
//!
//! Stored in `~/.config/tether/config.yaml`

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CoreError, Result};

/// Operator configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TetherConfig {
    /// API version
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Value of the managed-by label
    #[serde(default = "default_operator_name")]
    pub operator_name: String,

    /// Custom resource type that owns reconciled objects
    #[serde(default)]
    pub owner: OwnerKindConfig,

    /// Also manage the policy-engine network policy kind
    #[serde(default)]
    pub support_extra_kinds: bool,

    /// Labels added to every object written for an owner
    #[serde(default)]
    pub default_labels: BTreeMap<String, String>,

    /// Annotations added to every object written for an owner
    #[serde(default)]
    pub default_annotations: BTreeMap<String, String>,

    /// Upper bound for each call to the API server
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<Duration>,

    /// Stamp the primary-controller label and only clean up objects carrying it
    #[serde(default)]
    pub primary_controller: bool,

    /// Never clean up objects stamped by the primary controller
    #[serde(default)]
    pub exclude_primary_controller_objects: bool,
}

/// API type of the owner resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerKindConfig {
    pub api_version: String,
    pub kind: String,
}

impl Default for OwnerKindConfig {
    fn default() -> Self {
        Self {
            api_version: "v1".to_string(),
            kind: "ConfigMap".to_string(),
        }
    }
}

fn default_api_version() -> String {
    "tether.io/v1".to_string()
}

fn default_operator_name() -> String {
    "tether".to_string()
}

impl Default for TetherConfig {
    fn default() -> Self {
        Self {
            api_version: default_api_version(),
            operator_name: default_operator_name(),
            owner: OwnerKindConfig::default(),
            support_extra_kinds: false,
            default_labels: BTreeMap::new(),
            default_annotations: BTreeMap::new(),
            request_timeout: None,
            primary_controller: false,
            exclude_primary_controller_objects: false,
        }
    }
}

impl TetherConfig {
    /// Load configuration from default location
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get default configuration path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| CoreError::InvalidConfig {
            message: "Could not determine config directory".to_string(),
        })?;
        Ok(config_dir.join("tether").join("config.yaml"))
    }

    fn validate(&self) -> Result<()> {
        if self.operator_name.trim().is_empty() {
            return Err(CoreError::InvalidConfig {
                message: "operatorName must not be empty".to_string(),
            });
        }
        if self.owner.kind.is_empty() || self.owner.api_version.is_empty() {
            return Err(CoreError::InvalidConfig {
                message: "owner.apiVersion and owner.kind are required".to_string(),
            });
        }
        Ok(())
    }
}
