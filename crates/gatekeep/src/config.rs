//! Gatekeep configuration management
//!
//! Configuration file: ~/.config/gatekeep/gatekeep.yaml
//!
//! ```yaml
//! proxy:
//!   target: "0x..."
//!   dao: "0x..."
//!   emergency_admins: ["0x..."]
//!   max_outsize: 262144
//!   mode: per_delegate
//! audit:
//!   enabled: true
//!   retention_days: 30
//! ```

use crate::gate::{ProxyParams, DEFAULT_MAX_OUTSIZE};
use crate::registry::KeyMode;
use anyhow::{Context, Result};
use gatekeep_core::{Address, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Global gatekeep configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GatekeepConfig {
    /// Proxy deployment settings
    #[serde(default)]
    pub proxy: ProxySettings,

    /// Audit settings
    #[serde(default)]
    pub audit: AuditConfig,
}

impl GatekeepConfig {
    /// Load configuration from default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Paths::new().config_file())
    }

    /// Load configuration from a specific path, falling back to defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read gatekeep config from {:?}", path))?;
            let config: Self = serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse gatekeep config from {:?}", path))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Paths::new().config_file())
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write gatekeep config to {:?}", path))?;
        Ok(())
    }
}

/// Proxy deployment settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxySettings {
    /// Fixed forwardee
    #[serde(default)]
    pub target: Option<Address>,

    /// Initial DAO role holder
    #[serde(default)]
    pub dao: Option<Address>,

    /// Initial emergency admins
    #[serde(default)]
    pub emergency_admins: Vec<Address>,

    /// Return data ceiling in bytes
    #[serde(default = "default_max_outsize")]
    pub max_outsize: usize,

    /// Delegation keying
    #[serde(default)]
    pub mode: KeyMode,
}

fn default_max_outsize() -> usize {
    DEFAULT_MAX_OUTSIZE
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            target: None,
            dao: None,
            emergency_admins: Vec::new(),
            max_outsize: default_max_outsize(),
            mode: KeyMode::default(),
        }
    }
}

impl ProxySettings {
    /// Deployment parameters; fails if target or DAO are unset
    pub fn to_params(&self) -> Result<ProxyParams> {
        let target = self
            .target
            .context("proxy.target is not configured (run `gatekeep init`)")?;
        let dao = self
            .dao
            .context("proxy.dao is not configured (run `gatekeep init`)")?;

        let mut params = ProxyParams::new(target, dao)
            .with_max_outsize(self.max_outsize)
            .with_mode(self.mode);
        for admin in &self.emergency_admins {
            params = params.with_emergency_admin(*admin);
        }
        Ok(params)
    }
}

/// Audit configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Enable audit logging
    #[serde(default = "default_audit_enabled")]
    pub enabled: bool,

    /// Retention in days
    #[serde(default = "default_audit_retention_days")]
    pub retention_days: u32,
}

fn default_audit_enabled() -> bool {
    true
}

fn default_audit_retention_days() -> u32 {
    30
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: default_audit_enabled(),
            retention_days: default_audit_retention_days(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = GatekeepConfig::load_from(&dir.path().join("gatekeep.yaml")).unwrap();
        assert_eq!(config, GatekeepConfig::default());
        assert_eq!(config.proxy.max_outsize, 262_144);
        assert!(config.audit.enabled);
        assert!(config.proxy.to_params().is_err());
    }

    #[test]
    fn test_partial_yaml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gatekeep.yaml");
        std::fs::write(
            &path,
            "proxy:\n  target: \"0x00000000000000000000000000000000000000aa\"\n  dao: \"0x00000000000000000000000000000000000000bb\"\n  mode: per_selector\n",
        )
        .unwrap();

        let config = GatekeepConfig::load_from(&path).unwrap();
        let params = config.proxy.to_params().unwrap();
        assert_eq!(params.target, Address::from_low_u64(0xaa));
        assert_eq!(params.dao, Address::from_low_u64(0xbb));
        assert_eq!(params.mode, KeyMode::PerSelector);
        assert_eq!(params.max_outsize, DEFAULT_MAX_OUTSIZE);
        assert_eq!(config.audit.retention_days, 30);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("gatekeep.yaml");
        let mut config = GatekeepConfig::default();
        config.proxy.target = Some(Address::from_label("target"));
        config.proxy.dao = Some(Address::from_label("dao"));
        config.proxy.emergency_admins = vec![Address::from_label("guardian")];
        config.audit.enabled = false;

        config.save_to(&path).unwrap();
        assert_eq!(GatekeepConfig::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_invalid_address_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gatekeep.yaml");
        std::fs::write(&path, "proxy:\n  target: \"0x1234\"\n").unwrap();

        let err = GatekeepConfig::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse gatekeep config"));
    }
}
