//! Standard paths used by gatekeep tools

use std::path::PathBuf;

/// Standard gatekeep paths
pub struct Paths {
    /// Data directory (~/.local/share/gatekeep)
    pub data: PathBuf,
    /// Config directory (~/.config/gatekeep)
    pub config: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

impl Paths {
    pub fn new() -> Self {
        let data = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("gatekeep");

        let config = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("gatekeep");

        Self { data, config }
    }

    /// Rooted at an explicit directory (tests, `--home` overrides)
    pub fn under(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            data: root.join("data"),
            config: root.join("config"),
        }
    }

    /// Main configuration file
    pub fn config_file(&self) -> PathBuf {
        self.config.join("gatekeep.yaml")
    }

    /// Persisted proxy state
    pub fn state_file(&self) -> PathBuf {
        self.data.join("state.json")
    }

    /// Decision audit log
    pub fn audit_log(&self) -> PathBuf {
        self.data.join("audit.log")
    }
}
