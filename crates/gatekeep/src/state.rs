//! Persisted proxy state
//!
//! The CLI keeps roles and delegations between invocations as a JSON
//! snapshot at ~/.local/share/gatekeep/state.json. Each invocation attaches
//! a proxy to a fresh host, restores the snapshot into it, runs one
//! operation and commits the result back.

use crate::audit::AuditLog;
use crate::gate::{Proxy, ProxyParams, ProxyState};
use anyhow::{Context, Result};
use gatekeep_core::{Host, Paths};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Loads and saves [`ProxyState`] snapshots
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    /// Store at the default location
    pub fn new() -> Self {
        Self::with_path(Paths::new().state_file())
    }

    /// Create with custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the snapshot, if one was saved
    pub fn load(&self) -> Result<Option<ProxyState>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read proxy state from {:?}", self.path))?;
        let state: ProxyState = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse proxy state from {:?}", self.path))?;
        Ok(Some(state))
    }

    /// Save a snapshot, replacing the previous one
    pub fn save(&self, state: &ProxyState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(state)?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("Failed to write proxy state to {:?}", self.path))?;
        Ok(())
    }

    /// Deploy a proxy for `params` on a host at `now` and restore the snapshot into it
    ///
    /// Without a snapshot the proxy keeps the roles granted at deployment.
    pub fn attach(
        &self,
        params: &ProxyParams,
        now: u64,
        audit: Option<Arc<AuditLog>>,
    ) -> Result<(Host, Proxy)> {
        let mut host = Host::new(now);
        let proxy = Proxy::deploy_with_audit(&mut host, params, audit);

        if let Some(state) = self.load()? {
            if state.delegations.mode() != params.mode {
                tracing::warn!(
                    saved = %state.delegations.mode(),
                    configured = %params.mode,
                    "saved state uses a different keying mode; keeping the saved mode"
                );
            }
            proxy.restore_state(&mut host, state);
        }

        Ok((host, proxy))
    }

    /// Save the proxy's current state
    pub fn commit(&self, host: &Host, proxy: &Proxy) -> Result<()> {
        let state = proxy
            .state(host)
            .context("proxy has no state to save")?;
        self.save(&state)
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}
