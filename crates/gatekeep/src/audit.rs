//! Audit logging for gate decisions
//!
//! Every authorization decision is logged for accountability.
//! Storage: ~/.local/share/gatekeep/audit.log (JSON lines)
//!
//! The log lives outside the host, so entries survive a frame that later
//! aborts.

use crate::decision::{Action, Decision, Reason};
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use gatekeep_core::{Address, Message, Paths, Selector, U256};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// A single audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Wall-clock time the entry was written
    pub timestamp: DateTime<Utc>,

    /// Host clock at the time of the decision
    pub block_timestamp: u64,

    /// The proxy that made the decision
    pub proxy: Address,

    /// Immediate caller of the proxy
    pub caller: Address,

    /// Selector of the call (if the data carried one)
    pub selector: Option<Selector>,

    /// Value attached to the call
    pub value: U256,

    /// The decision made
    pub decision: Action,

    /// Reason for the decision
    pub reason: Reason,

    /// Additional details
    pub details: String,

    /// Checker consulted (if any)
    pub checker: Option<Address>,
}

impl AuditEntry {
    /// Create from a decision on an incoming call
    pub fn from_decision(decision: &Decision, msg: &Message, block_timestamp: u64) -> Self {
        Self {
            timestamp: Utc::now(),
            block_timestamp,
            proxy: msg.to,
            caller: msg.sender,
            selector: msg.selector(),
            value: msg.value,
            decision: decision.action,
            reason: decision.reason,
            details: decision.details.clone(),
            checker: decision.checker(),
        }
    }
}

/// Audit log manager
#[derive(Debug)]
pub struct AuditLog {
    log_path: PathBuf,
}

impl AuditLog {
    /// Create a new audit log at the default location
    pub fn new() -> Self {
        Self::with_path(Paths::new().audit_log())
    }

    /// Create with custom path
    pub fn with_path(log_path: PathBuf) -> Self {
        Self { log_path }
    }

    /// Location of the log file
    pub fn path(&self) -> &Path {
        &self.log_path
    }

    /// Append an entry to the log
    pub fn log(&self, entry: &AuditEntry) -> Result<()> {
        if let Some(parent) = self.log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .with_context(|| format!("Failed to open audit log at {:?}", self.log_path))?;

        let mut writer = BufWriter::new(file);
        let json = serde_json::to_string(entry)?;
        writeln!(writer, "{}", json)?;
        writer.flush()?;

        Ok(())
    }

    /// Query recent entries
    pub fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>> {
        self.query(AuditQuery::default().limit(limit))
    }

    /// Query denied entries
    pub fn denied(&self) -> Result<Vec<AuditEntry>> {
        self.query(AuditQuery::default().action(Action::Deny))
    }

    /// Query with custom filter
    pub fn query(&self, query: AuditQuery) -> Result<Vec<AuditEntry>> {
        if !self.log_path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.log_path)
            .with_context(|| format!("Failed to read audit log at {:?}", self.log_path))?;
        let reader = BufReader::new(file);

        let mut entries: Vec<AuditEntry> = reader
            .lines()
            .filter_map(|line| line.ok().and_then(|l| serde_json::from_str(&l).ok()))
            .filter(|entry: &AuditEntry| query.matches(entry))
            .collect();

        // Most recent first
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        if let Some(limit) = query.limit {
            entries.truncate(limit);
        }

        Ok(entries)
    }

    /// Drop entries older than `retention_days`
    pub fn cleanup(&self, retention_days: i64) -> Result<usize> {
        if !self.log_path.exists() {
            return Ok(0);
        }

        let threshold = Utc::now() - Duration::days(retention_days);

        let file = File::open(&self.log_path)?;
        let reader = BufReader::new(file);

        let mut kept: Vec<String> = Vec::new();
        let mut removed = 0;

        for line in reader.lines() {
            let line = line?;
            if let Ok(entry) = serde_json::from_str::<AuditEntry>(&line) {
                if entry.timestamp >= threshold {
                    kept.push(line);
                } else {
                    removed += 1;
                }
            }
        }

        if removed > 0 {
            let mut file = File::create(&self.log_path)?;
            for line in kept {
                writeln!(file, "{}", line)?;
            }
        }

        Ok(removed)
    }

    /// Get statistics
    pub fn stats(&self, since: Option<DateTime<Utc>>) -> Result<AuditStats> {
        let query = match since {
            Some(since) => AuditQuery::default().since(since),
            None => AuditQuery::default(),
        };

        let mut stats = AuditStats::default();
        for entry in self.query(query)? {
            stats.total += 1;
            match entry.decision {
                Action::Allow => stats.allowed += 1,
                Action::Deny => stats.denied += 1,
            }
            match entry.reason {
                Reason::Role => stats.role_bypass += 1,
                Reason::CheckerDenied | Reason::CheckerMissing => stats.checker_denials += 1,
                Reason::Expired => stats.expired += 1,
                Reason::TargetFailed => stats.target_failures += 1,
                Reason::Delegation | Reason::NoDelegation => {}
            }
        }

        Ok(stats)
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Query parameters for audit log
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    caller: Option<Address>,
    proxy: Option<Address>,
    action: Option<Action>,
    since: Option<DateTime<Utc>>,
    limit: Option<usize>,
}

impl AuditQuery {
    /// Filter by caller
    pub fn caller(mut self, caller: Address) -> Self {
        self.caller = Some(caller);
        self
    }

    /// Filter by proxy
    pub fn proxy(mut self, proxy: Address) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Filter by action
    pub fn action(mut self, action: Action) -> Self {
        self.action = Some(action);
        self
    }

    /// Filter by time
    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    /// Limit results
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches(&self, entry: &AuditEntry) -> bool {
        if let Some(caller) = self.caller {
            if entry.caller != caller {
                return false;
            }
        }

        if let Some(proxy) = self.proxy {
            if entry.proxy != proxy {
                return false;
            }
        }

        if let Some(action) = self.action {
            if entry.decision != action {
                return false;
            }
        }

        if let Some(since) = self.since {
            if entry.timestamp < since {
                return false;
            }
        }

        true
    }
}

/// Audit statistics
#[derive(Debug, Clone, Default)]
pub struct AuditStats {
    pub total: usize,
    pub allowed: usize,
    pub denied: usize,
    pub role_bypass: usize,
    pub checker_denials: usize,
    pub expired: usize,
    pub target_failures: usize,
}

impl AuditStats {
    /// Share of decisions that were denials, in percent
    pub fn denial_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.denied as f64) / (self.total as f64) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Delegation;
    use tempfile::tempdir;

    fn message(caller: &str) -> Message {
        Message::new(
            Address::from_label(caller),
            Address::from_label("proxy"),
            vec![0xde_u8, 0xad, 0xbe, 0xef],
        )
    }

    #[test]
    fn test_audit_log() {
        let dir = tempdir().unwrap();
        let log = AuditLog::with_path(dir.path().join("audit.log"));

        let decision = Decision::allow(
            Reason::Delegation,
            "live delegation",
            Some(Delegation::new(U256::from(2_000), Address::from_label("checker"))),
        );
        log.log(&AuditEntry::from_decision(&decision, &message("alice"), 1_000))
            .unwrap();

        let entries = log.recent(10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].caller, Address::from_label("alice"));
        assert_eq!(entries[0].checker, Some(Address::from_label("checker")));
        assert_eq!(
            entries[0].selector,
            Some(Selector::from_bytes([0xde, 0xad, 0xbe, 0xef]))
        );
    }

    #[test]
    fn test_audit_query() {
        let dir = tempdir().unwrap();
        let log = AuditLog::with_path(dir.path().join("audit.log"));

        for i in 0..5 {
            let caller = format!("caller{}", i % 2);
            let decision = if i % 2 == 0 {
                Decision::allow(Reason::Role, "dao", None)
            } else {
                Decision::deny(Reason::Expired, "expired")
            };
            log.log(&AuditEntry::from_decision(&decision, &message(&caller), i))
                .unwrap();
        }

        let caller0 = log
            .query(AuditQuery::default().caller(Address::from_label("caller0")))
            .unwrap();
        assert_eq!(caller0.len(), 3);
        assert_eq!(log.denied().unwrap().len(), 2);

        let stats = log.stats(None).unwrap();
        assert_eq!(stats.total, 5);
        assert_eq!(stats.role_bypass, 3);
        assert_eq!(stats.expired, 2);
        assert!((stats.denial_rate() - 40.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_missing_log_is_empty() {
        let dir = tempdir().unwrap();
        let log = AuditLog::with_path(dir.path().join("nope").join("audit.log"));
        assert!(log.recent(5).unwrap().is_empty());
        assert_eq!(log.cleanup(30).unwrap(), 0);
    }
}
