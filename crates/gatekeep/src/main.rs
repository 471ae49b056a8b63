//! gatekeep - Time-bounded call delegation behind a forwarding proxy

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use gatekeep::{
    audit::{AuditLog, AuditQuery},
    config::GatekeepConfig,
    decision::Action,
    gate::{Proxy, ProxyParams},
    registry::KeyMode,
    state::StateStore,
    Role,
};
use gatekeep_core::{Address, Host, Paths, Selector, U256};

/// gatekeep - Time-bounded call delegation behind a forwarding proxy
#[derive(Parser)]
#[command(name = "gatekeep")]
#[command(version = "0.1.0")]
#[command(about = "Time-bounded call delegation behind a forwarding proxy")]
#[command(long_about = "Time-bounded call delegation behind a forwarding proxy.\n\n\
    Holders of DAO_ROLE call through the proxy directly. Everyone else needs a\n\
    delegation: an expiry timestamp plus a checker contract that may veto\n\
    each call. Delegations are granted by the DAO and can be revoked by the\n\
    DAO or by an emergency admin.")]
pub struct Cli {
    /// Use this directory instead of the standard config and data locations
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration and proxy state
    #[command(about = "Initialize configuration and proxy state")]
    Init {
        /// Target every call is forwarded to
        #[arg(long)]
        target: Address,

        /// Initial DAO role holder
        #[arg(long)]
        dao: Address,

        /// Initial emergency admin (repeatable)
        #[arg(long = "emergency")]
        emergency: Vec<Address>,

        /// Key delegations per (selector, delegate) instead of per delegate
        #[arg(long)]
        per_selector: bool,

        /// Force overwrite existing config and state
        #[arg(long)]
        force: bool,
    },

    /// Show proxy status
    #[command(about = "Show proxy configuration, roles and delegation counts")]
    Status,

    /// Grant or overwrite a delegation
    #[command(about = "Grant or overwrite a delegation")]
    Grant {
        /// Delegate address
        delegate: Address,

        /// Checker contract consulted on each call
        #[arg(long, default_value = "0x0000000000000000000000000000000000000000")]
        checker: Address,

        /// Lifetime from now (e.g., "1h", "1d", "1w")
        #[arg(long, conflicts_with = "until")]
        expires: Option<String>,

        /// Absolute expiry as a unix timestamp
        #[arg(long)]
        until: Option<u64>,

        /// Selector to grant (per-selector mode)
        #[arg(long)]
        selector: Option<Selector>,

        /// Acting account (defaults to the configured DAO)
        #[arg(long = "as")]
        sender: Option<Address>,
    },

    /// Kill a delegation (DAO role)
    #[command(about = "Kill a delegation (requires DAO_ROLE)")]
    Revoke {
        /// Delegate address
        delegate: Address,

        /// Selector to revoke (per-selector mode)
        #[arg(long)]
        selector: Option<Selector>,

        /// Acting account (defaults to the configured DAO)
        #[arg(long = "as")]
        sender: Option<Address>,
    },

    /// Kill a delegation (emergency admin role)
    #[command(about = "Kill a delegation (requires EMERGENCY_ADMIN_ROLE)")]
    EmergencyRevoke {
        /// Delegate address
        delegate: Address,

        /// Selector to revoke (per-selector mode)
        #[arg(long)]
        selector: Option<Selector>,

        /// Acting emergency admin
        #[arg(long = "as")]
        sender: Address,
    },

    /// Show one delegation
    #[command(about = "Show the delegation of a delegate")]
    Show {
        /// Delegate address
        delegate: Address,

        /// Selector (per-selector mode)
        #[arg(long)]
        selector: Option<Selector>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List delegations
    #[command(about = "List delegations")]
    List {
        /// Include expired delegations
        #[arg(long)]
        all: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Evaluate whether a caller would get through
    #[command(about = "Evaluate whether a caller would be authorized")]
    Check {
        /// Calling account
        caller: Address,

        /// Selector of the call
        #[arg(long)]
        selector: Option<Selector>,

        /// Evaluate at this unix timestamp instead of now
        #[arg(long)]
        at: Option<u64>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage roles
    #[command(about = "Grant, revoke or list roles")]
    Roles {
        #[command(subcommand)]
        action: RoleAction,
    },

    /// Query the audit log
    #[command(about = "Query the decision audit log")]
    Audit {
        /// Filter by caller
        #[arg(long)]
        caller: Option<Address>,

        /// Show only denied calls
        #[arg(long)]
        denied: bool,

        /// Show entries since (e.g., "1h", "1d", "1w")
        #[arg(long)]
        since: Option<String>,

        /// Limit number of results
        #[arg(long, default_value = "20")]
        limit: usize,

        /// Drop entries older than the configured retention first
        #[arg(long)]
        cleanup: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show decision statistics
    #[command(about = "Show decision statistics")]
    Stats {
        /// Show stats since (e.g., "1h", "1d", "1w")
        #[arg(long)]
        since: Option<String>,
    },
}

#[derive(Subcommand)]
enum RoleAction {
    /// Grant a role (DAO_ROLE or EMERGENCY_ADMIN_ROLE)
    Grant {
        role: String,
        account: Address,
        #[arg(long = "as")]
        sender: Option<Address>,
    },
    /// Revoke a role
    Revoke {
        role: String,
        account: Address,
        #[arg(long = "as")]
        sender: Option<Address>,
    },
    /// List role holders
    List,
}

/// Config, state and audit locations for one invocation
struct Workspace {
    paths: Paths,
    config: GatekeepConfig,
}

impl Workspace {
    fn load(home: Option<PathBuf>) -> Result<Self> {
        let paths = match home {
            Some(root) => Paths::under(root),
            None => Paths::new(),
        };
        let config = GatekeepConfig::load_from(&paths.config_file())?;
        Ok(Self { paths, config })
    }

    fn params(&self) -> Result<ProxyParams> {
        self.config.proxy.to_params()
    }

    fn store(&self) -> StateStore {
        StateStore::with_path(self.paths.state_file())
    }

    fn audit(&self) -> AuditLog {
        AuditLog::with_path(self.paths.audit_log())
    }

    fn attach(&self, now: u64) -> Result<(Host, Proxy)> {
        let audit = self
            .config
            .audit
            .enabled
            .then(|| Arc::new(self.audit()));
        self.store().attach(&self.params()?, now, audit)
    }

    fn sender_or_dao(&self, sender: Option<Address>) -> Result<Address> {
        sender
            .or(self.config.proxy.dao)
            .context("no acting account: pass --as or configure proxy.dao")
    }
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let ctx = Workspace::load(cli.home)?;

    match cli.command {
        Commands::Init {
            target,
            dao,
            emergency,
            per_selector,
            force,
        } => cmd_init(&ctx, target, dao, emergency, per_selector, force),
        Commands::Status => cmd_status(&ctx),
        Commands::Grant {
            delegate,
            checker,
            expires,
            until,
            selector,
            sender,
        } => cmd_grant(&ctx, delegate, checker, expires, until, selector, sender),
        Commands::Revoke {
            delegate,
            selector,
            sender,
        } => cmd_revoke(&ctx, delegate, selector, ctx.sender_or_dao(sender)?, false),
        Commands::EmergencyRevoke {
            delegate,
            selector,
            sender,
        } => cmd_revoke(&ctx, delegate, selector, sender, true),
        Commands::Show {
            delegate,
            selector,
            json,
        } => cmd_show(&ctx, delegate, selector, json),
        Commands::List { all, json } => cmd_list(&ctx, all, json),
        Commands::Check {
            caller,
            selector,
            at,
            json,
        } => cmd_check(&ctx, caller, selector, at, json),
        Commands::Roles { action } => cmd_roles(&ctx, action),
        Commands::Audit {
            caller,
            denied,
            since,
            limit,
            cleanup,
            json,
        } => cmd_audit(&ctx, caller, denied, since, limit, cleanup, json),
        Commands::Stats { since } => cmd_stats(&ctx, since),
    }
}

fn cmd_init(
    ctx: &Workspace,
    target: Address,
    dao: Address,
    emergency: Vec<Address>,
    per_selector: bool,
    force: bool,
) -> Result<()> {
    let config_path = ctx.paths.config_file();
    let store = ctx.store();

    if (config_path.exists() || store.exists()) && !force {
        println!("Config already exists at {:?}", config_path);
        println!("Use --force to overwrite");
        return Ok(());
    }

    let mut config = ctx.config.clone();
    config.proxy.target = Some(target);
    config.proxy.dao = Some(dao);
    config.proxy.emergency_admins = emergency;
    config.proxy.mode = if per_selector {
        KeyMode::PerSelector
    } else {
        KeyMode::PerDelegate
    };
    config.save_to(&config_path)?;
    println!("Created gatekeep config at {:?}", config_path);

    let params = config.proxy.to_params()?;
    let mut host = Host::new(now());
    let proxy = Proxy::deploy(&mut host, &params);
    store.commit(&host, &proxy)?;
    println!("Created proxy state at {:?}", store.path());

    Ok(())
}

fn cmd_status(ctx: &Workspace) -> Result<()> {
    let (host, proxy) = ctx.attach(now())?;
    let state = proxy.state(&host).context("proxy has no state")?;
    let proxy_cfg = &ctx.config.proxy;

    println!("Gatekeep Status");
    println!("{}", "=".repeat(50));
    println!();
    println!("Config: {}", ctx.paths.config_file().display());
    println!("State:  {}", ctx.store().path().display());
    println!();
    if let Some(target) = proxy_cfg.target {
        println!("Target: {}", target);
    }
    println!("Mode: {}", state.delegations.mode());
    println!("Max output size: {} bytes", proxy_cfg.max_outsize);
    println!();

    for role in Role::all() {
        let members = state.roles.members(role);
        println!("{} ({}):", role, members.len());
        for member in members {
            println!("  {}", member);
        }
    }
    println!();

    let entries = state.delegations.entries();
    println!(
        "Delegations: {} stored, {} live",
        entries.len(),
        state.delegations.live_count(host.timestamp())
    );

    if ctx.config.audit.enabled {
        let since = Utc::now() - Duration::hours(24);
        if let Ok(stats) = ctx.audit().stats(Some(since)) {
            println!();
            println!("Last 24 hours:");
            println!("  Total decisions: {}", stats.total);
            println!("  Allowed: {}", stats.allowed);
            println!("  Denied: {} ({:.1}%)", stats.denied, stats.denial_rate());
        }
    }

    Ok(())
}

fn cmd_grant(
    ctx: &Workspace,
    delegate: Address,
    checker: Address,
    expires: Option<String>,
    until: Option<u64>,
    selector: Option<Selector>,
    sender: Option<Address>,
) -> Result<()> {
    let now = now();
    let expiry = match (expires, until) {
        (Some(span), _) => {
            let secs = parse_duration(&span)?.num_seconds();
            let secs = u64::try_from(secs).context("duration must be positive")?;
            now.saturating_add(secs)
        }
        (None, Some(ts)) => ts,
        (None, None) => bail!("Specify --expires or --until"),
    };
    let sender = ctx.sender_or_dao(sender)?;

    let (mut host, proxy) = ctx.attach(now)?;
    match selector {
        Some(selector) => proxy.set_selector_delegation(
            &mut host,
            sender,
            selector,
            delegate,
            U256::from(expiry),
            checker,
        )?,
        None => proxy.set_delegation(&mut host, sender, delegate, U256::from(expiry), checker)?,
    }
    ctx.store().commit(&host, &proxy)?;

    println!("Granted delegation to {} until {}", delegate, format_ts(expiry));
    if !checker.is_zero() {
        println!("  Checker: {}", checker);
    }
    if let Some(selector) = selector {
        println!("  Selector: {}", selector);
    }
    Ok(())
}

fn cmd_revoke(
    ctx: &Workspace,
    delegate: Address,
    selector: Option<Selector>,
    sender: Address,
    emergency: bool,
) -> Result<()> {
    let (mut host, proxy) = ctx.attach(now())?;
    let selector = selector.unwrap_or_default();

    if emergency {
        proxy.emergency_kill_delegation(&mut host, sender, selector, delegate)?;
    } else {
        proxy.kill_delegation(&mut host, sender, selector, delegate)?;
    }
    ctx.store().commit(&host, &proxy)?;

    println!("Revoked delegation of {}", delegate);
    Ok(())
}

fn cmd_show(ctx: &Workspace, delegate: Address, selector: Option<Selector>, json_output: bool) -> Result<()> {
    let (host, proxy) = ctx.attach(now())?;
    let (expiry, checker) = match selector {
        Some(selector) => proxy.selector_delegations(&host, &selector, &delegate),
        None => proxy.delegations(&host, &delegate),
    };

    if json_output {
        let value = serde_json::json!({
            "delegate": delegate,
            "selector": selector,
            "expiry": expiry,
            "checker": checker,
            "live": expiry > U256::from(host.timestamp()),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    if expiry.is_zero() {
        println!("No delegation for {}", delegate);
        return Ok(());
    }

    let live = expiry > U256::from(host.timestamp());
    println!("Delegate: {}", delegate);
    println!("  Expiry: {} ({})", expiry, if live { "live" } else { "expired" });
    if expiry <= U256::from(u64::MAX) {
        println!("  Expires at: {}", format_ts(expiry.low_u64()));
    }
    println!("  Checker: {}", checker);
    Ok(())
}

fn cmd_list(ctx: &Workspace, all: bool, json_output: bool) -> Result<()> {
    let (host, proxy) = ctx.attach(now())?;
    let state = proxy.state(&host).context("proxy has no state")?;
    let now = host.timestamp();

    let entries: Vec<_> = state
        .delegations
        .entries()
        .into_iter()
        .filter(|e| all || e.delegation.is_live(now))
        .collect();

    if json_output {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No delegations");
        return Ok(());
    }

    println!("{:<44} {:<12} {:<22} {}", "DELEGATE", "SELECTOR", "EXPIRY", "CHECKER");
    println!("{}", "-".repeat(124));
    for entry in entries {
        let selector = entry
            .selector
            .map(|s| s.to_string())
            .unwrap_or_else(|| "*".to_string());
        let expiry = if entry.delegation.is_live(now) {
            entry.delegation.expiry.to_string()
        } else {
            format!("{} (exp)", entry.delegation.expiry)
        };
        println!(
            "{:<44} {:<12} {:<22} {}",
            entry.delegate.to_string(),
            selector,
            expiry,
            entry.delegation.checker
        );
    }
    Ok(())
}

fn cmd_check(
    ctx: &Workspace,
    caller: Address,
    selector: Option<Selector>,
    at: Option<u64>,
    json_output: bool,
) -> Result<()> {
    let (host, proxy) = ctx.attach(at.unwrap_or_else(now))?;
    let data = selector.map(|s| s.as_bytes().to_vec()).unwrap_or_default();
    let decision = proxy.evaluate(&host, &caller, &data);

    if json_output {
        println!("{}", serde_json::to_string_pretty(&decision)?);
    } else {
        println!("{}: {}", decision.action, caller);
        println!("  Reason: {:?}", decision.reason);
        println!("  Details: {}", decision.details);
        if let Some(checker) = decision.checker() {
            println!("  Checker to consult: {}", checker);
        }
    }

    // Exit with appropriate code
    match decision.action {
        Action::Allow => std::process::exit(0),
        Action::Deny => std::process::exit(1),
    }
}

fn cmd_roles(ctx: &Workspace, action: RoleAction) -> Result<()> {
    match action {
        RoleAction::Grant {
            role,
            account,
            sender,
        } => {
            let role = parse_role(&role)?;
            let (mut host, proxy) = ctx.attach(now())?;
            let granted = proxy.grant_role(&mut host, ctx.sender_or_dao(sender)?, role, account)?;
            ctx.store().commit(&host, &proxy)?;
            if granted {
                println!("Granted {} to {}", role, account);
            } else {
                println!("{} already holds {}", account, role);
            }
        }
        RoleAction::Revoke {
            role,
            account,
            sender,
        } => {
            let role = parse_role(&role)?;
            let (mut host, proxy) = ctx.attach(now())?;
            let revoked = proxy.revoke_role(&mut host, ctx.sender_or_dao(sender)?, role, account)?;
            ctx.store().commit(&host, &proxy)?;
            if revoked {
                println!("Revoked {} from {}", role, account);
            } else {
                println!("{} does not hold {}", account, role);
            }
        }
        RoleAction::List => {
            let (host, proxy) = ctx.attach(now())?;
            let state = proxy.state(&host).context("proxy has no state")?;
            for role in Role::all() {
                for member in state.roles.members(role) {
                    println!("{:<22} {}", role.as_str(), member);
                }
            }
        }
    }
    Ok(())
}

fn cmd_audit(
    ctx: &Workspace,
    caller: Option<Address>,
    denied: bool,
    since: Option<String>,
    limit: usize,
    cleanup: bool,
    json_output: bool,
) -> Result<()> {
    let audit = ctx.audit();

    if cleanup {
        let removed = audit.cleanup(i64::from(ctx.config.audit.retention_days))?;
        println!("Removed {} entries older than {} days", removed, ctx.config.audit.retention_days);
    }

    let mut query = AuditQuery::default().limit(limit);
    if let Some(caller) = caller {
        query = query.caller(caller);
    }
    if denied {
        query = query.action(Action::Deny);
    }
    if let Some(since_str) = since {
        query = query.since(parse_since(&since_str)?);
    }

    let entries = audit.query(query)?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    println!(
        "{:<17} {:<12} {:<6} {:<44} {:<16} {}",
        "TIMESTAMP", "SELECTOR", "ACTION", "CALLER", "REASON", "DETAILS"
    );
    println!("{}", "-".repeat(120));

    for entry in entries {
        let time_str = entry.timestamp.format("%Y-%m-%d %H:%M").to_string();
        let selector = entry
            .selector
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        let reason = format!("{:?}", entry.reason);
        let details_short = if entry.details.chars().count() > 30 {
            format!("{}...", entry.details.chars().take(30).collect::<String>())
        } else {
            entry.details.clone()
        };

        println!(
            "{:<17} {:<12} {:<6} {:<44} {:<16} {}",
            time_str,
            selector,
            entry.decision.to_string(),
            entry.caller.to_string(),
            reason,
            details_short
        );
    }

    Ok(())
}

fn cmd_stats(ctx: &Workspace, since: Option<String>) -> Result<()> {
    let since_time = match since {
        Some(s) => Some(parse_since(&s)?),
        None => None,
    };

    let stats = ctx.audit().stats(since_time)?;

    println!("Gatekeep Statistics");
    println!("{}", "=".repeat(40));
    println!();
    println!("Total decisions: {}", stats.total);
    println!("  Allowed: {}", stats.allowed);
    println!("  Denied: {}", stats.denied);
    println!();
    println!("DAO bypass: {}", stats.role_bypass);
    println!("Checker denials: {}", stats.checker_denials);
    println!("Expired delegations: {}", stats.expired);
    println!("Target failures: {}", stats.target_failures);
    println!();
    println!("Denial rate: {:.1}%", stats.denial_rate());

    Ok(())
}

fn parse_role(s: &str) -> Result<Role> {
    match Role::from_str(s) {
        Some(role) => Ok(role),
        None => bail!("Unknown role: {} (expected DAO_ROLE or EMERGENCY_ADMIN_ROLE)", s),
    }
}

fn now() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or(0)
}

fn format_ts(ts: u64) -> String {
    i64::try_from(ts)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| ts.to_string())
}

/// Parse a duration string like "1h", "1d", "1w"
fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    let Some((split, unit)) = s.char_indices().next_back() else {
        bail!("Empty duration");
    };
    let num: i64 = s[..split]
        .parse()
        .with_context(|| format!("Invalid duration: {}", s))?;

    let duration = match unit {
        's' => Duration::try_seconds(num),
        'm' => Duration::try_minutes(num),
        'h' => Duration::try_hours(num),
        'd' => Duration::try_days(num),
        'w' => Duration::try_weeks(num),
        _ => bail!("Unknown duration unit: {}", unit),
    };

    duration.with_context(|| format!("Duration out of range: {}", s))
}

/// Parse a duration string into the point in time that long ago
fn parse_since(s: &str) -> Result<DateTime<Utc>> {
    let duration = parse_duration(s)?;
    Utc::now()
        .checked_sub_signed(duration)
        .with_context(|| format!("Duration out of range: {}", s))
}
