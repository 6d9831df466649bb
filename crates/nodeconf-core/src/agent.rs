//! Call-outs to the node agent
//!
//! Side-effecting operations (service registration, progress, wait/wake,
//! node designation, remote copy and exec) are carried out by an external
//! agent executable. [`Agent`] describes that contract; [`CommandAgent`]
//! implements it by spawning the agent. Every call returns the agent's exit
//! status, where 0 means success.
//!
//! The lookup core never calls into this module.

use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::key::{KeyInput, KeyPath};
use crate::macros::{render, Macros};
use crate::resolver::Resolver;

/// Default agent executable
pub const DEFAULT_AGENT_PROGRAM: &str = "/opt/bluedata/vagent/vagent/bd_vagent/bin/bd_vagent";

/// Longest progress description the agent accepts
pub const MAX_DESCRIPTION_LEN: usize = 64;

/// Default permissions for remotely copied files
pub const DEFAULT_COPY_PERMS: &str = "600";

/// Service list understood by the agent as "every registered service"
pub const RESTART_ALL_SERVICES: &str = "all";

/// Status reported when the agent binary is missing or killed
const AGENT_UNAVAILABLE_STATUS: i32 = 90;

const AGENT_SUBCOMMAND: &str = "bdvlib";

/// Where the agent drops per-user access tokens
const TOKEN_DIR: &str = "/tmp";

/// How a registered service is managed by the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    /// Application SysV service
    AppSysv,
    /// Application systemd unit
    AppSysd,
    /// System SysV service
    SysSysv,
    /// System systemd unit
    SysSysd,
}

impl ServiceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::AppSysv => "app_sysv",
            ServiceKind::AppSysd => "app_sysd",
            ServiceKind::SysSysv => "sys_sysv",
            ServiceKind::SysSysd => "sys_sysd",
        }
    }
}

/// Init system managing a service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitSystem {
    Sysv,
    Systemd,
}

impl InitSystem {
    /// Registration kind for an application service under this init system
    pub fn app_kind(&self) -> ServiceKind {
        match self {
            InitSystem::Sysv => ServiceKind::AppSysv,
            InitSystem::Systemd => ServiceKind::AppSysd,
        }
    }

    /// Registration kind for a system service under this init system
    pub fn system_kind(&self) -> ServiceKind {
        match self {
            InitSystem::Sysv => ServiceKind::SysSysv,
            InitSystem::Systemd => ServiceKind::SysSysd,
        }
    }
}

/// Role a node can be designated for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Primary,
    Secondary,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Primary => "designate_primary",
            Role::Secondary => "designate_secondary",
        }
    }
}

/// Operations performed by the external node agent
pub trait Agent {
    /// Register `unit` under `global_id` so the agent manages its lifecycle
    fn register_service(
        &self,
        global_id: &str,
        kind: ServiceKind,
        unit: &str,
        display_name: &str,
    ) -> Result<i32>;

    fn unregister_service(&self, global_id: &str) -> Result<i32>;

    fn notify_progress(&self, percent: u32, description: &str) -> Result<i32>;

    /// Tell `host` that this node waits on `token`
    fn notify_wait(&self, token: &str, host: &str, timeout_ms: u128) -> Result<i32>;

    fn notify_wake(&self, token: &str, status: &str) -> Result<i32>;

    fn designate_node(&self, fqdn: &str, role: Role) -> Result<i32>;

    fn restart_services(&self, services: &[String]) -> Result<i32>;

    fn copy_file(&self, node: &str, src: &str, dest: &str, perms: Option<&str>) -> Result<i32>;

    fn exec_command(&self, node: &str, command: &str) -> Result<i32>;
}

/// [`Agent`] backed by the agent executable
#[derive(Debug, Clone)]
pub struct CommandAgent {
    program: PathBuf,
    user: String,
    token_dir: PathBuf,
}

impl CommandAgent {
    pub fn new(program: impl Into<PathBuf>, user: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            user: user.into(),
            token_dir: PathBuf::from(TOKEN_DIR),
        }
    }

    /// Directory holding the per-user access token file
    pub fn with_token_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.token_dir = dir.into();
        self
    }

    fn run(&self, args: &[&str]) -> Result<i32> {
        log::debug!(
            "Invoking {} {} {}",
            self.program.display(),
            AGENT_SUBCOMMAND,
            args.join(" ")
        );

        let output = Command::new(&self.program)
            .arg(AGENT_SUBCOMMAND)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| Error::agent(self.program.display().to_string(), e.to_string()))?;

        let status = match output.status.code() {
            Some(code) if code < 127 => code,
            _ => AGENT_UNAVAILABLE_STATUS,
        };
        if status != 0 {
            log::warn!(
                "Agent call '{}' failed with status {}: {}",
                args.first().copied().unwrap_or_default(),
                status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(status)
    }

    /// Ask the agent for a fresh access token and read it back
    fn acquire_token(&self) -> Result<String> {
        let status = self.run(&["create_bdvcli_token", &self.user])?;
        if status != 0 {
            return Err(Error::agent(
                self.program.display().to_string(),
                format!("Failed to create access token (status {})", status),
            ));
        }

        let token_file = self.token_dir.join(format!(".{}-token", self.user));
        std::fs::read_to_string(&token_file)
            .map(|token| token.trim().to_string())
            .map_err(|e| {
                Error::agent(
                    self.program.display().to_string(),
                    format!("Failed to read token {}: {}", token_file.display(), e),
                )
            })
    }
}

impl Agent for CommandAgent {
    fn register_service(
        &self,
        global_id: &str,
        kind: ServiceKind,
        unit: &str,
        display_name: &str,
    ) -> Result<i32> {
        self.run(&["register_srvc", global_id, unit, kind.as_str(), display_name])
    }

    fn unregister_service(&self, global_id: &str) -> Result<i32> {
        self.run(&["unregister_srvc", global_id])
    }

    fn notify_progress(&self, percent: u32, description: &str) -> Result<i32> {
        self.run(&["progress", &percent.to_string(), description])
    }

    fn notify_wait(&self, token: &str, host: &str, timeout_ms: u128) -> Result<i32> {
        self.run(&["wait", &timeout_ms.to_string(), token, host])
    }

    fn notify_wake(&self, token: &str, status: &str) -> Result<i32> {
        self.run(&["wake", token, status])
    }

    fn designate_node(&self, fqdn: &str, role: Role) -> Result<i32> {
        self.run(&["designate", role.as_str(), fqdn])
    }

    fn restart_services(&self, services: &[String]) -> Result<i32> {
        self.run(&["restart_srvc", &services.join(",")])
    }

    fn copy_file(&self, node: &str, src: &str, dest: &str, perms: Option<&str>) -> Result<i32> {
        let token = self.acquire_token()?;
        let perms = perms.unwrap_or(DEFAULT_COPY_PERMS);
        self.run(&["copy_file", node, src, dest, &self.user, perms, &token])
    }

    fn exec_command(&self, node: &str, command: &str) -> Result<i32> {
        let token = self.acquire_token()?;
        self.run(&["exec_command", node, &self.user, command, &token])
    }
}

/// Name of the user running this process
pub fn current_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("LOGNAME"))
        .unwrap_or_else(|_| "root".to_string())
}

/// Report configuration progress after validating the arguments
pub fn report_progress(agent: &dyn Agent, percent: u32, description: &str) -> Result<i32> {
    let len = description.chars().count();
    if len > MAX_DESCRIPTION_LEN {
        return Err(Error::description_too_long(len, MAX_DESCRIPTION_LEN));
    }
    if percent > 100 {
        return Err(Error::percentage_out_of_range(percent));
    }
    agent.notify_progress(percent, description)
}

/// Designate this node (by its `node.fqdn`) for `role`
pub fn designate(agent: &dyn Agent, macros: &Macros<'_>, role: Role) -> Result<i32> {
    let fqdn = macros.get("node.fqdn")?;
    agent.designate_node(&fqdn, role)
}

/// Register an application service described at `service_key`, which must
/// hold `global_id` and `name` entries
pub fn register_app_service(
    agent: &dyn Agent,
    resolver: &Resolver,
    service_key: impl Into<KeyInput>,
    kind: ServiceKind,
    unit: &str,
) -> Result<i32> {
    let key = service_key.into().into_key_path();
    let global_id = resolve_string(resolver, &key.child("global_id"))?;
    let name = resolve_string(resolver, &key.child("name"))?;
    agent.register_service(&global_id, kind, unit, &name)
}

/// Unregister the application service described at `service_key`
pub fn unregister_app_service(
    agent: &dyn Agent,
    resolver: &Resolver,
    service_key: impl Into<KeyInput>,
) -> Result<i32> {
    let key = service_key.into().into_key_path();
    let global_id = resolve_string(resolver, &key.child("global_id"))?;
    agent.unregister_service(&global_id)
}

/// Register a system service that has no metadata entry. The unit name
/// doubles as its global id.
pub fn register_system_service(
    agent: &dyn Agent,
    init: InitSystem,
    unit: &str,
    display_name: &str,
) -> Result<i32> {
    agent.register_service(unit, init.system_kind(), unit, display_name)
}

pub fn unregister_system_service(agent: &dyn Agent, unit: &str) -> Result<i32> {
    agent.unregister_service(unit)
}

/// Restart `services`, or every registered service when the list is empty
pub fn restart(agent: &dyn Agent, services: &[String]) -> Result<i32> {
    if services.is_empty() {
        return agent.restart_services(&[RESTART_ALL_SERVICES.to_string()]);
    }
    agent.restart_services(services)
}

fn resolve_string(resolver: &Resolver, path: &KeyPath) -> Result<String> {
    let value = resolver.resolve(path)?;
    render(&path.to_string(), &value)
}

/// Wait/poll settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitOptions {
    /// Give up after this long
    pub timeout: Duration,
    /// Delay between attempts
    pub poll_interval: Duration,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(3600),
            poll_interval: Duration::from_secs(10),
        }
    }
}

/// Block until the agent reports `token` on `host` as ready.
///
/// Each attempt hands the agent the remaining budget. A non-zero status is
/// retried after `poll_interval` until `timeout` has elapsed.
pub fn wait_for_token(
    agent: &dyn Agent,
    token: &str,
    host: &str,
    options: &WaitOptions,
) -> Result<()> {
    let started = Instant::now();

    loop {
        let remaining = options.timeout.saturating_sub(started.elapsed());
        let status = agent.notify_wait(token, host, remaining.as_millis())?;
        if status == 0 {
            log::debug!("Token '{}' on {} is ready", token, host);
            return Ok(());
        }

        if started.elapsed() + options.poll_interval > options.timeout {
            return Err(Error::wait_timeout(token, started.elapsed().as_millis()));
        }
        log::debug!(
            "Token '{}' on {} not ready (status {}), retrying",
            token,
            host,
            status
        );
        thread::sleep(options.poll_interval);
    }
}

/// Wait for every service registered below each of `service_keys`.
///
/// Each `global_id` found by searching a key is waited on at the hosts listed
/// in the sibling `fqdns` entry.
pub fn wait_for_services(
    agent: &dyn Agent,
    resolver: &Resolver,
    service_keys: &[KeyPath],
    options: &WaitOptions,
) -> Result<()> {
    for key in service_keys {
        for id_path in resolver.search(key, "global_id")? {
            let global_id = resolve_string(resolver, &id_path)?;
            let fqdns_path = id_path
                .parent()
                .map(|p| p.child("fqdns"))
                .unwrap_or_else(|| KeyPath::from(["fqdns"]));
            let hosts = resolve_string(resolver, &fqdns_path)?;
            wait_for_token(agent, &global_id, &hosts, options)?;
        }
    }
    Ok(())
}
