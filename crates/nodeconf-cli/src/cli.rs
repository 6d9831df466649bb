//! nodeconf CLI - Command-line interface for cluster node metadata
//!
//! Usage:
//!   nodeconf get node.fqdn
//!   nodeconf search services spark_master
//!   nodeconf macro nodegroup --all-fqdns
//!   nodeconf agent progress 40 "Configuring spark"

use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use nodeconf_core::agent::{
    current_user, designate, register_app_service, register_system_service, report_progress,
    restart, unregister_app_service, unregister_system_service, wait_for_services,
    wait_for_token, Agent, CommandAgent, InitSystem, Role, WaitOptions, DEFAULT_AGENT_PROGRAM,
};
use nodeconf_core::key::DEFAULT_DELIMITER;
use nodeconf_core::macros::NAMESPACES;
use nodeconf_core::store::{PLATFORM_METADATA_FILE, PRIVATE_METADATA_FILE, PUBLIC_METADATA_FILE};
use nodeconf_core::{
    ConfigStore, KeyInput, KeyPath, Macros, MetadataPaths, Resolver, ResolverOptions,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

/// nodeconf - Query cluster node metadata
#[derive(Parser)]
#[command(name = "nodeconf")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Public metadata file
    #[arg(long, global = true, default_value = PUBLIC_METADATA_FILE)]
    configmeta: PathBuf,

    /// Platform metadata overlay (privileged callers only)
    #[arg(long, global = true, default_value = PLATFORM_METADATA_FILE)]
    platform_meta: PathBuf,

    /// Private metadata overlay (privileged callers only)
    #[arg(long, global = true, default_value = PRIVATE_METADATA_FILE)]
    priv_meta: PathBuf,

    /// Fail after this many indirections in a single lookup
    #[arg(long, global = true)]
    max_indirections: Option<usize>,

    /// Agent executable
    #[arg(long, global = true, default_value = DEFAULT_AGENT_PROGRAM)]
    agent: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Get the value at a key
    Get {
        /// Key to look up (e.g., node.fqdn); lists namespaces when omitted
        key: Option<String>,

        /// Key delimiter
        #[arg(short, long, default_value = DEFAULT_DELIMITER)]
        delim: String,

        /// Output format: text, json, yaml
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Find every key below START that leads to LEAF
    Search {
        /// Key to start from
        start: String,

        /// Leaf key or value to look for
        leaf: String,

        /// Key delimiter
        #[arg(short, long, default_value = DEFAULT_DELIMITER)]
        delim: String,
    },

    /// Cluster-level queries
    #[command(name = "macro")]
    Macro {
        #[command(subcommand)]
        command: MacroCommands,
    },

    /// Call out to the node agent
    Agent {
        #[command(subcommand)]
        command: AgentCommands,
    },
}

#[derive(Subcommand)]
enum MacroCommands {
    /// Node related macros
    Node(NodeQuery),

    /// Nodegroup related macros
    Nodegroup(NodegroupQuery),

    /// Tenant information
    Tenant {
        /// Single tenant key; all entries when omitted
        key: Option<String>,
    },
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct NodeQuery {
    /// Index of this node
    #[arg(long)]
    self_index: bool,

    /// Id of this node
    #[arg(long)]
    self_id: bool,

    /// Index of the node with this FQDN
    #[arg(long, value_name = "FQDN")]
    index: Option<String>,

    /// Id of the node with this FQDN
    #[arg(long, value_name = "FQDN")]
    id: Option<String>,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct NodegroupQuery {
    /// Number of nodegroups
    #[arg(long)]
    count: bool,

    /// FQDNs in this node's nodegroup
    #[arg(long)]
    local_fqdns: bool,

    /// FQDNs in the given nodegroup
    #[arg(long, value_name = "ID")]
    fqdns: Option<String>,

    /// FQDNs of every node in the cluster
    #[arg(long)]
    all_fqdns: bool,
}

#[derive(Subcommand)]
enum AgentCommands {
    /// Report configuration progress
    Progress {
        /// Percent complete (0-100)
        percent: u32,

        /// Short description (at most 64 characters)
        description: String,
    },

    /// Wait for a token to be woken on a host
    Wait {
        token: String,

        host: String,

        /// Give up after this many seconds
        #[arg(long, default_value_t = 3600)]
        timeout: u64,

        /// Seconds between attempts
        #[arg(long, default_value_t = 10)]
        poll_interval: u64,
    },

    /// Wake everyone waiting on a token
    Wake {
        token: String,

        #[arg(long, default_value = "ok")]
        status: String,
    },

    /// Wait for every service registered below the given keys
    ServiceWait {
        #[arg(required = true)]
        keys: Vec<String>,

        /// Give up after this many seconds
        #[arg(long, default_value_t = 3600)]
        timeout: u64,

        /// Seconds between attempts
        #[arg(long, default_value_t = 10)]
        poll_interval: u64,
    },

    /// Designate this node for a role
    Designate {
        #[arg(value_enum)]
        role: RoleArg,
    },

    /// Register the application service described at KEY
    Register {
        /// Service key holding `global_id` and `name`
        key: String,

        /// Unit or init script name
        unit: String,

        #[arg(long, value_enum, default_value = "systemd")]
        init: InitArg,
    },

    /// Unregister the application service described at KEY
    Unregister { key: String },

    /// Register a system service that has no metadata entry
    RegisterSystem {
        unit: String,

        /// Name shown in service status reports
        display_name: String,

        #[arg(long, value_enum, default_value = "systemd")]
        init: InitArg,
    },

    /// Unregister a system service
    UnregisterSystem { unit: String },

    /// Restart registered services (all of them when none are given)
    Restart { services: Vec<String> },

    /// Copy a file to another node
    Copy {
        node: String,
        src: String,
        dest: String,

        /// Permissions on the copied file
        #[arg(long)]
        perms: Option<String>,
    },

    /// Run a command on another node
    Exec { node: String, command: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum RoleArg {
    Primary,
    Secondary,
}

#[derive(Clone, Copy, ValueEnum)]
enum InitArg {
    Sysv,
    Systemd,
}

impl From<InitArg> for InitSystem {
    fn from(init: InitArg) -> Self {
        match init {
            InitArg::Sysv => InitSystem::Sysv,
            InitArg::Systemd => InitSystem::Systemd,
        }
    }
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Primary => Role::Primary,
            RoleArg::Secondary => Role::Secondary,
        }
    }
}

/// Run the CLI with the process arguments
pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let paths = MetadataPaths {
        public: cli.configmeta.clone(),
        platform: cli.platform_meta.clone(),
        private: cli.priv_meta.clone(),
    };
    let options = ResolverOptions {
        max_indirections: cli.max_indirections,
    };

    match cli.command {
        Commands::Get { key, delim, format } => with_resolver(&paths, options, |r| {
            cmd_get(r, key.as_deref().unwrap_or(""), &delim, &format)
        }),
        Commands::Search { start, leaf, delim } => {
            with_resolver(&paths, options, |r| cmd_search(r, &start, &leaf, &delim))
        }
        Commands::Macro { command } => {
            with_resolver(&paths, options, |r| cmd_macro(&Macros::new(r), command))
        }
        Commands::Agent { command } => {
            let agent = CommandAgent::new(&cli.agent, current_user());
            cmd_agent(&agent, command, &paths, options)
        }
    }
}

/// Load the metadata and hand a resolver to `f`; load failures exit with 2
fn with_resolver(
    paths: &MetadataPaths,
    options: ResolverOptions,
    f: impl FnOnce(&Resolver) -> ExitCode,
) -> ExitCode {
    match open_resolver(paths, options) {
        Ok(resolver) => f(&resolver),
        Err(e) => {
            eprintln!("{}", e.red());
            ExitCode::from(2)
        }
    }
}

fn open_resolver(paths: &MetadataPaths, options: ResolverOptions) -> Result<Resolver, String> {
    let store = ConfigStore::open(paths).map_err(|e| format!("Failed to load metadata: {}", e))?;
    Ok(Resolver::with_options(&store, options))
}

fn fail(e: impl std::fmt::Display) -> ExitCode {
    eprintln!("{}: {}", "Error".red(), e);
    ExitCode::from(1)
}

fn cmd_get(resolver: &Resolver, key: &str, delim: &str, format: &str) -> ExitCode {
    if format == "text" {
        return match Macros::new(resolver).get_with_delimited_key(key, delim) {
            Ok(value) => {
                println!("{}", value);
                ExitCode::SUCCESS
            }
            Err(e) => fail(e),
        };
    }

    let rendered = if key.is_empty() || key == "namespaces" {
        serialize(&NAMESPACES, format)
    } else {
        match resolver.resolve(KeyInput::delimited(key, delim)) {
            Ok(value) => serialize(&value, format),
            Err(e) => return fail(e),
        }
    };

    match rendered {
        Ok(content) => {
            print!("{}", content);
            ExitCode::SUCCESS
        }
        Err(e) => fail(e),
    }
}

fn serialize<T: serde::Serialize + ?Sized>(value: &T, format: &str) -> Result<String, String> {
    match format {
        "json" => serde_json::to_string_pretty(value)
            .map(|s| s + "\n")
            .map_err(|e| e.to_string()),
        "yaml" => serde_yaml::to_string(value).map_err(|e| e.to_string()),
        _ => Err(format!(
            "Unsupported format: {}. Use text, json, or yaml.",
            format
        )),
    }
}

fn cmd_search(resolver: &Resolver, start: &str, leaf: &str, delim: &str) -> ExitCode {
    match resolver.search(KeyInput::delimited(start, delim), leaf) {
        Ok(paths) if paths.is_empty() => {
            eprintln!("{} No key below '{}' leads to '{}'", "✗".red(), start, leaf);
            ExitCode::from(1)
        }
        Ok(paths) => {
            for path in paths {
                println!("{}", path.tokens().join(delim));
            }
            ExitCode::SUCCESS
        }
        Err(e) => fail(e),
    }
}

fn cmd_macro(macros: &Macros<'_>, command: MacroCommands) -> ExitCode {
    let result = match command {
        MacroCommands::Node(q) => {
            if let Some(fqdn) = q.index {
                macros.node_index_for_fqdn(&fqdn)
            } else if let Some(fqdn) = q.id {
                macros.node_id_for_fqdn(&fqdn)
            } else if q.self_index {
                macros.self_node_index()
            } else {
                macros.self_node_id()
            }
        }
        MacroCommands::Nodegroup(q) => {
            if q.count {
                macros.num_nodegroups().map(|n| n.to_string())
            } else if q.local_fqdns {
                macros.local_group_fqdns().map(|f| f.join(","))
            } else if let Some(id) = q.fqdns {
                macros.nodegroup_fqdns(&id).map(|f| f.join(","))
            } else {
                macros.cluster_fqdns().map(|f| f.join(","))
            }
        }
        MacroCommands::Tenant { key: Some(key) } => macros.tenant_info_key(&key),
        MacroCommands::Tenant { key: None } => macros.tenant_info().map(|e| e.join("\n")),
    };

    match result {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => fail(e),
    }
}

fn wait_options(timeout: u64, poll_interval: u64) -> WaitOptions {
    WaitOptions {
        timeout: Duration::from_secs(timeout),
        poll_interval: Duration::from_secs(poll_interval),
    }
}

fn cmd_agent(
    agent: &dyn Agent,
    command: AgentCommands,
    paths: &MetadataPaths,
    options: ResolverOptions,
) -> ExitCode {
    let status = match command {
        AgentCommands::Progress {
            percent,
            description,
        } => report_progress(agent, percent, &description),
        AgentCommands::Wait {
            token,
            host,
            timeout,
            poll_interval,
        } => wait_for_token(agent, &token, &host, &wait_options(timeout, poll_interval))
            .map(|_| 0),
        AgentCommands::Wake { token, status } => agent.notify_wake(&token, &status),
        AgentCommands::Copy {
            node,
            src,
            dest,
            perms,
        } => agent.copy_file(&node, &src, &dest, perms.as_deref()),
        AgentCommands::Exec { node, command } => agent.exec_command(&node, &command),
        AgentCommands::RegisterSystem {
            unit,
            display_name,
            init,
        } => register_system_service(agent, init.into(), &unit, &display_name),
        AgentCommands::UnregisterSystem { unit } => unregister_system_service(agent, &unit),
        AgentCommands::Restart { services } => restart(agent, &services),
        AgentCommands::Register { key, unit, init } => {
            return with_resolver(paths, options, |r| {
                let kind = InitSystem::from(init).app_kind();
                exit_status(register_app_service(agent, r, key.as_str(), kind, &unit))
            });
        }
        AgentCommands::Unregister { key } => {
            return with_resolver(paths, options, |r| {
                exit_status(unregister_app_service(agent, r, key.as_str()))
            });
        }
        AgentCommands::ServiceWait {
            keys,
            timeout,
            poll_interval,
        } => {
            let keys: Vec<KeyPath> = keys
                .iter()
                .map(|k| KeyPath::parse(k, DEFAULT_DELIMITER))
                .collect();
            return with_resolver(paths, options, |r| {
                exit_status(
                    wait_for_services(agent, r, &keys, &wait_options(timeout, poll_interval))
                        .map(|_| 0),
                )
            });
        }
        AgentCommands::Designate { role } => {
            return with_resolver(paths, options, |r| {
                exit_status(designate(agent, &Macros::new(r), role.into()))
            });
        }
    };
    exit_status(status)
}

fn exit_status(status: nodeconf_core::Result<i32>) -> ExitCode {
    match status {
        Ok(0) => ExitCode::SUCCESS,
        Ok(code) => {
            eprintln!("{} Agent exited with status {}", "✗".red(), code);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
        Err(e) => fail(e),
    }
}
