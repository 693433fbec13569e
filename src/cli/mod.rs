//! CLI module for rancherctl
//!
//! Provides resource-scoped subcommands:
//! - `rancherctl cluster` - Inspect clusters
//! - `rancherctl stack` - Inspect and create stacks
//! - `rancherctl service` - Create, update, upgrade and remove services
//! - `rancherctl loadbalancer` - Edit load balancer port rules
//! - `rancherctl context` - Manage saved connection contexts

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

mod commands;
mod display;

pub use commands::*;
pub use display::*;

#[derive(Parser, Debug)]
#[command(name = "rancherctl")]
#[command(about = "Drive Rancher clusters, stacks, services and load balancers")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging output (--verbose, --verbose --verbose)
    #[arg(long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to config file (default: ~/.rancherctl/config)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Saved context to connect with (default: the current context)
    #[arg(long, global = true)]
    pub context: Option<String>,

    /// Path to a .env file loaded before resolving connection settings
    #[arg(long, value_name = "FILE", global = true)]
    pub env_file: Option<PathBuf>,

    #[command(flatten)]
    pub connection: ConnectionFlags,

    #[command(subcommand)]
    pub command: Commands,
}

/// Connection settings; each falls back to its environment variable
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionFlags {
    /// Rancher URL
    #[arg(long, env = "RANCHER_URL")]
    pub url: Option<String>,

    /// Rancher API version (e.g. v2-beta)
    #[arg(long, env = "RANCHER_API_VERSION")]
    pub api_version: Option<String>,

    /// Rancher access key
    #[arg(long, env = "RANCHER_ACCESS_KEY")]
    pub access_key: Option<String>,

    /// Rancher secret key
    #[arg(long, env = "RANCHER_SECRET_KEY", hide_env_values = true)]
    pub secret_key: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Inspect clusters
    Cluster(ClusterArgs),

    /// Inspect and create stacks
    Stack(StackArgs),

    /// Manage services
    Service(ServiceArgs),

    /// Edit load balancer port rules
    #[command(name = "loadbalancer", visible_alias = "lb")]
    LoadBalancer(LoadBalancerArgs),

    /// Manage saved contexts
    Context(ContextArgs),
}

// ============================================================================
// cluster
// ============================================================================

#[derive(Parser, Debug)]
pub struct ClusterArgs {
    /// Cluster name
    #[arg(long)]
    pub name: Option<String>,

    #[command(subcommand)]
    pub action: ClusterAction,
}

#[derive(Subcommand, Debug)]
pub enum ClusterAction {
    /// Get the clusters that match the given parameters
    Get {
        /// Show the full object
        #[arg(long)]
        detail: bool,
    },
}

// ============================================================================
// stack
// ============================================================================

#[derive(Parser, Debug)]
pub struct StackArgs {
    /// Cluster where the stack resides
    #[arg(long)]
    pub cluster: Option<String>,

    /// Project where the stack resides
    #[arg(long, env = "RANCHER_ENVIRONMENT")]
    pub project: Option<String>,

    /// Stack name
    #[arg(long)]
    pub name: Option<String>,

    #[command(subcommand)]
    pub action: StackAction,
}

#[derive(Subcommand, Debug)]
pub enum StackAction {
    /// Get the stacks that match the given parameters
    Get {
        /// Show the full object
        #[arg(long)]
        detail: bool,
    },

    /// Create a new stack
    Create {
        /// Stack description
        #[arg(long)]
        description: Option<String>,
    },
}

// ============================================================================
// service
// ============================================================================

/// Where a service resides
#[derive(Args, Debug, Clone, Default)]
pub struct ServiceScope {
    /// Cluster where the service resides
    #[arg(long)]
    pub cluster: Option<String>,

    /// Project where the service resides
    #[arg(long, env = "RANCHER_ENVIRONMENT")]
    pub project: Option<String>,

    /// Stack where the service resides
    #[arg(long)]
    pub stack: Option<String>,

    /// Service name
    #[arg(long)]
    pub name: Option<String>,
}

#[derive(Parser, Debug)]
pub struct ServiceArgs {
    #[command(flatten)]
    pub scope: ServiceScope,

    #[command(subcommand)]
    pub action: ServiceAction,
}

/// Launch configuration options shared by create and upgrade
#[derive(Args, Debug, Clone, Default)]
pub struct LaunchArgs {
    /// Service label as KEY=VALUE (pull_image, host_label)
    #[arg(short, long = "label", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub labels: Vec<(String, String)>,

    /// Host path to mount into the containers (HOST:CONTAINER)
    #[arg(short, long = "volume", value_name = "PATH")]
    pub volumes: Vec<String>,

    /// Environment variable as NAME=VALUE
    #[arg(short, long = "environment", value_name = "NAME=VALUE", value_parser = parse_key_val)]
    pub environment: Vec<(String, String)>,
}

#[derive(Subcommand, Debug)]
pub enum ServiceAction {
    /// Get the services that match the given parameters
    Get {
        /// Show the full object
        #[arg(long)]
        detail: bool,
    },

    /// Create a new service
    Create(CreateArgs),

    /// Remove an existing service
    Remove {
        /// Seconds to wait for the service to be removed
        #[arg(long, default_value_t = 60, value_parser = clap::value_parser!(u64).range(1..=1000))]
        timeout: u64,
    },

    /// Update an existing service
    Update(UpdateArgs),

    /// Upgrade an existing service (optionally creating it)
    Upgrade(UpgradeArgs),

    /// Restart the containers of a service
    Restart(WaitArgs),

    /// Activate a service
    Activate(WaitArgs),

    /// Deactivate a service
    Deactivate(WaitArgs),
}

#[derive(Parser, Debug)]
pub struct CreateArgs {
    /// Name of the service to create
    #[arg(long)]
    pub name: String,

    /// Image to use for the service containers
    #[arg(long)]
    pub image: String,

    /// Seconds to wait for the service to become active
    #[arg(long, default_value_t = 180, value_parser = clap::value_parser!(u64).range(5..=1000))]
    pub timeout: u64,

    /// Remove the service if it is not active within the timeout
    #[arg(long)]
    pub rollback_on_timeout: bool,

    #[command(flatten)]
    pub launch: LaunchArgs,
}

#[derive(Parser, Debug)]
pub struct UpdateArgs {
    /// New name for the service
    #[arg(long)]
    pub new_name: Option<String>,

    /// Description to update with
    #[arg(long)]
    pub description: Option<String>,

    /// Scale to update with
    #[arg(long)]
    pub scale: Option<u32>,

    /// Scale policy as a JSON object
    #[arg(long, value_name = "JSON", value_parser = parse_json)]
    pub scale_policy: Option<serde_json::Value>,

    /// Selector container to update with
    #[arg(long)]
    pub selector_container: Option<String>,

    /// Selector link to update with
    #[arg(long)]
    pub selector_link: Option<String>,

    /// Seconds to wait for the service to become active
    #[arg(long, default_value_t = 180, value_parser = clap::value_parser!(u64).range(5..=1000))]
    pub timeout: u64,
}

#[derive(Parser, Debug)]
pub struct UpgradeArgs {
    /// Number of containers upgraded at a time
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..=5))]
    pub batch_size: u32,

    /// Milliseconds between batches
    #[arg(long, default_value_t = 2000)]
    pub interval_millis: u64,

    /// Start the new container before stopping the old one
    #[arg(long)]
    pub start_first: bool,

    /// Seconds to wait for the upgrade to finish
    #[arg(long, default_value_t = 180, value_parser = clap::value_parser!(u64).range(5..=1000))]
    pub timeout: u64,

    /// Roll back if the upgrade does not finish within the timeout
    #[arg(long)]
    pub rollback_on_timeout: bool,

    /// Create the service if it does not exist
    #[arg(long)]
    pub create: bool,

    /// Image to upgrade the service with
    #[arg(long)]
    pub image: Option<String>,

    #[command(flatten)]
    pub launch: LaunchArgs,

    /// Skip pulling the image on the hosts before upgrading
    #[arg(long)]
    pub no_prefetch: bool,

    /// Program used to pull the image on the hosts
    #[arg(long, default_value = "rancher_cli")]
    pub prefetch_command: String,
}

#[derive(Parser, Debug)]
pub struct WaitArgs {
    /// Seconds to wait for the operation to finish (default: do not wait)
    #[arg(long, value_parser = clap::value_parser!(u64).range(5..=1000))]
    pub timeout: Option<u64>,
}

// ============================================================================
// loadbalancer
// ============================================================================

#[derive(Parser, Debug)]
pub struct LoadBalancerArgs {
    #[command(flatten)]
    pub scope: ServiceScope,

    #[command(subcommand)]
    pub action: LoadBalancerAction,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protocol {
    #[default]
    Http,
    Https,
    Tcp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
            Protocol::Tcp => "tcp",
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum LoadBalancerAction {
    /// Add or replace a port rule
    UpdatePortRule(UpdatePortRuleArgs),

    /// Remove matching port rules
    RemovePortRule(RemovePortRuleArgs),
}

#[derive(Parser, Debug)]
pub struct UpdatePortRuleArgs {
    /// Hostname or wildcard domain (no scheme, no path)
    #[arg(long)]
    pub hostname: String,

    /// Path prefix, starting with '/'
    #[arg(long, default_value = "/")]
    pub path: String,

    /// Priority level
    #[arg(long, default_value_t = 1)]
    pub priority: i64,

    #[arg(long, value_enum, default_value_t = Protocol::Http)]
    pub protocol: Protocol,

    /// Name of the service to forward the traffic to
    #[arg(long)]
    pub service: String,

    /// Stack of the service to forward the traffic to
    #[arg(long)]
    pub target_stack: String,

    /// Port to listen on
    #[arg(long, value_parser = clap::value_parser!(u16).range(50..=65535))]
    pub source_port: u16,

    /// Port to forward the traffic to
    #[arg(long, value_parser = clap::value_parser!(u16).range(50..=65535))]
    pub target_port: u16,

    /// A line of custom haproxy config for this rule's backend
    #[arg(long = "custom", value_name = "LINE")]
    pub custom: Vec<String>,

    /// Restart the load balancer afterwards
    #[arg(long)]
    pub reload: bool,
}

#[derive(Parser, Debug)]
pub struct RemovePortRuleArgs {
    #[arg(long)]
    pub hostname: String,

    #[arg(long)]
    pub path: String,

    #[arg(long, value_parser = clap::value_parser!(u16).range(50..=65535))]
    pub source_port: u16,

    #[arg(long, value_parser = clap::value_parser!(u16).range(50..=65535))]
    pub target_port: u16,
}

// ============================================================================
// context
// ============================================================================

/// Arguments for the context command
#[derive(Parser, Debug)]
pub struct ContextArgs {
    #[command(subcommand)]
    pub action: ContextAction,
}

#[derive(Subcommand, Debug)]
pub enum ContextAction {
    /// List all contexts
    List,

    /// Show current context
    Current,

    /// Switch to a context
    Use {
        /// Context name
        name: String,
    },

    /// Add (or replace) a context
    Add {
        /// Context name
        name: String,

        /// Rancher URL
        #[arg(long)]
        url: String,

        #[arg(long)]
        api_version: Option<String>,

        #[arg(long)]
        access_key: Option<String>,

        #[arg(long)]
        secret_key: Option<String>,

        #[arg(long)]
        description: Option<String>,
    },

    /// Delete a context
    Delete {
        /// Context name
        name: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service_action(cli: Cli) -> (ServiceScope, ServiceAction) {
        match cli.command {
            Commands::Service(args) => (args.scope, args.action),
            _ => panic!("Expected Service command"),
        }
    }

    #[test]
    fn test_parse_service_create() {
        let cli = Cli::parse_from([
            "rancherctl",
            "service",
            "--project",
            "prod",
            "--stack",
            "frontend",
            "create",
            "--name",
            "api",
            "--image",
            "registry/api:1",
            "-l",
            "host_label=web",
            "-v",
            "/srv:/srv",
            "-e",
            "DB_URL=postgres://db/app?sslmode=require",
        ]);
        let (scope, action) = service_action(cli);
        assert_eq!(scope.project.as_deref(), Some("prod"));
        match action {
            ServiceAction::Create(args) => {
                assert_eq!(args.name, "api");
                assert_eq!(args.timeout, 180);
                assert!(!args.rollback_on_timeout);
                assert_eq!(args.launch.labels, vec![("host_label".to_string(), "web".to_string())]);
                assert_eq!(args.launch.volumes, vec!["/srv:/srv".to_string()]);
                assert_eq!(
                    args.launch.environment,
                    vec![(
                        "DB_URL".to_string(),
                        "postgres://db/app?sslmode=require".to_string()
                    )]
                );
            }
            _ => panic!("Expected Create action"),
        }
    }

    #[test]
    fn test_parse_upgrade_defaults() {
        let cli = Cli::parse_from(["rancherctl", "service", "--name", "api", "upgrade"]);
        match service_action(cli).1 {
            ServiceAction::Upgrade(args) => {
                assert_eq!(args.batch_size, 1);
                assert_eq!(args.interval_millis, 2000);
                assert_eq!(args.timeout, 180);
                assert_eq!(args.prefetch_command, "rancher_cli");
                assert!(!args.no_prefetch && !args.create && !args.start_first);
            }
            _ => panic!("Expected Upgrade action"),
        }
    }

    #[test]
    fn test_timeout_out_of_range_rejected() {
        let result = Cli::try_parse_from([
            "rancherctl", "service", "create", "--name", "a", "--image", "b", "--timeout", "2",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_batch_size_out_of_range_rejected() {
        let result = Cli::try_parse_from(["rancherctl", "service", "upgrade", "--batch-size", "6"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_malformed_label_rejected() {
        let result = Cli::try_parse_from([
            "rancherctl", "service", "create", "--name", "a", "--image", "b", "-l", "pull_image",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_update_port_rule() {
        let cli = Cli::parse_from([
            "rancherctl",
            "loadbalancer",
            "--project",
            "prod",
            "--stack",
            "edge",
            "--name",
            "lb",
            "update-port-rule",
            "--hostname",
            "api.example.com",
            "--service",
            "api",
            "--target-stack",
            "frontend",
            "--source-port",
            "443",
            "--target-port",
            "8080",
            "--protocol",
            "https",
            "--custom",
            "timeout server 60s",
        ]);
        match cli.command {
            Commands::LoadBalancer(args) => match args.action {
                LoadBalancerAction::UpdatePortRule(rule) => {
                    assert_eq!(rule.path, "/");
                    assert_eq!(rule.priority, 1);
                    assert_eq!(rule.protocol, Protocol::Https);
                    assert_eq!(rule.custom, vec!["timeout server 60s".to_string()]);
                    assert!(!rule.reload);
                }
                _ => panic!("Expected UpdatePortRule action"),
            },
            _ => panic!("Expected LoadBalancer command"),
        }
    }

    #[test]
    fn test_source_port_below_range_rejected() {
        let result = Cli::try_parse_from([
            "rancherctl", "lb", "remove-port-rule", "--hostname", "a", "--path", "/",
            "--source-port", "22", "--target-port", "8080",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_context_add() {
        let cli = Cli::parse_from([
            "rancherctl",
            "context",
            "add",
            "prod",
            "--url",
            "https://rancher.example.com",
            "--api-version",
            "v2-beta",
        ]);
        match cli.command {
            Commands::Context(args) => match args.action {
                ContextAction::Add { name, url, api_version, .. } => {
                    assert_eq!(name, "prod");
                    assert_eq!(url, "https://rancher.example.com");
                    assert_eq!(api_version.as_deref(), Some("v2-beta"));
                }
                _ => panic!("Expected Add action"),
            },
            _ => panic!("Expected Context command"),
        }
    }

    #[test]
    fn test_connection_flags_before_subcommand() {
        let cli = Cli::parse_from([
            "rancherctl",
            "--url",
            "https://rancher.example.com",
            "--api-version",
            "v2-beta",
            "cluster",
            "get",
        ]);
        assert_eq!(cli.connection.url.as_deref(), Some("https://rancher.example.com"));
        assert!(matches!(cli.command, Commands::Cluster(_)));
    }

    #[test]
    fn test_verbose_global() {
        let cli = Cli::parse_from(["rancherctl", "cluster", "get", "--verbose", "--verbose"]);
        assert_eq!(cli.verbose, 2);
    }
}
