//! Command implementations for the CLI
//!
//! SBIO pattern: Commands return Results and rendered output; printing is
//! handled by the caller

use std::path::Path;

use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::display;
use super::{
    Cli, ClusterAction, ClusterArgs, Commands, ConnectionFlags, ContextAction, CreateArgs, LaunchArgs,
    LoadBalancerAction, LoadBalancerArgs, RemovePortRuleArgs, ServiceAction, ServiceArgs,
    ServiceScope, StackAction, StackArgs, UpdateArgs, UpdatePortRuleArgs, UpgradeArgs,
};
use crate::client::{RancherApi, TransportError};
use crate::context::{self, Config, Connection, ConnectionArgs, Context, ContextError};
use crate::lifecycle::{ImagePrefetch, Lifecycle, LifecycleError, PrefetchTarget, WaitOptions};
use crate::resource::{
    service_labels, Cluster, Filter, InServiceStrategy, LaunchConfigPatch, LoadBalancer, PortRule,
    Project, Resource, RuleError, RuleSelector, Service, Stack,
};

/// Seconds to wait for a load balancer to apply port rule changes
pub const PORT_RULE_TIMEOUT: u64 = 60;

/// Errors that can occur during command execution
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Rule(#[from] RuleError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Must provide --{0}")]
    MissingOption(&'static str),

    #[error("{kind} '{name}' does not exist")]
    NotFound { kind: &'static str, name: String },

    #[error("Service '{0}' already exists")]
    AlreadyExists(String),

    #[error("Service '{0}' is not a loadBalancerService")]
    NotLoadBalancer(String),

    #[error("Server rejected {0}")]
    Rejected(String),

    #[error("'{0}' commands edit the config file and do not run against a connection")]
    NotConnected(&'static str),
}

/// Result type for commands
pub type CommandResult<T> = Result<T, CommandError>;

// ============================================================================
// Value parsers
// ============================================================================

/// Parse a `KEY=VALUE` pair, splitting on the first '='.
pub fn parse_key_val(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}

/// Parse a JSON object argument.
pub fn parse_json(s: &str) -> Result<Value, String> {
    match serde_json::from_str::<Value>(s) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(_) => Err("expected a JSON object".to_string()),
        Err(e) => Err(format!("invalid JSON: {}", e)),
    }
}

fn require<'a>(value: &'a Option<String>, flag: &'static str) -> CommandResult<&'a str> {
    value.as_deref().ok_or(CommandError::MissingOption(flag))
}

// ============================================================================
// Context Commands (Pure business logic)
// ============================================================================

/// Info about a context for display
#[derive(Debug, Clone)]
pub struct ContextInfo {
    pub name: String,
    pub url: String,
    pub is_current: bool,
}

/// List all contexts
pub fn context_list(config: &Config) -> Vec<ContextInfo> {
    let current = config.current_context.as_deref();
    config
        .contexts
        .iter()
        .map(|(name, ctx)| ContextInfo {
            name: name.clone(),
            url: ctx.url.clone(),
            is_current: Some(name.as_str()) == current,
        })
        .collect()
}

/// Get current context name and URL
pub fn context_current(config: &Config) -> CommandResult<(String, String)> {
    let name = context::get_current_context(config)?;
    let ctx = context::get_context(config, name)?;
    Ok((name.to_string(), ctx.url.clone()))
}

/// Switch to a context
pub fn context_use(config: &mut Config, name: &str) -> CommandResult<()> {
    context::set_current_context(config, name)?;
    Ok(())
}

/// Add a new context; the first one added becomes current
pub fn context_add(config: &mut Config, ctx: Context) -> CommandResult<()> {
    let name = ctx.name.clone();
    context::add_context(config, ctx);
    if config.current_context.is_none() {
        context::set_current_context(config, &name)?;
    }
    Ok(())
}

/// Delete a context
pub fn context_delete(config: &mut Config, name: &str) -> CommandResult<bool> {
    let removed = context::remove_context(config, name);
    Ok(removed.is_some())
}

/// Run a context subcommand against the config file at `path`.
pub fn run_context(action: ContextAction, path: &Path) -> CommandResult<String> {
    let mut config = context::load_config_from(path)?;

    let output = match action {
        ContextAction::List => return Ok(display::format_context_list(&context_list(&config))),
        ContextAction::Current => {
            let (name, url) = context_current(&config)?;
            return Ok(display::format_current_context(&name, &url));
        }
        ContextAction::Use { name } => {
            context_use(&mut config, &name)?;
            format!("Switched to context '{}'\n", name)
        }
        ContextAction::Add {
            name,
            url,
            api_version,
            access_key,
            secret_key,
            description,
        } => {
            let ctx = Context {
                name: name.clone(),
                url,
                api_version,
                access_key,
                secret_key,
                description,
            };
            context_add(&mut config, ctx)?;
            format!("Context '{}' saved\n", name)
        }
        ContextAction::Delete { name } => {
            if !context_delete(&mut config, &name)? {
                return Err(ContextError::ContextNotFound(name).into());
            }
            format!("Context '{}' deleted\n", name)
        }
    };

    context::save_config_to(&config, path)?;
    Ok(output)
}

// ============================================================================
// Payload builders (Pure business logic)
// ============================================================================

/// Launch configuration from the create/upgrade options
pub fn launch_config(image: Option<&str>, launch: &LaunchArgs) -> LaunchConfigPatch {
    LaunchConfigPatch {
        image: image.map(str::to_string),
        data_volumes: launch.volumes.clone(),
        labels: service_labels(&launch.labels),
        environment: launch.environment.iter().cloned().collect(),
    }
}

/// Service create parameters: name plus launch configuration
pub fn create_params(name: &str, launch: &LaunchConfigPatch) -> Value {
    json!({
        "name": name,
        "launchConfig": launch.to_value(),
    })
}

/// Update overlay holding only the fields that were given
pub fn update_overlay(args: &UpdateArgs) -> Value {
    let mut overlay = Map::new();
    if let Some(name) = &args.new_name {
        overlay.insert("name".to_string(), json!(name));
    }
    if let Some(description) = &args.description {
        overlay.insert("description".to_string(), json!(description));
    }
    if let Some(scale) = args.scale {
        overlay.insert("scale".to_string(), json!(scale));
    }
    if let Some(policy) = &args.scale_policy {
        overlay.insert("scalePolicy".to_string(), policy.clone());
    }
    if let Some(selector) = &args.selector_container {
        overlay.insert("selectorContainer".to_string(), json!(selector));
    }
    if let Some(selector) = &args.selector_link {
        overlay.insert("selectorLink".to_string(), json!(selector));
    }
    Value::Object(overlay)
}

/// Port rule forwarding to `target`
pub fn port_rule(args: &UpdatePortRuleArgs, target: &Resource) -> PortRule {
    let protocol = args.protocol.as_str();
    PortRule {
        hostname: Some(args.hostname.clone()),
        path: Some(args.path.clone()),
        priority: Some(args.priority),
        protocol: Some(protocol.to_string()),
        service_id: Some(target.id().to_string()),
        source_port: Some(args.source_port),
        target_port: Some(args.target_port),
        backend_name: Some(PortRule::backend_name_for(
            target.display_name(),
            args.source_port,
            args.target_port,
            protocol,
        )),
        ..PortRule::default()
    }
}

pub fn rule_selector(args: &RemovePortRuleArgs) -> RuleSelector {
    RuleSelector {
        hostname: args.hostname.clone(),
        path: args.path.clone(),
        source_port: args.source_port,
        target_port: args.target_port,
    }
}

fn name_filter(name: Option<&str>) -> Filter {
    name.map(Filter::by_name).unwrap_or_default()
}

// ============================================================================
// Entry point
// ============================================================================

impl From<ConnectionFlags> for ConnectionArgs {
    fn from(flags: ConnectionFlags) -> Self {
        Self {
            url: flags.url,
            api_version: flags.api_version,
            access_key: flags.access_key,
            secret_key: flags.secret_key,
        }
    }
}

/// Run a parsed command line and return what should be printed.
///
/// Context commands only touch the config file; everything else resolves a
/// connection first, so missing settings fail before any request is made.
pub async fn run(cli: Cli) -> CommandResult<String> {
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(context::default_config_path);

    match cli.command {
        Commands::Context(args) => run_context(args.action, &config_path),
        command => {
            let config = context::load_config_from(&config_path)?;
            let connection = context::resolve_connection(
                &cli.connection.into(),
                &config,
                cli.context.as_deref(),
            )?;
            debug!("Connecting to {}", connection.endpoint());
            Session::connect(connection).execute(command).await
        }
    }
}

// ============================================================================
// Session: resolved connection plus scope lookups
// ============================================================================

/// One connected run of the CLI
#[derive(Debug, Clone)]
pub struct Session {
    api: RancherApi,
    lifecycle: Lifecycle,
    connection: Connection,
}

impl Session {
    /// Connect over HTTP with the resolved parameters
    pub fn connect(connection: Connection) -> Self {
        let api = RancherApi::connect(
            &connection.url,
            &connection.api_version,
            connection.credentials(),
        );
        Self::new(api, Lifecycle::new(), connection)
    }

    pub fn new(api: RancherApi, lifecycle: Lifecycle, connection: Connection) -> Self {
        Self {
            api,
            lifecycle,
            connection,
        }
    }

    pub fn api(&self) -> &RancherApi {
        &self.api
    }

    /// Dispatch a connected command and render its output.
    pub async fn execute(&self, command: Commands) -> CommandResult<String> {
        match command {
            Commands::Cluster(args) => self.cluster(args).await,
            Commands::Stack(args) => self.stack(args).await,
            Commands::Service(args) => self.service(args).await,
            Commands::LoadBalancer(args) => self.loadbalancer(args).await,
            Commands::Context(_) => Err(CommandError::NotConnected("context")),
        }
    }

    // ---- scope resolution ------------------------------------------------

    async fn find_cluster(&self, name: &str) -> CommandResult<Cluster> {
        self.api
            .cluster(&Filter::by_name(name))
            .await?
            .ok_or_else(|| CommandError::NotFound {
                kind: "Cluster",
                name: name.to_string(),
            })
    }

    async fn find_project(&self, cluster: Option<&str>, name: &str) -> CommandResult<Project> {
        let filter = Filter::by_name(name);
        let project = match cluster {
            Some(cluster) => self.find_cluster(cluster).await?.project(&filter).await?,
            None => self.api.project(&filter).await?,
        };
        project.ok_or_else(|| CommandError::NotFound {
            kind: "Project",
            name: name.to_string(),
        })
    }

    async fn find_stack(&self, project: &Project, name: &str) -> CommandResult<Stack> {
        project
            .stack(&Filter::by_name(name))
            .await?
            .ok_or_else(|| CommandError::NotFound {
                kind: "Stack",
                name: name.to_string(),
            })
    }

    /// The stack named by the scope; requires --project and --stack
    async fn scope_stack(&self, scope: &ServiceScope) -> CommandResult<Stack> {
        let project_name = require(&scope.project, "project")?;
        let stack_name = require(&scope.stack, "stack")?;
        let project = self.find_project(scope.cluster.as_deref(), project_name).await?;
        self.find_stack(&project, stack_name).await
    }

    /// The service named by the scope, if it exists
    async fn scope_service(&self, scope: &ServiceScope) -> CommandResult<Option<Service>> {
        let name = require(&scope.name, "name")?;
        let stack = self.scope_stack(scope).await?;
        Ok(stack.service(&Filter::by_name(name)).await?)
    }

    async fn require_service(&self, scope: &ServiceScope) -> CommandResult<Service> {
        self.scope_service(scope)
            .await?
            .ok_or_else(|| CommandError::NotFound {
                kind: "Service",
                name: scope.name.clone().unwrap_or_default(),
            })
    }

    // ---- cluster -----------------------------------------------------------

    async fn cluster(&self, args: ClusterArgs) -> CommandResult<String> {
        let ClusterAction::Get { detail } = args.action;
        let clusters = match args.name.as_deref() {
            Some(name) => vec![self.find_cluster(name).await?],
            None => self.api.clusters(&Filter::new()).await?,
        };
        let resources: Vec<&Resource> = clusters.iter().map(Cluster::resource).collect();
        if detail {
            return Ok(display::format_detail(&resources)?);
        }
        Ok(display::format_cluster_list(&resources))
    }

    // ---- stack -------------------------------------------------------------

    async fn stack(&self, args: StackArgs) -> CommandResult<String> {
        match args.action {
            StackAction::Get { detail } => {
                let filter = name_filter(args.name.as_deref());
                let stacks = match args.project.as_deref() {
                    Some(project) => {
                        self.find_project(args.cluster.as_deref(), project)
                            .await?
                            .stacks(&filter)
                            .await?
                    }
                    None => self.api.stacks(&filter).await?,
                };
                if let (Some(name), true) = (&args.name, stacks.is_empty()) {
                    return Err(CommandError::NotFound {
                        kind: "Stack",
                        name: name.clone(),
                    });
                }
                let resources: Vec<&Resource> = stacks.iter().map(Stack::resource).collect();
                if detail {
                    return Ok(display::format_detail(&resources)?);
                }
                Ok(display::format_stack_list(&resources))
            }
            StackAction::Create { description } => {
                let project_name = require(&args.project, "project")?;
                let name = require(&args.name, "name")?;
                let project = self.find_project(args.cluster.as_deref(), project_name).await?;
                if project.stack(&Filter::by_name(name)).await?.is_some() {
                    warn!("Stack '{}' already exists in project '{}'", name, project_name);
                    return Ok(String::new());
                }

                let mut fields = json!({ "name": name });
                if let Some(description) = description {
                    fields["description"] = json!(description);
                }
                let stack = project
                    .add_stack(&fields)
                    .await?
                    .ok_or_else(|| CommandError::Rejected(format!("creation of stack '{}'", name)))?;
                info!("Stack {}/{} created", project_name, stack.resource().display_name());
                Ok(String::new())
            }
        }
    }

    // ---- service -------------------------------------------------------------

    async fn list_services(&self, scope: &ServiceScope) -> CommandResult<Vec<Service>> {
        let filter = name_filter(scope.name.as_deref());
        let services = if scope.stack.is_some() {
            self.scope_stack(scope).await?.services(&filter).await?
        } else if let Some(project) = scope.project.as_deref() {
            self.find_project(scope.cluster.as_deref(), project)
                .await?
                .services(&filter)
                .await?
        } else {
            self.api.services(&filter).await?
        };
        Ok(services)
    }

    async fn service(&self, args: ServiceArgs) -> CommandResult<String> {
        let scope = args.scope;
        match args.action {
            ServiceAction::Get { detail } => {
                let services = self.list_services(&scope).await?;
                if let (Some(name), true) = (&scope.name, services.is_empty()) {
                    return Err(CommandError::NotFound {
                        kind: "Service",
                        name: name.clone(),
                    });
                }
                let resources: Vec<&Resource> = services.iter().map(Service::resource).collect();
                if detail {
                    return Ok(display::format_detail(&resources)?);
                }
                Ok(display::format_service_list(&resources))
            }
            ServiceAction::Create(create) => {
                self.create_service(&scope, &create).await?;
                Ok(String::new())
            }
            ServiceAction::Remove { timeout } => {
                let service = self.require_service(&scope).await?;
                self.lifecycle.remove(service.resource(), Some(timeout)).await?;
                info!("Service '{}' removed", service.resource().display_name());
                Ok(String::new())
            }
            ServiceAction::Update(update) => {
                let service = self.require_service(&scope).await?;
                let overlay = update_overlay(&update);
                self.lifecycle
                    .update(service.resource(), &overlay, Some(update.timeout))
                    .await?;
                info!("Service '{}' updated", service.resource().display_name());
                Ok(String::new())
            }
            ServiceAction::Upgrade(upgrade) => {
                self.upgrade_service(&scope, &upgrade).await?;
                Ok(String::new())
            }
            ServiceAction::Restart(wait) => {
                let service = self.require_service(&scope).await?;
                self.lifecycle.restart(service.resource(), wait.timeout).await?;
                info!("Service '{}' restarted", service.resource().display_name());
                Ok(String::new())
            }
            ServiceAction::Activate(wait) => {
                let service = self.require_service(&scope).await?;
                self.lifecycle.activate(service.resource(), wait.timeout).await?;
                info!("Service '{}' activated", service.resource().display_name());
                Ok(String::new())
            }
            ServiceAction::Deactivate(wait) => {
                let service = self.require_service(&scope).await?;
                self.lifecycle
                    .deactivate(service.resource(), wait.timeout)
                    .await?;
                info!("Service '{}' deactivated", service.resource().display_name());
                Ok(String::new())
            }
        }
    }

    async fn create_service(&self, scope: &ServiceScope, args: &CreateArgs) -> CommandResult<Service> {
        let stack = self.scope_stack(scope).await?;
        if stack.service(&Filter::by_name(&args.name)).await?.is_some() {
            return Err(CommandError::AlreadyExists(args.name.clone()));
        }

        let launch = launch_config(Some(&args.image), &args.launch);
        let options = WaitOptions::timeout(args.timeout).with_rollback(args.rollback_on_timeout);
        let service = self
            .lifecycle
            .create_service(&stack, &create_params(&args.name, &launch), options)
            .await?;
        info!(
            "Service {}/{} created successfully",
            stack.resource().display_name(),
            service.resource().display_name()
        );
        Ok(service)
    }

    async fn upgrade_service(&self, scope: &ServiceScope, args: &UpgradeArgs) -> CommandResult<()> {
        let name = require(&scope.name, "name")?;

        let Some(service) = self.scope_service(scope).await? else {
            if !args.create {
                return Err(CommandError::NotFound {
                    kind: "Service",
                    name: name.to_string(),
                });
            }
            info!("Service '{}' does not exist, creating it", name);
            let image = require(&args.image, "image")?;
            let create = CreateArgs {
                name: name.to_string(),
                image: image.to_string(),
                timeout: args.timeout,
                rollback_on_timeout: args.rollback_on_timeout,
                launch: args.launch.clone(),
            };
            self.create_service(scope, &create).await?;
            return Ok(());
        };

        if let (Some(image), false) = (&args.image, args.no_prefetch) {
            let target = PrefetchTarget {
                endpoint: self.connection.endpoint(),
                project: scope.project.clone().unwrap_or_default(),
                access_key: self.connection.access_key.clone(),
                secret_key: self.connection.secret_key.clone(),
                image: image.clone(),
            };
            if !ImagePrefetch::new(&args.prefetch_command).pull(&target).await {
                warn!("Proceeding with upgrade without a prefetched image");
            }
        }

        let strategy = InServiceStrategy {
            batch_size: args.batch_size,
            interval_millis: args.interval_millis,
            start_first: args.start_first,
            launch_config: launch_config(args.image.as_deref(), &args.launch).to_value(),
        };
        let options = WaitOptions::timeout(args.timeout).with_rollback(args.rollback_on_timeout);
        self.lifecycle
            .upgrade(service.resource(), strategy, options)
            .await?;
        info!("Service '{}' upgraded successfully", name);
        Ok(())
    }

    // ---- loadbalancer ------------------------------------------------------

    async fn require_load_balancer(&self, scope: &ServiceScope) -> CommandResult<LoadBalancer> {
        let service = self.require_service(scope).await?;
        match service {
            Service::LoadBalancer(lb) => Ok(lb),
            Service::Generic(resource) => Err(CommandError::NotLoadBalancer(
                resource.display_name().to_string(),
            )),
        }
    }

    async fn loadbalancer(&self, args: LoadBalancerArgs) -> CommandResult<String> {
        let scope = args.scope;
        let lb = self.require_load_balancer(&scope).await?;

        match args.action {
            LoadBalancerAction::UpdatePortRule(rule_args) => {
                let project_name = require(&scope.project, "project")?;
                let project = self
                    .find_project(scope.cluster.as_deref(), project_name)
                    .await?;
                let target_stack = self.find_stack(&project, &rule_args.target_stack).await?;
                let target = target_stack
                    .service(&Filter::by_name(&rule_args.service))
                    .await?
                    .ok_or_else(|| CommandError::NotFound {
                        kind: "Service",
                        name: rule_args.service.clone(),
                    })?;

                let rule = port_rule(&rule_args, target.resource());
                self.lifecycle
                    .update_port_rule(&lb, rule, &rule_args.custom, Some(PORT_RULE_TIMEOUT))
                    .await?;
                info!(
                    "Port rule {}{} -> {} applied to '{}'",
                    rule_args.hostname,
                    rule_args.path,
                    rule_args.service,
                    lb.resource().display_name()
                );

                if rule_args.reload {
                    self.lifecycle.restart(lb.resource(), None).await?;
                }
                Ok(String::new())
            }
            LoadBalancerAction::RemovePortRule(rule_args) => {
                let selector = rule_selector(&rule_args);
                self.lifecycle
                    .remove_port_rule(&lb, &selector, Some(PORT_RULE_TIMEOUT))
                    .await?;
                info!(
                    "Port rule {}{} removed from '{}'",
                    selector.hostname,
                    selector.path,
                    lb.resource().display_name()
                );
                Ok(String::new())
            }
        }
    }
}
