use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::client::Credentials;

/// Default config file location: ~/.rancherctl/config
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".rancherctl")
        .join("config")
}

/// Errors that can occur during context operations
#[derive(Error, Debug)]
pub enum ContextError {
    #[error("Context '{0}' not found")]
    ContextNotFound(String),

    #[error("No current context set")]
    NoCurrentContext,

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Failed to write config: {0}")]
    WriteError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Must either provide --{flag} or set {env} environment variable")]
    MissingParameter {
        flag: &'static str,
        env: &'static str,
    },
}

/// Saved connection settings for one Rancher endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Context {
    /// Display name for this context
    pub name: String,
    /// Rancher server URL (e.g., "https://rancher.example.com")
    pub url: String,
    #[serde(rename = "api-version", skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(rename = "access-key", skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,
    #[serde(rename = "secret-key", skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// The complete configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Currently active context name
    #[serde(rename = "current-context")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_context: Option<String>,

    /// Map of context name to context definition
    #[serde(default)]
    pub contexts: BTreeMap<String, Context>,
}

/// Connection parameters as given on the command line (or via env).
#[derive(Debug, Clone, Default)]
pub struct ConnectionArgs {
    pub url: Option<String>,
    pub api_version: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
}

/// Fully resolved connection parameters
#[derive(Clone, PartialEq)]
pub struct Connection {
    pub url: String,
    pub api_version: String,
    pub access_key: String,
    pub secret_key: String,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("url", &self.url)
            .field("api_version", &self.api_version)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

impl Connection {
    /// `<url>/<api_version>`
    pub fn endpoint(&self) -> String {
        format!(
            "{}/{}",
            self.url.trim_end_matches('/'),
            self.api_version.trim_matches('/')
        )
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            access_key: self.access_key.clone(),
            secret_key: self.secret_key.clone(),
        }
    }
}

// ============================================================================
// SBIO: Pure business logic (no I/O)
// ============================================================================

/// Parse config from YAML string
pub fn parse_config(content: &str) -> Result<Config, ContextError> {
    serde_yaml::from_str(content).map_err(|e| ContextError::ParseError(e.to_string()))
}

/// Serialize config to YAML string
pub fn serialize_config(config: &Config) -> Result<String, ContextError> {
    serde_yaml::to_string(config).map_err(|e| ContextError::WriteError(e.to_string()))
}

/// Add or update a context in the config
pub fn add_context(config: &mut Config, context: Context) {
    config.contexts.insert(context.name.clone(), context);
}

/// Remove a context from the config
pub fn remove_context(config: &mut Config, name: &str) -> Option<Context> {
    let removed = config.contexts.remove(name);
    // Clear current context if it was the removed one
    if config.current_context.as_deref() == Some(name) {
        config.current_context = None;
    }
    removed
}

/// Set the current context
pub fn set_current_context(config: &mut Config, name: &str) -> Result<(), ContextError> {
    if !config.contexts.contains_key(name) {
        return Err(ContextError::ContextNotFound(name.to_string()));
    }
    config.current_context = Some(name.to_string());
    Ok(())
}

/// Get the current context
pub fn get_current_context(config: &Config) -> Result<&str, ContextError> {
    config
        .current_context
        .as_deref()
        .ok_or(ContextError::NoCurrentContext)
}

/// Get a context by name
pub fn get_context<'a>(config: &'a Config, name: &str) -> Result<&'a Context, ContextError> {
    config
        .contexts
        .get(name)
        .ok_or_else(|| ContextError::ContextNotFound(name.to_string()))
}

/// List all context names, sorted
pub fn list_contexts(config: &Config) -> Vec<&str> {
    config.contexts.keys().map(|s| s.as_str()).collect()
}

/// Resolve connection parameters: explicit args first, then the named (or
/// current) context.
///
/// An explicitly named context must exist. Without one, a config file with no
/// current context simply contributes nothing.
pub fn resolve_connection(
    args: &ConnectionArgs,
    config: &Config,
    context_name: Option<&str>,
) -> Result<Connection, ContextError> {
    let context = match context_name {
        Some(name) => Some(get_context(config, name)?),
        None => config
            .current_context
            .as_deref()
            .and_then(|name| config.contexts.get(name)),
    };

    let from_context = |pick: fn(&Context) -> Option<String>| context.and_then(pick);

    let url = args
        .url
        .clone()
        .or_else(|| from_context(|c| Some(c.url.clone()).filter(|u| !u.is_empty())))
        .ok_or(ContextError::MissingParameter {
            flag: "url",
            env: "RANCHER_URL",
        })?;
    let api_version = args
        .api_version
        .clone()
        .or_else(|| from_context(|c| c.api_version.clone()))
        .ok_or(ContextError::MissingParameter {
            flag: "api-version",
            env: "RANCHER_API_VERSION",
        })?;
    let access_key = args
        .access_key
        .clone()
        .or_else(|| from_context(|c| c.access_key.clone()))
        .ok_or(ContextError::MissingParameter {
            flag: "access-key",
            env: "RANCHER_ACCESS_KEY",
        })?;
    let secret_key = args
        .secret_key
        .clone()
        .or_else(|| from_context(|c| c.secret_key.clone()))
        .ok_or(ContextError::MissingParameter {
            flag: "secret-key",
            env: "RANCHER_SECRET_KEY",
        })?;

    Ok(Connection {
        url,
        api_version,
        access_key,
        secret_key,
    })
}

// ============================================================================
// I/O boundary functions
// ============================================================================

/// Load config from a specific path; a missing file is an empty config
pub fn load_config_from(path: &Path) -> Result<Config, ContextError> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Save config to a specific path
pub fn save_config_to(config: &Config, path: &Path) -> Result<(), ContextError> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serialize_config(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

impl Context {
    /// Create a new context
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = Some(version.into());
        self
    }

    /// Add an access/secret key pair
    pub fn with_keys(mut self, access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        self.access_key = Some(access_key.into());
        self.secret_key = Some(secret_key.into());
        self
    }

    /// Add a description
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }
}
