//! Gateway configuration
//!
//! Built once at startup and shared read-only with every request. Sources are
//! layered, later ones winning:
//!
//! 1. built-in defaults
//! 2. a TOML file (`--config`, `RHYTHM_GATEWAY_CONFIG_PATH`, or
//!    `rhythm-gateway.toml` in the working directory when present)
//! 3. the flat variables used by earlier gateway deployments
//!    (`SERVER_PORT`, `TEMPORAL_TOKEN`, ...)
//! 4. `RHYTHM_GATEWAY__SECTION__KEY` environment variables
//! 5. explicit overrides from the command line

use anyhow::{bail, Context, Result};
use axum::http::HeaderName;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "RHYTHM_GATEWAY_CONFIG_PATH";

/// Prefix for structured environment overrides
pub const ENV_PREFIX: &str = "RHYTHM_GATEWAY";

const DEFAULT_CONFIG_FILE: &str = "rhythm-gateway";

const POSTGRES_SCHEMES: &[&str] = &["postgres://", "postgresql://"];

/// Flat variables from earlier deployments and the keys they set.
///
/// `TEMPORAL_ADDRESS` is not carried over since the engine is reached
/// through a Postgres URL rather than a `host:port` address.
const LEGACY_VARS: &[(&str, &str)] = &[
    ("SERVER_PORT", "server.port"),
    ("TEMPORAL_TOKEN", "auth.token"),
    ("TEMPORAL_HEADER_TOKEN", "auth.header"),
    ("TEMPORAL_NAMESPACE", "engine.namespace"),
    ("TASK_QUEUE", "workflow.task_queue"),
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub workflow: WorkflowConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Shared-secret check applied to every workflow request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Header expected to carry the token
    #[serde(default = "default_auth_header")]
    pub header: String,

    /// Expected token value, must be non-empty
    #[serde(default)]
    pub token: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            header: default_auth_header(),
            token: String::new(),
        }
    }
}

/// Connection settings for the Postgres-backed engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Postgres connection URL
    #[serde(default)]
    pub url: String,

    /// Schema holding the engine tables
    #[serde(default = "default_namespace")]
    pub namespace: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,

    /// How often a waiting request re-reads its execution
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            namespace: default_namespace(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            acquire_timeout_secs: default_acquire_timeout(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

/// Per-request workflow defaults and the headers that override them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default = "default_task_queue")]
    pub task_queue: String,

    #[serde(default = "default_task_queue_header")]
    pub task_queue_header: String,

    #[serde(default = "default_execution_timeout_header")]
    pub execution_timeout_header: String,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            task_queue: default_task_queue(),
            task_queue_header: default_task_queue_header(),
            execution_timeout_header: default_execution_timeout_header(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_auth_header() -> String {
    "Authorization".to_string()
}

fn default_namespace() -> String {
    "public".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_acquire_timeout() -> u64 {
    5
}

fn default_poll_interval() -> u64 {
    100
}

fn default_task_queue() -> String {
    "default".to_string()
}

fn default_task_queue_header() -> String {
    "Temporal-Task-Queue".to_string()
}

fn default_execution_timeout_header() -> String {
    "Temporal-Workflow-Execution-Timeout".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check invariants that deserialization alone cannot express.
    ///
    /// The engine URL is only required when `require_engine` is set, so that
    /// offline commands can run without a database.
    pub fn validate(&self, require_engine: bool) -> Result<()> {
        if self.auth.token.is_empty() {
            bail!("auth.token must be set (RHYTHM_GATEWAY__AUTH__TOKEN or TEMPORAL_TOKEN)");
        }
        if self.server.port == 0 {
            bail!("server.port must be non-zero");
        }
        if self.workflow.task_queue.is_empty() {
            bail!("workflow.task_queue must not be empty");
        }
        for (key, value) in [
            ("auth.header", &self.auth.header),
            ("workflow.task_queue_header", &self.workflow.task_queue_header),
            (
                "workflow.execution_timeout_header",
                &self.workflow.execution_timeout_header,
            ),
        ] {
            HeaderName::from_bytes(value.as_bytes())
                .with_context(|| format!("{} is not a valid header name: {:?}", key, value))?;
        }
        if self.engine.poll_interval_ms == 0 {
            bail!("engine.poll_interval_ms must be non-zero");
        }
        if self.engine.min_connections > self.engine.max_connections {
            bail!("engine.min_connections cannot exceed engine.max_connections");
        }
        if require_engine && self.engine.url.is_empty() {
            bail!("engine.url must be set (RHYTHM_GATEWAY__ENGINE__URL or --database-url)");
        }
        if !self.engine.url.is_empty()
            && !POSTGRES_SCHEMES
                .iter()
                .any(|scheme| self.engine.url.starts_with(scheme))
        {
            bail!(
                "engine.url must be a postgres:// URL; a host:port value such as \
                 TEMPORAL_ADDRESS is no longer accepted"
            );
        }
        Ok(())
    }

    /// Copy with secrets masked, for display
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.auth.token.is_empty() {
            copy.auth.token = "********".to_string();
        }
        if let Some(at) = copy.engine.url.rfind('@') {
            if let Some(scheme_end) = copy.engine.url.find("://") {
                let credentials = &copy.engine.url[scheme_end + 3..at];
                if let Some(colon) = credentials.find(':') {
                    let user = &credentials[..colon];
                    copy.engine.url = format!(
                        "{}{}:********{}",
                        &copy.engine.url[..scheme_end + 3],
                        user,
                        &copy.engine.url[at..]
                    );
                }
            }
        }
        copy
    }

    /// `host:port` the server binds to
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// Builder that assembles configuration from files, environment and overrides
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config_path: Option<PathBuf>,
    database_url: Option<String>,
    port: Option<u16>,
    require_engine: bool,
    skip_environment: bool,
}

impl ConfigBuilder {
    /// Config file path (overrides default search)
    pub fn config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    /// Engine database URL (overrides file and environment)
    pub fn database_url(mut self, url: Option<String>) -> Self {
        self.database_url = url;
        self
    }

    /// Listen port (overrides file and environment)
    pub fn port(mut self, port: Option<u16>) -> Self {
        self.port = port;
        self
    }

    /// Fail validation when no engine URL is configured
    pub fn require_engine(mut self, required: bool) -> Self {
        self.require_engine = required;
        self
    }

    /// Ignore environment variables, reading only defaults, file and overrides
    pub fn skip_environment(mut self, skip: bool) -> Self {
        self.skip_environment = skip;
        self
    }

    pub fn build(self) -> Result<Config> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Config::default())?);

        let path = self.config_path.or_else(|| {
            if self.skip_environment {
                None
            } else {
                env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from)
            }
        });
        builder = match path {
            Some(path) => builder.add_source(config::File::from(path).required(true)),
            None => builder.add_source(config::File::with_name(DEFAULT_CONFIG_FILE).required(false)),
        };

        if !self.skip_environment {
            builder = builder.add_source(LegacyEnvironment).add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            );
        }

        if let Some(url) = self.database_url {
            builder = builder.set_override("engine.url", url)?;
        }
        if let Some(port) = self.port {
            builder = builder.set_override("server.port", i64::from(port))?;
        }

        let config: Config = builder
            .build()
            .context("Failed to load configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;

        config.validate(self.require_engine)?;
        Ok(config)
    }
}

/// Source reading the flat variables of earlier gateway deployments
#[derive(Debug, Clone)]
struct LegacyEnvironment;

impl config::Source for LegacyEnvironment {
    fn clone_into_box(&self) -> Box<dyn config::Source + Send + Sync> {
        Box::new(self.clone())
    }

    fn collect(&self) -> Result<config::Map<String, config::Value>, config::ConfigError> {
        let origin = "legacy environment".to_string();
        let mut map = config::Map::new();
        for (var, key) in LEGACY_VARS {
            if let Ok(value) = env::var(var) {
                if !value.is_empty() {
                    map.insert(
                        key.to_string(),
                        config::Value::new(Some(&origin), config::ValueKind::String(value)),
                    );
                }
            }
        }
        Ok(map)
    }
}
