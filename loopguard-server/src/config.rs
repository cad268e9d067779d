//! Server configuration and CLI argument parsing
//!
//! Settings come from command-line arguments and environment variables with
//! the `LOOPGUARD_` prefix. Policies are read from an optional policy file
//! (TOML, YAML or JSON, chosen by extension); without one the server runs a
//! single policy named `default` built from `--limit` and `--window-secs`.
//!
//! # Configuration Priority
//!
//! 1. CLI arguments (highest priority)
//! 2. Environment variables
//! 3. Default values (lowest priority)
//!
//! # Policy file
//!
//! ```toml
//! [[policies]]
//! name = "login"
//! limit = 5
//! window_secs = 60
//!
//! [[policies]]
//! name = "api"
//! limit = 1000
//! window_secs = 3600
//! identity_header = "x-api-key"
//! status_code = 503
//! message = "Slow down"
//! ```

use anyhow::{Context, Result, anyhow, bail};
use axum::http::StatusCode;
use clap::Parser;
use loopguard::{Options, Quota, identify_by_header};
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;

/// Name of the policy built when no policy file is given
pub const DEFAULT_POLICY_NAME: &str = "default";

/// Main configuration structure for the server
#[derive(Debug, Clone)]
pub struct Config {
    pub http: HttpConfig,
    pub store: StoreConfig,
    pub policies: Vec<PolicyConfig>,
    /// Logging level (error, warn, info, debug, trace)
    pub log_level: String,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Host address to bind to (e.g., "0.0.0.0")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

/// Counter store configuration shared by all policies
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Initial capacity of the store
    pub capacity: usize,
    /// Lifetime of entries written without an explicit TTL (seconds)
    pub default_ttl: u64,
    /// Minimum time between sweeps of expired entries (seconds)
    pub cleanup_interval: u64,
}

/// One throttling policy as written in the policy file
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PolicyConfig {
    /// Route name, served under `/check/<name>`
    pub name: String,
    pub limit: u64,
    pub window_secs: u64,
    pub status_code: Option<u16>,
    pub message: Option<String>,
    /// Counter key prefix; defaults to the policy name so that policies only
    /// share counters when they are given the same prefix
    pub key_prefix: Option<String>,
    #[serde(default)]
    pub disabled: bool,
    /// Identify callers by this header instead of their IP address
    pub identity_header: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PolicyFile {
    #[serde(default)]
    policies: Vec<PolicyConfig>,
}

/// Command-line arguments for the server
///
/// All arguments can also be set via environment variables with the
/// LOOPGUARD_ prefix. CLI arguments take precedence over environment variables.
#[derive(Parser, Debug)]
#[command(
    name = "loopguard",
    about = "Request admission control server",
    long_about = "A request admission control server enforcing fixed-window quotas per caller.\n\nEnvironment variables with LOOPGUARD_ prefix are supported. CLI arguments take precedence over environment variables."
)]
pub struct Args {
    #[arg(
        long,
        value_name = "HOST",
        help = "HTTP host",
        default_value = "127.0.0.1",
        env = "LOOPGUARD_HOST"
    )]
    pub host: String,
    #[arg(
        long,
        value_name = "PORT",
        help = "HTTP port",
        default_value_t = 8080,
        env = "LOOPGUARD_PORT"
    )]
    pub port: u16,

    // Policies
    #[arg(
        long,
        value_name = "FILE",
        help = "Policy file (toml, yaml or json)",
        env = "LOOPGUARD_POLICIES"
    )]
    pub policies: Option<String>,
    #[arg(
        long,
        value_name = "N",
        help = "Requests per window for the default policy",
        default_value_t = 100,
        env = "LOOPGUARD_LIMIT"
    )]
    pub limit: u64,
    #[arg(
        long,
        value_name = "SECS",
        help = "Window length of the default policy (seconds)",
        default_value_t = 60,
        env = "LOOPGUARD_WINDOW_SECS"
    )]
    pub window_secs: u64,
    #[arg(
        long,
        value_name = "HEADER",
        help = "Identify callers of the default policy by this header",
        env = "LOOPGUARD_IDENTITY_HEADER"
    )]
    pub identity_header: Option<String>,

    // Store Configuration
    #[arg(
        long,
        value_name = "SIZE",
        help = "Initial store capacity",
        default_value_t = 100_000,
        env = "LOOPGUARD_STORE_CAPACITY"
    )]
    pub store_capacity: usize,
    #[arg(
        long,
        value_name = "SECS",
        help = "Default entry lifetime (seconds)",
        default_value_t = 86_400,
        env = "LOOPGUARD_STORE_DEFAULT_TTL"
    )]
    pub store_default_ttl: u64,
    #[arg(
        long,
        value_name = "SECS",
        help = "Interval between sweeps of expired entries (seconds)",
        default_value_t = 432_000,
        env = "LOOPGUARD_STORE_CLEANUP_INTERVAL"
    )]
    pub store_cleanup_interval: u64,

    // General options
    #[arg(
        long,
        value_name = "LEVEL",
        help = "Log level: error, warn, info, debug, trace",
        default_value = "info",
        env = "LOOPGUARD_LOG_LEVEL"
    )]
    pub log_level: String,

    // Utility options
    #[arg(
        long,
        help = "List all environment variables and exit",
        action = clap::ArgAction::SetTrue
    )]
    pub list_env_vars: bool,
}

impl Config {
    /// Build configuration from environment variables and CLI arguments
    ///
    /// # Errors
    ///
    /// Returns an error if the policy file cannot be read or any setting is
    /// invalid.
    pub fn from_env_and_args() -> Result<Self> {
        let args = Args::parse();

        if args.list_env_vars {
            Self::print_env_vars();
            std::process::exit(0);
        }

        Self::from_args(args)
    }

    /// Build and validate configuration from already parsed arguments
    pub fn from_args(args: Args) -> Result<Self> {
        let policies = match &args.policies {
            Some(path) => load_policy_file(path)?,
            None => vec![PolicyConfig {
                name: DEFAULT_POLICY_NAME.to_string(),
                limit: args.limit,
                window_secs: args.window_secs,
                status_code: None,
                message: None,
                key_prefix: None,
                disabled: false,
                identity_header: args.identity_header,
            }],
        };

        let config = Config {
            http: HttpConfig {
                host: args.host,
                port: args.port,
            },
            store: StoreConfig {
                capacity: args.store_capacity,
                default_ttl: args.store_default_ttl,
                cleanup_interval: args.store_cleanup_interval,
            },
            policies,
            log_level: args.log_level,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.policies.is_empty() {
            bail!("At least one policy must be configured");
        }

        let mut seen = HashSet::new();
        for policy in &self.policies {
            policy.validate()?;
            if !seen.insert(policy.name.as_str()) {
                bail!("Duplicate policy name: {}", policy.name);
            }
        }

        if self.store.default_ttl == 0 {
            bail!("Store default TTL must be greater than zero");
        }
        if self.store.cleanup_interval == 0 {
            bail!("Store cleanup interval must be greater than zero");
        }

        Ok(())
    }

    /// Print all available environment variables and their descriptions
    fn print_env_vars() {
        println!("loopguard Environment Variables");
        println!("===============================");
        println!();
        println!("All environment variables use the LOOPGUARD_ prefix.");
        println!("CLI arguments take precedence over environment variables.");
        println!();

        println!("HTTP Configuration:");
        println!("  LOOPGUARD_HOST=<host>                    HTTP host [default: 127.0.0.1]");
        println!("  LOOPGUARD_PORT=<port>                    HTTP port [default: 8080]");
        println!();

        println!("Policy Configuration:");
        println!("  LOOPGUARD_POLICIES=<file>                Policy file (toml, yaml or json)");
        println!(
            "  LOOPGUARD_LIMIT=<n>                      Default policy requests per window [default: 100]"
        );
        println!(
            "  LOOPGUARD_WINDOW_SECS=<secs>             Default policy window length [default: 60]"
        );
        println!(
            "  LOOPGUARD_IDENTITY_HEADER=<header>       Default policy identity header [default: client IP]"
        );
        println!();

        println!("Store Configuration:");
        println!(
            "  LOOPGUARD_STORE_CAPACITY=<size>          Initial store capacity [default: 100000]"
        );
        println!(
            "  LOOPGUARD_STORE_DEFAULT_TTL=<secs>       Default entry lifetime [default: 86400]"
        );
        println!(
            "  LOOPGUARD_STORE_CLEANUP_INTERVAL=<secs>  Sweep interval [default: 432000]"
        );
        println!();

        println!("General Configuration:");
        println!(
            "  LOOPGUARD_LOG_LEVEL=<level>              Log level: error, warn, info, debug, trace [default: info]"
        );
        println!();

        println!("Examples:");
        println!("  # 5 requests per minute for every caller");
        println!("  export LOOPGUARD_LIMIT=5");
        println!("  export LOOPGUARD_WINDOW_SECS=60");
        println!();
        println!("  # Run server (CLI args override env vars)");
        println!("  loopguard --port 9090 --policies policies.toml");
    }
}

impl PolicyConfig {
    fn validate(&self) -> Result<()> {
        if self.name.is_empty()
            || !self
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            bail!(
                "Invalid policy name {:?}: use letters, digits, '-' and '_'",
                self.name
            );
        }
        self.quota()?;
        self.status()?;
        if let Some(header) = &self.identity_header {
            axum::http::HeaderName::try_from(header.as_str())
                .with_context(|| format!("Policy {}: invalid identity header", self.name))?;
        }
        Ok(())
    }

    pub fn quota(&self) -> Result<Quota> {
        Quota::new(self.limit, Duration::from_secs(self.window_secs))
            .with_context(|| format!("Policy {}", self.name))
    }

    // Denials must read as failures to clients and to the outcome metrics
    fn status(&self) -> Result<Option<StatusCode>> {
        let Some(code) = self.status_code else {
            return Ok(None);
        };
        let status = StatusCode::from_u16(code)
            .map_err(|_| anyhow!("Policy {}: invalid status code {code}", self.name))?;
        if !status.is_client_error() && !status.is_server_error() {
            bail!(
                "Policy {}: denial status {code} must be a 4xx or 5xx code",
                self.name
            );
        }
        Ok(Some(status))
    }

    /// Library options for this policy; the store is supplied by the caller
    pub fn options(&self) -> Result<Options> {
        let mut options = Options::new().disabled(self.disabled);
        if let Some(status) = self.status()? {
            options = options.status_code(status);
        }
        if let Some(message) = &self.message {
            options = options.message(message.clone());
        }
        let prefix = self.key_prefix.as_ref().unwrap_or(&self.name);
        options = options.key_prefix(prefix.clone());
        if let Some(header) = &self.identity_header {
            options = options.identify_with(identify_by_header(header.clone()));
        }
        Ok(options)
    }
}

fn load_policy_file(path: &str) -> Result<Vec<PolicyConfig>> {
    let file: PolicyFile = ::config::Config::builder()
        .add_source(::config::File::with_name(path))
        .build()
        .with_context(|| format!("Failed to read policy file {path}"))?
        .try_deserialize()
        .with_context(|| format!("Failed to parse policy file {path}"))?;

    tracing::debug!(path, count = file.policies.len(), "Loaded policy file");
    Ok(file.policies)
}
