//! Proxy server configuration.
//!
//! Loads configuration from a TOML file with support for environment variable
//! expansion in string values. Variables use `$VAR` or `${VAR}` syntax.
//!
//! # Example Configuration
//!
//! ```toml
//! host = "0.0.0.0"
//! port = 4020
//! max_retries = 2
//! wallet_url = "https://wallet.example/account"
//!
//! [services]
//! signer = "https://signer.example/sign"
//! funding = "https://onramp.example/links"
//! proof = "https://notary.example/v1/"
//! analytics = "https://collector.example/events"
//! timeout_secs = 30
//!
//! [api_keys."$ALICE_API_KEY"]
//! user_id = "alice"
//! wallet_address = "0xa11ce"
//!
//! [targets.weather]
//! url = "https://weather.example/mcp"
//! hooks = ["analytics", "payment", "proof"]
//!
//! [targets.weather.proof]
//! enabled = true
//! exclude_domains = ["internal.example"]
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG` - Path to configuration file (default: `config.toml`)
//! - `HOST` - Override server bind address
//! - `PORT` - Override server port
//! - Secrets referenced by `$VAR` in the config file

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use mcpay::hooks::ProofConfig;
use serde::{Deserialize, Serialize};
use url::Url;

/// Errors raised while loading or validating the configuration.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Path of the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for [`ProxyConfig`].
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// A target lists a hook whose collaborator service is not configured.
    #[error("target `{target}` uses the {hook} hook but `services.{service}` is not set")]
    MissingService {
        /// Target id.
        target: String,
        /// The hook that needs the service.
        hook: HookKind,
        /// Name of the missing `services` entry.
        service: &'static str,
    },

    /// A target lists the same hook twice.
    #[error("target `{target}` lists the {hook} hook more than once")]
    DuplicateHook {
        /// Target id.
        target: String,
        /// The repeated hook.
        hook: HookKind,
    },

    /// A collaborator client could not be constructed.
    #[error("invalid {service} service: {source}")]
    Service {
        /// Name of the `services` entry.
        service: &'static str,
        /// Underlying client error.
        #[source]
        source: mcpay_http::ClientError,
    },
}

/// Top-level proxy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Server bind address (default: `0.0.0.0`).
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Server port (default: `4020`).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Retries allowed per call after the first dispatch (default: `2`).
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Wallet-management page shown to payers short of funds.
    #[serde(default)]
    pub wallet_url: Option<String>,

    /// Collaborator service endpoints.
    #[serde(default)]
    pub services: ServicesConfig,

    /// API key to identity table.
    #[serde(default)]
    pub api_keys: HashMap<String, ApiKeyConfig>,

    /// Proxied MCP servers keyed by target id (the `{target}` path segment).
    #[serde(default)]
    pub targets: HashMap<String, TargetConfig>,
}

/// Endpoints of the services the hooks call out to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    /// Payment signing endpoint.
    #[serde(default)]
    pub signer: Option<Url>,
    /// Funding-link endpoint.
    #[serde(default)]
    pub funding: Option<Url>,
    /// Base URL of the web-proof service.
    #[serde(default)]
    pub proof: Option<Url>,
    /// Analytics collector endpoint.
    #[serde(default)]
    pub analytics: Option<Url>,
    /// Timeout for every outbound HTTP request, in seconds (default: `30`).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            signer: None,
            funding: None,
            proof: None,
            analytics: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ServicesConfig {
    /// Returns the outbound request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Identity an API key authenticates as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeyConfig {
    /// Stable user id.
    pub user_id: String,
    /// The user's managed wallet, if known.
    #[serde(default)]
    pub wallet_address: Option<String>,
}

/// A hook that can be placed in a target's pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HookKind {
    /// Analytics recording.
    Analytics,
    /// x402 payment handling.
    Payment,
    /// Web-proof generation.
    Proof,
}

impl std::fmt::Display for HookKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Analytics => "analytics",
            Self::Payment => "payment",
            Self::Proof => "proof",
        })
    }
}

/// One proxied MCP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Upstream MCP endpoint.
    pub url: Url,

    /// Hooks in pipeline order (default: analytics, payment, proof).
    #[serde(default = "default_hooks")]
    pub hooks: Vec<HookKind>,

    /// Web-proof settings.
    #[serde(default)]
    pub proof: ProofSection,
}

/// The `[targets.<id>.proof]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofSection {
    /// Whether paid calls to this target are proven.
    #[serde(default)]
    pub enabled: bool,
    /// Only these domains get proofs; empty means all.
    #[serde(default)]
    pub include_domains: Vec<String>,
    /// These domains never get proofs.
    #[serde(default)]
    pub exclude_domains: Vec<String>,
    /// Attempts before falling back (default: `3`).
    #[serde(default = "default_proof_attempts")]
    pub max_attempts: u32,
    /// Per-attempt budget in seconds (default: `20`).
    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,
    /// Delay before the second attempt in milliseconds (default: `500`).
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Largest request body sent for proving (default: 16 KiB).
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,
}

impl Default for ProofSection {
    fn default() -> Self {
        Self {
            enabled: false,
            include_domains: Vec::new(),
            exclude_domains: Vec::new(),
            max_attempts: default_proof_attempts(),
            attempt_timeout_secs: default_attempt_timeout_secs(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_payload_bytes: default_max_payload_bytes(),
        }
    }
}

impl ProofSection {
    /// Converts the section into the hook's settings.
    pub fn to_proof_config(&self) -> ProofConfig {
        ProofConfig::default()
            .with_include_domains(self.include_domains.iter().cloned())
            .with_exclude_domains(self.exclude_domains.iter().cloned())
            .with_max_attempts(self.max_attempts)
            .with_attempt_timeout(Duration::from_secs(self.attempt_timeout_secs))
            .with_initial_backoff(Duration::from_millis(self.initial_backoff_ms))
            .with_max_payload_bytes(self.max_payload_bytes)
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(std::net::Ipv4Addr::new(0, 0, 0, 0))
}

const fn default_port() -> u16 {
    4020
}

const fn default_max_retries() -> usize {
    mcpay::pipeline::DEFAULT_MAX_RETRIES
}

const fn default_timeout_secs() -> u64 {
    30
}

fn default_hooks() -> Vec<HookKind> {
    vec![HookKind::Analytics, HookKind::Payment, HookKind::Proof]
}

const fn default_proof_attempts() -> u32 {
    3
}

const fn default_attempt_timeout_secs() -> u64 {
    20
}

const fn default_initial_backoff_ms() -> u64 {
    500
}

const fn default_max_payload_bytes() -> usize {
    16 * 1024
}

impl ProxyConfig {
    /// Loads configuration from a file path.
    ///
    /// A missing file yields the defaults. All `$VAR` / `${VAR}` references
    /// are expanded from the process environment, then `HOST` and `PORT`
    /// env vars override the file values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, parsed, or
    /// validated.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = if path.exists() {
            std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_owned(),
                source,
            })?
        } else {
            String::new()
        };

        let mut config = Self::from_toml(&content, |name| std::env::var(name).ok())?;

        if let Ok(host) = std::env::var("HOST") {
            if let Ok(addr) = host.parse() {
                config.host = addr;
            }
        }
        if let Ok(port) = std::env::var("PORT") {
            if let Ok(p) = port.parse() {
                config.port = p;
            }
        }

        Ok(config)
    }

    /// Parses and validates TOML, resolving variables through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the TOML is invalid or a target's hooks
    /// reference unconfigured services.
    pub fn from_toml<F>(content: &str, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let expanded = expand_vars(content, lookup);
        let config: Self = toml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every hook a target lists can be built.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingService`] or
    /// [`ConfigError::DuplicateHook`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (id, target) in &self.targets {
            for (i, hook) in target.hooks.iter().enumerate() {
                if target.hooks[..i].contains(hook) {
                    return Err(ConfigError::DuplicateHook {
                        target: id.clone(),
                        hook: *hook,
                    });
                }
                let (service, present) = match hook {
                    HookKind::Analytics => ("analytics", self.services.analytics.is_some()),
                    HookKind::Payment => ("signer", self.services.signer.is_some()),
                    HookKind::Proof => ("proof", self.services.proof.is_some()),
                };
                if !present {
                    return Err(ConfigError::MissingService {
                        target: id.clone(),
                        hook: *hook,
                        service,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Expands `$VAR` and `${VAR}` patterns using `lookup`.
///
/// Unresolved variables are left as-is.
fn expand_vars<F>(input: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' {
            result.push(ch);
            continue;
        }

        let braced = chars.peek() == Some(&'{');
        if braced {
            chars.next();
        }

        let mut var_name = String::new();
        while let Some(&c) = chars.peek() {
            if braced {
                if c == '}' {
                    chars.next();
                    break;
                }
            } else if !c.is_ascii_alphanumeric() && c != '_' {
                break;
            }
            var_name.push(c);
            chars.next();
        }

        match (var_name.is_empty(), lookup(&var_name)) {
            (false, Some(val)) => result.push_str(&val),
            _ => {
                result.push('$');
                if braced {
                    result.push('{');
                }
                result.push_str(&var_name);
                if braced && !var_name.is_empty() {
                    result.push('}');
                }
            }
        }
    }

    result
}
