//! Daemon configuration.
//!
//! The pipeline options (see [`rebate::config`]) plus the server bind address,
//! the owner key and the refund switch, read from the same TOML file.
//!
//! # Example Configuration
//!
//! ```toml
//! host = "0.0.0.0"
//! port = 4022
//! owner_private_key = "$OWNER_PRIVATE_KEY"
//! refund_on_deposit = true
//!
//! chain_id = 5115
//! rpc_url = "$CHAIN_RPC_URL"
//! bundler_url = "$BUNDLER_URL"
//! token_address = "$TOKEN_ADDRESS"
//! ```
//!
//! # Environment Variables
//!
//! - `HOST` - Override server bind address
//! - `PORT` - Override server port
//! - `OWNER_PRIVATE_KEY` - Smart account owner key (required)
//! - `REFUND_ON_DEPOSIT` - Refund every deposit to its sender (default: `true`)
//! - all pipeline variables

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

use alloy_signer_local::PrivateKeySigner;
use rebate::config::{PipelineConfig, read_optional, resolved};
use rebate::error::ConfigError;
use serde::Deserialize;

/// Top-level daemon configuration.
#[derive(Clone, Deserialize)]
pub struct DaemonConfig {
    /// Server bind address (default: `0.0.0.0`).
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Server port (default: `4022`).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Hex private key of the smart account owner.
    #[serde(default)]
    pub owner_private_key: Option<String>,

    /// Whether every deposit is refunded to its sender (default: `true`).
    #[serde(default = "default_refund_on_deposit")]
    pub refund_on_deposit: bool,

    /// Chain, bundler and token options.
    #[serde(flatten)]
    pub pipeline: PipelineConfig,
}

const fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

const fn default_port() -> u16 {
    4022
}

const fn default_refund_on_deposit() -> bool {
    true
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            owner_private_key: None,
            refund_on_deposit: default_refund_on_deposit(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl fmt::Debug for DaemonConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DaemonConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field(
                "owner_private_key",
                &self.owner_private_key.as_ref().map(|_| "<redacted>"),
            )
            .field("refund_on_deposit", &self.refund_on_deposit)
            .field("pipeline", &self.pipeline)
            .finish()
    }
}

impl DaemonConfig {
    /// Loads configuration from the path given by the `CONFIG` environment
    /// variable, falling back to `rebate.toml`, and applies environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or an override
    /// cannot be parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("CONFIG").unwrap_or_else(|_| "rebate.toml".to_owned());
        Self::load_from(&path, |name| std::env::var(name).ok())
    }

    /// Loads configuration from a specific file path, resolving variables and
    /// overrides through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or an override
    /// cannot be parsed.
    pub fn load_from<F>(path: &str, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let content = read_optional(path)?;
        let expanded = rebate::config::expand_env_vars(&content, &lookup);
        let mut config: Self = toml::from_str(&expanded)?;
        config.apply_env_overrides(&lookup)?;
        Ok(config)
    }

    /// Applies `HOST`, `PORT`, `OWNER_PRIVATE_KEY`, `REFUND_ON_DEPOSIT` and
    /// the pipeline overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a value cannot be parsed.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HOST") {
            self.host = host
                .trim()
                .parse()
                .map_err(|e| ConfigError::invalid("HOST", e))?;
        }
        if let Some(port) = lookup("PORT") {
            self.port = port
                .trim()
                .parse()
                .map_err(|e| ConfigError::invalid("PORT", e))?;
        }
        if let Some(key) = lookup("OWNER_PRIVATE_KEY") {
            self.owner_private_key = Some(key);
        }
        if let Some(flag) = lookup("REFUND_ON_DEPOSIT") {
            self.refund_on_deposit = parse_flag(&flag)
                .ok_or_else(|| ConfigError::invalid("REFUND_ON_DEPOSIT", "expected true or false"))?;
        }
        self.pipeline.apply_env_overrides(&lookup)
    }

    /// Checks the pipeline options and the owner key.
    ///
    /// The token address and polling interval are required only when
    /// deposits are refunded.
    ///
    /// # Errors
    ///
    /// Returns the first missing or malformed option.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.refund_on_deposit {
            self.pipeline.validate()?;
        } else {
            self.pipeline.validate_endpoints()?;
            self.pipeline.token_address_opt()?;
        }
        self.owner_signer().map(|_| ())
    }

    /// Parses the owner key.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] if no key is set and
    /// [`ConfigError::Invalid`] if it is not a valid secp256k1 key.
    pub fn owner_signer(&self) -> Result<PrivateKeySigner, ConfigError> {
        let raw = resolved(self.owner_private_key.as_deref()).ok_or(ConfigError::Missing {
            option: "OWNER_PRIVATE_KEY",
        })?;
        raw.parse()
            .map_err(|_| ConfigError::invalid("OWNER_PRIVATE_KEY", "not a valid private key"))
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
