//! Pipeline configuration.
//!
//! Loads configuration from an optional TOML file with support for
//! environment variable expansion in string values (`$VAR` or `${VAR}`),
//! then applies environment overrides. The result is validated once at
//! startup and passed explicitly to every constructor.
//!
//! # Example Configuration
//!
//! ```toml
//! chain_id = 5115
//! rpc_url = "$CITREA_RPC"
//! bundler_url = "https://api.pimlico.io/v2/5115/rpc?apikey=${PIMLICO_KEY}"
//! token_address = "0x36c16eaC6B0Ba6c50f494914ff015fCa95B7835F"
//! entry_point_version = "V07"
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG` - Path to configuration file (default: `rebate.toml`, optional)
//! - `CHAIN_RPC_URL` - Chain JSON-RPC endpoint (required)
//! - `BUNDLER_URL` - Bundler/paymaster endpoint (required)
//! - `TOKEN_ADDRESS` - Stablecoin contract (required for deposits and refunds)
//! - `ENTRYPOINT_VERSION` - `V06` or `V07` (default: `V07`)
//! - `CHAIN_ID` - EIP-155 chain id (default: `5115`)
//! - `POLL_INTERVAL_SECS` - Deposit polling interval (default: `5`)
//! - `RECEIPT_TIMEOUT_SECS` - Refund timeout, submission included (default: `120`)
//! - `REQUEST_TIMEOUT_SECS` - Per-request bundler timeout (default: `30`)
//! - `FALLBACK_RPC_URLS` - Comma-separated extra chain endpoints
//! - `RPC_RATE_LIMIT` - Requests per second per chain endpoint (default: unlimited)

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::chain::ChainId;
use crate::error::ConfigError;
use crate::networks::CITREA_TESTNET;

/// Entry-point protocol revision used for sponsored operations.
///
/// The revision selects the smart-account implementation and therefore the
/// derived account address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EntryPointVersion {
    /// Entry point v0.6.
    #[serde(rename = "V06", alias = "0.6", alias = "v06")]
    V06,
    /// Entry point v0.7.
    #[default]
    #[serde(rename = "V07", alias = "0.7", alias = "v07")]
    V07,
}

impl EntryPointVersion {
    /// Returns the dotted protocol version (`"0.6"` or `"0.7"`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::V06 => "0.6",
            Self::V07 => "0.7",
        }
    }
}

impl fmt::Display for EntryPointVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryPointVersion {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "V06" | "v06" | "0.6" => Ok(Self::V06),
            "V07" | "v07" | "0.7" => Ok(Self::V07),
            other => Err(ConfigError::invalid(
                "ENTRYPOINT_VERSION",
                format!("`{other}` is not one of V06, V07"),
            )),
        }
    }
}

/// Configuration of the deposit/refund pipeline.
///
/// Endpoint and address fields are kept as raw strings so that a missing
/// value can be told apart from a malformed one; the typed accessors
/// ([`rpc_url`](Self::rpc_url), [`bundler_url`](Self::bundler_url),
/// [`token_address`](Self::token_address)) report which.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// EIP-155 chain id (default: `5115`).
    #[serde(default = "default_chain_id")]
    pub chain_id: ChainId,

    /// Chain JSON-RPC endpoint.
    #[serde(default)]
    pub rpc_url: Option<String>,

    /// Bundler/paymaster JSON-RPC endpoint.
    #[serde(default)]
    pub bundler_url: Option<String>,

    /// Stablecoin contract watched for deposits and used for refunds.
    #[serde(default)]
    pub token_address: Option<String>,

    /// Entry-point revision (default: `V07`).
    #[serde(default)]
    pub entry_point_version: EntryPointVersion,

    /// Deposit polling interval in seconds (default: `5`).
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Refund timeout in seconds, submission included (default: `120`).
    #[serde(default = "default_receipt_timeout_secs")]
    pub receipt_timeout_secs: u64,

    /// Per-request bundler timeout in seconds (default: `30`).
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Extra chain endpoints tried when the primary one fails.
    #[serde(default)]
    pub fallback_rpc_urls: Vec<String>,

    /// Requests per second allowed on each chain endpoint.
    #[serde(default)]
    pub rpc_rate_limit: Option<u32>,
}

const fn default_chain_id() -> ChainId {
    CITREA_TESTNET
}

const fn default_poll_interval_secs() -> u64 {
    5
}

const fn default_receipt_timeout_secs() -> u64 {
    120
}

const fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chain_id: default_chain_id(),
            rpc_url: None,
            bundler_url: None,
            token_address: None,
            entry_point_version: EntryPointVersion::default(),
            poll_interval_secs: default_poll_interval_secs(),
            receipt_timeout_secs: default_receipt_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            fallback_rpc_urls: Vec::new(),
            rpc_rate_limit: None,
        }
    }
}

impl PipelineConfig {
    /// Loads configuration from the path given by the `CONFIG` environment
    /// variable, falling back to `rebate.toml` in the current directory, and
    /// applies environment overrides.
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
    /// A missing file is not an error: defaults and overrides apply.
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
        let mut config = Self::from_toml_str(&content, &lookup)?;
        config.apply_env_overrides(&lookup)?;
        Ok(config)
    }

    /// Parses configuration from TOML text after expanding `$VAR` references.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the text does not match the schema.
    pub fn from_toml_str<F>(content: &str, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let expanded = expand_env_vars(content, lookup);
        Ok(toml::from_str(&expanded)?)
    }

    /// Applies the recognized environment overrides on top of file values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a numeric or enumerated override
    /// cannot be parsed.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("CHAIN_RPC_URL") {
            self.rpc_url = Some(url);
        }
        if let Some(url) = lookup("BUNDLER_URL") {
            self.bundler_url = Some(url);
        }
        if let Some(token) = lookup("TOKEN_ADDRESS") {
            self.token_address = Some(token);
        }
        if let Some(version) = lookup("ENTRYPOINT_VERSION") {
            self.entry_point_version = version.parse()?;
        }
        if let Some(id) = lookup("CHAIN_ID") {
            self.chain_id = parse_number("CHAIN_ID", &id)?;
        }
        if let Some(secs) = lookup("POLL_INTERVAL_SECS") {
            self.poll_interval_secs = parse_number("POLL_INTERVAL_SECS", &secs)?;
        }
        if let Some(secs) = lookup("RECEIPT_TIMEOUT_SECS") {
            self.receipt_timeout_secs = parse_number("RECEIPT_TIMEOUT_SECS", &secs)?;
        }
        if let Some(secs) = lookup("REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = parse_number("REQUEST_TIMEOUT_SECS", &secs)?;
        }
        if let Some(urls) = lookup("FALLBACK_RPC_URLS") {
            self.fallback_rpc_urls = urls
                .split(',')
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(str::to_owned)
                .collect();
        }
        if let Some(limit) = lookup("RPC_RATE_LIMIT") {
            self.rpc_rate_limit = Some(parse_number("RPC_RATE_LIMIT", &limit)?);
        }
        Ok(())
    }

    /// Checks every option the full pipeline needs.
    ///
    /// # Errors
    ///
    /// Returns the first missing or malformed option.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_endpoints()?;
        self.token_address()?;
        self.poll_interval_checked()?;
        Ok(())
    }

    /// Checks the options account derivation and sponsored calls need:
    /// endpoints and timeouts, but not the token or the polling interval.
    ///
    /// # Errors
    ///
    /// Returns the first missing or malformed option.
    pub fn validate_endpoints(&self) -> Result<(), ConfigError> {
        self.rpc_url()?;
        self.fallback_rpc_urls()?;
        self.bundler_url()?;
        nonzero("RECEIPT_TIMEOUT_SECS", self.receipt_timeout_secs)?;
        nonzero("REQUEST_TIMEOUT_SECS", self.request_timeout_secs)?;
        if self.rpc_rate_limit == Some(0) {
            return Err(ConfigError::invalid("RPC_RATE_LIMIT", "must be greater than zero"));
        }
        Ok(())
    }

    /// Returns the chain JSON-RPC endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if it is missing or not a URL.
    pub fn rpc_url(&self) -> Result<Url, ConfigError> {
        required_url("CHAIN_RPC_URL", self.rpc_url.as_deref())
    }

    /// Returns the bundler/paymaster endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if it is missing or not a URL.
    pub fn bundler_url(&self) -> Result<Url, ConfigError> {
        required_url("BUNDLER_URL", self.bundler_url.as_deref())
    }

    /// Returns the token contract address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if it is missing or not an address.
    pub fn token_address(&self) -> Result<Address, ConfigError> {
        self.token_address_opt()?.ok_or(ConfigError::Missing {
            option: "TOKEN_ADDRESS",
        })
    }

    /// Returns the token contract address if one is configured.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a value is set but is not an address.
    pub fn token_address_opt(&self) -> Result<Option<Address>, ConfigError> {
        resolved(self.token_address.as_deref())
            .map(|raw| {
                raw.parse::<Address>()
                    .map_err(|e| ConfigError::invalid("TOKEN_ADDRESS", e))
            })
            .transpose()
    }

    /// Returns the fallback chain endpoints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if one of them is not a URL.
    pub fn fallback_rpc_urls(&self) -> Result<Vec<Url>, ConfigError> {
        self.fallback_rpc_urls
            .iter()
            .filter_map(|raw| resolved(Some(raw)))
            .map(|raw| Url::parse(raw).map_err(|e| ConfigError::invalid("FALLBACK_RPC_URLS", e)))
            .collect()
    }

    /// Returns the deposit polling interval.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Returns the deposit polling interval, rejecting zero.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the interval is zero.
    pub fn poll_interval_checked(&self) -> Result<Duration, ConfigError> {
        nonzero("POLL_INTERVAL_SECS", self.poll_interval_secs).map(Duration::from_secs)
    }

    /// Returns the refund timeout.
    #[must_use]
    pub const fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.receipt_timeout_secs)
    }

    /// Returns the per-request bundler timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn nonzero(option: &'static str, secs: u64) -> Result<u64, ConfigError> {
    if secs == 0 {
        Err(ConfigError::invalid(option, "must be greater than zero"))
    } else {
        Ok(secs)
    }
}

/// Reads a file, treating a missing file as empty.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file exists but cannot be read.
pub fn read_optional(path: &str) -> Result<String, ConfigError> {
    if !Path::new(path).exists() {
        tracing::debug!(path, "Configuration file not found, using defaults");
        return Ok(String::new());
    }
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_owned(),
        source,
    })
}

/// Returns the trimmed value, or `None` if it is blank or still an
/// unresolved `$VAR` reference.
#[must_use]
pub fn resolved(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty() && !s.starts_with('$'))
}

fn required_url(option: &'static str, raw: Option<&str>) -> Result<Url, ConfigError> {
    let raw = resolved(raw).ok_or(ConfigError::Missing { option })?;
    Url::parse(raw).map_err(|e| ConfigError::invalid(option, e))
}

fn parse_number<T>(option: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| ConfigError::invalid(option, e))
}

/// Expands `$VAR` and `${VAR}` patterns in a string using `lookup`.
///
/// Unresolved variables are left as-is.
pub fn expand_env_vars<F>(input: &str, lookup: F) -> String
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

        if var_name.is_empty() {
            result.push('$');
            if braced {
                result.push('{');
            }
        } else if let Some(val) = lookup(&var_name) {
            result.push_str(&val);
        } else {
            result.push('$');
            if braced {
                result.push('{');
            }
            result.push_str(&var_name);
            if braced {
                result.push('}');
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_expand_env_vars() {
        let lookup = env(&[("KEY", "abc"), ("HOST", "rpc.example")]);
        assert_eq!(expand_env_vars("https://$HOST/x", &lookup), "https://rpc.example/x");
        assert_eq!(expand_env_vars("k=${KEY}!", &lookup), "k=abc!");
        assert_eq!(expand_env_vars("$MISSING and ${GONE}", &lookup), "$MISSING and ${GONE}");
        assert_eq!(expand_env_vars("cost: $ 5", &lookup), "cost: $ 5");
    }

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::from_toml_str("", env(&[])).unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.chain_id, 5115);
        assert_eq!(config.entry_point_version, EntryPointVersion::V07);
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.receipt_timeout(), Duration::from_secs(120));
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert!(config.fallback_rpc_urls().unwrap().is_empty());
        assert_eq!(config.rpc_rate_limit, None);
    }

    #[test]
    fn test_from_toml_with_expansion() {
        let toml = r#"
            rpc_url = "$CITREA_RPC"
            bundler_url = "https://bundler.example/rpc?apikey=${PIMLICO_KEY}"
            token_address = "0x36c16eaC6B0Ba6c50f494914ff015fCa95B7835F"
            entry_point_version = "0.6"
        "#;
        let lookup = env(&[("CITREA_RPC", "https://rpc.example"), ("PIMLICO_KEY", "k1")]);
        let config = PipelineConfig::from_toml_str(toml, lookup).unwrap();
        assert_eq!(config.rpc_url().unwrap().as_str(), "https://rpc.example/");
        assert_eq!(
            config.bundler_url().unwrap().as_str(),
            "https://bundler.example/rpc?apikey=k1"
        );
        assert_eq!(config.entry_point_version, EntryPointVersion::V06);
        config.validate().unwrap();
    }

    #[test]
    fn test_unresolved_variable_counts_as_missing() {
        let config =
            PipelineConfig::from_toml_str(r#"rpc_url = "$CITREA_RPC""#, env(&[])).unwrap();
        assert!(matches!(
            config.rpc_url(),
            Err(ConfigError::Missing {
                option: "CHAIN_RPC_URL"
            })
        ));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = PipelineConfig::default();
        config
            .apply_env_overrides(env(&[
                ("CHAIN_RPC_URL", "https://rpc.example"),
                ("BUNDLER_URL", "https://bundler.example"),
                ("TOKEN_ADDRESS", "0x36c16eaC6B0Ba6c50f494914ff015fCa95B7835F"),
                ("ENTRYPOINT_VERSION", "V06"),
                ("POLL_INTERVAL_SECS", "2"),
            ]))
            .unwrap();
        assert_eq!(config.entry_point_version, EntryPointVersion::V06);
        assert_eq!(config.poll_interval(), Duration::from_secs(2));
        config.validate().unwrap();
    }

    #[test]
    fn test_invalid_overrides_are_reported() {
        let mut config = PipelineConfig::default();
        let err = config
            .apply_env_overrides(env(&[("ENTRYPOINT_VERSION", "V08")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                option: "ENTRYPOINT_VERSION",
                ..
            }
        ));

        let err = config
            .apply_env_overrides(env(&[("CHAIN_ID", "citrea")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { option: "CHAIN_ID", .. }));
    }

    #[test]
    fn test_validate_reports_first_missing_option() {
        let config = PipelineConfig {
            rpc_url: Some("https://rpc.example".into()),
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Missing {
                option: "BUNDLER_URL"
            })
        ));

        let config = PipelineConfig {
            rpc_url: Some("https://rpc.example".into()),
            bundler_url: Some("https://bundler.example".into()),
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Missing {
                option: "TOKEN_ADDRESS"
            })
        ));
    }

    #[test]
    fn test_zero_durations_are_rejected() {
        let config = PipelineConfig {
            rpc_url: Some("https://rpc.example".into()),
            bundler_url: Some("https://bundler.example".into()),
            token_address: Some("0x36c16eaC6B0Ba6c50f494914ff015fCa95B7835F".into()),
            poll_interval_secs: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.poll_interval_checked(),
            Err(ConfigError::Invalid {
                option: "POLL_INTERVAL_SECS",
                ..
            })
        ));
        assert!(config.validate().is_err());
        config.validate_endpoints().unwrap();

        let config = PipelineConfig {
            request_timeout_secs: 0,
            ..config
        };
        assert!(matches!(
            config.validate_endpoints(),
            Err(ConfigError::Invalid {
                option: "REQUEST_TIMEOUT_SECS",
                ..
            })
        ));
    }

    #[test]
    fn test_endpoints_do_not_need_token() {
        let config = PipelineConfig {
            rpc_url: Some("https://rpc.example".into()),
            bundler_url: Some("https://bundler.example".into()),
            ..PipelineConfig::default()
        };
        config.validate_endpoints().unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_fallback_and_rate_limit_overrides() {
        let mut config = PipelineConfig::default();
        config
            .apply_env_overrides(env(&[
                ("FALLBACK_RPC_URLS", "https://a.example, ,https://b.example"),
                ("RPC_RATE_LIMIT", "25"),
                ("REQUEST_TIMEOUT_SECS", "3"),
            ]))
            .unwrap();
        let urls = config.fallback_rpc_urls().unwrap();
        assert_eq!(urls.len(), 2);
        assert_eq!(urls[1].host_str(), Some("b.example"));
        assert_eq!(config.rpc_rate_limit, Some(25));
        assert_eq!(config.request_timeout(), Duration::from_secs(3));

        config.fallback_rpc_urls = vec!["not a url".into()];
        assert!(matches!(
            config.fallback_rpc_urls(),
            Err(ConfigError::Invalid {
                option: "FALLBACK_RPC_URLS",
                ..
            })
        ));
    }

    #[test]
    fn test_token_address_malformed() {
        let config = PipelineConfig {
            token_address: Some("0xToken".into()),
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.token_address_opt(),
            Err(ConfigError::Invalid {
                option: "TOKEN_ADDRESS",
                ..
            })
        ));
        assert_eq!(PipelineConfig::default().token_address_opt().unwrap(), None);
    }

    #[test]
    fn test_entry_point_version_parsing() {
        assert_eq!("V06".parse::<EntryPointVersion>().unwrap(), EntryPointVersion::V06);
        assert_eq!("0.7".parse::<EntryPointVersion>().unwrap(), EntryPointVersion::V07);
        assert!("0.8".parse::<EntryPointVersion>().is_err());
        assert_eq!(EntryPointVersion::V06.to_string(), "0.6");
    }

    #[test]
    fn test_load_from_missing_file_uses_overrides() {
        let config = PipelineConfig::load_from(
            "/nonexistent/rebate.toml",
            env(&[("CHAIN_RPC_URL", "https://rpc.example")]),
        )
        .unwrap();
        assert_eq!(config.rpc_url().unwrap().host_str(), Some("rpc.example"));
    }
}
