//! Static description of the target EVM network.
//!
//! - [`ChainId`] - A numeric EIP-155 chain id (e.g., `5115` for Citrea testnet)
//! - [`ChainDescriptor`] - Chain id, native currency, RPC endpoint and explorer
//! - [`caip2`] / [`parse_caip2`] - CAIP-2 formatting helpers

use std::fmt;

use alloy_primitives::TxHash;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::PipelineConfig;
use crate::error::ConfigError;
use crate::networks;

/// An EIP-155 chain ID (e.g., 5115 for Citrea testnet).
pub type ChainId = u64;

/// Formats a chain ID as a CAIP-2 identifier.
///
/// Example: `caip2(5115)` returns `"eip155:5115"`.
#[must_use]
pub fn caip2(chain_id: ChainId) -> String {
    format!("eip155:{chain_id}")
}

/// Parses a CAIP-2 identifier into an EIP-155 chain ID.
///
/// Returns `None` if the input is not a valid `eip155:` prefixed string.
#[must_use]
pub fn parse_caip2(caip: &str) -> Option<ChainId> {
    caip.strip_prefix("eip155:").and_then(|s| s.parse().ok())
}

/// Metadata of the chain's native currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    /// Display name (e.g., `"Citrea"`).
    pub name: String,
    /// Ticker symbol (e.g., `"CIT"`).
    pub symbol: String,
    /// Number of decimals.
    pub decimals: u8,
}

/// A block explorer for the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockExplorer {
    /// Display name (e.g., `"Blockscout"`).
    pub name: String,
    /// Base URL of the explorer.
    pub url: Url,
}

/// Immutable description of the network the pipeline runs against.
///
/// Constructed once per process. Construction fails if the RPC endpoint is
/// missing or is not an HTTP(S) URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainDescriptor {
    id: ChainId,
    name: String,
    native_currency: NativeCurrency,
    rpc_url: Url,
    explorer: Option<BlockExplorer>,
}

impl ChainDescriptor {
    /// Creates a chain descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] if `rpc_url` is absent or blank, and
    /// [`ConfigError::Invalid`] if it is not an `http`/`https` URL.
    pub fn new(
        id: ChainId,
        name: impl Into<String>,
        native_currency: NativeCurrency,
        rpc_url: Option<&str>,
        explorer: Option<BlockExplorer>,
    ) -> Result<Self, ConfigError> {
        let rpc_url = parse_rpc_url(rpc_url)?;
        Ok(Self {
            id,
            name: name.into(),
            native_currency,
            rpc_url,
            explorer,
        })
    }

    /// Builds the descriptor for the configured chain.
    ///
    /// Known networks (see [`networks`]) get their display metadata; any
    /// other chain id gets a generic name and an 18-decimal `ETH` currency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the RPC endpoint is missing or invalid.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, ConfigError> {
        let rpc_url = config.rpc_url()?;
        match networks::preset(config.chain_id) {
            Some(preset) => preset.descriptor(Some(rpc_url.as_str())),
            None => Self::new(
                config.chain_id,
                format!("Chain {}", config.chain_id),
                NativeCurrency {
                    name: "Ether".to_owned(),
                    symbol: "ETH".to_owned(),
                    decimals: 18,
                },
                Some(rpc_url.as_str()),
                None,
            ),
        }
    }

    /// Returns the numeric chain id.
    #[must_use]
    pub const fn id(&self) -> ChainId {
        self.id
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the native currency metadata.
    #[must_use]
    pub const fn native_currency(&self) -> &NativeCurrency {
        &self.native_currency
    }

    /// Returns the JSON-RPC endpoint.
    #[must_use]
    pub const fn rpc_url(&self) -> &Url {
        &self.rpc_url
    }

    /// Returns the block explorer, if any.
    #[must_use]
    pub const fn explorer(&self) -> Option<&BlockExplorer> {
        self.explorer.as_ref()
    }

    /// Returns the CAIP-2 identifier (e.g., `"eip155:5115"`).
    #[must_use]
    pub fn caip2(&self) -> String {
        caip2(self.id)
    }

    /// Returns the explorer page for a transaction, if an explorer is known.
    #[must_use]
    pub fn transaction_url(&self, hash: &TxHash) -> Option<Url> {
        let explorer = self.explorer.as_ref()?;
        let base = explorer.url.as_str().trim_end_matches('/');
        Url::parse(&format!("{base}/tx/{hash}")).ok()
    }
}

impl fmt::Display for ChainDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.caip2())
    }
}

fn parse_rpc_url(raw: Option<&str>) -> Result<Url, ConfigError> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(ConfigError::Missing {
            option: "CHAIN_RPC_URL",
        })?;
    let url = Url::parse(raw).map_err(|e| ConfigError::invalid("CHAIN_RPC_URL", e))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::invalid(
            "CHAIN_RPC_URL",
            format!("unsupported scheme `{other}`, expected http or https"),
        )),
    }
}
