//! Known network presets.
//!
//! Only the network the storefront targets is listed; other chain ids fall
//! back to generic metadata in [`ChainDescriptor::from_config`].

use url::Url;

use crate::chain::{BlockExplorer, ChainDescriptor, ChainId, NativeCurrency};
use crate::error::ConfigError;

/// Citrea testnet chain ID.
pub const CITREA_TESTNET: ChainId = 5115;

/// Blockscout explorer for Citrea testnet.
pub const CITREA_TESTNET_EXPLORER: &str = "https://explorer.testnet.citrea.xyz";

/// Display metadata for a known network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkPreset {
    /// EIP-155 chain ID.
    pub chain_id: ChainId,
    /// Display name.
    pub name: &'static str,
    /// Native currency name.
    pub currency_name: &'static str,
    /// Native currency symbol.
    pub currency_symbol: &'static str,
    /// Native currency decimals.
    pub currency_decimals: u8,
    /// Explorer display name.
    pub explorer_name: &'static str,
    /// Explorer base URL.
    pub explorer_url: &'static str,
}

/// Citrea testnet preset.
pub const CITREA_TESTNET_PRESET: NetworkPreset = NetworkPreset {
    chain_id: CITREA_TESTNET,
    name: "Citrea",
    currency_name: "Citrea",
    currency_symbol: "CIT",
    currency_decimals: 18,
    explorer_name: "Blockscout",
    explorer_url: CITREA_TESTNET_EXPLORER,
};

impl NetworkPreset {
    /// Builds a [`ChainDescriptor`] from this preset and an RPC endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the RPC endpoint is missing or invalid.
    pub fn descriptor(&self, rpc_url: Option<&str>) -> Result<ChainDescriptor, ConfigError> {
        let explorer = Url::parse(self.explorer_url)
            .ok()
            .map(|url| BlockExplorer {
                name: self.explorer_name.to_owned(),
                url,
            });
        ChainDescriptor::new(
            self.chain_id,
            self.name,
            NativeCurrency {
                name: self.currency_name.to_owned(),
                symbol: self.currency_symbol.to_owned(),
                decimals: self.currency_decimals,
            },
            rpc_url,
            explorer,
        )
    }
}

/// Returns the preset for a chain id, if it is a known network.
#[must_use]
pub fn preset(chain_id: ChainId) -> Option<&'static NetworkPreset> {
    match chain_id {
        CITREA_TESTNET => Some(&CITREA_TESTNET_PRESET),
        _ => None,
    }
}

/// Builds the Citrea testnet descriptor.
///
/// # Errors
///
/// Returns [`ConfigError`] if the RPC endpoint is missing or invalid.
pub fn citrea_testnet(rpc_url: Option<&str>) -> Result<ChainDescriptor, ConfigError> {
    CITREA_TESTNET_PRESET.descriptor(rpc_url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_citrea_testnet_descriptor() {
        let chain = citrea_testnet(Some("https://rpc.testnet.citrea.xyz")).unwrap();
        assert_eq!(chain.id(), 5115);
        assert_eq!(chain.native_currency().decimals, 18);
        assert_eq!(chain.explorer().unwrap().name, "Blockscout");
    }

    #[test]
    fn test_preset_lookup() {
        assert!(preset(CITREA_TESTNET).is_some());
        assert!(preset(1).is_none());
    }
}
