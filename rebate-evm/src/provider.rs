//! Read-only chain access.
//!
//! The pipeline never sends raw transactions from an EOA; it only reads
//! (`eth_call`, `eth_getCode`, `eth_blockNumber`, `eth_getLogs`). A
//! type-erased [`DynProvider`] over throttled HTTP transports is enough, and
//! is shared by the factory, the sponsored client and the watcher.
//!
//! The chain's primary endpoint comes first, followed by any
//! `FALLBACK_RPC_URLS`; each is limited to `RPC_RATE_LIMIT` requests per
//! second when set.

use std::num::NonZeroUsize;

use alloy_provider::{DynProvider, Provider, ProviderBuilder};
use alloy_rpc_client::RpcClient;
use alloy_transport::layers::{FallbackLayer, ThrottleLayer};
use alloy_transport_http::Http;
use rebate::chain::{ChainDescriptor, ChainId};
use rebate::config::PipelineConfig;
use rebate::error::ConfigError;
use tower::ServiceBuilder;
use url::Url;

/// Creates an RPC client from HTTP endpoint URLs with optional per-endpoint
/// rate limits (requests per second).
///
/// Non-HTTP(S) URLs are skipped.
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] if no HTTP endpoint remains.
pub fn rpc_client(
    chain_id: ChainId,
    endpoints: &[(Url, Option<u32>)],
) -> Result<RpcClient, ConfigError> {
    let transports = endpoints
        .iter()
        .filter_map(|(url, rate_limit)| {
            let scheme = url.scheme();
            if scheme != "http" && scheme != "https" {
                tracing::warn!(chain_id, rpc_url = %url, "Skipping non-HTTP RPC endpoint");
                return None;
            }
            tracing::debug!(chain_id, rpc_url = %url, rate_limit = ?rate_limit, "Using HTTP transport");
            let limit = rate_limit.unwrap_or(u32::MAX);
            let service = ServiceBuilder::new()
                .layer(ThrottleLayer::new(limit))
                .service(Http::new(url.clone()));
            Some(service)
        })
        .collect::<Vec<_>>();
    let active = NonZeroUsize::new(transports.len())
        .ok_or_else(|| ConfigError::invalid("CHAIN_RPC_URL", "no HTTP endpoint configured"))?;
    let fallback = ServiceBuilder::new()
        .layer(FallbackLayer::default().with_active_transport_count(active))
        .service(transports);
    Ok(RpcClient::new(fallback, false))
}

/// Builds the read provider for a chain from its primary endpoint and the
/// configured fallbacks.
///
/// # Errors
///
/// Returns [`ConfigError`] if a fallback URL is malformed or no HTTP endpoint
/// is left.
pub fn read_provider(
    chain: &ChainDescriptor,
    config: &PipelineConfig,
) -> Result<DynProvider, ConfigError> {
    let endpoints = std::iter::once(chain.rpc_url().clone())
        .chain(config.fallback_rpc_urls()?)
        .map(|url| (url, config.rpc_rate_limit))
        .collect::<Vec<_>>();
    let client = rpc_client(chain.id(), &endpoints)?;
    Ok(ProviderBuilder::default().connect_client(client).erased())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_client_requires_http_endpoint() {
        let err = rpc_client(5115, &[("wss://rpc.example".parse().unwrap(), None)]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                option: "CHAIN_RPC_URL",
                ..
            }
        ));
        assert!(rpc_client(5115, &[]).is_err());
    }

    #[tokio::test]
    async fn test_rpc_client_accepts_http_endpoints() {
        let endpoints = [
            ("https://rpc.example".parse().unwrap(), Some(10)),
            ("ws://rpc.example".parse().unwrap(), None),
            ("http://localhost:8545".parse().unwrap(), None),
        ];
        assert!(rpc_client(5115, &endpoints).is_ok());
    }

    #[tokio::test]
    async fn test_read_provider_from_descriptor() {
        let chain = rebate::networks::citrea_testnet(Some("https://rpc.example")).unwrap();
        assert!(read_provider(&chain, &PipelineConfig::default()).is_ok());
    }

    #[tokio::test]
    async fn test_read_provider_with_fallbacks_and_rate_limit() {
        let chain = rebate::networks::citrea_testnet(Some("https://rpc.example")).unwrap();
        let config = PipelineConfig {
            fallback_rpc_urls: vec!["https://backup.example".into()],
            rpc_rate_limit: Some(10),
            ..PipelineConfig::default()
        };
        assert!(read_provider(&chain, &config).is_ok());

        let config = PipelineConfig {
            fallback_rpc_urls: vec!["::".into()],
            ..PipelineConfig::default()
        };
        assert!(matches!(
            read_provider(&chain, &config),
            Err(ConfigError::Invalid {
                option: "FALLBACK_RPC_URLS",
                ..
            })
        ));
    }
}
