//! Smart account derivation and context construction.
//!
//! A `LightAccount` address is counterfactual: the factory's
//! `getAddress(owner, salt)` returns it before anything is deployed, and the
//! first sponsored operation deploys it. For a fixed owner, entry-point
//! version and chain the address never changes.

use std::fmt;
use std::time::Duration;

use alloy_primitives::{Address, U256};
use alloy_provider::DynProvider;
use rebate::chain::ChainDescriptor;
use rebate::config::{EntryPointVersion, PipelineConfig};
use rebate::error::{ConfigError, PipelineError};

use crate::bundler::{BundlerClient, BundlerError};
use crate::contract::ILightAccountFactory;
use crate::entry_point::EntryPoint;
use crate::provider::read_provider;
use crate::signer::OwnerSigner;
use crate::sponsored::{DEFAULT_RECEIPT_POLL_INTERVAL, SponsoredClient};

/// Salt used for every derived account.
pub const ACCOUNT_SALT: U256 = U256::ZERO;

/// Errors that can occur while deriving an account or building a context.
#[derive(Debug, thiserror::Error)]
pub enum FactoryError {
    /// A required endpoint is missing or malformed.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The factory `getAddress` call failed.
    #[error("failed to derive account address: {0}")]
    Contract(#[from] alloy_contract::Error),
    /// The bundler could not be reached or answered invalidly.
    #[error("bundler validation failed: {0}")]
    Bundler(#[from] BundlerError),
    /// The bundler does not serve the configured entry point.
    #[error("bundler does not support entry point {entry_point} (supported: {supported:?})")]
    UnsupportedEntryPoint {
        /// The configured entry point.
        entry_point: Address,
        /// Entry points the bundler reported.
        supported: Vec<Address>,
    },
}

impl From<FactoryError> for PipelineError {
    fn from(value: FactoryError) -> Self {
        match value {
            FactoryError::Config(e) => Self::Configuration(e),
            other => Self::network(other),
        }
    }
}

/// Derives smart accounts and builds [`SmartAccountContext`]s for one chain,
/// bundler and entry point.
#[derive(Debug, Clone)]
pub struct SmartAccountFactory {
    chain: ChainDescriptor,
    provider: DynProvider,
    bundler: BundlerClient,
    entry_point: &'static EntryPoint,
    receipt_poll_interval: Duration,
}

impl SmartAccountFactory {
    /// Creates a factory from already-built clients.
    #[must_use]
    pub const fn new(
        chain: ChainDescriptor,
        provider: DynProvider,
        bundler: BundlerClient,
        version: EntryPointVersion,
    ) -> Self {
        Self {
            chain,
            provider,
            bundler,
            entry_point: EntryPoint::for_version(version),
            receipt_poll_interval: DEFAULT_RECEIPT_POLL_INTERVAL,
        }
    }

    /// Creates a factory from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`FactoryError::Config`] if the chain RPC or bundler endpoint
    /// is missing or malformed.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, FactoryError> {
        let chain = ChainDescriptor::from_config(config)?;
        let bundler =
            BundlerClient::new(config.bundler_url()?).with_timeout(config.request_timeout());
        let provider = read_provider(&chain, config)?;
        Ok(Self::new(
            chain,
            provider,
            bundler,
            config.entry_point_version,
        ))
    }

    /// Sets the receipt poll interval of the contexts this factory builds.
    #[must_use]
    pub const fn with_receipt_poll_interval(mut self, interval: Duration) -> Self {
        self.receipt_poll_interval = interval;
        self
    }

    /// Returns the chain this factory targets.
    #[must_use]
    pub const fn chain(&self) -> &ChainDescriptor {
        &self.chain
    }

    /// Returns the entry point in use.
    #[must_use]
    pub const fn entry_point(&self) -> &'static EntryPoint {
        self.entry_point
    }

    /// Derives the account address for `owner` via the factory's
    /// `getAddress(owner, 0)`.
    ///
    /// # Errors
    ///
    /// Returns [`FactoryError::Contract`] if the call fails.
    pub async fn derive_address(&self, owner: Address) -> Result<Address, FactoryError> {
        let factory = ILightAccountFactory::new(self.entry_point.factory, &self.provider);
        let account = factory.getAddress(owner, ACCOUNT_SALT).call().await?;
        Ok(account)
    }

    /// Checks that the bundler serves the configured entry point.
    ///
    /// # Errors
    ///
    /// Returns [`FactoryError::UnsupportedEntryPoint`] if it does not.
    pub async fn validate_bundler(&self) -> Result<(), FactoryError> {
        let supported = self.bundler.supported_entry_points().await?;
        if supported.contains(&self.entry_point.address) {
            Ok(())
        } else {
            Err(FactoryError::UnsupportedEntryPoint {
                entry_point: self.entry_point.address,
                supported,
            })
        }
    }

    /// Derives the account for `owner` and binds a sponsored client to it.
    ///
    /// # Errors
    ///
    /// Returns [`FactoryError`] if the address cannot be derived or the
    /// bundler does not serve the entry point.
    pub async fn create_context<S: OwnerSigner>(
        &self,
        owner: S,
    ) -> Result<SmartAccountContext<S>, FactoryError> {
        let owner_address = owner.address();
        let address = self.derive_address(owner_address).await?;
        self.validate_bundler().await?;

        tracing::info!(
            chain = %self.chain,
            owner = %owner_address,
            account = %address,
            entry_point = %self.entry_point.address,
            light_account = %self.entry_point.account,
            "Smart account ready"
        );

        let client = SponsoredClient::new(
            self.provider.clone(),
            self.bundler.clone(),
            owner,
            address,
            self.entry_point,
            self.chain.id(),
        )
        .with_receipt_poll_interval(self.receipt_poll_interval);

        Ok(SmartAccountContext {
            chain: self.chain.clone(),
            provider: self.provider.clone(),
            client,
            address,
        })
    }
}

/// Creates a context for `owner` from configuration.
///
/// # Errors
///
/// Returns [`FactoryError::Config`] if the chain RPC or bundler endpoint is
/// missing, and other variants if either endpoint fails.
pub async fn create_context<S: OwnerSigner>(
    owner: S,
    config: &PipelineConfig,
) -> Result<SmartAccountContext<S>, FactoryError> {
    SmartAccountFactory::from_config(config)?
        .create_context(owner)
        .await
}

/// A derived smart account with everything needed to use it.
///
/// Owned by the flow that requested it; never persisted. The `Debug` output
/// shows the owner address only.
#[derive(Clone)]
pub struct SmartAccountContext<S> {
    chain: ChainDescriptor,
    provider: DynProvider,
    client: SponsoredClient<S>,
    address: Address,
}

impl<S: OwnerSigner> fmt::Debug for SmartAccountContext<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmartAccountContext")
            .field("chain", &self.chain.caip2())
            .field("address", &self.address)
            .field("owner", &self.client.owner().address())
            .field("entry_point", &self.client.entry_point().address)
            .finish_non_exhaustive()
    }
}

impl<S: OwnerSigner> SmartAccountContext<S> {
    /// Returns the smart account address.
    #[must_use]
    pub const fn address(&self) -> Address {
        self.address
    }

    /// Returns the owner's EOA address.
    #[must_use]
    pub fn owner_address(&self) -> Address {
        self.client.owner().address()
    }

    /// Returns the chain the account lives on.
    #[must_use]
    pub const fn chain(&self) -> &ChainDescriptor {
        &self.chain
    }

    /// Returns the read provider bound to the chain.
    #[must_use]
    pub const fn provider(&self) -> &DynProvider {
        &self.provider
    }

    /// Returns the sponsored-transaction client.
    #[must_use]
    pub const fn client(&self) -> &SponsoredClient<S> {
        &self.client
    }

    /// Returns the entry point in use.
    #[must_use]
    pub const fn entry_point(&self) -> &'static EntryPoint {
        self.client.entry_point()
    }
}
