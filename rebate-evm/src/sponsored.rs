//! Gas-sponsored execution through a `LightAccount`.
//!
//! [`SponsoredClient::send_calls`] turns a list of calls into a signed,
//! paymaster-sponsored user operation:
//!
//! 1. Encode the calls through `execute` (one call) or `executeBatch`.
//! 2. Read the account nonce from the entry point (key `0`).
//! 3. Attach the factory deployment if the account has no code yet.
//! 4. Take fee caps from the bundler's `fast` tier.
//! 5. Ask the paymaster for gas limits and paymaster data.
//! 6. Sign the user operation hash as an EIP-191 message.
//! 7. Submit to the bundler.
//!
//! [`SponsoredClient::wait_for_receipt`] then polls for the receipt with an
//! explicit deadline.

use std::fmt;
use std::time::Duration;

use alloy_primitives::aliases::U192;
use alloy_primitives::{Address, B256, Bytes, U256};
use alloy_provider::{DynProvider, Provider};
use alloy_sol_types::SolCall;
use alloy_transport::TransportError;
use rebate::chain::ChainId;
use rebate::config::EntryPointVersion;
use rebate::error::PipelineError;

use crate::account::ACCOUNT_SALT;
use crate::bundler::{BundlerClient, BundlerError};
use crate::contract::{IEntryPoint, ILightAccount, ILightAccountFactory};
use crate::entry_point::EntryPoint;
use crate::signer::OwnerSigner;
use crate::user_operation::{UserOperation, UserOperationReceipt, UserOperationV06, UserOperationV07};

/// Default interval between receipt polls.
pub const DEFAULT_RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// A call executed by the smart account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    /// Target contract or recipient.
    pub to: Address,
    /// Native value to send.
    pub value: U256,
    /// Calldata.
    pub data: Bytes,
}

impl Call {
    /// A call to a contract without native value.
    #[must_use]
    pub const fn new(to: Address, data: Bytes) -> Self {
        Self {
            to,
            value: U256::ZERO,
            data,
        }
    }
}

/// Errors from building, submitting or confirming a sponsored operation.
#[derive(Debug, thiserror::Error)]
pub enum SponsoredError {
    /// No calls were given.
    #[error("no calls to execute")]
    EmptyBatch,
    /// A contract read on the chain RPC failed.
    #[error("contract call failed: {0}")]
    Contract(#[from] alloy_contract::Error),
    /// A raw chain RPC request failed.
    #[error("chain RPC error: {0}")]
    Transport(#[from] TransportError),
    /// The bundler or paymaster failed or refused.
    #[error(transparent)]
    Bundler(#[from] BundlerError),
    /// The paymaster answered without the fields needed for this entry point.
    #[error("sponsorship response is missing {0}")]
    IncompleteSponsorship(&'static str),
    /// The owner could not sign.
    #[error("failed to sign user operation: {0}")]
    Signing(#[from] alloy_signer::Error),
    /// No receipt arrived before the deadline.
    #[error("no receipt for user operation {hash} after {timeout:?}")]
    Timeout {
        /// The user operation hash.
        hash: B256,
        /// The deadline that elapsed.
        timeout: Duration,
    },
}

impl From<SponsoredError> for PipelineError {
    fn from(value: SponsoredError) -> Self {
        match value {
            SponsoredError::Bundler(e) => e.into(),
            SponsoredError::Timeout { .. } => Self::Timeout(value.to_string()),
            SponsoredError::Contract(_) | SponsoredError::Transport(_) => Self::network(value),
            SponsoredError::EmptyBatch
            | SponsoredError::IncompleteSponsorship(_)
            | SponsoredError::Signing(_) => Self::operation(value),
        }
    }
}

/// Encodes calls as `LightAccount` calldata.
///
/// # Errors
///
/// Returns [`SponsoredError::EmptyBatch`] for an empty list.
pub fn encode_calls(calls: &[Call]) -> Result<Bytes, SponsoredError> {
    match calls {
        [] => Err(SponsoredError::EmptyBatch),
        [call] => Ok(ILightAccount::executeCall {
            dest: call.to,
            value: call.value,
            func: call.data.clone(),
        }
        .abi_encode()
        .into()),
        _ => Ok(ILightAccount::executeBatchCall {
            dest: calls.iter().map(|c| c.to).collect(),
            value: calls.iter().map(|c| c.value).collect(),
            func: calls.iter().map(|c| c.data.clone()).collect(),
        }
        .abi_encode()
        .into()),
    }
}

/// Client that submits sponsored user operations for one smart account.
#[derive(Clone)]
pub struct SponsoredClient<S> {
    provider: DynProvider,
    bundler: BundlerClient,
    owner: S,
    account: Address,
    entry_point: &'static EntryPoint,
    chain_id: ChainId,
    receipt_poll_interval: Duration,
}

impl<S: OwnerSigner> fmt::Debug for SponsoredClient<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SponsoredClient")
            .field("account", &self.account)
            .field("owner", &self.owner.address())
            .field("entry_point", &self.entry_point.address)
            .field("chain_id", &self.chain_id)
            .field("bundler", self.bundler.url())
            .finish_non_exhaustive()
    }
}

impl<S: OwnerSigner> SponsoredClient<S> {
    /// Creates a client for `account`, owned by `owner`.
    #[must_use]
    pub const fn new(
        provider: DynProvider,
        bundler: BundlerClient,
        owner: S,
        account: Address,
        entry_point: &'static EntryPoint,
        chain_id: ChainId,
    ) -> Self {
        Self {
            provider,
            bundler,
            owner,
            account,
            entry_point,
            chain_id,
            receipt_poll_interval: DEFAULT_RECEIPT_POLL_INTERVAL,
        }
    }

    /// Sets how often [`wait_for_receipt`](Self::wait_for_receipt) polls.
    #[must_use]
    pub const fn with_receipt_poll_interval(mut self, interval: Duration) -> Self {
        self.receipt_poll_interval = interval;
        self
    }

    /// Returns the smart account address.
    #[must_use]
    pub const fn account(&self) -> Address {
        self.account
    }

    /// Returns the entry point in use.
    #[must_use]
    pub const fn entry_point(&self) -> &'static EntryPoint {
        self.entry_point
    }

    /// Returns the owner signer.
    #[must_use]
    pub const fn owner(&self) -> &S {
        &self.owner
    }

    /// Returns the bundler client.
    #[must_use]
    pub const fn bundler(&self) -> &BundlerClient {
        &self.bundler
    }

    /// Builds an unsigned, unsponsored user operation for `calls`, carrying
    /// the dummy signature.
    ///
    /// # Errors
    ///
    /// Returns [`SponsoredError`] if the calls are empty or a chain or
    /// bundler read fails.
    pub async fn build_user_operation(
        &self,
        calls: &[Call],
    ) -> Result<UserOperation, SponsoredError> {
        let call_data = encode_calls(calls)?;

        let entry_point = IEntryPoint::new(self.entry_point.address, &self.provider);
        let nonce = entry_point
            .getNonce(self.account, U192::ZERO)
            .call()
            .await?;

        let code = self.provider.get_code_at(self.account).await?;
        let deployment = code.is_empty().then(|| {
            Bytes::from(
                ILightAccountFactory::createAccountCall {
                    owner: self.owner.address(),
                    salt: ACCOUNT_SALT,
                }
                .abi_encode(),
            )
        });
        if deployment.is_some() {
            tracing::debug!(account = %self.account, "Account not deployed, attaching factory call");
        }

        let gas = self.bundler.gas_price().await?.fast;
        let signature = self.entry_point.account.dummy_signature();

        let op = match self.entry_point.version {
            EntryPointVersion::V06 => UserOperation::V06(UserOperationV06 {
                sender: self.account,
                nonce,
                init_code: deployment.map_or_else(Bytes::new, |data| {
                    let mut init_code = self.entry_point.factory.to_vec();
                    init_code.extend_from_slice(&data);
                    init_code.into()
                }),
                call_data,
                call_gas_limit: U256::ZERO,
                verification_gas_limit: U256::ZERO,
                pre_verification_gas: U256::ZERO,
                max_fee_per_gas: gas.max_fee_per_gas,
                max_priority_fee_per_gas: gas.max_priority_fee_per_gas,
                paymaster_and_data: Bytes::new(),
                signature,
            }),
            EntryPointVersion::V07 => UserOperation::V07(UserOperationV07 {
                sender: self.account,
                nonce,
                factory: deployment.as_ref().map(|_| self.entry_point.factory),
                factory_data: deployment,
                call_data,
                call_gas_limit: U256::ZERO,
                verification_gas_limit: U256::ZERO,
                pre_verification_gas: U256::ZERO,
                max_fee_per_gas: gas.max_fee_per_gas,
                max_priority_fee_per_gas: gas.max_priority_fee_per_gas,
                paymaster: None,
                paymaster_verification_gas_limit: None,
                paymaster_post_op_gas_limit: None,
                paymaster_data: None,
                signature,
            }),
        };
        Ok(op)
    }

    /// Executes `calls` from the smart account with gas paid by the
    /// paymaster, returning the user operation hash.
    ///
    /// # Errors
    ///
    /// Returns [`SponsoredError::Bundler`] with a rejection if sponsorship or
    /// submission is refused, and other variants for transport failures.
    pub async fn send_calls(&self, calls: &[Call]) -> Result<B256, SponsoredError> {
        let mut op = self.build_user_operation(calls).await?;

        let sponsorship = self
            .bundler
            .sponsor_user_operation(&op, self.entry_point.address)
            .await?;
        op.apply_sponsorship(sponsorship)
            .map_err(SponsoredError::IncompleteSponsorship)?;

        let hash = op.hash(self.entry_point.address, self.chain_id);
        let signature = self.owner.sign_message(hash.as_slice()).await?;
        op.set_signature(self.entry_point.account.format_signature(&signature));

        let submitted = self
            .bundler
            .send_user_operation(&op, self.entry_point.address)
            .await?;
        if submitted != hash {
            tracing::warn!(local = %hash, bundler = %submitted, "Bundler returned a different user operation hash");
        }
        tracing::info!(
            account = %self.account,
            user_op_hash = %submitted,
            nonce = %op.nonce(),
            "Submitted sponsored user operation"
        );
        Ok(submitted)
    }

    /// Waits for the receipt of a submitted operation.
    ///
    /// # Errors
    ///
    /// Returns [`SponsoredError::Timeout`] if no receipt arrives within
    /// `timeout`, or the bundler error that interrupted polling.
    pub async fn wait_for_receipt(
        &self,
        hash: B256,
        timeout: Duration,
    ) -> Result<UserOperationReceipt, SponsoredError> {
        tokio::time::timeout(timeout, self.poll_receipt(hash))
            .await
            .map_err(|_| SponsoredError::Timeout { hash, timeout })?
    }

    async fn poll_receipt(&self, hash: B256) -> Result<UserOperationReceipt, SponsoredError> {
        loop {
            if let Some(receipt) = self.bundler.user_operation_receipt(hash).await? {
                return Ok(receipt);
            }
            tokio::time::sleep(self.receipt_poll_interval).await;
        }
    }
}
