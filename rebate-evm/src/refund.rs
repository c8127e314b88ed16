//! Sponsored token refunds.

use std::time::Duration;

use alloy_primitives::{Address, B256, U256};
use alloy_sol_types::SolCall;
use rebate::config::PipelineConfig;
use rebate::deposit::{DepositEvent, RefundReceipt};
use rebate::error::{ConfigError, PipelineError};
use tokio::time::Instant;

use crate::account::SmartAccountContext;
use crate::contract::IERC20;
use crate::signer::OwnerSigner;
use crate::sponsored::{Call, SponsoredError};

/// Default time a refund may take, from building the operation to its
/// inclusion.
pub const DEFAULT_REFUND_TIMEOUT: Duration = Duration::from_secs(120);

/// Errors that can occur while refunding.
#[derive(Debug, thiserror::Error)]
pub enum RefundError {
    /// No token contract is configured.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Submission or confirmation failed.
    #[error(transparent)]
    Sponsored(#[from] SponsoredError),
    /// The operation was not submitted before the deadline.
    #[error("refund not submitted within {timeout:?}")]
    Timeout {
        /// The deadline that elapsed.
        timeout: Duration,
    },
    /// The operation was included but its execution reverted.
    #[error("refund {user_op_hash} reverted in {transaction_hash} (reason: {reason:?})")]
    Reverted {
        /// The user operation hash.
        user_op_hash: B256,
        /// The bundle transaction that included it.
        transaction_hash: B256,
        /// Revert reason, if the bundler reported one.
        reason: Option<String>,
    },
}

impl From<RefundError> for PipelineError {
    fn from(value: RefundError) -> Self {
        match value {
            RefundError::Config(e) => Self::Configuration(e),
            RefundError::Sponsored(e) => e.into(),
            RefundError::Timeout { .. } => Self::Timeout(value.to_string()),
            RefundError::Reverted { .. } => Self::operation(value),
        }
    }
}

/// The `transfer(destination, amount)` call on `token`.
#[must_use]
pub fn transfer_call(token: Address, destination: Address, amount: U256) -> Call {
    let data = IERC20::transferCall {
        to: destination,
        amount,
    }
    .abi_encode();
    Call::new(token, data.into())
}

/// Transfers tokens out of a smart account with gas paid by the paymaster.
#[derive(Debug, Clone, Copy)]
pub struct RefundService {
    token: Option<Address>,
    timeout: Duration,
}

impl RefundService {
    /// Creates a service refunding `token`.
    #[must_use]
    pub const fn new(token: Address) -> Self {
        Self {
            token: Some(token),
            timeout: DEFAULT_REFUND_TIMEOUT,
        }
    }

    /// Creates a service from configuration.
    ///
    /// A missing token address is accepted here and reported by each
    /// [`refund`](Self::refund).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the token address is malformed.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            token: config.token_address_opt()?,
            timeout: config.receipt_timeout(),
        })
    }

    /// Sets how long a refund may take in total.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the token contract, if configured.
    #[must_use]
    pub const fn token(&self) -> Option<Address> {
        self.token
    }

    /// Returns the refund timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Sends `amount` of the token from the context's account to
    /// `destination` and waits for inclusion.
    ///
    /// Sponsorship, submission and confirmation share one deadline of
    /// [`timeout`](Self::timeout).
    ///
    /// # Errors
    ///
    /// - [`RefundError::Config`] if no token is configured
    /// - [`RefundError::Timeout`] if the operation is not submitted in time
    /// - [`RefundError::Sponsored`] if the bundler rejects the operation, a
    ///   transport fails or no receipt arrives in time
    /// - [`RefundError::Reverted`] if the transfer reverted
    pub async fn refund<S: OwnerSigner>(
        &self,
        context: &SmartAccountContext<S>,
        destination: Address,
        amount: U256,
    ) -> Result<RefundReceipt, RefundError> {
        let token = self.token.ok_or(ConfigError::Missing {
            option: "TOKEN_ADDRESS",
        })?;
        let client = context.client();
        let deadline = Instant::now() + self.timeout;

        let user_op_hash = tokio::time::timeout_at(
            deadline,
            client.send_calls(&[transfer_call(token, destination, amount)]),
        )
        .await
        .map_err(|_| RefundError::Timeout {
            timeout: self.timeout,
        })??;
        tracing::info!(
            account = %context.address(),
            %destination,
            %amount,
            %user_op_hash,
            "Refund submitted"
        );

        let remaining = deadline.saturating_duration_since(Instant::now());
        let receipt = client.wait_for_receipt(user_op_hash, remaining).await?;
        let transaction_hash = receipt.receipt.transaction_hash;
        if !receipt.success {
            let reason = receipt.revert_reason().map(str::to_owned);
            tracing::warn!(%user_op_hash, %transaction_hash, reason = ?reason, "Refund reverted");
            return Err(RefundError::Reverted {
                user_op_hash,
                transaction_hash,
                reason,
            });
        }

        tracing::info!(
            %user_op_hash,
            %transaction_hash,
            explorer = ?context.chain().transaction_url(&transaction_hash).map(|u| u.to_string()),
            "Refund confirmed"
        );
        Ok(RefundReceipt {
            success: true,
            user_op_hash,
            transaction_hash,
            reason: None,
        })
    }

    /// Returns a deposit to its sender.
    ///
    /// # Errors
    ///
    /// See [`refund`](Self::refund).
    pub async fn refund_deposit<S: OwnerSigner>(
        &self,
        context: &SmartAccountContext<S>,
        deposit: &DepositEvent,
    ) -> Result<RefundReceipt, RefundError> {
        let request = deposit.refund_request();
        self.refund(context, request.destination, request.amount)
            .await
    }
}
