//! Axum route handlers for the daemon.
//!
//! `GET /deposit` tells a payer where to send tokens: the smart account
//! address and an EIP-681 payment URI for it.

use std::sync::Arc;

use alloy_primitives::{Address, U256};
use axum::Json;
use axum::extract::{Query, State};
use rebate::chain::ChainId;
use rebate::payment_uri;
use serde::{Deserialize, Serialize};

use crate::error::DaemonError;

/// What the handlers need to know about the running account.
#[derive(Debug, Clone, Copy)]
pub struct DepositTarget {
    /// Chain the account lives on.
    pub chain_id: ChainId,
    /// The smart account receiving deposits.
    pub account: Address,
    /// Token accepted for deposits, if configured.
    pub token: Option<Address>,
}

/// Shared application state for the daemon.
pub type DaemonState = Arc<DepositTarget>;

/// Query of `GET /deposit`.
#[derive(Debug, Default, Deserialize)]
pub struct DepositQuery {
    /// Requested amount in the token's smallest unit, as a decimal string.
    pub amount: Option<String>,
}

/// Body of `GET /deposit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositInfo {
    /// Chain id.
    pub chain_id: ChainId,
    /// Deposit address.
    pub account: Address,
    /// Token contract, if configured.
    pub token: Option<Address>,
    /// EIP-681 URI (or bare address without a token).
    pub payment_uri: String,
}

/// `GET /health` - Liveness and version.
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `GET /deposit` - Deposit address and payment URI.
///
/// # Errors
///
/// Returns 400 if `amount` is not a decimal integer.
pub async fn get_deposit(
    State(target): State<DaemonState>,
    Query(query): Query<DepositQuery>,
) -> Result<Json<DepositInfo>, DaemonError> {
    let amount = query
        .amount
        .as_deref()
        .map(|raw| {
            U256::from_str_radix(raw.trim(), 10).map_err(|e| DaemonError::InvalidQuery {
                name: "amount",
                reason: e.to_string(),
            })
        })
        .transpose()?;
    let payment_uri = payment_uri::encode(target.chain_id, target.account, target.token, amount);
    Ok(Json(DepositInfo {
        chain_id: target.chain_id,
        account: target.account,
        token: target.token,
        payment_uri,
    }))
}

/// Creates an Axum [`axum::Router`] with all daemon endpoints.
///
/// Endpoints:
/// - `GET /health` - liveness and version
/// - `GET /deposit` - deposit address and payment URI (`?amount=` optional)
pub fn daemon_router(state: DaemonState) -> axum::Router {
    axum::Router::new()
        .route("/health", axum::routing::get(health))
        .route("/deposit", axum::routing::get(get_deposit))
        .with_state(state)
}
