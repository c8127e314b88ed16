//! JSON-RPC client for an ERC-4337 bundler with a Pimlico-style paymaster.
//!
//! [`BundlerClient`] speaks the subset of the bundler API the pipeline needs:
//!
//! | method                               | purpose                          |
//! |--------------------------------------|----------------------------------|
//! | `eth_supportedEntryPoints`           | endpoint validation              |
//! | `pimlico_getUserOperationGasPrice`   | fee caps                         |
//! | `pm_sponsorUserOperation`            | gas limits and paymaster data    |
//! | `eth_sendUserOperation`              | submission                       |
//! | `eth_getUserOperationReceipt`        | confirmation                     |
//!
//! A JSON-RPC `error` object is reported as [`BundlerError::Rpc`], which
//! [`BundlerError::is_rejection`] distinguishes from transport failures. Only
//! a refused sponsorship or submission is an operation failure; an error from
//! any other method is a network failure.
//!
//! Every request is bounded by [`DEFAULT_REQUEST_TIMEOUT`] unless
//! [`BundlerClient::with_timeout`] says otherwise.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alloy_primitives::{Address, B256};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use url::Url;

use rebate::error::PipelineError;

use crate::user_operation::{GasPriceTiers, Sponsorship, UserOperation, UserOperationReceipt};

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const SPONSOR_METHOD: &str = "pm_sponsorUserOperation";
const SEND_METHOD: &str = "eth_sendUserOperation";

/// Errors that can occur while talking to the bundler.
#[derive(Debug, thiserror::Error)]
pub enum BundlerError {
    /// HTTP transport error.
    #[error("HTTP error: {method}: {source}")]
    Http {
        /// JSON-RPC method being called.
        method: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// Unexpected HTTP status code.
    #[error("Unexpected HTTP status {status}: {method}: {body}")]
    HttpStatus {
        /// JSON-RPC method being called.
        method: &'static str,
        /// The HTTP status code.
        status: StatusCode,
        /// The response body.
        body: String,
    },
    /// The response body or its `result` could not be decoded.
    #[error("Failed to deserialize JSON: {method}: {source}")]
    JsonDeserialization {
        /// JSON-RPC method being called.
        method: &'static str,
        /// The underlying serde error.
        #[source]
        source: serde_json::Error,
    },
    /// The bundler answered with a JSON-RPC error object.
    #[error("{method} rejected ({code}): {message}")]
    Rpc {
        /// JSON-RPC method being called.
        method: &'static str,
        /// JSON-RPC error code.
        code: i64,
        /// JSON-RPC error message.
        message: String,
        /// Optional error data.
        data: Option<Value>,
    },
    /// The response is well-formed JSON but not a usable answer.
    #[error("Invalid response: {method}: {reason}")]
    InvalidResponse {
        /// JSON-RPC method being called.
        method: &'static str,
        /// What is wrong with the response.
        reason: String,
    },
}

impl BundlerError {
    /// Whether the bundler or paymaster refused the request itself, as
    /// opposed to the request not getting through.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(self, Self::Rpc { .. })
    }

    /// Whether the paymaster refused to sponsor or the bundler refused to
    /// accept a user operation.
    #[must_use]
    pub fn is_operation_rejection(&self) -> bool {
        matches!(
            self,
            Self::Rpc {
                method: SPONSOR_METHOD | SEND_METHOD,
                ..
            }
        )
    }
}

impl From<BundlerError> for PipelineError {
    fn from(value: BundlerError) -> Self {
        if value.is_operation_rejection() {
            Self::operation(value)
        } else {
            Self::network(value)
        }
    }
}

/// Client for the bundler/paymaster endpoint.
///
/// Cheap to clone; clones share the connection pool and request counter.
#[derive(Clone, Debug)]
pub struct BundlerClient {
    client: Client,
    url: Url,
    timeout: Duration,
    next_id: Arc<AtomicU64>,
}

impl BundlerClient {
    /// Creates a client for the given endpoint with
    /// [`DEFAULT_REQUEST_TIMEOUT`].
    #[must_use]
    pub fn new(url: Url) -> Self {
        Self {
            client: Client::new(),
            url,
            timeout: DEFAULT_REQUEST_TIMEOUT,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Sets a timeout for all future requests.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the per-request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the endpoint URL.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Lists the entry points the bundler accepts operations for.
    ///
    /// # Errors
    ///
    /// Returns [`BundlerError`] on transport or protocol failure.
    pub async fn supported_entry_points(&self) -> Result<Vec<Address>, BundlerError> {
        self.request("eth_supportedEntryPoints", json!([])).await
    }

    /// Fetches current fee caps by speed tier.
    ///
    /// # Errors
    ///
    /// Returns [`BundlerError`] on transport or protocol failure.
    pub async fn gas_price(&self) -> Result<GasPriceTiers, BundlerError> {
        self.request("pimlico_getUserOperationGasPrice", json!([]))
            .await
    }

    /// Asks the paymaster to sponsor an operation.
    ///
    /// # Errors
    ///
    /// Returns [`BundlerError::Rpc`] if sponsorship is denied.
    pub async fn sponsor_user_operation(
        &self,
        op: &UserOperation,
        entry_point: Address,
    ) -> Result<Sponsorship, BundlerError> {
        self.request(SPONSOR_METHOD, json!([op, entry_point]))
            .await
    }

    /// Submits a signed operation and returns its hash.
    ///
    /// # Errors
    ///
    /// Returns [`BundlerError::Rpc`] if the bundler refuses the operation.
    pub async fn send_user_operation(
        &self,
        op: &UserOperation,
        entry_point: Address,
    ) -> Result<B256, BundlerError> {
        self.request(SEND_METHOD, json!([op, entry_point]))
            .await
    }

    /// Fetches the receipt of an operation, or `None` while it is pending.
    ///
    /// # Errors
    ///
    /// Returns [`BundlerError`] on transport or protocol failure.
    pub async fn user_operation_receipt(
        &self,
        hash: B256,
    ) -> Result<Option<UserOperationReceipt>, BundlerError> {
        self.request("eth_getUserOperationReceipt", json!([hash]))
            .await
    }

    /// Sends one JSON-RPC request and decodes its `result`.
    ///
    /// A `null` result decodes into `R` (e.g. `None` for an `Option`); a
    /// response with neither `result` nor `error` is invalid.
    async fn request<P, R>(&self, method: &'static str, params: P) -> Result<R, BundlerError>
    where
        P: Serialize + Send,
        R: DeserializeOwned,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        tracing::debug!(method, id, "Bundler request");

        let http_response = self
            .client
            .post(self.url.clone())
            .json(&payload)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|source| BundlerError::Http { method, source })?;

        let status = http_response.status();
        let body = http_response
            .text()
            .await
            .map_err(|source| BundlerError::Http { method, source })?;
        if status != StatusCode::OK {
            return Err(BundlerError::HttpStatus {
                method,
                status,
                body,
            });
        }

        let mut response: Value = serde_json::from_str(&body)
            .map_err(|source| BundlerError::JsonDeserialization { method, source })?;

        if let Some(error) = response.get_mut("error").filter(|e| !e.is_null()) {
            let code = error.get("code").and_then(Value::as_i64).unwrap_or_default();
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_owned();
            let data = error.get_mut("data").map(Value::take);
            tracing::debug!(method, code, %message, "Bundler rejected request");
            return Err(BundlerError::Rpc {
                method,
                code,
                message,
                data,
            });
        }

        let result = response
            .get_mut("result")
            .map(Value::take)
            .ok_or_else(|| BundlerError::InvalidResponse {
                method,
                reason: "response has neither result nor error".to_owned(),
            })?;
        serde_json::from_value(result)
            .map_err(|source| BundlerError::JsonDeserialization { method, source })
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{U256, address, b256};
    use rebate::error::ErrorKind;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn client(server: &MockServer) -> BundlerClient {
        BundlerClient::new(server.uri().parse::<Url>().unwrap())
    }

    async fn mock_result(server: &MockServer, rpc_method: &str, result: Value) {
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": rpc_method })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": result})),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_supported_entry_points() {
        let server = MockServer::start().await;
        mock_result(
            &server,
            "eth_supportedEntryPoints",
            json!([
                "0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789",
                "0x0000000071727De22E5E9d8BAf0edAc6f37da032"
            ]),
        )
        .await;

        let entry_points = client(&server).supported_entry_points().await.unwrap();
        assert_eq!(
            entry_points,
            vec![
                address!("0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789"),
                address!("0x0000000071727De22E5E9d8BAf0edAc6f37da032"),
            ]
        );
    }

    #[tokio::test]
    async fn test_gas_price_fast_tier() {
        let server = MockServer::start().await;
        mock_result(
            &server,
            "pimlico_getUserOperationGasPrice",
            json!({
                "slow": {"maxFeePerGas": "0x1", "maxPriorityFeePerGas": "0x1"},
                "standard": {"maxFeePerGas": "0x2", "maxPriorityFeePerGas": "0x1"},
                "fast": {"maxFeePerGas": "0x3b9aca00", "maxPriorityFeePerGas": "0x5f5e100"}
            }),
        )
        .await;

        let tiers = client(&server).gas_price().await.unwrap();
        assert_eq!(tiers.fast.max_fee_per_gas, U256::from(1_000_000_000u64));
        assert_eq!(tiers.fast.max_priority_fee_per_gas, U256::from(100_000_000u64));
    }

    #[tokio::test]
    async fn test_pending_receipt_is_none() {
        let server = MockServer::start().await;
        mock_result(&server, "eth_getUserOperationReceipt", Value::Null).await;

        let receipt = client(&server)
            .user_operation_receipt(B256::ZERO)
            .await
            .unwrap();
        assert!(receipt.is_none());
    }

    #[tokio::test]
    async fn test_send_user_operation_returns_hash() {
        let server = MockServer::start().await;
        mock_result(
            &server,
            "eth_sendUserOperation",
            json!("0x00000000000000000000000000000000000000000000000000000000000000aa"),
        )
        .await;

        let op: UserOperation = serde_json::from_value(json!({
            "sender": "0x1111111111111111111111111111111111111111",
            "nonce": "0x0",
            "callData": "0x",
            "callGasLimit": "0x0",
            "verificationGasLimit": "0x0",
            "preVerificationGas": "0x0",
            "maxFeePerGas": "0x0",
            "maxPriorityFeePerGas": "0x0",
            "signature": "0x"
        }))
        .unwrap();
        assert!(matches!(op, UserOperation::V07(_)));

        let hash = client(&server)
            .send_user_operation(&op, Address::ZERO)
            .await
            .unwrap();
        assert_eq!(
            hash,
            b256!("0x00000000000000000000000000000000000000000000000000000000000000aa")
        );
    }

    #[tokio::test]
    async fn test_rpc_error_is_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "pm_sponsorUserOperation"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": {"code": -32500, "message": "sponsorship policy rejected"}
            })))
            .mount(&server)
            .await;

        let op: UserOperation = serde_json::from_value(json!({
            "sender": "0x1111111111111111111111111111111111111111",
            "nonce": "0x0",
            "initCode": "0x",
            "callData": "0x",
            "callGasLimit": "0x0",
            "verificationGasLimit": "0x0",
            "preVerificationGas": "0x0",
            "maxFeePerGas": "0x0",
            "maxPriorityFeePerGas": "0x0",
            "paymasterAndData": "0x",
            "signature": "0x"
        }))
        .unwrap();
        assert!(matches!(op, UserOperation::V06(_)));

        let err = client(&server)
            .sponsor_user_operation(&op, Address::ZERO)
            .await
            .unwrap_err();
        assert!(err.is_rejection());
        assert!(matches!(err, BundlerError::Rpc { code: -32500, .. }));
        assert_eq!(PipelineError::from(err).kind(), ErrorKind::Operation);
    }

    #[tokio::test]
    async fn test_http_status_is_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let err = client(&server).gas_price().await.unwrap_err();
        assert!(!err.is_rejection());
        assert!(matches!(
            err,
            BundlerError::HttpStatus { status, .. } if status == StatusCode::BAD_GATEWAY
        ));
        assert_eq!(PipelineError::from(err).kind(), ErrorKind::Network);
    }

    #[tokio::test]
    async fn test_missing_result_is_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"jsonrpc": "2.0", "id": 1})),
            )
            .mount(&server)
            .await;

        let err = client(&server)
            .supported_entry_points()
            .await
            .unwrap_err();
        assert!(matches!(err, BundlerError::InvalidResponse { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint() {
        let client = BundlerClient::new("http://127.0.0.1:9/".parse().unwrap())
            .with_timeout(Duration::from_secs(2));
        let err = client.supported_entry_points().await.unwrap_err();
        assert!(matches!(err, BundlerError::Http { .. }));
    }

    #[tokio::test]
    async fn test_unresponsive_bundler_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": []}))
                    .set_delay(Duration::from_secs(3600)),
            )
            .mount(&server)
            .await;

        assert_eq!(client(&server).timeout(), DEFAULT_REQUEST_TIMEOUT);
        let bounded = client(&server).with_timeout(Duration::from_millis(200));
        let err = tokio::time::timeout(Duration::from_secs(10), bounded.supported_entry_points())
            .await
            .expect("request was not bounded by the client timeout")
            .unwrap_err();
        assert!(matches!(&err, BundlerError::Http { source, .. } if source.is_timeout()));
        assert_eq!(PipelineError::from(err).kind(), ErrorKind::Network);
    }

    #[tokio::test]
    async fn test_receipt_rpc_error_is_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "eth_getUserOperationReceipt"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": {"code": -32603, "message": "internal error"}
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .user_operation_receipt(B256::ZERO)
            .await
            .unwrap_err();
        assert!(err.is_rejection());
        assert!(!err.is_operation_rejection());
        assert_eq!(PipelineError::from(err).kind(), ErrorKind::Network);
    }
}
