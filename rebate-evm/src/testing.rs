//! Shared test fixtures: a placeholder owner, a mocked chain RPC and
//! canned bundler responses.

use alloy_primitives::{Address, B256, U256, address, b256};
use alloy_provider::{DynProvider, Provider, ProviderBuilder};
use alloy_rpc_types_eth::Log;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::SolEvent;
use alloy_transport::mock::Asserter;
use serde_json::{Value, json};
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::contract::IERC20;

/// Placeholder owner key. Never valid outside tests.
pub const OWNER_KEY: &str = "0x1000000000000000000000000000000000000000000000000000000000000000";

/// Smart account address the mocked factory derives.
pub const ACCOUNT: Address = address!("0x8ba1f109551bD432803012645Ac136ddd64DBA72");

/// Token contract used in fixtures.
pub const TOKEN: Address = address!("0x36c16eaC6B0Ba6c50f494914ff015fCa95B7835F");

/// Depositor used in fixtures.
pub const SENDER: Address = address!("0x1111111111111111111111111111111111111111");

/// User operation hash the mocked bundler returns.
pub const USER_OP_HASH: B256 =
    b256!("0x00000000000000000000000000000000000000000000000000000000000000aa");

/// Bundle transaction hash in mocked receipts.
pub const BUNDLE_TX_HASH: B256 =
    b256!("0x00000000000000000000000000000000000000000000000000000000000000bb");

pub fn owner() -> PrivateKeySigner {
    OWNER_KEY.parse().unwrap()
}

/// A provider whose JSON-RPC responses are queued on the returned asserter.
pub fn mock_chain() -> (DynProvider, Asserter) {
    let asserter = Asserter::new();
    let provider = ProviderBuilder::default()
        .connect_mocked_client(asserter.clone())
        .erased();
    (provider, asserter)
}

/// A mined `Transfer` of `value` from [`SENDER`] to `to`.
pub fn transfer_log(to: Address, value: u64, block: u64, index: u64) -> Log {
    let data = IERC20::Transfer {
        from: SENDER,
        to,
        value: U256::from(value),
    }
    .encode_log_data();
    Log {
        inner: alloy_primitives::Log { address: TOKEN, data },
        block_number: Some(block),
        transaction_hash: Some(B256::with_last_byte(u8::try_from(block % 256).unwrap())),
        log_index: Some(index),
        ..Log::default()
    }
}

/// ABI-encodes a single `uint256` return value.
pub fn abi_word(value: u64) -> B256 {
    B256::from(U256::from(value))
}

/// ABI-encodes a single `address` return value.
pub fn abi_address(address: Address) -> B256 {
    address.into_word()
}

pub async fn mock_bundler_method(server: &MockServer, rpc_method: &str, result: Value) {
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": rpc_method })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": result})),
        )
        .mount(server)
        .await;
}

pub async fn mock_bundler_error(server: &MockServer, rpc_method: &str, message: &str) {
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": rpc_method })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {"code": -32500, "message": message}
        })))
        .mount(server)
        .await;
}

pub fn gas_price_json() -> Value {
    json!({
        "slow": {"maxFeePerGas": "0x3b9aca00", "maxPriorityFeePerGas": "0x5f5e100"},
        "standard": {"maxFeePerGas": "0x3b9aca00", "maxPriorityFeePerGas": "0x5f5e100"},
        "fast": {"maxFeePerGas": "0x3b9aca00", "maxPriorityFeePerGas": "0x5f5e100"}
    })
}

/// v0.7 sponsorship answer.
pub fn sponsorship_json() -> Value {
    json!({
        "paymaster": "0x2222222222222222222222222222222222222222",
        "paymasterData": "0xabcd",
        "paymasterVerificationGasLimit": "0x7530",
        "paymasterPostOpGasLimit": "0x2710",
        "preVerificationGas": "0xc350",
        "verificationGasLimit": "0x30d40",
        "callGasLimit": "0x186a0"
    })
}

pub fn receipt_json(success: bool) -> Value {
    json!({
        "userOpHash": USER_OP_HASH,
        "entryPoint": "0x0000000071727De22E5E9d8BAf0edAc6f37da032",
        "sender": ACCOUNT,
        "nonce": "0x0",
        "paymaster": "0x2222222222222222222222222222222222222222",
        "actualGasCost": "0x5208",
        "actualGasUsed": "0x5208",
        "success": success,
        "reason": if success { "" } else { "0x08c379a0" },
        "logs": [],
        "receipt": {"transactionHash": BUNDLE_TX_HASH, "blockNumber": "0x65"}
    })
}

/// Gas price, sponsorship and submission for a v0.7 operation.
pub async fn mock_sponsorship_flow(server: &MockServer) {
    mock_bundler_method(server, "pimlico_getUserOperationGasPrice", gas_price_json()).await;
    mock_bundler_method(server, "pm_sponsorUserOperation", sponsorship_json()).await;
    mock_bundler_method(server, "eth_sendUserOperation", json!(USER_OP_HASH)).await;
}
