//! Solidity interface definitions for on-chain interactions.
//!
//! Contains the minimal ABI surface needed by the pipeline:
//! - [`IERC20`] - `Transfer` event for deposits, `transfer` for refunds
//! - [`ILightAccountFactory`] - Counterfactual address derivation and deployment
//! - [`ILightAccount`] - Call execution through the smart account
//! - [`IEntryPoint`] - Per-account nonce lookup

use alloy_sol_types::sol;

sol! {
    /// Minimal ERC-20 interface.
    ///
    /// Reference: <https://eips.ethereum.org/EIPS/eip-20>
    #[allow(missing_docs)]
    #[derive(Debug)]
    #[sol(rpc)]
    interface IERC20 {
        event Transfer(address indexed from, address indexed to, uint256 value);

        function balanceOf(address account) external view returns (uint256);
        function transfer(address to, uint256 amount) external returns (bool);
    }
}

sol! {
    /// Alchemy `LightAccountFactory`, identical for v1.1.0 and v2.0.0.
    ///
    /// Reference: <https://github.com/alchemyplatform/light-account>
    #[allow(missing_docs)]
    #[derive(Debug)]
    #[sol(rpc)]
    interface ILightAccountFactory {
        function createAccount(address owner, uint256 salt) external returns (address ret);
        function getAddress(address owner, uint256 salt) external view returns (address);
    }
}

sol! {
    /// Execution entry points of a `LightAccount`.
    #[allow(missing_docs)]
    #[derive(Debug)]
    interface ILightAccount {
        function execute(address dest, uint256 value, bytes calldata func) external;
        function executeBatch(address[] calldata dest, uint256[] calldata value, bytes[] calldata func) external;
    }
}

sol! {
    /// ERC-4337 entry point nonce manager.
    ///
    /// Reference: <https://eips.ethereum.org/EIPS/eip-4337>
    #[allow(missing_docs)]
    #[derive(Debug)]
    #[sol(rpc)]
    interface IEntryPoint {
        function getNonce(address sender, uint192 key) external view returns (uint256 nonce);
    }
}
