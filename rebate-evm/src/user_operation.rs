//! ERC-4337 user operations and the bundler's wire types.
//!
//! Entry point v0.6 carries the deployment and paymaster data as opaque
//! byte strings (`initCode`, `paymasterAndData`); v0.7 sends them unpacked
//! (`factory`/`factoryData`, `paymaster`/`paymasterData` plus paymaster gas
//! limits) and packs them itself. Both layouts hash to the same
//! `keccak256(abi.encode(keccak256(pack(op)), entryPoint, chainId))`.

use alloy_primitives::{Address, B256, Bytes, TxHash, U256, keccak256};
use alloy_sol_types::SolValue;
use serde::{Deserialize, Serialize};

use rebate::chain::ChainId;

/// User operation for entry point v0.6.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationV06 {
    pub sender: Address,
    pub nonce: U256,
    /// Factory address followed by its calldata; empty once deployed.
    pub init_code: Bytes,
    pub call_data: Bytes,
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub paymaster_and_data: Bytes,
    pub signature: Bytes,
}

/// User operation for entry point v0.7, in the bundler's unpacked form.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationV07 {
    pub sender: Address,
    pub nonce: U256,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory_data: Option<Bytes>,
    pub call_data: Bytes,
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_verification_gas_limit: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_post_op_gas_limit: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_data: Option<Bytes>,
    pub signature: Bytes,
}

/// A user operation in either entry-point layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserOperation {
    /// Entry point v0.6 layout.
    V06(UserOperationV06),
    /// Entry point v0.7 layout.
    V07(UserOperationV07),
}

/// Packs two 128-bit values into one word, `high` first.
fn pack_u128_pair(high: U256, low: U256) -> B256 {
    let mut word = [0u8; 32];
    word[..16].copy_from_slice(&high.to_be_bytes::<32>()[16..]);
    word[16..].copy_from_slice(&low.to_be_bytes::<32>()[16..]);
    B256::from(word)
}

fn to_u128_bytes(value: U256) -> [u8; 16] {
    let mut out = [0u8; 16];
    out.copy_from_slice(&value.to_be_bytes::<32>()[16..]);
    out
}

impl UserOperationV07 {
    /// `factory ++ factoryData`, or empty when the account is deployed.
    #[must_use]
    pub fn init_code(&self) -> Bytes {
        self.factory.map_or_else(Bytes::new, |factory| {
            let mut out = factory.to_vec();
            if let Some(data) = &self.factory_data {
                out.extend_from_slice(data);
            }
            out.into()
        })
    }

    /// `paymaster ++ verificationGas(16) ++ postOpGas(16) ++ paymasterData`,
    /// or empty when unsponsored.
    #[must_use]
    pub fn paymaster_and_data(&self) -> Bytes {
        self.paymaster.map_or_else(Bytes::new, |paymaster| {
            let mut out = paymaster.to_vec();
            out.extend_from_slice(&to_u128_bytes(
                self.paymaster_verification_gas_limit.unwrap_or_default(),
            ));
            out.extend_from_slice(&to_u128_bytes(
                self.paymaster_post_op_gas_limit.unwrap_or_default(),
            ));
            if let Some(data) = &self.paymaster_data {
                out.extend_from_slice(data);
            }
            out.into()
        })
    }
}

impl UserOperation {
    /// Computes the user operation hash the entry point signs over.
    #[must_use]
    pub fn hash(&self, entry_point: Address, chain_id: ChainId) -> B256 {
        let inner = match self {
            Self::V06(op) => keccak256(
                (
                    op.sender,
                    op.nonce,
                    keccak256(&op.init_code),
                    keccak256(&op.call_data),
                    op.call_gas_limit,
                    op.verification_gas_limit,
                    op.pre_verification_gas,
                    op.max_fee_per_gas,
                    op.max_priority_fee_per_gas,
                    keccak256(&op.paymaster_and_data),
                )
                    .abi_encode(),
            ),
            Self::V07(op) => keccak256(
                (
                    op.sender,
                    op.nonce,
                    keccak256(op.init_code()),
                    keccak256(&op.call_data),
                    pack_u128_pair(op.verification_gas_limit, op.call_gas_limit),
                    op.pre_verification_gas,
                    pack_u128_pair(op.max_priority_fee_per_gas, op.max_fee_per_gas),
                    keccak256(op.paymaster_and_data()),
                )
                    .abi_encode(),
            ),
        };
        keccak256((inner, entry_point, U256::from(chain_id)).abi_encode())
    }

    /// Returns the smart account that executes the operation.
    #[must_use]
    pub const fn sender(&self) -> Address {
        match self {
            Self::V06(op) => op.sender,
            Self::V07(op) => op.sender,
        }
    }

    /// Returns the entry-point nonce.
    #[must_use]
    pub const fn nonce(&self) -> U256 {
        match self {
            Self::V06(op) => op.nonce,
            Self::V07(op) => op.nonce,
        }
    }

    /// Returns the current signature.
    #[must_use]
    pub const fn signature(&self) -> &Bytes {
        match self {
            Self::V06(op) => &op.signature,
            Self::V07(op) => &op.signature,
        }
    }

    /// Replaces the signature.
    pub fn set_signature(&mut self, signature: Bytes) {
        match self {
            Self::V06(op) => op.signature = signature,
            Self::V07(op) => op.signature = signature,
        }
    }

    /// Fills gas limits and paymaster fields from a sponsorship.
    ///
    /// # Errors
    ///
    /// Returns the name of the paymaster field the sponsorship lacks for
    /// this layout.
    pub fn apply_sponsorship(&mut self, sponsorship: Sponsorship) -> Result<(), &'static str> {
        match self {
            Self::V06(op) => {
                op.paymaster_and_data = sponsorship
                    .paymaster_and_data
                    .filter(|data| !data.is_empty())
                    .ok_or("paymasterAndData")?;
                op.call_gas_limit = sponsorship.call_gas_limit;
                op.verification_gas_limit = sponsorship.verification_gas_limit;
                op.pre_verification_gas = sponsorship.pre_verification_gas;
            }
            Self::V07(op) => {
                op.paymaster = Some(sponsorship.paymaster.ok_or("paymaster")?);
                op.paymaster_data = sponsorship.paymaster_data;
                op.paymaster_verification_gas_limit =
                    sponsorship.paymaster_verification_gas_limit;
                op.paymaster_post_op_gas_limit = sponsorship.paymaster_post_op_gas_limit;
                op.call_gas_limit = sponsorship.call_gas_limit;
                op.verification_gas_limit = sponsorship.verification_gas_limit;
                op.pre_verification_gas = sponsorship.pre_verification_gas;
            }
        }
        Ok(())
    }
}

/// Fee caps for one speed tier.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasPrice {
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
}

/// Result of `pimlico_getUserOperationGasPrice`.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasPriceTiers {
    pub slow: GasPrice,
    pub standard: GasPrice,
    pub fast: GasPrice,
}

/// Result of `pm_sponsorUserOperation`.
///
/// v0.6 paymasters answer with `paymasterAndData`; v0.7 paymasters answer
/// with the unpacked paymaster fields.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sponsorship {
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_and_data: Option<Bytes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_data: Option<Bytes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_verification_gas_limit: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_post_op_gas_limit: Option<U256>,
}

/// Bundle transaction that included a user operation.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleTransaction {
    pub transaction_hash: TxHash,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_number: Option<U256>,
}

/// Result of `eth_getUserOperationReceipt`.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationReceipt {
    pub user_op_hash: B256,
    pub sender: Address,
    pub nonce: U256,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster: Option<Address>,
    #[serde(default)]
    pub actual_gas_cost: U256,
    #[serde(default)]
    pub actual_gas_used: U256,
    /// Whether the inner call executed without reverting.
    pub success: bool,
    /// Revert data or message reported for a failed execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub receipt: BundleTransaction,
}

impl UserOperationReceipt {
    /// Revert reason, if the bundler reported a non-empty one.
    #[must_use]
    pub fn revert_reason(&self) -> Option<&str> {
        self.reason
            .as_deref()
            .filter(|reason| !reason.is_empty() && *reason != "0x")
    }
}
