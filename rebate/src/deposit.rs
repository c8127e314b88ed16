//! Deposit and refund value types.

use alloy_primitives::{Address, TxHash, U256};
use serde::{Deserialize, Serialize};

/// An inbound token transfer to a watched account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositEvent {
    /// Sender of the transfer.
    pub from: Address,
    /// Recipient, always the watched account.
    pub to: Address,
    /// Amount in the token's smallest unit.
    pub value: U256,
    /// Transaction that emitted the transfer.
    pub tx_hash: TxHash,
    /// Block containing the transaction.
    pub block_number: u64,
    /// Position of the log within the block.
    pub log_index: u64,
}

impl DepositEvent {
    /// Chain position used for ordering: block, then log index.
    #[must_use]
    pub const fn position(&self) -> (u64, u64) {
        (self.block_number, self.log_index)
    }

    /// Identity used for duplicate suppression.
    #[must_use]
    pub const fn key(&self) -> (TxHash, u64) {
        (self.tx_hash, self.log_index)
    }

    /// A refund that returns this deposit to its sender.
    #[must_use]
    pub const fn refund_request(&self) -> RefundRequest {
        RefundRequest {
            destination: self.from,
            amount: self.value,
        }
    }
}

/// A sponsored transfer back to a depositor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundRequest {
    /// Address receiving the refund.
    pub destination: Address,
    /// Amount in the token's smallest unit.
    pub amount: U256,
}

/// Outcome of a confirmed refund.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundReceipt {
    /// Whether the operation executed without reverting.
    pub success: bool,
    /// Hash of the user operation.
    pub user_op_hash: TxHash,
    /// Hash of the bundle transaction that included it.
    pub transaction_hash: TxHash,
    /// Revert reason reported by the bundler, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}
