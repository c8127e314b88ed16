#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! EVM side of the rebate pipeline: `LightAccount` smart accounts, ERC-4337
//! sponsored user operations, deposit watching and refunds.
//!
//! # Architecture
//!
//! - [`account`] - Counterfactual account derivation and [`SmartAccountContext`]
//! - [`sponsored`] - User operation assembly, paymaster sponsorship, signing and
//!   receipt polling
//! - [`bundler`] - JSON-RPC client for the bundler/paymaster (Pimlico dialect)
//! - [`watcher`] - `Transfer` log polling into a [`DepositStream`]
//! - [`refund`] - Sponsored ERC-20 transfers back to depositors
//! - [`entry_point`] - Entry point / `LightAccount` / factory table
//! - [`user_operation`] - v0.6 and v0.7 user operation layouts and hashing
//!
//! Chain reads go through a type-erased alloy provider ([`provider`]); the
//! owner key is only ever held by an [`OwnerSigner`].

pub mod account;
pub mod bundler;
pub mod contract;
pub mod entry_point;
pub mod provider;
pub mod refund;
pub mod signer;
pub mod sponsored;
pub mod user_operation;
pub mod watcher;

#[cfg(test)]
mod testing;

pub use account::{FactoryError, SmartAccountContext, SmartAccountFactory, create_context};
pub use bundler::{BundlerClient, BundlerError};
pub use entry_point::{ENTRY_POINT_V06, ENTRY_POINT_V07, EntryPoint, LightAccountVersion};
pub use refund::{RefundError, RefundService};
pub use signer::OwnerSigner;
pub use sponsored::{Call, SponsoredClient, SponsoredError};
pub use watcher::{DepositStream, DepositWatcher, WatchHandle};
