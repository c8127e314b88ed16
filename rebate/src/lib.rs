#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core types for the smart-account deposit and sponsored refund pipeline.
//!
//! This crate holds the chain-agnostic half of the pipeline: the target
//! network description, configuration, the error taxonomy, payment request
//! encoding, and the deposit/refund value types. The EVM implementation
//! (account derivation, bundler client, watcher, refunds) lives in
//! `rebate-evm`.
//!
//! # Overview
//!
//! A buyer is given a deterministic smart contract account. The account is
//! shown as a scannable payment request; inbound token transfers to it are
//! observed on chain, and the deposited amount is returned to the sender in a
//! gas-sponsored user operation.
//!
//! # Modules
//!
//! - [`auth`] - Data handed over by the authentication collaborator
//! - [`chain`] - Chain descriptor and CAIP-2 helpers
//! - [`config`] - Pipeline configuration (TOML, `$VAR` expansion, env overrides)
//! - [`deposit`] - Deposit events, refund requests and receipts
//! - [`error`] - Configuration errors and the pipeline error taxonomy
//! - [`networks`] - Known network presets
//! - [`payment_uri`] - EIP-681 payment request encoding and parsing

pub mod auth;
pub mod chain;
pub mod config;
pub mod deposit;
pub mod error;
pub mod networks;
pub mod payment_uri;

pub use chain::{ChainDescriptor, ChainId};
pub use config::{EntryPointVersion, PipelineConfig};
pub use deposit::{DepositEvent, RefundReceipt, RefundRequest};
pub use error::{ConfigError, ErrorKind, PipelineError};
pub use payment_uri::PaymentRequest;
