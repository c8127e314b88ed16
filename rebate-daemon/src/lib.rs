//! Rebate daemon.
//!
//! Serves the deposit address of one smart account over HTTP and, when
//! enabled, refunds every incoming deposit to its sender with gas paid by the
//! paymaster.
//!
//! # Modules
//!
//! - [`handlers`] - Axum route handlers and router builder
//! - [`pipeline`] - Deposit-to-refund loop
//! - [`error`] - HTTP error mapping
//! - [`config`] - Server configuration with environment variable expansion

pub mod config;
pub mod error;
pub mod handlers;
pub mod pipeline;

pub use handlers::{DaemonState, DepositTarget, daemon_router};
