//! Wallet-scannable payment requests.
//!
//! A request for a token deposit is rendered as an
//! [EIP-681](https://eips.ethereum.org/EIPS/eip-681) `transfer` URI:
//!
//! ```text
//! ethereum:<token>@<chainId>/transfer?address=<recipient>[&uint256=<amount>]
//! ```
//!
//! Without a token the request degrades to the bare recipient address, which
//! every wallet can scan. Addresses are rendered EIP-55 checksummed.

use std::fmt;
use std::str::FromStr;

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::chain::ChainId;

const SCHEME: &str = "ethereum";
const TRANSFER: &str = "transfer";

/// Failure to parse a payment URI.
#[derive(Debug, thiserror::Error)]
pub enum PaymentUriError {
    /// The string is neither an address nor an `ethereum:` URI.
    #[error("not a payment request: {0}")]
    Unrecognized(String),
    /// An address in the URI is malformed.
    #[error("invalid address `{value}`: {reason}")]
    InvalidAddress {
        /// The offending text.
        value: String,
        /// Parser message.
        reason: String,
    },
    /// The chain id after `@` is not a number.
    #[error("invalid chain id `{0}`")]
    InvalidChainId(String),
    /// The `uint256` parameter is not a decimal integer.
    #[error("invalid amount `{0}`")]
    InvalidAmount(String),
    /// The URI names a function other than `transfer`.
    #[error("unsupported function `{0}`")]
    UnsupportedFunction(String),
    /// A `transfer` URI without an `address` parameter.
    #[error("transfer request has no recipient")]
    MissingRecipient,
}

/// A deposit target: recipient, optional token contract and amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    /// Chain the request is bound to. `None` for the bare-address form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<ChainId>,
    /// Account that receives the deposit.
    pub recipient: Address,
    /// ERC-20 contract to transfer, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<Address>,
    /// Amount in the token's smallest unit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<U256>,
}

impl PaymentRequest {
    /// Creates a request for `recipient` on `chain_id`.
    #[must_use]
    pub const fn new(chain_id: ChainId, recipient: Address) -> Self {
        Self {
            chain_id: Some(chain_id),
            recipient,
            token: None,
            amount: None,
        }
    }

    /// Sets the token contract.
    #[must_use]
    pub const fn with_token(mut self, token: Address) -> Self {
        self.token = Some(token);
        self
    }

    /// Sets the requested amount.
    #[must_use]
    pub const fn with_amount(mut self, amount: U256) -> Self {
        self.amount = Some(amount);
        self
    }

    /// Renders the request as a URI string.
    #[must_use]
    pub fn to_uri(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for PaymentRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let recipient = self.recipient.to_checksum(None);
        let Some(token) = self.token else {
            return f.write_str(&recipient);
        };
        write!(f, "{SCHEME}:{}", token.to_checksum(None))?;
        if let Some(chain_id) = self.chain_id {
            write!(f, "@{chain_id}")?;
        }
        write!(f, "/{TRANSFER}?address={recipient}")?;
        if let Some(amount) = self.amount {
            write!(f, "&uint256={amount}")?;
        }
        Ok(())
    }
}

impl FromStr for PaymentRequest {
    type Err = PaymentUriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if !s.starts_with(&format!("{SCHEME}:")) {
            let recipient = parse_address(s)?;
            return Ok(Self {
                chain_id: None,
                recipient,
                token: None,
                amount: None,
            });
        }

        let url = Url::parse(s).map_err(|_| PaymentUriError::Unrecognized(s.to_owned()))?;
        let (target, function) = match url.path().split_once('/') {
            Some((target, function)) => (target, Some(function)),
            None => (url.path(), None),
        };
        let (address, chain_id) = match target.split_once('@') {
            Some((address, chain)) => {
                let chain_id = chain
                    .parse::<ChainId>()
                    .map_err(|_| PaymentUriError::InvalidChainId(chain.to_owned()))?;
                (address, Some(chain_id))
            }
            None => (target, None),
        };
        let target = parse_address(address.strip_prefix("pay-").unwrap_or(address))?;

        let mut recipient = None;
        let mut amount = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "address" => recipient = Some(parse_address(&value)?),
                "uint256" => {
                    let parsed = U256::from_str_radix(&value, 10)
                        .map_err(|_| PaymentUriError::InvalidAmount(value.clone().into_owned()))?;
                    amount = Some(parsed);
                }
                _ => {}
            }
        }

        match function {
            None | Some("") => Ok(Self {
                chain_id,
                recipient: target,
                token: None,
                amount,
            }),
            Some(TRANSFER) => Ok(Self {
                chain_id,
                recipient: recipient.ok_or(PaymentUriError::MissingRecipient)?,
                token: Some(target),
                amount,
            }),
            Some(other) => Err(PaymentUriError::UnsupportedFunction(other.to_owned())),
        }
    }
}

fn parse_address(value: &str) -> Result<Address, PaymentUriError> {
    value
        .parse::<Address>()
        .map_err(|e| PaymentUriError::InvalidAddress {
            value: value.to_owned(),
            reason: e.to_string(),
        })
}

/// Encodes a deposit target as a payment URI.
///
/// Returns the bare checksummed `recipient` when `token` is `None`; the
/// amount is ignored in that case since a plain address cannot carry it.
#[must_use]
pub fn encode(
    chain_id: ChainId,
    recipient: Address,
    token: Option<Address>,
    amount: Option<U256>,
) -> String {
    let mut request = PaymentRequest::new(chain_id, recipient);
    if let Some(token) = token {
        request = request.with_token(token);
        if let Some(amount) = amount {
            request = request.with_amount(amount);
        }
    }
    request.to_uri()
}

/// Parses a payment URI or bare address.
///
/// # Errors
///
/// Returns [`PaymentUriError`] if the input is not a recognized request.
pub fn parse(uri: &str) -> Result<PaymentRequest, PaymentUriError> {
    uri.parse()
}
