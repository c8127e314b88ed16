//! ERC-4337 entry points and their matching `LightAccount` deployments.
//!
//! Each [`EntryPointVersion`] maps to exactly one entry point contract, one
//! `LightAccount` implementation and the factory that deploys it. Both rows
//! stay addressable so accounts created under v0.6 can still be refunded.

use std::fmt;

use alloy_primitives::{Address, Bytes, Signature, address, hex};
use rebate::config::EntryPointVersion;

/// `LightAccount` implementation release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightAccountVersion {
    /// `LightAccount` v1.1.0 (entry point v0.6).
    V1_1_0,
    /// `LightAccount` v2.0.0 (entry point v0.7).
    V2_0_0,
}

/// Signature-type prefix for an EOA owner signature (`LightAccount` v2).
const EOA_SIGNATURE_TYPE: u8 = 0x00;

/// Placeholder signature accepted during gas estimation and sponsorship.
const DUMMY_SIGNATURE: [u8; 65] = hex!(
    "fffffffffffffffffffffffffffffff0000000000000000000000000000000007aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa1c"
);

impl LightAccountVersion {
    /// Returns the semantic version string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::V1_1_0 => "1.1.0",
            Self::V2_0_0 => "2.0.0",
        }
    }

    /// Encodes an owner signature the way the account's validator expects it.
    ///
    /// v2.0.0 accounts accept several signer kinds and require the
    /// signature-type byte in front.
    #[must_use]
    pub fn format_signature(self, signature: &Signature) -> Bytes {
        self.with_type_prefix(&signature.as_bytes())
    }

    /// Signature used while the operation is sponsored, before signing.
    #[must_use]
    pub fn dummy_signature(self) -> Bytes {
        self.with_type_prefix(&DUMMY_SIGNATURE)
    }

    fn with_type_prefix(self, raw: &[u8]) -> Bytes {
        match self {
            Self::V1_1_0 => Bytes::copy_from_slice(raw),
            Self::V2_0_0 => {
                let mut out = Vec::with_capacity(raw.len() + 1);
                out.push(EOA_SIGNATURE_TYPE);
                out.extend_from_slice(raw);
                out.into()
            }
        }
    }
}

impl fmt::Display for LightAccountVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the entry-point table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryPoint {
    /// Protocol revision.
    pub version: EntryPointVersion,
    /// Entry point contract.
    pub address: Address,
    /// `LightAccount` implementation deployed for this entry point.
    pub account: LightAccountVersion,
    /// `LightAccountFactory` for that implementation.
    pub factory: Address,
}

/// Entry point v0.6 with `LightAccount` v1.1.0.
pub const ENTRY_POINT_V06: EntryPoint = EntryPoint {
    version: EntryPointVersion::V06,
    address: address!("0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789"),
    account: LightAccountVersion::V1_1_0,
    factory: address!("0x00004EC70002a32400f8ae005A26081065620D20"),
};

/// Entry point v0.7 with `LightAccount` v2.0.0.
pub const ENTRY_POINT_V07: EntryPoint = EntryPoint {
    version: EntryPointVersion::V07,
    address: address!("0x0000000071727De22E5E9d8BAf0edAc6f37da032"),
    account: LightAccountVersion::V2_0_0,
    factory: address!("0x0000000000400CdFef5E2714E63d8040b700BC24"),
};

impl EntryPoint {
    /// Looks up the table row for a protocol revision.
    #[must_use]
    pub const fn for_version(version: EntryPointVersion) -> &'static Self {
        match version {
            EntryPointVersion::V06 => &ENTRY_POINT_V06,
            EntryPointVersion::V07 => &ENTRY_POINT_V07,
        }
    }
}
