//! Owner signer abstraction.

use std::future::Future;
use std::sync::Arc;

use alloy_primitives::{Address, Signature};
use alloy_signer_local::PrivateKeySigner;

/// A trait that abstracts the smart account owner, allowing both owned and
/// Arc-wrapped signers.
///
/// Alloy's `Signer` trait is not implemented for `Arc<T>`, but hosts may want
/// to share one owner between contexts.
pub trait OwnerSigner: Send + Sync {
    /// Returns the owner's EOA address.
    fn address(&self) -> Address;

    /// Signs `message` with the EIP-191 personal-message prefix.
    fn sign_message(
        &self,
        message: &[u8],
    ) -> impl Future<Output = Result<Signature, alloy_signer::Error>> + Send;
}

impl OwnerSigner for PrivateKeySigner {
    fn address(&self) -> Address {
        Self::address(self)
    }

    async fn sign_message(&self, message: &[u8]) -> Result<Signature, alloy_signer::Error> {
        alloy_signer::Signer::sign_message(self, message).await
    }
}

impl<T: OwnerSigner> OwnerSigner for Arc<T> {
    fn address(&self) -> Address {
        (**self).address()
    }

    async fn sign_message(&self, message: &[u8]) -> Result<Signature, alloy_signer::Error> {
        (**self).sign_message(message).await
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{B256, eip191_hash_message};

    use super::*;

    #[tokio::test]
    async fn test_sign_message_recovers_owner() {
        let signer = Arc::new(crate::testing::owner());
        let hash = B256::repeat_byte(0x42);
        let signature = signer.sign_message(hash.as_slice()).await.unwrap();
        let recovered = signature
            .recover_address_from_prehash(&eip191_hash_message(hash))
            .unwrap();
        assert_eq!(recovered, OwnerSigner::address(&signer));
    }
}
