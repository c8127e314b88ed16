//! Automatic refunds of incoming deposits.

use futures_util::{Stream, StreamExt};
use rebate::deposit::DepositEvent;
use rebate::error::PipelineError;
use rebate_evm::{OwnerSigner, RefundService, SmartAccountContext};

/// Outcome counts of a refund loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefundTally {
    /// Deposits refunded successfully.
    pub refunded: u64,
    /// Deposits whose refund failed.
    pub failed: u64,
}

/// Refunds every deposit from `deposits` to its sender, one at a time, until
/// the stream ends.
///
/// A failed refund is logged and the loop moves on to the next deposit.
pub async fn refund_deposits<D, S>(
    mut deposits: D,
    refunds: RefundService,
    context: SmartAccountContext<S>,
) -> RefundTally
where
    D: Stream<Item = DepositEvent> + Unpin,
    S: OwnerSigner,
{
    let mut tally = RefundTally::default();
    while let Some(deposit) = deposits.next().await {
        match refunds.refund_deposit(&context, &deposit).await {
            Ok(receipt) => {
                tally.refunded += 1;
                tracing::info!(
                    deposit_tx = %deposit.tx_hash,
                    to = %deposit.from,
                    value = %deposit.value,
                    user_op_hash = %receipt.user_op_hash,
                    transaction_hash = %receipt.transaction_hash,
                    "Deposit refunded"
                );
            }
            Err(e) => {
                tally.failed += 1;
                let error = PipelineError::from(e);
                tracing::error!(
                    deposit_tx = %deposit.tx_hash,
                    to = %deposit.from,
                    value = %deposit.value,
                    kind = %error.kind(),
                    %error,
                    "Refund failed"
                );
            }
        }
    }
    tracing::debug!(?tally, "Refund loop finished");
    tally
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{B256, U256, address};
    use alloy_provider::{Provider, ProviderBuilder};
    use alloy_transport::mock::Asserter;
    use rebate::config::EntryPointVersion;
    use rebate_evm::{BundlerClient, ENTRY_POINT_V07, SmartAccountFactory};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    const ACCOUNT: alloy_primitives::Address =
        address!("0x8ba1f109551bD432803012645Ac136ddd64DBA72");

    #[tokio::test]
    async fn test_failed_refunds_do_not_stop_the_loop() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "eth_supportedEntryPoints"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": [ENTRY_POINT_V07.address]
            })))
            .mount(&server)
            .await;
        let asserter = Asserter::new();
        asserter.push_success(&ACCOUNT.into_word());
        let provider = ProviderBuilder::default()
            .connect_mocked_client(asserter)
            .erased();
        let chain = rebate::networks::citrea_testnet(Some("https://rpc.example")).unwrap();
        let owner: alloy_signer_local::PrivateKeySigner =
            "0x1000000000000000000000000000000000000000000000000000000000000000"
                .parse()
                .unwrap();
        let context = SmartAccountFactory::new(
            chain,
            provider,
            BundlerClient::new(server.uri().parse().unwrap()),
            EntryPointVersion::V07,
        )
        .create_context(owner)
        .await
        .unwrap();

        let deposits = (0..3u64).map(|i| DepositEvent {
            from: address!("0x1111111111111111111111111111111111111111"),
            to: ACCOUNT,
            value: U256::from(i + 1),
            tx_hash: B256::with_last_byte(u8::try_from(i).unwrap()),
            block_number: 10,
            log_index: i,
        });

        // no token configured: every refund fails without touching the network
        let refunds =
            RefundService::from_config(&rebate::config::PipelineConfig::default()).unwrap();
        let tally = refund_deposits(futures_util::stream::iter(deposits), refunds, context).await;
        assert_eq!(tally, RefundTally { refunded: 0, failed: 3 });
    }
}
