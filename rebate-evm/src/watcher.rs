//! Deposit watching by `eth_getLogs` polling.
//!
//! A watcher polls the chain head at a fixed interval, fetches token
//! `Transfer` logs whose indexed `to` is the watched account and delivers each
//! transfer once, in chain order, over a [`DepositStream`].
//!
//! The first poll only records the head: transfers mined before the watcher
//! started are never delivered. Fetch failures leave the cursor in place, so
//! the same range is retried on the next tick. A log seen twice (a retried
//! range, a flaky node) is suppressed by `(tx_hash, log_index)` for
//! [`DEDUP_WINDOW_BLOCKS`] blocks.

use std::collections::HashMap;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use alloy_primitives::{Address, BlockNumber, TxHash};
use alloy_provider::{DynProvider, Provider};
use alloy_rpc_types_eth::{Filter, Log};
use alloy_sol_types::SolEvent;
use alloy_transport::TransportError;
use futures_util::Stream;
use rebate::config::PipelineConfig;
use rebate::deposit::DepositEvent;
use rebate::error::ConfigError;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::contract::IERC20;
use crate::provider::read_provider;

/// Default interval between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Number of blocks a delivered event is remembered for duplicate suppression.
pub const DEDUP_WINDOW_BLOCKS: u64 = 128;

const CHANNEL_CAPACITY: usize = 64;

/// Cancels a running watch.
///
/// Cloning shares the same watch. Cancelling is idempotent and a no-op on an
/// inert watch.
#[derive(Debug, Clone, Default)]
pub struct WatchHandle {
    token: CancellationToken,
}

impl WatchHandle {
    /// Stops polling. The stream ends once buffered events are drained.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns `true` once [`cancel`](Self::cancel) was called or the stream
    /// was dropped.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Stream of deposits to one account.
///
/// Dropping the stream stops the poller.
#[derive(Debug)]
pub struct DepositStream {
    rx: mpsc::Receiver<DepositEvent>,
    handle: WatchHandle,
    _guard: DropGuard,
}

impl DepositStream {
    fn new(rx: mpsc::Receiver<DepositEvent>, handle: WatchHandle) -> Self {
        let guard = handle.token.clone().drop_guard();
        Self {
            rx,
            handle,
            _guard: guard,
        }
    }

    /// A stream that ends immediately.
    fn inert() -> Self {
        let (_, rx) = mpsc::channel(1);
        Self::new(rx, WatchHandle::default())
    }

    /// Returns a handle that cancels this watch.
    #[must_use]
    pub const fn handle(&self) -> &WatchHandle {
        &self.handle
    }

    /// Stops polling; same as [`WatchHandle::cancel`].
    pub fn cancel(&self) {
        self.handle.cancel();
    }
}

impl Stream for DepositStream {
    type Item = DepositEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[derive(Debug, Clone)]
struct Source {
    provider: DynProvider,
    token: Address,
    poll_interval: Duration,
}

/// Watches a token contract for transfers to a recipient.
///
/// A watcher built without a usable RPC endpoint or token address is inert:
/// every watch ends immediately and delivers nothing.
#[derive(Debug, Clone)]
pub struct DepositWatcher {
    source: Option<Source>,
}

impl DepositWatcher {
    /// Creates a watcher for `token` over `provider`.
    ///
    /// A zero `poll_interval` falls back to [`DEFAULT_POLL_INTERVAL`].
    #[must_use]
    pub const fn new(provider: DynProvider, token: Address, poll_interval: Duration) -> Self {
        let poll_interval = if poll_interval.is_zero() {
            DEFAULT_POLL_INTERVAL
        } else {
            poll_interval
        };
        Self {
            source: Some(Source {
                provider,
                token,
                poll_interval,
            }),
        }
    }

    /// Creates a watcher that never delivers anything.
    #[must_use]
    pub const fn inert() -> Self {
        Self { source: None }
    }

    /// Creates a watcher from configuration.
    ///
    /// A missing or malformed RPC endpoint or token address, or a zero
    /// polling interval, is logged as a warning and yields an
    /// [inert](Self::inert) watcher.
    #[must_use]
    pub fn from_config(config: &PipelineConfig) -> Self {
        match Self::try_from_config(config) {
            Ok(watcher) => watcher,
            Err(error) => {
                tracing::warn!(%error, "Deposit watching disabled");
                Self::inert()
            }
        }
    }

    fn try_from_config(config: &PipelineConfig) -> Result<Self, ConfigError> {
        let token = config.token_address()?;
        let poll_interval = config.poll_interval_checked()?;
        let chain = rebate::chain::ChainDescriptor::from_config(config)?;
        let provider = read_provider(&chain, config)?;
        Ok(Self::new(provider, token, poll_interval))
    }

    /// Returns `true` if this watcher never delivers anything.
    #[must_use]
    pub const fn is_inert(&self) -> bool {
        self.source.is_none()
    }

    /// Starts watching for transfers to `recipient`.
    ///
    /// Must be called within a Tokio runtime.
    #[must_use]
    pub fn watch(&self, recipient: Address) -> DepositStream {
        let Some(source) = &self.source else {
            return DepositStream::inert();
        };
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let handle = WatchHandle::default();
        let poller = Poller::new(source.provider.clone(), source.token, recipient);
        tracing::info!(
            token = %source.token,
            recipient = %recipient,
            poll_interval = ?source.poll_interval,
            "Watching for deposits"
        );
        tokio::spawn(poller.run(tx, handle.token.clone(), source.poll_interval));
        DepositStream::new(rx, handle)
    }

    /// Starts watching for transfers to `recipient`, invoking `on_deposit` for
    /// each one.
    ///
    /// Must be called within a Tokio runtime.
    pub fn watch_with<F>(&self, recipient: Address, mut on_deposit: F) -> WatchHandle
    where
        F: FnMut(DepositEvent) + Send + 'static,
    {
        let mut stream = self.watch(recipient);
        let handle = stream.handle().clone();
        tokio::spawn(async move {
            while let Some(event) = futures_util::StreamExt::next(&mut stream).await {
                on_deposit(event);
            }
        });
        handle
    }
}

/// Builds the log filter for transfers of `token` to `recipient` in
/// `from..=to`.
#[must_use]
pub fn deposit_filter(
    token: Address,
    recipient: Address,
    from: BlockNumber,
    to: BlockNumber,
) -> Filter {
    Filter::new()
        .address(token)
        .event_signature(IERC20::Transfer::SIGNATURE_HASH)
        .topic2(recipient.into_word())
        .from_block(from)
        .to_block(to)
}

/// Decodes `Transfer` logs into deposits to `recipient`, sorted by block and
/// log index.
///
/// Pending or removed logs, logs that are not transfers and transfers to any
/// other address are dropped.
#[must_use]
pub fn decode_deposits(logs: &[Log], recipient: Address) -> Vec<DepositEvent> {
    let mut events = logs
        .iter()
        .filter_map(|log| decode_deposit(log, recipient))
        .collect::<Vec<_>>();
    events.sort_by_key(DepositEvent::position);
    events
}

fn decode_deposit(log: &Log, recipient: Address) -> Option<DepositEvent> {
    if log.removed {
        return None;
    }
    let (Some(tx_hash), Some(block_number), Some(log_index)) =
        (log.transaction_hash, log.block_number, log.log_index)
    else {
        tracing::trace!(?log, "Skipping pending log");
        return None;
    };
    let transfer = match IERC20::Transfer::decode_log(&log.inner) {
        Ok(transfer) => transfer,
        Err(error) => {
            tracing::debug!(%tx_hash, log_index, %error, "Skipping undecodable log");
            return None;
        }
    };
    if transfer.to != recipient {
        return None;
    }
    Some(DepositEvent {
        from: transfer.from,
        to: transfer.to,
        value: transfer.value,
        tx_hash,
        block_number,
        log_index,
    })
}

/// Recently delivered events, keyed by `(tx_hash, log_index)`.
#[derive(Debug, Default)]
struct SeenWindow {
    seen: HashMap<(TxHash, u64), BlockNumber>,
}

impl SeenWindow {
    /// Returns the events not delivered before and forgets entries older than
    /// the window below `head`.
    fn admit(&mut self, events: Vec<DepositEvent>, head: BlockNumber) -> Vec<DepositEvent> {
        let floor = head.saturating_sub(DEDUP_WINDOW_BLOCKS);
        self.seen.retain(|_, block| *block >= floor);
        events
            .into_iter()
            .filter(|event| self.seen.insert(event.key(), event.block_number).is_none())
            .collect()
    }
}

struct Poller {
    provider: DynProvider,
    token: Address,
    recipient: Address,
    cursor: Option<BlockNumber>,
    window: SeenWindow,
}

impl Poller {
    fn new(provider: DynProvider, token: Address, recipient: Address) -> Self {
        Self {
            provider,
            token,
            recipient,
            cursor: None,
            window: SeenWindow::default(),
        }
    }

    async fn run(
        mut self,
        tx: mpsc::Sender<DepositEvent>,
        cancel: CancellationToken,
        poll_interval: Duration,
    ) {
        let mut interval = tokio::time::interval(poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let events = match self.poll().await {
                        Ok(events) => events,
                        Err(error) => {
                            tracing::warn!(
                                recipient = %self.recipient,
                                cursor = ?self.cursor,
                                %error,
                                "Deposit poll failed, retrying"
                            );
                            continue;
                        }
                    };
                    for event in events {
                        tracing::info!(
                            from = %event.from,
                            to = %event.to,
                            value = %event.value,
                            tx_hash = %event.tx_hash,
                            block = event.block_number,
                            "Deposit received"
                        );
                        tokio::select! {
                            () = cancel.cancelled() => return,
                            sent = tx.send(event) => {
                                if sent.is_err() {
                                    return;
                                }
                            }
                        }
                    }
                }
            }
        }
        tracing::debug!(recipient = %self.recipient, "Deposit watcher stopped");
    }

    /// Fetches and decodes logs in `(cursor, head]`, advancing the cursor
    /// only when the fetch succeeds.
    async fn poll(&mut self) -> Result<Vec<DepositEvent>, TransportError> {
        let head = self.provider.get_block_number().await?;
        let Some(last) = self.cursor else {
            tracing::debug!(recipient = %self.recipient, head, "Deposit watcher started");
            self.cursor = Some(head);
            return Ok(Vec::new());
        };
        if head <= last {
            return Ok(Vec::new());
        }
        let filter = deposit_filter(self.token, self.recipient, last + 1, head);
        let logs = self.provider.get_logs(&filter).await?;
        self.cursor = Some(head);
        let events = decode_deposits(&logs, self.recipient);
        Ok(self.window.admit(events, head))
    }
}
