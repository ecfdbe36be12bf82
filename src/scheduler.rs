use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::chain::ChainApi;
use crate::config::{CATCHUP_POLL_SECS, DISPATCH_DELAY_MS, IDLE_POLL_SECS, STEADY_POLL_SECS};
use crate::db::{FeedSubscription, SubscriptionSource};
use crate::enricher::Enrich;
use crate::error::{AppError, Result};
use crate::extractor::SaleExtractor;
use crate::sink::{DeliverySink, Notifier};
use crate::types::Sale;

/// Control side of the feed: start/stop/status from concurrent contexts
/// (API handlers). The flag is the only state shared with the scan task;
/// the block cursor stays owned by the task itself.
#[derive(Clone)]
pub struct SchedulerHandle {
    active: Arc<AtomicBool>,
    /// Bumped on every successful start. The scan task compares it each
    /// iteration, so a stop+start landing inside one iteration still reads
    /// as a fresh Running phase rather than a continuation of the old one.
    generation: Arc<AtomicU64>,
    wake_tx: mpsc::Sender<()>,
    chain: Arc<dyn ChainApi>,
    notifier: Arc<dyn Notifier>,
}

impl SchedulerHandle {
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Flip Stopped → Running and wake the scan task. Returns false as a
    /// no-op when the feed is already running.
    pub fn start(&self) -> bool {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
        // Capacity-1 channel: a pending wakeup is already enough.
        let _ = self.wake_tx.try_send(());
        true
    }

    /// Flip Running → Stopped, fetch the head once more, and emit the
    /// "stopped at block N" status line. The scan task observes the flag at
    /// the top of its next iteration — in-flight work is not aborted.
    pub async fn stop(&self) -> bool {
        if !self.active.swap(false, Ordering::SeqCst) {
            return false;
        }
        match self.chain.head().await {
            Ok(head) => {
                self.notifier
                    .notify(&format!("stopped at block `{}`", head.level))
                    .await;
            }
            Err(e) => {
                warn!("unable to pull head for stop notification: {e}");
                self.notifier.notify("stopped").await;
            }
        }
        true
    }
}

/// The block-polling scan loop.
///
/// Single long-lived task and the sole writer of the cursor, so block
/// progression needs no locking. Blocks are visited strictly in increasing
/// order, exactly one per iteration — when the chain gets ahead, the loop
/// catches up one block at a time rather than skipping.
pub struct FeedScheduler {
    chain: Arc<dyn ChainApi>,
    extractor: SaleExtractor,
    enricher: Arc<dyn Enrich>,
    subscriptions: Arc<dyn SubscriptionSource>,
    sink: Arc<dyn DeliverySink>,
    notifier: Arc<dyn Notifier>,
    active: Arc<AtomicBool>,
    generation: Arc<AtomicU64>,
    /// Last generation this task has caught up with. A mismatch means a
    /// start happened since the previous iteration.
    seen_generation: u64,
    wake_rx: mpsc::Receiver<()>,
    /// Last processed block level. In-memory only — reset on restart.
    cursor: Option<i64>,
}

impl FeedScheduler {
    pub fn new(
        chain: Arc<dyn ChainApi>,
        marketplace: impl Into<String>,
        enricher: Arc<dyn Enrich>,
        subscriptions: Arc<dyn SubscriptionSource>,
        sink: Arc<dyn DeliverySink>,
        notifier: Arc<dyn Notifier>,
    ) -> (Self, SchedulerHandle) {
        let active = Arc::new(AtomicBool::new(false));
        let generation = Arc::new(AtomicU64::new(0));
        let (wake_tx, wake_rx) = mpsc::channel(1);
        let handle = SchedulerHandle {
            active: Arc::clone(&active),
            generation: Arc::clone(&generation),
            wake_tx,
            chain: Arc::clone(&chain),
            notifier: Arc::clone(&notifier),
        };
        let scheduler = Self {
            extractor: SaleExtractor::new(Arc::clone(&chain), marketplace),
            chain,
            enricher,
            subscriptions,
            sink,
            notifier,
            active,
            generation,
            seen_generation: 0,
            wake_rx,
            cursor: None,
        };
        (scheduler, handle)
    }

    /// Parks until started, scans until stopped, repeats. Exits only when
    /// every handle is dropped.
    pub async fn run(mut self) {
        loop {
            if !self.active.load(Ordering::SeqCst) {
                match self.wake_rx.recv().await {
                    Some(()) => continue,
                    None => break,
                }
            }
            self.scan().await;
        }
    }

    /// One Running phase: iterate until the flag clears or the loop fails.
    /// Continuing past a chain or store failure would produce silent gaps
    /// in the feed, which is worse than an explicit stop.
    async fn scan(&mut self) {
        while self.active.load(Ordering::SeqCst) {
            self.sync_generation();
            match self.step().await {
                Ok(delay) => tokio::time::sleep(delay).await,
                Err(e) => {
                    error!("sales feed halted: {e}");
                    self.active.store(false, Ordering::SeqCst);
                    let reason = match &e {
                        AppError::Database(_) => "stopped after a subscription store failure",
                        _ => "stopped after a chain API failure",
                    };
                    self.notifier.notify(reason).await;
                    break;
                }
            }
        }
    }

    /// Picks up any start issued since the previous iteration. A stop+start
    /// pair landing while `step` is in flight leaves the flag at true, so the
    /// flag alone cannot mark the restart; the generation bump can. On a
    /// restart the cursor is dropped, which re-runs the started-at-head
    /// initialization on the next step.
    fn sync_generation(&mut self) {
        let generation = self.generation.load(Ordering::SeqCst);
        if generation != self.seen_generation {
            self.seen_generation = generation;
            self.cursor = None;
        }
    }

    /// One loop iteration. Returns how long to sleep before the next.
    async fn step(&mut self) -> Result<Duration> {
        let head = self.chain.head().await?;

        let prev = match self.cursor {
            Some(prev) => prev,
            None => {
                let prev = head.level - 1;
                self.cursor = Some(prev);
                self.notifier
                    .notify(&format!("started at block `{}`", head.level))
                    .await;
                prev
            }
        };

        if head.level <= prev {
            info!(
                "current block '{}' has not advanced past '{prev}'",
                head.level
            );
            // Take the observed level so a stale cursor is never re-polled.
            self.cursor = Some(head.level);
            return Ok(Duration::from_secs(CATCHUP_POLL_SECS));
        }

        // Clamp to one block per iteration — never skip levels under lag.
        let target = prev + 1;

        let feeds = self.subscriptions.list_subscriptions().await?;
        if feeds.is_empty() {
            info!("no sales feeds subscribed, skipping block '{target}'");
            self.cursor = Some(target);
            return Ok(Duration::from_secs(IDLE_POLL_SECS));
        }

        let floor = feeds
            .iter()
            .map(|f| f.minimum_sale_amount)
            .min()
            .unwrap_or(0);
        info!(
            block = target,
            feeds = feeds.len(),
            "searching block '{target}' for sales above {floor}\u{a729}"
        );

        let sales = self.extractor.sales_in_block(target, floor).await?;
        for mut sale in sales {
            self.enrich(&mut sale).await;
            self.dispatch(&sale, &feeds).await;
        }

        self.cursor = Some(target);
        Ok(Duration::from_secs(STEADY_POLL_SECS))
    }

    /// Best-effort metadata fill. An unreachable metadata site downgrades
    /// the sale to its on-chain fields; it is still dispatched.
    async fn enrich(&self, sale: &mut Sale) {
        if let Some(token_id) = sale.token_id {
            match self.enricher.token_metadata(token_id).await {
                Ok(meta) => {
                    sale.token_title = meta.title;
                    sale.token_author = meta.author;
                    sale.token_ipfs_uri = meta.ipfs_uri;
                }
                Err(e) => {
                    warn!(
                        "dispatching sale '{}' without metadata: {e}",
                        sale.operation_hash
                    );
                }
            }
        }
        if let Some(seller) = sale.seller_address.clone() {
            sale.seller_alias = Some(self.enricher.profile_alias(&seller).await);
        }
        if let Some(buyer) = sale.buyer_address.clone() {
            sale.buyer_alias = Some(self.enricher.profile_alias(&buyer).await);
        }
    }

    /// Sequential delivery to every subscription whose threshold admits the
    /// sale. A rejected message is logged and the next recipient still
    /// attempted; the fixed gap between sends bounds burst load on the sink.
    async fn dispatch(&self, sale: &Sale, feeds: &[FeedSubscription]) {
        let mut delivered = 0usize;
        for (i, feed) in feeds
            .iter()
            .filter(|f| sale.amount >= f.minimum_sale_amount as f64)
            .enumerate()
        {
            // Gap between sends only — no trailing sleep after the last.
            if i > 0 {
                tokio::time::sleep(Duration::from_millis(DISPATCH_DELAY_MS)).await;
            }
            match self.sink.deliver(feed.channel_id, sale).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!("delivery to channel '{}' failed: {e}", feed.channel_id);
                }
            }
        }
        info!(
            "posted sale '{}' to {delivered} channel(s)",
            sale.operation_hash
        );
    }
}
