//! The polling consumer.
//!
//! Fetches a category from `stored_position + 1` (0 when fresh), skips
//! event ids already in the dedup ledger, and hands the rest to the
//! handler.  A handled event and the checkpoint advance commit together, so
//! delivery is at-least-once from the server and exactly-once to the
//! handler.  Handler failure stops the batch without advancing; the same
//! batch is retried on the next poll.

use async_trait::async_trait;
use evento_protocol::{CategoryRecord, ConsumerGroup, GetCategoryOptions};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};

use crate::db::ClientDb;
use crate::error::ClientResult;
use crate::hub::Subscription;
use crate::rpc::EventoClient;

pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// The seam user code plugs into.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: &CategoryRecord) -> Result<(), HandlerError>;
}

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub namespace: String,
    pub category: String,
    pub consumer_id: String,
    pub batch_size: i64,
    pub poll_interval: Duration,
    /// Optional consumer-group membership, forwarded to category reads.
    pub group: Option<ConsumerGroup>,
}

impl ConsumerConfig {
    pub fn new(
        namespace: impl Into<String>,
        category: impl Into<String>,
        consumer_id: impl Into<String>,
    ) -> Self {
        ConsumerConfig {
            namespace: namespace.into(),
            category: category.into(),
            consumer_id: consumer_id.into(),
            batch_size: 100,
            poll_interval: Duration::from_secs(1),
            group: None,
        }
    }
}

pub struct Consumer {
    client: EventoClient,
    db: Arc<Mutex<ClientDb>>,
    config: ConsumerConfig,
    handler: Arc<dyn MessageHandler>,
}

impl Consumer {
    pub fn new(
        client: EventoClient,
        db: Arc<Mutex<ClientDb>>,
        config: ConsumerConfig,
        handler: Arc<dyn MessageHandler>,
    ) -> Self {
        Consumer {
            client,
            db,
            config,
            handler,
        }
    }

    /// The stored checkpoint (last processed global position).
    pub async fn position(&self) -> ClientResult<Option<i64>> {
        self.db.lock().await.position(
            &self.config.namespace,
            &self.config.category,
            &self.config.consumer_id,
        )
    }

    /// One fetch-and-process pass.  Returns how many events reached the
    /// handler.
    pub async fn poll_once(&self) -> ClientResult<usize> {
        let stored = self.position().await?;
        let fetch_from = stored.map_or(0, |p| p + 1);
        let records = self
            .client
            .get_category(
                &self.config.category,
                &GetCategoryOptions {
                    position: Some(fetch_from),
                    batch_size: Some(self.config.batch_size),
                    correlation: None,
                    consumer_group: self.config.group,
                },
            )
            .await?;

        let mut handled = 0;
        for record in &records {
            let seen = self
                .db
                .lock()
                .await
                .is_processed(&self.config.consumer_id, record.id())?;
            if seen {
                // Already handled in a previous life; just move the cursor.
                self.db.lock().await.advance_position(
                    &self.config.namespace,
                    &self.config.category,
                    &self.config.consumer_id,
                    record.global_position(),
                )?;
                continue;
            }
            match self.handler.handle(record).await {
                Ok(()) => {
                    self.db.lock().await.record_processed(
                        &self.config.namespace,
                        &self.config.category,
                        &self.config.consumer_id,
                        record.id(),
                        record.global_position(),
                    )?;
                    handled += 1;
                }
                Err(e) => {
                    // Do not advance: the batch retries from here next poll.
                    warn!(
                        category = %self.config.category,
                        event = %record.id(),
                        error = %e,
                        "handler failed"
                    );
                    break;
                }
            }
        }
        if handled > 0 {
            debug!(category = %self.config.category, handled, "events processed");
        }
        Ok(handled)
    }

    /// Plain polling loop.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        warn!(category = %self.config.category, error = %e, "poll failed");
                    }
                }
            }
        }
    }

    /// Poke-driven loop: polls on every hub poke for this category (real or
    /// fallback), with the interval as a safety net.
    pub async fn run_with_subscription(
        &self,
        mut subscription: Subscription,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                poke = subscription.rx.recv() => {
                    if poke.is_none() {
                        // Hub gone; fall back to interval polling.
                        self.run(shutdown).await;
                        return;
                    }
                    if let Err(e) = self.poll_once().await {
                        warn!(category = %self.config.category, error = %e, "poll failed");
                    }
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        warn!(category = %self.config.category, error = %e, "poll failed");
                    }
                }
            }
        }
    }
}
