//! Transactional outbox publication.
//!
//! Business code stages events into the outbox table inside its own
//! transaction (see [`ClientDb::stage`]); the worker here drains unsent rows
//! in staging order and publishes them with `stream.write`.  A failed
//! publish leaves the row unsent for the next tick — delivery is
//! at-least-once, and staged order is preserved per stream because the
//! worker is serialized and stops at the first failure.

use evento_protocol::MessageInput;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};

use crate::db::ClientDb;
use crate::error::ClientResult;
use crate::rpc::EventoClient;

/// Rows fetched per drain pass.
const DRAIN_BATCH: i64 = 100;

/// Publish every unsent outbox row once, oldest first.
///
/// Stops at the first failure so a stream's rows never publish out of
/// order.  Returns the number of rows published.
pub async fn drain_once(client: &EventoClient, db: &Mutex<ClientDb>) -> ClientResult<usize> {
    let pending = db.lock().await.pending(DRAIN_BATCH)?;
    let mut published = 0;
    for row in pending {
        let input = MessageInput {
            message_type: row.message_type.clone(),
            data: row.data.clone(),
            metadata: row.metadata.clone(),
        };
        match client
            .write_message(&row.stream, &input, &row.write_options)
            .await
        {
            Ok(result) => {
                db.lock().await.mark_sent(row.id)?;
                debug!(
                    stream = %row.stream,
                    position = result.position,
                    "outbox row published"
                );
                published += 1;
            }
            Err(e) => {
                warn!(stream = %row.stream, id = row.id, error = %e, "outbox publish failed");
                break;
            }
        }
    }
    Ok(published)
}

/// The background publisher.  Constant-interval polling, no persisted
/// backoff state.
pub struct OutboxWorker {
    shutdown_tx: watch::Sender<bool>,
}

impl OutboxWorker {
    pub fn spawn(
        client: EventoClient,
        db: Arc<Mutex<ClientDb>>,
        poll_interval: Duration,
    ) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = drain_once(&client, &db).await {
                            warn!(error = %e, "outbox drain failed");
                        }
                    }
                }
            }
            debug!("outbox worker stopped");
        });
        OutboxWorker { shutdown_tx }
    }

    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Drop for OutboxWorker {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}
