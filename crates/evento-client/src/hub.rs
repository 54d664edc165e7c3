//! The shared subscription hub.
//!
//! One namespace-wide SSE connection, multiplexed to any number of
//! in-process consumers by category.  The hub runs an explicit state
//! machine:
//!
//! - `Connecting` → `Connected` once the SSE stream is open (reset backoff);
//!   → `Disconnected` with exponential backoff when the connect fails.
//! - `Connected`: pokes are routed to consumers registered for the poke's
//!   category.  A transport error, stream close, or a silence-threshold
//!   health check kills the connection and reconnects immediately.
//! - `Disconnected`: while waiting to reconnect, a fallback-poll timer
//!   delivers synthetic pokes (global position sentinel -1) to every
//!   registered consumer so they poll the server directly.
//!
//! Consumer mailboxes are bounded; a full mailbox drops the poke (the
//! consumer's next poll catches it up) and a closed one unregisters itself.

use evento_protocol::{stream_name, Poke, FALLBACK_GLOBAL_POSITION};
use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, RwLock};
use tracing::{debug, info, warn};

use crate::sse::SseParser;

#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Server base URL without a trailing slash.
    pub base_url: String,
    /// Namespace bearer token (sent as the `token` query parameter).
    pub token: String,
    pub reconnect_base: Duration,
    pub reconnect_max: Duration,
    /// Kill a connection that has delivered no poke for this long.
    pub silence_threshold: Duration,
    /// Cadence of synthetic fallback pokes while disconnected.
    pub fallback_poll_interval: Duration,
    /// Bound of each consumer's poke mailbox.
    pub mailbox_capacity: usize,
}

impl HubConfig {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        HubConfig {
            base_url: base_url.into(),
            token: token.into(),
            reconnect_base: Duration::from_secs(1),
            reconnect_max: Duration::from_secs(30),
            silence_threshold: Duration::from_secs(90),
            fallback_poll_interval: Duration::from_secs(10),
            mailbox_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubState {
    Connecting,
    Connected,
    Disconnected,
}

/// A consumer's registration: the poke mailbox plus the id needed to
/// unregister.  Dropping the subscription unregisters implicitly (the hub
/// cleans up closed mailboxes on the next delivery).
pub struct Subscription {
    pub category: String,
    id: u64,
    pub rx: mpsc::Receiver<Poke>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }
}

#[derive(Default)]
struct Registry {
    consumers: RwLock<HashMap<String, Vec<(u64, mpsc::Sender<Poke>)>>>,
    next_id: AtomicU64,
}

pub struct SubscriptionHub {
    config: HubConfig,
    registry: Arc<Registry>,
    state_rx: watch::Receiver<HubState>,
    shutdown_tx: watch::Sender<bool>,
}

impl SubscriptionHub {
    /// Start the hub's connection driver and return the handle consumers
    /// register through.
    pub fn start(config: HubConfig) -> Self {
        let registry = Arc::new(Registry::default());
        let (state_tx, state_rx) = watch::channel(HubState::Connecting);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(run_hub(
            config.clone(),
            registry.clone(),
            state_tx,
            shutdown_rx,
        ));
        SubscriptionHub {
            config,
            registry,
            state_rx,
            shutdown_tx,
        }
    }

    /// Register a consumer for a category's pokes.
    pub async fn register(&self, category: &str) -> Subscription {
        let (tx, rx) = mpsc::channel(self.config.mailbox_capacity);
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry
            .consumers
            .write()
            .await
            .entry(category.to_owned())
            .or_default()
            .push((id, tx));
        debug!(category, id, "consumer registered");
        Subscription {
            category: category.to_owned(),
            id,
            rx,
        }
    }

    pub async fn unregister(&self, category: &str, id: u64) {
        let mut consumers = self.registry.consumers.write().await;
        if let Some(entries) = consumers.get_mut(category) {
            entries.retain(|(entry_id, _)| *entry_id != id);
            if entries.is_empty() {
                consumers.remove(category);
            }
        }
    }

    pub fn state(&self) -> HubState {
        *self.state_rx.borrow()
    }

    /// Watch state transitions (tests and health reporting).
    pub fn state_watch(&self) -> watch::Receiver<HubState> {
        self.state_rx.clone()
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Drop for SubscriptionHub {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

// ---------------------------------------------------------------------------
// Connection driver
// ---------------------------------------------------------------------------

async fn run_hub(
    config: HubConfig,
    registry: Arc<Registry>,
    state_tx: watch::Sender<HubState>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let http = reqwest::Client::new();
    let mut attempts: u32 = 0;
    loop {
        if *shutdown_rx.borrow() {
            break;
        }
        let _ = state_tx.send(HubState::Connecting);
        match open_sse(&http, &config).await {
            Ok(response) => {
                attempts = 0;
                let _ = state_tx.send(HubState::Connected);
                info!("subscription started");
                let reason =
                    drive_connection(response, &config, &registry, &mut shutdown_rx).await;
                let _ = state_tx.send(HubState::Disconnected);
                if *shutdown_rx.borrow() {
                    break;
                }
                // Established connections reconnect immediately.
                debug!(reason, "subscription ended");
            }
            Err(e) => {
                let _ = state_tx.send(HubState::Disconnected);
                let delay = backoff_delay(&config, attempts);
                attempts = attempts.saturating_add(1);
                warn!(error = %e, delay_ms = delay.as_millis() as u64, "subscription failed");
                if wait_disconnected(&config, &registry, delay, &mut shutdown_rx).await {
                    break;
                }
            }
        }
    }
    debug!("hub shut down");
}

async fn open_sse(http: &reqwest::Client, config: &HubConfig) -> Result<reqwest::Response, String> {
    let url = format!("{}/subscribe", config.base_url);
    let response = http
        .get(url)
        .query(&[("token", config.token.as_str())])
        .send()
        .await
        .map_err(|e| e.to_string())?;
    if !response.status().is_success() {
        return Err(format!("subscribe returned {}", response.status()));
    }
    Ok(response)
}

/// Pump one established connection.  Returns the reason it ended.
async fn drive_connection(
    response: reqwest::Response,
    config: &HubConfig,
    registry: &Registry,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> &'static str {
    let mut stream = response.bytes_stream();
    let mut parser = SseParser::new();
    let mut last_poke = tokio::time::Instant::now();
    loop {
        let Some(remaining) = config
            .silence_threshold
            .checked_sub(last_poke.elapsed())
        else {
            return "silence threshold exceeded";
        };
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    return "shutdown";
                }
            }
            chunk = tokio::time::timeout(remaining, stream.next()) => match chunk {
                Err(_) => return "silence threshold exceeded",
                Ok(None) => return "stream closed",
                Ok(Some(Err(e))) => {
                    debug!(error = %e, "transport error");
                    return "transport error";
                }
                Ok(Some(Ok(bytes))) => {
                    for frame in parser.feed(&bytes) {
                        if let Some(poke) = frame.poke() {
                            last_poke = tokio::time::Instant::now();
                            dispatch_poke(registry, poke).await;
                        }
                    }
                }
            }
        }
    }
}

/// Disconnected wait: reconnect after `delay`, emitting fallback pokes on
/// the way.  Returns true on shutdown.
async fn wait_disconnected(
    config: &HubConfig,
    registry: &Registry,
    delay: Duration,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> bool {
    let deadline = tokio::time::Instant::now() + delay;
    let mut fallback = tokio::time::interval_at(
        tokio::time::Instant::now() + config.fallback_poll_interval,
        config.fallback_poll_interval,
    );
    loop {
        tokio::select! {
            () = tokio::time::sleep_until(deadline) => return false,
            _ = fallback.tick() => emit_fallback(registry).await,
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    return true;
                }
            }
        }
    }
}

fn backoff_delay(config: &HubConfig, attempts: u32) -> Duration {
    let factor = 1u32.checked_shl(attempts.min(16)).unwrap_or(u32::MAX);
    config
        .reconnect_base
        .saturating_mul(factor)
        .min(config.reconnect_max)
}

async fn dispatch_poke(registry: &Registry, poke: Poke) {
    let category = stream_name::category(&poke.stream).to_owned();
    deliver(registry, &category, &poke).await;
}

/// Fallback-poll tick: every registered consumer gets a synthetic poke so
/// it polls the server even though no notification arrived.
async fn emit_fallback(registry: &Registry) {
    let categories: Vec<String> = registry.consumers.read().await.keys().cloned().collect();
    for category in categories {
        let poke = Poke {
            stream: category.clone(),
            position: FALLBACK_GLOBAL_POSITION,
            global_position: FALLBACK_GLOBAL_POSITION,
        };
        deliver(registry, &category, &poke).await;
    }
}

async fn deliver(registry: &Registry, category: &str, poke: &Poke) {
    let mut closed = Vec::new();
    {
        let consumers = registry.consumers.read().await;
        let Some(entries) = consumers.get(category) else {
            return;
        };
        for (id, tx) in entries {
            match tx.try_send(poke.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    // Mailbox full: drop the poke, the consumer polls anyway.
                    debug!(category, id, "consumer mailbox full, poke dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => closed.push(*id),
            }
        }
    }
    if !closed.is_empty() {
        let mut consumers = registry.consumers.write().await;
        if let Some(entries) = consumers.get_mut(category) {
            entries.retain(|(id, _)| !closed.contains(id));
            if entries.is_empty() {
                consumers.remove(category);
            }
        }
        debug!(category, gone = closed.len(), "closed consumers removed");
    }
}
