use evento_protocol::Poke;
use evento_store::MessageStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

/// Capacity of each namespace's poke topic.  Subscribers that fall further
/// behind than this are lagged: they lose pokes and catch up by polling.
const TOPIC_CAPACITY: usize = 1024;

pub type PokeTopic = broadcast::Sender<Poke>;
pub type TopicRegistry = Arc<RwLock<HashMap<String, PokeTopic>>>;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<MessageStore>,
    /// Admin bearer token for namespace administration methods.
    pub admin_token: Option<String>,
    /// When set, token-less RPC requests auto-provision a namespace and the
    /// response carries its token in `X-EventoDB-Token`.
    pub test_mode: bool,
    topics: TopicRegistry,
}

impl AppState {
    pub fn new(store: Arc<MessageStore>, admin_token: Option<String>, test_mode: bool) -> Self {
        Self {
            store,
            admin_token,
            test_mode,
            topics: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// The poke topic for a namespace, created on first use.
    pub async fn topic(&self, ns: &str) -> PokeTopic {
        {
            let topics = self.topics.read().await;
            if let Some(tx) = topics.get(ns) {
                return tx.clone();
            }
        }
        let mut topics = self.topics.write().await;
        if let Some(tx) = topics.get(ns) {
            return tx.clone();
        }
        let (tx, _rx) = broadcast::channel(TOPIC_CAPACITY);
        topics.insert(ns.to_owned(), tx.clone());
        tx
    }

    /// Publish a poke to a namespace's subscribers.  Best-effort: delivery
    /// failures never reach the write path.
    pub async fn publish_poke(&self, ns: &str, poke: Poke) {
        let topic = self.topic(ns).await;
        match topic.send(poke) {
            Ok(receivers) => {
                debug!(ns = %ns, receivers, "poke published");
            }
            Err(_) => {
                // No subscribers; nothing to deliver.
            }
        }
    }

    /// Drop a namespace's topic (after namespace deletion).  Live SSE
    /// streams observe the channel close and end.
    pub async fn drop_topic(&self, ns: &str) {
        self.topics.write().await.remove(ns);
    }
}
