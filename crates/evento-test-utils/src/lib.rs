// evento-test-utils: shared harness for the end-to-end suites.
//
// Spins up real in-process servers on random ports over throwaway data
// directories, and provides an SSE capture client for asserting on poke
// delivery.

use evento_client::sse::SseParser;
use evento_client::EventoClient;
use evento_protocol::{NamespaceCreateOptions, Poke};
use evento_store::MessageStore;
use eventodb_server::AppState;
use futures_util::StreamExt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

/// An in-process EventoDB server over a temporary data directory.
///
/// The directory lives as long as the harness; the server task is detached
/// and dies with the test runtime.
pub struct TestServer {
    pub addr: SocketAddr,
    pub admin_token: String,
    /// Direct store access for white-box assertions.
    pub store: Arc<MessageStore>,
    _data_dir: TempDir,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with(false).await
    }

    pub async fn start_with(test_mode: bool) -> Self {
        let data_dir = TempDir::new().expect("temp data dir");
        let store = Arc::new(MessageStore::open(data_dir.path()).expect("open store"));
        let admin_token = format!("admin-{}", uuid::Uuid::new_v4().simple());
        let state = AppState::new(store.clone(), Some(admin_token.clone()), test_mode);
        let router = eventodb_server::build_router(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("server error");
        });
        TestServer {
            addr,
            admin_token,
            store,
            _data_dir: data_dir,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// A client authenticated with the admin token.
    pub fn admin_client(&self) -> EventoClient {
        EventoClient::new(self.base_url(), Some(self.admin_token.clone()))
    }

    pub fn client_with_token(&self, token: &str) -> EventoClient {
        EventoClient::new(self.base_url(), Some(token.to_owned()))
    }

    pub fn anonymous_client(&self) -> EventoClient {
        EventoClient::new(self.base_url(), None)
    }

    /// Create a namespace and return a client bound to it plus the raw token.
    pub async fn namespace(&self, id: &str) -> (EventoClient, String) {
        let created = self
            .admin_client()
            .create_namespace(id, &NamespaceCreateOptions::default())
            .await
            .expect("create namespace");
        (self.client_with_token(&created.token), created.token)
    }

    /// `GET /subscribe` URL for a stream subscription.
    pub fn stream_subscribe_url(&self, stream: &str, token: &str) -> String {
        format!(
            "{}/subscribe?stream={}&token={}",
            self.base_url(),
            stream,
            token
        )
    }

    /// `GET /subscribe` URL for a category subscription, optionally
    /// partitioned.
    pub fn category_subscribe_url(
        &self,
        category: &str,
        group: Option<(i64, i64)>,
        token: &str,
    ) -> String {
        match group {
            Some((consumer, size)) => format!(
                "{}/subscribe?category={}&consumer={}&size={}&token={}",
                self.base_url(),
                category,
                consumer,
                size,
                token
            ),
            None => format!(
                "{}/subscribe?category={}&token={}",
                self.base_url(),
                category,
                token
            ),
        }
    }
}

/// A raw SSE subscriber that collects pokes off the wire.
pub struct SseCapture {
    rx: mpsc::UnboundedReceiver<Poke>,
    handle: tokio::task::JoinHandle<()>,
}

impl SseCapture {
    /// Open the subscription and wait for the stream to be established.
    pub async fn open(url: &str) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let response = reqwest::Client::new()
            .get(url)
            .send()
            .await
            .expect("subscribe request");
        assert!(
            response.status().is_success(),
            "subscribe failed: {}",
            response.status()
        );
        let handle = tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            let mut parser = SseParser::new();
            while let Some(Ok(bytes)) = stream.next().await {
                for frame in parser.feed(&bytes) {
                    if let Some(poke) = frame.poke() {
                        if tx.send(poke).is_err() {
                            return;
                        }
                    }
                }
            }
        });
        SseCapture { rx, handle }
    }

    /// Next poke, or `None` if none arrives within `timeout`.
    pub async fn next_poke(&mut self, timeout: Duration) -> Option<Poke> {
        tokio::time::timeout(timeout, self.rx.recv()).await.ok()?
    }

    /// Assert quiescence: no poke within `window`.
    pub async fn expect_silence(&mut self, window: Duration) {
        if let Some(poke) = self.next_poke(window).await {
            panic!("expected no poke, got {poke:?}");
        }
    }

    pub fn close(self) {
        self.handle.abort();
    }
}
