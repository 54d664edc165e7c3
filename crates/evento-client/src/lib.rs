// evento-client: the EventoDB client kit.
//
// Four pieces: the typed RPC client, the shared subscription hub (one SSE
// connection per namespace fanned out to in-process consumers), the
// transactional outbox, and the checkpointing consumer.  All local state
// lives in a small SQLite database (`ClientDb`).

pub mod consumer;
pub mod db;
pub mod error;
pub mod hub;
pub mod outbox;
pub mod rpc;
pub mod sse;

pub use consumer::{Consumer, ConsumerConfig, HandlerError, MessageHandler};
pub use db::{ClientDb, OutboxRow, StagedEvent};
pub use error::{ClientError, ClientResult};
pub use hub::{HubConfig, HubState, Subscription, SubscriptionHub};
pub use outbox::OutboxWorker;
pub use rpc::EventoClient;
